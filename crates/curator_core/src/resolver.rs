//! Resolution of dependency reference strings against the data directories.

use std::path::{Path, PathBuf};

use curator_assets::{AssetDatabase, EdgeTarget, ReferenceResolver};
use curator_common::{AssetKey, Guid};
use curator_config::ResolvedDataDir;

/// Resolves references to tracked assets or plain files.
///
/// Lookup order: a GUID names the asset owning that sub-asset; `:alias/path`
/// names a file inside one data directory; any other string is a path relative
/// to a data directory, tried first in the declaring asset's own directory.
/// Within each form, a tracked asset beats a plain file.
pub struct DataDirResolver<'a> {
    db: &'a AssetDatabase,
    data_dirs: &'a [ResolvedDataDir],
}

impl<'a> DataDirResolver<'a> {
    /// Creates a resolver over the current database contents.
    pub fn new(db: &'a AssetDatabase, data_dirs: &'a [ResolvedDataDir]) -> Self {
        Self { db, data_dirs }
    }

    /// Resolves a reference to the absolute path of the file it names,
    /// whether that file is an asset document or a plain file.
    pub fn resolve_file(&self, source: AssetKey, reference: &str) -> Option<PathBuf> {
        match self.resolve(source, reference)? {
            EdgeTarget::Asset(key) => self.db.asset(key).map(|info| info.abs_path.clone()),
            EdgeTarget::File(path) => Some(path),
        }
    }

    fn ordered_dirs(&self, source: AssetKey) -> Vec<&'a ResolvedDataDir> {
        let own = self.db.asset(source).map(|info| info.data_dir.as_str());
        let mut dirs: Vec<&ResolvedDataDir> = self.data_dirs.iter().collect();
        // Stable sort keeps configuration order after the source's own directory.
        dirs.sort_by_key(|d| Some(d.alias.as_str()) != own);
        dirs
    }

    fn asset_in(&self, dir: &ResolvedDataDir, relative: &str) -> Option<EdgeTarget> {
        let qualified = format!("{}/{}", dir.alias, relative);
        let key = self.db.key_of_path(&qualified)?;
        self.db.asset(key).map(|_| EdgeTarget::Asset(key))
    }

    fn file_in(&self, dir: &ResolvedDataDir, relative: &str) -> Option<EdgeTarget> {
        let path = dir.root.join(relative);
        path.is_file().then_some(EdgeTarget::File(path))
    }
}

impl ReferenceResolver for DataDirResolver<'_> {
    fn resolve(&self, source: AssetKey, reference: &str) -> Option<EdgeTarget> {
        let reference = reference.trim();
        if Guid::looks_like_guid(reference) {
            let guid = Guid::parse(reference).ok()?;
            return self.db.key_of(guid).map(EdgeTarget::Asset);
        }

        if let Some(special) = reference.strip_prefix(':') {
            let (alias, rest) = special.split_once('/')?;
            let dir = self
                .data_dirs
                .iter()
                .find(|d| d.alias.eq_ignore_ascii_case(alias))?;
            let rest = normalize(rest)?;
            return self.asset_in(dir, &rest).or_else(|| self.file_in(dir, &rest));
        }

        let path = Path::new(reference);
        if path.is_absolute() {
            if let Some(info) = self.db.asset_by_abs_path(path) {
                return Some(EdgeTarget::Asset(info.key));
            }
            return path.is_file().then(|| EdgeTarget::File(path.to_path_buf()));
        }

        let relative = normalize(reference)?;
        let dirs = self.ordered_dirs(source);
        dirs.iter()
            .find_map(|dir| self.asset_in(dir, &relative))
            .or_else(|| dirs.iter().find_map(|dir| self.file_in(dir, &relative)))
    }
}

/// Normalizes a data-dir-relative reference to forward slashes without `.`
/// segments. Returns `None` for references that escape the directory.
fn normalize(reference: &str) -> Option<String> {
    let mut parts: Vec<&str> = Vec::new();
    for part in reference.split(['/', '\\']) {
        match part {
            "" | "." => {}
            ".." => {
                parts.pop()?;
            }
            other => parts.push(other),
        }
    }
    (!parts.is_empty()).then(|| parts.join("/"))
}
