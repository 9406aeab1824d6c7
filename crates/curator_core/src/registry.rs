//! Document managers and the registry mapping extensions and type names to them.
//!
//! A document manager knows how to load, save and transform one asset type.
//! The curator never inspects the transform itself; it only asks the registry
//! which manager handles a file and hands the manager's output to the
//! artifact store.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use curator_assets::{AssetDocument, DocumentError};
use curator_common::ContentHash;
use curator_config::AssetTypeConfig;
use curator_diagnostics::{codes, LogEntry};
use curator_worker::JobRequest;
use tracing::warn;

/// Inputs handed to a document manager for one transform.
pub struct TransformContext<'a> {
    /// The job being run.
    pub request: &'a JobRequest,
    /// The freshly loaded document.
    pub document: &'a AssetDocument,
    /// Raw bytes of the document file.
    pub source: &'a [u8],
}

/// Loads, saves and transforms the documents of one asset type.
pub trait AssetDocumentManager: Send + Sync {
    /// Name of the handled asset type.
    fn asset_type(&self) -> &str;

    /// File extensions, without the dot, of documents of this type.
    fn extensions(&self) -> &[String];

    /// Transform format version. Part of every asset's settings hash.
    fn version(&self) -> u32 {
        1
    }

    /// Whether this manager can transform assets of `asset_type`.
    fn can_transform(&self, asset_type: &str) -> bool {
        asset_type == self.asset_type()
    }

    /// Whether assets of this type get a thumbnail.
    fn has_thumbnail(&self) -> bool {
        false
    }

    /// Extension of transformed artifacts.
    fn output_extension(&self) -> &str;

    /// Reads and parses a document.
    fn load_document(&self, path: &Path) -> Result<(AssetDocument, Vec<LogEntry>), DocumentError> {
        let text = std::fs::read_to_string(path).map_err(|source| DocumentError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(AssetDocument::parse(&text))
    }

    /// Writes a document in its canonical form.
    fn save_document(&self, path: &Path, document: &AssetDocument) -> Result<(), DocumentError> {
        let text = document
            .to_json_pretty()
            .map_err(|e| DocumentError::Serialize {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })?;
        let mut temp = path.as_os_str().to_os_string();
        temp.push(".tmp");
        let temp = PathBuf::from(temp);
        let io = |source: std::io::Error| DocumentError::Io {
            path: path.to_path_buf(),
            source,
        };
        std::fs::write(&temp, text.as_bytes()).map_err(io)?;
        std::fs::rename(&temp, path).map_err(io)
    }

    /// Produces the output artifact payload.
    fn transform(&self, ctx: &TransformContext<'_>) -> Result<Vec<u8>, Vec<LogEntry>>;

    /// Produces the thumbnail payload.
    fn thumbnail(&self, ctx: &TransformContext<'_>) -> Result<Vec<u8>, Vec<LogEntry>> {
        let _ = ctx;
        Err(vec![LogEntry::error(
            codes::TRANSFORM_FAILED,
            format!("asset type '{}' has no thumbnail generator", self.asset_type()),
        )])
    }

    /// Re-imports the document from its external source, whose content hash
    /// is now `source_hash`. The caller saves the document afterwards.
    fn import(&self, document: &mut AssetDocument, source_hash: ContentHash) -> Result<(), Vec<LogEntry>> {
        match &mut document.import {
            Some(import) => {
                import.hash = Some(source_hash);
                Ok(())
            }
            None => Err(vec![LogEntry::error(
                codes::TRANSFORM_FAILED,
                "document does not record an import source",
            )]),
        }
    }
}

/// The built-in manager for asset types declared in `curator.toml`.
///
/// Its artifact is the canonical document followed by the raw bytes of every
/// transform dependency file, which is enough for the runtime to consume
/// configuration-style assets.
pub struct GenericDocumentManager {
    name: String,
    config: AssetTypeConfig,
}

impl GenericDocumentManager {
    /// Creates a manager for the type `name`.
    pub fn new(name: &str, config: AssetTypeConfig) -> Self {
        Self {
            name: name.to_string(),
            config,
        }
    }
}

impl AssetDocumentManager for GenericDocumentManager {
    fn asset_type(&self) -> &str {
        &self.name
    }

    fn extensions(&self) -> &[String] {
        &self.config.extensions
    }

    fn version(&self) -> u32 {
        self.config.version
    }

    fn has_thumbnail(&self) -> bool {
        self.config.thumbnails
    }

    fn output_extension(&self) -> &str {
        &self.config.output_extension
    }

    fn transform(&self, ctx: &TransformContext<'_>) -> Result<Vec<u8>, Vec<LogEntry>> {
        let mut payload = ctx.document.to_json_pretty().map_err(|e| {
            vec![LogEntry::error(codes::TRANSFORM_FAILED, "cannot serialize document").with_note(e.to_string())]
        })?;
        payload.push('\n');
        let mut bytes = payload.into_bytes();
        for dep in &ctx.request.input.dependencies {
            let data = std::fs::read(dep).map_err(|e| {
                vec![LogEntry::error(
                    codes::TRANSFORM_FAILED,
                    format!("cannot read dependency {}", dep.display()),
                )
                .with_note(e.to_string())]
            })?;
            bytes.extend_from_slice(&data);
        }
        Ok(bytes)
    }

    fn thumbnail(&self, ctx: &TransformContext<'_>) -> Result<Vec<u8>, Vec<LogEntry>> {
        Ok(format!(
            "{} {}\n",
            ctx.request.input.asset_path,
            ContentHash::from_bytes(ctx.source)
        )
        .into_bytes())
    }
}

/// Maps file extensions and type names to document managers.
#[derive(Default, Clone)]
pub struct ManagerRegistry {
    managers: Vec<Arc<dyn AssetDocumentManager>>,
    by_extension: HashMap<String, usize>,
    by_type: HashMap<String, usize>,
}

impl ManagerRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry with a [`GenericDocumentManager`] per configured type.
    pub fn from_config(asset_types: &BTreeMap<String, AssetTypeConfig>) -> Self {
        let mut registry = Self::new();
        for (name, config) in asset_types {
            registry.register(Arc::new(GenericDocumentManager::new(name, config.clone())));
        }
        registry
    }

    /// Adds a manager. A later registration for the same extension or type
    /// name replaces the earlier one.
    pub fn register(&mut self, manager: Arc<dyn AssetDocumentManager>) {
        let index = self.managers.len();
        for ext in manager.extensions() {
            if let Some(old) = self.by_extension.insert(ext.to_ascii_lowercase(), index) {
                warn!(
                    extension = %ext,
                    previous = self.managers[old].asset_type(),
                    "extension registered twice, last registration wins"
                );
            }
        }
        self.by_type.insert(manager.asset_type().to_string(), index);
        self.managers.push(manager);
    }

    /// Returns the manager for a file extension (case-insensitive, no dot).
    pub fn for_extension(&self, ext: &str) -> Option<&Arc<dyn AssetDocumentManager>> {
        let index = self.by_extension.get(&ext.to_ascii_lowercase())?;
        self.managers.get(*index)
    }

    /// Returns the manager for the extension of `path`.
    pub fn for_path(&self, path: &Path) -> Option<&Arc<dyn AssetDocumentManager>> {
        self.for_extension(path.extension()?.to_str()?)
    }

    /// Returns the manager able to transform `asset_type`.
    pub fn for_type(&self, asset_type: &str) -> Option<&Arc<dyn AssetDocumentManager>> {
        if let Some(index) = self.by_type.get(asset_type) {
            return self.managers.get(*index);
        }
        self.managers.iter().find(|m| m.can_transform(asset_type))
    }

    /// Returns `true` if some manager handles the extension of `path`.
    pub fn is_asset_file(&self, path: &Path) -> bool {
        self.for_path(path).is_some()
    }

    /// Number of registered managers.
    pub fn len(&self) -> usize {
        self.managers.len()
    }

    /// Returns `true` if no manager is registered.
    pub fn is_empty(&self) -> bool {
        self.managers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use curator_assets::ImportSource;

    fn mesh_config() -> AssetTypeConfig {
        AssetTypeConfig {
            extensions: vec!["mesh".to_string(), "MSH".to_string()],
            version: 3,
            thumbnails: true,
            output_extension: "plMesh".to_string(),
        }
    }

    #[test]
    fn lookup_by_extension_is_case_insensitive() {
        let mut types = BTreeMap::new();
        types.insert("mesh".to_string(), mesh_config());
        let registry = ManagerRegistry::from_config(&types);

        assert!(registry.for_extension("MESH").is_some());
        assert!(registry.for_extension("msh").is_some());
        assert!(registry.for_path(Path::new("data/box.Mesh")).is_some());
        assert!(registry.for_path(Path::new("data/box.png")).is_none());
        assert!(registry.for_path(Path::new("data/noext")).is_none());
    }

    #[test]
    fn lookup_by_type_reports_config() {
        let mut types = BTreeMap::new();
        types.insert("mesh".to_string(), mesh_config());
        let registry = ManagerRegistry::from_config(&types);

        let manager = registry.for_type("mesh").unwrap();
        assert_eq!(manager.version(), 3);
        assert!(manager.has_thumbnail());
        assert_eq!(manager.output_extension(), "plMesh");
        assert!(registry.for_type("texture").is_none());
    }

    #[test]
    fn later_registration_wins() {
        let mut registry = ManagerRegistry::new();
        registry.register(Arc::new(GenericDocumentManager::new("a", mesh_config())));
        let mut other = mesh_config();
        other.version = 9;
        registry.register(Arc::new(GenericDocumentManager::new("b", other)));

        assert_eq!(registry.for_extension("mesh").unwrap().asset_type(), "b");
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn save_then_load_document() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("box.mesh");
        let manager = GenericDocumentManager::new("mesh", mesh_config());

        let mut doc = AssetDocument::default();
        doc.transform_dependencies.push("tex/wood.png".to_string());
        manager.save_document(&path, &doc).unwrap();

        let (loaded, warnings) = manager.load_document(&path).unwrap();
        assert!(warnings.is_empty());
        assert_eq!(loaded, doc);
        assert!(!dir.path().join("box.mesh.tmp").exists());
    }

    #[test]
    fn load_missing_document_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let manager = GenericDocumentManager::new("mesh", mesh_config());
        assert!(manager.load_document(&dir.path().join("gone.mesh")).is_err());
    }

    #[test]
    fn default_import_records_source_hash() {
        let manager = GenericDocumentManager::new("mesh", mesh_config());
        let mut doc = AssetDocument {
            import: Some(ImportSource {
                source: "raw/box.fbx".to_string(),
                hash: None,
            }),
            ..AssetDocument::default()
        };
        manager.import(&mut doc, ContentHash::from_raw(42)).unwrap();
        assert_eq!(
            doc.import.and_then(|i| i.hash),
            Some(ContentHash::from_raw(42))
        );

        let mut plain = AssetDocument::default();
        assert!(manager.import(&mut plain, ContentHash::from_raw(1)).is_err());
    }
}
