//! Dependency, thumbnail and package hashes, and output path derivation.
//!
//! The dependency hash of an asset covers its own content and settings plus
//! the content and settings of everything it transitively needs to transform.
//! The thumbnail and package hashes extend it with the direct thumbnail and
//! package dependencies. All inputs are folded in qualified-path order so the
//! result does not depend on interning order.

use std::path::PathBuf;

use curator_assets::{AssetInfo, DependencyKind, EdgeTarget};
use curator_common::{AssetKey, ContentHash, Guid, HashBuilder};

use crate::state::EvalContext;

/// The three hashes recorded in an asset's artifacts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AssetHashes {
    /// Own content and settings plus every transitive transform dependency.
    pub dependency: ContentHash,
    /// The dependency hash plus the thumbnail dependencies.
    pub thumbnail: ContentHash,
    /// The dependency hash plus the package dependencies.
    pub package: ContentHash,
}

/// Settings hash of one asset under the context's active profile.
pub fn settings_hash(ctx: &EvalContext<'_>, info: &AssetInfo) -> ContentHash {
    let version = ctx
        .registry
        .for_type(&info.asset_type)
        .map_or(0, |manager| manager.version());
    ctx.hashes.settings_hash(
        ctx.profile,
        &info.asset_type,
        version,
        &info.document.settings_bytes(),
    )
}

/// Computes the hashes of the asset `key`, or `None` if it is unknown.
pub fn compute_hashes(ctx: &EvalContext<'_>, key: AssetKey) -> Option<AssetHashes> {
    let info = ctx.db.asset(key)?;

    let mut builder = HashBuilder::new();
    builder
        .add_hash(info.content_hash)
        .add_hash(settings_hash(ctx, info));
    add_file_hashes(ctx, key, DependencyKind::Transform, &mut builder);

    let mut closure: Vec<&AssetInfo> = ctx
        .graph
        .reachable(key, DependencyKind::Transform)
        .into_iter()
        .filter(|dep| *dep != key)
        .filter_map(|dep| ctx.db.asset(dep))
        .collect();
    closure.sort_by(|a, b| a.path.cmp(&b.path));
    for dep in closure {
        builder
            .add_str(&dep.path)
            .add_hash(dep.content_hash)
            .add_hash(settings_hash(ctx, dep));
        add_file_hashes(ctx, dep.key, DependencyKind::Transform, &mut builder);
    }
    let dependency = builder.finish();

    Some(AssetHashes {
        dependency,
        thumbnail: extend(ctx, key, dependency, DependencyKind::Thumbnail),
        package: extend(ctx, key, dependency, DependencyKind::Package),
    })
}

fn extend(ctx: &EvalContext<'_>, key: AssetKey, base: ContentHash, kind: DependencyKind) -> ContentHash {
    let mut builder = HashBuilder::new();
    builder.add_hash(base);
    let mut assets: Vec<&AssetInfo> = ctx
        .graph
        .asset_dependencies(key, kind)
        .into_iter()
        .filter_map(|dep| ctx.db.asset(dep))
        .collect();
    assets.sort_by(|a, b| a.path.cmp(&b.path));
    for dep in assets {
        builder.add_str(&dep.path).add_hash(dep.content_hash);
    }
    add_file_hashes(ctx, key, kind, &mut builder);
    builder.finish()
}

fn add_file_hashes(ctx: &EvalContext<'_>, key: AssetKey, kind: DependencyKind, builder: &mut HashBuilder) {
    let mut files: Vec<&PathBuf> = ctx
        .graph
        .dependencies(key, kind)
        .into_iter()
        .filter_map(|target| match target {
            EdgeTarget::File(path) => Some(path),
            EdgeTarget::Asset(_) => None,
        })
        .collect();
    files.sort();
    for path in files {
        builder
            .add_str(&path.to_string_lossy())
            .add_hash(ctx.hashes.file_hash(path).hash);
    }
}

/// Absolute paths of everything `key` directly needs to transform, sorted.
pub fn dependency_files(ctx: &EvalContext<'_>, key: AssetKey) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = ctx
        .graph
        .dependencies(key, DependencyKind::Transform)
        .into_iter()
        .filter_map(|target| match target {
            EdgeTarget::File(path) => Some(path.clone()),
            EdgeTarget::Asset(dep) => ctx.db.asset(*dep).map(|info| info.abs_path.clone()),
        })
        .collect();
    files.sort();
    files.dedup();
    files
}

/// Output path of an asset relative to a profile directory: the qualified
/// path with its extension replaced by `extension`.
pub fn output_relative_path(info: &AssetInfo, extension: &str) -> String {
    let path = info.path.as_str();
    let file_start = path.rfind('/').map_or(0, |i| i + 1);
    let stem_end = match path[file_start..].rfind('.') {
        Some(dot) if dot > 0 => file_start + dot,
        _ => path.len(),
    };
    format!("{}.{}", &path[..stem_end], extension)
}

/// Lookup-table path of a sub-asset. Named sub-assets live inside their
/// owner's artifact and are addressed as `<artifact>#<name>`.
pub fn sub_asset_output_path(info: &AssetInfo, guid: Guid, extension: &str) -> Option<String> {
    let sub = info.sub_asset(guid)?;
    let output = output_relative_path(info, extension);
    Some(if sub.is_main {
        output
    } else {
        format!("{output}#{}", sub.name)
    })
}
