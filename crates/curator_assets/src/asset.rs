//! Asset, sub-asset, dependency-kind and transform-state types.

use std::fmt;
use std::path::PathBuf;

use curator_common::{AssetKey, ContentHash, Guid};
use curator_diagnostics::LogEntry;
use serde::{Deserialize, Serialize};

use crate::document::AssetDocument;

/// What a dependency edge is needed for.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Debug, Serialize, Deserialize)]
pub enum DependencyKind {
    /// Needed to transform the asset. Part of the dependency hash.
    Transform,
    /// Needed only to render the thumbnail.
    Thumbnail,
    /// Needed only when packaging.
    Package,
    /// A plain reference that affects no output.
    Reference,
}

impl DependencyKind {
    /// All kinds, in declaration order.
    pub const ALL: [DependencyKind; 4] = [
        DependencyKind::Transform,
        DependencyKind::Thumbnail,
        DependencyKind::Package,
        DependencyKind::Reference,
    ];
}

impl fmt::Display for DependencyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DependencyKind::Transform => "TransformDep",
            DependencyKind::Thumbnail => "ThumbnailDep",
            DependencyKind::Package => "PackageDep",
            DependencyKind::Reference => "Reference",
        };
        f.write_str(name)
    }
}

/// The transform state of a sub-asset.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
pub enum TransformState {
    /// Not evaluated since the last relevant change.
    Unknown,
    /// Output and thumbnail match the current inputs.
    UpToDate,
    /// The imported source file changed since the last import.
    NeedsImport,
    /// The output is missing or was built from different inputs.
    NeedsTransform,
    /// The output is current but the thumbnail is not.
    NeedsThumbnail,
    /// The output is current but was packaged with different package inputs.
    NeedsPackage,
    /// A transform dependency, direct or transitive, does not resolve.
    MissingTransformDependency,
    /// A thumbnail dependency does not resolve.
    MissingThumbnailDependency,
    /// A package dependency does not resolve.
    MissingPackageDependency,
    /// The asset is on, or depends on, a transform dependency cycle.
    CircularDependency,
    /// The last transform failed and nothing changed since.
    TransformError,
}

impl TransformState {
    /// Returns `true` for the states that a transform can resolve.
    pub fn needs_work(self) -> bool {
        matches!(
            self,
            TransformState::NeedsImport
                | TransformState::NeedsTransform
                | TransformState::NeedsThumbnail
                | TransformState::NeedsPackage
        )
    }

    /// Returns `true` for the states that block transforming the asset.
    pub fn is_blocked(self) -> bool {
        matches!(
            self,
            TransformState::MissingTransformDependency
                | TransformState::CircularDependency
                | TransformState::TransformError
        )
    }
}

impl fmt::Display for TransformState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// One named output unit produced from an asset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubAsset {
    /// Stable identifier.
    pub guid: Guid,
    /// Display name. The main sub-asset is named after the file.
    pub name: String,
    /// Whether this is the asset's main sub-asset.
    pub is_main: bool,
    /// The owning asset.
    pub owner: AssetKey,
    /// Last access in milliseconds since the Unix epoch, if ever accessed.
    pub last_access: Option<u64>,
}

/// One source asset file tracked by the curator.
#[derive(Debug, Clone)]
pub struct AssetInfo {
    /// Interned qualified path.
    pub key: AssetKey,
    /// Qualified path: data dir alias, then the data-dir-relative path.
    pub path: String,
    /// Alias of the data directory containing the file.
    pub data_dir: String,
    /// Absolute path of the document.
    pub abs_path: PathBuf,
    /// Asset type name.
    pub asset_type: String,
    /// Content hash of the document file.
    pub content_hash: ContentHash,
    /// The parsed document.
    pub document: AssetDocument,
    /// Sub-assets. The main sub-asset is always first.
    pub sub_assets: Vec<SubAsset>,
    /// Entries collected for drill-down: parse warnings, transform failures.
    pub log: Vec<LogEntry>,
}

impl AssetInfo {
    /// Returns the main sub-asset.
    pub fn main(&self) -> &SubAsset {
        &self.sub_assets[0]
    }

    /// Returns the main sub-asset's GUID.
    pub fn guid(&self) -> Guid {
        self.main().guid
    }

    /// Returns the data-dir-relative part of the qualified path.
    pub fn relative_path(&self) -> &str {
        self.path
            .strip_prefix(&self.data_dir)
            .and_then(|rest| rest.strip_prefix('/'))
            .unwrap_or(&self.path)
    }

    /// Returns the sub-asset with the given GUID.
    pub fn sub_asset(&self, guid: Guid) -> Option<&SubAsset> {
        self.sub_assets.iter().find(|s| s.guid == guid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_display_matches_dgml_categories() {
        assert_eq!(DependencyKind::Transform.to_string(), "TransformDep");
        assert_eq!(DependencyKind::Reference.to_string(), "Reference");
    }

    #[test]
    fn state_classification() {
        assert!(TransformState::NeedsTransform.needs_work());
        assert!(TransformState::NeedsThumbnail.needs_work());
        assert!(!TransformState::UpToDate.needs_work());
        assert!(TransformState::CircularDependency.is_blocked());
        assert!(!TransformState::MissingThumbnailDependency.is_blocked());
        assert_eq!(TransformState::UpToDate.to_string(), "UpToDate");
    }

    #[test]
    fn relative_path_strips_alias() {
        let info = AssetInfo {
            key: AssetKey::from_raw(0),
            path: "project/meshes/box.mesh".to_string(),
            data_dir: "project".to_string(),
            abs_path: PathBuf::from("/p/data/meshes/box.mesh"),
            asset_type: "mesh".to_string(),
            content_hash: ContentHash::INVALID,
            document: AssetDocument::default(),
            sub_assets: vec![SubAsset {
                guid: Guid::from_path("project/meshes/box.mesh"),
                name: "box".to_string(),
                is_main: true,
                owner: AssetKey::from_raw(0),
                last_access: None,
            }],
            log: Vec::new(),
        };
        assert_eq!(info.relative_path(), "meshes/box.mesh");
        assert!(info.main().is_main);
    }
}
