//! The on-disk asset document and its declared dependencies.
//!
//! Documents are JSON objects:
//!
//! ```json
//! {
//!   "guid": "0f3c...",
//!   "transform_dependencies": ["meshes/box.mesh", ":shared/tex/wood.png"],
//!   "thumbnail_dependencies": [],
//!   "package_dependencies": [],
//!   "references": [],
//!   "outputs": ["collision"],
//!   "import": { "source": "raw/box.fbx", "hash": "9a0c2d4e6f801234" },
//!   "settings": { "lod": 2 }
//! }
//! ```
//!
//! Parsing is lenient. A field of the wrong shape is treated as absent and
//! reported as a warning entry, so a damaged document still takes part in the
//! scan with zero declared dependencies.

use std::collections::BTreeSet;

use curator_common::{ContentHash, Guid};
use curator_diagnostics::{codes, LogEntry};
use serde::Serialize;
use serde_json::{Map, Value};

use crate::asset::DependencyKind;

/// One dependency as declared in a document: a kind and an unresolved reference.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeclaredDependency {
    /// What the dependency is needed for.
    pub kind: DependencyKind,
    /// The reference string: a GUID, `:alias/path` or a data-dir-relative path.
    pub reference: String,
}

impl DeclaredDependency {
    /// Creates a declared dependency.
    pub fn new(kind: DependencyKind, reference: impl Into<String>) -> Self {
        Self {
            kind,
            reference: reference.into(),
        }
    }
}

/// Where an imported asset's data came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImportSource {
    /// Reference to the imported source file.
    pub source: String,
    /// Content hash of the source file at import time.
    #[serde(serialize_with = "serialize_hash", skip_serializing_if = "Option::is_none")]
    pub hash: Option<ContentHash>,
}

/// A parsed asset document.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AssetDocument {
    /// Declared GUID of the main sub-asset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub guid: Option<Guid>,
    /// Declared asset type, overriding the type derived from the extension.
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub asset_type: Option<String>,
    /// References needed to transform the asset.
    pub transform_dependencies: Vec<String>,
    /// References needed only to generate the thumbnail.
    pub thumbnail_dependencies: Vec<String>,
    /// References needed only when packaging.
    pub package_dependencies: Vec<String>,
    /// Plain references that do not affect any output.
    pub references: Vec<String>,
    /// Names of additional sub-assets produced besides the main one.
    pub outputs: Vec<String>,
    /// Import bookkeeping, for assets generated from an external source file.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub import: Option<ImportSource>,
    /// Transform settings. Part of the settings hash.
    pub settings: Map<String, Value>,
}

impl AssetDocument {
    /// Parses a document, collecting warnings for every malformed field.
    pub fn parse(text: &str) -> (Self, Vec<LogEntry>) {
        let mut warnings = Vec::new();
        let mut doc = AssetDocument::default();

        let root = match serde_json::from_str::<Value>(text) {
            Ok(Value::Object(root)) => root,
            Ok(_) => {
                warnings.push(LogEntry::warning(
                    codes::MALFORMED_DOCUMENT,
                    "document is not a JSON object; treating it as declaring no dependencies",
                ));
                return (doc, warnings);
            }
            Err(e) => {
                warnings.push(
                    LogEntry::warning(
                        codes::MALFORMED_DOCUMENT,
                        "document is not valid JSON; treating it as declaring no dependencies",
                    )
                    .with_note(e.to_string()),
                );
                return (doc, warnings);
            }
        };

        match root.get("guid") {
            None | Some(Value::Null) => {}
            Some(Value::String(s)) => match Guid::parse(s) {
                Ok(guid) if !guid.is_nil() => doc.guid = Some(guid),
                _ => warnings.push(malformed("guid", "a non-nil GUID")),
            },
            Some(_) => warnings.push(malformed("guid", "a string")),
        }

        match root.get("type") {
            None | Some(Value::Null) => {}
            Some(Value::String(s)) => doc.asset_type = Some(s.clone()),
            Some(_) => warnings.push(malformed("type", "a string")),
        }

        doc.transform_dependencies = string_list(&root, "transform_dependencies", &mut warnings);
        doc.thumbnail_dependencies = string_list(&root, "thumbnail_dependencies", &mut warnings);
        doc.package_dependencies = string_list(&root, "package_dependencies", &mut warnings);
        doc.references = string_list(&root, "references", &mut warnings);
        doc.outputs = string_list(&root, "outputs", &mut warnings);

        match root.get("import") {
            None | Some(Value::Null) => {}
            Some(Value::Object(import)) => match import.get("source") {
                Some(Value::String(source)) => {
                    let hash = match import.get("hash") {
                        Some(Value::String(hex)) => u64::from_str_radix(hex, 16)
                            .ok()
                            .map(ContentHash::from_raw),
                        _ => None,
                    };
                    doc.import = Some(ImportSource {
                        source: source.clone(),
                        hash,
                    });
                }
                _ => warnings.push(malformed("import.source", "a string")),
            },
            Some(_) => warnings.push(malformed("import", "an object")),
        }

        match root.get("settings") {
            None | Some(Value::Null) => {}
            Some(Value::Object(settings)) => doc.settings = settings.clone(),
            Some(_) => warnings.push(malformed("settings", "an object")),
        }

        (doc, warnings)
    }

    /// Serializes the document in its canonical pretty-printed form.
    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Returns the canonical serialized settings, the input to the settings hash.
    ///
    /// Object keys are sorted, so two documents with equal settings always
    /// produce the same bytes.
    pub fn settings_bytes(&self) -> Vec<u8> {
        serde_json::to_vec(&self.settings).unwrap_or_default()
    }

    /// Returns every declared dependency, deduplicated per kind.
    pub fn declared_dependencies(&self) -> BTreeSet<DeclaredDependency> {
        let lists = [
            (DependencyKind::Transform, &self.transform_dependencies),
            (DependencyKind::Thumbnail, &self.thumbnail_dependencies),
            (DependencyKind::Package, &self.package_dependencies),
            (DependencyKind::Reference, &self.references),
        ];
        lists
            .into_iter()
            .flat_map(|(kind, refs)| {
                refs.iter()
                    .map(|r| r.trim())
                    .filter(|r| !r.is_empty())
                    .map(move |r| DeclaredDependency::new(kind, r))
            })
            .collect()
    }
}

fn malformed(field: &str, expected: &str) -> LogEntry {
    LogEntry::warning(
        codes::MALFORMED_DOCUMENT,
        format!("field '{field}' is not {expected}; ignoring it"),
    )
}

fn string_list(root: &Map<String, Value>, field: &str, warnings: &mut Vec<LogEntry>) -> Vec<String> {
    match root.get(field) {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(items)) => {
            let strings: Option<Vec<String>> = items
                .iter()
                .map(|v| v.as_str().map(str::to_string))
                .collect();
            match strings {
                Some(strings) => strings,
                None => {
                    warnings.push(malformed(field, "a list of strings"));
                    Vec::new()
                }
            }
        }
        Some(_) => {
            warnings.push(malformed(field, "a list of strings"));
            Vec::new()
        }
    }
}

fn serialize_hash<S: serde::Serializer>(
    hash: &Option<ContentHash>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match hash {
        Some(hash) => serializer.serialize_str(&hash.to_string()),
        None => serializer.serialize_none(),
    }
}
