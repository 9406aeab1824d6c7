//! Errors raised while loading or saving asset documents.

use std::path::PathBuf;

/// Errors from reading or writing an asset document.
///
/// Malformed dependency lists are not errors: they degrade to an empty list
/// plus a warning entry. Only I/O failures and documents that cannot be
/// serialized back end up here.
#[derive(Debug, thiserror::Error)]
pub enum DocumentError {
    /// The document file could not be read or written.
    #[error("failed to access asset document {path}: {source}")]
    Io {
        /// The document path.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// The document could not be serialized.
    #[error("failed to serialize asset document {path}: {reason}")]
    Serialize {
        /// The document path.
        path: PathBuf,
        /// Description of the failure.
        reason: String,
    },
}
