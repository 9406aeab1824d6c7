//! Errors surfaced by the curator facade.

use std::path::PathBuf;

use curator_assets::DocumentError;
use curator_cache::CacheError;
use curator_config::ConfigError;
use curator_worker::WorkerError;

/// Errors returned by [`AssetCurator`](crate::AssetCurator) operations.
///
/// Per-asset problems (missing dependencies, cycles, failed transforms) are
/// never errors: they show up as transform states and log entries. Only
/// failures of the operation as a whole end up here.
#[derive(Debug, thiserror::Error)]
pub enum CuratorError {
    /// Loading or saving configuration failed.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Writing a cache file or artifact failed.
    #[error(transparent)]
    Cache(#[from] CacheError),

    /// Loading or saving an asset document failed.
    #[error(transparent)]
    Document(#[from] DocumentError),

    /// Starting a worker failed.
    #[error(transparent)]
    Worker(#[from] WorkerError),

    /// None of the configured data directories could be read.
    #[error("cannot open any data directory ({} configured)", dirs.len())]
    NoDataDirectory {
        /// The directories that were tried.
        dirs: Vec<PathBuf>,
    },

    /// No asset matches the given GUID or path.
    #[error("unknown asset '{0}'")]
    UnknownAsset(String),

    /// An I/O error outside the cache, e.g. while writing a lookup table.
    #[error("I/O error at {path}: {source}")]
    Io {
        /// The path that caused the error.
        path: PathBuf,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// An export document could not be produced.
    #[error("failed to write {what}: {reason}")]
    Export {
        /// What was being exported.
        what: &'static str,
        /// Description of the failure.
        reason: String,
    },
}

impl CuratorError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        CuratorError::Io {
            path: path.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_data_directory_counts_dirs() {
        let err = CuratorError::NoDataDirectory {
            dirs: vec![PathBuf::from("a"), PathBuf::from("b")],
        };
        assert_eq!(
            err.to_string(),
            "cannot open any data directory (2 configured)"
        );
    }

    #[test]
    fn config_errors_pass_through() {
        let err: CuratorError = ConfigError::UnknownProfile(3).into();
        assert_eq!(err.to_string(), "unknown platform profile #3");
    }

    #[test]
    fn io_display_contains_path() {
        let err = CuratorError::io(
            "/out/Default/project.table",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        );
        assert!(err.to_string().contains("project.table"));
    }
}
