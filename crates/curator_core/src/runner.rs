//! The job executor that runs document managers and writes artifacts.
//!
//! The runner only sees the [`JobRequest`]: everything it needs, including
//! the hashes to stamp into artifact headers, is computed by the curator
//! before submission. That keeps it usable inside a worker process that has
//! no curator state at all.

use std::io::{Read, Write};
use std::path::Path;
use std::sync::Arc;

use curator_cache::ArtifactStore;
use curator_common::ContentHash;
use curator_config::ResolvedConfig;
use curator_diagnostics::{codes, LogEntry};
use curator_worker::{serve, JobExecutor, JobKind, JobRequest};
use tracing::debug;

use crate::error::CuratorError;
use crate::registry::{ManagerRegistry, TransformContext};

/// Runs transforms and thumbnail renders for the worker backends.
pub struct TransformRunner {
    registry: Arc<ManagerRegistry>,
    artifacts: ArtifactStore,
}

impl TransformRunner {
    /// Creates a runner writing below the store's output directory.
    pub fn new(registry: Arc<ManagerRegistry>, artifacts: ArtifactStore) -> Self {
        Self {
            registry,
            artifacts,
        }
    }

    fn write(&self, request: &JobRequest, path: &Path, hash: ContentHash, payload: &[u8]) -> Result<(), Vec<LogEntry>> {
        self.artifacts
            .write_artifact(path, hash, request.input.package_hash, payload)
            .map_err(|e| {
                vec![LogEntry::error(
                    codes::WRITE_FAILED,
                    format!("cannot write {}", path.display()),
                )
                .with_path(request.input.asset_path.clone())
                .with_note(e.to_string())]
            })
    }
}

impl JobExecutor for TransformRunner {
    fn execute(&self, request: &JobRequest) -> Result<ContentHash, Vec<LogEntry>> {
        let input = &request.input;
        let fail = |message: String, note: String| {
            vec![LogEntry::error(codes::TRANSFORM_FAILED, message)
                .with_path(input.asset_path.clone())
                .with_note(note)]
        };

        let manager = self.registry.for_type(&input.asset_type).ok_or_else(|| {
            fail(
                format!("no document manager for asset type '{}'", input.asset_type),
                "register a manager or declare the type in curator.toml".to_string(),
            )
        })?;
        let source = std::fs::read(&input.abs_path)
            .map_err(|e| fail(format!("cannot read {}", input.abs_path.display()), e.to_string()))?;
        let (document, _) = manager
            .load_document(&input.abs_path)
            .map_err(|e| fail("cannot load document".to_string(), e.to_string()))?;

        let ctx = TransformContext {
            request,
            document: &document,
            source: &source,
        };
        let with_path = |log: Vec<LogEntry>| -> Vec<LogEntry> {
            log.into_iter()
                .map(|entry| match entry.path {
                    Some(_) => entry,
                    None => entry.with_path(input.asset_path.clone()),
                })
                .collect()
        };

        match request.kind {
            JobKind::Transform => {
                let payload = manager.transform(&ctx).map_err(with_path)?;
                self.write(request, &input.output_path, input.asset_hash, &payload)?;
                if let Some(thumbnail_path) = &input.thumbnail_path {
                    let thumb = manager.thumbnail(&ctx).map_err(with_path)?;
                    self.write(request, thumbnail_path, input.thumbnail_hash, &thumb)?;
                }
                debug!(path = %input.asset_path, hash = %input.asset_hash, "transformed");
                Ok(input.asset_hash)
            }
            JobKind::Thumbnail => {
                let Some(thumbnail_path) = &input.thumbnail_path else {
                    return Err(fail(
                        "thumbnail requested for an asset without thumbnails".to_string(),
                        format!("asset type '{}'", input.asset_type),
                    ));
                };
                let thumb = manager.thumbnail(&ctx).map_err(with_path)?;
                self.write(request, thumbnail_path, input.thumbnail_hash, &thumb)?;
                debug!(path = %input.asset_path, hash = %input.thumbnail_hash, "rendered thumbnail");
                Ok(input.thumbnail_hash)
            }
        }
    }
}

/// Runs the worker side of the process backend: answers jobs read from
/// `input` until the coordinator shuts the worker down.
pub fn serve_worker<R: Read, W: Write>(
    config: &ResolvedConfig,
    registry: ManagerRegistry,
    input: R,
    output: W,
) -> Result<(), CuratorError> {
    let runner = TransformRunner::new(Arc::new(registry), ArtifactStore::new(&config.output_dir));
    serve(&runner, input, output)?;
    Ok(())
}
