//! Errors raised by worker backends and the wire protocol.

/// Errors from starting, talking to, or serving a worker.
#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    /// The worker process could not be started.
    #[error("failed to spawn worker '{command}': {source}")]
    Spawn {
        /// The command line that failed.
        command: String,
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// Reading or writing a frame failed.
    #[error("worker I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A frame could not be encoded or decoded, or was unexpected.
    #[error("worker protocol error: {reason}")]
    Protocol {
        /// Description of the problem.
        reason: String,
    },

    /// The worker did not answer the startup ping.
    #[error("worker did not answer the health check")]
    Unresponsive,
}
