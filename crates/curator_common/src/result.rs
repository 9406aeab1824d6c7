//! Common result and error types for the curator.

/// The standard result type for operations that can only fail on a bug.
///
/// User-facing problems (missing files, malformed documents, failed
/// transforms) are reported as transform states and log entries, never
/// through this type.
pub type CuratorResult<T> = Result<T, InternalError>;

/// An internal error indicating a bug in the curator, not a data problem.
#[derive(Debug, thiserror::Error)]
#[error("internal curator error: {message}")]
pub struct InternalError {
    /// Description of the internal error.
    pub message: String,
}

impl InternalError {
    /// Creates a new internal error with the given message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl From<String> for InternalError {
    fn from(message: String) -> Self {
        Self { message }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_format() {
        let err = InternalError::new("index out of sync");
        assert_eq!(format!("{err}"), "internal curator error: index out of sync");
    }

    #[test]
    fn from_string() {
        let err: InternalError = "from string".to_string().into();
        assert_eq!(err.message, "from string");
    }
}
