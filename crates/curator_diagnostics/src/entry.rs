//! Structured log entries attached to assets.

use crate::code::LogCode;
use crate::severity::Severity;
use serde::{Deserialize, Serialize};

/// A structured log message attached to an asset for drill-down.
///
/// Entries are plain values: they carry the asset's data-dir-relative path as
/// a string rather than a reference into curator state, so they remain valid
/// after the curator lock is released.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    /// The severity level of this entry.
    pub severity: Severity,
    /// The code identifying the kind of entry.
    pub code: LogCode,
    /// The main message.
    pub message: String,
    /// The asset or file this entry is about, if any.
    pub path: Option<String>,
    /// Additional context lines (e.g. the members of a cycle).
    pub notes: Vec<String>,
}

impl LogEntry {
    /// Creates an error entry.
    pub fn error(code: LogCode, message: impl Into<String>) -> Self {
        Self::new(Severity::Error, code, message)
    }

    /// Creates a warning entry.
    pub fn warning(code: LogCode, message: impl Into<String>) -> Self {
        Self::new(Severity::Warning, code, message)
    }

    /// Creates a note entry.
    pub fn note(code: LogCode, message: impl Into<String>) -> Self {
        Self::new(Severity::Note, code, message)
    }

    fn new(severity: Severity, code: LogCode, message: impl Into<String>) -> Self {
        Self {
            severity,
            code,
            message: message.into(),
            path: None,
            notes: Vec::new(),
        }
    }

    /// Sets the asset path this entry is about.
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Adds a note to this entry.
    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.notes.push(note.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::code::codes;

    #[test]
    fn create_error() {
        let entry = LogEntry::error(codes::TRANSFORM_FAILED, "mesh has no vertices");
        assert_eq!(entry.severity, Severity::Error);
        assert_eq!(entry.message, "mesh has no vertices");
        assert_eq!(format!("{}", entry.code), "T001");
        assert!(entry.path.is_none());
    }

    #[test]
    fn builder_methods() {
        let entry = LogEntry::warning(codes::CIRCULAR_DEPENDENCY, "cycle detected")
            .with_path("scenes/a.scene")
            .with_note("scenes/a.scene")
            .with_note("scenes/b.scene");
        assert_eq!(entry.path.as_deref(), Some("scenes/a.scene"));
        assert_eq!(entry.notes.len(), 2);
    }
}
