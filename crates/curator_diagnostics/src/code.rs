//! Log codes with category prefixes for structured identification.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The category of a log code, determining its prefix letter.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
pub enum Category {
    /// File-system scan problems, prefixed with `S`.
    Scan,
    /// Dependency graph problems, prefixed with `D`.
    Dependency,
    /// Transform failures reported by a document manager, prefixed with `T`.
    Transform,
    /// Worker crashes and timeouts, prefixed with `W`.
    Worker,
    /// I/O failures while reading or writing curator files, prefixed with `I`.
    Io,
}

impl Category {
    /// Returns the single-character prefix for this category.
    pub fn prefix(self) -> char {
        match self {
            Category::Scan => 'S',
            Category::Dependency => 'D',
            Category::Transform => 'T',
            Category::Worker => 'W',
            Category::Io => 'I',
        }
    }
}

/// A structured log code combining a category prefix and a numeric identifier.
///
/// Displayed as the category prefix followed by a zero-padded 3-digit number,
/// e.g. `D001`, `W002`.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug, Serialize, Deserialize)]
pub struct LogCode {
    /// The category of this code.
    pub category: Category,
    /// The numeric identifier within the category.
    pub number: u16,
}

impl LogCode {
    /// Creates a new log code.
    pub const fn new(category: Category, number: u16) -> Self {
        Self { category, number }
    }
}

impl fmt::Display for LogCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{:03}", self.category.prefix(), self.number)
    }
}

/// Codes emitted by the curator itself.
pub mod codes {
    use super::{Category, LogCode};

    /// A file could not be read during a scan.
    pub const UNREADABLE_FILE: LogCode = LogCode::new(Category::Scan, 1);
    /// No document manager handles the file's extension.
    pub const UNKNOWN_ASSET_TYPE: LogCode = LogCode::new(Category::Scan, 2);
    /// The document's dependency lists could not be parsed.
    pub const MALFORMED_DOCUMENT: LogCode = LogCode::new(Category::Dependency, 1);
    /// A declared dependency does not resolve.
    pub const MISSING_DEPENDENCY: LogCode = LogCode::new(Category::Dependency, 2);
    /// The asset is part of, or depends on, a dependency cycle.
    pub const CIRCULAR_DEPENDENCY: LogCode = LogCode::new(Category::Dependency, 3);
    /// A transform was skipped because one of its dependencies failed.
    pub const BLOCKED_BY_DEPENDENCY: LogCode = LogCode::new(Category::Dependency, 4);
    /// Two documents declare the same GUID.
    pub const DUPLICATE_GUID: LogCode = LogCode::new(Category::Dependency, 5);
    /// The document manager reported a transform failure.
    pub const TRANSFORM_FAILED: LogCode = LogCode::new(Category::Transform, 1);
    /// The worker running the job crashed.
    pub const WORKER_CRASHED: LogCode = LogCode::new(Category::Worker, 1);
    /// The worker did not report completion in time.
    pub const WORKER_TIMEOUT: LogCode = LogCode::new(Category::Worker, 2);
    /// An output file or directory could not be written.
    pub const WRITE_FAILED: LogCode = LogCode::new(Category::Io, 1);
}
