//! Structured per-asset log entries, severity management, and rendering.
//!
//! The curator attaches [`LogEntry`] values to assets so that a UI can drill
//! down into why an asset failed to transform or why a dependency is missing.
//! [`LogRenderer`] implementations format them for a terminal or as JSON.

#![warn(missing_docs)]

pub mod code;
pub mod entry;
pub mod renderer;
pub mod severity;

pub use code::{codes, Category, LogCode};
pub use entry::LogEntry;
pub use renderer::{JsonRenderer, LogRenderer, TerminalRenderer};
pub use severity::Severity;
