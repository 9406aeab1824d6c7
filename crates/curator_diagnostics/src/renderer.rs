//! Rendering backends for human-readable and machine-readable output.

use crate::entry::LogEntry;

/// Trait for rendering log entries into formatted output strings.
pub trait LogRenderer {
    /// Renders a single entry into a formatted string.
    fn render(&self, entry: &LogEntry) -> String;
}

/// Renders entries in a rustc-style terminal format.
///
/// Produces output like:
/// ```text
/// error[T001]: mesh has no vertices
///   --> meshes/box.mesh
///    = note: worker log follows
/// ```
pub struct TerminalRenderer {
    /// Whether to use ANSI color codes in output.
    pub color: bool,
}

impl TerminalRenderer {
    /// Creates a new terminal renderer.
    pub fn new(color: bool) -> Self {
        Self { color }
    }

    fn paint(&self, entry: &LogEntry, text: &str) -> String {
        if !self.color {
            return text.to_string();
        }
        let code = match entry.severity {
            crate::Severity::Error => "31",
            crate::Severity::Warning => "33",
            crate::Severity::Note => "36",
        };
        format!("\x1b[1;{code}m{text}\x1b[0m")
    }
}

impl LogRenderer for TerminalRenderer {
    fn render(&self, entry: &LogEntry) -> String {
        let head = format!("{}[{}]", entry.severity, entry.code);
        let mut out = format!("{}: {}\n", self.paint(entry, &head), entry.message);
        if let Some(path) = &entry.path {
            out.push_str(&format!("  --> {path}\n"));
        }
        for note in &entry.notes {
            out.push_str(&format!("   = note: {note}\n"));
        }
        out
    }
}

/// Renders each entry as one line of JSON.
pub struct JsonRenderer;

impl LogRenderer for JsonRenderer {
    fn render(&self, entry: &LogEntry) -> String {
        serde_json::to_string(entry).unwrap_or_else(|e| format!("{{\"error\":\"{e}\"}}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::code::codes;

    #[test]
    fn terminal_plain() {
        let entry = LogEntry::error(codes::WORKER_CRASHED, "worker exited unexpectedly")
            .with_path("meshes/bad.mesh")
            .with_note("exit status: 101");
        let out = TerminalRenderer::new(false).render(&entry);
        assert!(out.starts_with("error[W001]: worker exited unexpectedly"));
        assert!(out.contains("--> meshes/bad.mesh"));
        assert!(out.contains("= note: exit status: 101"));
    }

    #[test]
    fn terminal_color_wraps_header() {
        let entry = LogEntry::warning(codes::MISSING_DEPENDENCY, "missing");
        let out = TerminalRenderer::new(true).render(&entry);
        assert!(out.contains("\x1b["));
    }

    #[test]
    fn json_roundtrip() {
        let entry = LogEntry::note(codes::BLOCKED_BY_DEPENDENCY, "blocked").with_path("a.mesh");
        let line = JsonRenderer.render(&entry);
        let back: LogEntry = serde_json::from_str(&line).unwrap();
        assert_eq!(back, entry);
    }
}
