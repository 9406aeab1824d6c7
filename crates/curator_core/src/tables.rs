//! Asset lookup tables consumed by the runtime.
//!
//! One table per data directory per profile, stored at
//! `<output>/<profile>/<alias>.table`. Each line is
//! `<guid-hex> <relative-output-path>`, sorted by GUID so that regenerating an
//! unchanged project produces byte-identical files.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use curator_common::Guid;
use tracing::warn;

use crate::error::CuratorError;

/// Extension of lookup table files.
pub const TABLE_EXTENSION: &str = "table";

/// Path of the table for one data directory below a profile directory.
pub fn table_path(profile_dir: &Path, alias: &str) -> PathBuf {
    profile_dir.join(format!("{alias}.{TABLE_EXTENSION}"))
}

/// Renders a table.
pub fn render_table(entries: &BTreeMap<Guid, String>) -> String {
    let mut out = String::new();
    for (guid, path) in entries {
        out.push_str(&guid.to_string());
        out.push(' ');
        out.push_str(path);
        out.push('\n');
    }
    out
}

/// Parses a table. Blank lines are ignored; malformed lines are skipped with
/// a warning.
pub fn parse_table(text: &str) -> BTreeMap<Guid, String> {
    let mut entries = BTreeMap::new();
    for (index, line) in text.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let parsed = line
            .split_once(' ')
            .and_then(|(guid, path)| Some((Guid::parse(guid).ok()?, path)));
        match parsed {
            Some((guid, path)) if !path.is_empty() => {
                entries.insert(guid, path.to_string());
            }
            _ => warn!(line = index + 1, "skipping malformed lookup table line"),
        }
    }
    entries
}

/// Writes a table, replacing any previous file atomically.
pub fn write_table(path: &Path, entries: &BTreeMap<Guid, String>) -> Result<(), CuratorError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| CuratorError::io(parent, e))?;
    }
    let mut temp = path.as_os_str().to_os_string();
    temp.push(".tmp");
    let temp = PathBuf::from(temp);
    std::fs::write(&temp, render_table(entries)).map_err(|e| CuratorError::io(&temp, e))?;
    std::fs::rename(&temp, path).map_err(|e| CuratorError::io(path, e))
}

/// Reads a table written by [`write_table`].
pub fn read_table(path: &Path) -> Result<BTreeMap<Guid, String>, CuratorError> {
    let text = std::fs::read_to_string(path).map_err(|e| CuratorError::io(path, e))?;
    Ok(parse_table(&text))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> BTreeMap<Guid, String> {
        let mut entries = BTreeMap::new();
        entries.insert(Guid::from_u128(0xbeef), "project/b.plMesh".to_string());
        entries.insert(Guid::from_u128(0x1), "project/a b.plMesh#lod 1".to_string());
        entries
    }

    #[test]
    fn lines_are_sorted_by_guid() {
        let text = render_table(&sample());
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("00000000000000000000000000000001 "));
        assert!(lines[1].ends_with(" project/b.plMesh"));
    }

    #[test]
    fn paths_with_spaces_survive_parsing() {
        assert_eq!(parse_table(&render_table(&sample())), sample());
    }

    #[test]
    fn malformed_lines_are_skipped() {
        let text = "not-a-guid foo\n\n00000000000000000000000000000002\n00000000000000000000000000000003 ok\n";
        let parsed = parse_table(text);
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[&Guid::from_u128(3)], "ok");
    }

    #[test]
    fn write_then_read_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = table_path(&dir.path().join("Default"), "project");
        write_table(&path, &sample()).unwrap();
        assert!(path.ends_with("Default/project.table"));
        assert_eq!(read_table(&path).unwrap(), sample());
    }

    #[test]
    fn unwritable_location_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("Default");
        std::fs::write(&blocker, b"a file, not a directory").unwrap();
        let err = write_table(&table_path(&blocker, "project"), &sample()).unwrap_err();
        assert!(matches!(err, CuratorError::Io { .. }));
    }
}
