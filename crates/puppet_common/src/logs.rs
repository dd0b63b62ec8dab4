//! Plain-text workflow logs.
//!
//! Workflows write these files and the front end reads them back. A missing
//! log is normal (nothing ran yet), not an error.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::Path;

/// Shown in place of a log that does not exist yet
pub const NO_LOG: &str = "No log found...";

/// Read a log, falling back to [`NO_LOG`]
pub fn read_log(path: &Path) -> String {
    read_log_or(path, NO_LOG)
}

/// Read a log, falling back to `fallback`
pub fn read_log_or(path: &Path, fallback: &str) -> String {
    fs::read_to_string(path).unwrap_or_else(|_| fallback.to_string())
}

/// Remove a log if present
pub fn remove_log(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}

/// Replace a log's contents
pub fn write_log(path: &Path, content: &str) -> io::Result<()> {
    fs::write(path, content)
}

/// Append one line, creating the log if needed
pub fn append_log(path: &Path, line: &str) -> io::Result<()> {
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    writeln!(file, "{}", line)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_log() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("absent.log");
        assert_eq!(read_log(&path), NO_LOG);
        assert_eq!(read_log_or(&path, ""), "");
        remove_log(&path).unwrap();
    }

    #[test]
    fn test_append_and_remove() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("update.log");
        append_log(&path, "Faking some install...").unwrap();
        append_log(&path, "done").unwrap();
        assert_eq!(read_log(&path), "Faking some install...\ndone\n");

        remove_log(&path).unwrap();
        assert!(!path.exists());
    }
}
