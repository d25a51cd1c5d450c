//! Bounded "recent work" log.
//!
//! A plain-text file with one `<RFC3339 timestamp> <text>` entry per line,
//! trimmed to the newest `max_entries` lines on every append.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, SecondsFormat, Utc};

use crate::errors::MemsyncError;
use crate::state_dir::StateDir;
use crate::store::atomic_write;

#[derive(Debug, Clone)]
pub struct ActivityLog {
    path: PathBuf,
    max_entries: usize,
}

impl ActivityLog {
    pub fn new(state: &StateDir, max_entries: usize) -> Self {
        Self {
            path: state.activity_log_path(),
            max_entries,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&self, text: &str) -> Result<(), MemsyncError> {
        self.append_at(text, Utc::now())
    }

    pub fn append_at(&self, text: &str, at: DateTime<Utc>) -> Result<(), MemsyncError> {
        let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
        if flat.is_empty() {
            return Ok(());
        }
        let mut lines = self.read_all();
        lines.push(format!(
            "{} {}",
            at.to_rfc3339_opts(SecondsFormat::Secs, true),
            flat
        ));
        let excess = lines.len().saturating_sub(self.max_entries);
        lines.drain(..excess);

        let mut contents = lines.join("\n");
        if !contents.is_empty() {
            contents.push('\n');
        }
        atomic_write(&self.path, contents.as_bytes())
    }

    /// Up to `limit` newest entries, oldest first.
    pub fn recent(&self, limit: usize) -> Vec<String> {
        let mut lines = self.read_all();
        let skip = lines.len().saturating_sub(limit);
        lines.drain(..skip);
        lines
    }

    pub fn clear(&self) -> Result<(), MemsyncError> {
        if self.path.exists() {
            atomic_write(&self.path, b"")?;
        }
        Ok(())
    }

    fn read_all(&self) -> Vec<String> {
        match fs::read_to_string(&self.path) {
            Ok(raw) => raw
                .lines()
                .filter(|l| !l.trim().is_empty())
                .map(str::to_string)
                .collect(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => {
                tracing::warn!("Failed to read {}: {}", self.path.display(), e);
                Vec::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::TempDir;

    #[test]
    fn test_append_formats_entry() {
        let temp = TempDir::new().unwrap();
        let log = ActivityLog::new(&StateDir::at(temp.path()), 10);
        let at = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        log.append_at("Edited\n  src/main.rs", at).unwrap();

        assert_eq!(log.recent(10), vec!["2024-05-01T12:00:00Z Edited src/main.rs"]);
    }

    #[test]
    fn test_bounded_to_max_entries() {
        let temp = TempDir::new().unwrap();
        let log = ActivityLog::new(&StateDir::at(temp.path()), 3);
        for i in 0..5 {
            log.append(&format!("entry {}", i)).unwrap();
        }
        let recent = log.recent(10);
        assert_eq!(recent.len(), 3);
        assert!(recent[0].ends_with("entry 2"));
        assert!(recent[2].ends_with("entry 4"));

        let last_two = log.recent(2);
        assert!(last_two[0].ends_with("entry 3"));
    }

    #[test]
    fn test_blank_text_ignored_and_clear() {
        let temp = TempDir::new().unwrap();
        let log = ActivityLog::new(&StateDir::at(temp.path()), 3);
        log.append("   ").unwrap();
        assert!(log.recent(5).is_empty());

        log.append("x").unwrap();
        log.clear().unwrap();
        assert!(log.recent(5).is_empty());
    }
}
