//! Download history: a capped JSON array on disk, newest first.
//!
//! Best-effort log, not a transactional store; callers already serialize
//! writes through the registry lock, and a corrupt file is treated as empty
//! rather than fatal.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::job::DownloadMode;

/// One successfully completed download.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub title: String,
    #[serde(rename = "type")]
    pub mode: DownloadMode,
}

/// Reads and appends the persisted history file.
#[derive(Debug, Clone)]
pub struct HistoryStore {
    path: PathBuf,
    max_entries: usize,
}

impl HistoryStore {
    pub fn new(path: impl Into<PathBuf>, max_entries: usize) -> Self {
        Self {
            path: path.into(),
            max_entries,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the persisted list; missing or corrupt content reads as empty.
    pub fn load(&self) -> Vec<HistoryEntry> {
        let data = match std::fs::read_to_string(&self.path) {
            Ok(d) => d,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Vec::new(),
            Err(e) => {
                tracing::error!(path = %self.path.display(), "history read failed: {}", e);
                return Vec::new();
            }
        };
        if data.trim().is_empty() {
            return Vec::new();
        }
        match serde_json::from_str(&data) {
            Ok(entries) => entries,
            Err(e) => {
                tracing::error!(path = %self.path.display(), "history parse failed: {}", e);
                Vec::new()
            }
        }
    }

    /// Prepend one entry, truncate to the cap, and rewrite the file.
    pub fn record(&self, entry: HistoryEntry) {
        let mut entries = self.load();
        entries.insert(0, entry);
        entries.truncate(self.max_entries);
        if let Err(e) = self.write(&entries) {
            tracing::error!(path = %self.path.display(), "history write failed: {:#}", e);
        }
    }

    fn write(&self, entries: &[HistoryEntry]) -> anyhow::Result<()> {
        use anyhow::Context;
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("create dir: {}", parent.display()))?;
        }
        let json = serde_json::to_string_pretty(entries).context("serialize history")?;
        std::fs::write(&self.path, json)
            .with_context(|| format!("write history: {}", self.path.display()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store(dir: &tempfile::TempDir, cap: usize) -> HistoryStore {
        HistoryStore::new(dir.path().join("history.json"), cap)
    }

    fn entry(title: &str) -> HistoryEntry {
        HistoryEntry {
            title: title.to_string(),
            mode: DownloadMode::Mp3,
        }
    }

    #[test]
    fn load_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        assert!(store(&dir, 10).load().is_empty());
    }

    #[test]
    fn load_corrupt_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let s = store(&dir, 10);
        std::fs::write(s.path(), "{nonsense").unwrap();
        assert!(s.load().is_empty());
        std::fs::write(s.path(), "   ").unwrap();
        assert!(s.load().is_empty());
    }

    #[test]
    fn record_prepends_newest_first() {
        let dir = tempfile::tempdir().unwrap();
        let s = store(&dir, 10);
        s.record(entry("first"));
        s.record(entry("second"));
        let entries = s.load();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].title, "second");
        assert_eq!(entries[1].title, "first");
    }

    #[test]
    fn record_truncates_to_cap() {
        let dir = tempfile::tempdir().unwrap();
        let s = store(&dir, 3);
        for i in 0..5 {
            s.record(entry(&format!("e{}", i)));
        }
        let entries = s.load();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].title, "e4");
        assert_eq!(entries[2].title, "e2");
    }

    #[test]
    fn mode_serialized_under_type_key() {
        let json = serde_json::to_string(&entry("t")).unwrap();
        assert!(json.contains("\"type\":\"mp3\""), "got {}", json);
    }
}
