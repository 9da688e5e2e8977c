//! Log of files whose content could not be extracted or summarized,
//! retained for manual triage.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{Result, SweepError};
use crate::store::memory::{sender_key, CategorizationMemory};

/// One file awaiting manual follow-up.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnhandledEntry {
    /// Storage name of the file in the download directory.
    pub filename: String,
    /// File suffix (e.g. ".zip").
    pub filetype: String,
    /// Subject of the delivering message.
    pub subject: String,
    /// Sender of the delivering message.
    pub sender: String,
    /// Unix timestamp (seconds) of when the file was first recorded.
    pub timestamp: f64,
}

/// Persisted list of unhandled entries, deduplicated by full field equality.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct UnhandledLog {
    entries: Vec<UnhandledEntry>,
}

impl UnhandledLog {
    /// Load from a JSON array; missing or corrupt documents yield an empty log.
    pub fn load(path: &Path) -> Self {
        let contents = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "No unhandled file, starting empty");
                return Self::default();
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to read unhandled log, starting empty");
                return Self::default();
            }
        };

        match serde_json::from_str::<Vec<UnhandledEntry>>(&contents) {
            Ok(entries) => Self { entries },
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Corrupt unhandled log, starting empty");
                Self::default()
            }
        }
    }

    /// Save, overwriting the backing document.
    pub fn save(&self, path: &Path) -> Result<()> {
        let contents =
            serde_json::to_string_pretty(&self.entries).map_err(|e| SweepError::ProviderData {
                context: "unhandled serialization".to_string(),
                reason: e.to_string(),
            })?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| SweepError::io(parent, e))?;
        }
        std::fs::write(path, contents).map_err(|e| SweepError::io(path, e))
    }

    /// Record an entry unless an identical one already exists.
    pub fn record(&mut self, entry: UnhandledEntry) -> bool {
        if self.entries.contains(&entry) {
            return false;
        }
        info!(filename = %entry.filename, filetype = %entry.filetype, "Recorded unhandled file");
        self.entries.push(entry);
        true
    }

    /// Drop entries whose memory key now carries a non-empty `notes` field,
    /// evidence that a human has triaged the group.
    pub fn prune_handled(&mut self, memory: &CategorizationMemory) -> usize {
        let before = self.entries.len();
        self.entries.retain(|entry| {
            let key = sender_key(&entry.sender, &entry.filetype);
            match memory.get(&key) {
                Some(record) if !record.notes.trim().is_empty() => {
                    info!(filename = %entry.filename, key, "Unhandled entry handled, removing");
                    false
                }
                _ => true,
            }
        });
        before - self.entries.len()
    }

    /// Entries currently awaiting triage.
    pub fn entries(&self) -> &[UnhandledEntry] {
        &self.entries
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the log holds no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::memory::{MemoryEntry, UNCATEGORIZED};

    fn entry(filename: &str) -> UnhandledEntry {
        UnhandledEntry {
            filename: filename.to_string(),
            filetype: ".zip".to_string(),
            subject: "archive".to_string(),
            sender: "a@b.c".to_string(),
            timestamp: 1_700_000_000.0,
        }
    }

    #[test]
    fn test_record_deduplicates_identical_entries() {
        let mut log = UnhandledLog::default();
        assert!(log.record(entry("x.zip")));
        assert!(!log.record(entry("x.zip")));
        assert_eq!(log.len(), 1);
    }

    #[test]
    fn test_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("unhandled.json");

        let mut log = UnhandledLog::default();
        log.record(entry("x.zip"));
        log.save(&path).unwrap();

        assert_eq!(UnhandledLog::load(&path), log);
    }

    #[test]
    fn test_prune_removes_handled_entries() {
        let mut log = UnhandledLog::default();
        log.record(entry("x.zip"));
        log.record(UnhandledEntry {
            sender: "other@b.c".to_string(),
            ..entry("y.zip")
        });

        let mut memory = CategorizationMemory::default();
        memory.upsert_if_absent(
            &sender_key("a@b.c", ".zip"),
            MemoryEntry {
                source: "a@b.c".to_string(),
                subject: None,
                filetype: Some(".zip".to_string()),
                summary: "[Binary file type: .zip]".to_string(),
                contains_structured_data: false,
                category: UNCATEGORIZED.to_string(),
                notes: "extract manually".to_string(),
            },
        );

        assert_eq!(log.prune_handled(&memory), 1);
        assert_eq!(log.len(), 1);
        assert_eq!(log.entries()[0].sender, "other@b.c");
    }

    #[test]
    fn test_prune_keeps_entries_with_empty_notes() {
        let mut log = UnhandledLog::default();
        log.record(entry("x.zip"));

        let mut memory = CategorizationMemory::default();
        memory.upsert_if_absent(
            &sender_key("a@b.c", ".zip"),
            MemoryEntry {
                source: "a@b.c".to_string(),
                subject: None,
                filetype: Some(".zip".to_string()),
                summary: String::new(),
                contains_structured_data: false,
                category: UNCATEGORIZED.to_string(),
                notes: "   ".to_string(),
            },
        );

        assert_eq!(log.prune_handled(&memory), 0);
        assert_eq!(log.len(), 1);
    }
}
