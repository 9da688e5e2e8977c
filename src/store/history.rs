//! Durable record of already-processed messages and attachments.
//!
//! The history store gates the retriever only: a message id or attachment
//! fingerprint, once added, is never removed within a run. The backing
//! document is a JSON object with two array-of-string fields.

use std::collections::BTreeSet;
use std::ops::{Deref, DerefMut};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, error, warn};

use crate::error::{Result, SweepError};

/// On-disk shape of the history document.
#[derive(Debug, Default, Serialize, Deserialize)]
struct HistoryDoc {
    #[serde(default)]
    message_ids: Vec<String>,
    #[serde(default)]
    attachments: Vec<String>,
}

/// In-memory history of seen message ids and attachment fingerprint keys.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct History {
    seen_messages: BTreeSet<String>,
    seen_attachments: BTreeSet<String>,
}

impl History {
    /// Load history from a JSON document.
    ///
    /// A missing or malformed document is recoverable: it yields an empty
    /// record. The corrupt file is overwritten on the next successful save.
    pub fn load(path: &Path) -> Self {
        let contents = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "No history file, starting empty");
                return Self::default();
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to read history, starting empty");
                return Self::default();
            }
        };

        match serde_json::from_str::<HistoryDoc>(&contents) {
            Ok(doc) => Self {
                seen_messages: doc.message_ids.into_iter().collect(),
                seen_attachments: doc.attachments.into_iter().collect(),
            },
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Corrupt history document, starting empty");
                Self::default()
            }
        }
    }

    /// Persist the history, overwriting the backing document.
    pub fn persist(&self, path: &Path) -> Result<()> {
        let doc = HistoryDoc {
            message_ids: self.seen_messages.iter().cloned().collect(),
            attachments: self.seen_attachments.iter().cloned().collect(),
        };
        let contents = serde_json::to_string_pretty(&doc).map_err(|e| SweepError::ProviderData {
            context: "history serialization".to_string(),
            reason: e.to_string(),
        })?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| SweepError::io(parent, e))?;
        }
        std::fs::write(path, contents).map_err(|e| SweepError::io(path, e))?;
        debug!(
            path = %path.display(),
            messages = self.seen_messages.len(),
            attachments = self.seen_attachments.len(),
            "History persisted"
        );
        Ok(())
    }

    /// Record a message id as processed.
    pub fn mark_message(&mut self, message_id: &str) {
        self.seen_messages.insert(message_id.to_string());
    }

    /// Whether a message id was already processed.
    pub fn contains_message(&self, message_id: &str) -> bool {
        self.seen_messages.contains(message_id)
    }

    /// Record an attachment fingerprint key as downloaded.
    pub fn mark_attachment(&mut self, fingerprint_key: &str) {
        self.seen_attachments.insert(fingerprint_key.to_string());
    }

    /// Whether an attachment fingerprint key was already downloaded.
    pub fn contains_attachment(&self, fingerprint_key: &str) -> bool {
        self.seen_attachments.contains(fingerprint_key)
    }

    /// Number of recorded message ids.
    pub fn message_count(&self) -> usize {
        self.seen_messages.len()
    }

    /// Number of recorded attachment fingerprint keys.
    pub fn attachment_count(&self) -> usize {
        self.seen_attachments.len()
    }
}

/// Scoped guard ensuring history is persisted on every exit path.
///
/// A retrieval run mutates history through the guard; when the guard is
/// dropped (normal return, `?` propagation, or panic unwind) whatever was
/// recorded so far is flushed to disk. Call [`HistoryGuard::persist`] to
/// surface write errors explicitly instead of relying on `Drop`.
#[derive(Debug)]
pub struct HistoryGuard {
    history: History,
    path: PathBuf,
    persisted: bool,
}

impl HistoryGuard {
    /// Load history from `path` and arm the save-on-exit guard.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        Self {
            history: History::load(&path),
            path,
            persisted: false,
        }
    }

    /// Persist now, consuming the guard and reporting write errors.
    pub fn persist(mut self) -> Result<()> {
        self.persisted = true;
        self.history.persist(&self.path)
    }
}

impl Deref for HistoryGuard {
    type Target = History;

    fn deref(&self) -> &History {
        &self.history
    }
}

impl DerefMut for HistoryGuard {
    fn deref_mut(&mut self) -> &mut History {
        &mut self.history
    }
}

impl Drop for HistoryGuard {
    fn drop(&mut self) {
        if !self.persisted {
            if let Err(e) = self.history.persist(&self.path) {
                error!(path = %self.path.display(), error = %e, "Failed to persist history on exit");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_missing_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let history = History::load(&dir.path().join("absent.json"));
        assert_eq!(history.message_count(), 0);
        assert_eq!(history.attachment_count(), 0);
    }

    #[test]
    fn test_load_corrupt_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.json");
        std::fs::write(&path, "{not json").unwrap();
        let history = History::load(&path);
        assert_eq!(history.message_count(), 0);
    }

    #[test]
    fn test_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.json");

        let mut history = History::default();
        history.mark_message("m1");
        history.mark_message("m2");
        history.mark_attachment("abc");
        history.persist(&path).unwrap();

        let reloaded = History::load(&path);
        assert_eq!(reloaded, history);
        assert!(reloaded.contains_message("m1"));
        assert!(reloaded.contains_attachment("abc"));
        assert!(!reloaded.contains_message("m3"));
    }

    #[test]
    fn test_marks_are_idempotent() {
        let mut history = History::default();
        history.mark_message("m1");
        history.mark_message("m1");
        assert_eq!(history.message_count(), 1);
    }

    #[test]
    fn test_guard_persists_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.json");

        {
            let mut guard = HistoryGuard::load(&path);
            guard.mark_message("m1");
            guard.mark_attachment("f1");
            // No explicit persist; Drop must flush.
        }

        let reloaded = History::load(&path);
        assert!(reloaded.contains_message("m1"));
        assert!(reloaded.contains_attachment("f1"));
    }

    #[test]
    fn test_guard_persists_on_panic() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.json");
        let path_clone = path.clone();

        let result = std::panic::catch_unwind(move || {
            let mut guard = HistoryGuard::load(&path_clone);
            guard.mark_message("m-panic");
            panic!("mid-run failure");
        });
        assert!(result.is_err());

        let reloaded = History::load(&path);
        assert!(reloaded.contains_message("m-panic"));
    }

    #[test]
    fn test_explicit_persist_skips_drop() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.json");

        let mut guard = HistoryGuard::load(&path);
        guard.mark_message("m1");
        guard.persist().unwrap();

        assert!(History::load(&path).contains_message("m1"));
    }
}
