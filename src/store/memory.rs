//! Categorization memory: one record per distinct source/filetype group.
//!
//! Entries are insert-only for the automated path. The `notes` field is the
//! user-editable directive channel, so re-runs must never overwrite an
//! existing entry: the first observation wins.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{Result, SweepError};

/// Sentinel category for entries not yet classified by the user.
pub const UNCATEGORIZED: &str = "(uncategorized)";

fn default_category() -> String {
    UNCATEGORIZED.to_string()
}

/// A single categorization record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryEntry {
    /// Sender the group was derived from.
    pub source: String,

    /// Subject line, present only for inline-message entries.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,

    /// File suffix (e.g. ".pdf"), present only for file entries.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filetype: Option<String>,

    /// Opaque summary text from the summarizer adapter.
    pub summary: String,

    /// Whether the summarizer reported tabular/structured content.
    #[serde(default)]
    pub contains_structured_data: bool,

    /// User-assigned category.
    #[serde(default = "default_category")]
    pub category: String,

    /// Free-text notes; doubles as the machine-readable directive channel.
    #[serde(default)]
    pub notes: String,
}

/// Build the memory key for a downloaded file group.
pub fn sender_key(sender: &str, suffix: &str) -> String {
    format!("SENDER::{sender}::{suffix}")
}

/// Build the memory key for inline-message content from a sender.
pub fn message_key(sender: &str) -> String {
    format!("MSG::{sender}")
}

/// Persisted, user-annotatable mapping from grouping key to [`MemoryEntry`].
#[derive(Debug, Default, Clone, PartialEq)]
pub struct CategorizationMemory {
    entries: BTreeMap<String, MemoryEntry>,
}

impl CategorizationMemory {
    /// Load memory from a flat JSON object.
    ///
    /// A missing or corrupt document yields an empty mapping (recoverable).
    pub fn load(path: &Path) -> Self {
        let contents = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "No memory file, starting empty");
                return Self::default();
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to read memory, starting empty");
                return Self::default();
            }
        };

        match serde_json::from_str::<BTreeMap<String, MemoryEntry>>(&contents) {
            Ok(entries) => Self { entries },
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Corrupt memory document, starting empty");
                Self::default()
            }
        }
    }

    /// Save memory, overwriting the backing document.
    pub fn save(&self, path: &Path) -> Result<()> {
        let contents =
            serde_json::to_string_pretty(&self.entries).map_err(|e| SweepError::ProviderData {
                context: "memory serialization".to_string(),
                reason: e.to_string(),
            })?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| SweepError::io(parent, e))?;
        }
        std::fs::write(path, contents).map_err(|e| SweepError::io(path, e))
    }

    /// Insert `entry` under `key` only if the key is not already present.
    ///
    /// Returns whether an insert occurred. First write wins: category and
    /// notes edited by a human are never clobbered by re-runs.
    pub fn upsert_if_absent(&mut self, key: &str, entry: MemoryEntry) -> bool {
        if self.entries.contains_key(key) {
            debug!(key, "Memory key already present, keeping existing entry");
            return false;
        }
        info!(key, source = %entry.source, "New memory entry");
        self.entries.insert(key.to_string(), entry);
        true
    }

    /// Replace or insert an entry unconditionally.
    ///
    /// This is the human annotation path (editing category or notes); the
    /// automated pipeline only ever calls [`upsert_if_absent`].
    ///
    /// [`upsert_if_absent`]: CategorizationMemory::upsert_if_absent
    pub fn set(&mut self, key: &str, entry: MemoryEntry) {
        self.entries.insert(key.to_string(), entry);
    }

    /// Look up an entry by key.
    pub fn get(&self, key: &str) -> Option<&MemoryEntry> {
        self.entries.get(key)
    }

    /// Iterate entries in stable key order.
    pub fn iter(&self) -> impl Iterator<Item = (&String, &MemoryEntry)> {
        self.entries.iter()
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the memory holds no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
