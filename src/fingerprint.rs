//! Content fingerprints for attachment deduplication.
//!
//! A fingerprint is the lowercase hex SHA-256 digest of the raw payload.
//! It doubles as the dedup key in the history store and as the prefix of
//! the on-disk storage name, so two distinct attachments sharing a filename
//! never collide.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Compute the SHA-256 fingerprint of a byte payload as a hex string.
///
/// Deterministic, accepts any input including empty.
pub fn fingerprint(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}

/// How attachment fingerprints are keyed in the history store.
///
/// `Global` deduplicates identical content across all messages: the same
/// report attached to two different mails is downloaded once. `PerMessage`
/// scopes the key to the delivering message, so each message contributes
/// its own copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FingerprintScope {
    /// Bare digest: one download per distinct content anywhere.
    #[default]
    Global,
    /// `{message_id}:{digest}`: one download per (message, content) pair.
    PerMessage,
}

impl FingerprintScope {
    /// Build the history-store key for an attachment digest.
    pub fn key(self, message_id: &str, digest: &str) -> String {
        match self {
            Self::Global => digest.to_string(),
            Self::PerMessage => format!("{message_id}:{digest}"),
        }
    }
}

/// Derive the on-disk filename for a downloaded attachment.
///
/// Format: `{digest}_{sanitized_original_name}`.
pub fn storage_name(digest: &str, original_name: &str) -> String {
    format!("{digest}_{}", sanitize_filename_part(original_name, 150))
}

/// Sanitize a string for use in filenames.
///
/// Replaces invalid characters with `_` and truncates to `max_len`.
pub fn sanitize_filename_part(s: &str, max_len: usize) -> String {
    let sanitized: String = s
        .chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '-' || c == '.' || c == '_' || c == '@' {
                c
            } else {
                '_'
            }
        })
        .take(max_len)
        .collect();

    if sanitized.is_empty() {
        "unknown".to_string()
    } else {
        sanitized
    }
}
