//! Per-run result logs.
//!
//! Each tool appends one entry per run to its results document. The document
//! is a single JSON object keyed by RFC 3339 timestamp: existing entries are
//! loaded, the new run is merged in, and the whole file is overwritten, so
//! the document stays valid JSON across any number of runs.

use std::collections::BTreeMap;
use std::path::Path;

use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::error::{Result, SweepError};
use crate::retriever::DownloadedAttachment;

/// Load the full run-log document (timestamp → run record).
pub fn load_runs(path: &Path) -> BTreeMap<String, Value> {
    let contents = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return BTreeMap::new(),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Failed to read run log, starting empty");
            return BTreeMap::new();
        }
    };

    match serde_json::from_str::<BTreeMap<String, Value>>(&contents) {
        Ok(runs) => runs,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Corrupt run log, starting empty");
            BTreeMap::new()
        }
    }
}

/// Merge a new run entry into the log and overwrite the document.
pub fn append_run<T: Serialize>(path: &Path, record: &T) -> Result<()> {
    let mut runs = load_runs(path);
    let key = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);
    let value = serde_json::to_value(record).map_err(|e| SweepError::ProviderData {
        context: "run log serialization".to_string(),
        reason: e.to_string(),
    })?;
    runs.insert(key, value);

    let contents = serde_json::to_string_pretty(&runs).map_err(|e| SweepError::ProviderData {
        context: "run log serialization".to_string(),
        reason: e.to_string(),
    })?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| SweepError::io(parent, e))?;
    }
    std::fs::write(path, contents).map_err(|e| SweepError::io(path, e))?;
    info!(path = %path.display(), runs = runs.len(), "Run log written");
    Ok(())
}

/// Flatten all recorded download runs into provenance for the analyzer:
/// storage name → (subject, sender).
pub fn load_download_context(path: &Path) -> BTreeMap<String, (String, String)> {
    let mut context = BTreeMap::new();
    for (run_key, run) in load_runs(path) {
        let Some(downloads) = run.get("downloads").and_then(Value::as_array) else {
            debug!(run = %run_key, "Run entry without downloads, skipping");
            continue;
        };
        for item in downloads {
            match serde_json::from_value::<DownloadedAttachment>(item.clone()) {
                Ok(att) => {
                    context.insert(att.storage_name, (att.subject, att.sender));
                }
                Err(e) => {
                    debug!(run = %run_key, error = %e, "Malformed download record, skipping");
                }
            }
        }
    }
    context
}
