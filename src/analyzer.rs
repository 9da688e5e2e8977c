//! File and message analysis.
//!
//! Extracts text from downloaded files (or marks them unhandled), obtains a
//! structured summary through the summarizer boundary, writes a per-item
//! analysis document, and records one categorization-memory entry per
//! distinct (sender, filetype) group. Per-item failures never abort the
//! batch.

use std::collections::BTreeMap;
use std::path::Path;

use chrono::Utc;
use serde_json::json;
use tracing::{debug, info, warn};

use crate::config::Paths;
use crate::error::{Result, SweepError};
use crate::retriever::FetchedMessage;
use crate::store::memory::{message_key, sender_key, CategorizationMemory, MemoryEntry, UNCATEGORIZED};
use crate::store::runlog;
use crate::store::unhandled::{UnhandledEntry, UnhandledLog};
use crate::summarizer::{summarize_or_degrade, Summarizer, Summary};

/// Suffixes read directly as text.
const TEXT_SUFFIXES: &[&str] = &[".txt", ".html", ".csv", ".log"];

/// Suffixes recognized as binary payloads not worth sending to the summarizer.
const BINARY_SUFFIXES: &[&str] = &[".jpg", ".jpeg", ".png", ".gif", ".zip", ".rar", ".pdf", ".xls", ".xlsx"];

/// Counters for one analysis run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct AnalysisOutcome {
    /// Files analyzed this run.
    pub files_analyzed: usize,
    /// Inline messages analyzed this run.
    pub messages_analyzed: usize,
    /// Items skipped because an analysis document already exists.
    pub already_analyzed: usize,
    /// Files routed to the unhandled log.
    pub unhandled_recorded: usize,
}

/// Extraction result for one file.
enum Extracted {
    /// Readable text, eligible for summarization.
    Text(String),
    /// A non-extractable type; the marker becomes the summary verbatim.
    Marker(String),
}

/// Analyze every unprocessed download and fetched message.
pub fn run_analysis(
    summarizer: &dyn Summarizer,
    paths: &Paths,
    memory: &mut CategorizationMemory,
    unhandled: &mut UnhandledLog,
) -> Result<AnalysisOutcome> {
    info!("Starting analysis");
    std::fs::create_dir_all(&paths.analysis).map_err(|e| SweepError::io(&paths.analysis, e))?;

    let context = runlog::load_download_context(&paths.download_runlog());
    let mut outcome = AnalysisOutcome::default();

    let mut files: Vec<_> = std::fs::read_dir(&paths.downloads)
        .map_err(|e| SweepError::io(&paths.downloads, e))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.is_file())
        .collect();
    files.sort();

    for file in files {
        let stem = file
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        if analysis_exists(paths, &stem) {
            debug!(file = %file.display(), "Already analyzed");
            outcome.already_analyzed += 1;
            continue;
        }
        analyze_file(summarizer, paths, &context, &file, memory, unhandled, &mut outcome);
    }

    for message in load_fetched_messages(&paths.fetch_runlog()) {
        if analysis_exists(paths, &message.message_id) {
            debug!(message = %message.message_id, "Already analyzed");
            outcome.already_analyzed += 1;
            continue;
        }
        analyze_message(summarizer, paths, &message, memory);
        outcome.messages_analyzed += 1;
    }

    info!(
        files = outcome.files_analyzed,
        messages = outcome.messages_analyzed,
        skipped = outcome.already_analyzed,
        unhandled = outcome.unhandled_recorded,
        "Analysis complete"
    );
    Ok(outcome)
}

fn analysis_exists(paths: &Paths, stem: &str) -> bool {
    paths.analysis.join(format!("{stem}.analysis.json")).exists()
}

fn analyze_file(
    summarizer: &dyn Summarizer,
    paths: &Paths,
    context: &BTreeMap<String, (String, String)>,
    file: &Path,
    memory: &mut CategorizationMemory,
    unhandled: &mut UnhandledLog,
    outcome: &mut AnalysisOutcome,
) {
    let filename = file
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    info!(file = %filename, "Analyzing file");

    let suffix = file_suffix(file);
    let (subject, sender) = context
        .get(&filename)
        .cloned()
        .unwrap_or_else(|| ("(unknown)".to_string(), "(unknown)".to_string()));

    let extracted = extract_content(file, &suffix);
    if matches!(extracted, Extracted::Marker(_)) {
        let recorded = unhandled.record(UnhandledEntry {
            filename: filename.clone(),
            filetype: suffix.clone(),
            subject: subject.clone(),
            sender: sender.clone(),
            timestamp: Utc::now().timestamp() as f64,
        });
        if recorded {
            outcome.unhandled_recorded += 1;
        }
    }

    let summary = match &extracted {
        Extracted::Text(text) => {
            summarize_or_degrade(summarizer, text, &filename)
        }
        Extracted::Marker(marker) => Summary {
            summary: marker.clone(),
            contains_structured_data: false,
            notes: "Skipped summarization.".to_string(),
        },
    };

    let stem = file
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    save_analysis(
        paths,
        &stem,
        &json!({
            "filename": filename,
            "timestamp": Utc::now().timestamp() as f64,
            "filetype": suffix,
            "subject": subject,
            "sender": sender,
            "summary": summary.summary,
            "contains_structured_data": summary.contains_structured_data,
            "notes": summary.notes,
        }),
    );

    memory.upsert_if_absent(
        &sender_key(&sender, &suffix),
        MemoryEntry {
            source: sender,
            subject: None,
            filetype: Some(suffix),
            summary: summary.summary,
            contains_structured_data: summary.contains_structured_data,
            category: UNCATEGORIZED.to_string(),
            notes: String::new(),
        },
    );
    outcome.files_analyzed += 1;
}

fn analyze_message(
    summarizer: &dyn Summarizer,
    paths: &Paths,
    message: &FetchedMessage,
    memory: &mut CategorizationMemory,
) {
    info!(message = %message.message_id, "Analyzing message");
    let identifier = format!("{}.txt", message.message_id);
    let summary = summarize_or_degrade(summarizer, &message.body, &identifier);

    save_analysis(
        paths,
        &message.message_id,
        &json!({
            "message_id": message.message_id,
            "timestamp": Utc::now().timestamp() as f64,
            "filetype": "inline-message",
            "subject": message.subject,
            "sender": message.sender,
            "summary": summary.summary,
            "contains_structured_data": summary.contains_structured_data,
            "notes": summary.notes,
        }),
    );

    memory.upsert_if_absent(
        &message_key(&message.sender),
        MemoryEntry {
            source: message.sender.clone(),
            subject: Some(message.subject.clone()),
            filetype: None,
            summary: summary.summary,
            contains_structured_data: summary.contains_structured_data,
            category: UNCATEGORIZED.to_string(),
            notes: String::new(),
        },
    );
}

/// Lowercased dot-prefixed suffix, empty when the file has no extension.
fn file_suffix(file: &Path) -> String {
    file.extension()
        .map(|e| format!(".{}", e.to_string_lossy().to_lowercase()))
        .unwrap_or_default()
}

/// Extract readable text or classify the file as non-extractable.
fn extract_content(file: &Path, suffix: &str) -> Extracted {
    if TEXT_SUFFIXES.contains(&suffix) {
        return match std::fs::read(file) {
            Ok(bytes) => Extracted::Text(String::from_utf8_lossy(&bytes).into_owned()),
            Err(e) => {
                warn!(file = %file.display(), error = %e, "Read failed");
                Extracted::Marker(format!("[Unreadable file: {suffix}]"))
            }
        };
    }
    if BINARY_SUFFIXES.contains(&suffix) {
        info!(file = %file.display(), "Binary file type, skipping extraction");
        return Extracted::Marker(format!("[Binary file type: {suffix}]"));
    }
    warn!(file = %file.display(), "Unsupported file type");
    Extracted::Marker(format!("[Unsupported file type: {suffix}]"))
}

/// Write an analysis document; failures are logged, never fatal.
fn save_analysis(paths: &Paths, stem: &str, analysis: &serde_json::Value) {
    let path = paths.analysis.join(format!("{stem}.analysis.json"));
    match serde_json::to_string_pretty(analysis) {
        Ok(contents) => {
            if let Err(e) = std::fs::write(&path, contents) {
                warn!(path = %path.display(), error = %e, "Failed to save analysis");
            } else {
                info!(path = %path.display(), "Saved analysis");
            }
        }
        Err(e) => warn!(stem, error = %e, "Analysis serialization failed"),
    }
}

/// Flatten fetched messages out of all recorded query-fetcher runs.
fn load_fetched_messages(path: &Path) -> Vec<FetchedMessage> {
    let mut messages = Vec::new();
    for (run_key, run) in runlog::load_runs(path) {
        let Some(saved) = run.get("messages_saved").and_then(|v| v.as_array()) else {
            continue;
        };
        for item in saved {
            match serde_json::from_value::<FetchedMessage>(item.clone()) {
                Ok(m) => messages.push(m),
                Err(e) => debug!(run = %run_key, error = %e, "Malformed message record, skipping"),
            }
        }
    }
    messages
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::error::SweepError;
    use std::cell::RefCell;
    use std::path::PathBuf;

    /// Summarizer double recording every call.
    struct StubSummarizer {
        calls: RefCell<Vec<String>>,
        fail: bool,
    }

    impl StubSummarizer {
        fn new() -> Self {
            Self {
                calls: RefCell::new(Vec::new()),
                fail: false,
            }
        }

        fn failing() -> Self {
            Self {
                calls: RefCell::new(Vec::new()),
                fail: true,
            }
        }
    }

    impl Summarizer for StubSummarizer {
        fn summarize(&self, _text: &str, identifier: &str) -> crate::error::Result<Summary> {
            self.calls.borrow_mut().push(identifier.to_string());
            if self.fail {
                return Err(SweepError::Summarizer {
                    identifier: identifier.to_string(),
                    reason: "simulated".to_string(),
                });
            }
            Ok(Summary {
                summary: format!("summary of {identifier}"),
                contains_structured_data: false,
                notes: String::new(),
            })
        }
    }

    fn test_paths(root: &Path) -> Paths {
        let mut config = Config::default();
        config.general.data_dir = Some(PathBuf::from(root));
        let paths = Paths::from_config(&config);
        paths.ensure_directories().unwrap();
        paths
    }

    #[test]
    fn test_text_file_gets_summarized_into_memory() {
        let dir = tempfile::tempdir().unwrap();
        let paths = test_paths(dir.path());
        std::fs::write(paths.downloads.join("abc_notes.txt"), "meeting notes").unwrap();

        let summarizer = StubSummarizer::new();
        let mut memory = CategorizationMemory::default();
        let mut unhandled = UnhandledLog::default();

        let outcome = run_analysis(&summarizer, &paths, &mut memory, &mut unhandled).unwrap();

        assert_eq!(outcome.files_analyzed, 1);
        assert_eq!(summarizer.calls.borrow().len(), 1);
        let entry = memory.get(&sender_key("(unknown)", ".txt")).unwrap();
        assert_eq!(entry.summary, "summary of abc_notes.txt");
        assert!(paths.analysis.join("abc_notes.analysis.json").exists());
    }

    #[test]
    fn test_binary_file_is_recorded_unhandled_without_summarizer_call() {
        let dir = tempfile::tempdir().unwrap();
        let paths = test_paths(dir.path());
        std::fs::write(paths.downloads.join("abc_scan.pdf"), b"%PDF-1.7").unwrap();

        let summarizer = StubSummarizer::new();
        let mut memory = CategorizationMemory::default();
        let mut unhandled = UnhandledLog::default();

        let outcome = run_analysis(&summarizer, &paths, &mut memory, &mut unhandled).unwrap();

        assert_eq!(outcome.unhandled_recorded, 1);
        assert!(summarizer.calls.borrow().is_empty());
        // The memory entry still exists so the user can attach a directive.
        let entry = memory.get(&sender_key("(unknown)", ".pdf")).unwrap();
        assert_eq!(entry.summary, "[Binary file type: .pdf]");
        assert_eq!(unhandled.entries()[0].filename, "abc_scan.pdf");
    }

    #[test]
    fn test_second_run_skips_analyzed_files() {
        let dir = tempfile::tempdir().unwrap();
        let paths = test_paths(dir.path());
        std::fs::write(paths.downloads.join("abc_notes.txt"), "text").unwrap();

        let summarizer = StubSummarizer::new();
        let mut memory = CategorizationMemory::default();
        let mut unhandled = UnhandledLog::default();

        run_analysis(&summarizer, &paths, &mut memory, &mut unhandled).unwrap();
        let second = run_analysis(&summarizer, &paths, &mut memory, &mut unhandled).unwrap();

        assert_eq!(second.files_analyzed, 0);
        assert_eq!(second.already_analyzed, 1);
        assert_eq!(summarizer.calls.borrow().len(), 1);
    }

    #[test]
    fn test_summarizer_failure_degrades_but_still_records() {
        let dir = tempfile::tempdir().unwrap();
        let paths = test_paths(dir.path());
        std::fs::write(paths.downloads.join("abc_data.csv"), "a,b\n1,2").unwrap();

        let summarizer = StubSummarizer::failing();
        let mut memory = CategorizationMemory::default();
        let mut unhandled = UnhandledLog::default();

        let outcome = run_analysis(&summarizer, &paths, &mut memory, &mut unhandled).unwrap();

        assert_eq!(outcome.files_analyzed, 1);
        let entry = memory.get(&sender_key("(unknown)", ".csv")).unwrap();
        // Degraded record carries the raw content.
        assert_eq!(entry.summary, "a,b\n1,2");
    }

    #[test]
    fn test_first_write_wins_across_analysis_runs() {
        let dir = tempfile::tempdir().unwrap();
        let paths = test_paths(dir.path());
        std::fs::write(paths.downloads.join("aaa_one.txt"), "one").unwrap();

        let summarizer = StubSummarizer::new();
        let mut memory = CategorizationMemory::default();
        let mut unhandled = UnhandledLog::default();
        run_analysis(&summarizer, &paths, &mut memory, &mut unhandled).unwrap();

        // The user attaches a directive to the group.
        let key = sender_key("(unknown)", ".txt");
        let mut edited = memory.get(&key).unwrap().clone();
        edited.notes = "print".to_string();
        memory = CategorizationMemory::default();
        memory.upsert_if_absent(&key, edited);

        // A new file from the same group must not clobber the edit.
        std::fs::write(paths.downloads.join("bbb_two.txt"), "two").unwrap();
        run_analysis(&summarizer, &paths, &mut memory, &mut unhandled).unwrap();

        assert_eq!(memory.get(&key).unwrap().notes, "print");
    }

    #[test]
    fn test_provenance_resolved_from_runlog() {
        let dir = tempfile::tempdir().unwrap();
        let paths = test_paths(dir.path());
        std::fs::write(paths.downloads.join("abc_notes.txt"), "text").unwrap();
        runlog::append_run(
            &paths.download_runlog(),
            &serde_json::json!({
                "tool": "GmailDownloader",
                "downloads": [{
                    "storage_name": "abc_notes.txt",
                    "original_name": "notes.txt",
                    "subject": "Notes",
                    "sender": "sender@example.com"
                }]
            }),
        )
        .unwrap();

        let summarizer = StubSummarizer::new();
        let mut memory = CategorizationMemory::default();
        let mut unhandled = UnhandledLog::default();
        run_analysis(&summarizer, &paths, &mut memory, &mut unhandled).unwrap();

        assert!(memory.get(&sender_key("sender@example.com", ".txt")).is_some());
    }
}
