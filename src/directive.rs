//! Directive processing: act on user-annotated categorization-memory entries.
//!
//! An entry whose normalized `notes` field equals the action token causes
//! every downloaded file matching its filetype suffix to be printed and then
//! moved to the archive directory, the only place downloads are ever
//! removed from. Per-file failures are counted and the file left in place
//! for the next run.

use std::path::Path;

use tracing::{debug, info, warn};

use crate::printer::PrintAction;
use crate::store::memory::CategorizationMemory;

/// Aggregate counters for one directive-processing run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DirectiveStats {
    /// Memory entries examined.
    pub total_entries: usize,
    /// Entries whose directive matched the action token.
    pub matched_entries: usize,
    /// Entries skipped (no matching directive).
    pub skipped_entries: usize,
    /// Download files matching a directive's suffix.
    pub files_found: usize,
    /// Files successfully handed to the print action.
    pub files_printed: usize,
    /// Files moved into the archive directory.
    pub archived: usize,
    /// Per-file failures (print or rename).
    pub errors: usize,
}

/// Process every directive-bearing memory entry.
///
/// An empty memory is a no-op, not an error.
pub fn process_directives(
    memory: &CategorizationMemory,
    downloads_dir: &Path,
    archive_dir: &Path,
    printer: &dyn PrintAction,
    directive_token: &str,
) -> DirectiveStats {
    let mut stats = DirectiveStats {
        total_entries: memory.len(),
        ..DirectiveStats::default()
    };

    if memory.is_empty() {
        info!("No memory entries to process");
        return stats;
    }

    if let Err(e) = std::fs::create_dir_all(archive_dir) {
        warn!(path = %archive_dir.display(), error = %e, "Could not create archive directory");
        stats.errors += 1;
        return stats;
    }

    for (key, entry) in memory.iter() {
        let directive = entry.notes.trim().to_lowercase();
        if directive != directive_token {
            debug!(key, directive, "Skipping entry");
            stats.skipped_entries += 1;
            continue;
        }
        stats.matched_entries += 1;

        let suffix = entry.filetype.as_deref().unwrap_or("");
        if suffix.is_empty() {
            warn!(key, "Directive entry without a filetype, nothing to match");
            continue;
        }

        let matched = files_with_suffix(downloads_dir, suffix);
        stats.files_found += matched.len();
        info!(key, suffix, count = matched.len(), "Matched files for directive");

        if matched.is_empty() {
            warn!(key, suffix, "No files found for directive");
            continue;
        }

        for file in matched {
            process_file(&file, key, printer, archive_dir, &mut stats);
        }
    }

    summarize(&stats);
    stats
}

/// Print one file and archive it, updating counters.
fn process_file(
    file: &Path,
    key: &str,
    printer: &dyn PrintAction,
    archive_dir: &Path,
    stats: &mut DirectiveStats,
) {
    let name = file
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    info!(file = %name, key, "Printing");

    if let Err(e) = printer.print(file) {
        stats.errors += 1;
        warn!(file = %name, error = %e, "Print action failed, leaving file for retry");
        return;
    }
    stats.files_printed += 1;

    let target = archive_dir.join(&name);
    match std::fs::rename(file, &target) {
        Ok(()) => {
            stats.archived += 1;
            info!(file = %name, target = %target.display(), "Archived");
        }
        Err(e) => {
            stats.errors += 1;
            warn!(file = %name, error = %e, "Archive rename failed, leaving file in place");
        }
    }
}

/// Download-directory files whose name ends with `suffix`, sorted.
fn files_with_suffix(dir: &Path, suffix: &str) -> Vec<std::path::PathBuf> {
    let mut matched: Vec<_> = match std::fs::read_dir(dir) {
        Ok(entries) => entries
            .filter_map(|e| e.ok().map(|e| e.path()))
            .filter(|p| {
                p.is_file()
                    && p.file_name()
                        .map(|n| n.to_string_lossy().ends_with(suffix))
                        .unwrap_or(false)
            })
            .collect(),
        Err(e) => {
            warn!(path = %dir.display(), error = %e, "Could not read download directory");
            Vec::new()
        }
    };
    matched.sort();
    matched
}

fn summarize(stats: &DirectiveStats) {
    info!("----- Directive processing summary -----");
    info!(total = stats.total_entries, "Total entries");
    info!(matched = stats.matched_entries, "Entries to print");
    info!(skipped = stats.skipped_entries, "Entries skipped");
    info!(found = stats.files_found, "Files found");
    info!(printed = stats.files_printed, "Files printed");
    info!(archived = stats.archived, "Files archived");
    info!(errors = stats.errors, "Errors encountered");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{Result, SweepError};
    use crate::store::memory::{MemoryEntry, UNCATEGORIZED};
    use std::cell::RefCell;
    use std::path::PathBuf;

    /// Print double recording every path, optionally failing on some.
    struct RecordingPrinter {
        printed: RefCell<Vec<PathBuf>>,
        fail_on: Vec<String>,
    }

    impl RecordingPrinter {
        fn new() -> Self {
            Self {
                printed: RefCell::new(Vec::new()),
                fail_on: Vec::new(),
            }
        }

        fn failing_on(name: &str) -> Self {
            Self {
                printed: RefCell::new(Vec::new()),
                fail_on: vec![name.to_string()],
            }
        }
    }

    impl PrintAction for RecordingPrinter {
        fn print(&self, path: &Path) -> Result<()> {
            let name = path.file_name().unwrap().to_string_lossy().into_owned();
            if self.fail_on.contains(&name) {
                return Err(SweepError::Print {
                    path: path.to_path_buf(),
                    reason: "simulated spooler failure".to_string(),
                });
            }
            self.printed.borrow_mut().push(path.to_path_buf());
            Ok(())
        }
    }

    fn entry(filetype: &str, notes: &str) -> MemoryEntry {
        MemoryEntry {
            source: "a@b.c".to_string(),
            subject: None,
            filetype: Some(filetype.to_string()),
            summary: "s".to_string(),
            contains_structured_data: false,
            category: UNCATEGORIZED.to_string(),
            notes: notes.to_string(),
        }
    }

    #[test]
    fn test_directive_round_trip() {
        let root = tempfile::tempdir().unwrap();
        let downloads = root.path().join("downloads");
        let archive = root.path().join("archive");
        std::fs::create_dir_all(&downloads).unwrap();
        std::fs::write(downloads.join("abc123_report.pdf"), b"pdf").unwrap();

        let mut memory = CategorizationMemory::default();
        memory.upsert_if_absent("SENDER::a@b.c::.pdf", entry(".pdf", "print"));

        let printer = RecordingPrinter::new();
        let stats = process_directives(&memory, &downloads, &archive, &printer, "print");

        assert_eq!(printer.printed.borrow().len(), 1);
        assert!(!downloads.join("abc123_report.pdf").exists());
        assert!(archive.join("abc123_report.pdf").exists());
        assert_eq!(
            stats,
            DirectiveStats {
                total_entries: 1,
                matched_entries: 1,
                skipped_entries: 0,
                files_found: 1,
                files_printed: 1,
                archived: 1,
                errors: 0,
            }
        );
    }

    #[test]
    fn test_directive_normalization() {
        let root = tempfile::tempdir().unwrap();
        let downloads = root.path().join("downloads");
        let archive = root.path().join("archive");
        std::fs::create_dir_all(&downloads).unwrap();
        std::fs::write(downloads.join("x.pdf"), b"pdf").unwrap();

        let mut memory = CategorizationMemory::default();
        memory.upsert_if_absent("k", entry(".pdf", "  PRINT \n"));

        let printer = RecordingPrinter::new();
        let stats = process_directives(&memory, &downloads, &archive, &printer, "print");
        assert_eq!(stats.files_printed, 1);
    }

    #[test]
    fn test_skip_on_mismatch() {
        let root = tempfile::tempdir().unwrap();
        let downloads = root.path().join("downloads");
        let archive = root.path().join("archive");
        std::fs::create_dir_all(&downloads).unwrap();
        std::fs::write(downloads.join("x.pdf"), b"pdf").unwrap();

        let mut memory = CategorizationMemory::default();
        memory.upsert_if_absent("k1", entry(".pdf", ""));
        memory.upsert_if_absent("k2", entry(".pdf", "ignore"));

        let printer = RecordingPrinter::new();
        let stats = process_directives(&memory, &downloads, &archive, &printer, "print");

        assert!(printer.printed.borrow().is_empty());
        assert_eq!(stats.skipped_entries, 2);
        assert_eq!(stats.matched_entries, 0);
        assert!(downloads.join("x.pdf").exists());
    }

    #[test]
    fn test_failures_are_isolated_per_file() {
        let root = tempfile::tempdir().unwrap();
        let downloads = root.path().join("downloads");
        let archive = root.path().join("archive");
        std::fs::create_dir_all(&downloads).unwrap();
        for name in ["a.pdf", "b.pdf", "c.pdf"] {
            std::fs::write(downloads.join(name), b"pdf").unwrap();
        }

        let mut memory = CategorizationMemory::default();
        memory.upsert_if_absent("k", entry(".pdf", "print"));

        let printer = RecordingPrinter::failing_on("b.pdf");
        let stats = process_directives(&memory, &downloads, &archive, &printer, "print");

        assert_eq!(stats.files_found, 3);
        assert_eq!(stats.files_printed, 2);
        assert_eq!(stats.archived, 2);
        assert_eq!(stats.errors, 1);
        // The failed file stays pending for the next run.
        assert!(downloads.join("b.pdf").exists());
        assert!(archive.join("a.pdf").exists());
        assert!(archive.join("c.pdf").exists());
    }

    #[test]
    fn test_empty_memory_is_noop() {
        let root = tempfile::tempdir().unwrap();
        let printer = RecordingPrinter::new();
        let stats = process_directives(
            &CategorizationMemory::default(),
            &root.path().join("downloads"),
            &root.path().join("archive"),
            &printer,
            "print",
        );
        assert_eq!(stats, DirectiveStats::default());
    }

    #[test]
    fn test_no_matching_files_warns_and_continues() {
        let root = tempfile::tempdir().unwrap();
        let downloads = root.path().join("downloads");
        let archive = root.path().join("archive");
        std::fs::create_dir_all(&downloads).unwrap();

        let mut memory = CategorizationMemory::default();
        memory.upsert_if_absent("k", entry(".pdf", "print"));

        let printer = RecordingPrinter::new();
        let stats = process_directives(&memory, &downloads, &archive, &printer, "print");

        assert_eq!(stats.matched_entries, 1);
        assert_eq!(stats.files_found, 0);
        assert_eq!(stats.errors, 0);
    }

    #[test]
    fn test_entry_without_filetype_matches_nothing() {
        let root = tempfile::tempdir().unwrap();
        let downloads = root.path().join("downloads");
        let archive = root.path().join("archive");
        std::fs::create_dir_all(&downloads).unwrap();
        std::fs::write(downloads.join("x.pdf"), b"pdf").unwrap();

        let mut memory = CategorizationMemory::default();
        let mut e = entry(".pdf", "print");
        e.filetype = None;
        memory.upsert_if_absent("MSG::a@b.c", e);

        let printer = RecordingPrinter::new();
        let stats = process_directives(&memory, &downloads, &archive, &printer, "print");

        assert_eq!(stats.files_found, 0);
        assert!(downloads.join("x.pdf").exists());
    }
}
