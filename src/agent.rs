//! Batch orchestration: startup checks, single cycles, and the watch loop.
//!
//! A cycle runs retrieval, analysis and directive processing sequentially,
//! sharing the download directory and the persisted state files. Steps never
//! run in parallel, so no locking discipline is needed.

use std::path::Path;

use chrono::{SecondsFormat, Utc};
use serde_json::json;
use tracing::{error, info, warn};

use crate::analyzer::{self, AnalysisOutcome};
use crate::config::{Config, Paths};
use crate::directive::{self, DirectiveStats};
use crate::error::{Result, SweepError};
use crate::printer::PrintAction;
use crate::provider::gmail::{self, GmailSession};
use crate::provider::MailSession;
use crate::retriever::{self, RetrievalOutcome};
use crate::store::history::HistoryGuard;
use crate::store::memory::CategorizationMemory;
use crate::store::runlog;
use crate::store::unhandled::UnhandledLog;
use crate::summarizer::openai::{self, OpenAiSummarizer};
use crate::summarizer::Summarizer;

/// Name reported in heartbeat and run-log documents.
pub const AGENT_NAME: &str = "mailsweep";

/// Aggregate report for one full cycle.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CycleReport {
    /// Retrieval counters.
    pub retrieval: RetrievalOutcome,
    /// Analysis counters.
    pub analysis: AnalysisOutcome,
    /// Directive-processing counters.
    pub directives: DirectiveStats,
    /// Unhandled entries removed after human triage.
    pub unhandled_pruned: usize,
}

/// Verify configuration before any network call.
///
/// Missing credentials are fatal for the cycle: the retriever must not run
/// without a token file, and the analyzer must not run without an API key.
pub fn startup_checks(paths: &Paths) -> Result<()> {
    paths.ensure_directories()?;

    let token_path = gmail::token_file_path(&paths.token_file);
    if !token_path.exists() {
        return Err(SweepError::TokenNotFound(token_path));
    }
    if std::env::var(openai::API_KEY_ENV).is_err() {
        return Err(SweepError::MissingEnv(openai::API_KEY_ENV.to_string()));
    }
    Ok(())
}

/// Open the Gmail session from the configured token file.
pub fn connect_session(paths: &Paths) -> Result<GmailSession> {
    GmailSession::connect(&gmail::token_file_path(&paths.token_file))
}

/// Run one full cycle: retrieve, analyze, then process directives.
pub fn run_cycle(
    config: &Config,
    paths: &Paths,
    session: &dyn MailSession,
    summarizer: &dyn Summarizer,
    printer: &dyn PrintAction,
) -> Result<CycleReport> {
    let retrieval = run_retrieval(config, paths, session, None)?;
    let (analysis, unhandled_pruned, memory) = run_analysis_step(paths, summarizer)?;

    let directives = directive::process_directives(
        &memory,
        &paths.downloads,
        &paths.archive,
        printer,
        &config.print.directive,
    );

    Ok(CycleReport {
        retrieval,
        analysis,
        directives,
        unhandled_pruned,
    })
}

/// Retrieval step with the save-on-exit history guard and run-log entry.
pub fn run_retrieval(
    config: &Config,
    paths: &Paths,
    session: &dyn MailSession,
    progress: Option<&dyn Fn(usize)>,
) -> Result<RetrievalOutcome> {
    let mut history = HistoryGuard::load(&paths.history_file);
    // The guard flushes history on every exit path, including `?` below.
    let outcome = retriever::download_attachments(
        session,
        &mut history,
        &config.gmail,
        &paths.downloads,
        progress,
    )?;
    history.persist()?;

    runlog::append_run(
        &paths.download_runlog(),
        &json!({
            "tool": "GmailDownloader",
            "new_attachments": outcome.downloaded.len(),
            "downloads": outcome.downloaded,
        }),
    )?;
    Ok(outcome)
}

/// Analysis step: memory and unhandled log persist on all exit paths.
fn run_analysis_step(
    paths: &Paths,
    summarizer: &dyn Summarizer,
) -> Result<(AnalysisOutcome, usize, CategorizationMemory)> {
    let mut memory = CategorizationMemory::load(&paths.memory_file);
    let mut unhandled = UnhandledLog::load(&paths.unhandled_file);

    let analysis_result = analyzer::run_analysis(summarizer, paths, &mut memory, &mut unhandled);
    let pruned = unhandled.prune_handled(&memory);

    // Persist whatever was learned even if analysis failed mid-way.
    memory.save(&paths.memory_file)?;
    unhandled.save(&paths.unhandled_file)?;

    Ok((analysis_result?, pruned, memory))
}

/// Fetch step for ad-hoc queries, recorded for the analyzer.
pub fn run_fetch(paths: &Paths, session: &dyn MailSession, query: &str, page_size: u32) -> Result<usize> {
    let mut processed = retriever::load_processed_ids(&paths.processed_file);
    let fetched = retriever::fetch_messages(session, query, &mut processed, page_size);
    // Processed ids persist even when a page failed mid-run.
    retriever::save_processed_ids(&paths.processed_file, &processed)?;
    let fetched = fetched?;

    runlog::append_run(
        &paths.fetch_runlog(),
        &json!({
            "tool": "GmailQueryFetcher",
            "query": query,
            "messages_saved": fetched,
        }),
    )?;
    Ok(fetched.len())
}

/// Write the liveness heartbeat document.
pub fn write_heartbeat(path: &Path) {
    let status = json!({
        "timestamp": Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true),
        "status": "alive",
        "agent": AGENT_NAME,
    });
    match serde_json::to_string_pretty(&status) {
        Ok(contents) => {
            if let Err(e) = std::fs::write(path, contents) {
                warn!(path = %path.display(), error = %e, "Failed to write heartbeat");
            }
        }
        Err(e) => warn!(error = %e, "Heartbeat serialization failed"),
    }
}

/// Supervised interval loop: heartbeat, cycle, sleep, repeat.
///
/// Configuration errors degrade to a zero-result cycle and the loop keeps
/// running; only an external signal stops it.
pub fn run_loop(config: &Config, paths: &Paths, printer: &dyn PrintAction) -> ! {
    let interval = std::time::Duration::from_secs(config.general.loop_interval_secs);
    info!(interval_secs = config.general.loop_interval_secs, "Starting watch loop");

    loop {
        write_heartbeat(&paths.heartbeat_file);

        match run_supervised_cycle(config, paths, printer) {
            Ok(report) => {
                info!(
                    downloaded = report.retrieval.downloaded.len(),
                    analyzed = report.analysis.files_analyzed,
                    printed = report.directives.files_printed,
                    errors = report.retrieval.failures + report.directives.errors,
                    "Cycle complete"
                );
            }
            Err(e) => {
                error!(error = %e, "Cycle failed, zero results this round");
            }
        }

        std::thread::sleep(interval);
    }
}

fn run_supervised_cycle(
    config: &Config,
    paths: &Paths,
    printer: &dyn PrintAction,
) -> Result<CycleReport> {
    startup_checks(paths)?;
    let session = connect_session(paths)?;
    let summarizer = OpenAiSummarizer::from_env(&config.summarizer)?;
    run_cycle(config, paths, &session, &summarizer, printer)
}
