//! Attachment retrieval and query fetching.
//!
//! The retriever pages through the provider for matching messages, skips
//! anything the history store already records, fingerprints new attachment
//! payloads, and persists them under collision-safe names. Provider errors
//! for a single message or attachment abort that item only; the run always
//! continues.

use std::collections::BTreeSet;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::GmailConfig;
use crate::error::{Result, SweepError};
use crate::fingerprint::{fingerprint, storage_name};
use crate::provider::MailSession;
use crate::store::history::History;

/// Metadata for one newly persisted attachment.
///
/// Created once per unique (message, content) pair and immutable thereafter;
/// archival later operates on a copy of the path, never on this record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadedAttachment {
    /// Filename under which the bytes were persisted (`{digest}_{name}`).
    pub storage_name: String,
    /// Original attachment filename from the MIME part.
    pub original_name: String,
    /// Subject of the delivering message.
    pub subject: String,
    /// Sender of the delivering message.
    pub sender: String,
}

/// Counters for one retrieval run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RetrievalOutcome {
    /// New attachments written to the download directory.
    pub downloaded: Vec<DownloadedAttachment>,
    /// Total bytes written.
    pub bytes_written: u64,
    /// Messages examined this run (including already-seen skips).
    pub messages_examined: usize,
    /// Messages skipped because the history store already records them.
    pub messages_skipped: usize,
    /// Attachments skipped as duplicates (fingerprint already seen).
    pub duplicates_skipped: usize,
    /// Per-item provider or filesystem failures (logged, non-fatal).
    pub failures: usize,
}

/// Download all new matching attachments.
///
/// Pages through `config.query` until the provider is exhausted or the
/// `max_messages` cap is reached. The message id is marked seen only after
/// all its parts processed without error, so a failed fetch stays eligible
/// for retry on the next run, while a message carrying only duplicates is
/// still retired.
pub fn download_attachments(
    session: &dyn MailSession,
    history: &mut History,
    config: &GmailConfig,
    downloads_dir: &Path,
    progress: Option<&dyn Fn(usize)>,
) -> Result<RetrievalOutcome> {
    info!(query = %config.query, "Checking for new messages with attachments");
    std::fs::create_dir_all(downloads_dir).map_err(|e| SweepError::io(downloads_dir, e))?;

    let mut outcome = RetrievalOutcome::default();
    let mut page_token: Option<String> = None;

    'pages: loop {
        let page = session.list_messages(&config.query, page_token.as_deref(), config.page_size)?;
        debug!(count = page.ids.len(), "Fetched message page");

        for msg_id in &page.ids {
            if let Some(cap) = config.max_messages {
                if outcome.messages_examined >= cap {
                    info!(cap, "Message cap reached, stopping");
                    break 'pages;
                }
            }
            outcome.messages_examined += 1;
            if let Some(cb) = progress {
                cb(outcome.messages_examined);
            }

            if history.contains_message(msg_id) {
                debug!(message = %msg_id, "Skipping already-processed message");
                outcome.messages_skipped += 1;
                continue;
            }

            if let Err(e) = process_message(
                session,
                history,
                config,
                downloads_dir,
                msg_id,
                &mut outcome,
            ) {
                warn!(message = %msg_id, error = %e, "Message processing failed, will retry next run");
                outcome.failures += 1;
            }
        }

        page_token = page.next_page_token;
        if page_token.is_none() {
            break;
        }
    }

    info!(
        downloaded = outcome.downloaded.len(),
        examined = outcome.messages_examined,
        duplicates = outcome.duplicates_skipped,
        failures = outcome.failures,
        "Retrieval complete"
    );
    Ok(outcome)
}

/// Fetch one message and persist its new attachments.
///
/// Returns `Err` only for failures that should leave the message unmarked
/// (fetch errors); per-attachment write failures are counted and the message
/// is still retired.
fn process_message(
    session: &dyn MailSession,
    history: &mut History,
    config: &GmailConfig,
    downloads_dir: &Path,
    msg_id: &str,
    outcome: &mut RetrievalOutcome,
) -> Result<()> {
    let message = session.get_message(msg_id)?;
    info!(message = %msg_id, subject = %message.subject, sender = %message.sender, "Processing message");

    for att in &message.attachments {
        let data = match session.get_attachment(msg_id, &att.attachment_id) {
            Ok(data) => data,
            Err(e) => {
                warn!(message = %msg_id, filename = %att.filename, error = %e, "Attachment fetch failed");
                // Leave the message unmarked so the attachment is retried.
                return Err(e);
            }
        };

        let digest = fingerprint(&data);
        let key = config.fingerprint_scope.key(msg_id, &digest);
        if history.contains_attachment(&key) {
            debug!(filename = %att.filename, "Duplicate attachment, skipping");
            outcome.duplicates_skipped += 1;
            continue;
        }

        let name = storage_name(&digest, &att.filename);
        let path = downloads_dir.join(&name);
        if let Err(e) = std::fs::write(&path, &data) {
            warn!(path = %path.display(), error = %e, "Could not persist attachment");
            outcome.failures += 1;
            continue;
        }

        info!(filename = %att.filename, storage = %name, "Downloaded attachment");
        outcome.bytes_written += data.len() as u64;
        outcome.downloaded.push(DownloadedAttachment {
            storage_name: name,
            original_name: att.filename.clone(),
            subject: message.subject.clone(),
            sender: message.sender.clone(),
        });
        history.mark_attachment(&key);
    }

    // Retire the message whether or not anything new was saved, so messages
    // with only duplicate or missing attachments are not re-scanned.
    history.mark_message(msg_id);
    Ok(())
}

// ── Query fetcher ───────────────────────────────────────────────

/// A message body fetched for inline analysis.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchedMessage {
    /// Provider-assigned message identifier.
    pub message_id: String,
    /// Subject line.
    pub subject: String,
    /// Sender.
    pub sender: String,
    /// Plain-text body, or the snippet when no text part exists.
    pub body: String,
}

/// Fetch full bodies of messages matching an ad-hoc query.
///
/// `processed` is a separate id set (persisted as a JSON array) so query
/// fetching never interferes with attachment history.
pub fn fetch_messages(
    session: &dyn MailSession,
    query: &str,
    processed: &mut BTreeSet<String>,
    page_size: u32,
) -> Result<Vec<FetchedMessage>> {
    info!(query, "Searching for matching messages");
    let mut fetched = Vec::new();
    let mut page_token: Option<String> = None;

    loop {
        let page = session.list_messages(query, page_token.as_deref(), page_size)?;
        for msg_id in &page.ids {
            if processed.contains(msg_id) {
                debug!(message = %msg_id, "Already fetched, skipping");
                continue;
            }
            let message = match session.get_message(msg_id) {
                Ok(m) => m,
                Err(e) => {
                    warn!(message = %msg_id, error = %e, "Message fetch failed, skipping");
                    continue;
                }
            };
            info!(message = %msg_id, sender = %message.sender, subject = %message.subject, "Fetched message");
            fetched.push(FetchedMessage {
                message_id: message.id,
                subject: message.subject,
                sender: message.sender,
                body: message.body_text.unwrap_or(message.snippet),
            });
            processed.insert(msg_id.clone());
        }

        page_token = page.next_page_token;
        if page_token.is_none() {
            break;
        }
    }

    Ok(fetched)
}

/// Load a processed-ids set from a JSON array document.
pub fn load_processed_ids(path: &Path) -> BTreeSet<String> {
    match std::fs::read_to_string(path) {
        Ok(contents) => match serde_json::from_str::<Vec<String>>(&contents) {
            Ok(ids) => ids.into_iter().collect(),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Corrupt processed-ids document, starting empty");
                BTreeSet::new()
            }
        },
        Err(_) => BTreeSet::new(),
    }
}

/// Persist a processed-ids set, overwriting the document.
pub fn save_processed_ids(path: &Path, processed: &BTreeSet<String>) -> Result<()> {
    let ids: Vec<&String> = processed.iter().collect();
    let contents = serde_json::to_string_pretty(&ids).map_err(|e| SweepError::ProviderData {
        context: "processed-ids serialization".to_string(),
        reason: e.to_string(),
    })?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| SweepError::io(parent, e))?;
    }
    std::fs::write(path, contents).map_err(|e| SweepError::io(path, e))
}
