//! Application configuration and filesystem layout.
//!
//! Configuration is loaded from a TOML file at:
//! 1. `$MAILSWEEP_CONFIG` (environment variable)
//! 2. `~/.config/mailsweep/config.toml` (Linux/macOS)
//!    `%APPDATA%\mailsweep\config.toml` (Windows)
//! 3. Built-in defaults

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SweepError};
use crate::fingerprint::FingerprintScope;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General behavior settings.
    pub general: GeneralConfig,
    /// Gmail polling settings.
    pub gmail: GmailConfig,
    /// Summarizer adapter settings.
    pub summarizer: SummarizerConfig,
    /// Print directive settings.
    pub print: PrintConfig,
}

/// General behavior settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log level: "error", "warn", "info", "debug", "trace".
    pub log_level: String,
    /// Override data directory for downloads, archives, state and logs.
    pub data_dir: Option<PathBuf>,
    /// Seconds between cycles in watch mode.
    pub loop_interval_secs: u64,
}

/// Gmail polling settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GmailConfig {
    /// Search query for the attachment retriever.
    pub query: String,
    /// Page size for message listing.
    pub page_size: u32,
    /// Cap on messages examined per run (`None` = page until exhausted).
    pub max_messages: Option<usize>,
    /// Dedup key policy for attachment fingerprints.
    pub fingerprint_scope: FingerprintScope,
}

/// Summarizer adapter settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SummarizerConfig {
    /// Model name passed to the chat-completions endpoint.
    pub model: String,
    /// Sampling temperature.
    pub temperature: f32,
    /// API base URL.
    pub api_base: String,
    /// Maximum characters of document text sent per request.
    pub max_input_chars: usize,
}

/// Print directive settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PrintConfig {
    /// Directive token matched against normalized memory notes.
    pub directive: String,
    /// Printer name (`None` = system default).
    pub printer: Option<String>,
    /// File suffixes the print action accepts.
    pub supported_suffixes: Vec<String>,
}

// ── Default implementations ─────────────────────────────────────

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            data_dir: None,
            loop_interval_secs: 300,
        }
    }
}

impl Default for GmailConfig {
    fn default() -> Self {
        Self {
            query: "has:attachment".to_string(),
            page_size: 100,
            max_messages: None,
            fingerprint_scope: FingerprintScope::Global,
        }
    }
}

impl Default for SummarizerConfig {
    fn default() -> Self {
        Self {
            model: "gpt-4o-mini".to_string(),
            temperature: 0.0,
            api_base: "https://api.openai.com/v1".to_string(),
            max_input_chars: 24_000,
        }
    }
}

impl Default for PrintConfig {
    fn default() -> Self {
        Self {
            directive: "print".to_string(),
            printer: None,
            supported_suffixes: vec![".pdf".to_string(), ".html".to_string()],
        }
    }
}

// ── Load / save ─────────────────────────────────────────────────

/// Load configuration, searching standard locations.
///
/// Returns the default configuration if no file is found or on parse error.
pub fn load_config() -> Config {
    if let Some(path) = config_file_path() {
        if path.exists() {
            match std::fs::read_to_string(&path) {
                Ok(contents) => match toml::from_str::<Config>(&contents) {
                    Ok(cfg) => {
                        tracing::info!(path = %path.display(), "Loaded config");
                        return cfg;
                    }
                    Err(e) => {
                        tracing::warn!(
                            path = %path.display(),
                            error = %e,
                            "Failed to parse config, using defaults"
                        );
                    }
                },
                Err(e) => {
                    tracing::warn!(
                        path = %path.display(),
                        error = %e,
                        "Failed to read config file, using defaults"
                    );
                }
            }
        }
    }
    Config::default()
}

/// Determine the config file path (checking env var first, then standard dirs).
pub fn config_file_path() -> Option<PathBuf> {
    // 1. Environment variable override
    if let Ok(env_path) = std::env::var("MAILSWEEP_CONFIG") {
        return Some(PathBuf::from(env_path));
    }

    // 2. Standard config directory
    dirs::config_dir().map(|d| d.join("mailsweep").join("config.toml"))
}

/// Return the data directory for downloads, state files, and logs.
pub fn data_dir(config: &Config) -> PathBuf {
    if let Some(ref dir) = config.general.data_dir {
        return dir.clone();
    }
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("mailsweep")
}

// ── Filesystem layout ───────────────────────────────────────────

/// Resolved filesystem layout under the data directory.
///
/// Shared by the retriever (write target), analyzer (read/glob source) and
/// directive processor (rename target).
#[derive(Debug, Clone)]
pub struct Paths {
    /// Root data directory.
    pub root: PathBuf,
    /// Download target for new attachments.
    pub downloads: PathBuf,
    /// Archive target for processed files.
    pub archive: PathBuf,
    /// Per-item analysis JSON documents.
    pub analysis: PathBuf,
    /// Run-log JSON documents.
    pub results: PathBuf,
    /// Log files.
    pub logs: PathBuf,
    /// History store document.
    pub history_file: PathBuf,
    /// Categorization memory document.
    pub memory_file: PathBuf,
    /// Unhandled-entries document.
    pub unhandled_file: PathBuf,
    /// Processed-ids document for the query fetcher.
    pub processed_file: PathBuf,
    /// Liveness heartbeat document (watch mode).
    pub heartbeat_file: PathBuf,
    /// OAuth token file for the Gmail session.
    pub token_file: PathBuf,
}

impl Paths {
    /// Derive the full layout from configuration.
    pub fn from_config(config: &Config) -> Self {
        let root = data_dir(config);
        Self {
            downloads: root.join("downloads"),
            archive: root.join("archive"),
            analysis: root.join("analysis"),
            results: root.join("results"),
            logs: root.join("logs"),
            history_file: root.join("downloaded_attachments.json"),
            memory_file: root.join("categorization_memory.json"),
            unhandled_file: root.join("unhandled_filedata.json"),
            processed_file: root.join("processed_messages.json"),
            heartbeat_file: root.join("heartbeat.json"),
            token_file: root.join("token.json"),
            root,
        }
    }

    /// Create all directories in the layout.
    pub fn ensure_directories(&self) -> Result<()> {
        for dir in [
            &self.root,
            &self.downloads,
            &self.archive,
            &self.analysis,
            &self.results,
            &self.logs,
        ] {
            std::fs::create_dir_all(dir).map_err(|e| SweepError::io(dir, e))?;
        }
        Ok(())
    }

    /// Run-log file for the attachment retriever.
    pub fn download_runlog(&self) -> PathBuf {
        self.results.join("gmail_downloader.json")
    }

    /// Run-log file for the query fetcher.
    pub fn fetch_runlog(&self) -> PathBuf {
        self.results.join("gmail_query_fetcher.json")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let cfg = Config::default();
        assert_eq!(cfg.gmail.query, "has:attachment");
        assert_eq!(cfg.gmail.page_size, 100);
        assert!(cfg.gmail.max_messages.is_none());
        assert_eq!(cfg.gmail.fingerprint_scope, FingerprintScope::Global);
        assert_eq!(cfg.print.directive, "print");
        assert_eq!(cfg.general.loop_interval_secs, 300);
    }

    #[test]
    fn test_serialize_deserialize_roundtrip() {
        let cfg = Config::default();
        let toml_str = toml::to_string_pretty(&cfg).expect("serialize");
        let parsed: Config = toml::from_str(&toml_str).expect("deserialize");
        assert_eq!(parsed.gmail.query, cfg.gmail.query);
        assert_eq!(parsed.summarizer.model, cfg.summarizer.model);
        assert_eq!(parsed.print.supported_suffixes, cfg.print.supported_suffixes);
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let partial = r#"
[gmail]
query = "has:attachment is:unread"
max_messages = 10
fingerprint_scope = "per-message"

[print]
printer = "office-laser"
"#;
        let cfg: Config = toml::from_str(partial).expect("parse partial");
        assert_eq!(cfg.gmail.query, "has:attachment is:unread");
        assert_eq!(cfg.gmail.max_messages, Some(10));
        assert_eq!(cfg.gmail.fingerprint_scope, FingerprintScope::PerMessage);
        assert_eq!(cfg.print.printer.as_deref(), Some("office-laser"));
        // Other fields use defaults
        assert_eq!(cfg.gmail.page_size, 100);
        assert_eq!(cfg.print.directive, "print");
    }

    #[test]
    fn test_paths_layout() {
        let mut cfg = Config::default();
        cfg.general.data_dir = Some(PathBuf::from("/tmp/sweep"));
        let paths = Paths::from_config(&cfg);
        assert_eq!(paths.downloads, PathBuf::from("/tmp/sweep/downloads"));
        assert_eq!(
            paths.history_file,
            PathBuf::from("/tmp/sweep/downloaded_attachments.json")
        );
        assert_eq!(
            paths.download_runlog(),
            PathBuf::from("/tmp/sweep/results/gmail_downloader.json")
        );
    }
}
