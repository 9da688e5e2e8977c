//! Centralized error types for mailsweep.

use std::path::PathBuf;
use thiserror::Error;

/// All errors produced by the mailsweep library.
#[derive(Error, Debug)]
pub enum SweepError {
    /// I/O error with the associated file path.
    #[error("I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// A required configuration value is missing or invalid.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A required environment variable is not set.
    #[error("Missing environment variable: {0}")]
    MissingEnv(String),

    /// The Gmail token file does not exist or cannot be read.
    #[error("Gmail token file not found: {0}")]
    TokenNotFound(PathBuf),

    /// A provider HTTP request failed (network-level).
    #[error("Provider request failed ({context}): {source}")]
    Provider {
        context: String,
        source: reqwest::Error,
    },

    /// The provider returned an unexpected or unusable response.
    #[error("Unexpected provider response ({context}): {reason}")]
    ProviderData { context: String, reason: String },

    /// An attachment payload could not be base64-decoded.
    #[error("Attachment payload decoding failed: {0}")]
    Decode(#[from] base64::DecodeError),

    /// The summarizer call failed or returned unparseable output.
    #[error("Summarizer error for '{identifier}': {reason}")]
    Summarizer { identifier: String, reason: String },

    /// The print command failed for a file.
    #[error("Print action failed for '{path}': {reason}")]
    Print { path: PathBuf, reason: String },
}

/// Convenience alias for `Result<T, SweepError>`.
pub type Result<T> = std::result::Result<T, SweepError>;

impl SweepError {
    /// Create an `Io` variant from a path and an `io::Error`.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Allow `?` on `std::io::Error` inside functions returning `SweepError`
/// when no path context is available (rare; prefer `SweepError::io`).
impl From<std::io::Error> for SweepError {
    fn from(source: std::io::Error) -> Self {
        Self::Io {
            path: PathBuf::from("<unknown>"),
            source,
        }
    }
}
