//! Content summarizer boundary.
//!
//! The core treats summarization as a black box returning a structured
//! summary. Failures degrade to a placeholder record carrying the raw
//! content; they never block the batch.

pub mod openai;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::Result;

/// Structured summary returned by the adapter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    /// Concise prose summary of the content.
    pub summary: String,
    /// Whether the content carries tabular/structured data.
    #[serde(default)]
    pub contains_structured_data: bool,
    /// Caveats or observations from the summarizer.
    #[serde(default)]
    pub notes: String,
}

/// A service that can summarize extracted document text.
pub trait Summarizer {
    /// Summarize `text`, identified by `identifier` for logging/prompting.
    fn summarize(&self, text: &str, identifier: &str) -> Result<Summary>;
}

/// Summarize with degradation: on failure, substitute the raw content as
/// the summary so the pipeline still records something useful.
pub fn summarize_or_degrade(summarizer: &dyn Summarizer, text: &str, identifier: &str) -> Summary {
    match summarizer.summarize(text, identifier) {
        Ok(summary) => summary,
        Err(e) => {
            warn!(identifier, error = %e, "Summarization failed, degrading to raw content");
            Summary {
                summary: text.to_string(),
                contains_structured_data: false,
                notes: String::new(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SweepError;

    struct FailingSummarizer;

    impl Summarizer for FailingSummarizer {
        fn summarize(&self, _text: &str, identifier: &str) -> Result<Summary> {
            Err(SweepError::Summarizer {
                identifier: identifier.to_string(),
                reason: "simulated outage".to_string(),
            })
        }
    }

    #[test]
    fn test_degraded_summary_carries_raw_content() {
        let summary = summarize_or_degrade(&FailingSummarizer, "raw document text", "doc.txt");
        assert_eq!(summary.summary, "raw document text");
        assert!(!summary.contains_structured_data);
        assert!(summary.notes.is_empty());
    }

    #[test]
    fn test_summary_defaults_on_partial_json() {
        let parsed: Summary = serde_json::from_str(r#"{"summary": "short"}"#).unwrap();
        assert_eq!(parsed.summary, "short");
        assert!(!parsed.contains_structured_data);
        assert!(parsed.notes.is_empty());
    }
}
