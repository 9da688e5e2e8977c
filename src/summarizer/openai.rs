//! OpenAI chat-completions implementation of [`Summarizer`].

use reqwest::blocking::Client;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use crate::config::SummarizerConfig;
use crate::error::{Result, SweepError};
use crate::summarizer::{Summarizer, Summary};

/// Environment variable holding the API key.
pub const API_KEY_ENV: &str = "OPENAI_API_KEY";

const SYSTEM_PROMPT: &str = "\
You are a document-processing assistant. When given text, you will output exactly one JSON object
and nothing else - no bullet points, no introductory text, no code fences. The JSON MUST have these three fields:
  - summary (a concise prose summary)
  - contains_structured_data (true or false)
  - notes (any caveats or observations)";

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: String,
}

/// Blocking chat-completions client.
pub struct OpenAiSummarizer {
    client: Client,
    config: SummarizerConfig,
    api_key: String,
}

impl OpenAiSummarizer {
    /// Build a summarizer from configuration and the `OPENAI_API_KEY`
    /// environment variable. A missing key is a fatal configuration error.
    pub fn from_env(config: &SummarizerConfig) -> Result<Self> {
        let api_key = std::env::var(API_KEY_ENV)
            .map_err(|_| SweepError::MissingEnv(API_KEY_ENV.to_string()))?;
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(60))
            .build()
            .map_err(|e| SweepError::Config(format!("HTTP client setup failed: {e}")))?;
        Ok(Self {
            client,
            config: config.clone(),
            api_key,
        })
    }
}

impl Summarizer for OpenAiSummarizer {
    fn summarize(&self, text: &str, identifier: &str) -> Result<Summary> {
        let truncated = truncate_chars(text, self.config.max_input_chars);
        let body = json!({
            "model": self.config.model,
            "temperature": self.config.temperature,
            "messages": [
                {"role": "system", "content": SYSTEM_PROMPT},
                {"role": "user", "content": format!(
                    "Document filename: {identifier}\n\nHere is the document text:\n```\n{truncated}\n```\nPlease respond with one valid JSON object as described."
                )},
            ],
        });

        let err = |reason: String| SweepError::Summarizer {
            identifier: identifier.to_string(),
            reason,
        };

        let response: ChatResponse = self
            .client
            .post(format!("{}/chat/completions", self.config.api_base))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .map_err(|e| err(e.to_string()))?
            .error_for_status()
            .map_err(|e| err(e.to_string()))?
            .json()
            .map_err(|e| err(e.to_string()))?;

        let raw = response
            .choices
            .first()
            .map(|c| c.message.content.trim())
            .ok_or_else(|| err("empty choices".to_string()))?;
        debug!(identifier, raw, "Raw summarizer response");

        parse_summary(raw).map_err(err)
    }
}

/// Parse the model's JSON reply, tolerating stray code fences.
fn parse_summary(raw: &str) -> std::result::Result<Summary, String> {
    let stripped = raw
        .trim()
        .trim_start_matches("```json")
        .trim_start_matches("```")
        .trim_end_matches("```")
        .trim();
    serde_json::from_str(stripped).map_err(|e| format!("unparseable summary JSON: {e}"))
}

/// Truncate to at most `max` characters without splitting a code point.
fn truncate_chars(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
