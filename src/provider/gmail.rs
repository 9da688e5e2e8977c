//! Gmail REST implementation of [`MailSession`].
//!
//! Uses the blocking `reqwest` client against the `users/me` endpoints.
//! Authentication rides on a pre-existing OAuth token file; the interactive
//! consent flow is out of scope, but expired access tokens are refreshed
//! through the token endpoint when refresh credentials are present.

use std::path::{Path, PathBuf};

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{Result, SweepError};
use crate::provider::{AttachmentRef, MailSession, Message, MessageList, NO_SENDER, NO_SUBJECT};

const API_BASE: &str = "https://gmail.googleapis.com/gmail/v1/users/me";
const DEFAULT_TOKEN_URI: &str = "https://oauth2.googleapis.com/token";

/// Environment variable overriding the token file location.
pub const TOKEN_PATH_ENV: &str = "MAILSWEEP_TOKEN_PATH";

// ── Token handling ──────────────────────────────────────────────

/// On-disk OAuth token document.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct TokenFile {
    access_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    refresh_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    client_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    client_secret: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    token_uri: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    expiry: Option<DateTime<Utc>>,
}

impl TokenFile {
    fn is_expired(&self) -> bool {
        // A minute of slack so we never race the expiry on a slow request.
        self.expiry
            .is_some_and(|t| t - Duration::seconds(60) <= Utc::now())
    }
}

#[derive(Debug, Deserialize)]
struct RefreshResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
}

/// Resolve the token file path: env override first, then the data-dir default.
pub fn token_file_path(default: &Path) -> PathBuf {
    match std::env::var(TOKEN_PATH_ENV) {
        Ok(p) => PathBuf::from(p),
        Err(_) => default.to_path_buf(),
    }
}

fn load_token(path: &Path) -> Result<TokenFile> {
    let contents = std::fs::read_to_string(path)
        .map_err(|_| SweepError::TokenNotFound(path.to_path_buf()))?;
    serde_json::from_str(&contents).map_err(|e| {
        SweepError::Config(format!(
            "Invalid token file '{}': {e}",
            path.display()
        ))
    })
}

// ── Gmail wire types ────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct ListResponse {
    #[serde(default)]
    messages: Vec<MessageStub>,
    #[serde(rename = "nextPageToken")]
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MessageStub {
    id: String,
}

#[derive(Debug, Deserialize)]
struct FullMessage {
    id: String,
    #[serde(default)]
    snippet: String,
    payload: Option<Payload>,
}

#[derive(Debug, Default, Deserialize)]
struct Payload {
    #[serde(default)]
    headers: Vec<Header>,
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Header {
    name: String,
    value: String,
}

#[derive(Debug, Deserialize)]
struct Part {
    #[serde(default)]
    filename: String,
    #[serde(rename = "mimeType", default)]
    mime_type: String,
    #[serde(default)]
    body: PartBody,
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Default, Deserialize)]
struct PartBody {
    #[serde(rename = "attachmentId")]
    attachment_id: Option<String>,
    data: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AttachmentBody {
    data: Option<String>,
}

// ── Session ─────────────────────────────────────────────────────

/// An authenticated Gmail API session.
pub struct GmailSession {
    client: Client,
    access_token: String,
}

impl GmailSession {
    /// Open a session from the token file at `token_path`.
    ///
    /// A missing or unreadable token file is a fatal configuration error,
    /// raised before any provider call. An expired token is refreshed and
    /// the file rewritten in place.
    pub fn connect(token_path: &Path) -> Result<Self> {
        let mut token = load_token(token_path)?;
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .map_err(|e| SweepError::Config(format!("HTTP client setup failed: {e}")))?;

        if token.is_expired() {
            info!("Access token expired, refreshing");
            token = refresh_token(&client, token, token_path)?;
        }

        info!(path = %token_path.display(), "Gmail session authenticated");
        Ok(Self {
            client,
            access_token: token.access_token,
        })
    }

    fn get_json<T: serde::de::DeserializeOwned>(&self, url: &str, context: &str) -> Result<T> {
        let send_err = |source| SweepError::Provider {
            context: context.to_string(),
            source,
        };
        self.client
            .get(url)
            .bearer_auth(&self.access_token)
            .send()
            .map_err(send_err)?
            .error_for_status()
            .map_err(send_err)?
            .json::<T>()
            .map_err(send_err)
    }
}

/// Exchange a refresh token for a new access token and rewrite the file.
fn refresh_token(client: &Client, token: TokenFile, path: &Path) -> Result<TokenFile> {
    let (Some(refresh), Some(client_id), Some(client_secret)) = (
        token.refresh_token.as_deref(),
        token.client_id.as_deref(),
        token.client_secret.as_deref(),
    ) else {
        return Err(SweepError::Config(
            "Token expired and no refresh credentials in token file".to_string(),
        ));
    };

    let token_uri = token.token_uri.as_deref().unwrap_or(DEFAULT_TOKEN_URI);
    let send_err = |source| SweepError::Provider {
        context: "token refresh".to_string(),
        source,
    };
    let response: RefreshResponse = client
        .post(token_uri)
        .form(&[
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh),
            ("client_id", client_id),
            ("client_secret", client_secret),
        ])
        .send()
        .map_err(send_err)?
        .error_for_status()
        .map_err(send_err)?
        .json()
        .map_err(send_err)?;

    let refreshed = TokenFile {
        access_token: response.access_token,
        expiry: response
            .expires_in
            .map(|secs| Utc::now() + Duration::seconds(secs)),
        ..token
    };

    let contents = serde_json::to_string_pretty(&refreshed).map_err(|e| {
        SweepError::Config(format!("Token serialization failed: {e}"))
    })?;
    if let Err(e) = std::fs::write(path, contents) {
        // The refreshed token still works for this run.
        warn!(path = %path.display(), error = %e, "Could not rewrite token file");
    }
    Ok(refreshed)
}

impl MailSession for GmailSession {
    fn list_messages(
        &self,
        query: &str,
        page_token: Option<&str>,
        page_size: u32,
    ) -> Result<MessageList> {
        let mut url = format!(
            "{API_BASE}/messages?q={}&maxResults={page_size}",
            urlencode(query)
        );
        if let Some(token) = page_token {
            url.push_str("&pageToken=");
            url.push_str(&urlencode(token));
        }

        let response: ListResponse = self.get_json(&url, "list messages")?;
        debug!(
            count = response.messages.len(),
            has_next = response.next_page_token.is_some(),
            "Listed messages"
        );
        Ok(MessageList {
            ids: response.messages.into_iter().map(|m| m.id).collect(),
            next_page_token: response.next_page_token,
        })
    }

    fn get_message(&self, id: &str) -> Result<Message> {
        let url = format!("{API_BASE}/messages/{}?format=full", urlencode(id));
        let full: FullMessage = self.get_json(&url, "get message")?;
        Ok(convert_message(full))
    }

    fn get_attachment(&self, message_id: &str, attachment_id: &str) -> Result<Vec<u8>> {
        let url = format!(
            "{API_BASE}/messages/{}/attachments/{}",
            urlencode(message_id),
            urlencode(attachment_id)
        );
        let body: AttachmentBody = self.get_json(&url, "get attachment")?;
        let data = body.data.ok_or_else(|| SweepError::ProviderData {
            context: "get attachment".to_string(),
            reason: "attachment body without data".to_string(),
        })?;
        decode_body(&data)
    }
}

/// Decode Gmail's urlsafe base64 payloads (with or without padding).
fn decode_body(data: &str) -> Result<Vec<u8>> {
    Ok(URL_SAFE_NO_PAD.decode(data.trim_end_matches('='))?)
}

fn convert_message(full: FullMessage) -> Message {
    let payload = full.payload.unwrap_or_default();

    let header = |name: &str| -> Option<String> {
        payload
            .headers
            .iter()
            .find(|h| h.name.eq_ignore_ascii_case(name))
            .map(|h| h.value.clone())
    };
    let subject = header("Subject").unwrap_or_else(|| NO_SUBJECT.to_string());
    let sender = header("From").unwrap_or_else(|| NO_SENDER.to_string());

    let mut attachments = Vec::new();
    let mut body_text = None;
    collect_parts(&payload.parts, &mut attachments, &mut body_text);

    Message {
        id: full.id,
        subject,
        sender,
        snippet: full.snippet,
        body_text,
        attachments,
    }
}

/// Walk the MIME part tree, collecting attachment refs and the first
/// plain-text body.
fn collect_parts(
    parts: &[Part],
    attachments: &mut Vec<AttachmentRef>,
    body_text: &mut Option<String>,
) {
    for part in parts {
        if !part.filename.is_empty() {
            if let Some(id) = &part.body.attachment_id {
                attachments.push(AttachmentRef {
                    attachment_id: id.clone(),
                    filename: part.filename.clone(),
                });
            }
        } else if part.mime_type == "text/plain" && body_text.is_none() {
            if let Some(data) = &part.body.data {
                if let Ok(bytes) = decode_body(data) {
                    *body_text = Some(String::from_utf8_lossy(&bytes).into_owned());
                }
            }
        }
        collect_parts(&part.parts, attachments, body_text);
    }
}

/// Percent-encode a query-string component.
fn urlencode(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for byte in s.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char);
            }
            _ => out.push_str(&format!("%{byte:02X}")),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_body_handles_padding_variants() {
        assert_eq!(decode_body("aGVsbG8=").unwrap(), b"hello");
        assert_eq!(decode_body("aGVsbG8").unwrap(), b"hello");
    }

    #[test]
    fn test_urlencode() {
        assert_eq!(urlencode("has:attachment is:unread"), "has%3Aattachment%20is%3Aunread");
        assert_eq!(urlencode("plain-token_1.2~"), "plain-token_1.2~");
    }

    #[test]
    fn test_convert_message_defaults_missing_headers() {
        let full = FullMessage {
            id: "m1".to_string(),
            snippet: "snippet".to_string(),
            payload: Some(Payload::default()),
        };
        let msg = convert_message(full);
        assert_eq!(msg.subject, NO_SUBJECT);
        assert_eq!(msg.sender, NO_SENDER);
        assert!(msg.attachments.is_empty());
    }

    #[test]
    fn test_convert_message_collects_nested_attachments() {
        let raw = r#"{
            "id": "m2",
            "snippet": "",
            "payload": {
                "headers": [
                    {"name": "subject", "value": "Invoice"},
                    {"name": "From", "value": "billing@example.com"}
                ],
                "parts": [
                    {
                        "mimeType": "multipart/mixed",
                        "parts": [
                            {"mimeType": "text/plain", "body": {"data": "aGVsbG8"}},
                            {
                                "filename": "invoice.pdf",
                                "mimeType": "application/pdf",
                                "body": {"attachmentId": "att-1"}
                            }
                        ]
                    }
                ]
            }
        }"#;
        let full: FullMessage = serde_json::from_str(raw).unwrap();
        let msg = convert_message(full);
        assert_eq!(msg.subject, "Invoice");
        assert_eq!(msg.sender, "billing@example.com");
        assert_eq!(msg.body_text.as_deref(), Some("hello"));
        assert_eq!(msg.attachments.len(), 1);
        assert_eq!(msg.attachments[0].filename, "invoice.pdf");
        assert_eq!(msg.attachments[0].attachment_id, "att-1");
    }

    #[test]
    fn test_token_expiry_check() {
        let expired = TokenFile {
            access_token: "t".to_string(),
            refresh_token: None,
            client_id: None,
            client_secret: None,
            token_uri: None,
            expiry: Some(Utc::now() - Duration::hours(1)),
        };
        assert!(expired.is_expired());

        let fresh = TokenFile {
            expiry: Some(Utc::now() + Duration::hours(1)),
            ..expired.clone()
        };
        assert!(!fresh.is_expired());

        let no_expiry = TokenFile {
            expiry: None,
            ..expired
        };
        assert!(!no_expiry.is_expired());
    }

    #[test]
    fn test_load_token_missing_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let err = load_token(&dir.path().join("token.json")).unwrap_err();
        assert!(matches!(err, SweepError::TokenNotFound(_)));
    }
}
