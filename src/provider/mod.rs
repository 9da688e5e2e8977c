//! Mail-provider session boundary.
//!
//! The core only requires a session object capable of three calls: list
//! matching messages, fetch a full message, fetch an attachment payload.
//! Authentication is an external concern handled by the concrete session.

pub mod gmail;

use crate::error::Result;

/// Default subject when a message carries no `Subject` header.
pub const NO_SUBJECT: &str = "(no subject)";

/// Default sender when a message carries no `From` header.
pub const NO_SENDER: &str = "(no sender)";

/// One page of message ids matching a query.
#[derive(Debug, Clone, Default)]
pub struct MessageList {
    /// Provider-assigned opaque message identifiers.
    pub ids: Vec<String>,
    /// Continuation token for the next page, if any.
    pub next_page_token: Option<String>,
}

/// Reference to an attachment within a message part.
#[derive(Debug, Clone)]
pub struct AttachmentRef {
    /// Provider-assigned attachment identifier.
    pub attachment_id: String,
    /// Original filename from the MIME part.
    pub filename: String,
}

/// A fully fetched message: headers of interest plus its attachment refs.
#[derive(Debug, Clone)]
pub struct Message {
    /// Provider-assigned opaque identifier.
    pub id: String,
    /// Decoded subject, `(no subject)` if absent.
    pub subject: String,
    /// Sender, `(no sender)` if absent.
    pub sender: String,
    /// Provider-supplied snippet of the body.
    pub snippet: String,
    /// Plain-text body, if any part carried one.
    pub body_text: Option<String>,
    /// Parts carrying both a filename and an attachment reference.
    pub attachments: Vec<AttachmentRef>,
}

/// An authenticated mail-provider session.
pub trait MailSession {
    /// List messages matching `query`, one page at a time.
    fn list_messages(
        &self,
        query: &str,
        page_token: Option<&str>,
        page_size: u32,
    ) -> Result<MessageList>;

    /// Fetch a full message by id.
    fn get_message(&self, id: &str) -> Result<Message>;

    /// Fetch and decode an attachment payload.
    fn get_attachment(&self, message_id: &str, attachment_id: &str) -> Result<Vec<u8>>;
}
