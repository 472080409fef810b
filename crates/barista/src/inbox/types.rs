//! Provider-neutral message, attachment and outbound mail shapes.

use serde::Serialize;

/// An inbound message as listed by a [`MailboxClient`](super::MailboxClient).
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MailMessage {
    /// Opaque provider id; the ledger key.
    pub id: String,
    pub subject: String,
    pub from_address: String,
    pub from_name: Option<String>,
    /// RFC 3339 timestamp, when the provider supplies one.
    pub received_at: Option<String>,
    pub body_preview: String,
    /// HTML (or plain text) body.
    #[serde(skip_serializing)]
    pub body: String,
    pub is_read: bool,
    pub has_attachments: bool,
}

/// Attachment metadata, without content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachmentMeta {
    pub id: String,
    pub name: String,
    pub content_type: String,
    pub size: u64,
    pub is_inline: bool,
}

/// A downloaded attachment.
#[derive(Debug, Clone)]
pub struct DownloadedAttachment {
    pub name: String,
    pub content_type: String,
    pub size: u64,
    pub bytes: Vec<u8>,
}

/// An outbound message handed to a [`MailTransport`](super::MailTransport).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OutgoingMail {
    pub to: Vec<String>,
    pub cc: Vec<String>,
    pub bcc: Vec<String>,
    pub reply_to: Option<String>,
    pub subject: String,
    pub text: String,
    pub html: String,
}

/// What a transport reports after accepting a message.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SendReceipt {
    /// Provider message id, when the provider returns one.
    pub message_id: Option<String>,
}
