//! Builders for test messages and attachments.

#![allow(dead_code)]

use barista::inbox::{AttachmentMeta, MailMessage};

/// Builder for an unread inbound message.
pub struct MessageBuilder {
    message: MailMessage,
}

impl MessageBuilder {
    pub fn new(id: &str, subject: &str) -> Self {
        Self {
            message: MailMessage {
                id: id.to_string(),
                subject: subject.to_string(),
                from_address: "a@b.com".to_string(),
                from_name: Some("Ann Smith".to_string()),
                received_at: Some("2026-03-02T09:15:00Z".to_string()),
                body_preview: String::new(),
                body: String::new(),
                is_read: false,
                has_attachments: false,
            },
        }
    }

    pub fn body(mut self, html: &str) -> Self {
        self.message.body = html.to_string();
        self
    }

    pub fn preview(mut self, preview: &str) -> Self {
        self.message.body_preview = preview.to_string();
        self
    }

    pub fn from(mut self, address: &str, name: Option<&str>) -> Self {
        self.message.from_address = address.to_string();
        self.message.from_name = name.map(str::to_string);
        self
    }

    pub fn build(self) -> MailMessage {
        self.message
    }
}

/// Shorthand for a message with an HTML body.
pub fn message(id: &str, subject: &str, body: &str) -> MailMessage {
    MessageBuilder::new(id, subject).body(body).build()
}

pub fn attachment(id: &str, name: &str, content_type: &str, size: u64) -> AttachmentMeta {
    AttachmentMeta {
        id: id.to_string(),
        name: name.to_string(),
        content_type: content_type.to_string(),
        size,
        is_inline: false,
    }
}
