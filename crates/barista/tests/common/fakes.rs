//! In-memory mailbox and transport doubles.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::Notify;

use barista::inbox::error::Result;
use barista::inbox::{
    AttachmentMeta, DownloadedAttachment, InboxError, MailMessage, MailTransport, MailboxClient,
    OutgoingMail, SendReceipt,
};

/// Holds `list_unread` open until released, to simulate a slow mailbox.
#[derive(Default)]
pub struct Gate {
    pub entered: Notify,
    pub release: Notify,
}

/// A mailbox whose contents the test controls.
#[derive(Default)]
pub struct FakeMailbox {
    messages: Mutex<Vec<MailMessage>>,
    attachments: Mutex<HashMap<String, Vec<DownloadedAttachmentFixture>>>,
    marked_read: Mutex<Vec<String>>,
    list_unread_calls: AtomicUsize,
    fail_listing: AtomicBool,
    gate: Option<Arc<Gate>>,
}

#[derive(Clone)]
struct DownloadedAttachmentFixture {
    meta: AttachmentMeta,
    bytes: Option<Vec<u8>>,
}

impl FakeMailbox {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn gated(gate: Arc<Gate>) -> Self {
        Self {
            gate: Some(gate),
            ..Self::default()
        }
    }

    pub fn push(&self, message: MailMessage) {
        self.messages.lock().unwrap().push(message);
    }

    /// Registers an attachment. `None` bytes make the download fail.
    pub fn attach(&self, message_id: &str, meta: AttachmentMeta, bytes: Option<Vec<u8>>) {
        self.attachments
            .lock()
            .unwrap()
            .entry(message_id.to_string())
            .or_default()
            .push(DownloadedAttachmentFixture { meta, bytes });
    }

    pub fn fail_listing(&self, fail: bool) {
        self.fail_listing.store(fail, Ordering::SeqCst);
    }

    pub fn marked_read(&self) -> Vec<String> {
        self.marked_read.lock().unwrap().clone()
    }

    pub fn list_unread_calls(&self) -> usize {
        self.list_unread_calls.load(Ordering::SeqCst)
    }

    pub fn is_read(&self, message_id: &str) -> bool {
        self.messages
            .lock()
            .unwrap()
            .iter()
            .any(|m| m.id == message_id && m.is_read)
    }
}

#[async_trait]
impl MailboxClient for FakeMailbox {
    async fn list_unread(&self, max_results: u32) -> Result<Vec<MailMessage>> {
        self.list_unread_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(gate) = &self.gate {
            gate.entered.notify_one();
            gate.release.notified().await;
        }
        if self.fail_listing.load(Ordering::SeqCst) {
            return Err(InboxError::Transport("connection refused".to_string()));
        }
        Ok(self
            .messages
            .lock()
            .unwrap()
            .iter()
            .filter(|m| !m.is_read)
            .take(max_results as usize)
            .cloned()
            .collect())
    }

    async fn list_all(&self, max_results: u32) -> Result<Vec<MailMessage>> {
        Ok(self
            .messages
            .lock()
            .unwrap()
            .iter()
            .take(max_results as usize)
            .cloned()
            .collect())
    }

    async fn mark_read(&self, message_id: &str) -> Result<()> {
        self.marked_read.lock().unwrap().push(message_id.to_string());
        for message in self.messages.lock().unwrap().iter_mut() {
            if message.id == message_id {
                message.is_read = true;
            }
        }
        Ok(())
    }

    async fn list_attachments(&self, message_id: &str) -> Result<Vec<AttachmentMeta>> {
        Ok(self
            .attachments
            .lock()
            .unwrap()
            .get(message_id)
            .map(|items| items.iter().map(|a| a.meta.clone()).collect())
            .unwrap_or_default())
    }

    async fn download_attachment(
        &self,
        message_id: &str,
        attachment_id: &str,
    ) -> Result<DownloadedAttachment> {
        let fixture = self
            .attachments
            .lock()
            .unwrap()
            .get(message_id)
            .and_then(|items| items.iter().find(|a| a.meta.id == attachment_id).cloned())
            .ok_or_else(|| InboxError::Api {
                status: 404,
                body: "ErrorItemNotFound".to_string(),
            })?;

        let bytes = fixture.bytes.ok_or_else(|| InboxError::Api {
            status: 500,
            body: "download failed".to_string(),
        })?;
        Ok(DownloadedAttachment {
            name: fixture.meta.name,
            content_type: fixture.meta.content_type,
            size: bytes.len() as u64,
            bytes,
        })
    }
}

/// Captures outbound mail instead of sending it.
#[derive(Default)]
pub struct RecordingTransport {
    sent: Mutex<Vec<OutgoingMail>>,
    fail: AtomicBool,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<OutgoingMail> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl MailTransport for RecordingTransport {
    async fn send(&self, mail: &OutgoingMail) -> Result<SendReceipt> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(InboxError::Send("relay rejected message".to_string()));
        }
        self.sent.lock().unwrap().push(mail.clone());
        Ok(SendReceipt {
            message_id: Some(format!("<{}@test>", self.sent.lock().unwrap().len())),
        })
    }

    fn name(&self) -> &'static str {
        "recording"
    }
}
