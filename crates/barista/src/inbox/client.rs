//! Mailbox access: the [`MailboxClient`] trait and its Microsoft Graph
//! implementation.

use std::sync::Arc;

use async_trait::async_trait;
use base64::Engine;
use log::debug;
use reqwest::Client;
use secrecy::ExposeSecret;
use serde::Deserialize;

use crate::config::GraphConfig;

use super::error::{InboxError, Result};
use super::graph::{check_status, GraphAuth, GraphSession};
use super::types::{AttachmentMeta, DownloadedAttachment, MailMessage};

const MESSAGE_FIELDS: &str =
    "id,subject,from,receivedDateTime,bodyPreview,body,isRead,hasAttachments";

/// Read-side operations the engine needs from a mailbox.
#[async_trait]
pub trait MailboxClient: Send + Sync {
    /// Unread inbox messages, newest first.
    async fn list_unread(&self, max_results: u32) -> Result<Vec<MailMessage>>;

    /// Inbox messages regardless of read state, newest first.
    async fn list_all(&self, max_results: u32) -> Result<Vec<MailMessage>>;

    async fn mark_read(&self, message_id: &str) -> Result<()>;

    /// Metadata for every attachment, inline ones included.
    async fn list_attachments(&self, message_id: &str) -> Result<Vec<AttachmentMeta>>;

    async fn download_attachment(
        &self,
        message_id: &str,
        attachment_id: &str,
    ) -> Result<DownloadedAttachment>;
}

#[derive(Deserialize)]
struct GraphList<T> {
    value: Vec<T>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GraphMessage {
    id: String,
    #[serde(default)]
    subject: Option<String>,
    #[serde(default)]
    from: Option<GraphRecipient>,
    #[serde(default)]
    received_date_time: Option<String>,
    #[serde(default)]
    body_preview: Option<String>,
    #[serde(default)]
    body: Option<GraphBody>,
    #[serde(default)]
    is_read: bool,
    #[serde(default)]
    has_attachments: bool,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GraphRecipient {
    email_address: GraphEmailAddress,
}

#[derive(Deserialize)]
struct GraphEmailAddress {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    address: Option<String>,
}

#[derive(Deserialize)]
struct GraphBody {
    #[serde(default)]
    content: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct GraphAttachment {
    id: String,
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    content_type: Option<String>,
    #[serde(default)]
    size: u64,
    #[serde(default)]
    is_inline: bool,
    #[serde(default)]
    content_bytes: Option<String>,
}

impl From<GraphMessage> for MailMessage {
    fn from(msg: GraphMessage) -> Self {
        let (from_address, from_name) = match msg.from {
            Some(r) => (
                r.email_address.address.unwrap_or_default(),
                r.email_address.name.filter(|n| !n.is_empty()),
            ),
            None => (String::new(), None),
        };

        MailMessage {
            id: msg.id,
            subject: msg.subject.unwrap_or_default(),
            from_address,
            from_name,
            received_at: msg.received_date_time,
            body_preview: msg.body_preview.unwrap_or_default(),
            body: msg.body.map(|b| b.content).unwrap_or_default(),
            is_read: msg.is_read,
            has_attachments: msg.has_attachments,
        }
    }
}

/// [`MailboxClient`] over Microsoft Graph v1.0 with app-only credentials.
pub struct GraphMailboxClient {
    client: Client,
    auth: Arc<GraphAuth>,
    base_url: String,
    mailbox: String,
}

impl GraphMailboxClient {
    pub fn new(config: &GraphConfig, mailbox: &str) -> Result<Self> {
        Ok(Self::from_session(&GraphSession::new(config)?, mailbox))
    }

    /// Builds a client that shares the session's token cache with other
    /// Graph consumers such as the send transport.
    pub fn from_session(session: &GraphSession, mailbox: &str) -> Self {
        Self {
            client: session.client.clone(),
            auth: Arc::clone(&session.auth),
            base_url: session.base_url.clone(),
            mailbox: mailbox.to_string(),
        }
    }

    fn messages_url(&self) -> String {
        format!(
            "{}/users/{}/mailFolders/inbox/messages",
            self.base_url, self.mailbox
        )
    }

    fn message_url(&self, message_id: &str) -> String {
        format!("{}/users/{}/messages/{}", self.base_url, self.mailbox, message_id)
    }

    async fn list(&self, max_results: u32, unread_only: bool) -> Result<Vec<MailMessage>> {
        let token = self.auth.access_token().await?;
        let top = max_results.to_string();
        let mut query: Vec<(&str, &str)> = vec![
            ("$top", top.as_str()),
            ("$orderby", "receivedDateTime desc"),
            ("$select", MESSAGE_FIELDS),
        ];
        if unread_only {
            query.push(("$filter", "isRead eq false"));
        }

        let response = self
            .client
            .get(self.messages_url())
            .bearer_auth(token.expose_secret())
            .query(&query)
            .send()
            .await?;
        let list: GraphList<GraphMessage> = check_status(response).await?.json().await?;

        debug!("Graph listed {} message(s)", list.value.len());
        Ok(list.value.into_iter().map(MailMessage::from).collect())
    }
}

#[async_trait]
impl MailboxClient for GraphMailboxClient {
    async fn list_unread(&self, max_results: u32) -> Result<Vec<MailMessage>> {
        self.list(max_results, true).await
    }

    async fn list_all(&self, max_results: u32) -> Result<Vec<MailMessage>> {
        self.list(max_results, false).await
    }

    async fn mark_read(&self, message_id: &str) -> Result<()> {
        let token = self.auth.access_token().await?;
        let response = self
            .client
            .patch(self.message_url(message_id))
            .bearer_auth(token.expose_secret())
            .json(&serde_json::json!({ "isRead": true }))
            .send()
            .await?;
        check_status(response).await?;
        Ok(())
    }

    async fn list_attachments(&self, message_id: &str) -> Result<Vec<AttachmentMeta>> {
        let token = self.auth.access_token().await?;
        let response = self
            .client
            .get(format!("{}/attachments", self.message_url(message_id)))
            .bearer_auth(token.expose_secret())
            .query(&[("$select", "id,name,contentType,size,isInline")])
            .send()
            .await?;
        let list: GraphList<GraphAttachment> = check_status(response).await?.json().await?;

        Ok(list
            .value
            .into_iter()
            .map(|a| AttachmentMeta {
                id: a.id,
                name: a.name.unwrap_or_default(),
                content_type: a
                    .content_type
                    .unwrap_or_else(|| "application/octet-stream".to_string()),
                size: a.size,
                is_inline: a.is_inline,
            })
            .collect())
    }

    async fn download_attachment(
        &self,
        message_id: &str,
        attachment_id: &str,
    ) -> Result<DownloadedAttachment> {
        let token = self.auth.access_token().await?;
        let response = self
            .client
            .get(format!(
                "{}/attachments/{}",
                self.message_url(message_id),
                attachment_id
            ))
            .bearer_auth(token.expose_secret())
            .send()
            .await?;
        let attachment: GraphAttachment = check_status(response).await?.json().await?;

        let encoded = attachment.content_bytes.ok_or_else(|| {
            InboxError::Decode(format!("Attachment '{}' has no content", attachment_id))
        })?;
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(encoded.as_bytes())
            .map_err(|e| InboxError::Decode(format!("Invalid attachment encoding: {}", e)))?;

        Ok(DownloadedAttachment {
            name: attachment.name.unwrap_or_default(),
            content_type: attachment
                .content_type
                .unwrap_or_else(|| "application/octet-stream".to_string()),
            size: bytes.len() as u64,
            bytes,
        })
    }
}
