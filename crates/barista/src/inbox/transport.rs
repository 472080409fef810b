//! Outbound mail: the [`MailTransport`] capability and its Graph and SMTP
//! implementations. One is chosen at startup by [`build_transport`].

use std::sync::Arc;

use async_trait::async_trait;
use lettre::message::{Mailbox, MultiPart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use log::{debug, info};
use reqwest::Client;
use secrecy::ExposeSecret;
use serde_json::{json, Value};

use crate::config::{GraphConfig, ServiceConfig, SmtpConfig, TransportKind};

use super::error::{InboxError, Result};
use super::graph::{check_status, GraphAuth, GraphSession};
use super::types::{OutgoingMail, SendReceipt};

/// Sends one message.
#[async_trait]
pub trait MailTransport: Send + Sync {
    async fn send(&self, mail: &OutgoingMail) -> Result<SendReceipt>;

    /// Short name for logs.
    fn name(&self) -> &'static str;
}

/// Builds the transport selected by `transport.kind`.
///
/// A Graph transport reuses `session` when given, so sending and reading
/// share one token cache.
pub fn build_transport(
    config: &ServiceConfig,
    session: Option<&GraphSession>,
) -> Result<Arc<dyn MailTransport>> {
    match config.transport.kind {
        TransportKind::Graph => {
            let session = match session {
                Some(session) => session.clone(),
                None => {
                    let graph = config
                        .graph
                        .as_ref()
                        .ok_or_else(|| InboxError::Config("graph section missing".to_string()))?;
                    GraphSession::new(graph)?
                }
            };
            info!("Outbound mail via Microsoft Graph as {}", config.inbox.mailbox);
            Ok(Arc::new(GraphMailTransport::from_session(
                &session,
                &config.inbox.mailbox,
            )))
        }
        TransportKind::Smtp => {
            let smtp = config
                .smtp
                .as_ref()
                .ok_or_else(|| InboxError::Config("smtp section missing".to_string()))?;
            info!("Outbound mail via SMTP relay {}:{}", smtp.host, smtp.port);
            Ok(Arc::new(SmtpMailTransport::new(smtp)?))
        }
    }
}

/// Sends through `POST /users/{mailbox}/sendMail`.
pub struct GraphMailTransport {
    client: Client,
    auth: Arc<GraphAuth>,
    send_url: String,
}

impl GraphMailTransport {
    pub fn new(config: &GraphConfig, mailbox: &str) -> Result<Self> {
        Ok(Self::from_session(&GraphSession::new(config)?, mailbox))
    }

    pub fn from_session(session: &GraphSession, mailbox: &str) -> Self {
        Self {
            client: session.client.clone(),
            auth: Arc::clone(&session.auth),
            send_url: format!("{}/users/{}/sendMail", session.base_url, mailbox),
        }
    }
}

fn graph_recipients(addresses: &[String]) -> Value {
    Value::Array(
        addresses
            .iter()
            .map(|a| json!({ "emailAddress": { "address": a } }))
            .collect(),
    )
}

fn graph_payload(mail: &OutgoingMail) -> Value {
    let mut message = json!({
        "subject": mail.subject,
        "body": { "contentType": "HTML", "content": mail.html },
        "toRecipients": graph_recipients(&mail.to),
    });
    if !mail.cc.is_empty() {
        message["ccRecipients"] = graph_recipients(&mail.cc);
    }
    if !mail.bcc.is_empty() {
        message["bccRecipients"] = graph_recipients(&mail.bcc);
    }
    if let Some(reply_to) = &mail.reply_to {
        message["replyTo"] = graph_recipients(std::slice::from_ref(reply_to));
    }
    json!({ "message": message, "saveToSentItems": true })
}

#[async_trait]
impl MailTransport for GraphMailTransport {
    async fn send(&self, mail: &OutgoingMail) -> Result<SendReceipt> {
        if mail.to.is_empty() {
            return Err(InboxError::Send("no recipients".to_string()));
        }

        let token = self.auth.access_token().await?;
        let response = self
            .client
            .post(&self.send_url)
            .bearer_auth(token.expose_secret())
            .json(&graph_payload(mail))
            .send()
            .await?;
        check_status(response)
            .await
            .map_err(|e| InboxError::Send(e.to_string()))?;

        debug!("Graph accepted message '{}'", mail.subject);
        // sendMail answers 202 without an id.
        Ok(SendReceipt { message_id: None })
    }

    fn name(&self) -> &'static str {
        "graph"
    }
}

/// Sends through an SMTP relay as multipart/alternative.
pub struct SmtpMailTransport {
    mailer: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpMailTransport {
    pub fn new(config: &SmtpConfig) -> Result<Self> {
        let builder = if config.start_tls {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)
                .map_err(|e| InboxError::Config(format!("Invalid SMTP relay: {}", e)))?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(config.host.as_str())
        };
        let mut builder = builder.port(config.port);

        if let (Some(username), Some(password)) = (&config.username, config.password()?) {
            builder = builder.credentials(Credentials::new(
                username.clone(),
                password.expose_secret().to_string(),
            ));
        }

        Ok(Self {
            mailer: builder.build(),
            from: from_mailbox(config)?,
        })
    }
}

fn from_mailbox(config: &SmtpConfig) -> Result<Mailbox> {
    let address = config
        .from_address
        .parse()
        .map_err(|e| InboxError::Config(format!("Invalid fromAddress: {}", e)))?;
    Ok(Mailbox::new(config.from_name.clone(), address))
}

fn parse_mailbox(address: &str) -> Result<Mailbox> {
    address
        .parse()
        .map_err(|e| InboxError::Send(format!("Invalid address '{}': {}", address, e)))
}

/// Builds the MIME message with a generated Message-ID.
fn build_message(from: &Mailbox, mail: &OutgoingMail) -> Result<(Message, String)> {
    if mail.to.is_empty() {
        return Err(InboxError::Send("no recipients".to_string()));
    }

    let domain = from.email.domain().to_string();
    let message_id = format!("<{}@{}>", uuid::Uuid::new_v4(), domain);

    let mut builder = Message::builder()
        .from(from.clone())
        .subject(mail.subject.clone())
        .message_id(Some(message_id.clone()));
    for to in &mail.to {
        builder = builder.to(parse_mailbox(to)?);
    }
    for cc in &mail.cc {
        builder = builder.cc(parse_mailbox(cc)?);
    }
    for bcc in &mail.bcc {
        builder = builder.bcc(parse_mailbox(bcc)?);
    }
    if let Some(reply_to) = &mail.reply_to {
        builder = builder.reply_to(parse_mailbox(reply_to)?);
    }

    let message = builder
        .multipart(MultiPart::alternative_plain_html(
            mail.text.clone(),
            mail.html.clone(),
        ))
        .map_err(|e| InboxError::Send(e.to_string()))?;

    Ok((message, message_id))
}

#[async_trait]
impl MailTransport for SmtpMailTransport {
    async fn send(&self, mail: &OutgoingMail) -> Result<SendReceipt> {
        let (message, message_id) = build_message(&self.from, mail)?;
        self.mailer
            .send(message)
            .await
            .map_err(|e| InboxError::Send(e.to_string()))?;

        Ok(SendReceipt {
            message_id: Some(message_id),
        })
    }

    fn name(&self) -> &'static str {
        "smtp"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::{Matcher, Server};

    fn sample_mail() -> OutgoingMail {
        OutgoingMail {
            to: vec!["a@b.com".to_string()],
            cc: vec!["ops@example.com".to_string()],
            subject: "Re: Broken chair [SUPPORT-7]".to_string(),
            text: "Reference: SUPPORT-7".to_string(),
            html: "<p>Reference: <strong>SUPPORT-7</strong></p>".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_graph_payload_shape() {
        let payload = graph_payload(&sample_mail());
        assert_eq!(payload["message"]["toRecipients"][0]["emailAddress"]["address"], "a@b.com");
        assert_eq!(payload["message"]["ccRecipients"][0]["emailAddress"]["address"], "ops@example.com");
        assert!(payload["message"].get("bccRecipients").is_none());
        assert_eq!(payload["message"]["body"]["contentType"], "HTML");
        assert_eq!(payload["saveToSentItems"], true);
    }

    #[tokio::test]
    async fn test_graph_send_posts_to_mailbox() {
        let mut server = Server::new_async().await;
        let _token = server
            .mock("POST", "/tenant/oauth2/v2.0/token")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"access_token": "send-token", "expires_in": 3600}"#)
            .create_async()
            .await;
        let send_mock = server
            .mock("POST", "/users/support@example.com/sendMail")
            .match_header("authorization", "Bearer send-token")
            .match_body(Matcher::Regex("SUPPORT-7".to_string()))
            .with_status(202)
            .create_async()
            .await;

        let config: GraphConfig = serde_json::from_value(json!({
            "tenantId": "tenant",
            "clientId": "client",
            "clientSecretInsecure": "secret",
            "authorityUrl": server.url(),
            "baseUrl": server.url(),
        }))
        .unwrap();
        let transport = GraphMailTransport::new(&config, "support@example.com").unwrap();

        let receipt = transport.send(&sample_mail()).await.unwrap();
        assert_eq!(receipt.message_id, None);
        send_mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_graph_send_failure_is_send_error() {
        let mut server = Server::new_async().await;
        let _token = server
            .mock("POST", "/tenant/oauth2/v2.0/token")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"access_token": "t", "expires_in": 3600}"#)
            .create_async()
            .await;
        let _send = server
            .mock("POST", "/users/support@example.com/sendMail")
            .with_status(403)
            .with_body("ErrorAccessDenied")
            .create_async()
            .await;

        let config: GraphConfig = serde_json::from_value(json!({
            "tenantId": "tenant",
            "clientId": "client",
            "clientSecretInsecure": "secret",
            "authorityUrl": server.url(),
            "baseUrl": server.url(),
        }))
        .unwrap();
        let transport = GraphMailTransport::new(&config, "support@example.com").unwrap();

        let err = transport.send(&sample_mail()).await.unwrap_err();
        assert!(matches!(err, InboxError::Send(ref msg) if msg.contains("403")));
    }

    #[test]
    fn test_smtp_message_is_multipart_alternative() {
        let from = Mailbox::new(Some("Barista".to_string()), "noreply@example.com".parse().unwrap());
        let (message, message_id) = build_message(&from, &sample_mail()).unwrap();
        let raw = String::from_utf8(message.formatted()).unwrap();

        assert!(message_id.ends_with("@example.com>"));
        assert!(raw.contains("multipart/alternative"));
        assert!(raw.contains("Subject: Re: Broken chair [SUPPORT-7]"));
        assert!(raw.contains("Cc: ops@example.com"));
        assert!(raw.contains("text/html"));
    }

    #[test]
    fn test_smtp_rejects_bad_recipient() {
        let from = Mailbox::new(None, "noreply@example.com".parse().unwrap());
        let mut mail = sample_mail();
        mail.to = vec!["not an address".to_string()];
        assert!(matches!(build_message(&from, &mail), Err(InboxError::Send(_))));

        mail.to.clear();
        assert!(matches!(build_message(&from, &mail), Err(InboxError::Send(_))));
    }

    #[tokio::test]
    async fn test_build_transport_selects_smtp() {
        let config: ServiceConfig = serde_json::from_value(json!({
            "version": "1.0",
            "inbox": { "mailbox": "support@example.com" },
            "transport": { "kind": "smtp" },
            "smtp": { "host": "localhost", "port": 2525, "startTls": false,
                      "fromAddress": "noreply@example.com" }
        }))
        .unwrap();
        let transport = build_transport(&config, None).unwrap();
        assert_eq!(transport.name(), "smtp");
    }

    #[tokio::test]
    async fn test_session_shares_token_between_reading_and_sending() {
        use crate::inbox::client::{GraphMailboxClient, MailboxClient};

        let mut server = Server::new_async().await;
        let token_mock = server
            .mock("POST", "/tenant/oauth2/v2.0/token")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"access_token": "shared-token", "expires_in": 3600}"#)
            .expect(1)
            .create_async()
            .await;
        let _list = server
            .mock(
                "GET",
                Matcher::Regex(r"^/users/support@example.com/mailFolders/inbox/messages".to_string()),
            )
            .match_header("authorization", "Bearer shared-token")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"value": []}"#)
            .create_async()
            .await;
        let _send = server
            .mock("POST", "/users/support@example.com/sendMail")
            .match_header("authorization", "Bearer shared-token")
            .with_status(202)
            .create_async()
            .await;

        let config: GraphConfig = serde_json::from_value(json!({
            "tenantId": "tenant",
            "clientId": "client",
            "clientSecretInsecure": "secret",
            "authorityUrl": server.url(),
            "baseUrl": server.url(),
        }))
        .unwrap();
        let session = GraphSession::new(&config).unwrap();
        let mailbox = GraphMailboxClient::from_session(&session, "support@example.com");
        let transport = GraphMailTransport::from_session(&session, "support@example.com");

        assert!(mailbox.list_unread(5).await.unwrap().is_empty());
        transport.send(&sample_mail()).await.unwrap();
        token_mock.assert_async().await;
    }
}
