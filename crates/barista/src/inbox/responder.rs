//! Acknowledgment emails for ingested messages.

use std::sync::Arc;

use log::info;

use crate::sanitize::redact_email;
use crate::settings::{SettingsStore, SITE_NAME};

use super::error::Result;
use super::transport::MailTransport;
use super::types::{OutgoingMail, SendReceipt};

/// Site name used when the `site_name` setting is absent.
pub const DEFAULT_SITE_NAME: &str = "BaristaCMS";

/// What the acknowledgment refers to.
#[derive(Debug, Clone)]
pub struct Acknowledgment {
    pub to_address: String,
    pub to_name: Option<String>,
    pub module_name: String,
    pub module_display_name: String,
    pub record_id: i64,
    pub original_subject: String,
}

impl Acknowledgment {
    /// `<MODULE_UPPER>-<recordId>`, e.g. `SUPPORT-42`.
    pub fn reference(&self) -> String {
        format!("{}-{}", self.module_name.to_uppercase(), self.record_id)
    }
}

/// Builds the acknowledgment message. Pure; see [`AutoResponder`] for
/// dispatch.
pub fn compose(ack: &Acknowledgment, site_name: &str) -> OutgoingMail {
    let reference = ack.reference();
    let greeting_name = ack
        .to_name
        .as_deref()
        .filter(|n| !n.trim().is_empty())
        .unwrap_or(ack.to_address.as_str());

    let subject = format!("Re: {} [{}]", ack.original_subject, reference);

    let text = format!(
        "Hello {name},\n\n\
         Thank you for contacting {site}. Your message has been received and \
         logged in {module}.\n\n\
         Reference number: {reference}\n\n\
         Please include this reference number in any follow-up correspondence.\n\n\
         Best regards,\n{site}",
        name = greeting_name,
        site = site_name,
        module = ack.module_display_name,
        reference = reference,
    );

    let html = format!(
        "<div style=\"font-family: Arial, sans-serif; line-height: 1.5;\">\
         <p>Hello {name},</p>\
         <p>Thank you for contacting {site}. Your message has been received and \
         logged in <strong>{module}</strong>.</p>\
         <p>Reference number: <strong>{reference}</strong></p>\
         <p>Please include this reference number in any follow-up correspondence.</p>\
         <p>Best regards,<br>{site}</p>\
         </div>",
        name = escape_html(greeting_name),
        site = escape_html(site_name),
        module = escape_html(&ack.module_display_name),
        reference = escape_html(&reference),
    );

    OutgoingMail {
        to: vec![ack.to_address.clone()],
        subject,
        text,
        html,
        ..Default::default()
    }
}

fn escape_html(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

/// Sends acknowledgments through the configured transport.
#[derive(Clone)]
pub struct AutoResponder {
    transport: Arc<dyn MailTransport>,
    settings: SettingsStore,
}

impl AutoResponder {
    pub fn new(transport: Arc<dyn MailTransport>, settings: SettingsStore) -> Self {
        Self {
            transport,
            settings,
        }
    }

    pub async fn send_acknowledgment(&self, ack: &Acknowledgment) -> Result<SendReceipt> {
        let site_name = self.settings.get_or(SITE_NAME, DEFAULT_SITE_NAME)?;
        let mail = compose(ack, &site_name);

        let receipt = self.transport.send(&mail).await?;
        info!(
            "Acknowledgment {} sent to {} via {}",
            ack.reference(),
            redact_email(&ack.to_address),
            self.transport.name()
        );
        Ok(receipt)
    }
}
