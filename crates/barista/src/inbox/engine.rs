//! The ingestion pass: turns tagged inbound mail into module records.
//!
//! Messages are handled one at a time, in mailbox order. Each message walks
//! a linear pipeline (dedup, route, create, materialize, acknowledge, mark
//! read) and leaves at most one ledger row behind.

use std::sync::Arc;

use serde::Serialize;
use serde_json::json;
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::config::InboxConfig;
use crate::db::ledger_repo::{self, LedgerStatus};
use crate::db::module_repo::{self, ModuleRow};
use crate::db::record_repo::{self, NewRecord};
use crate::db::Database;
use crate::sanitize::{hash_id, redact_email};
use crate::settings::{SettingsStore, ENABLE_DEBUG_LOGGING};
use crate::storage::{UploadKind, UploadStore};

use super::content::{extract_links, to_plain_text, MAX_LINK_LENGTH};
use super::error::{InboxError, Result};
use super::responder::{Acknowledgment, AutoResponder};
use super::subject::{parse_tag, TaggedSubject};
use super::tracker::{ledger_row, LedgerTracker};
use super::types::MailMessage;
use super::MailboxClient;

pub const NO_TAG_REASON: &str = "No module tag in subject";
pub const INBOX_DISABLED_REASON: &str = "Email inbox not enabled for module";
pub const AUTO_PROCESS_DISABLED_REASON: &str = "Automatic processing disabled for module";
pub const ALREADY_PROCESSED_REASON: &str = "Already processed";

const RECORD_STATUS: &str = "active";
const FALLBACK_RECORD_NAME: &str = "Email";
const HISTORY_USER: &str = "system";

/// Logs at info when pass diagnostics are switched on, at debug otherwise.
macro_rules! step {
    ($verbose:expr, $($arg:tt)+) => {
        if $verbose {
            info!($($arg)+)
        } else {
            debug!($($arg)+)
        }
    };
}

/// Limits applied to every pass.
#[derive(Debug, Clone, Copy)]
pub struct EngineOptions {
    /// Messages fetched per pass.
    pub max_results: u32,
    /// Attachments above this size are not stored.
    pub max_attachment_bytes: u64,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            max_results: 50,
            max_attachment_bytes: 25 * 1024 * 1024,
        }
    }
}

impl From<&InboxConfig> for EngineOptions {
    fn from(config: &InboxConfig) -> Self {
        Self {
            max_results: config.max_results,
            max_attachment_bytes: config.max_attachment_bytes,
        }
    }
}

/// One message's entry in a [`PassSummary`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PassItem {
    pub email_id: String,
    pub subject: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub module: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub record_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// What a pass (automatic, manual or single-message) did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PassSummary {
    pub processed: Vec<PassItem>,
    pub skipped: Vec<PassItem>,
    pub errors: Vec<PassItem>,
    pub processed_count: usize,
    pub skipped_count: usize,
    pub error_count: usize,
    /// `enable_debug_logging` as read when the pass started.
    pub debug_logging: bool,
}

impl PassSummary {
    fn push(&mut self, message: &MailMessage, outcome: Outcome) {
        let mut item = PassItem {
            email_id: message.id.clone(),
            subject: message.subject.clone(),
            module: None,
            record_id: None,
            reason: None,
        };
        match outcome {
            Outcome::Processed { module, record_id } => {
                item.module = Some(module);
                item.record_id = Some(record_id);
                self.processed.push(item);
                self.processed_count += 1;
            }
            Outcome::Skipped { module, reason } => {
                item.module = module;
                item.reason = Some(reason);
                self.skipped.push(item);
                self.skipped_count += 1;
            }
            Outcome::Failed { module, reason } => {
                item.module = module;
                item.reason = Some(reason);
                self.errors.push(item);
                self.error_count += 1;
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.processed_count + self.skipped_count + self.error_count == 0
    }
}

/// An unread, unledgered message with its parsed routing tag.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UnprocessedMessage {
    #[serde(flatten)]
    pub message: MailMessage,
    pub tag: Option<String>,
    pub clean_subject: String,
}

#[derive(Debug)]
enum Outcome {
    Processed { module: String, record_id: i64 },
    Skipped { module: Option<String>, reason: String },
    Failed { module: Option<String>, reason: String },
}

/// How a message reached the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Trigger {
    /// Scheduler tick or "process now": only auto-processing modules.
    Automatic,
    /// Operator action on one message.
    Manual,
}

/// Counts gathered while materializing a record's children.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct Materialized {
    images: usize,
    documents: usize,
    links: usize,
}

/// Drives ingestion passes against one mailbox.
pub struct IngestionEngine {
    mailbox: Arc<dyn MailboxClient>,
    db: Database,
    tracker: LedgerTracker,
    uploads: UploadStore,
    responder: AutoResponder,
    settings: SettingsStore,
    options: EngineOptions,
}

impl IngestionEngine {
    pub fn new(
        mailbox: Arc<dyn MailboxClient>,
        db: Database,
        uploads: UploadStore,
        responder: AutoResponder,
        settings: SettingsStore,
        options: EngineOptions,
    ) -> Self {
        Self {
            mailbox,
            tracker: LedgerTracker::new(db.clone()),
            db,
            uploads,
            responder,
            settings,
            options,
        }
    }

    /// Runs one automatic pass over the unread inbox.
    ///
    /// Fails only when candidate modules or the unread list cannot be
    /// loaded; in that case nothing is written. Per-message failures are
    /// reported in the summary.
    pub async fn run_pass(&self) -> Result<PassSummary> {
        let span = info_span!("email_pass", trigger = "automatic");
        self.automatic_pass().instrument(span).await
    }

    async fn automatic_pass(&self) -> Result<PassSummary> {
        let verbose = self.debug_enabled();

        let candidates = module_repo::list_auto_process(&self.db)?;
        if candidates.is_empty() {
            step!(verbose, "No modules with automatic email processing, skipping pass");
            return Ok(PassSummary {
                debug_logging: verbose,
                ..PassSummary::default()
            });
        }
        step!(
            verbose,
            "{} module(s) accept automatic email processing",
            candidates.len()
        );

        let messages = self
            .mailbox
            .list_unread(self.options.max_results)
            .await
            .inspect_err(|e| error!("Failed to fetch unread messages: {}", e))?;
        let fetched = messages.len();
        let messages = self.tracker.filter_unprocessed(messages)?;
        info!(
            "Fetched {} unread message(s), {} not yet processed",
            fetched,
            messages.len()
        );

        let mut summary = PassSummary {
            debug_logging: verbose,
            ..PassSummary::default()
        };
        for message in &messages {
            let span = info_span!("email_message", email_id = %hash_id(&message.id));
            let outcome = self
                .process_message(message, None, Trigger::Automatic, verbose)
                .instrument(span)
                .await;
            summary.push(message, outcome);
        }

        info!(
            "Email pass finished: {} processed, {} skipped, {} error(s)",
            summary.processed_count, summary.skipped_count, summary.error_count
        );
        Ok(summary)
    }

    /// Processes one message by id on operator request.
    ///
    /// `module_override` replaces the subject tag when given; an untagged
    /// message without one is rejected and left unledgered. Only
    /// `enableEmailInbox` is required of the target module.
    pub async fn process_single(
        &self,
        message_id: &str,
        module_override: Option<&str>,
    ) -> Result<PassSummary> {
        let span = info_span!("email_pass", trigger = "manual", email_id = %hash_id(message_id));
        self.manual_pass(message_id, module_override)
            .instrument(span)
            .await
    }

    async fn manual_pass(
        &self,
        message_id: &str,
        module_override: Option<&str>,
    ) -> Result<PassSummary> {
        let verbose = self.debug_enabled();

        if self.tracker.is_processed(message_id)? {
            return Err(InboxError::AlreadyProcessed(message_id.to_string()));
        }

        let messages = self.mailbox.list_all(self.options.max_results).await?;
        let message = messages
            .into_iter()
            .find(|m| m.id == message_id)
            .ok_or_else(|| InboxError::MessageNotFound(message_id.to_string()))?;

        let module_override = module_override.map(str::trim).filter(|m| !m.is_empty());
        // Nothing is ledgered so the operator can retry with a module name.
        if module_override.is_none() && parse_tag(&message.subject).tag.is_none() {
            return Err(InboxError::ModuleRequired(message_id.to_string()));
        }

        let outcome = self
            .process_message(&message, module_override, Trigger::Manual, verbose)
            .await;

        if matches!(&outcome, Outcome::Skipped { reason, .. } if reason == ALREADY_PROCESSED_REASON)
        {
            return Err(InboxError::AlreadyProcessed(message_id.to_string()));
        }

        let mut summary = PassSummary {
            debug_logging: verbose,
            ..PassSummary::default()
        };
        summary.push(&message, outcome);
        Ok(summary)
    }

    /// Lists unread messages that have no ledger row yet.
    pub async fn list_unprocessed(&self, limit: u32) -> Result<Vec<UnprocessedMessage>> {
        let messages = self.mailbox.list_unread(limit).await?;
        let messages = self.tracker.filter_unprocessed(messages)?;
        Ok(messages
            .into_iter()
            .map(|message| {
                let TaggedSubject { tag, clean_subject } = parse_tag(&message.subject);
                UnprocessedMessage {
                    message,
                    tag,
                    clean_subject,
                }
            })
            .collect())
    }

    /// Re-read on every pass so diagnostics can be toggled at runtime.
    fn debug_enabled(&self) -> bool {
        match self.settings.get_fresh(ENABLE_DEBUG_LOGGING) {
            Ok(value) => value.is_some_and(|v| v.trim().eq_ignore_ascii_case("true")),
            Err(e) => {
                warn!("Could not read {}: {}", ENABLE_DEBUG_LOGGING, e);
                false
            }
        }
    }

    async fn process_message(
        &self,
        message: &MailMessage,
        module_override: Option<&str>,
        trigger: Trigger,
        verbose: bool,
    ) -> Outcome {
        let tagged = parse_tag(&message.subject);
        step!(
            verbose,
            "Processing message from {} (tag: {:?})",
            redact_email(&message.from_address),
            tagged.tag
        );

        let module = match self.resolve_module(message, &tagged, module_override, trigger) {
            Ok(module) => module,
            Err(outcome) => return outcome,
        };

        let record_id = match self.create_record(message, &tagged, &module) {
            Ok(record_id) => record_id,
            Err(outcome) => return outcome,
        };
        step!(verbose, "Created record {} in module '{}'", record_id, module.name);

        let mut counts = self.store_attachments(message, record_id).await;
        counts.links = self.store_links(message, record_id);
        step!(
            verbose,
            "Stored {} image(s), {} document(s), {} link(s)",
            counts.images,
            counts.documents,
            counts.links
        );

        let summary = history_summary(counts);
        if let Err(e) =
            record_repo::insert_history(&self.db, record_id, "created", &summary, Some(HISTORY_USER))
        {
            warn!("Failed to write history for record {}: {}", record_id, e);
        }

        if module.routing.auto_response {
            self.acknowledge(message, &tagged, &module, record_id).await;
        } else {
            step!(verbose, "Auto-response disabled for module '{}'", module.name);
        }

        if let Err(e) = self.mailbox.mark_read(&message.id).await {
            warn!("Failed to mark message as read: {}", e);
        }

        Outcome::Processed {
            module: module.name,
            record_id,
        }
    }

    /// Tag, module lookup and inbox checks. Terminal routing failures are
    /// written to the ledger here and come back as the outcome.
    fn resolve_module(
        &self,
        message: &MailMessage,
        tagged: &TaggedSubject,
        module_override: Option<&str>,
        trigger: Trigger,
    ) -> std::result::Result<ModuleRow, Outcome> {
        let Some(name) = module_override.or(tagged.tag.as_deref()) else {
            info!("Skipping message: {}", NO_TAG_REASON);
            return Err(self.terminal(message, None, None, LedgerStatus::Skipped, NO_TAG_REASON));
        };

        let module = match module_repo::find_active_by_name(&self.db, name) {
            Ok(Some(module)) => module,
            Ok(None) => {
                let reason = format!("Module '{}' not found", name);
                warn!("{}", reason);
                return Err(self.terminal(message, None, None, LedgerStatus::Error, &reason));
            }
            Err(e) => {
                error!("Module lookup failed: {}", e);
                return Err(Outcome::Failed {
                    module: Some(name.to_string()),
                    reason: e.to_string(),
                });
            }
        };

        if !module.routing.enable_email_inbox {
            info!("Skipping message for '{}': {}", module.name, INBOX_DISABLED_REASON);
            return Err(self.terminal(
                message,
                Some(module.id),
                Some(module.name),
                LedgerStatus::Skipped,
                INBOX_DISABLED_REASON,
            ));
        }

        // Left unledgered so an operator can still process it by hand.
        if trigger == Trigger::Automatic && !module.routing.auto_process_emails {
            debug!("Leaving message for '{}' to manual processing", module.name);
            return Err(Outcome::Skipped {
                module: Some(module.name),
                reason: AUTO_PROCESS_DISABLED_REASON.to_string(),
            });
        }

        Ok(module)
    }

    fn terminal(
        &self,
        message: &MailMessage,
        module_id: Option<i64>,
        module: Option<String>,
        status: LedgerStatus,
        reason: &str,
    ) -> Outcome {
        if let Err(e) = self.tracker.record_terminal(message, module_id, status, reason) {
            error!("Failed to write ledger row: {}", e);
        }
        match status {
            LedgerStatus::Error => Outcome::Failed {
                module,
                reason: reason.to_string(),
            },
            _ => Outcome::Skipped {
                module,
                reason: reason.to_string(),
            },
        }
    }

    /// The record and its `processed` ledger row commit
    /// together or not at all.
    fn create_record(
        &self,
        message: &MailMessage,
        tagged: &TaggedSubject,
        module: &ModuleRow,
    ) -> std::result::Result<i64, Outcome> {
        let record = new_record(message, tagged, module.id);

        let result = self.db.with_transaction(|conn| {
            let record_id = record_repo::insert_record(conn, &record)?;
            let row = ledger_row(
                message,
                Some(module.id),
                Some(record_id),
                LedgerStatus::Processed,
                None,
            );
            ledger_repo::insert(conn, &row)?;
            Ok(record_id)
        });

        match result {
            Ok(record_id) => Ok(record_id),
            Err(e) if e.is_unique_violation() => {
                info!("Message was processed concurrently, record rolled back");
                Err(Outcome::Skipped {
                    module: Some(module.name.clone()),
                    reason: ALREADY_PROCESSED_REASON.to_string(),
                })
            }
            Err(e) => {
                // No ledger row: the message is retried on the next pass.
                error!("Failed to create record in module '{}': {}", module.name, e);
                Err(Outcome::Failed {
                    module: Some(module.name.clone()),
                    reason: format!("Failed to create record: {}", e),
                })
            }
        }
    }

    /// Inline attachments are included too; some providers
    /// leave them out of `hasAttachments`.
    async fn store_attachments(&self, message: &MailMessage, record_id: i64) -> Materialized {
        let mut counts = Materialized::default();

        let attachments = match self.mailbox.list_attachments(&message.id).await {
            Ok(attachments) => attachments,
            Err(e) => {
                warn!("Failed to list attachments: {}", e);
                return counts;
            }
        };

        for meta in attachments {
            if meta.size > self.options.max_attachment_bytes {
                warn!(
                    "Skipping attachment of {} bytes (limit {})",
                    meta.size, self.options.max_attachment_bytes
                );
                continue;
            }

            match self.store_attachment(&message.id, &meta.id, record_id).await {
                Ok(UploadKind::Image) => counts.images += 1,
                Ok(UploadKind::Document) => counts.documents += 1,
                Err(e) => warn!("Failed to store attachment: {}", e),
            }
        }

        counts
    }

    async fn store_attachment(
        &self,
        message_id: &str,
        attachment_id: &str,
        record_id: i64,
    ) -> Result<UploadKind> {
        let attachment = self
            .mailbox
            .download_attachment(message_id, attachment_id)
            .await?;
        if attachment.bytes.len() as u64 > self.options.max_attachment_bytes {
            return Err(InboxError::Config(format!(
                "attachment of {} bytes exceeds the size limit",
                attachment.bytes.len()
            )));
        }

        let kind = UploadKind::from_content_type(&attachment.content_type);
        let stored = self.uploads.save(
            kind,
            &attachment.name,
            &attachment.content_type,
            &attachment.bytes,
        )?;
        record_repo::insert_file(
            &self.db,
            kind,
            record_id,
            &stored.relative_path,
            &attachment.name,
            &attachment.content_type,
            attachment.bytes.len() as u64,
        )?;
        debug!("Stored attachment as {}", stored.relative_path);
        Ok(kind)
    }

    fn store_links(&self, message: &MailMessage, record_id: i64) -> usize {
        let mut stored = 0;
        for link in extract_links(&message.body) {
            if link.url.len() > MAX_LINK_LENGTH {
                warn!("Skipping link of {} characters", link.url.len());
                continue;
            }
            match record_repo::insert_link(&self.db, record_id, &link.url, &link.title) {
                Ok(_) => stored += 1,
                Err(e) => warn!("Failed to store link: {}", e),
            }
        }
        stored
    }

    /// A failed send never changes the message's outcome.
    async fn acknowledge(
        &self,
        message: &MailMessage,
        tagged: &TaggedSubject,
        module: &ModuleRow,
        record_id: i64,
    ) {
        if message.from_address.is_empty() {
            debug!("No sender address, skipping acknowledgment");
            return;
        }

        let ack = Acknowledgment {
            to_address: message.from_address.clone(),
            to_name: message.from_name.clone(),
            module_name: module.name.clone(),
            module_display_name: module.display_name.clone(),
            record_id,
            original_subject: tagged.clean_subject.clone(),
        };

        match self.responder.send_acknowledgment(&ack).await {
            Ok(_) => {
                let description = format!(
                    "Confirmation email sent to {} with reference {}",
                    message.from_address,
                    ack.reference()
                );
                if let Err(e) = record_repo::insert_history(
                    &self.db,
                    record_id,
                    "email_sent",
                    &description,
                    Some(HISTORY_USER),
                ) {
                    warn!("Failed to write history for record {}: {}", record_id, e);
                }
            }
            Err(e) => warn!("Failed to send acknowledgment: {}", e),
        }
    }
}

fn new_record(message: &MailMessage, tagged: &TaggedSubject, module_id: i64) -> NewRecord {
    let source = if message.body.trim().is_empty() {
        &message.body_preview
    } else {
        &message.body
    };

    let name = if tagged.clean_subject.trim().is_empty() {
        FALLBACK_RECORD_NAME.to_string()
    } else {
        tagged.clean_subject.clone()
    };

    NewRecord {
        module_id,
        name,
        status: RECORD_STATUS.to_string(),
        data: json!({
            "description": to_plain_text(source),
            "email_from": message.from_address,
            "email_from_name": message.from_name,
            "email_subject": tagged.clean_subject,
            "email_received_at": message.received_at,
        }),
        author: message.from_address.clone(),
    }
}

/// "Record created from email with 2 image(s) and 1 document(s), 3 link(s)",
/// leaving out zero counts.
fn history_summary(counts: Materialized) -> String {
    let mut attachments = Vec::new();
    if counts.images > 0 {
        attachments.push(format!("{} image(s)", counts.images));
    }
    if counts.documents > 0 {
        attachments.push(format!("{} document(s)", counts.documents));
    }

    let mut clauses = Vec::new();
    if !attachments.is_empty() {
        clauses.push(attachments.join(" and "));
    }
    if counts.links > 0 {
        clauses.push(format!("{} link(s)", counts.links));
    }

    if clauses.is_empty() {
        "Record created from email".to_string()
    } else {
        format!("Record created from email with {}", clauses.join(", "))
    }
}
