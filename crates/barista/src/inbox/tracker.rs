//! Ledger-backed tracking of observed inbound messages.

use chrono::Utc;
use log::debug;

use crate::db::ledger_repo::{self, LedgerStatus, ProcessedEmailRow};
use crate::db::{Database, DatabaseError};

use super::types::MailMessage;

/// Wraps the `processed_emails` ledger for the engine.
#[derive(Clone)]
pub struct LedgerTracker {
    db: Database,
}

impl LedgerTracker {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Checks if a message already has a ledger row.
    pub fn is_processed(&self, email_id: &str) -> Result<bool, DatabaseError> {
        Ok(ledger_repo::find_by_email_id(&self.db, email_id)?.is_some())
    }

    /// Drops messages that already have a ledger row, keeping mailbox order.
    pub fn filter_unprocessed(
        &self,
        messages: Vec<MailMessage>,
    ) -> Result<Vec<MailMessage>, DatabaseError> {
        if messages.is_empty() {
            return Ok(messages);
        }

        let ids: Vec<String> = messages.iter().map(|m| m.id.clone()).collect();
        let known = ledger_repo::find_known_ids(&self.db, &ids)?;
        let total = messages.len();

        let unprocessed: Vec<MailMessage> = messages
            .into_iter()
            .filter(|m| !known.contains(&m.id))
            .collect();

        debug!(
            "Filtered {} messages, {} unprocessed",
            total,
            unprocessed.len()
        );
        Ok(unprocessed)
    }

    /// Writes a terminal `skipped`/`error` row for a message that produced
    /// no record.
    ///
    /// Returns `false` when another writer recorded the message first.
    pub fn record_terminal(
        &self,
        message: &MailMessage,
        module_id: Option<i64>,
        status: LedgerStatus,
        reason: &str,
    ) -> Result<bool, DatabaseError> {
        let row = ledger_row(message, module_id, None, status, Some(reason.to_string()));
        match self.db.with_conn(|conn| ledger_repo::insert(conn, &row)) {
            Ok(_) => Ok(true),
            Err(e) if e.is_unique_violation() => {
                debug!("Ledger row for message already exists, leaving it untouched");
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }
}

/// Builds the ledger row for `message` as observed now.
pub(crate) fn ledger_row(
    message: &MailMessage,
    module_id: Option<i64>,
    record_id: Option<i64>,
    status: LedgerStatus,
    error_message: Option<String>,
) -> ProcessedEmailRow {
    ProcessedEmailRow {
        id: 0,
        email_id: message.id.clone(),
        module_id,
        record_id,
        from_address: message.from_address.clone(),
        from_name: message.from_name.clone(),
        subject: Some(message.subject.clone()),
        body_preview: Some(message.body_preview.clone()),
        received_at: message.received_at.clone(),
        processed_at: Utc::now().to_rfc3339(),
        status,
        error_message,
    }
}
