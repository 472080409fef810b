//! Processed email repository: the `processed_emails` dedup/audit ledger.
//!
//! One row per observed inbound message, keyed by the mailbox provider's
//! message id. Rows are inserted once and never updated.

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::Serialize;

use super::{Database, DatabaseError};

/// Outcome recorded for an observed message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LedgerStatus {
    Processed,
    Skipped,
    Error,
}

impl LedgerStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LedgerStatus::Processed => "processed",
            LedgerStatus::Skipped => "skipped",
            LedgerStatus::Error => "error",
        }
    }
}

impl fmt::Display for LedgerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LedgerStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "processed" => Ok(LedgerStatus::Processed),
            "skipped" => Ok(LedgerStatus::Skipped),
            "error" => Ok(LedgerStatus::Error),
            other => Err(format!("unknown ledger status '{}'", other)),
        }
    }
}

/// A ledger row, as written or read.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessedEmailRow {
    /// Autoincrement id; ignored on insert.
    pub id: i64,
    pub email_id: String,
    pub module_id: Option<i64>,
    pub record_id: Option<i64>,
    pub from_address: String,
    pub from_name: Option<String>,
    pub subject: Option<String>,
    pub body_preview: Option<String>,
    pub received_at: Option<String>,
    pub processed_at: String,
    pub status: LedgerStatus,
    pub error_message: Option<String>,
}

impl ProcessedEmailRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        let status: String = row.get("status")?;
        Ok(Self {
            id: row.get("id")?,
            email_id: row.get("email_id")?,
            module_id: row.get("module_id")?,
            record_id: row.get("record_id")?,
            from_address: row.get("from_address")?,
            from_name: row.get("from_name")?,
            subject: row.get("subject")?,
            body_preview: row.get("body_preview")?,
            received_at: row.get("received_at")?,
            processed_at: row.get("processed_at")?,
            status: status.parse().map_err(|e: String| {
                rusqlite::Error::FromSqlConversionFailure(
                    0,
                    rusqlite::types::Type::Text,
                    e.into(),
                )
            })?,
            error_message: row.get("error_message")?,
        })
    }
}

/// Filter and page parameters for per-module ledger listing.
#[derive(Debug, Clone)]
pub struct LedgerQuery {
    pub status: Option<LedgerStatus>,
    /// 1-based page number.
    pub page: u64,
    pub limit: u64,
}

impl Default for LedgerQuery {
    fn default() -> Self {
        Self {
            status: None,
            page: 1,
            limit: 20,
        }
    }
}

/// Inserts a ledger row on an open connection and returns its id.
///
/// A second row for the same `email_id` fails with a unique-constraint
/// violation (see [`DatabaseError::is_unique_violation`]).
pub fn insert(conn: &Connection, row: &ProcessedEmailRow) -> Result<i64, DatabaseError> {
    conn.execute(
        "INSERT INTO processed_emails (email_id, module_id, record_id, from_address, from_name,
         subject, body_preview, received_at, processed_at, status, error_message)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
        params![
            row.email_id,
            row.module_id,
            row.record_id,
            row.from_address,
            row.from_name,
            row.subject,
            row.body_preview,
            row.received_at,
            row.processed_at,
            row.status.as_str(),
            row.error_message,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Finds the ledger row for a message, if any.
pub fn find_by_email_id(
    db: &Database,
    email_id: &str,
) -> Result<Option<ProcessedEmailRow>, DatabaseError> {
    db.with_conn(|conn| {
        let row = conn
            .query_row(
                "SELECT * FROM processed_emails WHERE email_id = ?1",
                params![email_id],
                ProcessedEmailRow::from_row,
            )
            .optional()?;
        Ok(row)
    })
}

/// Returns the subset of `email_ids` that already have a ledger row.
pub fn find_known_ids(db: &Database, email_ids: &[String]) -> Result<HashSet<String>, DatabaseError> {
    if email_ids.is_empty() {
        return Ok(HashSet::new());
    }

    db.with_conn(|conn| {
        let placeholders: Vec<String> = (1..=email_ids.len()).map(|i| format!("?{}", i)).collect();
        let sql = format!(
            "SELECT email_id FROM processed_emails WHERE email_id IN ({})",
            placeholders.join(", ")
        );

        let mut stmt = conn.prepare(&sql)?;
        let known = stmt
            .query_map(rusqlite::params_from_iter(email_ids.iter()), |row| {
                row.get::<_, String>(0)
            })?
            .collect::<Result<HashSet<_>, _>>()?;
        Ok(known)
    })
}

/// Lists a module's ledger rows, newest first, with the total matching count.
pub fn list_by_module(
    db: &Database,
    module_id: i64,
    query: &LedgerQuery,
) -> Result<(Vec<ProcessedEmailRow>, u64), DatabaseError> {
    let limit = query.limit.max(1);
    let offset = query.page.saturating_sub(1) * limit;
    let status = query.status.map(|s| s.as_str());

    db.with_conn(|conn| {
        let total: u64 = conn.query_row(
            "SELECT COUNT(*) FROM processed_emails
             WHERE module_id = ?1 AND (?2 IS NULL OR status = ?2)",
            params![module_id, status],
            |r| r.get(0),
        )?;

        let mut stmt = conn.prepare(
            "SELECT * FROM processed_emails
             WHERE module_id = ?1 AND (?2 IS NULL OR status = ?2)
             ORDER BY processed_at DESC, id DESC
             LIMIT ?3 OFFSET ?4",
        )?;
        let rows = stmt
            .query_map(
                params![module_id, status, limit as i64, offset as i64],
                ProcessedEmailRow::from_row,
            )?
            .collect::<Result<Vec<_>, _>>()?;
        Ok((rows, total))
    })
}

/// Counts ledger rows with the given status.
pub fn count_by_status(db: &Database, status: LedgerStatus) -> Result<u64, DatabaseError> {
    db.with_conn(|conn| {
        let count: u64 = conn.query_row(
            "SELECT COUNT(*) FROM processed_emails WHERE status = ?1",
            params![status.as_str()],
            |r| r.get(0),
        )?;
        Ok(count)
    })
}
