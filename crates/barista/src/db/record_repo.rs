//! Record repository: writes into a module's generic record store.
//!
//! Covers `module_records` and its append-only children (`record_images`,
//! `record_documents`, `record_links`, `record_history`).

use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::storage::UploadKind;

use super::{now_rfc3339, Database, DatabaseError};

/// A record to be created in a module.
#[derive(Debug, Clone)]
pub struct NewRecord {
    pub module_id: i64,
    pub name: String,
    pub status: String,
    pub data: serde_json::Value,
    /// Written to both `created_by` and `updated_by`.
    pub author: String,
}

/// A record row from the database.
#[derive(Debug, Clone)]
pub struct RecordRow {
    pub id: i64,
    pub module_id: i64,
    pub name: String,
    pub status: String,
    pub data: serde_json::Value,
    pub created_by: Option<String>,
    pub updated_by: Option<String>,
    pub created_at: String,
}

impl RecordRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        let data: String = row.get("data")?;
        Ok(Self {
            id: row.get("id")?,
            module_id: row.get("module_id")?,
            name: row.get("name")?,
            status: row.get("status")?,
            data: serde_json::from_str(&data).unwrap_or(serde_json::Value::Null),
            created_by: row.get("created_by")?,
            updated_by: row.get("updated_by")?,
            created_at: row.get("created_at")?,
        })
    }
}

/// An attachment row (image or document) belonging to a record.
#[derive(Debug, Clone)]
pub struct RecordFileRow {
    pub id: i64,
    pub record_id: i64,
    pub file_path: String,
    pub original_name: String,
    pub mime_type: String,
    pub file_size: i64,
}

/// A link row belonging to a record.
#[derive(Debug, Clone)]
pub struct RecordLinkRow {
    pub id: i64,
    pub url: String,
    pub title: String,
}

/// A history row belonging to a record.
#[derive(Debug, Clone)]
pub struct RecordHistoryRow {
    pub id: i64,
    pub action: String,
    pub description: String,
    pub user: Option<String>,
}

fn file_table(kind: UploadKind) -> &'static str {
    match kind {
        UploadKind::Image => "record_images",
        UploadKind::Document => "record_documents",
    }
}

/// Inserts a record on an open connection (so callers can pair it with
/// other writes in one transaction) and returns its id.
pub fn insert_record(conn: &Connection, record: &NewRecord) -> Result<i64, DatabaseError> {
    let now = now_rfc3339();
    conn.execute(
        "INSERT INTO module_records (module_id, name, status, data, created_by, updated_by,
         created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?5, ?6, ?6)",
        params![
            record.module_id,
            record.name,
            record.status,
            serde_json::to_string(&record.data)?,
            record.author,
            now,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Finds a record by id.
pub fn find_record(db: &Database, id: i64) -> Result<Option<RecordRow>, DatabaseError> {
    db.with_conn(|conn| {
        let row = conn
            .query_row(
                "SELECT * FROM module_records WHERE id = ?1",
                params![id],
                RecordRow::from_row,
            )
            .optional()?;
        Ok(row)
    })
}

/// Lists all records of a module, oldest first.
pub fn list_by_module(db: &Database, module_id: i64) -> Result<Vec<RecordRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt =
            conn.prepare("SELECT * FROM module_records WHERE module_id = ?1 ORDER BY id")?;
        let rows = stmt
            .query_map(params![module_id], RecordRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}

/// Attaches a stored upload to a record.
pub fn insert_file(
    db: &Database,
    kind: UploadKind,
    record_id: i64,
    file_path: &str,
    original_name: &str,
    mime_type: &str,
    file_size: u64,
) -> Result<i64, DatabaseError> {
    let now = now_rfc3339();
    let sql = format!(
        "INSERT INTO {} (record_id, file_path, original_name, mime_type, file_size, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        file_table(kind)
    );
    db.with_conn(|conn| {
        conn.execute(
            &sql,
            params![
                record_id,
                file_path,
                original_name,
                mime_type,
                file_size as i64,
                now
            ],
        )?;
        Ok(conn.last_insert_rowid())
    })
}

/// Lists a record's images or documents.
pub fn list_files(
    db: &Database,
    kind: UploadKind,
    record_id: i64,
) -> Result<Vec<RecordFileRow>, DatabaseError> {
    let sql = format!(
        "SELECT id, record_id, file_path, original_name, mime_type, file_size
         FROM {} WHERE record_id = ?1 ORDER BY id",
        file_table(kind)
    );
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params![record_id], |row| {
                Ok(RecordFileRow {
                    id: row.get(0)?,
                    record_id: row.get(1)?,
                    file_path: row.get(2)?,
                    original_name: row.get(3)?,
                    mime_type: row.get(4)?,
                    file_size: row.get(5)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}

/// Attaches a hyperlink to a record.
pub fn insert_link(
    db: &Database,
    record_id: i64,
    url: &str,
    title: &str,
) -> Result<i64, DatabaseError> {
    let now = now_rfc3339();
    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO record_links (record_id, url, title, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![record_id, url, title, now],
        )?;
        Ok(conn.last_insert_rowid())
    })
}

/// Lists a record's links in insertion order.
pub fn list_links(db: &Database, record_id: i64) -> Result<Vec<RecordLinkRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn
            .prepare("SELECT id, url, title FROM record_links WHERE record_id = ?1 ORDER BY id")?;
        let rows = stmt
            .query_map(params![record_id], |row| {
                Ok(RecordLinkRow {
                    id: row.get(0)?,
                    url: row.get(1)?,
                    title: row.get(2)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}

/// Appends a history entry to a record.
pub fn insert_history(
    db: &Database,
    record_id: i64,
    action: &str,
    description: &str,
    user: Option<&str>,
) -> Result<i64, DatabaseError> {
    let now = now_rfc3339();
    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO record_history (record_id, action, description, user, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![record_id, action, description, user, now],
        )?;
        Ok(conn.last_insert_rowid())
    })
}

/// Lists a record's history, oldest first.
pub fn list_history(db: &Database, record_id: i64) -> Result<Vec<RecordHistoryRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare(
            "SELECT id, action, description, user FROM record_history
             WHERE record_id = ?1 ORDER BY id",
        )?;
        let rows = stmt
            .query_map(params![record_id], |row| {
                Ok(RecordHistoryRow {
                    id: row.get(0)?,
                    action: row.get(1)?,
                    description: row.get(2)?,
                    user: row.get(3)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}
