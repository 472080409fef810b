//! Settings repository: key/value rows in the `settings` table.

use rusqlite::{params, OptionalExtension};

use super::{now_rfc3339, Database, DatabaseError};

/// A raw setting value. `is_encrypted` values hold hex ciphertext.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettingRow {
    pub key: String,
    pub value: String,
    pub is_encrypted: bool,
}

/// Reads a setting by key.
pub fn get(db: &Database, key: &str) -> Result<Option<SettingRow>, DatabaseError> {
    db.with_conn(|conn| {
        let row = conn
            .query_row(
                "SELECT key, value, is_encrypted FROM settings WHERE key = ?1",
                params![key],
                |row| {
                    Ok(SettingRow {
                        key: row.get(0)?,
                        value: row.get(1)?,
                        is_encrypted: row.get(2)?,
                    })
                },
            )
            .optional()?;
        Ok(row)
    })
}

/// Inserts or replaces a setting.
pub fn upsert(db: &Database, key: &str, value: &str, is_encrypted: bool) -> Result<(), DatabaseError> {
    let now = now_rfc3339();
    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO settings (key, value, is_encrypted, updated_at) VALUES (?1, ?2, ?3, ?4)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value,
                 is_encrypted = excluded.is_encrypted, updated_at = excluded.updated_at",
            params![key, value, is_encrypted, now],
        )?;
        Ok(())
    })
}

/// Deletes a setting. Returns whether a row existed.
pub fn delete(db: &Database, key: &str) -> Result<bool, DatabaseError> {
    db.with_conn(|conn| {
        let count = conn.execute("DELETE FROM settings WHERE key = ?1", params![key])?;
        Ok(count > 0)
    })
}
