//! Module repository: lookups over the `modules` table.
//!
//! Modules are owned by the admin editor; the ingestion pipeline only reads
//! them. `insert` exists for seeding and tests.

use log::warn;
use rusqlite::{params, OptionalExtension, Row};
use serde::{Deserialize, Serialize};

use super::{now_rfc3339, Database, DatabaseError};

/// Email routing projection of a module's JSON `config` column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleRoutingConfig {
    /// Whether tagged mail may be routed to this module at all.
    #[serde(default)]
    pub enable_email_inbox: bool,

    /// Whether the unattended scheduler picks up this module's mail.
    #[serde(default)]
    pub auto_process_emails: bool,

    /// Whether an acknowledgment is sent back to the sender.
    #[serde(default = "default_true")]
    pub auto_response: bool,
}

fn default_true() -> bool {
    true
}

impl Default for ModuleRoutingConfig {
    fn default() -> Self {
        Self {
            enable_email_inbox: false,
            auto_process_emails: false,
            auto_response: true,
        }
    }
}

impl ModuleRoutingConfig {
    /// Parses the routing keys out of a module config blob.
    ///
    /// Unknown keys are ignored. Malformed JSON yields the default
    /// (inbox disabled), so a broken config never routes mail.
    pub fn from_config_json(raw: &str) -> Self {
        match serde_json::from_str(raw) {
            Ok(config) => config,
            Err(e) => {
                warn!("Ignoring malformed module config: {}", e);
                Self::default()
            }
        }
    }

    /// True when the scheduler's automatic passes may route to this module.
    pub fn accepts_automatic(&self) -> bool {
        self.enable_email_inbox && self.auto_process_emails
    }
}

/// A module row from the database.
#[derive(Debug, Clone)]
pub struct ModuleRow {
    pub id: i64,
    pub name: String,
    pub display_name: String,
    pub is_active: bool,
    pub routing: ModuleRoutingConfig,
}

impl ModuleRow {
    fn from_row(row: &Row<'_>) -> Result<Self, rusqlite::Error> {
        let config: String = row.get("config")?;
        Ok(Self {
            id: row.get("id")?,
            name: row.get("name")?,
            display_name: row.get("display_name")?,
            is_active: row.get("is_active")?,
            routing: ModuleRoutingConfig::from_config_json(&config),
        })
    }
}

/// Inserts a module and returns its id.
pub fn insert(
    db: &Database,
    name: &str,
    display_name: &str,
    is_active: bool,
    config: &serde_json::Value,
) -> Result<i64, DatabaseError> {
    let now = now_rfc3339();
    db.with_conn(|conn| {
        conn.execute(
            "INSERT INTO modules (name, display_name, is_active, config, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
            params![name, display_name, is_active, config.to_string(), now],
        )?;
        Ok(conn.last_insert_rowid())
    })
}

/// Finds a module by id.
pub fn find_by_id(db: &Database, id: i64) -> Result<Option<ModuleRow>, DatabaseError> {
    db.with_conn(|conn| {
        let row = conn
            .query_row(
                "SELECT * FROM modules WHERE id = ?1",
                params![id],
                ModuleRow::from_row,
            )
            .optional()?;
        Ok(row)
    })
}

/// Finds an active module whose name matches `name` case-insensitively.
///
/// Folding happens in Rust: SQLite's `LOWER()` only folds ASCII.
pub fn find_active_by_name(db: &Database, name: &str) -> Result<Option<ModuleRow>, DatabaseError> {
    let wanted = name.trim().to_lowercase();
    Ok(list_active(db)?
        .into_iter()
        .find(|m| m.name.to_lowercase() == wanted))
}

fn list_active(db: &Database) -> Result<Vec<ModuleRow>, DatabaseError> {
    db.with_conn(|conn| {
        let mut stmt = conn.prepare("SELECT * FROM modules WHERE is_active = 1 ORDER BY id")?;
        let rows = stmt
            .query_map([], ModuleRow::from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    })
}

/// Lists active modules that take part in automatic passes.
pub fn list_auto_process(db: &Database) -> Result<Vec<ModuleRow>, DatabaseError> {
    Ok(list_active(db)?
        .into_iter()
        .filter(|m| m.routing.accepts_automatic())
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn test_db() -> Database {
        Database::open_in_memory().expect("Failed to create test database")
    }

    #[test]
    fn test_routing_config_defaults() {
        let config = ModuleRoutingConfig::from_config_json("{}");
        assert!(!config.enable_email_inbox);
        assert!(!config.auto_process_emails);
        assert!(config.auto_response);
    }

    #[test]
    fn test_routing_config_malformed_json_disables_inbox() {
        let config = ModuleRoutingConfig::from_config_json("{not json");
        assert_eq!(config, ModuleRoutingConfig::default());
    }

    #[test]
    fn test_routing_config_ignores_unrelated_keys() {
        let config = ModuleRoutingConfig::from_config_json(
            r#"{"fields": [{"name": "title"}], "enableEmailInbox": true}"#,
        );
        assert!(config.enable_email_inbox);
        assert!(!config.accepts_automatic());
    }

    #[test]
    fn test_find_active_by_name_is_case_insensitive() {
        let db = test_db();
        let id = insert(&db, "support", "Support", true, &json!({"enableEmailInbox": true})).unwrap();

        let found = find_active_by_name(&db, "Support").unwrap().unwrap();
        assert_eq!(found.id, id);
        assert!(found.routing.enable_email_inbox);
        assert!(find_active_by_name(&db, "SUPPORT").unwrap().is_some());
        assert!(find_active_by_name(&db, "sales").unwrap().is_none());
    }

    #[test]
    fn test_find_active_by_name_folds_non_ascii() {
        let db = test_db();
        let id = insert(&db, "Événements", "Events", true, &json!({})).unwrap();

        assert_eq!(find_active_by_name(&db, "événements").unwrap().unwrap().id, id);
        assert_eq!(find_active_by_name(&db, "ÉVÉNEMENTS").unwrap().unwrap().id, id);
        assert_eq!(find_active_by_name(&db, " événements ").unwrap().unwrap().id, id);
    }

    #[test]
    fn test_inactive_modules_are_not_resolved() {
        let db = test_db();
        insert(&db, "archive", "Archive", false, &json!({"enableEmailInbox": true})).unwrap();
        assert!(find_active_by_name(&db, "archive").unwrap().is_none());
    }

    #[test]
    fn test_list_auto_process_filters_on_both_flags() {
        let db = test_db();
        insert(
            &db,
            "support",
            "Support",
            true,
            &json!({"enableEmailInbox": true, "autoProcessEmails": true}),
        )
        .unwrap();
        insert(&db, "manual", "Manual", true, &json!({"enableEmailInbox": true})).unwrap();
        insert(&db, "off", "Off", true, &json!({"autoProcessEmails": true})).unwrap();

        let modules = list_auto_process(&db).unwrap();
        assert_eq!(modules.len(), 1);
        assert_eq!(modules[0].name, "support");
    }

    #[test]
    fn test_find_by_id() {
        let db = test_db();
        let id = insert(&db, "support", "Support Desk", true, &json!({})).unwrap();
        let module = find_by_id(&db, id).unwrap().unwrap();
        assert_eq!(module.display_name, "Support Desk");
        assert!(find_by_id(&db, id + 100).unwrap().is_none());
    }
}
