//! Test harness for isolated ingestion runs.
//!
//! Each harness owns an in-memory database, a temporary upload root and a
//! real `IngestionEngine` wired to fake mailbox and transport collaborators.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tempfile::TempDir;

use barista::db::ledger_repo::{self, ProcessedEmailRow};
use barista::db::record_repo::{self, RecordHistoryRow, RecordRow};
use barista::db::module_repo;
use barista::inbox::{AutoResponder, EngineOptions, IngestionEngine, SchedulerHandle};
use barista::{Database, SettingsStore, UploadStore};

use super::fakes::{FakeMailbox, RecordingTransport};

pub struct TestHarness {
    temp_dir: TempDir,
    pub upload_root: PathBuf,
    pub db: Database,
    pub settings: SettingsStore,
    pub mailbox: Arc<FakeMailbox>,
    pub transport: Arc<RecordingTransport>,
    pub engine: Arc<IngestionEngine>,
}

impl TestHarness {
    pub fn new() -> Self {
        Self::with_mailbox(FakeMailbox::new())
    }

    pub fn with_mailbox(mailbox: FakeMailbox) -> Self {
        Self::build(mailbox, EngineOptions::default())
    }

    pub fn with_options(options: EngineOptions) -> Self {
        Self::build(FakeMailbox::new(), options)
    }

    fn build(mailbox: FakeMailbox, options: EngineOptions) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let upload_root = temp_dir.path().join("uploads");

        let db = Database::open_in_memory().expect("Failed to open test database");
        let settings = SettingsStore::new(db.clone(), Duration::from_secs(60), None);
        let mailbox = Arc::new(mailbox);
        let transport = Arc::new(RecordingTransport::new());
        let responder = AutoResponder::new(transport.clone(), settings.clone());

        let engine = Arc::new(IngestionEngine::new(
            mailbox.clone(),
            db.clone(),
            UploadStore::new(&upload_root),
            responder,
            settings.clone(),
            options,
        ));

        Self {
            temp_dir,
            upload_root,
            db,
            settings,
            mailbox,
            transport,
            engine,
        }
    }

    pub fn scheduler(&self) -> Arc<SchedulerHandle> {
        Arc::new(SchedulerHandle::new(Arc::clone(&self.engine)))
    }

    /// Adds an active module with the given routing flags.
    pub fn add_module(&self, name: &str, enable_inbox: bool, auto_process: bool) -> i64 {
        self.add_module_with_config(
            name,
            json!({ "enableEmailInbox": enable_inbox, "autoProcessEmails": auto_process }),
        )
    }

    pub fn add_module_with_config(&self, name: &str, config: serde_json::Value) -> i64 {
        let display_name = format!("{} Desk", capitalize(name));
        module_repo::insert(&self.db, name, &display_name, true, &config)
            .expect("Failed to insert module")
    }

    pub fn ledger(&self, email_id: &str) -> Option<ProcessedEmailRow> {
        ledger_repo::find_by_email_id(&self.db, email_id).expect("ledger lookup")
    }

    pub fn ledger_count(&self) -> u64 {
        self.db
            .with_conn(|conn| {
                Ok(conn.query_row("SELECT COUNT(*) FROM processed_emails", [], |r| r.get(0))?)
            })
            .expect("ledger count")
    }

    pub fn records(&self, module_id: i64) -> Vec<RecordRow> {
        record_repo::list_by_module(&self.db, module_id).expect("record listing")
    }

    pub fn record_count(&self) -> u64 {
        self.db
            .with_conn(|conn| {
                Ok(conn.query_row("SELECT COUNT(*) FROM module_records", [], |r| r.get(0))?)
            })
            .expect("record count")
    }

    pub fn history(&self, record_id: i64) -> Vec<RecordHistoryRow> {
        record_repo::list_history(&self.db, record_id).expect("history listing")
    }

    /// Makes every record insert fail until [`Self::heal_records`].
    pub fn break_records(&self) {
        self.db
            .with_conn(|conn| {
                conn.execute_batch(
                    "CREATE TRIGGER fail_records BEFORE INSERT ON module_records
                     BEGIN SELECT RAISE(ABORT, 'disk I/O error'); END;",
                )?;
                Ok(())
            })
            .expect("create trigger");
    }

    pub fn heal_records(&self) {
        self.db
            .with_conn(|conn| {
                conn.execute_batch("DROP TRIGGER fail_records;")?;
                Ok(())
            })
            .expect("drop trigger");
    }

    pub fn upload_path(&self, relative: &str) -> PathBuf {
        let stripped = relative
            .strip_prefix(barista::storage::UPLOADS_URL_PREFIX)
            .unwrap_or(relative)
            .trim_start_matches('/');
        self.upload_root.join(stripped)
    }

    pub fn temp_path(&self) -> &Path {
        self.temp_dir.path()
    }
}

fn capitalize(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}
