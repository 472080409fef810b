//! Shared application state for the HTTP handlers.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use barista::config::ServiceConfig;
use barista::inbox::{
    build_transport, AutoResponder, EngineOptions, GraphMailboxClient, GraphSession,
    IngestionEngine, MailTransport, MailboxClient, SchedulerHandle,
};
use barista::secrets::expand_home;
use barista::settings::EMAIL_CHECK_INTERVAL;
use barista::{BaristaError, Database, InboxError, SettingsStore, TokenEncryptor, UploadStore};
use log::{info, warn};

/// Everything a handler needs. Cloning is cheap.
#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub settings: SettingsStore,
    pub engine: Arc<IngestionEngine>,
    pub scheduler: Arc<SchedulerHandle>,
}

impl AppState {
    /// Wires the production collaborators from configuration.
    pub fn from_config(config: &ServiceConfig) -> Result<Self, BaristaError> {
        let db = Database::open(&PathBuf::from(expand_home(&config.database_path)))?;

        let encryptor = TokenEncryptor::from_env_optional()?;
        if encryptor.is_none() {
            info!("No settings key configured, encrypted settings are unavailable");
        }
        let settings = SettingsStore::new(
            db.clone(),
            Duration::from_secs(config.settings_cache_ttl_seconds),
            encryptor,
        );

        let graph = config
            .graph
            .as_ref()
            .ok_or_else(|| InboxError::Config("graph section missing".to_string()))?;
        let session = GraphSession::new(graph)?;
        let mailbox: Arc<dyn MailboxClient> = Arc::new(GraphMailboxClient::from_session(
            &session,
            &config.inbox.mailbox,
        ));
        let transport = build_transport(config, Some(&session))?;
        let uploads = UploadStore::new(expand_home(&config.upload_root));

        Ok(Self::new(
            db,
            settings,
            mailbox,
            transport,
            uploads,
            EngineOptions::from(&config.inbox),
        ))
    }

    /// Assembles state from already-built collaborators.
    pub fn new(
        db: Database,
        settings: SettingsStore,
        mailbox: Arc<dyn MailboxClient>,
        transport: Arc<dyn MailTransport>,
        uploads: UploadStore,
        options: EngineOptions,
    ) -> Self {
        let responder = AutoResponder::new(transport, settings.clone());
        let engine = Arc::new(IngestionEngine::new(
            mailbox,
            db.clone(),
            uploads,
            responder,
            settings.clone(),
            options,
        ));
        let scheduler = Arc::new(SchedulerHandle::new(Arc::clone(&engine)));

        Self {
            db,
            settings,
            engine,
            scheduler,
        }
    }

    /// Poll interval in minutes: the `email_check_interval` setting when it
    /// holds a number, the configured default otherwise.
    pub fn poll_interval(&self, configured: u64) -> u64 {
        match self.settings.get(EMAIL_CHECK_INTERVAL) {
            Ok(Some(value)) => match value.trim().parse() {
                Ok(minutes) => minutes,
                Err(_) => {
                    warn!(
                        "Ignoring non-numeric {} '{}', using {} minute(s)",
                        EMAIL_CHECK_INTERVAL, value, configured
                    );
                    configured
                }
            },
            Ok(None) => configured,
            Err(e) => {
                warn!("Could not read {}: {}", EMAIL_CHECK_INTERVAL, e);
                configured
            }
        }
    }
}
