pub mod config;
pub mod db;
pub mod error;
pub mod inbox;
pub mod sanitize;
pub mod secrets;
pub mod settings;
pub mod storage;
pub mod telemetry;

pub use config::{load_config, ServiceConfig};
pub use db::{Database, DatabaseError};
pub use error::{BaristaError, ConfigError, Result, StorageError};
pub use inbox::{
    AutoResponder, IngestionEngine, InboxError, MailTransport, MailboxClient, PassSummary,
    SchedulerHandle,
};
pub use secrets::{resolve_secret, resolve_secret_optional, SecretError, TokenEncryptor};
pub use settings::{SettingsError, SettingsStore};
pub use storage::UploadStore;
