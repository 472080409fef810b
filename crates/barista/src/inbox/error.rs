//! Inbox ingestion error types.

use thiserror::Error;

/// Errors raised by the mailbox client, mail transports and the engine.
#[derive(Error, Debug)]
pub enum InboxError {
    /// Network-level failure talking to the mailbox provider.
    #[error("Transport error: {0}")]
    Transport(String),

    /// Provider answered with a non-success status.
    #[error("Mailbox API returned {status}: {body}")]
    Api { status: u16, body: String },

    /// Token acquisition failed.
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// Response body did not have the expected shape.
    #[error("Failed to decode response: {0}")]
    Decode(String),

    #[error("Message '{0}' not found in mailbox")]
    MessageNotFound(String),

    #[error("Message '{0}' has already been processed")]
    AlreadyProcessed(String),

    /// Manual processing of an untagged message needs an explicit module.
    #[error("Message '{0}' has no module tag; a module name is required")]
    ModuleRequired(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Storage error: {0}")]
    Storage(#[from] crate::error::StorageError),

    #[error("Database error: {0}")]
    Database(#[from] crate::db::DatabaseError),

    #[error("Settings error: {0}")]
    Settings(#[from] crate::settings::SettingsError),

    /// Outbound mail could not be delivered.
    #[error("Failed to send mail: {0}")]
    Send(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<reqwest::Error> for InboxError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            InboxError::Decode(err.to_string())
        } else {
            InboxError::Transport(err.to_string())
        }
    }
}

impl From<crate::secrets::SecretError> for InboxError {
    fn from(err: crate::secrets::SecretError) -> Self {
        InboxError::Config(err.to_string())
    }
}

/// Result type for inbox operations.
pub type Result<T> = std::result::Result<T, InboxError>;
