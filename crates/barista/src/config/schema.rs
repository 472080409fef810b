use serde::{Deserialize, Serialize};

use crate::secrets::{resolve_secret, resolve_secret_optional, SecretError};
use secrecy::SecretString;

/// Top-level service configuration (`barista.json`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceConfig {
    pub version: String,

    /// SQLite database file. `~` is expanded.
    #[serde(default = "default_database_path")]
    pub database_path: String,

    /// Directory that `/uploads/<kind>/<file>` paths resolve against.
    #[serde(default = "default_upload_root")]
    pub upload_root: String,

    #[serde(default)]
    pub server: ServerConfig,

    pub inbox: InboxConfig,

    #[serde(default)]
    pub transport: TransportConfig,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub graph: Option<GraphConfig>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub smtp: Option<SmtpConfig>,

    #[serde(default)]
    pub logging: LoggingConfig,

    /// How long resolved settings stay cached (default: 300).
    #[serde(default = "default_settings_cache_ttl")]
    pub settings_cache_ttl_seconds: u64,
}

fn default_database_path() -> String {
    "~/.barista/data/barista.db".to_string()
}

fn default_upload_root() -> String {
    "./uploads".to_string()
}

fn default_settings_cache_ttl() -> u64 {
    300
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8080
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Polling and mailbox settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InboxConfig {
    /// Minutes between automatic passes. `0` disables the scheduler.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_minutes: u64,

    /// Messages requested per listing call (1..=1000, default: 50).
    #[serde(default = "default_max_results")]
    pub max_results: u32,

    /// Mailbox (user principal name) that is read and sent from.
    pub mailbox: String,

    #[serde(default)]
    pub provider: MailboxProvider,

    /// Attachments above this size are skipped (default: 25 MiB).
    #[serde(default = "default_max_attachment_bytes")]
    pub max_attachment_bytes: u64,
}

fn default_poll_interval() -> u64 {
    5
}

fn default_max_results() -> u32 {
    50
}

fn default_max_attachment_bytes() -> u64 {
    26_214_400
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MailboxProvider {
    #[default]
    Graph,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransportConfig {
    #[serde(default)]
    pub kind: TransportKind,
}

/// Which outbound mail implementation to build at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    #[default]
    Graph,
    Smtp,
}

/// Microsoft Graph application credentials.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphConfig {
    pub tenant_id: String,
    pub client_id: String,

    /// WARNING: plaintext in the config file. Prefer the file or env var.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        rename = "clientSecretInsecure",
        alias = "clientSecret"
    )]
    pub client_secret_insecure: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_secret_file: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_secret_env_var: Option<String>,

    #[serde(default = "default_graph_base_url")]
    pub base_url: String,

    #[serde(default = "default_authority_url")]
    pub authority_url: String,
}

fn default_graph_base_url() -> String {
    "https://graph.microsoft.com/v1.0".to_string()
}

fn default_authority_url() -> String {
    "https://login.microsoftonline.com".to_string()
}

impl GraphConfig {
    pub fn client_secret(&self) -> Result<SecretString, SecretError> {
        resolve_secret(
            self.client_secret_insecure.as_deref(),
            self.client_secret_file.as_deref(),
            self.client_secret_env_var.as_deref(),
        )
    }

    /// OAuth2 token endpoint for the tenant.
    pub fn token_url(&self) -> String {
        format!(
            "{}/{}/oauth2/v2.0/token",
            self.authority_url.trim_end_matches('/'),
            self.tenant_id
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SmtpConfig {
    pub host: String,

    #[serde(default = "default_smtp_port")]
    pub port: u16,

    #[serde(default = "default_true")]
    pub start_tls: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,

    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        rename = "passwordInsecure",
        alias = "password"
    )]
    pub password_insecure: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password_file: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password_env_var: Option<String>,

    pub from_address: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_name: Option<String>,
}

fn default_smtp_port() -> u16 {
    587
}

fn default_true() -> bool {
    true
}

impl SmtpConfig {
    pub fn password(&self) -> Result<Option<SecretString>, SecretError> {
        resolve_secret_optional(
            self.password_insecure.as_deref(),
            self.password_file.as_deref(),
            self.password_env_var.as_deref(),
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoggingConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    #[serde(default = "default_log_filter")]
    pub filter: String,

    /// Emit JSON lines instead of human-readable output.
    #[serde(default)]
    pub json: bool,
}

fn default_log_filter() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: default_log_filter(),
            json: false,
        }
    }
}
