use std::path::{Path, PathBuf};

use crate::config::schema::{ServiceConfig, TransportKind};
use crate::error::ConfigError;
use crate::inbox::MAX_INTERVAL_MINUTES;
use crate::secrets::{expand_home, has_secret_source};

/// Env var consulted when no config path is passed on the command line.
pub const CONFIG_ENV_VAR: &str = "BARISTA_CONFIG";

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<ServiceConfig, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;

    load_config_from_str(&content)
}

pub fn load_config_from_str(content: &str) -> Result<ServiceConfig, ConfigError> {
    let config: ServiceConfig = serde_json::from_str(content)?;

    validate_config(&config)?;

    Ok(config)
}

/// `~/.barista/barista.json`, or `barista.json` in the working directory
/// when no home directory is known.
pub fn default_config_path() -> PathBuf {
    dirs::home_dir()
        .map(|home| home.join(".barista").join("barista.json"))
        .unwrap_or_else(|| PathBuf::from("barista.json"))
}

/// Picks the config path: explicit argument, then [`CONFIG_ENV_VAR`], then
/// [`default_config_path`].
pub fn resolve_config_path(arg: Option<&str>) -> PathBuf {
    if let Some(path) = arg.filter(|p| !p.is_empty()) {
        return PathBuf::from(expand_home(path));
    }
    match std::env::var(CONFIG_ENV_VAR) {
        Ok(path) if !path.is_empty() => PathBuf::from(expand_home(&path)),
        _ => default_config_path(),
    }
}

fn validate_config(config: &ServiceConfig) -> Result<(), ConfigError> {
    if config.version != "1.0" {
        return Err(ConfigError::Validation {
            message: format!("Unsupported config version: {}", config.version),
        });
    }

    if config.upload_root.trim().is_empty() {
        return Err(ConfigError::Validation {
            message: "uploadRoot must not be empty".to_string(),
        });
    }

    if !(1..=1000).contains(&config.inbox.max_results) {
        return Err(ConfigError::Validation {
            message: format!(
                "inbox.maxResults must be between 1 and 1000, got {}",
                config.inbox.max_results
            ),
        });
    }

    if config.inbox.poll_interval_minutes > MAX_INTERVAL_MINUTES {
        return Err(ConfigError::Validation {
            message: format!(
                "inbox.pollIntervalMinutes must be at most {}, got {}",
                MAX_INTERVAL_MINUTES, config.inbox.poll_interval_minutes
            ),
        });
    }

    if config.inbox.mailbox.trim().is_empty() {
        return Err(ConfigError::Validation {
            message: "inbox.mailbox must not be empty".to_string(),
        });
    }

    // The mailbox is always read through Graph, so its section is required
    // even when replies go out over SMTP.
    let graph = config.graph.as_ref().ok_or_else(|| ConfigError::Validation {
        message: "graph section is required for mailbox access".to_string(),
    })?;
    if !has_secret_source(
        graph.client_secret_insecure.as_deref(),
        graph.client_secret_file.as_deref(),
        graph.client_secret_env_var.as_deref(),
    ) {
        return Err(ConfigError::Validation {
            message: "graph requires one of clientSecretInsecure, clientSecretFile or clientSecretEnvVar"
                .to_string(),
        });
    }

    if config.transport.kind == TransportKind::Smtp {
        let smtp = config.smtp.as_ref().ok_or_else(|| ConfigError::Validation {
            message: "transport.kind is 'smtp' but no smtp section is configured".to_string(),
        })?;
        if smtp.host.trim().is_empty() || smtp.from_address.trim().is_empty() {
            return Err(ConfigError::Validation {
                message: "smtp.host and smtp.fromAddress must not be empty".to_string(),
            });
        }
    }

    Ok(())
}
