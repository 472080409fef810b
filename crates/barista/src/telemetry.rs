//! Process-wide logging setup.
//!
//! Library code logs through the `log` facade and opens `tracing` spans;
//! both end up in the same subscriber once [`init_logging`] has run.

use tracing_subscriber::{fmt, layer::SubscriberExt, EnvFilter, Registry};

use crate::config::LoggingConfig;
use crate::error::BaristaError;

/// Installs the global subscriber. `RUST_LOG` wins over the configured
/// filter. Fails if called twice in one process.
pub fn init_logging(config: &LoggingConfig) -> Result<(), BaristaError> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.filter))
        .map_err(|e| BaristaError::Logging(format!("invalid filter '{}': {}", config.filter, e)))?;

    let registry = Registry::default().with(env_filter);

    if config.json {
        let subscriber = registry.with(fmt::layer().json().with_current_span(true));
        tracing::subscriber::set_global_default(subscriber)
            .map_err(|e| BaristaError::Logging(e.to_string()))?;
    } else {
        let subscriber = registry.with(fmt::layer().with_target(true));
        tracing::subscriber::set_global_default(subscriber)
            .map_err(|e| BaristaError::Logging(e.to_string()))?;
    }

    tracing_log::LogTracer::init().map_err(|e| BaristaError::Logging(e.to_string()))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_filter_rejected() {
        // Only reachable when RUST_LOG does not override the config.
        if std::env::var("RUST_LOG").is_ok() {
            return;
        }
        let config = LoggingConfig {
            filter: "barista=verbose".to_string(),
            json: false,
        };
        assert!(matches!(init_logging(&config), Err(BaristaError::Logging(_))));
    }
}
