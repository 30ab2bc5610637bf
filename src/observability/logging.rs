//! # Structured Logging
//!
//! Subscriber setup and span helpers built on the tracing ecosystem.

use crate::config::ObservabilityConfig;
use crate::errors::{LapsError, Result};
use tracing::Subscriber;
use tracing_subscriber::{fmt, EnvFilter};

/// Create a tracing span for a store operation.
///
/// ```rust,ignore
/// let span = store_span!("insert_password", machine_id = %machine_id);
/// ```
#[macro_export]
macro_rules! store_span {
    ($operation:expr) => {
        tracing::debug_span!(
            "store_operation",
            operation = %$operation,
            operation_id = %uuid::Uuid::new_v4()
        )
    };
    ($operation:expr, $($field:tt)*) => {
        tracing::debug_span!(
            "store_operation",
            operation = %$operation,
            operation_id = %uuid::Uuid::new_v4(),
            $($field)*
        )
    };
}

/// Create a tracing span for an HSM call
#[macro_export]
macro_rules! hsm_span {
    ($operation:expr, $uses:expr) => {
        tracing::debug_span!(
            "hsm_operation",
            operation = %$operation,
            uses = $uses
        )
    };
}

/// Build the subscriber described by `config` without installing it.
///
/// `RUST_LOG` wins when set; otherwise the configured log level is used as
/// the filter directive.
pub fn build_subscriber(
    config: &ObservabilityConfig,
) -> Result<Box<dyn Subscriber + Send + Sync>> {
    let filter = match std::env::var("RUST_LOG") {
        Ok(directive) if !directive.trim().is_empty() => EnvFilter::try_new(directive),
        _ => EnvFilter::try_new(&config.log_level),
    }
    .map_err(|e| {
        LapsError::config(format!("Invalid log filter '{}': {}", config.log_level, e))
    })?;

    if config.json_logging {
        Ok(Box::new(
            fmt()
                .json()
                .with_env_filter(filter)
                .with_current_span(true)
                .with_target(true)
                .finish(),
        ))
    } else {
        Ok(Box::new(fmt().with_env_filter(filter).with_target(true).finish()))
    }
}

/// Install the global tracing subscriber.
///
/// Installing twice is not an error (the helper binaries may race to set a
/// subscriber).
pub fn init_logging(config: &ObservabilityConfig) -> Result<()> {
    let subscriber = build_subscriber(config)?;
    if tracing::subscriber::set_global_default(subscriber).is_err() {
        tracing::debug!("Global tracing subscriber already installed; keeping existing one");
    }
    Ok(())
}

/// Log configuration at startup
pub fn log_config_info(config: &crate::config::AppConfig) {
    tracing::info!(
        api_address = %config.server.bind_address(),
        database_in_memory = config.database.is_in_memory(),
        vault_address = %config.hsm.address,
        transit_key = %config.hsm.transit_key,
        pki_role = %config.hsm.pki_role,
        max_uses = config.rotation.max_uses,
        dev_mode = config.rotation.dev_mode,
        metrics_enabled = config.observability.enable_metrics,
        "lapsvault configuration"
    );

    if config.rotation.dev_mode {
        tracing::warn!("Development mode enabled: submitted passwords expire after one second");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_macros_compile() {
        let _span = store_span!("insert_password");
        let _span = store_span!("insert_password", machine_id = "m-1");
        let _span = hsm_span!("encrypt", 3u32);
    }

    #[test]
    fn test_log_config_info() {
        let config = crate::config::AppConfig::default();
        log_config_info(&config);
    }

    #[test]
    fn test_build_subscriber_formats() {
        let mut config = ObservabilityConfig::default();
        let subscriber = build_subscriber(&config).unwrap();
        tracing::subscriber::with_default(subscriber, || {
            tracing::info!(format = "pretty", "scoped subscriber");
        });

        config.json_logging = true;
        let subscriber = build_subscriber(&config).unwrap();
        tracing::subscriber::with_default(subscriber, || {
            tracing::info!(format = "json", "scoped subscriber");
        });
    }

    #[test]
    fn test_build_subscriber_rejects_bad_filter() {
        if std::env::var("RUST_LOG").is_ok() {
            return;
        }
        let config = ObservabilityConfig {
            log_level: "lapsvault=verbose".to_string(),
            ..Default::default()
        };
        assert!(build_subscriber(&config).is_err());
    }
}
