//! # Configuration Management
//!
//! Configuration is read from `LAPSVAULT_*` environment variables (plus the
//! conventional `DATABASE_URL` and `VAULT_ADDR`). Every value has a default;
//! a value that is present but unparseable is a configuration error rather
//! than silently replaced.

pub mod settings;

pub use settings::{
    AppConfig, DatabaseConfig, HsmConfig, ObservabilityConfig, RotationPolicy, ServerConfig,
};

use crate::errors::{LapsError, Result};
use std::str::FromStr;

fn env_string(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn env_parse<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env_string(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| LapsError::config(format!("Invalid value for {}: {}", key, e))),
        None => Ok(default),
    }
}

fn env_bool(key: &str, default: bool) -> Result<bool> {
    match env_string(key) {
        Some(raw) => match raw.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            other => Err(LapsError::config(format!("Invalid boolean for {}: {}", key, other))),
        },
        None => Ok(default),
    }
}

impl AppConfig {
    /// Create configuration from environment variables and validate it
    pub fn from_env() -> Result<Self> {
        let defaults = AppConfig::default();

        let server = ServerConfig {
            host: env_string("LAPSVAULT_API_BIND_ADDRESS").unwrap_or(defaults.server.host),
            port: env_parse("LAPSVAULT_API_PORT", defaults.server.port)?,
        };

        let database = DatabaseConfig {
            url: env_string("DATABASE_URL").unwrap_or(defaults.database.url),
            max_connections: env_parse(
                "DATABASE_MAX_CONNECTIONS",
                defaults.database.max_connections,
            )?,
            min_connections: env_parse(
                "DATABASE_MIN_CONNECTIONS",
                defaults.database.min_connections,
            )?,
            connect_timeout_seconds: env_parse(
                "DATABASE_CONNECT_TIMEOUT",
                defaults.database.connect_timeout_seconds,
            )?,
            auto_migrate: env_bool("DATABASE_AUTO_MIGRATE", defaults.database.auto_migrate)?,
        };

        let hsm = HsmConfig {
            address: env_string("VAULT_ADDR").unwrap_or(defaults.hsm.address),
            namespace: env_string("LAPSVAULT_VAULT_NAMESPACE"),
            approle_mount: env_string("LAPSVAULT_APPROLE_MOUNT")
                .unwrap_or(defaults.hsm.approle_mount),
            approle_role: env_string("LAPSVAULT_APPROLE_ROLE").unwrap_or(defaults.hsm.approle_role),
            transit_mount: env_string("LAPSVAULT_TRANSIT_MOUNT")
                .unwrap_or(defaults.hsm.transit_mount),
            transit_key: env_string("LAPSVAULT_TRANSIT_KEY").unwrap_or(defaults.hsm.transit_key),
            pki_mount: env_string("LAPSVAULT_PKI_MOUNT").unwrap_or(defaults.hsm.pki_mount),
            pki_role: env_string("LAPSVAULT_PKI_ROLE").unwrap_or(defaults.hsm.pki_role),
            request_timeout_seconds: env_parse(
                "LAPSVAULT_HSM_TIMEOUT_SECONDS",
                defaults.hsm.request_timeout_seconds,
            )?,
        };

        let policy = defaults.rotation;
        let rotation = RotationPolicy {
            max_uses: env_parse("LAPSVAULT_HSM_MAX_USES", policy.max_uses)?,
            dev_mode: env_bool("LAPSVAULT_DEV_MODE", policy.dev_mode)?,
            password_validity_seconds: env_parse(
                "LAPSVAULT_PASSWORD_VALIDITY_SECONDS",
                policy.password_validity_seconds,
            )?,
            disclosure_grace_seconds: env_parse(
                "LAPSVAULT_DISCLOSURE_GRACE_SECONDS",
                policy.disclosure_grace_seconds,
            )?,
            share_link_ttl_seconds: env_parse(
                "LAPSVAULT_SHARE_LINK_TTL_SECONDS",
                policy.share_link_ttl_seconds,
            )?,
            retained_passwords: env_parse(
                "LAPSVAULT_RETAINED_PASSWORDS",
                policy.retained_passwords,
            )?,
            reauth_interval_seconds: env_parse(
                "LAPSVAULT_REAUTH_INTERVAL_SECONDS",
                policy.reauth_interval_seconds,
            )?,
            secret_rotation_interval_seconds: env_parse(
                "LAPSVAULT_SECRET_ROTATION_INTERVAL_SECONDS",
                policy.secret_rotation_interval_seconds,
            )?,
            bootstrap_poll_seconds: env_parse(
                "LAPSVAULT_BOOTSTRAP_POLL_SECONDS",
                policy.bootstrap_poll_seconds,
            )?,
        };

        let json_logging = match env_string("LAPSVAULT_LOG_FORMAT") {
            Some(format) => match format.trim().to_ascii_lowercase().as_str() {
                "json" => true,
                "pretty" | "text" => false,
                other => {
                    return Err(LapsError::config(format!(
                        "Invalid LAPSVAULT_LOG_FORMAT: {} (expected 'pretty' or 'json')",
                        other
                    )))
                }
            },
            None => defaults.observability.json_logging,
        };

        let observability = ObservabilityConfig {
            enable_metrics: env_bool(
                "LAPSVAULT_ENABLE_METRICS",
                defaults.observability.enable_metrics,
            )?,
            metrics_port: env_parse("LAPSVAULT_METRICS_PORT", defaults.observability.metrics_port)?,
            log_level: env_string("LAPSVAULT_LOG_LEVEL")
                .unwrap_or(defaults.observability.log_level),
            json_logging,
        };

        let config = AppConfig { server, database, hsm, rotation, observability };
        config.validate()?;
        Ok(config)
    }
}
