//! # Configuration Settings
//!
//! Defines the configuration structure for the lapsvault service.

use crate::errors::{LapsError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use validator::Validate;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate, Default)]
pub struct AppConfig {
    /// HTTP API configuration
    #[validate(nested)]
    pub server: ServerConfig,

    /// Credential store configuration
    #[validate(nested)]
    pub database: DatabaseConfig,

    /// HSM (Vault) connection configuration
    #[validate(nested)]
    pub hsm: HsmConfig,

    /// Password rotation and HSM budget policy
    #[validate(nested)]
    pub rotation: RotationPolicy,

    /// Logging and metrics configuration
    #[validate(nested)]
    pub observability: ObservabilityConfig,
}

impl AppConfig {
    /// Validate the entire configuration
    pub fn validate(&self) -> Result<()> {
        Validate::validate(self).map_err(LapsError::from)?;
        self.validate_custom()
    }

    fn validate_custom(&self) -> Result<()> {
        if !self.database.url.starts_with("sqlite:") {
            return Err(LapsError::validation_field(
                "Database URL must start with 'sqlite:'",
                "database.url",
            ));
        }

        if self.observability.enable_metrics && self.observability.metrics_port == self.server.port
        {
            return Err(LapsError::validation("API and metrics ports cannot be the same"));
        }

        if self.rotation.reauth_interval_seconds >= self.rotation.secret_rotation_interval_seconds
        {
            tracing::warn!(
                reauth_interval_seconds = self.rotation.reauth_interval_seconds,
                secret_rotation_interval_seconds = self.rotation.secret_rotation_interval_seconds,
                "Re-authentication runs less often than bootstrap secret rotation"
            );
        }

        Ok(())
    }
}

/// HTTP API server configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ServerConfig {
    /// Server bind address
    #[validate(length(min = 1, message = "Host cannot be empty"))]
    pub host: String,

    /// Server port
    #[validate(range(min = 1, message = "Port must be between 1 and 65535"))]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { host: "0.0.0.0".to_string(), port: 8080 }
    }
}

impl ServerConfig {
    /// Get the server bind address
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct DatabaseConfig {
    /// Database connection URL
    #[validate(length(min = 1, message = "Database URL cannot be empty"))]
    pub url: String,

    /// Maximum number of connections in the pool
    #[validate(range(min = 1, max = 100, message = "Max connections must be between 1 and 100"))]
    pub max_connections: u32,

    /// Minimum number of connections in the pool
    #[validate(range(max = 50, message = "Min connections must be between 0 and 50"))]
    pub min_connections: u32,

    /// Connection timeout in seconds
    #[validate(range(
        min = 1,
        max = 60,
        message = "Connect timeout must be between 1 and 60 seconds"
    ))]
    pub connect_timeout_seconds: u64,

    /// Enable automatic migrations
    pub auto_migrate: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://./data/lapsvault.db".to_string(),
            max_connections: 5,
            min_connections: 0,
            connect_timeout_seconds: 10,
            auto_migrate: true,
        }
    }
}

impl DatabaseConfig {
    /// Get connection timeout as Duration
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_seconds)
    }

    /// Whether this points at a transient in-memory database
    pub fn is_in_memory(&self) -> bool {
        self.url.contains(":memory:")
    }
}

/// Connection settings for the Vault instance acting as HSM
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct HsmConfig {
    /// Vault server address (e.g. "http://vault.internal:8200")
    #[validate(length(min = 1, message = "Vault address cannot be empty"))]
    pub address: String,

    /// Vault namespace (Enterprise only)
    pub namespace: Option<String>,

    /// Mount path of the AppRole auth method
    #[validate(length(min = 1))]
    pub approle_mount: String,

    /// AppRole role whose secret ids are rotated
    #[validate(length(min = 1))]
    pub approle_role: String,

    /// Mount path of the transit engine
    #[validate(length(min = 1))]
    pub transit_mount: String,

    /// Transit key used for client passwords
    #[validate(length(min = 1))]
    pub transit_key: String,

    /// Mount path of the PKI engine used for enrollment
    #[validate(length(min = 1))]
    pub pki_mount: String,

    /// PKI role used to sign device CSRs
    #[validate(length(min = 1))]
    pub pki_role: String,

    /// Upper bound for a single HSM request, in seconds
    #[validate(range(
        min = 1,
        max = 120,
        message = "HSM timeout must be between 1 and 120 seconds"
    ))]
    pub request_timeout_seconds: u64,
}

impl Default for HsmConfig {
    fn default() -> Self {
        Self {
            address: "http://127.0.0.1:8200".to_string(),
            namespace: None,
            approle_mount: "approle".to_string(),
            approle_role: "client-passwords".to_string(),
            transit_mount: "transit".to_string(),
            transit_key: "client-passwords".to_string(),
            pki_mount: "pki".to_string(),
            pki_role: "mlaps".to_string(),
            request_timeout_seconds: 10,
        }
    }
}

impl HsmConfig {
    /// Get the per-request timeout as Duration
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }
}

/// Rotation, retention and HSM budget policy
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct RotationPolicy {
    /// Number of requests one HSM token may service
    #[validate(range(min = 2, message = "max_uses must leave room for the reserved renewal slot"))]
    pub max_uses: u32,

    /// Development mode: passwords expire one second after submission
    pub dev_mode: bool,

    /// Validity of a freshly submitted password in production mode, in seconds
    #[validate(range(
        min = 1,
        max = 31_536_000,
        message = "Password validity must be between 1 second and 365 days"
    ))]
    pub password_validity_seconds: u64,

    /// Remaining lifetime of a password after it has been disclosed, in seconds
    #[validate(range(
        min = 1,
        max = 2_592_000,
        message = "Disclosure grace must be between 1 second and 30 days"
    ))]
    pub disclosure_grace_seconds: u64,

    /// Validity window of a share link, in seconds
    #[validate(range(
        min = 1,
        max = 604_800,
        message = "Share link TTL must be between 1 second and 7 days"
    ))]
    pub share_link_ttl_seconds: u64,

    /// Number of applied passwords kept per machine
    #[validate(range(min = 1, message = "At least one applied password must be retained"))]
    pub retained_passwords: usize,

    /// Period of the forced HSM re-authentication, in seconds
    #[validate(range(
        min = 1,
        max = 86_400,
        message = "Re-authentication interval must be between 1 second and 1 day"
    ))]
    pub reauth_interval_seconds: u64,

    /// Period of the HSM bootstrap secret rotation, in seconds
    #[validate(range(
        min = 1,
        max = 2_592_000,
        message = "Secret rotation interval must be between 1 second and 30 days"
    ))]
    pub secret_rotation_interval_seconds: u64,

    /// Poll interval while waiting for the first bootstrap credentials, in seconds
    #[validate(range(min = 1, max = 3600))]
    pub bootstrap_poll_seconds: u64,
}

impl Default for RotationPolicy {
    fn default() -> Self {
        Self {
            max_uses: 10,
            dev_mode: false,
            // 7 days minus 5 minutes so a checkin never lands on a password with
            // only seconds of validity left.
            password_validity_seconds: 7 * 24 * 3600 - 5 * 60,
            disclosure_grace_seconds: 3600,
            share_link_ttl_seconds: 15 * 60,
            retained_passwords: 5,
            reauth_interval_seconds: 3500,
            secret_rotation_interval_seconds: 9000,
            bootstrap_poll_seconds: 5,
        }
    }
}

impl RotationPolicy {
    /// Lifetime given to a newly submitted password
    pub fn password_validity(&self) -> chrono::Duration {
        if self.dev_mode {
            chrono::Duration::seconds(1)
        } else {
            chrono::Duration::seconds(self.password_validity_seconds as i64)
        }
    }

    /// Remaining shelf life of a password once it has been shown
    pub fn disclosure_grace(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.disclosure_grace_seconds as i64)
    }

    /// Share link validity window
    pub fn share_link_ttl(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.share_link_ttl_seconds as i64)
    }

    /// Usage count at which the budget guard renews the HSM token.
    ///
    /// The last permitted use is reserved for the renewal itself.
    pub fn renewal_threshold(&self) -> u32 {
        self.max_uses.saturating_sub(1)
    }

    pub fn reauth_interval(&self) -> Duration {
        Duration::from_secs(self.reauth_interval_seconds)
    }

    pub fn secret_rotation_interval(&self) -> Duration {
        Duration::from_secs(self.secret_rotation_interval_seconds)
    }

    pub fn bootstrap_poll(&self) -> Duration {
        Duration::from_secs(self.bootstrap_poll_seconds)
    }
}

/// Observability configuration for logging and metrics
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct ObservabilityConfig {
    /// Enable the Prometheus metrics exporter
    pub enable_metrics: bool,

    /// Metrics server port
    #[validate(range(min = 1, message = "Metrics port must be between 1 and 65535"))]
    pub metrics_port: u16,

    /// Log level (trace, debug, info, warn, error) or a full filter directive
    #[validate(length(min = 1, message = "Log level cannot be empty"))]
    pub log_level: String,

    /// Enable JSON structured logging
    pub json_logging: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            enable_metrics: false,
            metrics_port: 9090,
            log_level: "info".to_string(),
            json_logging: false,
        }
    }
}

impl ObservabilityConfig {
    /// Get metrics bind address
    pub fn metrics_bind_address(&self) -> String {
        format!("0.0.0.0:{}", self.metrics_port)
    }
}
