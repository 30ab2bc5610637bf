//! Error types for HSM backend calls.
//!
//! Backend calls return these as values; [`crate::secrets::HsmSession`]
//! absorbs login errors into its authenticated flag and the rotation engine
//! turns the rest into protocol outcomes.

use thiserror::Error;

/// Result type for HSM backend operations.
pub type Result<T> = std::result::Result<T, SecretsError>;

/// Errors that can occur while talking to the HSM.
#[derive(Error, Debug)]
pub enum SecretsError {
    /// Login with the bootstrap credentials was refused.
    #[error("Authentication failed: {message}")]
    AuthenticationFailed { message: String },

    /// The HSM could not be reached.
    #[error("Backend connection failed: {message}")]
    ConnectionFailed { message: String },

    /// The HSM answered with an error.
    #[error("Backend error during {operation}: {message}")]
    BackendError { operation: &'static str, message: String },

    /// The request did not complete within the configured bound.
    #[error("{operation} timed out after {seconds}s")]
    Timeout { operation: &'static str, seconds: u64 },

    /// A data operation was attempted without a live token.
    #[error("No authenticated HSM session")]
    NotAuthenticated,

    /// The HSM answered but the payload was unusable.
    #[error("Invalid response during {operation}: {message}")]
    InvalidResponse { operation: &'static str, message: String },

    /// Backend client could not be constructed from configuration.
    #[error("Configuration error: {message}")]
    ConfigError { message: String },
}

impl SecretsError {
    pub fn authentication_failed(message: impl Into<String>) -> Self {
        Self::AuthenticationFailed { message: message.into() }
    }

    pub fn connection_failed(message: impl Into<String>) -> Self {
        Self::ConnectionFailed { message: message.into() }
    }

    pub fn backend_error(operation: &'static str, message: impl Into<String>) -> Self {
        Self::BackendError { operation, message: message.into() }
    }

    pub fn invalid_response(operation: &'static str, message: impl Into<String>) -> Self {
        Self::InvalidResponse { operation, message: message.into() }
    }

    pub fn config_error(message: impl Into<String>) -> Self {
        Self::ConfigError { message: message.into() }
    }
}
