//! # Error Types
//!
//! Error types for the lapsvault service using `thiserror`.

/// Custom result type for lapsvault infrastructure operations
pub type Result<T> = std::result::Result<T, LapsError>;

/// Infrastructure error type shared by configuration, storage and startup code
#[derive(thiserror::Error, Debug)]
pub enum LapsError {
    /// Configuration errors
    #[error("Configuration error: {message}")]
    Config {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Database and storage errors
    #[error("Database error: {context}")]
    Database {
        #[source]
        source: sqlx::Error,
        context: String,
    },

    /// Migration errors
    #[error("Migration error: {context}")]
    Migration {
        #[source]
        source: sqlx::migrate::MigrateError,
        context: String,
    },

    /// I/O errors with additional context
    #[error("I/O error: {context}")]
    Io {
        #[source]
        source: std::io::Error,
        context: String,
    },

    /// Validation errors
    #[error("Validation error: {message}")]
    Validation { message: String, field: Option<String> },

    /// Internal errors
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl LapsError {
    /// Create a new configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config { message: message.into(), source: None }
    }

    /// Create a configuration error with source
    pub fn config_with_source<S: Into<String>>(
        message: S,
        source: Box<dyn std::error::Error + Send + Sync>,
    ) -> Self {
        Self::Config { message: message.into(), source: Some(source) }
    }

    /// Create a database error with context
    pub fn database<S: Into<String>>(source: sqlx::Error, context: S) -> Self {
        Self::Database { source, context: context.into() }
    }

    /// Create a validation error
    pub fn validation<S: Into<String>>(message: S) -> Self {
        Self::Validation { message: message.into(), field: None }
    }

    /// Create a validation error with field information
    pub fn validation_field<S: Into<String>, F: Into<String>>(message: S, field: F) -> Self {
        Self::Validation { message: message.into(), field: Some(field.into()) }
    }

    /// Create an internal error
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal { message: message.into() }
    }

    /// Check if this error is worth retrying later
    pub fn is_retryable(&self) -> bool {
        matches!(self, LapsError::Database { .. } | LapsError::Io { .. })
    }
}

impl From<sqlx::Error> for LapsError {
    fn from(error: sqlx::Error) -> Self {
        Self::Database { source: error, context: "Database operation failed".to_string() }
    }
}

impl From<std::io::Error> for LapsError {
    fn from(error: std::io::Error) -> Self {
        Self::Io { source: error, context: "I/O operation failed".to_string() }
    }
}

impl From<sqlx::migrate::MigrateError> for LapsError {
    fn from(error: sqlx::migrate::MigrateError) -> Self {
        Self::Migration { source: error, context: "Failed to apply migrations".to_string() }
    }
}

impl From<validator::ValidationErrors> for LapsError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let message = errors
            .field_errors()
            .iter()
            .map(|(field, field_errors)| {
                let messages: Vec<String> = field_errors
                    .iter()
                    .map(|e| {
                        e.message.as_ref().map_or("Invalid value".to_string(), |m| m.to_string())
                    })
                    .collect();
                format!("{}: {}", field, messages.join(", "))
            })
            .collect::<Vec<_>>()
            .join("; ");

        Self::validation(format!("Validation failed: {}", message))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let error = LapsError::config("missing VAULT_ADDR");
        assert!(matches!(error, LapsError::Config { .. }));
        assert_eq!(error.to_string(), "Configuration error: missing VAULT_ADDR");
    }

    #[test]
    fn test_validation_field() {
        let error = LapsError::validation_field("must be greater than 1", "max_uses");
        if let LapsError::Validation { field, .. } = error {
            assert_eq!(field, Some("max_uses".to_string()));
        } else {
            panic!("expected validation error");
        }
    }

    #[test]
    fn test_retryable_errors() {
        let io_error: LapsError =
            std::io::Error::new(std::io::ErrorKind::Other, "disk full").into();
        assert!(io_error.is_retryable());
        assert!(LapsError::database(sqlx::Error::PoolTimedOut, "checkin").is_retryable());
        assert!(!LapsError::validation("bad").is_retryable());
        assert!(!LapsError::internal("boom").is_retryable());
    }
}
