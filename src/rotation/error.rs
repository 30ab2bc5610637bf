//! Outcomes of rotation-engine operations.
//!
//! Every engine operation returns [`RotationResult`]. Failures from the
//! credential store and the HSM are converted here and never escape the
//! engine as anything else. Each variant renders a reason that is safe to
//! show to the caller and carries no cleartext.

use crate::errors::LapsError;
use thiserror::Error;

pub type RotationResult<T> = std::result::Result<T, RotationError>;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RotationError {
    /// Token over its use limit and renewal failed; retry later.
    #[error("HSM token exhausted its use budget and could not be renewed")]
    BudgetExhausted,

    #[error("HSM unavailable: {reason}")]
    BackendUnavailable { reason: String },

    #[error("Failed to encrypt the password in the HSM: {reason}")]
    EncryptionFailed { reason: String },

    #[error("Decryption failed in the HSM: {reason}")]
    DecryptionFailed { reason: String },

    #[error("Failed to sign the CSR in the HSM: {reason}")]
    SigningFailed { reason: String },

    /// Protocol desynchronization between device and server.
    #[error("{reason}")]
    SessionMismatch { reason: String },

    #[error("{what} not found")]
    NotFound { what: String },

    #[error("Machine {machine_id} is disabled")]
    MachineDisabled { machine_id: String },

    #[error("Wrong password")]
    WrongPassword,

    #[error("Share link has expired")]
    LinkExpired,

    #[error("Invalid input: {reason}")]
    InvalidInput { reason: String },

    #[error("Credential store unavailable: {reason}")]
    StoreUnavailable { reason: String },
}

impl RotationError {
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound { what: what.into() }
    }

    pub fn session_mismatch(reason: impl Into<String>) -> Self {
        Self::SessionMismatch { reason: reason.into() }
    }

    pub fn invalid_input(reason: impl Into<String>) -> Self {
        Self::InvalidInput { reason: reason.into() }
    }

    pub fn machine_disabled(machine_id: impl ToString) -> Self {
        Self::MachineDisabled { machine_id: machine_id.to_string() }
    }

    /// Stable machine-readable code.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::BudgetExhausted => "budget_exhausted",
            Self::BackendUnavailable { .. } => "backend_unavailable",
            Self::EncryptionFailed { .. } => "encryption_failed",
            Self::DecryptionFailed { .. } => "decryption_failed",
            Self::SigningFailed { .. } => "signing_failed",
            Self::SessionMismatch { .. } => "session_mismatch",
            Self::NotFound { .. } => "not_found",
            Self::MachineDisabled { .. } => "machine_disabled",
            Self::WrongPassword => "wrong_password",
            Self::LinkExpired => "link_expired",
            Self::InvalidInput { .. } => "invalid_input",
            Self::StoreUnavailable { .. } => "store_unavailable",
        }
    }

    /// Whether the same request may succeed if simply retried later.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::BudgetExhausted
                | Self::BackendUnavailable { .. }
                | Self::EncryptionFailed { .. }
                | Self::DecryptionFailed { .. }
                | Self::SigningFailed { .. }
                | Self::WrongPassword
                | Self::StoreUnavailable { .. }
        )
    }
}

impl From<LapsError> for RotationError {
    fn from(error: LapsError) -> Self {
        tracing::error!(error = %error, "Credential store operation failed");
        Self::StoreUnavailable { reason: error.to_string() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reasons_are_human_readable() {
        assert_eq!(RotationError::not_found("Machine abc").to_string(), "Machine abc not found");
        assert_eq!(
            RotationError::session_mismatch("Wrong UpdateSessionID was sent").to_string(),
            "Wrong UpdateSessionID was sent"
        );
        assert_eq!(RotationError::WrongPassword.to_string(), "Wrong password");
    }

    #[test]
    fn test_kind_codes() {
        assert_eq!(RotationError::BudgetExhausted.kind(), "budget_exhausted");
        assert_eq!(RotationError::LinkExpired.kind(), "link_expired");
        assert!(RotationError::BudgetExhausted.is_retryable());
        assert!(!RotationError::session_mismatch("x").is_retryable());
    }

    #[test]
    fn test_store_errors_convert() {
        let err: RotationError = LapsError::internal("disk full").into();
        assert_eq!(err.kind(), "store_unavailable");
    }
}
