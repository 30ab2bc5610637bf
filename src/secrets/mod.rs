//! HSM access for password encryption and device certificates.
//!
//! # Architecture
//!
//! - [`HsmBackend`]: one request per call against the external HSM
//!   (AppRole login, transit encrypt/decrypt, PKI sign, secret-id issue)
//! - [`VaultHsmBackend`]: the production backend on top of `vaultrs`
//! - [`HsmSession`]: wraps a backend with the authenticated flag, the usage
//!   counter of the current token and a per-request timeout
//! - [`SecretString`]: redacting, zeroizing carrier for cleartext
//!
//! The session is shared behind a `tokio::sync::Mutex` by the rotation
//! engine and the renewal scheduler, so the budget check and the call it
//! guards happen under one lock.
//!
//! # Example
//!
//! ```rust,ignore
//! use lapsvault::secrets::{HsmSession, SecretString, VaultHsmBackend};
//!
//! let backend = VaultHsmBackend::new(config.hsm.clone())?;
//! let mut session = HsmSession::new(Box::new(backend), config.hsm.request_timeout());
//! if session.authenticate(&bootstrap.role_id, &bootstrap.secret_id).await {
//!     let ciphertext = session.encrypt(&SecretString::new("Sw0rd!")).await?;
//! }
//! ```

pub mod client;
pub mod error;
pub mod session;
pub mod types;
pub mod vault;

pub use client::HsmBackend;
pub use error::{Result, SecretsError};
pub use session::HsmSession;
pub use types::SecretString;
pub use vault::VaultHsmBackend;
