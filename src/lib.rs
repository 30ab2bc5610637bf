//! # lapsvault
//!
//! Local administrator password rotation for managed devices, with an
//! external Vault instance acting as HSM.
//!
//! ## Architecture
//!
//! ```text
//! HTTP API (axum) → RotationEngine → HsmBudget → HsmSession → Vault
//!                         ↓                          ↑
//!                  CredentialStore (SQLite)   RenewalScheduler
//! ```
//!
//! ## Core Components
//!
//! - **Rotation engine**: two-phase password update protocol, retention,
//!   audited disclosure and share links
//! - **HSM session**: metered Vault handle (transit, PKI, AppRole) whose
//!   token is renewed before its use budget runs out
//! - **Renewal scheduler**: periodic re-authentication and rotation of the
//!   HSM bootstrap secret
//! - **Credential store**: SQLx/SQLite persistence for machines, passwords,
//!   checkins, the access log and the bootstrap credentials
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use lapsvault::{
//!     config::AppConfig,
//!     rotation::{HsmBudget, RotationEngine, SystemClock},
//!     secrets::{HsmSession, VaultHsmBackend},
//!     storage::{create_pool, CredentialStore, SqliteCredentialStore},
//! };
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let config = AppConfig::from_env()?;
//! let pool = create_pool(&config.database).await?;
//! let store: Arc<dyn CredentialStore> = Arc::new(SqliteCredentialStore::new(pool));
//!
//! let backend = VaultHsmBackend::new(config.hsm.clone())?;
//! let session = HsmSession::new(Box::new(backend), config.hsm.request_timeout());
//! let budget = HsmBudget::new(session, store.clone(), config.rotation.renewal_threshold());
//! let engine = RotationEngine::new(store, budget, config.rotation, Arc::new(SystemClock));
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod config;
pub mod domain;
pub mod errors;
pub mod observability;
pub mod rotation;
pub mod scheduler;
pub mod secrets;
pub mod storage;

pub use config::AppConfig;
pub use errors::{LapsError, Result};

/// Application version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name from Cargo.toml
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");
