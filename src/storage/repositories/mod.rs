//! Per-table repositories backing [`crate::storage::SqliteCredentialStore`].

pub mod audit_log;
pub mod bootstrap;
pub mod machine;
pub mod password;

pub use audit_log::AccessLogRepository;
pub use bootstrap::BootstrapRepository;
pub use machine::MachineRepository;
pub use password::PasswordRepository;
