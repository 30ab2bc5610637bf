//! Domain layer
//!
//! Plain data types for machines, their rotated passwords and the audit
//! trail. Nothing in here talks to the HSM or the database; lifecycle
//! decisions live in [`crate::rotation`].
//!
//! ## Module Organization
//!
//! - `id`: Type-safe identifiers with the NewType pattern
//! - `machine`: Enrolled devices and their checkins
//! - `password`: Rotation records and disclosure status
//! - `audit`: Access log entries and HSM bootstrap credentials

pub mod audit;
pub mod id;
pub mod machine;
pub mod password;

pub use audit::{AccessLogEntry, AccessLogView, AuthBootstrap, SHARE_LINK_ACTOR_SUFFIX};
pub use id::{MachineId, PasswordId};
pub use machine::{CheckinRecord, Machine};
pub use password::{PasswordRecord, PasswordStatus, PasswordSummary};
