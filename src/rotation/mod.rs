//! # Credential rotation
//!
//! The policy core of the service.
//!
//! - [`RotationEngine`]: device protocol (enroll, checkin, submit, confirm),
//!   disclosure with audit, share links and operator actions
//! - [`HsmBudget`]: the process-wide HSM session and its renewal guard
//! - [`UpdateSessions`] and [`ShareLinks`]: in-memory keyed stores owned by
//!   the engine
//! - [`select_for_pruning`]: retention of applied passwords
//! - [`Clock`]: time source, swappable in tests

pub mod budget;
pub mod clock;
pub mod engine;
pub mod error;
pub mod retention;
pub mod sessions;
pub mod share_links;
pub mod tokens;

pub use budget::HsmBudget;
pub use clock::{Clock, ManualClock, SystemClock};
pub use engine::{
    device_reported_success, CheckinOutcome, ConfirmOutcome, Disclosure, Enrollment,
    IssuedShareLink, MachineDetail, MachineOverview, PasswordLookup, RotationEngine,
    ShareLinkStatus,
};
pub use error::{RotationError, RotationResult};
pub use retention::select_for_pruning;
pub use sessions::UpdateSessions;
pub use share_links::{ShareLink, ShareLinks};
pub use tokens::{generate_token, TOKEN_LENGTH};
