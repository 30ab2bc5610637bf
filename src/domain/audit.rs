//! Audit trail and HSM bootstrap material

use super::id::{MachineId, PasswordId};
use crate::secrets::SecretString;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Suffix appended to the issuing operator when a share link is redeemed
pub const SHARE_LINK_ACTOR_SUFFIX: &str = " (share link)";

/// One cleartext disclosure, written before the HSM is asked to decrypt
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AccessLogEntry {
    pub id: i64,
    pub operator: String,
    pub accessed_at: DateTime<Utc>,
    pub machine_id: MachineId,
    pub password_id: PasswordId,
}

/// Access log row joined with the machine it concerns
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AccessLogView {
    #[serde(flatten)]
    pub entry: AccessLogEntry,
    pub hostname: String,
    pub serial_number: String,
}

/// HSM AppRole login material; only the newest row is current
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuthBootstrap {
    pub id: i64,
    pub role_id: String,
    pub secret_id: SecretString,
}
