//! Password rotation records
//!
//! A password record holds HSM ciphertext only. Its disclosure status moves
//! `Unseen -> Seen -> Expired`, independently of the `applied` flag that the
//! device flips through the confirmation step of a rotation round.

use super::id::{MachineId, PasswordId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Disclosure status of a stored password
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PasswordStatus {
    /// Never shown to anyone
    Unseen,
    /// Decrypted for an operator or share link at least once
    Seen,
    /// Expiry timestamp has passed
    Expired,
}

impl PasswordStatus {
    /// Database representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unseen => "Unseen",
            Self::Seen => "Seen",
            Self::Expired => "Expired",
        }
    }
}

impl FromStr for PasswordStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Unseen" => Ok(Self::Unseen),
            "Seen" => Ok(Self::Seen),
            "Expired" => Ok(Self::Expired),
            _ => Err(format!("Unknown password status: {}", s)),
        }
    }
}

impl fmt::Display for PasswordStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A stored password as persisted in the credential store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PasswordRecord {
    pub id: PasswordId,
    pub machine_id: MachineId,
    /// HSM ciphertext; cleartext is never persisted
    pub ciphertext: String,
    pub status: PasswordStatus,
    /// Device confirmed it installed this value
    pub applied: bool,
    pub received_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl PasswordRecord {
    /// A freshly encrypted password awaiting device confirmation
    pub fn pending(
        machine_id: MachineId,
        ciphertext: String,
        received_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: PasswordId::new(),
            machine_id,
            ciphertext,
            status: PasswordStatus::Unseen,
            applied: false,
            received_at,
            expires_at,
        }
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }

    /// Whether a device may keep authenticating with this password.
    ///
    /// Machine-level disabling is checked by the store query that selects
    /// the latest applied password.
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        self.applied && !self.is_expired_at(now)
    }

    /// Status with lazy expiry applied
    pub fn effective_status(&self, now: DateTime<Utc>) -> PasswordStatus {
        if self.is_expired_at(now) {
            PasswordStatus::Expired
        } else {
            self.status
        }
    }

    /// Ciphertext-free view for operator listings
    pub fn summary(&self) -> PasswordSummary {
        PasswordSummary {
            id: self.id.clone(),
            status: self.status,
            applied: self.applied,
            received_at: self.received_at,
            expires_at: self.expires_at,
        }
    }
}

/// Operator-facing view of a stored password without its ciphertext
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PasswordSummary {
    pub id: PasswordId,
    pub status: PasswordStatus,
    pub applied: bool,
    pub received_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}
