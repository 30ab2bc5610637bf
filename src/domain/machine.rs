//! Managed devices

use super::id::MachineId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An enrolled device
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Machine {
    pub id: MachineId,
    pub hostname: String,
    pub serial_number: String,
    pub enrolled_at: DateTime<Utc>,
    /// Set by the first checkin after the certificate was issued
    pub enroll_success: bool,
    /// Irreversible; a disabled machine never receives a usable password
    pub disabled: bool,
}

impl Machine {
    /// A machine row as created at enrollment time
    pub fn enrolling(
        id: MachineId,
        hostname: impl Into<String>,
        serial_number: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            hostname: hostname.into(),
            serial_number: serial_number.into(),
            enrolled_at: now,
            enroll_success: false,
            disabled: false,
        }
    }

    /// Whether `other` looks like the same physical device re-enrolled
    pub fn may_duplicate(&self, other: &Machine) -> bool {
        self.id != other.id
            && !other.disabled
            && (self.hostname == other.hostname || self.serial_number == other.serial_number)
    }
}

/// One device checkin
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckinRecord {
    pub id: i64,
    pub machine_id: MachineId,
    pub checked_in_at: DateTime<Utc>,
}
