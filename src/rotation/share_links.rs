//! Time-boxed, password-gated share links.
//!
//! A link grants read access to one machine's latest applied password for a
//! fixed window after issuance. Links are memory-only. Redemption does not
//! consume a link; it stays usable until the window closes.

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;

use super::error::{RotationError, RotationResult};
use super::tokens::generate_token;
use crate::domain::MachineId;
use crate::secrets::SecretString;

#[derive(Debug, Clone)]
pub struct ShareLink {
    pub machine_id: MachineId,
    pub issued_at: DateTime<Utc>,
    pub issued_by: String,
    pub gate_password: SecretString,
}

impl ShareLink {
    pub fn expires_at(&self, ttl: Duration) -> DateTime<Utc> {
        self.issued_at + ttl
    }

    pub fn is_live_at(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        self.expires_at(ttl) > now
    }
}

#[derive(Debug)]
pub struct ShareLinks {
    links: HashMap<String, ShareLink>,
    ttl: Duration,
}

impl ShareLinks {
    pub fn new(ttl: Duration) -> Self {
        Self { links: HashMap::new(), ttl }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Store a new link and return its token. Links whose window closed
    /// before `now` are dropped on the way.
    pub fn issue(
        &mut self,
        machine_id: MachineId,
        gate_password: SecretString,
        issued_by: String,
        now: DateTime<Utc>,
    ) -> String {
        self.purge_expired(now);

        let token = generate_token();
        self.links.insert(
            token.clone(),
            ShareLink { machine_id, issued_at: now, issued_by, gate_password },
        );
        token
    }

    /// Look up a link that is still inside its window.
    pub fn live(&self, token: &str, now: DateTime<Utc>) -> RotationResult<&ShareLink> {
        let link = self.links.get(token).ok_or_else(|| RotationError::not_found("Share link"))?;
        if !link.is_live_at(now, self.ttl) {
            return Err(RotationError::LinkExpired);
        }
        Ok(link)
    }

    /// Check a link and its gate password. A wrong password leaves the link
    /// untouched so it can be retried until expiry.
    pub fn authorize(
        &self,
        token: &str,
        supplied: &SecretString,
        now: DateTime<Utc>,
    ) -> RotationResult<ShareLink> {
        let link = self.live(token, now)?;
        if link.gate_password != *supplied {
            tracing::info!(machine_id = %link.machine_id, "Wrong password sent for share link");
            return Err(RotationError::WrongPassword);
        }
        Ok(link.clone())
    }

    /// Drop every link that points at `machine_id`.
    pub fn revoke_machine(&mut self, machine_id: &MachineId) -> usize {
        let before = self.links.len();
        self.links.retain(|_, link| &link.machine_id != machine_id);
        before - self.links.len()
    }

    pub fn purge_expired(&mut self, now: DateTime<Utc>) -> usize {
        let ttl = self.ttl;
        let before = self.links.len();
        self.links.retain(|_, link| link.is_live_at(now, ttl));
        before - self.links.len()
    }

    pub fn len(&self) -> usize {
        self.links.len()
    }

    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }
}
