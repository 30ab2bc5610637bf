//! In-flight rotation rounds, one per machine.
//!
//! An update session binds a machine to the token handed out by the checkin
//! that found its password invalid, and to the password submitted in that
//! round. Minting a new session for the same machine replaces the old one.
//! The map lives only in memory; after a restart devices are told their
//! token is invalid and start a new round.

use std::collections::HashMap;

use super::error::{RotationError, RotationResult};
use super::tokens::generate_token;
use crate::domain::{MachineId, PasswordId};

#[derive(Debug)]
struct UpdateSession {
    token: String,
    /// Password stored by this round's submit, if any
    submitted: Option<PasswordId>,
}

#[derive(Debug, Default)]
pub struct UpdateSessions {
    by_machine: HashMap<MachineId, UpdateSession>,
}

impl UpdateSessions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a round for `machine_id`, replacing any previous token.
    pub fn open(&mut self, machine_id: &MachineId) -> String {
        let token = generate_token();
        let session = UpdateSession { token: token.clone(), submitted: None };
        if self.by_machine.insert(machine_id.clone(), session).is_some() {
            tracing::debug!(machine_id = %machine_id, "Replaced previous update session");
        }
        token
    }

    /// Check that `token` is the live token of `machine_id`.
    pub fn verify(&self, machine_id: &MachineId, token: &str) -> RotationResult<()> {
        self.live(machine_id, token).map(|_| ())
    }

    fn live(&self, machine_id: &MachineId, token: &str) -> RotationResult<&UpdateSession> {
        match self.by_machine.get(machine_id) {
            None => Err(RotationError::session_mismatch(
                "No password update in progress for this machine",
            )),
            Some(session) if session.token != token => {
                Err(RotationError::session_mismatch("Wrong UpdateSessionID was sent"))
            }
            Some(session) => Ok(session),
        }
    }

    /// Bind the password stored by a submit to the machine's round. A later
    /// submit in the same round replaces the binding.
    pub fn record_submission(&mut self, machine_id: &MachineId, password_id: PasswordId) {
        if let Some(session) = self.by_machine.get_mut(machine_id) {
            session.submitted = Some(password_id);
        }
    }

    /// Password submitted in the round `token` belongs to.
    pub fn submitted(
        &self,
        machine_id: &MachineId,
        token: &str,
    ) -> RotationResult<Option<&PasswordId>> {
        Ok(self.live(machine_id, token)?.submitted.as_ref())
    }

    /// End the round. Returns whether a session existed.
    pub fn close(&mut self, machine_id: &MachineId) -> bool {
        self.by_machine.remove(machine_id).is_some()
    }

    pub fn contains(&self, machine_id: &MachineId) -> bool {
        self.by_machine.contains_key(machine_id)
    }

    pub fn len(&self) -> usize {
        self.by_machine.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_machine.is_empty()
    }
}
