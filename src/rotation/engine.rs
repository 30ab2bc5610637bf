//! Rotation engine
//!
//! Orchestrates the password lifecycle: enrollment, the two-phase update
//! protocol driven by device checkins, retention, operator disclosure, share
//! links and administrative actions. Every HSM request goes through the
//! budget guard in [`HsmBudget`]; every store or HSM failure is converted to
//! a [`RotationError`] before leaving this module.
//!
//! Locks are always taken in the order update sessions, then HSM session.
//! The share-link map has its own lock and is never held across an HSM call.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{field, info, instrument, warn};

use super::budget::HsmBudget;
use super::clock::Clock;
use super::error::{RotationError, RotationResult};
use super::retention::select_for_pruning;
use super::sessions::UpdateSessions;
use super::share_links::ShareLinks;
use crate::config::RotationPolicy;
use crate::domain::{
    AccessLogView, CheckinRecord, Machine, MachineId, PasswordId, PasswordRecord, PasswordStatus,
    PasswordSummary, SHARE_LINK_ACTOR_SUFFIX,
};
use crate::observability::metrics;
use crate::secrets::{SecretString, SecretsError};
use crate::storage::CredentialStore;

/// Result of a device checkin
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckinOutcome {
    /// The device's current password is still valid
    Current,
    /// The device must generate a new password and submit it with this token
    NeedsUpdate { session_token: String },
}

/// How an operator addresses a password
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PasswordLookup {
    /// Latest applied password of a machine that is not disabled
    Machine(MachineId),
    Password(PasswordId),
}

#[derive(Debug, Clone)]
pub struct Enrollment {
    pub machine_id: MachineId,
    /// PEM certificate signed by the HSM with the machine id as common name
    pub certificate: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConfirmOutcome {
    pub applied: bool,
    pub pruned: u64,
}

/// A decrypted password handed to an operator or share-link holder
#[derive(Debug, Clone)]
pub struct Disclosure {
    pub machine_id: MachineId,
    pub password_id: PasswordId,
    pub password: SecretString,
    pub expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MachineOverview {
    #[serde(flatten)]
    pub machine: Machine,
    /// Status of the password that expires last; `None` when there is none
    pub password_status: Option<PasswordStatus>,
    pub password_expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MachineDetail {
    pub machine: Machine,
    pub passwords: Vec<PasswordSummary>,
    pub checkins: Vec<CheckinRecord>,
    pub possible_duplicates: Vec<Machine>,
}

#[derive(Debug, Clone, Serialize)]
pub struct IssuedShareLink {
    pub token: String,
    pub machine_id: MachineId,
    pub expires_at: DateTime<Utc>,
}

/// What an unauthenticated link holder may learn about a link
#[derive(Debug, Clone, Serialize)]
pub struct ShareLinkStatus {
    pub machine_id: MachineId,
    pub expires_at: DateTime<Utc>,
}

/// Whether a device's confirmation report means it installed the password.
pub fn device_reported_success(result: &str) -> bool {
    let result = result.trim();
    !result.is_empty() && !result.starts_with("Failed to")
}

pub struct RotationEngine {
    store: Arc<dyn CredentialStore>,
    hsm: HsmBudget,
    sessions: Mutex<UpdateSessions>,
    share_links: RwLock<ShareLinks>,
    policy: RotationPolicy,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for RotationEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RotationEngine")
            .field("hsm", &self.hsm)
            .field("policy", &self.policy)
            .finish()
    }
}

impl RotationEngine {
    pub fn new(
        store: Arc<dyn CredentialStore>,
        hsm: HsmBudget,
        policy: RotationPolicy,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let share_links = ShareLinks::new(policy.share_link_ttl());
        Self {
            store,
            hsm,
            sessions: Mutex::new(UpdateSessions::new()),
            share_links: RwLock::new(share_links),
            policy,
            clock,
        }
    }

    /// Budget guard shared with the renewal scheduler.
    pub fn hsm(&self) -> &HsmBudget {
        &self.hsm
    }

    pub async fn has_update_session(&self, machine_id: &MachineId) -> bool {
        self.sessions.lock().await.contains(machine_id)
    }

    // ---------------------------------------------------------------------
    // Device protocol
    // ---------------------------------------------------------------------

    /// Register a new device and sign its certificate request.
    ///
    /// The machine row is removed again if signing does not succeed.
    #[instrument(skip(self, csr_pem), fields(machine_id = field::Empty))]
    pub async fn enroll(
        &self,
        csr_pem: &str,
        hostname: &str,
        serial_number: &str,
    ) -> RotationResult<Enrollment> {
        if hostname.trim().is_empty() || serial_number.trim().is_empty() {
            return Err(RotationError::invalid_input("hostname and serial number are required"));
        }
        if !csr_pem.contains("CERTIFICATE REQUEST") {
            return Err(RotationError::invalid_input("CSR is not a PEM certificate request"));
        }

        let machine =
            Machine::enrolling(MachineId::new(), hostname, serial_number, self.clock.now());
        tracing::Span::current().record("machine_id", field::display(&machine.id));
        self.store.insert_machine(&machine).await?;

        let signed = {
            let mut session = self.hsm.lock().await;
            match self.hsm.check_budget(&mut session).await {
                Ok(()) => session
                    .sign_csr(csr_pem, machine.id.as_str())
                    .await
                    .map_err(|e| hsm_failure("sign_csr", e)),
                Err(e) => Err(e),
            }
        };

        match signed {
            Ok(certificate) => {
                info!(hostname, "Machine enrolled");
                Ok(Enrollment { machine_id: machine.id, certificate })
            }
            Err(e) => {
                if let Err(cleanup) = self.store.delete_machine(&machine.id).await {
                    warn!(error = %cleanup, "Failed to remove machine after failed enrollment");
                }
                Err(e)
            }
        }
    }

    /// Record a checkin and decide whether the device needs a new password.
    #[instrument(skip(self, machine_id), fields(machine_id = %machine_id))]
    pub async fn checkin(
        &self,
        machine_id: &MachineId,
        hostname: &str,
        serial_number: &str,
    ) -> RotationResult<CheckinOutcome> {
        self.active_machine(machine_id).await?;

        let now = self.clock.now();
        self.store.record_checkin(machine_id, now).await?;
        self.store.refresh_machine_info(machine_id, hostname, serial_number).await?;

        if let Some(current) = self.store.latest_applied_password(machine_id).await? {
            if current.is_valid_at(now) {
                return Ok(CheckinOutcome::Current);
            }
            self.settle_expiry(&current, now).await?;
        }

        let session_token = self.sessions.lock().await.open(machine_id);
        info!("Password update requested from device");
        Ok(CheckinOutcome::NeedsUpdate { session_token })
    }

    /// Encrypt and store the password the device proposes.
    ///
    /// The update session stays open until the device confirms.
    #[instrument(
        skip(self, machine_id, session_token, password),
        fields(machine_id = %machine_id)
    )]
    pub async fn submit_secret(
        &self,
        machine_id: &MachineId,
        session_token: &str,
        password: &SecretString,
    ) -> RotationResult<PasswordId> {
        let mut sessions = self.sessions.lock().await;
        sessions.verify(machine_id, session_token)?;
        self.active_machine(machine_id).await?;
        if password.is_empty() {
            return Err(RotationError::invalid_input("password must not be empty"));
        }

        let ciphertext = {
            let mut session = self.hsm.lock().await;
            self.hsm.check_budget(&mut session).await?;
            session.encrypt(password).await.map_err(|e| hsm_failure("encrypt", e))?
        };

        let now = self.clock.now();
        let record = PasswordRecord::pending(
            machine_id.clone(),
            ciphertext,
            now,
            now + self.policy.password_validity(),
        );
        self.store.insert_password(&record).await?;
        sessions.record_submission(machine_id, record.id.clone());
        drop(sessions);

        info!(password_id = %record.id, "Stored new password awaiting confirmation");
        Ok(record.id)
    }

    /// Apply the device's report to the password submitted in this round and
    /// end the round. A round without a submit cannot be confirmed.
    #[instrument(skip(self, machine_id, session_token), fields(machine_id = %machine_id))]
    pub async fn confirm_secret(
        &self,
        machine_id: &MachineId,
        session_token: &str,
        device_result: &str,
    ) -> RotationResult<ConfirmOutcome> {
        let mut sessions = self.sessions.lock().await;
        sessions.verify(machine_id, session_token)?;
        self.active_machine(machine_id).await?;

        let submitted = sessions.submitted(machine_id, session_token)?.cloned().ok_or_else(|| {
            RotationError::not_found(format!("Password submitted in this round for {machine_id}"))
        })?;
        let pending = self.store.get_password(&submitted).await?.ok_or_else(|| {
            RotationError::not_found(format!("Password {submitted}"))
        })?;

        let applied = device_reported_success(device_result);
        self.store.set_password_applied(&pending.id, applied).await?;
        sessions.close(machine_id);
        drop(sessions);

        if !applied {
            warn!(password_id = %pending.id, "Device failed to apply the new password");
        }
        metrics::record_rotation(applied);

        let pruned = match self.prune(machine_id).await {
            Ok(pruned) => pruned,
            Err(e) => {
                warn!(error = %e, "Retention pruning failed; will retry on the next confirmation");
                0
            }
        };

        Ok(ConfirmOutcome { applied, pruned })
    }

    async fn prune(&self, machine_id: &MachineId) -> RotationResult<u64> {
        let history = self.store.list_passwords(machine_id).await?;
        let doomed = select_for_pruning(&history, self.policy.retained_passwords);
        if doomed.is_empty() {
            return Ok(0);
        }
        let removed = self.store.delete_passwords(&doomed).await?;
        info!(removed, "Pruned old passwords");
        Ok(removed)
    }

    // ---------------------------------------------------------------------
    // Disclosure
    // ---------------------------------------------------------------------

    /// Decrypt a password for an operator. The access is logged before the
    /// HSM is asked, so a failed decrypt still leaves an audit entry.
    #[instrument(skip(self, operator), fields(operator = %operator))]
    pub async fn disclose(
        &self,
        lookup: &PasswordLookup,
        operator: &str,
    ) -> RotationResult<Disclosure> {
        if operator.trim().is_empty() {
            return Err(RotationError::invalid_input("operator identity is required"));
        }
        let record = self.resolve(lookup).await?;
        self.disclose_record(record, operator, "operator").await
    }

    async fn disclose_record(
        &self,
        record: PasswordRecord,
        actor: &str,
        channel: &'static str,
    ) -> RotationResult<Disclosure> {
        let now = self.clock.now();
        self.store.record_access(actor, &record.machine_id, &record.id, now).await?;

        let decrypted = {
            let mut session = self.hsm.lock().await;
            match self.hsm.check_budget(&mut session).await {
                Ok(()) => session
                    .decrypt(&record.ciphertext)
                    .await
                    .map_err(|e| hsm_failure("decrypt", e)),
                Err(e) => Err(e),
            }
        };
        metrics::record_disclosure(channel, decrypted.is_ok());
        let password = decrypted?;

        let expires_at = record.expires_at.min(now + self.policy.disclosure_grace());
        self.store.set_password_status(&record.id, PasswordStatus::Seen).await?;
        self.store.set_password_expiry(&record.id, expires_at).await?;

        info!(
            machine_id = %record.machine_id,
            password_id = %record.id,
            channel,
            "Password disclosed"
        );
        Ok(Disclosure {
            machine_id: record.machine_id,
            password_id: record.id,
            password,
            expires_at,
        })
    }

    // ---------------------------------------------------------------------
    // Operator actions
    // ---------------------------------------------------------------------

    /// Make a password expire now. Expiry is only ever moved earlier.
    #[instrument(skip(self))]
    pub async fn expire_now(&self, lookup: &PasswordLookup) -> RotationResult<PasswordSummary> {
        let mut record = self.resolve(lookup).await?;
        let now = self.clock.now();

        if record.expires_at > now {
            record.expires_at = now;
            self.store.set_password_expiry(&record.id, now).await?;
        }
        record.status = PasswordStatus::Expired;
        self.store.set_password_status(&record.id, PasswordStatus::Expired).await?;

        info!(password_id = %record.id, "Password expired by operator");
        Ok(record.summary())
    }

    /// Disable a machine for good and drop its in-memory rotation state.
    #[instrument(skip(self, machine_id), fields(machine_id = %machine_id))]
    pub async fn disable_machine(&self, machine_id: &MachineId) -> RotationResult<()> {
        if !self.store.disable_machine(machine_id).await? {
            return Err(RotationError::not_found(format!("Machine {machine_id}")));
        }

        self.sessions.lock().await.close(machine_id);
        let revoked = self.share_links.write().await.revoke_machine(machine_id);
        info!(revoked_links = revoked, "Machine disabled");
        Ok(())
    }

    /// Disable every machine that never completed enrollment.
    pub async fn disable_unenrolled_machines(&self) -> RotationResult<u64> {
        let count = self.store.disable_unenrolled_machines().await?;
        info!(count, "Disabled machines with incomplete enrollment");
        Ok(count)
    }

    pub async fn machine_overview(&self) -> RotationResult<Vec<MachineOverview>> {
        let now = self.clock.now();
        let machines = self.store.list_active_machines().await?;
        let mut overview = Vec::with_capacity(machines.len());

        for machine in machines {
            let passwords = self.store.list_passwords(&machine.id).await?;
            let last_expiring = passwords.into_iter().max_by_key(|p| p.expires_at);
            let (password_status, password_expires_at) = match last_expiring {
                Some(record) => {
                    let status = self.settle_expiry(&record, now).await?;
                    (Some(status), Some(record.expires_at))
                }
                None => (None, None),
            };
            overview.push(MachineOverview { machine, password_status, password_expires_at });
        }
        Ok(overview)
    }

    pub async fn machine_detail(&self, machine_id: &MachineId) -> RotationResult<MachineDetail> {
        let machine = self
            .store
            .get_machine(machine_id)
            .await?
            .ok_or_else(|| RotationError::not_found(format!("Machine {machine_id}")))?;

        let now = self.clock.now();
        let mut passwords = Vec::new();
        for mut record in self.store.list_passwords(machine_id).await? {
            record.status = self.settle_expiry(&record, now).await?;
            passwords.push(record.summary());
        }

        let checkins = self.store.list_checkins(machine_id).await?;
        let possible_duplicates = self.store.find_possible_duplicates(&machine).await?;

        Ok(MachineDetail { machine, passwords, checkins, possible_duplicates })
    }

    pub async fn access_log(&self) -> RotationResult<Vec<AccessLogView>> {
        Ok(self.store.list_access_log().await?)
    }

    // ---------------------------------------------------------------------
    // Share links
    // ---------------------------------------------------------------------

    /// Create a link to a machine's latest password. Issuing counts as a
    /// disclosure and is logged against the operator right away.
    #[instrument(
        skip(self, machine_id, gate_password, operator),
        fields(machine_id = %machine_id, operator = %operator)
    )]
    pub async fn issue_share_link(
        &self,
        machine_id: &MachineId,
        gate_password: SecretString,
        operator: &str,
    ) -> RotationResult<IssuedShareLink> {
        if operator.trim().is_empty() {
            return Err(RotationError::invalid_input("operator identity is required"));
        }
        if gate_password.is_empty() {
            return Err(RotationError::invalid_input("share link password must not be empty"));
        }

        self.active_machine(machine_id).await?;
        let record = self.store.latest_applied_password(machine_id).await?.ok_or_else(|| {
            RotationError::not_found(format!("Applied password for machine {machine_id}"))
        })?;

        let now = self.clock.now();
        self.store.record_access(operator, machine_id, &record.id, now).await?;

        let mut links = self.share_links.write().await;
        let token = links.issue(machine_id.clone(), gate_password, operator.to_string(), now);
        let expires_at = now + links.ttl();
        drop(links);

        info!("Share link issued");
        Ok(IssuedShareLink { token, machine_id: machine_id.clone(), expires_at })
    }

    /// Whether a link is still inside its window.
    pub async fn share_link_status(&self, token: &str) -> RotationResult<ShareLinkStatus> {
        let now = self.clock.now();
        let links = self.share_links.read().await;
        let link = links.live(token, now)?;
        Ok(ShareLinkStatus {
            machine_id: link.machine_id.clone(),
            expires_at: link.expires_at(links.ttl()),
        })
    }

    /// Disclose the linked machine's latest password to a link holder that
    /// knows the gate password.
    #[instrument(skip(self, token, supplied))]
    pub async fn redeem_share_link(
        &self,
        token: &str,
        supplied: &SecretString,
    ) -> RotationResult<Disclosure> {
        let link = self.share_links.read().await.authorize(token, supplied, self.clock.now())?;

        let record = self.store.latest_applied_password(&link.machine_id).await?.ok_or_else(|| {
            RotationError::not_found(format!("Applied password for machine {}", link.machine_id))
        })?;

        let actor = format!("{}{}", link.issued_by, SHARE_LINK_ACTOR_SUFFIX);
        self.disclose_record(record, &actor, "share_link").await
    }

    // ---------------------------------------------------------------------
    // Helpers
    // ---------------------------------------------------------------------

    async fn active_machine(&self, machine_id: &MachineId) -> RotationResult<Machine> {
        let machine = self
            .store
            .get_machine(machine_id)
            .await?
            .ok_or_else(|| RotationError::not_found(format!("Machine {machine_id}")))?;
        if machine.disabled {
            return Err(RotationError::machine_disabled(machine_id));
        }
        Ok(machine)
    }

    async fn resolve(&self, lookup: &PasswordLookup) -> RotationResult<PasswordRecord> {
        match lookup {
            PasswordLookup::Machine(machine_id) => {
                self.store.latest_applied_password(machine_id).await?.ok_or_else(|| {
                    RotationError::not_found(format!("Applied password for machine {machine_id}"))
                })
            }
            PasswordLookup::Password(password_id) => self
                .store
                .get_password(password_id)
                .await?
                .ok_or_else(|| RotationError::not_found(format!("Password {password_id}"))),
        }
    }

    /// Persist lazy expiry and return the effective status.
    async fn settle_expiry(
        &self,
        record: &PasswordRecord,
        now: DateTime<Utc>,
    ) -> RotationResult<PasswordStatus> {
        let status = record.effective_status(now);
        if status != record.status {
            self.store.set_password_status(&record.id, status).await?;
        }
        Ok(status)
    }
}

fn hsm_failure(operation: &'static str, error: SecretsError) -> RotationError {
    let reason = error.to_string();
    match (operation, error) {
        (_, SecretsError::NotAuthenticated) => RotationError::BackendUnavailable { reason },
        ("encrypt", _) => RotationError::EncryptionFailed { reason },
        ("decrypt", _) => RotationError::DecryptionFailed { reason },
        ("sign_csr", _) => RotationError::SigningFailed { reason },
        _ => RotationError::BackendUnavailable { reason },
    }
}
