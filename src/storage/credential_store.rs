//! The credential store seam.
//!
//! [`CredentialStore`] is everything the rotation engine and the renewal
//! scheduler need from durable state. It is pure data access: no expiry
//! policy, retention rule or audit ordering lives behind it.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::repositories::{
    AccessLogRepository, BootstrapRepository, MachineRepository, PasswordRepository,
};
use super::DbPool;
use crate::domain::{
    AccessLogEntry, AccessLogView, AuthBootstrap, CheckinRecord, Machine, MachineId, PasswordId,
    PasswordRecord, PasswordStatus,
};
use crate::errors::Result;
use crate::secrets::SecretString;

#[async_trait]
pub trait CredentialStore: Send + Sync {
    // machines
    async fn insert_machine(&self, machine: &Machine) -> Result<()>;
    async fn get_machine(&self, id: &MachineId) -> Result<Option<Machine>>;
    async fn delete_machine(&self, id: &MachineId) -> Result<bool>;
    /// Refresh hostname/serial and mark enrollment as successful.
    async fn refresh_machine_info(
        &self,
        id: &MachineId,
        hostname: &str,
        serial_number: &str,
    ) -> Result<bool>;
    async fn disable_machine(&self, id: &MachineId) -> Result<bool>;
    async fn disable_unenrolled_machines(&self) -> Result<u64>;
    async fn list_active_machines(&self) -> Result<Vec<Machine>>;
    async fn find_possible_duplicates(&self, machine: &Machine) -> Result<Vec<Machine>>;

    // checkins
    async fn record_checkin(&self, id: &MachineId, at: DateTime<Utc>) -> Result<CheckinRecord>;
    async fn list_checkins(&self, id: &MachineId) -> Result<Vec<CheckinRecord>>;

    // passwords
    async fn insert_password(&self, record: &PasswordRecord) -> Result<()>;
    async fn get_password(&self, id: &PasswordId) -> Result<Option<PasswordRecord>>;
    /// Newest applied password of a machine that is not disabled.
    async fn latest_applied_password(&self, id: &MachineId) -> Result<Option<PasswordRecord>>;
    /// All passwords of a machine, newest first.
    async fn list_passwords(&self, id: &MachineId) -> Result<Vec<PasswordRecord>>;
    async fn set_password_applied(&self, id: &PasswordId, applied: bool) -> Result<bool>;
    async fn set_password_status(&self, id: &PasswordId, status: PasswordStatus) -> Result<bool>;
    async fn set_password_expiry(&self, id: &PasswordId, expires_at: DateTime<Utc>)
        -> Result<bool>;
    async fn delete_passwords(&self, ids: &[PasswordId]) -> Result<u64>;

    // audit
    async fn record_access(
        &self,
        operator: &str,
        machine_id: &MachineId,
        password_id: &PasswordId,
        at: DateTime<Utc>,
    ) -> Result<AccessLogEntry>;
    async fn list_access_log(&self) -> Result<Vec<AccessLogView>>;

    // HSM bootstrap
    async fn latest_bootstrap(&self) -> Result<Option<AuthBootstrap>>;
    async fn append_bootstrap(&self, role_id: &str, secret_id: &SecretString)
        -> Result<AuthBootstrap>;
}

/// SQLite implementation composed from the per-table repositories
#[derive(Debug, Clone)]
pub struct SqliteCredentialStore {
    machines: MachineRepository,
    passwords: PasswordRepository,
    access_log: AccessLogRepository,
    bootstrap: BootstrapRepository,
}

impl SqliteCredentialStore {
    pub fn new(pool: DbPool) -> Self {
        Self {
            machines: MachineRepository::new(pool.clone()),
            passwords: PasswordRepository::new(pool.clone()),
            access_log: AccessLogRepository::new(pool.clone()),
            bootstrap: BootstrapRepository::new(pool),
        }
    }
}

#[async_trait]
impl CredentialStore for SqliteCredentialStore {
    async fn insert_machine(&self, machine: &Machine) -> Result<()> {
        self.machines.insert(machine).await
    }

    async fn get_machine(&self, id: &MachineId) -> Result<Option<Machine>> {
        self.machines.get(id).await
    }

    async fn delete_machine(&self, id: &MachineId) -> Result<bool> {
        self.machines.delete(id).await
    }

    async fn refresh_machine_info(
        &self,
        id: &MachineId,
        hostname: &str,
        serial_number: &str,
    ) -> Result<bool> {
        self.machines.refresh_info(id, hostname, serial_number).await
    }

    async fn disable_machine(&self, id: &MachineId) -> Result<bool> {
        self.machines.disable(id).await
    }

    async fn disable_unenrolled_machines(&self) -> Result<u64> {
        self.machines.disable_unenrolled().await
    }

    async fn list_active_machines(&self) -> Result<Vec<Machine>> {
        self.machines.list_active().await
    }

    async fn find_possible_duplicates(&self, machine: &Machine) -> Result<Vec<Machine>> {
        self.machines.find_possible_duplicates(machine).await
    }

    async fn record_checkin(&self, id: &MachineId, at: DateTime<Utc>) -> Result<CheckinRecord> {
        self.machines.record_checkin(id, at).await
    }

    async fn list_checkins(&self, id: &MachineId) -> Result<Vec<CheckinRecord>> {
        self.machines.list_checkins(id).await
    }

    async fn insert_password(&self, record: &PasswordRecord) -> Result<()> {
        self.passwords.insert(record).await
    }

    async fn get_password(&self, id: &PasswordId) -> Result<Option<PasswordRecord>> {
        self.passwords.get(id).await
    }

    async fn latest_applied_password(&self, id: &MachineId) -> Result<Option<PasswordRecord>> {
        self.passwords.latest_applied(id).await
    }

    async fn list_passwords(&self, id: &MachineId) -> Result<Vec<PasswordRecord>> {
        self.passwords.list_for_machine(id).await
    }

    async fn set_password_applied(&self, id: &PasswordId, applied: bool) -> Result<bool> {
        self.passwords.set_applied(id, applied).await
    }

    async fn set_password_status(&self, id: &PasswordId, status: PasswordStatus) -> Result<bool> {
        self.passwords.set_status(id, status).await
    }

    async fn set_password_expiry(
        &self,
        id: &PasswordId,
        expires_at: DateTime<Utc>,
    ) -> Result<bool> {
        self.passwords.set_expiry(id, expires_at).await
    }

    async fn delete_passwords(&self, ids: &[PasswordId]) -> Result<u64> {
        self.passwords.delete_many(ids).await
    }

    async fn record_access(
        &self,
        operator: &str,
        machine_id: &MachineId,
        password_id: &PasswordId,
        at: DateTime<Utc>,
    ) -> Result<AccessLogEntry> {
        self.access_log.record(operator, machine_id, password_id, at).await
    }

    async fn list_access_log(&self) -> Result<Vec<AccessLogView>> {
        self.access_log.list().await
    }

    async fn latest_bootstrap(&self) -> Result<Option<AuthBootstrap>> {
        self.bootstrap.latest().await
    }

    async fn append_bootstrap(
        &self,
        role_id: &str,
        secret_id: &SecretString,
    ) -> Result<AuthBootstrap> {
        self.bootstrap.append(role_id, secret_id).await
    }
}
