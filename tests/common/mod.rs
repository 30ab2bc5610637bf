//! Common test utilities for all integration tests.
//!
//! Provides an in-process HSM fake, a manual clock and a fully wired
//! rotation engine over an in-memory SQLite store.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use lapsvault::config::RotationPolicy;
use lapsvault::domain::{MachineId, PasswordId};
use lapsvault::rotation::{CheckinOutcome, Clock, HsmBudget, ManualClock, RotationEngine};
use lapsvault::secrets::{HsmBackend, HsmSession, SecretString, SecretsError};
use lapsvault::storage::{open_in_memory, CredentialStore, DbPool, SqliteCredentialStore};

pub const ROLE_ID: &str = "role-lapsvault";
pub const SECRET_ID: &str = "secret-0";
pub const CSR_PEM: &str =
    "-----BEGIN CERTIFICATE REQUEST-----\nMIIBfake\n-----END CERTIFICATE REQUEST-----\n";

/// Observable state of the fake HSM
#[derive(Default)]
pub struct FakeHsm {
    pub reject_logins: AtomicBool,
    pub fail_data_calls: AtomicBool,
    pub fail_secret_issue: AtomicBool,
    pub logins: AtomicU32,
    pub encrypts: AtomicU32,
    pub decrypts: AtomicU32,
    pub signs: AtomicU32,
    pub secret_ids_issued: AtomicU32,
    /// Secret ids presented at login, in order
    pub login_secrets: Mutex<Vec<String>>,
}

impl FakeHsm {
    pub fn data_calls(&self) -> u32 {
        self.encrypts.load(Ordering::SeqCst)
            + self.decrypts.load(Ordering::SeqCst)
            + self.signs.load(Ordering::SeqCst)
            + self.secret_ids_issued.load(Ordering::SeqCst)
    }

    pub fn last_login_secret(&self) -> Option<String> {
        self.login_secrets.lock().unwrap().last().cloned()
    }
}

pub struct FakeBackend(pub Arc<FakeHsm>);

impl FakeBackend {
    fn fail_if_configured(&self, operation: &'static str) -> Result<(), SecretsError> {
        if self.0.fail_data_calls.load(Ordering::SeqCst) {
            Err(SecretsError::backend_error(operation, "injected failure"))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl HsmBackend for FakeBackend {
    async fn login(&mut self, role_id: &str, secret_id: &SecretString) -> Result<(), SecretsError> {
        self.0.logins.fetch_add(1, Ordering::SeqCst);
        self.0.login_secrets.lock().unwrap().push(secret_id.expose_secret().to_string());
        if self.0.reject_logins.load(Ordering::SeqCst) || role_id != ROLE_ID {
            return Err(SecretsError::authentication_failed("login rejected"));
        }
        Ok(())
    }

    async fn encrypt(&self, plaintext: &SecretString) -> Result<String, SecretsError> {
        self.0.encrypts.fetch_add(1, Ordering::SeqCst);
        self.fail_if_configured("encrypt")?;
        Ok(format!("fake:v1:{}", plaintext.expose_secret().chars().rev().collect::<String>()))
    }

    async fn decrypt(&self, ciphertext: &str) -> Result<SecretString, SecretsError> {
        self.0.decrypts.fetch_add(1, Ordering::SeqCst);
        self.fail_if_configured("decrypt")?;
        let body = ciphertext
            .strip_prefix("fake:v1:")
            .ok_or_else(|| SecretsError::invalid_response("decrypt", "unknown ciphertext"))?;
        Ok(SecretString::new(body.chars().rev().collect::<String>()))
    }

    async fn sign_csr(&self, _csr_pem: &str, common_name: &str) -> Result<String, SecretsError> {
        self.0.signs.fetch_add(1, Ordering::SeqCst);
        self.fail_if_configured("sign_csr")?;
        Ok(format!("-----BEGIN CERTIFICATE-----\nCN={common_name}\n-----END CERTIFICATE-----\n"))
    }

    async fn generate_secret_id(&self) -> Result<SecretString, SecretsError> {
        let n = self.0.secret_ids_issued.fetch_add(1, Ordering::SeqCst) + 1;
        if self.0.fail_secret_issue.load(Ordering::SeqCst) {
            return Err(SecretsError::backend_error("generate_secret_id", "injected failure"));
        }
        Ok(SecretString::new(format!("secret-{n}")))
    }
}

pub struct Harness {
    pub engine: Arc<RotationEngine>,
    pub store: Arc<dyn CredentialStore>,
    pub pool: DbPool,
    pub hsm: Arc<FakeHsm>,
    pub clock: Arc<ManualClock>,
    pub policy: RotationPolicy,
}

pub fn test_policy() -> RotationPolicy {
    RotationPolicy::default()
}

/// Engine over a fresh in-memory store with one bootstrap row and an
/// authenticated HSM session.
pub async fn harness() -> Harness {
    harness_with(test_policy()).await
}

pub async fn harness_with(policy: RotationPolicy) -> Harness {
    let pool = open_in_memory().await.expect("in-memory database");
    let store: Arc<dyn CredentialStore> = Arc::new(SqliteCredentialStore::new(pool.clone()));
    store.append_bootstrap(ROLE_ID, &SecretString::new(SECRET_ID)).await.expect("seed bootstrap");

    let hsm = Arc::new(FakeHsm::default());
    let session =
        HsmSession::new(Box::new(FakeBackend(hsm.clone())), std::time::Duration::from_secs(5));
    let budget = HsmBudget::new(session, store.clone(), policy.renewal_threshold());
    assert!(budget.force_reauthenticate().await, "initial HSM login");

    let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2025, 3, 1, 9, 0, 0).unwrap()));
    let engine = Arc::new(RotationEngine::new(
        store.clone(),
        budget,
        policy.clone(),
        clock.clone(),
    ));

    Harness { engine, store, pool, hsm, clock, policy }
}

impl Harness {
    pub fn now(&self) -> chrono::DateTime<Utc> {
        self.clock.now()
    }

    pub async fn hsm_uses(&self) -> u32 {
        self.engine.hsm().lock().await.uses()
    }

    pub async fn enroll(&self, hostname: &str, serial: &str) -> MachineId {
        self.engine.enroll(CSR_PEM, hostname, serial).await.expect("enroll").machine_id
    }

    /// Run a full checkin/submit/confirm round and return the new password id.
    pub async fn rotate(&self, machine_id: &MachineId, password: &str) -> PasswordId {
        let outcome = self.engine.checkin(machine_id, "host", "serial").await.expect("checkin");
        let token = match outcome {
            CheckinOutcome::NeedsUpdate { session_token } => session_token,
            CheckinOutcome::Current => panic!("expected the machine to need an update"),
        };
        let password_id = self
            .engine
            .submit_secret(machine_id, &token, &SecretString::new(password))
            .await
            .expect("submit");
        let outcome = self.engine.confirm_secret(machine_id, &token, "ok").await.expect("confirm");
        assert!(outcome.applied);
        password_id
    }

    /// Force the latest applied password of a machine to be expired.
    pub async fn expire_latest(&self, machine_id: &MachineId) {
        self.engine
            .expire_now(&lapsvault::rotation::PasswordLookup::Machine(machine_id.clone()))
            .await
            .expect("expire");
    }
}
