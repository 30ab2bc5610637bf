//! Metered HSM session.
//!
//! One [`HsmSession`] exists per process. It owns the backend handle, the
//! authenticated flag and the usage counter of the current token. Every data
//! call counts against the token whether or not it succeeds, because the
//! HSM's own limit counts requests serviced, not requests that worked.
//!
//! The session does not decide when to renew; callers consult
//! [`HsmSession::uses`] through the rotation engine's budget guard while
//! holding the session lock.

use std::future::Future;
use std::time::Duration;
use tracing::Instrument;

use super::client::HsmBackend;
use super::error::{Result, SecretsError};
use super::types::SecretString;
use crate::observability::metrics;

pub struct HsmSession {
    backend: Box<dyn HsmBackend>,
    authenticated: bool,
    uses: u32,
    request_timeout: Duration,
}

impl std::fmt::Debug for HsmSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HsmSession")
            .field("authenticated", &self.authenticated)
            .field("uses", &self.uses)
            .finish()
    }
}

impl HsmSession {
    /// Wrap an unauthenticated backend.
    pub fn new(backend: Box<dyn HsmBackend>, request_timeout: Duration) -> Self {
        Self { backend, authenticated: false, uses: 0, request_timeout }
    }

    pub fn is_authenticated(&self) -> bool {
        self.authenticated
    }

    /// Requests issued against the current token.
    pub fn uses(&self) -> u32 {
        self.uses
    }

    /// Log in with the given bootstrap credentials.
    ///
    /// Success resets the usage counter. Failures are logged and reported
    /// only through the returned flag.
    pub async fn authenticate(&mut self, role_id: &str, secret_id: &SecretString) -> bool {
        let timeout = self.request_timeout;
        let login = self.backend.login(role_id, secret_id);
        let outcome = match tokio::time::timeout(timeout, login).await {
            Ok(result) => result,
            Err(_) => Err(SecretsError::Timeout { operation: "login", seconds: timeout.as_secs() }),
        };

        match outcome {
            Ok(()) => {
                self.authenticated = true;
                self.uses = 0;
                metrics::record_reauthentication(true);
                tracing::debug!("HSM session authenticated; usage counter reset");
                true
            }
            Err(e) => {
                self.authenticated = false;
                metrics::record_reauthentication(false);
                tracing::error!(error = %e, "HSM authentication failed");
                false
            }
        }
    }

    pub async fn encrypt(&mut self, plaintext: &SecretString) -> Result<String> {
        self.uses += 1;
        let call = self.backend.encrypt(plaintext);
        finish("encrypt", self.authenticated, self.uses, self.request_timeout, call).await
    }

    pub async fn decrypt(&mut self, ciphertext: &str) -> Result<SecretString> {
        self.uses += 1;
        let call = self.backend.decrypt(ciphertext);
        finish("decrypt", self.authenticated, self.uses, self.request_timeout, call).await
    }

    pub async fn sign_csr(&mut self, csr_pem: &str, common_name: &str) -> Result<String> {
        self.uses += 1;
        let call = self.backend.sign_csr(csr_pem, common_name);
        finish("sign_csr", self.authenticated, self.uses, self.request_timeout, call).await
    }

    pub async fn issue_secret_id(&mut self) -> Result<SecretString> {
        self.uses += 1;
        let call = self.backend.generate_secret_id();
        finish("generate_secret_id", self.authenticated, self.uses, self.request_timeout, call)
            .await
    }
}

async fn finish<T, F>(
    operation: &'static str,
    authenticated: bool,
    uses: u32,
    request_timeout: Duration,
    call: F,
) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    let result = if !authenticated {
        Err(SecretsError::NotAuthenticated)
    } else {
        match tokio::time::timeout(request_timeout, call)
            .instrument(crate::hsm_span!(operation, uses))
            .await
        {
            Ok(result) => result,
            Err(_) => Err(SecretsError::Timeout { operation, seconds: request_timeout.as_secs() }),
        }
    };

    metrics::record_hsm_operation(operation, result.is_ok());
    if let Err(e) = &result {
        tracing::warn!(operation, uses, error = %e, "HSM request failed");
    }
    result
}
