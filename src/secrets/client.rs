//! HSM backend trait.

use async_trait::async_trait;

use super::error::Result;
use super::types::SecretString;

/// The operations lapsvault needs from the external HSM.
///
/// Implementations are thin: they perform exactly one request per call and
/// report its outcome. Usage metering, timeouts and re-authentication policy
/// live in [`super::HsmSession`], which wraps a backend.
///
/// # Security Considerations
///
/// - Implementations MUST NOT log plaintext, secret ids or tokens
/// - Plaintext crosses this boundary only inside [`SecretString`]
#[async_trait]
pub trait HsmBackend: Send + Sync {
    /// Log in with AppRole credentials, replacing any previous token.
    async fn login(&mut self, role_id: &str, secret_id: &SecretString) -> Result<()>;

    /// Encrypt a password under the fixed transit key. Returns ciphertext.
    async fn encrypt(&self, plaintext: &SecretString) -> Result<String>;

    /// Decrypt ciphertext produced by [`HsmBackend::encrypt`].
    async fn decrypt(&self, ciphertext: &str) -> Result<SecretString>;

    /// Sign a PEM CSR, forcing the given common name. Returns a PEM certificate.
    async fn sign_csr(&self, csr_pem: &str, common_name: &str) -> Result<String>;

    /// Issue a fresh AppRole secret id for the service's own login role.
    async fn generate_secret_id(&self) -> Result<SecretString>;
}
