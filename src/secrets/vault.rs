//! HashiCorp Vault as the HSM.
//!
//! Password encryption goes through the transit engine, device certificates
//! through the PKI engine, and the service authenticates with AppRole. The
//! token returned by a login carries a small use limit; metering it is the
//! job of [`super::HsmSession`], not this module.
//!
//! # Configuration
//!
//! - Vault server address (`VAULT_ADDR`)
//! - Optional namespace for Vault Enterprise
//! - AppRole mount and the role whose secret ids are rotated
//! - Transit mount and key name
//! - PKI mount and signing role
//!
//! # Security
//!
//! - Tokens and secret ids are never logged
//! - Plaintext is base64-encoded only at the transit call site and dropped
//!   with the request

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use vaultrs::client::{Client, VaultClient, VaultClientSettingsBuilder};
use vaultrs::error::ClientError;

use super::client::HsmBackend;
use super::error::{Result, SecretsError};
use super::types::SecretString;
use crate::config::HsmConfig;

/// [`HsmBackend`] backed by a Vault server.
pub struct VaultHsmBackend {
    config: HsmConfig,
    client: Option<VaultClient>,
}

impl std::fmt::Debug for VaultHsmBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VaultHsmBackend")
            .field("address", &self.config.address)
            .field("transit_key", &self.config.transit_key)
            .field("logged_in", &self.client.is_some())
            .finish()
    }
}

impl VaultHsmBackend {
    /// Create an unauthenticated backend. Nothing is sent to Vault until
    /// [`HsmBackend::login`] is called.
    pub fn new(config: HsmConfig) -> Result<Self> {
        if config.address.is_empty() {
            return Err(SecretsError::config_error("Vault address cannot be empty"));
        }
        url::Url::parse(&config.address).map_err(|e| {
            SecretsError::config_error(format!("Invalid Vault address '{}': {}", config.address, e))
        })?;

        Ok(Self { config, client: None })
    }

    fn build_client(&self) -> Result<VaultClient> {
        let mut settings_builder = VaultClientSettingsBuilder::default();
        settings_builder.address(&self.config.address);
        settings_builder.timeout(Some(self.config.request_timeout()));

        if let Some(namespace) = &self.config.namespace {
            settings_builder.namespace(Some(namespace.clone()));
        }

        let settings = settings_builder.build().map_err(|e| {
            SecretsError::config_error(format!("Invalid Vault configuration: {}", e))
        })?;

        VaultClient::new(settings).map_err(|e| {
            SecretsError::connection_failed(format!("Failed to create Vault client: {}", e))
        })
    }

    fn client(&self) -> Result<&VaultClient> {
        self.client.as_ref().ok_or(SecretsError::NotAuthenticated)
    }
}

fn classify(operation: &'static str, error: ClientError) -> SecretsError {
    match error {
        ClientError::RestClientError { .. } => {
            SecretsError::connection_failed(format!(
                "{} request did not reach Vault: {}",
                operation, error
            ))
        }
        other => SecretsError::backend_error(operation, other.to_string()),
    }
}

#[async_trait]
impl HsmBackend for VaultHsmBackend {
    async fn login(&mut self, role_id: &str, secret_id: &SecretString) -> Result<()> {
        // A failed login must not leave the previous token usable.
        self.client = None;

        let mut client = self.build_client()?;
        let auth = vaultrs::auth::approle::login(
            &client,
            &self.config.approle_mount,
            role_id,
            secret_id.expose_secret(),
        )
        .await
        .map_err(|e| match e {
            ClientError::RestClientError { .. } => classify("login", e),
            other => SecretsError::authentication_failed(other.to_string()),
        })?;

        client.set_token(&auth.client_token);
        self.client = Some(client);

        tracing::debug!(
            address = %self.config.address,
            mount = %self.config.approle_mount,
            "Authenticated to Vault with AppRole"
        );
        Ok(())
    }

    async fn encrypt(&self, plaintext: &SecretString) -> Result<String> {
        let client = self.client()?;
        let encoded = SecretString::new(BASE64.encode(plaintext.expose_secret().as_bytes()));

        let response = vaultrs::transit::data::encrypt(
            client,
            &self.config.transit_mount,
            &self.config.transit_key,
            encoded.expose_secret(),
            None,
        )
        .await
        .map_err(|e| classify("encrypt", e))?;

        if response.ciphertext.is_empty() {
            return Err(SecretsError::invalid_response("encrypt", "empty ciphertext"));
        }
        Ok(response.ciphertext)
    }

    async fn decrypt(&self, ciphertext: &str) -> Result<SecretString> {
        let client = self.client()?;

        let response = vaultrs::transit::data::decrypt(
            client,
            &self.config.transit_mount,
            &self.config.transit_key,
            ciphertext,
            None,
        )
        .await
        .map_err(|e| classify("decrypt", e))?;

        let encoded = SecretString::new(response.plaintext);
        let bytes = BASE64
            .decode(encoded.expose_secret())
            .map_err(|e| {
                SecretsError::invalid_response("decrypt", format!("plaintext is not base64: {}", e))
            })?;
        let cleartext = String::from_utf8(bytes).map_err(|_| {
            SecretsError::invalid_response("decrypt", "plaintext is not valid UTF-8")
        })?;

        Ok(SecretString::new(cleartext))
    }

    async fn sign_csr(&self, csr_pem: &str, common_name: &str) -> Result<String> {
        let client = self.client()?;

        let response = vaultrs::pki::cert::ca::sign(
            client,
            &self.config.pki_mount,
            &self.config.pki_role,
            csr_pem,
            common_name,
            None,
        )
        .await
        .map_err(|e| classify("sign_csr", e))?;

        if response.certificate.is_empty() {
            return Err(SecretsError::invalid_response("sign_csr", "empty certificate"));
        }

        tracing::info!(
            common_name = %common_name,
            serial_number = %response.serial_number,
            "Signed device certificate via Vault PKI"
        );
        Ok(response.certificate)
    }

    async fn generate_secret_id(&self) -> Result<SecretString> {
        let client = self.client()?;

        let response = vaultrs::auth::approle::role::secret::generate(
            client,
            &self.config.approle_mount,
            &self.config.approle_role,
            None,
        )
        .await
        .map_err(|e| classify("generate_secret_id", e))?;

        if response.secret_id.is_empty() {
            return Err(SecretsError::invalid_response("generate_secret_id", "empty secret id"));
        }
        Ok(SecretString::new(response.secret_id))
    }
}


/// Tests against a live Vault dev server.
///
/// Requires `VAULT_ADDR`, `LAPSVAULT_TEST_ROLE_ID`, `LAPSVAULT_TEST_SECRET_ID`
/// and `LAPSVAULT_TEST_CSR_PEM`, plus transit key `client-passwords` and a
/// PKI role `mlaps` mounted at the default paths.
#[cfg(all(test, feature = "vault-integration"))]
mod integration_tests {
    use super::*;

    fn credentials() -> (HsmConfig, String, SecretString) {
        let config = HsmConfig {
            address: std::env::var("VAULT_ADDR").expect("VAULT_ADDR"),
            ..Default::default()
        };
        let role_id = std::env::var("LAPSVAULT_TEST_ROLE_ID").expect("LAPSVAULT_TEST_ROLE_ID");
        let secret_id = SecretString::new(
            std::env::var("LAPSVAULT_TEST_SECRET_ID").expect("LAPSVAULT_TEST_SECRET_ID"),
        );
        (config, role_id, secret_id)
    }

    #[tokio::test]
    async fn test_transit_round_trip() {
        let (config, role_id, secret_id) = credentials();
        let mut backend = VaultHsmBackend::new(config).unwrap();
        backend.login(&role_id, &secret_id).await.unwrap();

        let ciphertext = backend.encrypt(&SecretString::new("Sw0rd!")).await.unwrap();
        assert!(ciphertext.starts_with("vault:v"));

        let plaintext = backend.decrypt(&ciphertext).await.unwrap();
        assert_eq!(plaintext.expose_secret(), "Sw0rd!");
    }

    #[tokio::test]
    async fn test_wrong_secret_id_fails_login() {
        let (config, role_id, _) = credentials();
        let mut backend = VaultHsmBackend::new(config).unwrap();
        let err = backend.login(&role_id, &SecretString::new("bogus")).await.unwrap_err();
        assert!(matches!(err, SecretsError::AuthenticationFailed { .. }));
    }

    #[tokio::test]
    async fn test_pki_signs_device_csr() {
        let (config, role_id, secret_id) = credentials();
        let mut backend = VaultHsmBackend::new(config).unwrap();
        backend.login(&role_id, &secret_id).await.unwrap();

        let csr = std::env::var("LAPSVAULT_TEST_CSR_PEM").expect("LAPSVAULT_TEST_CSR_PEM");
        let certificate = backend.sign_csr(&csr, "lapsvault-test-device").await.unwrap();
        assert!(certificate.contains("BEGIN CERTIFICATE"));
    }
}
