//! HSM bootstrap credential repository
//!
//! Append-only AppRole login material. The newest row is current; older
//! rows stay for history.

use crate::domain::AuthBootstrap;
use crate::errors::{LapsError, Result};
use crate::secrets::SecretString;
use crate::storage::DbPool;
use sqlx::FromRow;
use tracing::instrument;

#[derive(FromRow)]
struct AuthSecretRow {
    pub id: i64,
    pub role_id: String,
    pub secret_id: String,
}

impl From<AuthSecretRow> for AuthBootstrap {
    fn from(row: AuthSecretRow) -> Self {
        Self { id: row.id, role_id: row.role_id, secret_id: SecretString::new(row.secret_id) }
    }
}

/// Repository for `auth_secrets` rows
#[derive(Debug, Clone)]
pub struct BootstrapRepository {
    pool: DbPool,
}

impl BootstrapRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    #[instrument(skip(self), name = "db_latest_bootstrap")]
    pub async fn latest(&self) -> Result<Option<AuthBootstrap>> {
        let row = sqlx::query_as::<_, AuthSecretRow>(
            "SELECT id, role_id, secret_id FROM auth_secrets ORDER BY id DESC LIMIT 1",
        )
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| LapsError::database(e, "Failed to read HSM bootstrap credentials"))?;

        Ok(row.map(AuthBootstrap::from))
    }

    #[instrument(skip(self, secret_id), name = "db_append_bootstrap")]
    pub async fn append(&self, role_id: &str, secret_id: &SecretString) -> Result<AuthBootstrap> {
        let row = sqlx::query_as::<_, AuthSecretRow>(
            "INSERT INTO auth_secrets (role_id, secret_id) VALUES ($1, $2) \
             RETURNING id, role_id, secret_id",
        )
        .bind(role_id)
        .bind(secret_id.expose_secret())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| LapsError::database(e, "Failed to store HSM bootstrap credentials"))?;

        Ok(row.into())
    }

    pub async fn count(&self) -> Result<i64> {
        sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM auth_secrets")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| LapsError::database(e, "Failed to count HSM bootstrap credentials"))
    }
}
