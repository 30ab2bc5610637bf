//! Password repository
//!
//! Rotation records per machine. Rows hold HSM ciphertext only; listing
//! order is always newest receipt first, with insertion order breaking ties.

use crate::domain::{MachineId, PasswordId, PasswordRecord, PasswordStatus};
use crate::errors::{LapsError, Result};
use crate::storage::DbPool;
use chrono::{DateTime, Utc};
use sqlx::FromRow;
use tracing::instrument;

const PASSWORD_COLUMNS: &str =
    "p.id, p.machine_id, p.ciphertext, p.status, p.applied, p.received_at, p.expires_at";

#[derive(Debug, Clone, FromRow)]
struct PasswordRow {
    pub id: PasswordId,
    pub machine_id: MachineId,
    pub ciphertext: String,
    pub status: String,
    pub applied: bool,
    pub received_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl TryFrom<PasswordRow> for PasswordRecord {
    type Error = LapsError;

    fn try_from(row: PasswordRow) -> Result<Self> {
        let status = row.status.parse::<PasswordStatus>().map_err(|e| {
            LapsError::internal(format!("Corrupt status on password '{}': {}", row.id, e))
        })?;

        Ok(Self {
            id: row.id,
            machine_id: row.machine_id,
            ciphertext: row.ciphertext,
            status,
            applied: row.applied,
            received_at: row.received_at,
            expires_at: row.expires_at,
        })
    }
}

fn convert(rows: Vec<PasswordRow>) -> Result<Vec<PasswordRecord>> {
    rows.into_iter().map(PasswordRecord::try_from).collect()
}

/// Repository for password rows
#[derive(Debug, Clone)]
pub struct PasswordRepository {
    pool: DbPool,
}

impl PasswordRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    #[instrument(
        skip(self, record),
        fields(password_id = %record.id, machine_id = %record.machine_id),
        name = "db_insert_password"
    )]
    pub async fn insert(&self, record: &PasswordRecord) -> Result<()> {
        sqlx::query(
            "INSERT INTO passwords \
             (id, machine_id, ciphertext, status, applied, received_at, expires_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(&record.id)
        .bind(&record.machine_id)
        .bind(&record.ciphertext)
        .bind(record.status.as_str())
        .bind(record.applied)
        .bind(record.received_at)
        .bind(record.expires_at)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!(
                error = %e,
                machine_id = %record.machine_id,
                "Failed to store password"
            );
            LapsError::database(
                e,
                format!("Failed to store password for machine '{}'", record.machine_id),
            )
        })?;

        Ok(())
    }

    #[instrument(skip(self), fields(password_id = %id), name = "db_get_password")]
    pub async fn get(&self, id: &PasswordId) -> Result<Option<PasswordRecord>> {
        let row = sqlx::query_as::<_, PasswordRow>(&format!(
            "SELECT {} FROM passwords p WHERE p.id = $1",
            PASSWORD_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| LapsError::database(e, format!("Failed to get password '{}'", id)))?;

        row.map(PasswordRecord::try_from).transpose()
    }

    /// Most recently received applied password of a machine that is not disabled
    #[instrument(skip(self), fields(machine_id = %machine_id), name = "db_latest_applied_password")]
    pub async fn latest_applied(&self, machine_id: &MachineId) -> Result<Option<PasswordRecord>> {
        let row = sqlx::query_as::<_, PasswordRow>(&format!(
            "SELECT {} FROM passwords p JOIN machines m ON m.id = p.machine_id \
             WHERE p.machine_id = $1 AND p.applied = 1 AND m.disabled = 0 \
             ORDER BY p.received_at DESC, p.rowid DESC LIMIT 1",
            PASSWORD_COLUMNS
        ))
        .bind(machine_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| {
            LapsError::database(e, format!("Failed to get latest password of '{}'", machine_id))
        })?;

        row.map(PasswordRecord::try_from).transpose()
    }

    /// All passwords of a machine, newest first
    #[instrument(skip(self), fields(machine_id = %machine_id), name = "db_list_passwords")]
    pub async fn list_for_machine(&self, machine_id: &MachineId) -> Result<Vec<PasswordRecord>> {
        let rows = sqlx::query_as::<_, PasswordRow>(&format!(
            "SELECT {} FROM passwords p WHERE p.machine_id = $1 \
             ORDER BY p.received_at DESC, p.rowid DESC",
            PASSWORD_COLUMNS
        ))
        .bind(machine_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            LapsError::database(e, format!("Failed to list passwords of '{}'", machine_id))
        })?;

        convert(rows)
    }

    #[instrument(skip(self), fields(password_id = %id), name = "db_set_password_applied")]
    pub async fn set_applied(&self, id: &PasswordId, applied: bool) -> Result<bool> {
        let result = sqlx::query("UPDATE passwords SET applied = $1 WHERE id = $2")
            .bind(applied)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| LapsError::database(e, format!("Failed to confirm password '{}'", id)))?;

        Ok(result.rows_affected() > 0)
    }

    #[instrument(
        skip(self),
        fields(password_id = %id, status = %status),
        name = "db_set_password_status"
    )]
    pub async fn set_status(&self, id: &PasswordId, status: PasswordStatus) -> Result<bool> {
        let result = sqlx::query("UPDATE passwords SET status = $1 WHERE id = $2")
            .bind(status.as_str())
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                LapsError::database(e, format!("Failed to update status of password '{}'", id))
            })?;

        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self), fields(password_id = %id), name = "db_set_password_expiry")]
    pub async fn set_expiry(&self, id: &PasswordId, expires_at: DateTime<Utc>) -> Result<bool> {
        let result = sqlx::query("UPDATE passwords SET expires_at = $1 WHERE id = $2")
            .bind(expires_at)
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                LapsError::database(e, format!("Failed to update expiry of password '{}'", id))
            })?;

        Ok(result.rows_affected() > 0)
    }

    /// Delete the given passwords in one transaction
    #[instrument(skip(self, ids), fields(count = ids.len()), name = "db_delete_passwords")]
    pub async fn delete_many(&self, ids: &[PasswordId]) -> Result<u64> {
        if ids.is_empty() {
            return Ok(0);
        }

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| LapsError::database(e, "Failed to begin password pruning"))?;

        let mut deleted = 0;
        for id in ids {
            let result = sqlx::query("DELETE FROM passwords WHERE id = $1")
                .bind(id)
                .execute(&mut *tx)
                .await
                .map_err(|e| {
                    LapsError::database(e, format!("Failed to delete password '{}'", id))
                })?;
            deleted += result.rows_affected();
        }

        tx.commit().await.map_err(|e| LapsError::database(e, "Failed to commit password pruning"))?;
        Ok(deleted)
    }
}
