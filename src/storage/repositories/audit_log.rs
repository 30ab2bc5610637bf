//! Access log repository
//!
//! Append-only record of who was shown which password. There is no update
//! or delete path.

use crate::domain::{AccessLogEntry, AccessLogView, MachineId, PasswordId};
use crate::errors::{LapsError, Result};
use crate::storage::DbPool;
use chrono::{DateTime, Utc};
use sqlx::FromRow;
use tracing::instrument;

#[derive(Debug, Clone, FromRow)]
struct AccessLogRow {
    pub id: i64,
    pub operator: String,
    pub accessed_at: DateTime<Utc>,
    pub machine_id: MachineId,
    pub password_id: PasswordId,
}

impl From<AccessLogRow> for AccessLogEntry {
    fn from(row: AccessLogRow) -> Self {
        Self {
            id: row.id,
            operator: row.operator,
            accessed_at: row.accessed_at,
            machine_id: row.machine_id,
            password_id: row.password_id,
        }
    }
}

#[derive(Debug, Clone, FromRow)]
struct AccessLogViewRow {
    #[sqlx(flatten)]
    pub entry: AccessLogRow,
    pub hostname: String,
    pub serial_number: String,
}

/// Repository for access log rows
#[derive(Debug, Clone)]
pub struct AccessLogRepository {
    pool: DbPool,
}

impl AccessLogRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    #[instrument(
        skip(self),
        fields(machine_id = %machine_id, password_id = %password_id),
        name = "db_record_access"
    )]
    pub async fn record(
        &self,
        operator: &str,
        machine_id: &MachineId,
        password_id: &PasswordId,
        at: DateTime<Utc>,
    ) -> Result<AccessLogEntry> {
        let row = sqlx::query_as::<_, AccessLogRow>(
            "INSERT INTO access_log (operator, accessed_at, machine_id, password_id) \
             VALUES ($1, $2, $3, $4) \
             RETURNING id, operator, accessed_at, machine_id, password_id",
        )
        .bind(operator)
        .bind(at)
        .bind(machine_id)
        .bind(password_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!(
                error = %e,
                machine_id = %machine_id,
                "Failed to write access log entry"
            );
            LapsError::database(e, "Failed to write access log entry")
        })?;

        Ok(row.into())
    }

    /// Entries for one password, oldest first
    #[instrument(skip(self), fields(password_id = %password_id), name = "db_access_for_password")]
    pub async fn list_for_password(&self, password_id: &PasswordId) -> Result<Vec<AccessLogEntry>> {
        let rows = sqlx::query_as::<_, AccessLogRow>(
            "SELECT id, operator, accessed_at, machine_id, password_id FROM access_log \
             WHERE password_id = $1 ORDER BY id",
        )
        .bind(password_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| LapsError::database(e, "Failed to read access log"))?;

        Ok(rows.into_iter().map(AccessLogEntry::from).collect())
    }

    /// Whole access log joined with machine details, newest first
    #[instrument(skip(self), name = "db_list_access_log")]
    pub async fn list(&self) -> Result<Vec<AccessLogView>> {
        let rows = sqlx::query_as::<_, AccessLogViewRow>(
            "SELECT a.id, a.operator, a.accessed_at, a.machine_id, a.password_id, \
                    m.hostname, m.serial_number \
             FROM access_log a JOIN machines m ON m.id = a.machine_id \
             ORDER BY a.id DESC",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| LapsError::database(e, "Failed to read access log"))?;

        Ok(rows
            .into_iter()
            .map(|row| AccessLogView {
                entry: row.entry.into(),
                hostname: row.hostname,
                serial_number: row.serial_number,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Machine;
    use crate::storage::open_in_memory;
    use crate::storage::repositories::MachineRepository;

    #[tokio::test]
    async fn test_record_and_list_joined() {
        let pool = open_in_memory().await.unwrap();
        let machines = MachineRepository::new(pool.clone());
        let repo = AccessLogRepository::new(pool);

        let machine = Machine::enrolling(MachineId::new(), "pc-01", "SN1", Utc::now());
        machines.insert(&machine).await.unwrap();
        let password_id = PasswordId::new();

        let first = repo.record("alice", &machine.id, &password_id, Utc::now()).await.unwrap();
        let second = repo
            .record("bob (share link)", &machine.id, &password_id, Utc::now())
            .await
            .unwrap();
        assert!(second.id > first.id);

        let log = repo.list().await.unwrap();
        assert_eq!(log.len(), 2);
        assert_eq!(log[0].entry.operator, "bob (share link)");
        assert_eq!(log[0].hostname, "pc-01");

        assert_eq!(repo.list_for_password(&password_id).await.unwrap().len(), 2);
    }
}
