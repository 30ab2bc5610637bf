//! Machine repository
//!
//! Enrolled devices and their checkin history.

use crate::domain::{CheckinRecord, Machine, MachineId};
use crate::errors::{LapsError, Result};
use crate::storage::DbPool;
use chrono::{DateTime, Utc};
use sqlx::FromRow;
use tracing::instrument;

const MACHINE_COLUMNS: &str =
    "id, hostname, serial_number, enrolled_at, enroll_success, disabled";

#[derive(Debug, Clone, FromRow)]
struct MachineRow {
    pub id: MachineId,
    pub hostname: String,
    pub serial_number: String,
    pub enrolled_at: DateTime<Utc>,
    pub enroll_success: bool,
    pub disabled: bool,
}

impl From<MachineRow> for Machine {
    fn from(row: MachineRow) -> Self {
        Self {
            id: row.id,
            hostname: row.hostname,
            serial_number: row.serial_number,
            enrolled_at: row.enrolled_at,
            enroll_success: row.enroll_success,
            disabled: row.disabled,
        }
    }
}

#[derive(Debug, Clone, FromRow)]
struct CheckinRow {
    pub id: i64,
    pub machine_id: MachineId,
    pub checked_in_at: DateTime<Utc>,
}

impl From<CheckinRow> for CheckinRecord {
    fn from(row: CheckinRow) -> Self {
        Self { id: row.id, machine_id: row.machine_id, checked_in_at: row.checked_in_at }
    }
}

/// Repository for machine and checkin rows
#[derive(Debug, Clone)]
pub struct MachineRepository {
    pool: DbPool,
}

impl MachineRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    #[instrument(skip(self, machine), fields(machine_id = %machine.id), name = "db_insert_machine")]
    pub async fn insert(&self, machine: &Machine) -> Result<()> {
        sqlx::query(
            "INSERT INTO machines \
             (id, hostname, serial_number, enrolled_at, enroll_success, disabled) \
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(&machine.id)
        .bind(&machine.hostname)
        .bind(&machine.serial_number)
        .bind(machine.enrolled_at)
        .bind(machine.enroll_success)
        .bind(machine.disabled)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, machine_id = %machine.id, "Failed to create machine");
            LapsError::database(e, format!("Failed to create machine '{}'", machine.id))
        })?;

        Ok(())
    }

    #[instrument(skip(self), fields(machine_id = %id), name = "db_get_machine")]
    pub async fn get(&self, id: &MachineId) -> Result<Option<Machine>> {
        let row = sqlx::query_as::<_, MachineRow>(&format!(
            "SELECT {} FROM machines WHERE id = $1",
            MACHINE_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| LapsError::database(e, format!("Failed to get machine '{}'", id)))?;

        Ok(row.map(Machine::from))
    }

    /// Remove a machine and (by cascade) its passwords and checkins
    #[instrument(skip(self), fields(machine_id = %id), name = "db_delete_machine")]
    pub async fn delete(&self, id: &MachineId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM machines WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| LapsError::database(e, format!("Failed to delete machine '{}'", id)))?;

        Ok(result.rows_affected() > 0)
    }

    /// Store the reported hostname/serial and mark enrollment as completed
    #[instrument(
        skip(self, hostname, serial_number),
        fields(machine_id = %id),
        name = "db_refresh_machine"
    )]
    pub async fn refresh_info(
        &self,
        id: &MachineId,
        hostname: &str,
        serial_number: &str,
    ) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE machines SET hostname = $1, serial_number = $2, enroll_success = 1 \
             WHERE id = $3",
        )
        .bind(hostname)
        .bind(serial_number)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|e| LapsError::database(e, format!("Failed to update machine '{}'", id)))?;

        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self), fields(machine_id = %id), name = "db_disable_machine")]
    pub async fn disable(&self, id: &MachineId) -> Result<bool> {
        let result = sqlx::query("UPDATE machines SET disabled = 1 WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| LapsError::database(e, format!("Failed to disable machine '{}'", id)))?;

        Ok(result.rows_affected() > 0)
    }

    /// Disable every active machine that never completed enrollment
    #[instrument(skip(self), name = "db_disable_unenrolled")]
    pub async fn disable_unenrolled(&self) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE machines SET disabled = 1 WHERE disabled = 0 AND enroll_success = 0",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| LapsError::database(e, "Failed to disable unenrolled machines"))?;

        Ok(result.rows_affected())
    }

    /// All machines that are not disabled, by hostname
    #[instrument(skip(self), name = "db_list_active_machines")]
    pub async fn list_active(&self) -> Result<Vec<Machine>> {
        let rows = sqlx::query_as::<_, MachineRow>(&format!(
            "SELECT {} FROM machines WHERE disabled = 0 ORDER BY hostname, id",
            MACHINE_COLUMNS
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(|e| LapsError::database(e, "Failed to list machines"))?;

        Ok(rows.into_iter().map(Machine::from).collect())
    }

    /// Active machines sharing hostname or serial number with `machine`
    #[instrument(
        skip(self, machine),
        fields(machine_id = %machine.id),
        name = "db_find_duplicates"
    )]
    pub async fn find_possible_duplicates(&self, machine: &Machine) -> Result<Vec<Machine>> {
        let rows = sqlx::query_as::<_, MachineRow>(&format!(
            "SELECT {} FROM machines \
             WHERE id != $1 AND disabled = 0 AND (hostname = $2 OR serial_number = $3) \
             ORDER BY enrolled_at DESC",
            MACHINE_COLUMNS
        ))
        .bind(&machine.id)
        .bind(&machine.hostname)
        .bind(&machine.serial_number)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            LapsError::database(e, format!("Failed to find duplicates of machine '{}'", machine.id))
        })?;

        Ok(rows.into_iter().map(Machine::from).collect())
    }

    #[instrument(skip(self), fields(machine_id = %id), name = "db_record_checkin")]
    pub async fn record_checkin(&self, id: &MachineId, at: DateTime<Utc>) -> Result<CheckinRecord> {
        let row = sqlx::query_as::<_, CheckinRow>(
            "INSERT INTO checkins (machine_id, checked_in_at) VALUES ($1, $2) \
             RETURNING id, machine_id, checked_in_at",
        )
        .bind(id)
        .bind(at)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| LapsError::database(e, format!("Failed to record checkin for '{}'", id)))?;

        Ok(row.into())
    }

    /// Checkins of one machine, newest first
    #[instrument(skip(self), fields(machine_id = %id), name = "db_list_checkins")]
    pub async fn list_checkins(&self, id: &MachineId) -> Result<Vec<CheckinRecord>> {
        let rows = sqlx::query_as::<_, CheckinRow>(
            "SELECT id, machine_id, checked_in_at FROM checkins WHERE machine_id = $1 \
             ORDER BY checked_in_at DESC, id DESC",
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| LapsError::database(e, format!("Failed to list checkins for '{}'", id)))?;

        Ok(rows.into_iter().map(CheckinRecord::from).collect())
    }
}
