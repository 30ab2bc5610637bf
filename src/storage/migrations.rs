//! # Database Migration Management
//!
//! The SQL files under `migrations/` are embedded at compile time and applied
//! on startup when auto-migrate is enabled, or explicitly by the
//! `seed-bootstrap` tool.

use crate::errors::{LapsError, Result};
use crate::storage::DbPool;
use sqlx::migrate::Migrator;
use tracing::{error, info};

static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

/// Run all pending database migrations
pub async fn run_migrations(pool: &DbPool) -> Result<()> {
    MIGRATOR.run(pool).await.map_err(|e| {
        error!(error = %e, "Database migration failed");
        LapsError::Migration {
            source: e,
            context: "Failed to apply embedded migrations".to_string(),
        }
    })?;

    info!(embedded = MIGRATOR.iter().count(), "Database migrations up to date");
    Ok(())
}

/// Number of migrations recorded as applied
pub async fn applied_migration_count(pool: &DbPool) -> Result<i64> {
    sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM _sqlx_migrations WHERE success = 1")
        .fetch_one(pool)
        .await
        .map_err(|e| LapsError::database(e, "Failed to read migration history"))
}
