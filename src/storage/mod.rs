//! # Storage and Persistence
//!
//! SQLite persistence for machines, passwords, checkins, the access log and
//! the HSM bootstrap credentials, exposed to the rest of the crate through
//! the [`CredentialStore`] trait.

pub mod credential_store;
pub mod migrations;
pub mod pool;
pub mod repositories;

pub use crate::config::DatabaseConfig;

pub use credential_store::{CredentialStore, SqliteCredentialStore};
pub use migrations::{applied_migration_count, run_migrations};
pub use pool::{create_pool, open_in_memory, DbPool};

use crate::errors::{LapsError, Result};

/// Check database connectivity
pub async fn check_connection(pool: &DbPool) -> Result<()> {
    sqlx::query("SELECT 1")
        .fetch_one(pool)
        .await
        .map_err(|e| LapsError::database(e, "Database connectivity check failed"))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_check_connection() {
        let pool = open_in_memory().await.unwrap();
        check_connection(&pool).await.unwrap();
    }

    #[tokio::test]
    async fn test_invalid_database_url() {
        let config = DatabaseConfig { url: "invalid://url".to_string(), ..Default::default() };
        assert!(create_pool(&config).await.is_err());
    }
}
