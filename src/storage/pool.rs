//! # Database Connection Pool Management
//!
//! SQLite pool creation for the credential store.

use crate::config::DatabaseConfig;
use crate::errors::{LapsError, Result};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions},
    Pool, Sqlite,
};
use std::{str::FromStr, time::Duration};

/// Type alias for the database connection pool
pub type DbPool = Pool<Sqlite>;

const SQLITE_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Create a database connection pool with the specified configuration
pub async fn create_pool(config: &DatabaseConfig) -> Result<DbPool> {
    validate_config(config)?;

    let connect_options = SqliteConnectOptions::from_str(&config.url)
        .map_err(|e| {
            LapsError::database(e, format!("Invalid SQLite connection string: {}", config.url))
        })?
        .create_if_missing(true)
        .foreign_keys(true)
        .busy_timeout(SQLITE_BUSY_TIMEOUT);

    // Every connection to `:memory:` opens its own empty database.
    let (connect_options, max_connections, min_connections) = if config.is_in_memory() {
        (connect_options.journal_mode(SqliteJournalMode::Memory), 1, 1)
    } else {
        (
            connect_options.journal_mode(SqliteJournalMode::Wal),
            config.max_connections,
            config.min_connections,
        )
    };

    let pool = SqlitePoolOptions::new()
        .max_connections(max_connections)
        .min_connections(min_connections)
        .acquire_timeout(config.connect_timeout())
        .test_before_acquire(true)
        .connect_with(connect_options)
        .await
        .map_err(|e| {
            tracing::error!(
                error = %e,
                url = %config.url,
                busy_timeout_ms = SQLITE_BUSY_TIMEOUT.as_millis(),
                "Failed to create SQLite database pool"
            );
            LapsError::database(e, format!("Failed to connect to database: {}", config.url))
        })?;

    tracing::info!(
        max_connections,
        min_connections,
        connect_timeout_ms = config.connect_timeout().as_millis(),
        in_memory = config.is_in_memory(),
        "Database connection pool created"
    );

    if config.auto_migrate {
        tracing::info!("Auto-migration enabled, running database migrations");
        crate::storage::migrations::run_migrations(&pool).await?;
    }

    Ok(pool)
}

/// Open a migrated in-memory database. Used by tests and benchmarks.
pub async fn open_in_memory() -> Result<DbPool> {
    let config = DatabaseConfig {
        url: "sqlite::memory:".to_string(),
        auto_migrate: true,
        ..Default::default()
    };
    create_pool(&config).await
}

fn validate_config(config: &DatabaseConfig) -> Result<()> {
    if config.max_connections == 0 {
        return Err(LapsError::validation("max_connections must be greater than 0"));
    }

    if config.min_connections > config.max_connections {
        return Err(LapsError::validation(
            "min_connections cannot be greater than max_connections",
        ));
    }

    if !config.url.starts_with("sqlite:") {
        return Err(LapsError::validation("database URL must start with 'sqlite:'"));
    }

    Ok(())
}
