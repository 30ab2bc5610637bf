//! Store HSM AppRole login material
//!
//! Appends one bootstrap row that the service authenticates with. The
//! service waits at startup until such a row exists.
//!
//! Usage:
//!   seed-bootstrap --role-id <ROLE_ID> --secret-id <SECRET_ID>
//!   LAPSVAULT_BOOTSTRAP_SECRET_ID=... seed-bootstrap --role-id <ROLE_ID>

use anyhow::{Context, Result};
use clap::Parser;
use lapsvault::{
    config::DatabaseConfig,
    secrets::SecretString,
    storage::{create_pool, repositories::BootstrapRepository},
};
use tracing::info;

#[derive(Parser)]
#[command(name = "seed-bootstrap")]
#[command(about = "Store HSM AppRole credentials for lapsvault")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Args {
    /// AppRole role id
    #[arg(long)]
    role_id: String,

    /// AppRole secret id
    #[arg(long, env = "LAPSVAULT_BOOTSTRAP_SECRET_ID", hide_env_values = true)]
    secret_id: String,

    /// Database URL override
    #[arg(long, env = "DATABASE_URL")]
    database_url: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().with_max_level(tracing::Level::INFO).init();

    let args = Args::parse();
    if args.role_id.trim().is_empty() || args.secret_id.trim().is_empty() {
        anyhow::bail!("role id and secret id must not be empty");
    }

    let mut db_config = DatabaseConfig { auto_migrate: true, ..Default::default() };
    if let Some(url) = args.database_url {
        db_config.url = url;
    }

    let pool = create_pool(&db_config).await.context("Failed to open database")?;
    let repository = BootstrapRepository::new(pool);

    let secret_id = SecretString::new(args.secret_id);
    let stored = repository
        .append(args.role_id.trim(), &secret_id)
        .await
        .context("Failed to store bootstrap credentials")?;
    let total = repository.count().await.context("Failed to count bootstrap credentials")?;

    info!(bootstrap_id = stored.id, total, "Stored HSM bootstrap credentials");
    Ok(())
}
