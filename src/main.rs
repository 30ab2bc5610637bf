use std::sync::Arc;

use lapsvault::{
    api::start_api_server,
    config::AppConfig,
    observability::{init_observability, log_config_info},
    rotation::{HsmBudget, RotationEngine, SystemClock},
    scheduler::{RenewalSchedule, RenewalScheduler},
    secrets::{HsmSession, VaultHsmBackend},
    storage::{create_pool, CredentialStore, SqliteCredentialStore},
    LapsError, Result, APP_NAME, VERSION,
};
use tokio::signal;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if it exists (optional - won't fail if missing)
    if let Err(e) = dotenvy::dotenv() {
        if !e.to_string().contains("not found") {
            eprintln!("Warning: Error loading .env file: {}", e);
        }
    }

    let config = AppConfig::from_env()?;
    init_observability(&config.observability)?;

    info!(app_name = APP_NAME, version = VERSION, "Starting lapsvault");
    log_config_info(&config);

    let pool = create_pool(&config.database).await?;
    let store: Arc<dyn CredentialStore> = Arc::new(SqliteCredentialStore::new(pool));

    if !wait_for_bootstrap(store.as_ref(), &config).await? {
        info!("Shutdown requested before HSM credentials were provided");
        return Ok(());
    }

    let backend = VaultHsmBackend::new(config.hsm.clone())
        .map_err(|e| LapsError::config(format!("Invalid HSM configuration: {}", e)))?;
    let session = HsmSession::new(Box::new(backend), config.hsm.request_timeout());
    let budget = HsmBudget::new(session, store.clone(), config.rotation.renewal_threshold());

    if budget.force_reauthenticate().await {
        info!(address = %config.hsm.address, "Authenticated to HSM");
    } else {
        warn!("Initial HSM authentication failed; requests will retry through the budget guard");
    }

    let renewal =
        RenewalScheduler::new(budget.clone(), RenewalSchedule::from(&config.rotation)).spawn();

    let engine = Arc::new(RotationEngine::new(
        store,
        budget,
        config.rotation.clone(),
        Arc::new(SystemClock),
    ));

    let served = start_api_server(&config.server, engine, async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for shutdown signal");
        }
        info!("Shutdown signal received");
    })
    .await;

    renewal.shutdown().await;

    if let Err(e) = served {
        error!(error = %e, "API server terminated with error");
        return Err(e);
    }

    info!("lapsvault shutdown completed");
    Ok(())
}

/// Block until the first HSM bootstrap row exists. Returns `false` when
/// interrupted by Ctrl-C.
async fn wait_for_bootstrap(store: &dyn CredentialStore, config: &AppConfig) -> Result<bool> {
    let poll = config.rotation.bootstrap_poll();
    let mut announced = false;

    loop {
        if store.latest_bootstrap().await?.is_some() {
            return Ok(true);
        }
        if !announced {
            warn!(
                poll_seconds = poll.as_secs(),
                "No HSM bootstrap credentials stored yet; run seed-bootstrap to provide them"
            );
            announced = true;
        }

        tokio::select! {
            _ = tokio::time::sleep(poll) => {}
            _ = signal::ctrl_c() => return Ok(false),
        }
    }
}
