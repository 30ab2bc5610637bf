//! Background HSM token renewal
//!
//! Two independent timers run next to request handling and share its lock
//! domain through [`HsmBudget`]:
//!
//! - re-authentication: logs in again with the newest bootstrap row so the
//!   token never reaches its absolute expiry
//! - secret rotation: asks the HSM for a new bootstrap secret id, stores it
//!   and switches the session over
//!
//! Both tasks stop on [`RenewalHandle::shutdown`]. A tick that is in flight
//! finishes first, so no lock is left held.

use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{error, info, warn};

use crate::rotation::HsmBudget;

#[derive(Debug, Clone, Copy)]
pub struct RenewalSchedule {
    pub reauth_interval: Duration,
    pub secret_rotation_interval: Duration,
}

impl From<&crate::config::RotationPolicy> for RenewalSchedule {
    fn from(policy: &crate::config::RotationPolicy) -> Self {
        Self {
            reauth_interval: policy.reauth_interval(),
            secret_rotation_interval: policy.secret_rotation_interval(),
        }
    }
}

pub struct RenewalScheduler {
    budget: HsmBudget,
    schedule: RenewalSchedule,
}

/// Handle for stopping the renewal tasks
pub struct RenewalHandle {
    shutdown_tx: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl RenewalHandle {
    /// Signal both timers to stop and wait for them.
    pub async fn shutdown(self) {
        info!("Stopping HSM renewal scheduler");
        let _ = self.shutdown_tx.send(true);
        for task in self.tasks {
            if let Err(e) = task.await {
                error!(error = %e, "Renewal task ended abnormally");
            }
        }
    }
}

impl RenewalScheduler {
    pub fn new(budget: HsmBudget, schedule: RenewalSchedule) -> Self {
        Self { budget, schedule }
    }

    /// Spawn both timers. The first tick of each fires one full period after
    /// start; the initial login is done by the caller.
    pub fn spawn(self) -> RenewalHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let reauth = {
            let budget = self.budget.clone();
            let period = self.schedule.reauth_interval;
            let shutdown_rx = shutdown_rx.clone();
            tokio::spawn(run_timer("reauthenticate", period, shutdown_rx, move || {
                let budget = budget.clone();
                async move {
                    if budget.force_reauthenticate().await {
                        info!("Periodic HSM re-authentication succeeded");
                    } else {
                        error!("Periodic HSM re-authentication failed");
                    }
                }
            }))
        };

        let rotate = {
            let budget = self.budget.clone();
            let period = self.schedule.secret_rotation_interval;
            tokio::spawn(run_timer("rotate_bootstrap_secret", period, shutdown_rx, move || {
                let budget = budget.clone();
                async move {
                    match budget.rotate_bootstrap_secret().await {
                        Ok(()) => info!("HSM bootstrap secret rotated"),
                        Err(e) => warn!(error = %e, "Skipping HSM bootstrap secret rotation"),
                    }
                }
            }))
        };

        info!(
            reauth_secs = self.schedule.reauth_interval.as_secs(),
            rotation_secs = self.schedule.secret_rotation_interval.as_secs(),
            "HSM renewal scheduler started"
        );
        RenewalHandle { shutdown_tx, tasks: vec![reauth, rotate] }
    }
}

async fn run_timer<F, Fut>(
    name: &'static str,
    period: Duration,
    mut shutdown_rx: watch::Receiver<bool>,
    mut job: F,
) where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = ()>,
{
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => job().await,
            changed = shutdown_rx.changed() => {
                if changed.is_err() || *shutdown_rx.borrow() {
                    info!(task = name, "Renewal task stopped");
                    break;
                }
            }
        }
    }
}
