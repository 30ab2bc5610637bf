//! HSM budget guard.
//!
//! The HSM token only services a bounded number of requests. [`HsmBudget`]
//! owns the process-wide [`HsmSession`] behind one async mutex, shared by the
//! rotation engine and the renewal scheduler, and renews the token from the
//! newest bootstrap row before it runs out.
//!
//! Callers lock the session, call [`HsmBudget::check_budget`] and issue
//! exactly one HSM request while still holding the guard. Once renewal has
//! failed no request is issued.

use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, error, info, warn};

use super::error::{RotationError, RotationResult};
use crate::secrets::HsmSession;
use crate::storage::CredentialStore;

#[derive(Clone)]
pub struct HsmBudget {
    session: Arc<Mutex<HsmSession>>,
    store: Arc<dyn CredentialStore>,
    threshold: u32,
}

impl std::fmt::Debug for HsmBudget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HsmBudget").field("threshold", &self.threshold).finish()
    }
}

impl HsmBudget {
    /// `threshold` is the usage count at which the token is renewed before
    /// the next request, normally `max_uses - 1`.
    pub fn new(session: HsmSession, store: Arc<dyn CredentialStore>, threshold: u32) -> Self {
        Self { session: Arc::new(Mutex::new(session)), store, threshold }
    }

    pub fn threshold(&self) -> u32 {
        self.threshold
    }

    pub async fn lock(&self) -> MutexGuard<'_, HsmSession> {
        self.session.lock().await
    }

    /// Log in again with the newest bootstrap row.
    pub async fn reauthenticate(&self, session: &mut HsmSession) -> bool {
        let bootstrap = match self.store.latest_bootstrap().await {
            Ok(Some(bootstrap)) => bootstrap,
            Ok(None) => {
                error!("No HSM bootstrap credentials stored; cannot authenticate");
                return false;
            }
            Err(e) => {
                error!(error = %e, "Failed to read HSM bootstrap credentials");
                return false;
            }
        };

        let ok = session.authenticate(&bootstrap.role_id, &bootstrap.secret_id).await;
        if ok {
            debug!(bootstrap_id = bootstrap.id, "Re-authenticated to HSM");
        }
        ok
    }

    /// Make sure the next request fits in the token's budget.
    pub async fn check_budget(&self, session: &mut HsmSession) -> RotationResult<()> {
        if session.is_authenticated() && session.uses() < self.threshold {
            return Ok(());
        }

        info!(
            uses = session.uses(),
            threshold = self.threshold,
            authenticated = session.is_authenticated(),
            "HSM token needs renewal"
        );
        if self.reauthenticate(session).await {
            Ok(())
        } else {
            warn!("HSM token renewal failed; refusing further HSM requests");
            Err(RotationError::BudgetExhausted)
        }
    }

    /// Unconditional renewal, used by the periodic re-authentication timer.
    pub async fn force_reauthenticate(&self) -> bool {
        let mut session = self.lock().await;
        self.reauthenticate(&mut session).await
    }

    /// Ask the HSM for a fresh bootstrap secret id, store it next to the
    /// current role id and switch the session over to the new pair.
    pub async fn rotate_bootstrap_secret(&self) -> RotationResult<()> {
        let mut session = self.lock().await;
        self.check_budget(&mut session).await?;

        let current = self
            .store
            .latest_bootstrap()
            .await?
            .ok_or_else(|| RotationError::not_found("HSM bootstrap credentials"))?;

        let secret_id = session.issue_secret_id().await.map_err(|e| {
            warn!(error = %e, "Could not obtain a new HSM secret id; keeping the current one");
            RotationError::BackendUnavailable { reason: e.to_string() }
        })?;

        let stored = self.store.append_bootstrap(&current.role_id, &secret_id).await?;
        info!(bootstrap_id = stored.id, "Stored rotated HSM bootstrap secret");

        if session.authenticate(&stored.role_id, &stored.secret_id).await {
            Ok(())
        } else {
            Err(RotationError::BackendUnavailable {
                reason: "authentication with the rotated secret id failed".to_string(),
            })
        }
    }
}
