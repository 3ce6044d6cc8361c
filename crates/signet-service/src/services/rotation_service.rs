//! Periodic key maintenance.
//!
//! On each tick: rotate the signing key if the active version has aged past
//! the rotation period (this happens inside `Backend::get_policy`), then
//! prune versions that can no longer verify any still-valid token. Failures
//! are logged and counted; there is no synchronous caller to report to, and
//! the next tick retries naturally.

use crate::backend::Backend;
use crate::errors::BackendError;
use crate::observability::metrics;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, warn};

/// One maintenance pass. Safe to invoke repeatedly and concurrently with
/// request traffic.
pub async fn run_once(backend: &Backend) -> Result<(), BackendError> {
    let config = backend.get_config().await?;
    let handle = backend.get_policy(&config).await?;

    let pruned = handle
        .prune_expired(
            backend.storage(),
            config.key_rotation_period,
            config.token_ttl,
        )
        .await?;
    if pruned {
        metrics::record_key_prune();
    }

    let latest = handle.with_read(|p| Ok(p.latest_version)).await?;
    metrics::set_latest_key_version(latest);

    debug!(latest, pruned, "key maintenance pass complete");
    Ok(())
}

/// Spawn the periodic driver. The task runs until the process exits.
pub fn spawn(backend: Arc<Backend>, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            if let Err(e) = run_once(&backend).await {
                metrics::record_maintenance_failure();
                warn!(error = %e, "periodic key maintenance failed");
            }
        }
    })
}
