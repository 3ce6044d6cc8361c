//! Cached mount configuration.
//!
//! The store is owned by the backend instance (not a package-level global)
//! so multiple isolated instances can coexist in tests. Storage is the
//! source of truth; the cache is a performance optimization that is always
//! safe to drop.

use crate::errors::BackendError;
use crate::models::MountConfig;
use crate::storage::{self, Storage};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, warn};

pub const CONFIG_PATH: &str = "config";

pub struct ConfigStore {
    storage: Arc<dyn Storage>,
    cached: RwLock<Option<MountConfig>>,
    max_lease_ttl: Duration,
}

impl ConfigStore {
    pub fn new(storage: Arc<dyn Storage>, max_lease_ttl: Duration) -> Self {
        Self {
            storage,
            cached: RwLock::new(None),
            max_lease_ttl,
        }
    }

    pub fn max_lease_ttl(&self) -> Duration {
        self.max_lease_ttl
    }

    /// Return the mount configuration, materializing and persisting the
    /// default configuration on first access if nothing is stored.
    ///
    /// Double-checked locking: an optimistic read-lock check serves the warm
    /// path without serializing readers; the writer lock re-checks before
    /// falling through to storage I/O so concurrent misses do one load.
    pub async fn get(&self) -> Result<MountConfig, BackendError> {
        {
            let cached = self.cached.read().await;
            if let Some(config) = cached.as_ref() {
                return Ok(config.clone());
            }
        }

        let mut cached = self.cached.write().await;

        // Somebody else may have populated the cache while we waited.
        if let Some(config) = cached.as_ref() {
            return Ok(config.clone());
        }

        if let Some(raw) = self.storage.get(CONFIG_PATH).await? {
            match serde_json::from_slice::<MountConfig>(&raw) {
                Ok(config) => {
                    *cached = Some(config.clone());
                    return Ok(config);
                }
                Err(e) => {
                    warn!(error = %e, "failed to deserialize stored config, resetting to default");
                }
            }
        }

        // Nothing stored (or the blob was unreadable): initialize defaults
        // and persist them so every node converges on the same view.
        let config = MountConfig::default_for(self.max_lease_ttl);
        storage::put_json(self.storage.as_ref(), CONFIG_PATH, &config).await?;
        *cached = Some(config.clone());

        debug!("config initialized with defaults");
        Ok(config)
    }

    /// Return the stored configuration without materializing defaults.
    ///
    /// Role operations use this: a mount that was never configured reports
    /// "config not found" rather than silently creating one.
    pub async fn get_existing(&self) -> Result<Option<MountConfig>, BackendError> {
        {
            let cached = self.cached.read().await;
            if let Some(config) = cached.as_ref() {
                return Ok(Some(config.clone()));
            }
        }

        storage::get_json(self.storage.as_ref(), CONFIG_PATH).await
    }

    /// Replace the stored and cached configuration atomically with respect
    /// to readers. Returns whether a configuration already existed — the
    /// caller triggers a forced key rotation on reconfiguration, since the
    /// algorithm or key type may have changed.
    pub async fn save(&self, config: MountConfig) -> Result<bool, BackendError> {
        let mut cached = self.cached.write().await;

        let existed =
            cached.is_some() || self.storage.get(CONFIG_PATH).await?.is_some();

        storage::put_json(self.storage.as_ref(), CONFIG_PATH, &config).await?;
        *cached = Some(config);

        Ok(existed)
    }

    /// Delete the stored configuration and clear the cache. A subsequent
    /// [`get`](Self::get) regenerates defaults.
    pub async fn clear(&self) -> Result<(), BackendError> {
        let mut cached = self.cached.write().await;

        self.storage.delete(CONFIG_PATH).await?;
        *cached = None;

        Ok(())
    }

    /// Drop the cached configuration (storage untouched). Invoked when a
    /// peer node reports a storage change under the `config` key.
    pub async fn invalidate(&self) {
        let mut cached = self.cached.write().await;
        *cached = None;
    }
}
