//! The backend instance: storage, caches, locking and the policy lifecycle
//! entry points.
//!
//! All mutable state (config cache, policy cache) is owned here rather than
//! in package-level globals, so tests can run isolated instances against
//! separate storage, and two instances sharing one storage behave like two
//! nodes of a deployment.

use crate::crypto::{self, KeyType};
use crate::errors::BackendError;
use crate::keyring::{LockManager, PolicyHandle, PolicyRequest, POLICY_PREFIX};
use crate::models::MountConfig;
use crate::observability::metrics;
use crate::registry::RoleRegistry;
use crate::secret::{ExposeSecret, SecretBox};
use crate::services::config_service::{ConfigStore, CONFIG_PATH};
use crate::storage::Storage;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Name of the mount's signing policy. One policy per mount.
pub const MAIN_POLICY_NAME: &str = "main";

pub struct Backend {
    id: String,
    storage: Arc<dyn Storage>,
    config_store: ConfigStore,
    lock_manager: LockManager,
    registry: Arc<dyn RoleRegistry>,
    master_key: SecretBox<Vec<u8>>,
}

impl Backend {
    pub fn new(
        id: impl Into<String>,
        storage: Arc<dyn Storage>,
        registry: Arc<dyn RoleRegistry>,
        master_key: Vec<u8>,
        max_lease_ttl: Duration,
    ) -> Self {
        let config_store = ConfigStore::new(Arc::clone(&storage), max_lease_ttl);
        Self {
            id: id.into(),
            storage,
            config_store,
            lock_manager: LockManager::new(),
            registry,
            master_key: SecretBox::new(Box::new(master_key)),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn storage(&self) -> &dyn Storage {
        self.storage.as_ref()
    }

    pub fn registry(&self) -> &dyn RoleRegistry {
        self.registry.as_ref()
    }

    pub fn max_lease_ttl(&self) -> Duration {
        self.config_store.max_lease_ttl()
    }

    pub(crate) fn master_key(&self) -> &[u8] {
        self.master_key.expose_secret()
    }

    /// Eager initialization on process start: materializes the default
    /// configuration if none is stored.
    pub async fn initialize(&self) -> Result<(), BackendError> {
        self.config_store.get().await?;
        debug!("backend initialized");
        Ok(())
    }

    /// Mount configuration, materializing defaults on first access.
    pub async fn get_config(&self) -> Result<MountConfig, BackendError> {
        self.config_store.get().await
    }

    /// Stored mount configuration, without materializing defaults.
    pub async fn read_config(&self) -> Result<Option<MountConfig>, BackendError> {
        self.config_store.get_existing().await
    }

    /// Validate and persist a new configuration. If a configuration already
    /// existed this is a reconfiguration: the signing key is force-rotated
    /// to the (possibly changed) key type, after the config is persisted —
    /// rotating first would generate material for parameters that were
    /// never saved.
    pub async fn save_config(&self, config: MountConfig) -> Result<(), BackendError> {
        validate_config(&config, self.max_lease_ttl())?;

        let key_type =
            crypto::key_type_for(config.signature_algorithm, config.rsa_key_bits)?;

        let existed = self.config_store.save(config).await?;
        if !existed {
            return Ok(());
        }

        info!("configuration replaced, rotating key format");

        let handle = self.resolve_policy(key_type).await?;
        handle
            .rotate_to_type(self.storage(), self.master_key(), key_type)
            .await?;
        self.lock_manager.invalidate(MAIN_POLICY_NAME).await;
        metrics::record_key_rotation("forced");

        Ok(())
    }

    /// Delete the stored configuration and every role under the mount.
    pub async fn clear_config(&self) -> Result<(), BackendError> {
        if self.read_config().await?.is_none() {
            return Ok(());
        }

        for name in crate::services::role_service::list_roles(self).await? {
            crate::services::role_service::delete_role(self, &name).await?;
        }

        self.config_store.clear().await
    }

    /// Resolve the mount's signing policy for the given configuration,
    /// creating it on first access and rotating it if the active version
    /// has aged past the rotation period.
    pub async fn get_policy(
        &self,
        config: &MountConfig,
    ) -> Result<PolicyHandle, BackendError> {
        let key_type =
            crypto::key_type_for(config.signature_algorithm, config.rsa_key_bits)?;

        let handle = self.resolve_policy(key_type).await?;

        let rotated = handle
            .rotate_if_due(self.storage(), self.master_key(), config.key_rotation_period)
            .await?;
        if rotated {
            // Broadcast through the cache: peers (and our own next resolve)
            // reload the rotated policy from storage.
            self.lock_manager.invalidate(MAIN_POLICY_NAME).await;
            metrics::record_key_rotation("scheduled");
        }

        Ok(handle)
    }

    async fn resolve_policy(&self, key_type: KeyType) -> Result<PolicyHandle, BackendError> {
        self.lock_manager
            .get_policy(
                self.storage(),
                PolicyRequest {
                    name: MAIN_POLICY_NAME,
                    key_type,
                    upsert: true,
                },
                self.master_key(),
            )
            .await?
            .ok_or_else(|| {
                BackendError::Internal("policy upsert returned no policy".to_string())
            })
    }

    /// React to a storage-change notification from the host: drop the
    /// matching cache entry so the next access reloads from storage.
    pub async fn invalidate(&self, key: &str) {
        debug!(key, "invalidating");
        if let Some(name) = key.strip_prefix(POLICY_PREFIX) {
            self.lock_manager.invalidate(name).await;
        } else if key == CONFIG_PATH {
            self.config_store.invalidate().await;
        }
    }
}

/// Synchronous validation of a mount configuration. Nothing is mutated on
/// rejection.
pub fn validate_config(
    config: &MountConfig,
    max_lease_ttl: Duration,
) -> Result<(), BackendError> {
    if config.url.is_empty() {
        return Err(BackendError::Validation("url must not be empty".to_string()));
    }
    if config.sign_key.is_empty() {
        return Err(BackendError::Validation(
            "sign_key must not be empty".to_string(),
        ));
    }
    if config.key_rotation_period.is_zero() {
        return Err(BackendError::Validation(
            "key_ttl must be greater than zero".to_string(),
        ));
    }
    if config.token_ttl.is_zero() {
        return Err(BackendError::Validation(
            "jwt_ttl must be greater than zero".to_string(),
        ));
    }
    if config.token_ttl > max_lease_ttl {
        return Err(BackendError::Validation(format!(
            "jwt_ttl {} exceeds maximum lease TTL {}",
            humantime::format_duration(config.token_ttl),
            humantime::format_duration(max_lease_ttl),
        )));
    }

    // Surfaces unsupported algorithm / RSA key size combinations.
    crypto::key_type_for(config.signature_algorithm, config.rsa_key_bits)?;

    Ok(())
}
