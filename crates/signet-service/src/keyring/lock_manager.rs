//! Per-policy-name locking and caching.
//!
//! The manager keeps one cache entry per policy name, each guarded by its own
//! reader/writer lock — rotation of policy A never blocks reads of policy B.
//! The cached object is a read-through/write-through copy of the persisted
//! blob; eviction (via [`LockManager::invalidate`]) is always safe because
//! storage remains the source of truth.
//!
//! Mutations (rotate, prune) work on a clone of the cached policy, persist
//! the clone, and only then commit it to the cache. A persistence failure
//! therefore leaves the in-memory policy exactly as the caller found it —
//! a retried operation starts from the last known-good persisted state.

use crate::crypto::KeyType;
use crate::errors::BackendError;
use crate::keyring::policy::KeyPolicy;
use crate::storage::Storage;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tracing::info;

/// Parameters for resolving a policy through the manager.
#[derive(Debug, Clone, Copy)]
pub struct PolicyRequest<'a> {
    pub name: &'a str,
    /// Key type to generate if the policy does not exist yet.
    pub key_type: KeyType,
    /// Create and persist a version-1 key when the policy is absent.
    pub upsert: bool,
}

#[derive(Debug, Default)]
struct PolicyEntry {
    slot: RwLock<Option<KeyPolicy>>,
}

/// Handle to one cached policy. Cheap to clone; all lock acquisition happens
/// inside the methods.
#[derive(Clone)]
pub struct PolicyHandle {
    name: String,
    entry: Arc<PolicyEntry>,
}

#[derive(Default)]
pub struct LockManager {
    entries: Mutex<HashMap<String, Arc<PolicyEntry>>>,
}

impl LockManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve the policy for `req.name`, loading it from storage on a cache
    /// miss and (when `req.upsert` is set) creating and persisting a
    /// version-1 key if none exists.
    ///
    /// Creation is serialized under the entry's writer lock with a re-check
    /// after acquisition, so N concurrent callers racing on a not-yet-
    /// existent policy persist exactly one version-1 key — the losers
    /// observe the winner's result.
    pub async fn get_policy(
        &self,
        storage: &dyn Storage,
        req: PolicyRequest<'_>,
        master_key: &[u8],
    ) -> Result<Option<PolicyHandle>, BackendError> {
        let entry = self.entry(req.name).await;

        // Optimistic read: the common case is a warm cache.
        {
            let slot = entry.slot.read().await;
            if slot.is_some() {
                return Ok(Some(PolicyHandle {
                    name: req.name.to_string(),
                    entry: Arc::clone(&entry),
                }));
            }
        }

        let mut slot = entry.slot.write().await;

        // Re-check: another task may have populated the entry while we
        // waited for the writer lock.
        if slot.is_none() {
            match KeyPolicy::load(storage, req.name).await? {
                Some(policy) => *slot = Some(policy),
                None if req.upsert => {
                    let policy = KeyPolicy::initialize(req.name, req.key_type, master_key)?;
                    policy.persist(storage).await?;
                    info!(policy = req.name, key_type = ?req.key_type, "created signing policy");
                    *slot = Some(policy);
                }
                None => return Ok(None),
            }
        }

        drop(slot);

        Ok(Some(PolicyHandle {
            name: req.name.to_string(),
            entry,
        }))
    }

    /// Drop the cached object for `name`, forcing the next `get_policy` to
    /// reload from storage. This is how a node learns that a peer rotated
    /// the key. Outstanding handles keep the object they already resolved.
    pub async fn invalidate(&self, name: &str) {
        let mut entries = self.entries.lock().await;
        entries.remove(name);
    }

    async fn entry(&self, name: &str) -> Arc<PolicyEntry> {
        let mut entries = self.entries.lock().await;
        Arc::clone(
            entries
                .entry(name.to_string())
                .or_insert_with(|| Arc::new(PolicyEntry::default())),
        )
    }
}

impl PolicyHandle {
    /// Run `f` against the policy under the shared lock.
    pub async fn with_read<R>(
        &self,
        f: impl FnOnce(&KeyPolicy) -> Result<R, BackendError>,
    ) -> Result<R, BackendError> {
        let slot = self.entry.slot.read().await;
        let policy = slot
            .as_ref()
            .ok_or_else(|| BackendError::Lifecycle(format!("policy {} not loaded", self.name)))?;
        f(policy)
    }

    /// Rotate unconditionally: generate a new latest version and persist.
    /// Requires no lock held by the caller; takes the exclusive lock itself.
    pub async fn rotate(
        &self,
        storage: &dyn Storage,
        master_key: &[u8],
    ) -> Result<u32, BackendError> {
        let mut slot = self.entry.slot.write().await;
        let policy = slot
            .as_ref()
            .ok_or_else(|| BackendError::Lifecycle(format!("policy {} not loaded", self.name)))?;

        let mut updated = policy.clone();
        let version = updated.add_version(master_key)?;
        updated.persist(storage).await?;
        *slot = Some(updated);

        info!(policy = %self.name, version, "key rotated");
        Ok(version)
    }

    /// Rotate to a (possibly different) key type. Used when a configuration
    /// rewrite changes the signing algorithm: old versions may no longer be
    /// compatible with the new type, so a fresh latest version is created.
    pub async fn rotate_to_type(
        &self,
        storage: &dyn Storage,
        master_key: &[u8],
        key_type: KeyType,
    ) -> Result<u32, BackendError> {
        let mut slot = self.entry.slot.write().await;
        let policy = slot
            .as_ref()
            .ok_or_else(|| BackendError::Lifecycle(format!("policy {} not loaded", self.name)))?;

        let mut updated = policy.clone();
        updated.key_type = key_type;
        let version = updated.add_version(master_key)?;
        updated.persist(storage).await?;
        *slot = Some(updated);

        info!(policy = %self.name, version, key_type = ?key_type, "key format rotated");
        Ok(version)
    }

    /// Rotate only if the latest version has aged past `rotation_period`.
    ///
    /// The age check runs first under the shared lock (cheap, does not block
    /// readers); the condition is re-verified after acquiring the exclusive
    /// lock because another task may have rotated in between. Rotation is
    /// idempotent per time window: two back-to-back calls produce one new
    /// version, not two.
    pub async fn rotate_if_due(
        &self,
        storage: &dyn Storage,
        master_key: &[u8],
        rotation_period: Duration,
    ) -> Result<bool, BackendError> {
        {
            let slot = self.entry.slot.read().await;
            let policy = slot.as_ref().ok_or_else(|| {
                BackendError::Lifecycle(format!("policy {} not loaded", self.name))
            })?;
            if !policy.is_rotation_due(rotation_period, Utc::now()) {
                return Ok(false);
            }
        }

        let mut slot = self.entry.slot.write().await;
        let policy = slot
            .as_ref()
            .ok_or_else(|| BackendError::Lifecycle(format!("policy {} not loaded", self.name)))?;

        if !policy.is_rotation_due(rotation_period, Utc::now()) {
            return Ok(false);
        }

        let mut updated = policy.clone();
        let version = updated.add_version(master_key)?;
        updated.persist(storage).await?;
        *slot = Some(updated);

        info!(policy = %self.name, version, "key rotated");
        Ok(true)
    }

    /// Advance the minimum-retained boundary past versions that can no
    /// longer verify any still-valid token, and drop their key material.
    ///
    /// The scan runs under the shared lock; if a change is warranted the
    /// boundary is re-checked under the exclusive lock (another pruner may
    /// already have advanced past it) before mutating and persisting.
    /// Returns whether anything was pruned.
    pub async fn prune_expired(
        &self,
        storage: &dyn Storage,
        rotation_period: Duration,
        token_ttl: Duration,
    ) -> Result<bool, BackendError> {
        let boundary = {
            let slot = self.entry.slot.read().await;
            let policy = slot.as_ref().ok_or_else(|| {
                BackendError::Lifecycle(format!("policy {} not loaded", self.name))
            })?;

            let boundary = policy.prune_boundary(rotation_period, token_ttl, Utc::now());
            if boundary == policy.min_available_version {
                return Ok(false);
            }
            boundary
        };

        let mut slot = self.entry.slot.write().await;
        let policy = slot
            .as_ref()
            .ok_or_else(|| BackendError::Lifecycle(format!("policy {} not loaded", self.name)))?;

        if boundary <= policy.min_available_version {
            return Ok(false);
        }

        let mut updated = policy.clone();
        updated.min_available_version = boundary;
        updated.min_decryption_version = updated.min_decryption_version.max(boundary);
        updated.keys.retain(|version, _| *version >= boundary);
        updated.persist(storage).await?;

        info!(
            policy = %self.name,
            latest = updated.latest_version,
            min_available = updated.min_available_version,
            min_decryption = updated.min_decryption_version,
            "key versions pruned"
        );

        *slot = Some(updated);
        Ok(true)
    }
}
