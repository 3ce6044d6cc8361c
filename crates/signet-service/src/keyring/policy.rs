//! Versioned signing-key policy.
//!
//! A policy is an ordered set of key versions with a creation time each.
//! Rotation appends a version; pruning advances the minimum-retained
//! boundary and discards versions that can no longer be needed to verify any
//! still-valid token. The whole policy is persisted as a single JSON blob at
//! one storage path, which is what makes multi-field mutations atomic on a
//! per-key-atomic store.

use crate::crypto::{self, EncryptedKeyMaterial, KeyType};
use crate::errors::BackendError;
use crate::storage::{self, Storage};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

pub const POLICY_PREFIX: &str = "policy/";

/// One generation of signing key material.
///
/// Immutable once created; destroyed only by pruning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyVersion {
    pub version: u32,
    pub creation_time: DateTime<Utc>,
    pub key_material: EncryptedKeyMaterial,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyPolicy {
    pub name: String,
    pub key_type: KeyType,
    pub latest_version: u32,
    pub min_available_version: u32,
    pub min_decryption_version: u32,
    pub keys: BTreeMap<u32, KeyVersion>,
}

impl KeyPolicy {
    pub fn storage_path(name: &str) -> String {
        format!("{POLICY_PREFIX}{name}")
    }

    /// Create a new policy with version 1 generated and sealed.
    pub fn initialize(
        name: &str,
        key_type: KeyType,
        master_key: &[u8],
    ) -> Result<Self, BackendError> {
        let mut policy = KeyPolicy {
            name: name.to_string(),
            key_type,
            latest_version: 0,
            min_available_version: 0,
            min_decryption_version: 1,
            keys: BTreeMap::new(),
        };
        policy.add_version(master_key)?;
        Ok(policy)
    }

    /// The version currently used for new signatures.
    pub fn active_version(&self) -> Result<&KeyVersion, BackendError> {
        self.keys.get(&self.latest_version).ok_or_else(|| {
            BackendError::Lifecycle(format!(
                "policy {} has no key material for latest version {}",
                self.name, self.latest_version
            ))
        })
    }

    /// Generate and seal key material for `latest_version + 1` and make it
    /// the latest. Does not touch the minimum boundaries: older versions
    /// stay available for verification until pruned.
    pub fn add_version(&mut self, master_key: &[u8]) -> Result<u32, BackendError> {
        let material = crypto::generate_key_material(self.key_type)?;
        let sealed = crypto::seal_key_material(&material, master_key)?;

        let version = self.latest_version + 1;
        self.keys.insert(
            version,
            KeyVersion {
                version,
                creation_time: Utc::now(),
                key_material: sealed,
            },
        );
        self.latest_version = version;

        Ok(version)
    }

    /// Whether the latest version has aged past the rotation period.
    ///
    /// A policy whose latest version is missing reports not-due; that state
    /// is caught by [`validate`](Self::validate) instead.
    pub fn is_rotation_due(&self, rotation_period: Duration, now: DateTime<Utc>) -> bool {
        let Some(latest) = self.keys.get(&self.latest_version) else {
            return false;
        };

        match latest
            .creation_time
            .checked_add_signed(chrono_duration(rotation_period))
        {
            Some(rotate_at) => rotate_at <= now,
            None => false,
        }
    }

    /// Scan versions upward from the current boundary and return the first
    /// version still needed for verification (or `latest_version`).
    ///
    /// A version `v < latest_version` is expired once
    /// `creation_time + rotation_period + token_ttl <= now`: it stopped
    /// signing at `creation_time + rotation_period`, and even the
    /// longest-lived token it signed has expired after a further `token_ttl`.
    pub fn prune_boundary(
        &self,
        rotation_period: Duration,
        token_ttl: Duration,
        now: DateTime<Utc>,
    ) -> u32 {
        let mut version = self.min_available_version.max(1);

        while version < self.latest_version {
            let Some(key_version) = self.keys.get(&version) else {
                // Hole below the retained range: already pruned.
                version += 1;
                continue;
            };

            match key_expires_at(key_version, rotation_period, token_ttl) {
                Some(expires_at) if expires_at <= now => version += 1,
                _ => break,
            }
        }

        version
    }

    /// Check the structural invariants:
    /// `min_available_version <= min_decryption_version <= latest_version`,
    /// and every version in `[max(min_available_version, 1), latest_version]`
    /// present in the key map.
    pub fn validate(&self) -> Result<(), BackendError> {
        if self.min_available_version > self.min_decryption_version
            || self.min_decryption_version > self.latest_version
        {
            return Err(BackendError::Lifecycle(format!(
                "policy {} has inconsistent version boundaries: min-available={}, min-decryption={}, latest={}",
                self.name,
                self.min_available_version,
                self.min_decryption_version,
                self.latest_version
            )));
        }

        for version in self.min_available_version.max(1)..=self.latest_version {
            if !self.keys.contains_key(&version) {
                return Err(BackendError::Lifecycle(format!(
                    "policy {} is missing key material for version {version}",
                    self.name
                )));
            }
        }

        Ok(())
    }

    pub async fn load(
        storage: &dyn Storage,
        name: &str,
    ) -> Result<Option<Self>, BackendError> {
        let policy: Option<KeyPolicy> =
            storage::get_json(storage, &Self::storage_path(name)).await?;

        if let Some(ref policy) = policy {
            policy.validate()?;
        }

        Ok(policy)
    }

    pub async fn persist(&self, storage: &dyn Storage) -> Result<(), BackendError> {
        storage::put_json(storage, &Self::storage_path(&self.name), self).await
    }
}

fn key_expires_at(
    key_version: &KeyVersion,
    rotation_period: Duration,
    token_ttl: Duration,
) -> Option<DateTime<Utc>> {
    key_version
        .creation_time
        .checked_add_signed(chrono_duration(rotation_period))?
        .checked_add_signed(chrono_duration(token_ttl))
}

/// Convert a std duration to a chrono one, saturating on overflow. The
/// checked additions above treat saturated values as "never".
fn chrono_duration(duration: Duration) -> chrono::Duration {
    chrono::Duration::from_std(duration).unwrap_or(chrono::Duration::MAX)
}
