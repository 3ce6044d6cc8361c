//! Helpers that move stored key timestamps backwards.
//!
//! Rotation and pruning decisions compare stored creation times against the
//! wall clock; tests simulate the passage of time by backdating the stored
//! timestamps and invalidating the policy cache, rather than by mocking the
//! clock.

use anyhow::Context;
use signet_service::keyring::KeyPolicy;
use signet_service::storage::Storage;
use std::time::Duration;

/// Backdate the creation time of every version of `name` by `by`.
///
/// The caller must invalidate the policy cache afterwards (e.g. via
/// `Backend::invalidate("policy/<name>")`) so the next access observes the
/// rewritten timestamps.
pub async fn backdate_all(
    storage: &dyn Storage,
    name: &str,
    by: Duration,
) -> anyhow::Result<()> {
    let mut policy = KeyPolicy::load(storage, name)
        .await?
        .context("no policy stored")?;

    let delta = chrono::Duration::from_std(by)?;
    for version in policy.keys.values_mut() {
        version.creation_time -= delta;
    }

    policy.persist(storage).await?;
    Ok(())
}

/// Backdate the creation time of a single version of `name` by `by`.
pub async fn backdate_version(
    storage: &dyn Storage,
    name: &str,
    version: u32,
    by: Duration,
) -> anyhow::Result<()> {
    let mut policy = KeyPolicy::load(storage, name)
        .await?
        .context("no policy stored")?;

    let delta = chrono::Duration::from_std(by)?;
    let entry = policy
        .keys
        .get_mut(&version)
        .with_context(|| format!("no version {version}"))?;
    entry.creation_time -= delta;

    policy.persist(storage).await?;
    Ok(())
}
