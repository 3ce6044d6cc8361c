//! Role CRUD.
//!
//! Roles are thin storage records, but their writes are two-phase: the
//! external registry is updated first, and the local write commits only when
//! the registry call succeeded. On registry failure the local state is left
//! untouched and the error surfaces to the caller, so the two stores cannot
//! silently diverge.

use crate::backend::Backend;
use crate::errors::BackendError;
use crate::models::{ClaimSet, Role};
use crate::storage;
use std::time::Duration;
use tracing::debug;

pub const ROLE_PREFIX: &str = "role/";

fn role_path(name: &str) -> String {
    format!("{ROLE_PREFIX}{name}")
}

/// Create or update a role. Requires the mount to be configured — a role on
/// an unconfigured mount would be unusable and must not leave a storage
/// record behind.
pub async fn write_role(
    backend: &Backend,
    name: &str,
    claims: ClaimSet,
    token_ttl: Option<Duration>,
) -> Result<(), BackendError> {
    let config = backend
        .read_config()
        .await?
        .ok_or(BackendError::NotFound("config"))?;

    if let Some(ttl) = token_ttl {
        if ttl > backend.max_lease_ttl() {
            return Err(BackendError::Validation(format!(
                "jwt_ttl {} exceeds maximum lease TTL {}",
                humantime::format_duration(ttl),
                humantime::format_duration(backend.max_lease_ttl()),
            )));
        }
    }

    let role = Role {
        name: name.to_string(),
        claims,
        token_ttl,
    };

    // External mirror first; the local write commits only on success.
    backend.registry().upsert_role(&config, name).await?;

    storage::put_json(backend.storage(), &role_path(name), &role).await?;
    debug!(role = name, "role written");

    Ok(())
}

pub async fn read_role(backend: &Backend, name: &str) -> Result<Option<Role>, BackendError> {
    storage::get_json(backend.storage(), &role_path(name)).await
}

pub async fn list_roles(backend: &Backend) -> Result<Vec<String>, BackendError> {
    Ok(backend.storage().list(ROLE_PREFIX).await?)
}

/// Delete a role. Deleting an absent role is a no-op; otherwise the registry
/// entry is removed first and the local record only afterwards.
pub async fn delete_role(backend: &Backend, name: &str) -> Result<(), BackendError> {
    if read_role(backend, name).await?.is_none() {
        return Ok(());
    }

    let config = backend
        .read_config()
        .await?
        .ok_or(BackendError::NotFound("config"))?;

    backend.registry().remove_role(&config, name).await?;

    backend.storage().delete(&role_path(name)).await?;
    debug!(role = name, "role deleted");

    Ok(())
}
