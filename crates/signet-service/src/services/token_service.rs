//! Token issuance.
//!
//! Consumes a resolved policy, the mount configuration and a claim set, and
//! produces a compact signed JWT. Pure with respect to stored state: nothing
//! is mutated beyond the signature computation (key rotation, if due,
//! happens while resolving the policy).

use crate::backend::Backend;
use crate::crypto;
use crate::errors::BackendError;
use crate::models::{ClaimSet, ClaimValue, TokenResponse};
use crate::observability::metrics;
use crate::services::role_service;
use chrono::Utc;
use std::time::{Duration, Instant};
use tracing::instrument;

/// Issue a token for `role_name`.
///
/// `extra_claims` are caller-supplied freeform claims (the `sign/<role>`
/// surface); the role's configured claims override them on conflict, and
/// the computed `iss` and `exp` claims are set last.
#[instrument(skip_all, fields(role = role_name))]
pub async fn issue(
    backend: &Backend,
    role_name: &str,
    extra_claims: Option<ClaimSet>,
) -> Result<TokenResponse, BackendError> {
    let start = Instant::now();
    let result = issue_inner(backend, role_name, extra_claims).await;

    let status = if result.is_ok() { "success" } else { "error" };
    metrics::record_token_issuance(status, start.elapsed());

    result
}

async fn issue_inner(
    backend: &Backend,
    role_name: &str,
    extra_claims: Option<ClaimSet>,
) -> Result<TokenResponse, BackendError> {
    let role = role_service::read_role(backend, role_name)
        .await?
        .ok_or(BackendError::NotFound("role"))?;

    let config = backend.get_config().await?;
    let handle = backend.get_policy(&config).await?;

    // Role-specific TTL takes precedence over the mount-wide default.
    let ttl = role.token_ttl.unwrap_or(config.token_ttl);
    let expiry = Utc::now()
        .checked_add_signed(chrono_duration(ttl)?)
        .ok_or_else(|| BackendError::Validation("token TTL overflows".to_string()))?;

    let mut claims = extra_claims.unwrap_or_default();
    for (name, value) in role.claims {
        claims.insert(name, value);
    }
    claims.insert("iss".to_string(), ClaimValue::String(role.name.clone()));
    claims.insert("exp".to_string(), ClaimValue::Integer(expiry.timestamp()));

    let expected_key_type =
        crypto::key_type_for(config.signature_algorithm, config.rsa_key_bits)?;

    let (kid, sealed) = handle.with_read(|policy| {
        // A mismatch here means the policy was created under a different
        // algorithm and the forced rotation never ran. Fatal, not retried.
        if policy.key_type != expected_key_type {
            return Err(BackendError::Crypto(format!(
                "signature algorithm {} does not match policy key type {:?}",
                config.signature_algorithm, policy.key_type
            )));
        }

        let active = policy.active_version()?;
        Ok((
            crypto::key_id(backend.id(), &policy.name, active.version),
            active.key_material.clone(),
        ))
    })
    .await?;

    let key_material = crypto::open_key_material(&sealed, backend.master_key())?;
    let token = crypto::sign_claims(config.signature_algorithm, &kid, &key_material, &claims)?;

    Ok(TokenResponse {
        token,
        ttl: ttl.as_secs(),
    })
}

fn chrono_duration(duration: Duration) -> Result<chrono::Duration, BackendError> {
    chrono::Duration::from_std(duration)
        .map_err(|_| BackendError::Validation("token TTL out of range".to_string()))
}
