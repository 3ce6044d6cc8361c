use crate::backend::Backend;
use crate::crypto::SignatureAlgorithm;
use crate::errors::BackendError;
use crate::handlers::AppState;
use crate::models::MountConfig;
use axum::{extract::State, http::StatusCode, Json};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Wire parameters for the config write surface. Unspecified optional
/// fields fall back to the documented defaults.
#[derive(Deserialize)]
pub struct ConfigParams {
    pub url: String,
    pub sign_key: String,
    #[serde(default)]
    pub sig_alg: Option<SignatureAlgorithm>,
    #[serde(default)]
    pub rsa_key_bits: Option<u32>,
    /// How frequently a new key version is created (duration string).
    #[serde(default)]
    pub key_ttl: Option<String>,
    /// Duration a token is valid for, mapped to the `exp` claim.
    #[serde(default)]
    pub jwt_ttl: Option<String>,
}

impl fmt::Debug for ConfigParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConfigParams")
            .field("url", &self.url)
            .field("sign_key", &"[REDACTED]")
            .field("sig_alg", &self.sig_alg)
            .field("rsa_key_bits", &self.rsa_key_bits)
            .field("key_ttl", &self.key_ttl)
            .field("jwt_ttl", &self.jwt_ttl)
            .finish()
    }
}

impl ConfigParams {
    fn into_mount_config(self, backend: &Backend) -> Result<MountConfig, BackendError> {
        let mut config = MountConfig::default_for(backend.max_lease_ttl());

        config.url = self.url;
        config.sign_key = self.sign_key;

        if let Some(alg) = self.sig_alg {
            config.signature_algorithm = alg;
        }
        if let Some(bits) = self.rsa_key_bits {
            config.rsa_key_bits = bits;
        }
        if let Some(raw) = self.key_ttl.as_deref() {
            config.key_rotation_period = parse_duration("key_ttl", raw)?;
        }
        if let Some(raw) = self.jwt_ttl.as_deref() {
            config.token_ttl = parse_duration("jwt_ttl", raw)?;
        }

        Ok(config)
    }
}

pub(crate) fn parse_duration(field: &str, raw: &str) -> Result<Duration, BackendError> {
    humantime::parse_duration(raw)
        .map_err(|e| BackendError::Validation(format!("invalid {field} duration {raw:?}: {e}")))
}

/// Config read response. The sign key is a live registry credential and is
/// never echoed back.
#[derive(Debug, Serialize)]
pub struct ConfigResponse {
    pub url: String,
    pub sig_alg: SignatureAlgorithm,
    pub rsa_key_bits: u32,
    pub key_ttl: String,
    pub jwt_ttl: String,
}

impl From<MountConfig> for ConfigResponse {
    fn from(config: MountConfig) -> Self {
        ConfigResponse {
            url: config.url,
            sig_alg: config.signature_algorithm,
            rsa_key_bits: config.rsa_key_bits,
            key_ttl: humantime::format_duration(config.key_rotation_period).to_string(),
            jwt_ttl: humantime::format_duration(config.token_ttl).to_string(),
        }
    }
}

/// Handle config create/update.
///
/// POST/PUT /config
pub async fn handle_write_config(
    State(state): State<Arc<AppState>>,
    Json(params): Json<ConfigParams>,
) -> Result<StatusCode, BackendError> {
    let config = params.into_mount_config(&state.backend)?;
    state.backend.save_config(config).await?;

    Ok(StatusCode::NO_CONTENT)
}

/// Handle config read.
///
/// GET /config
pub async fn handle_read_config(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ConfigResponse>, BackendError> {
    let config = state
        .backend
        .read_config()
        .await?
        .ok_or(BackendError::NotFound("config"))?;

    Ok(Json(config.into()))
}

/// Handle config delete. Also deletes every role under the mount.
///
/// DELETE /config
pub async fn handle_delete_config(
    State(state): State<Arc<AppState>>,
) -> Result<StatusCode, BackendError> {
    state.backend.clear_config().await?;

    Ok(StatusCode::NO_CONTENT)
}
