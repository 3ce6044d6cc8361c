use crate::errors::BackendError;
use crate::handlers::AppState;
use crate::models::{ClaimSet, TokenResponse};
use crate::services::token_service;
use axum::{
    extract::{Path, State},
    Json,
};
use serde::Deserialize;
use std::sync::Arc;

#[derive(Debug, Deserialize, Default)]
pub struct SignParams {
    /// Freeform claims merged beneath the role's configured claims.
    #[serde(default)]
    pub claims: Option<ClaimSet>,
}

/// Handle credential read: issue a token carrying the role's claims.
///
/// GET /creds/{role}
pub async fn handle_read_creds(
    State(state): State<Arc<AppState>>,
    Path(role): Path<String>,
) -> Result<Json<TokenResponse>, BackendError> {
    let response = token_service::issue(&state.backend, &role, None).await?;

    Ok(Json(response))
}

/// Handle sign: issue a token over caller-supplied claims plus the role's
/// configured claims (role claims win on conflict).
///
/// POST /sign/{role}
pub async fn handle_sign(
    State(state): State<Arc<AppState>>,
    Path(role): Path<String>,
    Json(params): Json<SignParams>,
) -> Result<Json<TokenResponse>, BackendError> {
    let response = token_service::issue(&state.backend, &role, params.claims).await?;

    Ok(Json(response))
}
