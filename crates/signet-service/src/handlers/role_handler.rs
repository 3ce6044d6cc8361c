use crate::errors::BackendError;
use crate::handlers::config_handler::parse_duration;
use crate::handlers::AppState;
use crate::models::{ClaimSet, Role};
use crate::services::role_service;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Debug, Deserialize)]
pub struct RoleParams {
    /// Claims baked into every token issued for this role.
    pub claims: ClaimSet,
    /// Optional per-role TTL override (duration string).
    #[serde(default)]
    pub jwt_ttl: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct RoleResponse {
    pub name: String,
    pub claims: ClaimSet,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jwt_ttl: Option<String>,
}

impl From<Role> for RoleResponse {
    fn from(role: Role) -> Self {
        RoleResponse {
            name: role.name,
            claims: role.claims,
            jwt_ttl: role
                .token_ttl
                .map(|ttl| humantime::format_duration(ttl).to_string()),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct RoleListResponse {
    pub roles: Vec<String>,
}

/// Handle role create/update.
///
/// POST/PUT /roles/{name}
pub async fn handle_write_role(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    Json(params): Json<RoleParams>,
) -> Result<StatusCode, BackendError> {
    let token_ttl = params
        .jwt_ttl
        .as_deref()
        .map(|raw| parse_duration("jwt_ttl", raw))
        .transpose()?;

    role_service::write_role(&state.backend, &name, params.claims, token_ttl).await?;

    Ok(StatusCode::NO_CONTENT)
}

/// Handle role read.
///
/// GET /roles/{name}
pub async fn handle_read_role(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<Json<RoleResponse>, BackendError> {
    let role = role_service::read_role(&state.backend, &name)
        .await?
        .ok_or(BackendError::NotFound("role"))?;

    Ok(Json(role.into()))
}

/// Handle role delete. Deleting an absent role succeeds.
///
/// DELETE /roles/{name}
pub async fn handle_delete_role(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
) -> Result<StatusCode, BackendError> {
    role_service::delete_role(&state.backend, &name).await?;

    Ok(StatusCode::NO_CONTENT)
}

/// Handle role list.
///
/// GET /roles
pub async fn handle_list_roles(
    State(state): State<Arc<AppState>>,
) -> Result<Json<RoleListResponse>, BackendError> {
    let roles = role_service::list_roles(&state.backend).await?;

    Ok(Json(RoleListResponse { roles }))
}
