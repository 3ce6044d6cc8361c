//! External role registry: a best-effort mirror of role names into a vector
//! database, keyed by a keyword-indexed `role` payload field.
//!
//! The registry is consulted *before* the local role write commits (see
//! `services::role_service`), so the two stores never silently diverge. A
//! short fixed timeout bounds every outbound call — a slow registry can fail
//! a role operation but can never stall a rotation or prune in flight.

use crate::errors::BackendError;
use crate::models::MountConfig;
use async_trait::async_trait;
use serde_json::json;
use std::time::Duration;
use tracing::debug;
use uuid::Uuid;

/// Fixed collection that mirrors role names.
pub const ROLE_COLLECTION: &str = "sys_roles";

/// Bound on every outbound registry call.
pub const REGISTRY_TIMEOUT: Duration = Duration::from_secs(2);

#[async_trait]
pub trait RoleRegistry: Send + Sync {
    /// Upsert a point keyed by `role` into the role collection, creating the
    /// collection and its keyword index on first use.
    async fn upsert_role(&self, config: &MountConfig, role: &str) -> Result<(), BackendError>;

    /// Remove all points matching `role` from the role collection.
    async fn remove_role(&self, config: &MountConfig, role: &str) -> Result<(), BackendError>;
}

/// HTTP client for the vector database's REST API.
///
/// The base URL and API key come from the mount configuration at call time,
/// so a config rewrite takes effect without rebuilding the backend.
pub struct VectorRegistry {
    client: reqwest::Client,
}

impl VectorRegistry {
    pub fn new() -> Result<Self, BackendError> {
        let client = reqwest::Client::builder()
            .timeout(REGISTRY_TIMEOUT)
            .build()
            .map_err(|e| BackendError::Internal(format!("registry client init: {e}")))?;

        Ok(Self { client })
    }

    async fn collection_exists(&self, config: &MountConfig) -> Result<bool, BackendError> {
        let url = format!("{}/collections/{ROLE_COLLECTION}/exists", config.url);
        let response = self
            .client
            .get(&url)
            .header("api-key", &config.sign_key)
            .send()
            .await
            .map_err(registry_error)?;

        let body: serde_json::Value = check_status(response)
            .await?
            .json()
            .await
            .map_err(registry_error)?;

        Ok(body
            .pointer("/result/exists")
            .and_then(serde_json::Value::as_bool)
            .unwrap_or(false))
    }

    async fn create_collection(&self, config: &MountConfig) -> Result<(), BackendError> {
        let url = format!("{}/collections/{ROLE_COLLECTION}", config.url);
        let body = json!({
            "vectors": { "size": 1, "distance": "Dot", "on_disk": true }
        });

        let response = self
            .client
            .put(&url)
            .header("api-key", &config.sign_key)
            .json(&body)
            .send()
            .await
            .map_err(registry_error)?;

        check_status(response).await?;
        Ok(())
    }

    async fn ensure_role_index(&self, config: &MountConfig) -> Result<(), BackendError> {
        let url = format!("{}/collections/{ROLE_COLLECTION}/index", config.url);
        let body = json!({ "field_name": "role", "field_schema": "keyword" });

        let response = self
            .client
            .put(&url)
            .header("api-key", &config.sign_key)
            .json(&body)
            .send()
            .await
            .map_err(registry_error)?;

        check_status(response).await?;
        Ok(())
    }

    async fn delete_role_points(
        &self,
        config: &MountConfig,
        role: &str,
    ) -> Result<(), BackendError> {
        let url = format!(
            "{}/collections/{ROLE_COLLECTION}/points/delete?wait=true",
            config.url
        );
        let body = json!({
            "filter": {
                "should": [
                    { "key": "role", "match": { "value": role } }
                ]
            }
        });

        let response = self
            .client
            .post(&url)
            .header("api-key", &config.sign_key)
            .json(&body)
            .send()
            .await
            .map_err(registry_error)?;

        check_status(response).await?;
        Ok(())
    }

    async fn upsert_role_point(
        &self,
        config: &MountConfig,
        role: &str,
    ) -> Result<(), BackendError> {
        let url = format!(
            "{}/collections/{ROLE_COLLECTION}/points?wait=true",
            config.url
        );
        let body = json!({
            "points": [{
                "id": Uuid::new_v4().to_string(),
                "vector": [0.1],
                "payload": { "role": role }
            }]
        });

        let response = self
            .client
            .put(&url)
            .header("api-key", &config.sign_key)
            .json(&body)
            .send()
            .await
            .map_err(registry_error)?;

        check_status(response).await?;
        Ok(())
    }
}

#[async_trait]
impl RoleRegistry for VectorRegistry {
    async fn upsert_role(&self, config: &MountConfig, role: &str) -> Result<(), BackendError> {
        if !self.collection_exists(config).await? {
            debug!(collection = ROLE_COLLECTION, "creating role collection");
            self.create_collection(config).await?;
        }

        self.ensure_role_index(config).await?;

        // Replace rather than accumulate: a role rewrite keeps one point.
        self.delete_role_points(config, role).await?;
        self.upsert_role_point(config, role).await?;

        Ok(())
    }

    async fn remove_role(&self, config: &MountConfig, role: &str) -> Result<(), BackendError> {
        if self.collection_exists(config).await? {
            self.delete_role_points(config, role).await?;
        }

        Ok(())
    }
}

fn registry_error(e: reqwest::Error) -> BackendError {
    BackendError::Registry(e.to_string())
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, BackendError> {
    let status = response.status();
    if !status.is_success() {
        return Err(BackendError::Registry(format!(
            "registry returned {status}"
        )));
    }
    Ok(response)
}
