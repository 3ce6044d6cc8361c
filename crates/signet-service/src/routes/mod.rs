use crate::handlers::{config_handler, role_handler, token_handler, AppState};
use axum::{
    routing::{get, post},
    Router,
};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder, PrometheusHandle};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

/// Install the global Prometheus recorder and return its render handle.
///
/// Fails if a recorder is already installed in this process (tests spawning
/// several servers fall back to a standalone recorder).
pub fn init_metrics_recorder() -> Result<PrometheusHandle, BuildError> {
    PrometheusBuilder::new().install_recorder()
}

pub fn build_routes(state: Arc<AppState>, metrics_handle: PrometheusHandle) -> Router {
    Router::new()
        // Mount configuration
        .route(
            "/config",
            post(config_handler::handle_write_config)
                .put(config_handler::handle_write_config)
                .get(config_handler::handle_read_config)
                .delete(config_handler::handle_delete_config),
        )
        // Role CRUD
        .route("/roles", get(role_handler::handle_list_roles))
        .route(
            "/roles/:name",
            post(role_handler::handle_write_role)
                .put(role_handler::handle_write_role)
                .get(role_handler::handle_read_role)
                .delete(role_handler::handle_delete_role),
        )
        // Token issuance
        .route("/creds/:role", get(token_handler::handle_read_creds))
        .route("/sign/:role", post(token_handler::handle_sign))
        // Health check
        .route("/health", get(health_check))
        // Prometheus exposition
        .route(
            "/metrics",
            get(move || {
                let handle = metrics_handle.clone();
                async move { handle.render() }
            }),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health_check() -> &'static str {
    "OK"
}
