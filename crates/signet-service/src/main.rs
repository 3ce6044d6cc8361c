use signet_service::backend::Backend;
use signet_service::config::Config;
use signet_service::handlers::AppState;
use signet_service::registry::VectorRegistry;
use signet_service::routes;
use signet_service::services::rotation_service;
use signet_service::storage::MemoryStorage;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "signet_service=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Signet");

    // Load configuration
    let config = Config::from_env().map_err(|e| {
        error!("Failed to load configuration: {}", e);
        e
    })?;

    info!("Configuration loaded successfully");

    // Storage backend. The in-memory store is the reference implementation;
    // a deployment substitutes its durable store behind the same trait.
    let storage = Arc::new(MemoryStorage::new());

    let registry = Arc::new(VectorRegistry::new().map_err(|e| {
        error!("Failed to build registry client: {}", e);
        e
    })?);

    let backend = Arc::new(Backend::new(
        config.backend_id.clone(),
        storage,
        registry,
        config.master_key.clone(),
        config.max_lease_ttl,
    ));

    // Materialize the default mount configuration so the first periodic
    // tick can create the signing policy eagerly.
    backend.initialize().await.map_err(|e| {
        error!("Failed to initialize backend: {}", e);
        e
    })?;

    info!("Backend initialized");

    // Install the metrics recorder before the first request.
    let metrics_handle = routes::init_metrics_recorder().map_err(|e| {
        error!("Failed to install metrics recorder: {}", e);
        e
    })?;

    // Periodic key maintenance (rotate if due, then prune).
    rotation_service::spawn(Arc::clone(&backend), config.rotation_check_interval);

    // Create application state
    let state = Arc::new(AppState { backend });

    // Build application routes
    let app = routes::build_routes(state, metrics_handle);

    // Parse bind address
    let addr: SocketAddr = config.bind_address.parse().map_err(|e| {
        error!("Invalid bind address: {}", e);
        e
    })?;

    info!("Signet listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app.into_make_service()).await?;

    Ok(())
}
