//! Test server harness for E2E testing.
//!
//! Spawns the real router over an in-memory storage backend and a recording
//! registry double, bound to an ephemeral port.
//!
//! # Example
//! ```rust,ignore
//! #[tokio::test]
//! async fn test_token_flow_e2e() -> anyhow::Result<()> {
//!     let server = TestServer::spawn().await?;
//!     let client = reqwest::Client::new();
//!
//!     let response = client
//!         .get(format!("{}/creds/write", server.url()))
//!         .send()
//!         .await?;
//!
//!     assert_eq!(response.status(), 200);
//!     Ok(())
//! }
//! ```

use crate::crypto_fixtures::test_master_key;
use crate::registry_double::RecordingRegistry;
use signet_service::backend::Backend;
use signet_service::handlers::AppState;
use signet_service::routes;
use signet_service::storage::MemoryStorage;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// Default maximum lease TTL for test servers (32 days, the production
/// default).
pub const TEST_MAX_LEASE_TTL: Duration = Duration::from_secs(32 * 24 * 3600);

pub struct TestServer {
    addr: SocketAddr,
    storage: Arc<MemoryStorage>,
    backend: Arc<Backend>,
    registry: Arc<RecordingRegistry>,
    _handle: JoinHandle<()>,
}

impl TestServer {
    /// Spawn a test server on `127.0.0.1:0` with the default max lease TTL.
    pub async fn spawn() -> anyhow::Result<Self> {
        Self::spawn_with_max_lease(TEST_MAX_LEASE_TTL).await
    }

    /// Spawn a test server with a specific max lease TTL.
    pub async fn spawn_with_max_lease(max_lease_ttl: Duration) -> anyhow::Result<Self> {
        let storage = Arc::new(MemoryStorage::new());
        let registry = Arc::new(RecordingRegistry::new());

        let backend = Arc::new(Backend::new(
            "test-backend",
            Arc::clone(&storage) as Arc<dyn signet_service::storage::Storage>,
            Arc::clone(&registry) as Arc<dyn signet_service::registry::RoleRegistry>,
            test_master_key(),
            max_lease_ttl,
        ));

        // Metrics recorder: install once per process; later servers fall
        // back to a standalone recorder.
        let metrics_handle = match routes::init_metrics_recorder() {
            Ok(handle) => handle,
            Err(_) => {
                use metrics_exporter_prometheus::PrometheusBuilder;
                PrometheusBuilder::new().build_recorder().handle()
            }
        };

        let state = Arc::new(AppState {
            backend: Arc::clone(&backend),
        });
        let app = routes::build_routes(state, metrics_handle);

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;

        let handle = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app.into_make_service()).await {
                eprintln!("Test server error: {e}");
            }
        });

        Ok(Self {
            addr,
            storage,
            backend,
            registry,
            _handle: handle,
        })
    }

    /// Base URL of the running server.
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// The storage backend underneath the server.
    pub fn storage(&self) -> &MemoryStorage {
        &self.storage
    }

    /// The backend instance (for invalidation and direct lifecycle calls).
    pub fn backend(&self) -> &Backend {
        &self.backend
    }

    /// The recording registry double.
    pub fn registry(&self) -> &RecordingRegistry {
        &self.registry
    }

    /// The fixed test master key this server seals key material with.
    pub fn master_key(&self) -> Vec<u8> {
        test_master_key()
    }
}
