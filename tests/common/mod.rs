//! Shared test harness for integration tests.
//!
//! Provides [`TestHarness`] which wires a full [`AppContext`] over a
//! temporary artifact root. The [`with_server`] constructor starts Axum on a
//! random port for HTTP-level testing.

use std::net::SocketAddr;

use clipforge::config::Config;
use clipforge::server::{create_router, AppContext};

/// Test harness wrapping a fully-constructed [`AppContext`] backed by a
/// temporary directory.
pub struct TestHarness {
    pub ctx: AppContext,
    _tmp: tempfile::TempDir,
}

impl TestHarness {
    /// Create a new harness with a custom configuration; the storage root is
    /// always redirected to a temp directory.
    pub fn with_config(mut config: Config) -> Self {
        let tmp = tempfile::tempdir().expect("failed to create temp dir");
        config.storage.root_dir = tmp.path().join("jobs");

        let ctx = AppContext::new(config).expect("failed to build app context");
        Self { ctx, _tmp: tmp }
    }

    /// Start an Axum server on a random port and return the harness together
    /// with the bound socket address.
    pub async fn with_server() -> (Self, SocketAddr) {
        Self::with_server_config(Config::default()).await
    }

    /// Start an Axum server with custom config on a random port.
    pub async fn with_server_config(config: Config) -> (Self, SocketAddr) {
        let harness = Self::with_config(config);
        let app = create_router(harness.ctx.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("failed to bind random port");
        let addr = listener.local_addr().expect("failed to get local addr");

        tokio::spawn(async move {
            axum::serve(listener, app).await.ok();
        });

        (harness, addr)
    }
}
