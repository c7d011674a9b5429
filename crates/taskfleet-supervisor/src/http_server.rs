//! HTTP server for the supervisor control plane.
//!
//! Binds a listener, mounts the control-plane routes with permissive CORS,
//! and serves until shutdown. Failure to bind surfaces as a `Transport`
//! error so the entry point can exit non-zero.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tracing::info;

use taskfleet_common::{FleetError, Result};

use crate::http_api;
use crate::supervisor::Supervisor;

/// HTTP front for a [`Supervisor`].
pub struct SupervisorServer {
    supervisor: Arc<Supervisor>,
}

impl SupervisorServer {
    pub fn new(supervisor: Arc<Supervisor>) -> Self {
        Self { supervisor }
    }

    /// Serve until the process is terminated.
    pub async fn run(self, addr: SocketAddr) -> Result<()> {
        self.run_with_shutdown(addr, std::future::pending()).await
    }

    /// Serve until `shutdown` resolves, then finish in-flight requests
    /// and return.
    pub async fn run_with_shutdown(
        self,
        addr: SocketAddr,
        shutdown: impl Future<Output = ()> + Send + 'static,
    ) -> Result<()> {
        let app = http_api::router(self.supervisor).layer(CorsLayer::permissive());

        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| FleetError::Transport(format!("Failed to bind to {}: {}", addr, e)))?;

        let local_addr = listener
            .local_addr()
            .map_err(|e| FleetError::Transport(format!("Failed to get local addr: {}", e)))?;
        info!("Supervisor control plane listening on {}", local_addr);

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown)
            .await
            .map_err(|e| FleetError::Transport(format!("Server error: {}", e)))?;

        Ok(())
    }
}
