//! Admin HTTP server
//!
//! Serves the mobile UI's control endpoints. CORS is fully open, matching the
//! page that calls it from arbitrary origins on the LAN.

use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use axum::http::Method;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};

use super::error::AdminError;
use super::host::HostActions;
use super::routes::{agent_mode, restart_ide, restart_proxy, stats, status};
use crate::config::AdminConfig;
use crate::shutdown::ShutdownSignal;
use crate::supervisor::SupervisorHandle;

/// Shared state for the handlers
#[derive(Clone)]
pub struct AdminState {
    pub supervisor: SupervisorHandle,
    pub host: Arc<dyn HostActions>,
}

pub struct AdminServer {
    addr: SocketAddr,
    state: AdminState,
}

impl AdminServer {
    pub fn new(config: &AdminConfig, state: AdminState) -> Result<Self, AdminError> {
        let ip: IpAddr = config.bind.parse().map_err(|_| AdminError::InvalidAddress {
            addr: config.bind.clone(),
        })?;
        Ok(Self {
            addr: SocketAddr::new(ip, config.port),
            state,
        })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn build_router(&self) -> Router {
        build_router(self.state.clone())
    }

    /// Serve until `shutdown` fires
    pub async fn serve(self, shutdown: ShutdownSignal) -> Result<(), AdminError> {
        let router = self.build_router();
        let listener = tokio::net::TcpListener::bind(self.addr)
            .await
            .map_err(|e| AdminError::BindFailed {
                reason: format!("{}: {}", self.addr, e),
            })?;

        tracing::info!(addr = %self.addr, "Admin server listening");

        axum::serve(listener, router)
            .with_graceful_shutdown(async move { shutdown.triggered().await })
            .await
            .map_err(|e| AdminError::Internal {
                reason: e.to_string(),
            })
    }
}

/// Router with all admin routes and the CORS layer
pub fn build_router(state: AdminState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers(Any);

    Router::new()
        .route("/api/stats", get(stats))
        .route("/api/status", get(status))
        .route("/api/restart-ide", post(restart_ide))
        .route("/api/agent-mode", post(agent_mode))
        .route("/api/restart-proxy", post(restart_proxy))
        .layer(cors)
        .with_state(state)
}
