//! HTTP gateway server.

use crate::error::GatewayError;
use crate::handlers;
use crate::Result;
use axum::http::HeaderMap;
use axum::routing::{get, post};
use axum::Router;
use secrecy::ExposeSecret;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use wabridge_bridge::BridgeEngine;
use wabridge_core::config::{BindMode, GatewayConfig};
use wabridge_core::Config;

/// Shared handler state.
pub struct GatewayState {
    /// Bridge engine.
    pub engine: Arc<BridgeEngine>,

    /// Gateway configuration.
    pub config: GatewayConfig,

    /// Default cleanup age in days.
    pub retention_days: u32,

    /// Server start time.
    pub started_at: Instant,
}

impl GatewayState {
    /// Check the bearer token when one is configured.
    pub(crate) fn authorize(&self, headers: &HeaderMap) -> Result<()> {
        let Some(expected) = self.config.auth_token.as_ref() else {
            return Ok(());
        };

        let token = headers
            .get("authorization")
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "));

        match token {
            Some(token) if token == expected.expose_secret() => Ok(()),
            Some(_) => Err(GatewayError::Auth("Invalid authentication token".to_string())),
            None => Err(GatewayError::Auth("Authentication required".to_string())),
        }
    }
}

/// The HTTP gateway.
pub struct Gateway {
    state: Arc<GatewayState>,
}

impl Gateway {
    /// Create a gateway serving `engine`.
    pub fn new(config: &Config, engine: Arc<BridgeEngine>) -> Self {
        let state = Arc::new(GatewayState {
            engine,
            config: config.gateway.clone(),
            retention_days: config.bridge.retention_days,
            started_at: Instant::now(),
        });
        Self { state }
    }

    pub fn state(&self) -> &Arc<GatewayState> {
        &self.state
    }

    /// Build the router.
    pub fn router(&self) -> Router {
        Router::new()
            .route("/health", get(handlers::health))
            .route("/webhook/:session_id", post(handlers::webhook))
            .route("/sessions/:session_id/inbound", post(handlers::inbound))
            .route("/sessions/:session_id/stats", get(handlers::stats))
            .route("/sessions/:session_id/failed", get(handlers::failed))
            .route("/sessions/:session_id/retry", post(handlers::retry))
            .route(
                "/sessions/:session_id/mappings/:mapping_id/resync",
                post(handlers::resync),
            )
            .route("/sessions/:session_id/cleanup", post(handlers::cleanup))
            .layer(TraceLayer::new_for_http())
            .with_state(self.state.clone())
    }

    /// Address derived from the bind mode and port.
    pub fn bind_address(&self) -> SocketAddr {
        let ip = match self.state.config.bind {
            BindMode::Loopback => [127, 0, 0, 1],
            BindMode::Lan => [0, 0, 0, 0],
        };
        SocketAddr::from((ip, self.state.config.port))
    }

    /// Run until the process is stopped.
    pub async fn run(&self) -> Result<()> {
        self.run_until(std::future::pending()).await
    }

    /// Run until `shutdown` completes.
    pub async fn run_until<F>(&self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = self.bind_address();

        if self.state.config.bind != BindMode::Loopback && self.state.config.auth_token.is_none() {
            warn!("Gateway bound to {} without an auth token; admin routes are open", addr);
        }

        let listener = tokio::net::TcpListener::bind(addr).await?;
        info!("Starting gateway on {}", addr);

        axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown)
            .await
            .map_err(|e| GatewayError::Internal(e.to_string()))?;

        info!("Gateway stopped");
        Ok(())
    }
}
