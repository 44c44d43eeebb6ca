// SPDX-FileCopyrightText: 2026 Mailroom Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Gateway HTTP server built on axum.
//!
//! Sets up routes, middleware, and shared state for the tracking endpoints.

use std::future::Future;
use std::sync::Arc;

use axum::Router;
use axum::routing::get;
use mailroom_core::MailroomError;
use mailroom_engine::TrackingResolver;
use mailroom_storage::Database;
use tower_http::trace::TraceLayer;

use crate::handlers;

/// Health state for unauthenticated health/metrics endpoints.
#[derive(Clone)]
pub struct HealthState {
    /// Process start time for uptime calculation.
    pub start_time: std::time::Instant,
    /// Optional Prometheus metrics render function.
    pub prometheus_render: Option<Arc<dyn Fn() -> String + Send + Sync>>,
}

/// Shared state for axum request handlers.
#[derive(Clone)]
pub struct GatewayState {
    pub tracking: TrackingResolver,
    /// Probed by `/health`.
    pub db: Database,
    /// Text shown on the unsubscribe page.
    pub unsubscribe_message: String,
    pub health: HealthState,
}

/// Address the gateway binds to.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// All gateway routes over `state`.
///
/// - GET /track/open/{token}
/// - GET /track/click/{token}?url=...
/// - GET, POST /track/unsubscribe/{token}
/// - GET /health, GET /metrics
pub fn router(state: GatewayState) -> Router {
    Router::new()
        .route("/track/open/{token}", get(handlers::track_open))
        .route("/track/click/{token}", get(handlers::track_click))
        .route(
            "/track/unsubscribe/{token}",
            get(handlers::track_unsubscribe).post(handlers::track_unsubscribe),
        )
        .route("/health", get(handlers::get_health))
        .route("/metrics", get(handlers::get_metrics))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve the gateway until `shutdown` resolves.
pub async fn start_server(
    config: &ServerConfig,
    state: GatewayState,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<(), MailroomError> {
    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| MailroomError::Transport {
            message: format!("failed to bind tracking gateway to {addr}: {e}"),
            source: Some(Box::new(e)),
        })?;

    tracing::info!("Tracking gateway listening on {addr}");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| MailroomError::Transport {
            message: format!("tracking gateway error: {e}"),
            source: Some(Box::new(e)),
        })?;

    Ok(())
}
