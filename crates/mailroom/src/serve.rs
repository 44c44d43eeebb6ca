// SPDX-FileCopyrightText: 2026 Mailroom Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `mailroom serve` command implementation.
//!
//! Runs the tracking gateway (open pixel, click redirect, unsubscribe page,
//! health and metrics) until SIGINT or SIGTERM. Delivery is not driven from
//! here; `mailroom tick` does that from an external timer.

use std::sync::Arc;
use std::time::Instant;

use mailroom_config::MailroomConfig;
use mailroom_core::MailroomError;
use mailroom_engine::TrackingResolver;
use mailroom_gateway::{GatewayState, HealthState, ServerConfig, start_server};
use mailroom_storage::Database;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::app::install_metrics;

/// Runs the `mailroom serve` command.
pub async fn run_serve(config: MailroomConfig) -> Result<(), MailroomError> {
    let prometheus = install_metrics(&config.prometheus)?;
    let db = Database::open_with_config(&config.storage).await?;

    let prometheus_render = prometheus.map(|adapter| {
        Arc::new(move || adapter.render()) as Arc<dyn Fn() -> String + Send + Sync>
    });
    let state = GatewayState {
        tracking: TrackingResolver::new(db.clone())
            .with_strict_redirects(config.tracking.strict_redirects),
        db: db.clone(),
        unsubscribe_message: config.tracking.unsubscribe_message.clone(),
        health: HealthState {
            start_time: Instant::now(),
            prometheus_render,
        },
    };
    let server = ServerConfig {
        host: config.tracking.bind_address.clone(),
        port: config.tracking.port,
    };

    info!(
        service = %config.service.name,
        public_base_url = %config.tracking.public_base_url,
        "starting tracking gateway"
    );
    let cancel = install_signal_handler();
    let result = start_server(&server, state, async move { cancel.cancelled().await }).await;

    db.close().await?;
    info!("tracking gateway stopped");
    result
}

/// Installs handlers for SIGTERM and SIGINT.
///
/// Returns a [`CancellationToken`] that is cancelled when either signal is received.
fn install_signal_handler() -> CancellationToken {
    let token = CancellationToken::new();
    let token_clone = token.clone();

    tokio::spawn(async move {
        let ctrl_c = tokio::signal::ctrl_c();

        #[cfg(unix)]
        {
            use tokio::signal::unix::{SignalKind, signal};
            match signal(SignalKind::terminate()) {
                Ok(mut sigterm) => {
                    tokio::select! {
                        _ = ctrl_c => {
                            info!("received SIGINT (Ctrl+C), initiating shutdown");
                        }
                        _ = sigterm.recv() => {
                            info!("received SIGTERM, initiating shutdown");
                        }
                    }
                }
                Err(e) => {
                    warn!(
                        error = %e,
                        "failed to install SIGTERM handler, only Ctrl+C stops the server"
                    );
                    let _ = ctrl_c.await;
                    info!("received SIGINT (Ctrl+C), initiating shutdown");
                }
            }
        }

        #[cfg(not(unix))]
        {
            let _ = ctrl_c.await;
            info!("received Ctrl+C, initiating shutdown");
        }

        token_clone.cancel();
        debug!("shutdown signal handler completed");
    });

    token
}
