// SPDX-FileCopyrightText: 2026 Mailroom Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Wiring shared by every subcommand: storage, transport, and the engine.

use std::sync::Arc;

use mailroom_config::{MailroomConfig, PrometheusConfig, SmtpConfig};
use mailroom_core::{MailTransport, MailroomError};
use mailroom_engine::Engine;
use mailroom_prometheus::PrometheusAdapter;
use mailroom_smtp::{LogTransport, SmtpTransport};
use mailroom_storage::Database;
use tracing::info;

/// An opened database with the engine built over it.
pub struct App {
    pub config: MailroomConfig,
    pub db: Database,
    pub engine: Engine,
}

impl App {
    pub async fn open(config: MailroomConfig) -> Result<Self, MailroomError> {
        let db = Database::open_with_config(&config.storage).await?;
        let transport = build_transport(&config.smtp)?;
        let engine = Engine::new(db.clone(), transport, &config);
        Ok(Self { config, db, engine })
    }

    pub async fn close(self) -> Result<(), MailroomError> {
        self.db.close().await
    }

    /// Accept either a recipient id or an email address.
    pub async fn resolve_recipient(&self, key: &str) -> Result<String, MailroomError> {
        if !key.contains('@') {
            return Ok(key.to_string());
        }
        self.engine
            .recipients
            .find_by_email(key)
            .await?
            .map(|r| r.id)
            .ok_or_else(|| MailroomError::not_found("recipient", key))
    }
}

/// The SMTP relay when a host is configured, otherwise the dry-run transport.
pub fn build_transport(config: &SmtpConfig) -> Result<Arc<dyn MailTransport>, MailroomError> {
    match config.host {
        Some(_) => Ok(Arc::new(SmtpTransport::from_config(config)?)),
        None => {
            info!("no SMTP host configured, messages will only be logged");
            Ok(Arc::new(LogTransport))
        }
    }
}

/// Install the global Prometheus recorder if enabled.
pub fn install_metrics(
    config: &PrometheusConfig,
) -> Result<Option<PrometheusAdapter>, MailroomError> {
    if !config.enabled {
        return Ok(None);
    }
    PrometheusAdapter::new().map(Some)
}
