// SPDX-FileCopyrightText: 2026 Mailroom Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mail transports for the Mailroom campaign engine.
//!
//! [`SmtpTransport`] relays through an SMTP server with lettre and maps every
//! failure onto [`TransportError`]. [`LogTransport`] only logs, for dry runs
//! and deployments without a relay configured.

pub mod message;

use std::time::Duration;

use async_trait::async_trait;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Tokio1Executor};
use mailroom_config::SmtpConfig;
use mailroom_core::{
    AdapterType, HealthStatus, MailTransport, MailroomError, OutboundEmail, PluginAdapter,
    TransportError,
};
use tracing::{debug, info};

pub use message::build_message;

/// Reply codes that mean the mailbox itself is unusable.
const BOUNCE_CODES: [u16; 3] = [550, 551, 553];

/// SMTP relay transport.
pub struct SmtpTransport {
    inner: AsyncSmtpTransport<Tokio1Executor>,
    host: String,
}

impl SmtpTransport {
    /// Build a transport from the `[smtp]` section. The host must be set.
    pub fn from_config(config: &SmtpConfig) -> Result<Self, MailroomError> {
        let host = config
            .host
            .clone()
            .ok_or_else(|| MailroomError::Config("smtp.host is not set".to_string()))?;

        let builder = if config.starttls {
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&host).map_err(|e| {
                MailroomError::Transport {
                    message: format!("cannot set up STARTTLS relay to {host}"),
                    source: Some(Box::new(e)),
                }
            })?
        } else {
            AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&host)
        };
        let mut builder = builder
            .port(config.port)
            .timeout(Some(Duration::from_secs(config.timeout_secs)));
        if let (Some(user), Some(pass)) = (&config.username, &config.password) {
            builder = builder.credentials(Credentials::new(user.clone(), pass.clone()));
        }

        info!(host = %host, port = config.port, starttls = config.starttls, "smtp transport configured");
        Ok(Self {
            inner: builder.build(),
            host,
        })
    }
}

#[async_trait]
impl PluginAdapter for SmtpTransport {
    fn name(&self) -> &str {
        "smtp"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Transport
    }

    async fn health_check(&self) -> Result<HealthStatus, MailroomError> {
        Ok(match self.inner.test_connection().await {
            Ok(true) => HealthStatus::Healthy,
            Ok(false) => HealthStatus::Degraded(format!("{} did not accept NOOP", self.host)),
            Err(e) => HealthStatus::Unhealthy(format!("{}: {e}", self.host)),
        })
    }
}

#[async_trait]
impl MailTransport for SmtpTransport {
    async fn send(&self, email: &OutboundEmail) -> Result<(), TransportError> {
        let message = build_message(email)?;
        match self.inner.send(message).await {
            Ok(response) => {
                debug!(to = %email.to, code = %response.code(), "smtp accepted message");
                Ok(())
            }
            Err(e) => {
                let code = e.status().and_then(|c| c.to_string().parse::<u16>().ok());
                Err(classify(code, e.is_permanent(), e.to_string()))
            }
        }
    }
}

/// Map an SMTP failure onto the engine's retry classes.
///
/// Only permanent (5xx) replies are final; connection errors, timeouts, and
/// 4xx replies are worth another attempt.
pub fn classify(code: Option<u16>, permanent: bool, message: String) -> TransportError {
    match code {
        Some(code) if permanent && BOUNCE_CODES.contains(&code) => TransportError::Bounced(message),
        _ if permanent => TransportError::Rejected(message),
        _ => TransportError::Transient(message),
    }
}

/// A transport that logs every message and reports success.
#[derive(Debug, Clone, Default)]
pub struct LogTransport;

#[async_trait]
impl PluginAdapter for LogTransport {
    fn name(&self) -> &str {
        "log"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Transport
    }

    async fn health_check(&self) -> Result<HealthStatus, MailroomError> {
        Ok(HealthStatus::Healthy)
    }
}

#[async_trait]
impl MailTransport for LogTransport {
    async fn send(&self, email: &OutboundEmail) -> Result<(), TransportError> {
        // Build anyway so dry runs catch malformed addresses.
        build_message(email)?;
        info!(to = %email.to, subject = %email.subject, "dry run: message not sent");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification() {
        assert!(matches!(
            classify(Some(550), true, "no such user".into()),
            TransportError::Bounced(_)
        ));
        assert!(matches!(
            classify(Some(553), true, "mailbox name not allowed".into()),
            TransportError::Bounced(_)
        ));
        assert!(matches!(
            classify(Some(554), true, "policy".into()),
            TransportError::Rejected(_)
        ));
        assert!(matches!(
            classify(Some(421), false, "try later".into()),
            TransportError::Transient(_)
        ));
        assert!(matches!(
            classify(None, false, "connection refused".into()),
            TransportError::Transient(_)
        ));
    }

    #[test]
    fn missing_host_is_a_config_error() {
        let err = SmtpTransport::from_config(&SmtpConfig::default()).err().unwrap();
        assert!(matches!(err, MailroomError::Config(_)));
    }

    #[tokio::test]
    async fn log_transport_accepts_valid_and_rejects_malformed() {
        let mut email = OutboundEmail {
            to: "ada@example.com".into(),
            subject: "Hi".into(),
            body: "Body".into(),
            from_name: "Mailroom".into(),
            from_email: "news@example.com".into(),
            headers: Vec::new(),
        };
        LogTransport.send(&email).await.unwrap();
        email.to = "not an address".into();
        assert!(matches!(
            LogTransport.send(&email).await,
            Err(TransportError::Rejected(_))
        ));
    }
}
