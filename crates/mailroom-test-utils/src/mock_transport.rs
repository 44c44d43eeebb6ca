// SPDX-FileCopyrightText: 2026 Mailroom Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock mail transport for deterministic testing.
//!
//! `MockTransport` implements `MailTransport` with outcomes scripted per
//! recipient address. Unscripted addresses succeed. Every accepted message is
//! captured for assertions.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use mailroom_core::{
    AdapterType, HealthStatus, MailTransport, MailroomError, OutboundEmail, PluginAdapter,
    TransportError,
};

#[derive(Debug, Clone)]
enum Script {
    /// Fail transiently this many more times, then succeed.
    Transient(u32),
    Rejected(String),
    Bounced(String),
}

#[derive(Debug, Default)]
struct State {
    scripts: HashMap<String, Script>,
    sent: Vec<OutboundEmail>,
    attempts: HashMap<String, usize>,
    delay: Option<Duration>,
}

/// A scripted mail transport. Clones share state.
#[derive(Debug, Clone, Default)]
pub struct MockTransport {
    state: Arc<Mutex<State>>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Fail the next `times` sends to `address` with a transient error.
    pub fn fail_transiently(&self, address: &str, times: u32) {
        self.state()
            .scripts
            .insert(address.to_string(), Script::Transient(times));
    }

    /// Reject every send to `address`.
    pub fn fail_permanently(&self, address: &str, reason: &str) {
        self.state()
            .scripts
            .insert(address.to_string(), Script::Rejected(reason.to_string()));
    }

    /// Report every send to `address` as a bounce.
    pub fn bounce(&self, address: &str, reason: &str) {
        self.state()
            .scripts
            .insert(address.to_string(), Script::Bounced(reason.to_string()));
    }

    /// Sleep this long inside every send.
    pub fn set_delay(&self, delay: Duration) {
        self.state().delay = Some(delay);
    }

    /// Messages accepted so far, in send order.
    pub fn sent(&self) -> Vec<OutboundEmail> {
        self.state().sent.clone()
    }

    /// Accepted messages addressed to `address`.
    pub fn sent_to(&self, address: &str) -> usize {
        self.state().sent.iter().filter(|m| m.to == address).count()
    }

    /// Send attempts made for `address`, successful or not.
    pub fn attempts(&self, address: &str) -> usize {
        self.state().attempts.get(address).copied().unwrap_or(0)
    }
}

#[async_trait]
impl PluginAdapter for MockTransport {
    fn name(&self) -> &str {
        "mock-transport"
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
impl MailTransport for MockTransport {
    async fn send(&self, email: &OutboundEmail) -> Result<(), TransportError> {
        let delay = {
            let mut state = self.state();
            *state.attempts.entry(email.to.clone()).or_default() += 1;
            state.delay
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.state();
        let outcome = match state.scripts.get_mut(&email.to) {
            Some(Script::Transient(remaining)) if *remaining > 0 => {
                *remaining -= 1;
                Err(TransportError::Transient("421 service not available".into()))
            }
            Some(Script::Rejected(reason)) => Err(TransportError::Rejected(reason.clone())),
            Some(Script::Bounced(reason)) => Err(TransportError::Bounced(reason.clone())),
            _ => Ok(()),
        };
        if outcome.is_ok() {
            state.sent.push(email.clone());
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn email(to: &str) -> OutboundEmail {
        OutboundEmail {
            to: to.to_string(),
            subject: "s".into(),
            body: "b".into(),
            from_name: "Mailroom".into(),
            from_email: "news@example.com".into(),
            headers: Vec::new(),
        }
    }

    #[tokio::test]
    async fn unscripted_addresses_succeed() {
        let transport = MockTransport::new();
        transport.send(&email("a@x.com")).await.unwrap();
        assert_eq!(transport.sent_to("a@x.com"), 1);
        assert_eq!(transport.attempts("a@x.com"), 1);
    }

    #[tokio::test]
    async fn transient_script_runs_out() {
        let transport = MockTransport::new();
        transport.fail_transiently("a@x.com", 1);
        assert!(transport.send(&email("a@x.com")).await.unwrap_err().is_transient());
        transport.send(&email("a@x.com")).await.unwrap();
        assert_eq!(transport.attempts("a@x.com"), 2);
        assert_eq!(transport.sent().len(), 1);
    }

    #[tokio::test]
    async fn permanent_scripts_never_accept() {
        let transport = MockTransport::new();
        transport.fail_permanently("r@x.com", "553");
        transport.bounce("b@x.com", "550");
        assert!(matches!(
            transport.send(&email("r@x.com")).await,
            Err(TransportError::Rejected(_))
        ));
        assert!(matches!(
            transport.send(&email("b@x.com")).await,
            Err(TransportError::Bounced(_))
        ));
        assert!(transport.sent().is_empty());
    }
}
