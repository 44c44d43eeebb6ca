// SPDX-FileCopyrightText: 2026 Mailroom Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mail transport trait consumed by the delivery engine.

use async_trait::async_trait;

use crate::error::TransportError;
use crate::traits::adapter::PluginAdapter;

/// A fully rendered message ready for the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundEmail {
    pub to: String,
    pub subject: String,
    pub body: String,
    pub from_name: String,
    pub from_email: String,
    /// Extra headers (e.g. `List-Unsubscribe`).
    pub headers: Vec<(String, String)>,
}

/// Adapter for the outbound mail system.
///
/// Implementations must classify every failure: the delivery engine retries
/// [`TransportError::Transient`] and records everything else as final.
#[async_trait]
pub trait MailTransport: PluginAdapter {
    /// Sends one message.
    async fn send(&self, email: &OutboundEmail) -> Result<(), TransportError>;
}
