// SPDX-FileCopyrightText: 2026 Mailroom Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the Mailroom campaign engine.

use thiserror::Error;

use crate::types::CampaignStatus;

/// The primary error type used across all Mailroom crates.
#[derive(Debug, Error)]
pub enum MailroomError {
    /// Configuration errors (invalid TOML, missing required fields, type mismatches).
    #[error("configuration error: {0}")]
    Config(String),

    /// Storage backend errors (database connection, query failure, migration).
    #[error("storage error: {source}")]
    Storage {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Input rejected at the API boundary (malformed email, missing campaign field).
    #[error("invalid {field}: {message}")]
    Validation { field: String, message: String },

    /// A referenced entity does not exist.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// A campaign status change outside the legal edge set, or a conditional
    /// transition whose expected source state no longer holds.
    #[error("campaign {campaign_id}: illegal transition {from} -> {to}")]
    InvalidStateTransition {
        campaign_id: String,
        from: CampaignStatus,
        to: CampaignStatus,
    },

    /// A uniqueness constraint would be violated (e.g. restoring a recipient
    /// whose email has been re-registered).
    #[error("conflict: {0}")]
    Conflict(String),

    /// Mail transport setup or connectivity failure (not a per-message outcome).
    #[error("transport error: {message}")]
    Transport {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Operation timed out.
    #[error("operation timed out after {duration:?}")]
    Timeout { duration: std::time::Duration },

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl MailroomError {
    /// Shorthand for a [`MailroomError::Validation`].
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Shorthand for a [`MailroomError::NotFound`].
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity,
            id: id.into(),
        }
    }

    /// Returns `true` for errors the caller can treat as a rejected request
    /// rather than a system fault.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::Validation { .. }
                | Self::NotFound { .. }
                | Self::InvalidStateTransition { .. }
                | Self::Conflict(_)
        )
    }
}

/// Per-message outcome reported by a [`MailTransport`](crate::MailTransport).
///
/// Transient failures may be retried within the same delivery run; rejected
/// and bounced messages are final.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    /// Timeout, connection refused, 4xx reply: worth another attempt.
    #[error("transient failure: {0}")]
    Transient(String),

    /// Permanent rejection that is not a bounce (malformed address, policy, auth).
    #[error("rejected: {0}")]
    Rejected(String),

    /// The receiving side reported the mailbox as permanently undeliverable.
    #[error("bounced: {0}")]
    Bounced(String),
}

impl TransportError {
    /// Returns `true` if the send may be retried.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }

    /// Returns `true` if this failure must never be retried.
    #[must_use]
    pub const fn is_permanent(&self) -> bool {
        !self.is_transient()
    }
}
