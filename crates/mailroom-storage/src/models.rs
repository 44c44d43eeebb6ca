// SPDX-FileCopyrightText: 2026 Mailroom Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Storage-level records and operation outcomes.
//!
//! The domain records live in `mailroom-core`; this module re-exports them
//! and adds the outcome types of multi-step writes, which report "nothing
//! matched" or "constraint would be violated" as data rather than errors.

pub use mailroom_core::model::{
    ArchivedRecipient, ArchivedSendLedgerEntry, Campaign, Recipient, SendLedgerEntry,
};

use chrono::{DateTime, Utc};
use mailroom_core::SendStatus;

/// Result of a recipient row update.
#[derive(Debug, Clone, PartialEq)]
pub enum UpdateOutcome {
    Updated,
    NotFound,
    /// Another live recipient already owns the new email.
    EmailTaken,
}

/// Result of attaching recipients to a campaign.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttachOutcome {
    /// Number of memberships newly created.
    Attached(usize),
    CampaignNotFound,
    /// Nothing was attached; this id does not name a live recipient.
    UnknownRecipient(String),
}

/// Result of moving an archived recipient back into the live tables.
#[derive(Debug, Clone, PartialEq)]
pub enum RestoreOutcome {
    Restored(Recipient),
    NotFound,
    AlreadyRestored,
    EmailTaken,
}

/// Result of a tracking callback against the ledger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackOutcome {
    /// No ledger row carries this token.
    UnknownToken,
    /// First event of its kind; the campaign counter was bumped.
    First { campaign_id: String },
    /// Repeat event; only the event counter moved.
    Repeat { campaign_id: String },
}

/// A recipient due for delivery in one sub-batch, with its ledger row if one
/// was left `pending` by an earlier interrupted run.
#[derive(Debug, Clone, PartialEq)]
pub struct DeliveryCandidate {
    pub recipient: Recipient,
    pub pending_send_id: Option<String>,
}

/// A delivery run's hold on the pending ledger rows it sends.
///
/// The expiry must outlast one send including its retries, so a row is never
/// handed to a second run while the first may still be talking to the relay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendClaim {
    pub owner: String,
    pub expires_at: DateTime<Utc>,
}

/// What [`ensure_pending`](crate::queries::ledger::ensure_pending) found.
#[derive(Debug, Clone, PartialEq)]
pub enum PendingClaim {
    /// The row is pending and held by the caller.
    Claimed(SendLedgerEntry),
    /// The row already reached a final status.
    Settled,
    /// Another run holds a live claim on the row.
    Held,
    /// The recipient was deleted after the candidate list was read.
    RecipientGone,
}

/// Final outcome written to a pending ledger row.
#[derive(Debug, Clone, PartialEq)]
pub struct SendOutcome {
    pub status: SendStatus,
    pub attempts: i64,
    pub last_error: Option<String>,
    pub at: DateTime<Utc>,
}
