// SPDX-FileCopyrightText: 2026 Mailroom Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Closed status enums shared across the engine.
//!
//! Every status is stored as its snake_case string form; parsing goes through
//! [`std::str::FromStr`] so an unknown value read back from the database is an
//! error rather than a silently coerced state.

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

/// Health status reported by adapter health checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthStatus {
    /// Adapter is fully operational.
    Healthy,
    /// Adapter is operational but experiencing issues.
    Degraded(String),
    /// Adapter is not operational.
    Unhealthy(String),
}

/// Identifies the kind of adapter behind a [`PluginAdapter`](crate::PluginAdapter).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
pub enum AdapterType {
    Storage,
    Transport,
    Observability,
}

/// Lifecycle state of a campaign.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Display,
    EnumString,
    AsRefStr,
    Serialize,
    Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum CampaignStatus {
    Draft,
    Scheduled,
    Sending,
    Completed,
    Paused,
    Failed,
}

impl CampaignStatus {
    /// The complete edge set of the campaign state machine.
    ///
    /// `Sending -> Scheduled` re-arms a recurring campaign after a pass.
    pub const TRANSITIONS: &'static [(CampaignStatus, CampaignStatus)] = &[
        (Self::Draft, Self::Scheduled),
        (Self::Scheduled, Self::Sending),
        (Self::Sending, Self::Completed),
        (Self::Sending, Self::Failed),
        (Self::Sending, Self::Scheduled),
        (Self::Scheduled, Self::Paused),
        (Self::Paused, Self::Scheduled),
    ];

    /// Returns `true` if `self -> to` is in [`Self::TRANSITIONS`].
    pub fn can_transition_to(self, to: CampaignStatus) -> bool {
        Self::TRANSITIONS
            .iter()
            .any(|&(from, target)| from == self && target == to)
    }

    /// Terminal states never leave on their own.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// Delivery status of a single send ledger row.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Display,
    EnumString,
    AsRefStr,
    Serialize,
    Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum SendStatus {
    Pending,
    Sent,
    Failed,
    Bounced,
}

impl SendStatus {
    /// A final row is never sent to again for the same campaign.
    pub fn is_final(self) -> bool {
        !matches!(self, Self::Pending)
    }
}

/// How a campaign's schedule fires.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Display,
    EnumString,
    AsRefStr,
    Serialize,
    Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ScheduleType {
    /// Fires on the next scheduler tick.
    Immediate,
    /// Fires once at `next_run_at`.
    Once,
    /// Fires at `next_run_at`, then re-arms according to the recurrence rule.
    Recurring,
}

/// Cadence of a recurring schedule.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Display,
    EnumString,
    AsRefStr,
    Serialize,
    Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Recurrence {
    Daily,
    Weekly,
    Monthly,
}

/// Which recipients a campaign delivers to.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    Display,
    EnumString,
    AsRefStr,
    Serialize,
    Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Audience {
    /// Only recipients attached to the campaign through batch membership.
    #[default]
    Explicit,
    /// Every live, subscribed recipient.
    All,
}
