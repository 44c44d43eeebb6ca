// SPDX-FileCopyrightText: 2026 Mailroom Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Domain records passed between the storage, engine, and gateway crates.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::MailroomError;
use crate::types::{Audience, CampaignStatus, Recurrence, ScheduleType, SendStatus};

/// Free-form per-recipient attributes, usable as merge fields.
pub type Attributes = BTreeMap<String, String>;

/// A deduplicated email identity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recipient {
    pub id: String,
    /// Canonical form: trimmed and lower-cased.
    pub email: String,
    pub display_name: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub organization: Option<String>,
    pub attributes: Attributes,
    pub unsubscribed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Recipient {
    pub fn is_subscribed(&self) -> bool {
        self.unsubscribed_at.is_none()
    }

    /// Values available to `{{placeholder}}` substitution.
    ///
    /// Custom attributes never shadow the built-in fields.
    pub fn merge_fields(&self) -> BTreeMap<String, String> {
        let mut fields = self.attributes.clone();
        let name = self
            .display_name
            .clone()
            .or_else(|| {
                let joined = [self.first_name.as_deref(), self.last_name.as_deref()]
                    .into_iter()
                    .flatten()
                    .collect::<Vec<_>>()
                    .join(" ");
                (!joined.is_empty()).then_some(joined)
            })
            .unwrap_or_default();
        fields.insert("email".into(), self.email.clone());
        fields.insert("name".into(), name);
        fields.insert(
            "first_name".into(),
            self.first_name.clone().unwrap_or_default(),
        );
        fields.insert("last_name".into(), self.last_name.clone().unwrap_or_default());
        fields.insert(
            "organization".into(),
            self.organization.clone().unwrap_or_default(),
        );
        fields
    }
}

/// A raw recipient row as produced by an import source or manual entry form.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewRecipient {
    pub email: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub organization: Option<String>,
    #[serde(default)]
    pub attributes: Attributes,
}

impl NewRecipient {
    pub fn with_email(email: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            ..Self::default()
        }
    }
}

/// Per-row failure recorded by a bulk import.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImportRowError {
    /// Zero-based position of the row in the submitted batch.
    pub row: usize,
    pub email: String,
    pub message: String,
}

/// Summary of a bulk import.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ImportResult {
    pub imported: usize,
    pub skipped: usize,
    pub failed: usize,
    pub errors: Vec<ImportRowError>,
}

/// When and how often a campaign fires.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleSpec {
    pub kind: ScheduleType,
    pub next_run_at: Option<DateTime<Utc>>,
    pub recurrence: Option<Recurrence>,
    /// First occurrence of a recurring schedule; later occurrences are
    /// computed from it so month-length clamping never drifts.
    pub anchor_at: Option<DateTime<Utc>>,
    pub last_run_at: Option<DateTime<Utc>>,
}

impl ScheduleSpec {
    /// Fire on the next tick.
    pub fn immediate() -> Self {
        Self {
            kind: ScheduleType::Immediate,
            next_run_at: None,
            recurrence: None,
            anchor_at: None,
            last_run_at: None,
        }
    }

    /// Fire once at `at`.
    pub fn once(at: DateTime<Utc>) -> Self {
        Self {
            kind: ScheduleType::Once,
            next_run_at: Some(at),
            recurrence: None,
            anchor_at: None,
            last_run_at: None,
        }
    }

    /// Fire at `first_run`, then every `rule`.
    pub fn recurring(rule: Recurrence, first_run: DateTime<Utc>) -> Self {
        Self {
            kind: ScheduleType::Recurring,
            next_run_at: Some(first_run),
            recurrence: Some(rule),
            anchor_at: Some(first_run),
            last_run_at: None,
        }
    }

    /// Check structural consistency and fill in derived fields.
    ///
    /// Immediate schedules are pinned to `now`; recurring schedules get their
    /// anchor from the first run when it was not supplied.
    pub fn normalized(mut self, now: DateTime<Utc>) -> Result<Self, MailroomError> {
        match self.kind {
            ScheduleType::Immediate => {
                self.next_run_at = Some(now);
                self.recurrence = None;
                self.anchor_at = None;
            }
            ScheduleType::Once => {
                if self.next_run_at.is_none() {
                    return Err(MailroomError::validation(
                        "schedule.next_run_at",
                        "a one-off schedule needs a run time",
                    ));
                }
                self.recurrence = None;
                self.anchor_at = None;
            }
            ScheduleType::Recurring => {
                if self.recurrence.is_none() {
                    return Err(MailroomError::validation(
                        "schedule.recurrence",
                        "a recurring schedule needs a recurrence rule",
                    ));
                }
                let first = self.next_run_at.or(self.anchor_at).ok_or_else(|| {
                    MailroomError::validation(
                        "schedule.next_run_at",
                        "a recurring schedule needs a first run time",
                    )
                })?;
                self.next_run_at = Some(first);
                self.anchor_at = Some(self.anchor_at.unwrap_or(first));
            }
        }
        Ok(self)
    }
}

/// Fields required to create a campaign.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NewCampaign {
    pub name: String,
    pub subject: String,
    pub body_template: String,
    pub sender_name: String,
    pub sender_email: String,
    #[serde(default)]
    pub audience: Audience,
}

/// A campaign record with its embedded schedule and outcome counters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Campaign {
    pub id: String,
    pub name: String,
    pub subject: String,
    pub body_template: String,
    pub sender_name: String,
    pub sender_email: String,
    pub audience: Audience,
    pub status: CampaignStatus,
    pub schedule: Option<ScheduleSpec>,
    pub recipient_count: i64,
    pub sent_count: i64,
    /// Failed and bounced ledger rows.
    pub failed_count: i64,
    pub opened_count: i64,
    pub clicked_count: i64,
    pub lease_expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Campaign {
    pub fn is_recurring(&self) -> bool {
        self.schedule
            .as_ref()
            .is_some_and(|s| s.kind == ScheduleType::Recurring)
    }
}

/// One delivery attempt record for a (campaign, recipient) pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SendLedgerEntry {
    pub id: String,
    pub campaign_id: String,
    pub recipient_id: String,
    /// Copied at claim time so the row stays readable after archival.
    pub recipient_email: String,
    pub status: SendStatus,
    pub attempts: i64,
    pub last_error: Option<String>,
    pub tracking_token: String,
    pub sent_at: Option<DateTime<Utc>>,
    pub opened_at: Option<DateTime<Utc>>,
    pub clicked_at: Option<DateTime<Utc>>,
    pub open_events: i64,
    pub click_events: i64,
    pub created_at: DateTime<Utc>,
}

/// Shadow copy of a soft-deleted recipient.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArchivedRecipient {
    pub archive_id: String,
    pub original_id: String,
    pub email: String,
    pub display_name: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub organization: Option<String>,
    pub attributes: Attributes,
    pub unsubscribed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    /// Campaign ids the recipient was attached to at deletion time.
    pub memberships: Vec<String>,
    pub deleted_by: String,
    pub deletion_reason: String,
    pub deleted_at: DateTime<Utc>,
    pub restored_at: Option<DateTime<Utc>>,
}

/// Shadow copy of a send ledger row removed by a recipient soft delete.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArchivedSendLedgerEntry {
    pub archive_id: String,
    pub original_id: String,
    pub recipient_archive_id: String,
    pub campaign_id: String,
    pub recipient_id: String,
    pub recipient_email: String,
    pub status: SendStatus,
    pub attempts: i64,
    pub last_error: Option<String>,
    pub tracking_token: String,
    pub sent_at: Option<DateTime<Utc>>,
    pub opened_at: Option<DateTime<Utc>>,
    pub clicked_at: Option<DateTime<Utc>>,
    pub open_events: i64,
    pub click_events: i64,
    pub created_at: DateTime<Utc>,
    pub deleted_by: String,
    pub deletion_reason: String,
    pub deleted_at: DateTime<Utc>,
}
