// SPDX-FileCopyrightText: 2026 Mailroom Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The scheduler tick: claim due campaigns, deliver, settle.
//!
//! A tick claims each due campaign with a compare-and-set from `scheduled` to
//! `sending` that also writes a lease, so concurrent invocations never both
//! run the same campaign. Campaigns left in `sending` by an interrupted run
//! (lease released or expired) are taken over and continued; the ledger
//! guarantees no recipient already finalized is sent to again.

use std::time::Duration;

use chrono::{DateTime, Utc};
use mailroom_config::SchedulerConfig;
use mailroom_core::{Campaign, CampaignStatus, MailroomError};
use mailroom_prometheus::recording;
use mailroom_storage::Database;
use mailroom_storage::queries::campaigns;
use serde::Serialize;
use tracing::{error, info, warn};

use crate::delivery::{DeliveryEngine, DeliveryResult, Lease};
use crate::recurrence::next_occurrence;
use crate::token::new_id;

#[derive(Debug, Clone)]
pub struct SchedulerSettings {
    pub max_campaigns_per_tick: usize,
    pub lease: Duration,
}

impl SchedulerSettings {
    pub fn from_config(config: &SchedulerConfig) -> Self {
        Self {
            max_campaigns_per_tick: config.max_campaigns_per_tick,
            lease: Duration::from_secs(config.lease_secs),
        }
    }
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self::from_config(&SchedulerConfig::default())
    }
}

/// How a claimed campaign ended the tick.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RunOutcome {
    Completed,
    /// Every attempted send failed.
    Failed,
    /// Recurring campaign re-armed for its next occurrence.
    Rescheduled { next_run_at: DateTime<Utc> },
    /// Work remains; the lease was released for the next tick.
    Continuing,
    /// Another invocation took the campaign over mid-run.
    Lost,
    /// The run aborted on an error; the campaign stays in `sending`.
    Errored { message: String },
}

/// One campaign claimed during a tick.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CampaignRun {
    pub campaign_id: String,
    /// Continued a run that an earlier invocation left unfinished.
    pub resumed: bool,
    pub delivery: Option<DeliveryResult>,
    pub outcome: RunOutcome,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TickReport {
    pub runs: Vec<CampaignRun>,
    /// Due campaigns another invocation claimed first.
    pub contended: Vec<String>,
}

impl TickReport {
    pub fn claimed_ids(&self) -> Vec<&str> {
        self.runs.iter().map(|r| r.campaign_id.as_str()).collect()
    }

    pub fn has_errors(&self) -> bool {
        self.runs
            .iter()
            .any(|r| matches!(r.outcome, RunOutcome::Errored { .. }))
    }
}

#[derive(Clone)]
pub struct Scheduler {
    db: Database,
    delivery: DeliveryEngine,
    settings: SchedulerSettings,
}

impl Scheduler {
    pub fn new(db: Database, delivery: DeliveryEngine, settings: SchedulerSettings) -> Self {
        Self {
            db,
            delivery,
            settings,
        }
    }

    /// Run one scheduler pass as of `now`.
    ///
    /// Per-campaign failures are reported in the [`TickReport`]; only a
    /// failure to read the due set fails the whole tick.
    pub async fn tick(&self, now: DateTime<Utc>) -> Result<TickReport, MailroomError> {
        let owner = new_id();
        let budget = self.settings.max_campaigns_per_tick.max(1);
        let limit = i64::try_from(budget).unwrap_or(i64::MAX);
        let lease_until = now
            + chrono::Duration::from_std(self.settings.lease)
                .map_err(|e| MailroomError::Internal(e.to_string()))?;
        let lease = Lease {
            owner: owner.clone(),
            duration: self.settings.lease,
        };

        let mut report = TickReport::default();

        let due = campaigns::due(&self.db, now, limit).await?;
        for id in due {
            if report.runs.len() >= budget {
                break;
            }
            if !campaigns::claim_due(&self.db, &id, &owner, lease_until, now).await? {
                info!(campaign_id = %id, "campaign claimed by another invocation");
                report.contended.push(id);
                continue;
            }
            recording::record_campaign_claimed();
            report.runs.push(self.run_claimed(&id, &lease, now, false).await);
        }

        let stalled = campaigns::stalled(&self.db, now, limit).await?;
        for id in stalled {
            if report.runs.len() >= budget {
                break;
            }
            // One run per campaign per tick, even if this tick just released it.
            if report.runs.iter().any(|r| r.campaign_id == id) {
                continue;
            }
            if !campaigns::claim_stalled(&self.db, &id, &owner, lease_until, now).await? {
                continue;
            }
            recording::record_campaign_claimed();
            info!(campaign_id = %id, "resuming interrupted campaign");
            report.runs.push(self.run_claimed(&id, &lease, now, true).await);
        }

        info!(
            claimed = report.runs.len(),
            contended = report.contended.len(),
            "scheduler tick finished"
        );
        Ok(report)
    }

    async fn run_claimed(
        &self,
        id: &str,
        lease: &Lease,
        now: DateTime<Utc>,
        resumed: bool,
    ) -> CampaignRun {
        let mut delivery = DeliveryResult::default();
        let outcome = match self.drive(id, lease, now, &mut delivery).await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(campaign_id = %id, error = %e, "campaign run failed");
                // Let the next tick pick the campaign up without waiting out the lease.
                if let Err(release) = campaigns::release_lease(&self.db, id, &lease.owner, now).await
                {
                    warn!(campaign_id = %id, error = %release, "lease release failed");
                }
                RunOutcome::Errored {
                    message: e.to_string(),
                }
            }
        };
        CampaignRun {
            campaign_id: id.to_string(),
            resumed,
            delivery: Some(delivery),
            outcome,
        }
    }

    async fn drive(
        &self,
        id: &str,
        lease: &Lease,
        now: DateTime<Utc>,
        delivery: &mut DeliveryResult,
    ) -> Result<RunOutcome, MailroomError> {
        self.delivery.deliver_leased(id, lease, delivery).await?;
        if !delivery.complete {
            return Ok(
                if campaigns::release_lease(&self.db, id, &lease.owner, now).await? {
                    RunOutcome::Continuing
                } else {
                    RunOutcome::Lost
                },
            );
        }

        let campaign = campaigns::get(&self.db, id)
            .await?
            .ok_or_else(|| MailroomError::not_found("campaign", id))?;
        let (to, next_run_at, outcome) = settle(&campaign, now)?;
        if !campaigns::finish_run(&self.db, id, &lease.owner, to, next_run_at, now).await? {
            return Ok(RunOutcome::Lost);
        }
        info!(campaign_id = %id, status = %to, ?next_run_at, "campaign run settled");
        Ok(outcome)
    }
}

/// Final status for a campaign whose pass is complete.
fn settle(
    campaign: &Campaign,
    now: DateTime<Utc>,
) -> Result<(CampaignStatus, Option<DateTime<Utc>>, RunOutcome), MailroomError> {
    let total_failure = campaign.sent_count == 0 && campaign.failed_count > 0;

    let recurring = campaign
        .schedule
        .as_ref()
        .and_then(|s| Some((s.recurrence?, s.anchor_at.or(s.next_run_at)?)));
    if let Some((rule, anchor)) = recurring {
        if total_failure {
            warn!(campaign_id = %campaign.id, "recurring campaign delivered nothing; re-arming anyway");
        }
        let next = next_occurrence(anchor, rule, now).ok_or_else(|| {
            MailroomError::Internal(format!("campaign {}: recurrence overflow", campaign.id))
        })?;
        return Ok((
            CampaignStatus::Scheduled,
            Some(next),
            RunOutcome::Rescheduled { next_run_at: next },
        ));
    }

    if total_failure {
        Ok((CampaignStatus::Failed, None, RunOutcome::Failed))
    } else {
        Ok((CampaignStatus::Completed, None, RunOutcome::Completed))
    }
}
