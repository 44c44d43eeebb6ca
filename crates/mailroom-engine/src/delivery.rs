// SPDX-FileCopyrightText: 2026 Mailroom Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Delivery engine: turns a campaign in `sending` into ledger rows and
//! transport calls.
//!
//! Each recipient gets its ledger row *before* the transport is invoked, so
//! a crash can only ever leave a `pending` row behind, never a second send
//! for a row that already reached a final status. The row is claimed for the
//! worst-case duration of one send, and a leased run renews its lease before
//! every send, so a row in flight is never handed to a second run. Work is
//! processed in sub-batches and stops early once the campaign was taken over
//! or left `sending`.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use mailroom_config::{DeliveryConfig, TrackingConfig};
use mailroom_core::{
    Campaign, CampaignStatus, MailTransport, MailroomError, OutboundEmail, SendLedgerEntry,
    SendStatus, TransportError,
};
use mailroom_prometheus::recording;
use mailroom_storage::convert::now;
use mailroom_storage::queries::{campaigns, ledger};
use mailroom_storage::{Database, DeliveryCandidate, PendingClaim, SendClaim, SendOutcome};
use serde::Serialize;
use tracing::{debug, info, warn};

/// Added to a row claim on top of the worst-case send, for the ledger writes
/// around it.
const CLAIM_SLACK: Duration = Duration::from_secs(5);

use crate::retry::RetryPolicy;
use crate::template;
use crate::token::{new_id, tracking_token};

/// Tunables for one delivery engine.
#[derive(Debug, Clone)]
pub struct DeliverySettings {
    pub batch_size: usize,
    pub max_batches_per_run: usize,
    pub send_timeout: Duration,
    pub retry: RetryPolicy,
    /// Base URL tracking links are built on, without trailing slash.
    pub public_base_url: String,
}

impl DeliverySettings {
    pub fn from_config(delivery: &DeliveryConfig, tracking: &TrackingConfig) -> Self {
        Self {
            batch_size: delivery.batch_size,
            max_batches_per_run: delivery.max_batches_per_run,
            send_timeout: Duration::from_secs(delivery.send_timeout_secs),
            retry: RetryPolicy::from_config(delivery),
            public_base_url: tracking.public_base_url.trim_end_matches('/').to_string(),
        }
    }
}

impl DeliverySettings {
    /// Longest one send can take: every attempt timing out, plus the backoff
    /// between attempts.
    pub fn max_send_duration(&self) -> Duration {
        self.send_timeout
            .saturating_mul(self.retry.max_retries.saturating_add(1))
            .saturating_add(self.retry.total_backoff())
    }
}

impl Default for DeliverySettings {
    fn default() -> Self {
        Self::from_config(&DeliveryConfig::default(), &TrackingConfig::default())
    }
}

/// A lease held on a campaign by one scheduler invocation.
#[derive(Debug, Clone)]
pub struct Lease {
    pub owner: String,
    pub duration: Duration,
}

/// Counts for one delivery run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DeliveryResult {
    pub sent: usize,
    /// Rejected, or transient failures that exhausted their retries.
    pub failed: usize,
    pub bounced: usize,
    /// Audience members that already had a final ledger row, or were deleted
    /// mid-run.
    pub skipped: usize,
    /// Rows another live run is still sending; their outcome lands there.
    pub deferred: usize,
    /// `true` when no deliverable recipient is left for this pass.
    pub complete: bool,
}

/// Why the sub-batch loop stopped.
enum Stop {
    Exhausted,
    BatchBudget,
    LostClaim,
}

#[derive(Clone)]
pub struct DeliveryEngine {
    db: Database,
    transport: Arc<dyn MailTransport>,
    settings: DeliverySettings,
}

impl DeliveryEngine {
    pub fn new(db: Database, transport: Arc<dyn MailTransport>, settings: DeliverySettings) -> Self {
        Self {
            db,
            transport,
            settings,
        }
    }

    pub fn settings(&self) -> &DeliverySettings {
        &self.settings
    }

    /// Deliver a campaign that is already in `sending`, without a lease.
    ///
    /// Stops between sub-batches if the campaign leaves `sending`.
    pub async fn deliver(&self, campaign_id: &str) -> Result<DeliveryResult, MailroomError> {
        let mut result = DeliveryResult::default();
        self.run(campaign_id, None, &mut result).await?;
        Ok(result)
    }

    /// Deliver under `lease`, renewing it before every send. Stops early
    /// (with `complete == false`) once the lease cannot be renewed.
    ///
    /// Counts accumulate in `result` as sends settle, so they survive an
    /// error that aborts the run.
    pub async fn deliver_leased(
        &self,
        campaign_id: &str,
        lease: &Lease,
        result: &mut DeliveryResult,
    ) -> Result<(), MailroomError> {
        self.run(campaign_id, Some(lease), result).await
    }

    async fn run(
        &self,
        campaign_id: &str,
        lease: Option<&Lease>,
        result: &mut DeliveryResult,
    ) -> Result<(), MailroomError> {
        let campaign = campaigns::get(&self.db, campaign_id)
            .await?
            .ok_or_else(|| MailroomError::not_found("campaign", campaign_id))?;
        if campaign.status != CampaignStatus::Sending {
            return Err(MailroomError::InvalidStateTransition {
                campaign_id: campaign_id.to_string(),
                from: campaign.status,
                to: CampaignStatus::Sending,
            });
        }

        let owner = lease.map_or_else(new_id, |l| l.owner.clone());
        let claim_window =
            chrono::Duration::from_std(self.settings.max_send_duration() + CLAIM_SLACK)
                .map_err(|e| MailroomError::Internal(e.to_string()))?;
        result.skipped +=
            usize::try_from(ledger::settled_count(&self.db, campaign_id, campaign.audience).await?)
                .unwrap_or(0);
        let limit = i64::try_from(self.settings.batch_size.max(1)).unwrap_or(i64::MAX);

        let mut stop = Stop::BatchBudget;
        'batches: for batch_no in 0..self.settings.max_batches_per_run.max(1) {
            if batch_no > 0 && lease.is_none() && !self.still_held(&campaign, None).await? {
                stop = Stop::LostClaim;
                break;
            }
            let batch =
                ledger::candidates(&self.db, campaign_id, campaign.audience, &owner, now(), limit)
                    .await?;
            if batch.is_empty() {
                stop = Stop::Exhausted;
                break;
            }
            debug!(campaign_id, batch_no, size = batch.len(), "delivering sub-batch");
            let short = batch.len() < self.settings.batch_size;
            for candidate in batch {
                if lease.is_some() && !self.still_held(&campaign, lease).await? {
                    stop = Stop::LostClaim;
                    break 'batches;
                }
                let claim = SendClaim {
                    owner: owner.clone(),
                    expires_at: now() + claim_window,
                };
                self.deliver_one(&campaign, candidate, &claim, result).await?;
            }
            if short {
                stop = Stop::Exhausted;
                break;
            }
        }

        result.complete = match stop {
            Stop::LostClaim => false,
            Stop::Exhausted => self.nothing_held(campaign_id, &owner).await?,
            Stop::BatchBudget => {
                ledger::candidates(&self.db, campaign_id, campaign.audience, &owner, now(), 1)
                    .await?
                    .is_empty()
                    && self.nothing_held(campaign_id, &owner).await?
            }
        };
        if matches!(stop, Stop::LostClaim) {
            warn!(campaign_id, "campaign claim lost mid-run; stopping");
        }
        info!(
            campaign_id,
            sent = result.sent,
            failed = result.failed,
            bounced = result.bounced,
            skipped = result.skipped,
            deferred = result.deferred,
            complete = result.complete,
            "delivery run finished"
        );
        Ok(())
    }

    /// `true` unless another live run still holds pending rows.
    async fn nothing_held(&self, campaign_id: &str, owner: &str) -> Result<bool, MailroomError> {
        Ok(ledger::held_count(&self.db, campaign_id, owner, now()).await? == 0)
    }

    /// Renew the lease, or without one confirm the campaign is still sending.
    async fn still_held(
        &self,
        campaign: &Campaign,
        lease: Option<&Lease>,
    ) -> Result<bool, MailroomError> {
        match lease {
            Some(lease) => {
                let until = now()
                    + chrono::Duration::from_std(lease.duration)
                        .map_err(|e| MailroomError::Internal(e.to_string()))?;
                campaigns::renew_lease(&self.db, &campaign.id, &lease.owner, until).await
            }
            None => Ok(campaigns::get(&self.db, &campaign.id)
                .await?
                .is_some_and(|c| c.status == CampaignStatus::Sending)),
        }
    }

    async fn deliver_one(
        &self,
        campaign: &Campaign,
        candidate: DeliveryCandidate,
        claim: &SendClaim,
        result: &mut DeliveryResult,
    ) -> Result<(), MailroomError> {
        let DeliveryCandidate {
            recipient,
            pending_send_id,
        } = candidate;
        if let Some(send_id) = &pending_send_id {
            debug!(%send_id, "resuming pending ledger row");
        }

        let claimed = ledger::ensure_pending(
            &self.db,
            &campaign.id,
            &recipient,
            &new_id(),
            &tracking_token(),
            claim,
            now(),
        )
        .await?;
        let entry = match claimed {
            PendingClaim::Claimed(entry) => entry,
            PendingClaim::Settled => {
                // Finalized by a concurrent run between the query and the claim.
                result.skipped += 1;
                return Ok(());
            }
            PendingClaim::Held => {
                debug!(recipient_id = %recipient.id, "ledger row held by another run");
                result.deferred += 1;
                return Ok(());
            }
            PendingClaim::RecipientGone => {
                debug!(recipient_id = %recipient.id, "recipient deleted mid-run; skipping");
                result.skipped += 1;
                return Ok(());
            }
        };

        let email = self.render(campaign, &recipient.merge_fields(), &entry);
        let outcome = self.send_with_retries(&email).await;

        if !ledger::record_outcome(&self.db, &entry.id, &outcome).await? {
            debug!(send_id = %entry.id, "ledger row already final; outcome dropped");
            result.skipped += 1;
            return Ok(());
        }
        match outcome.status {
            SendStatus::Sent => result.sent += 1,
            SendStatus::Bounced => result.bounced += 1,
            _ => result.failed += 1,
        }
        recording::record_send(outcome.status.as_ref());
        Ok(())
    }

    /// Render subject and body with the recipient's merge fields plus the
    /// tracking links for this ledger row.
    fn render(
        &self,
        campaign: &Campaign,
        fields: &BTreeMap<String, String>,
        entry: &SendLedgerEntry,
    ) -> OutboundEmail {
        let base = &self.settings.public_base_url;
        let token = &entry.tracking_token;
        let unsubscribe_url = format!("{base}/track/unsubscribe/{token}");

        let mut fields = fields.clone();
        fields.insert("open_url".into(), format!("{base}/track/open/{token}"));
        fields.insert("click_url".into(), format!("{base}/track/click/{token}"));
        fields.insert("unsubscribe_url".into(), unsubscribe_url.clone());

        OutboundEmail {
            to: entry.recipient_email.clone(),
            subject: template::render(&campaign.subject, &fields),
            body: template::render(&campaign.body_template, &fields),
            from_name: campaign.sender_name.clone(),
            from_email: campaign.sender_email.clone(),
            headers: vec![("List-Unsubscribe".into(), format!("<{unsubscribe_url}>"))],
        }
    }

    /// Try the transport until it succeeds, fails permanently, or the retry
    /// budget for transient failures runs out.
    async fn send_with_retries(&self, email: &OutboundEmail) -> SendOutcome {
        let mut attempts: u32 = 0;
        loop {
            attempts += 1;
            let started = Instant::now();
            let sent = tokio::time::timeout(self.settings.send_timeout, self.transport.send(email))
                .await
                .unwrap_or_else(|_| {
                    Err(TransportError::Transient(format!(
                        "send timed out after {:?}",
                        self.settings.send_timeout
                    )))
                });
            recording::record_send_latency(started.elapsed().as_secs_f64());

            let (status, error) = match sent {
                Ok(()) => (SendStatus::Sent, None),
                Err(e) if e.is_transient() && self.settings.retry.should_retry(attempts) => {
                    let delay = self.settings.retry.delay_after(attempts);
                    debug!(to = %email.to, attempts, ?delay, error = %e, "transient send failure; retrying");
                    tokio::time::sleep(delay).await;
                    continue;
                }
                Err(e @ TransportError::Bounced(_)) => (SendStatus::Bounced, Some(e.to_string())),
                Err(e) => (SendStatus::Failed, Some(e.to_string())),
            };
            if let Some(error) = &error {
                warn!(to = %email.to, attempts, %error, "send failed");
            }
            return SendOutcome {
                status,
                attempts: i64::from(attempts),
                last_error: error,
                at: now(),
            };
        }
    }
}
