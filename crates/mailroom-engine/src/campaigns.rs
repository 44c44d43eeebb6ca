// SPDX-FileCopyrightText: 2026 Mailroom Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Campaign lifecycle: creation, scheduling, membership, and guarded status
//! transitions.

use mailroom_core::{
    Campaign, CampaignStatus, MailroomError, NewCampaign, ScheduleSpec, SendLedgerEntry,
};
use mailroom_storage::convert::now;
use mailroom_storage::queries::{campaigns, ledger};
use mailroom_storage::{AttachOutcome, Database};
use tracing::info;

use crate::recipients::{normalize_email, validate_email};
use crate::token::new_id;

/// Statuses a schedule may be (re)attached from.
const SCHEDULABLE: [CampaignStatus; 2] = [CampaignStatus::Draft, CampaignStatus::Paused];

/// Campaign operations over the shared database.
#[derive(Clone)]
pub struct CampaignRepository {
    db: Database,
}

impl CampaignRepository {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Create a `draft` campaign with zeroed counters.
    pub async fn create(&self, fields: NewCampaign) -> Result<Campaign, MailroomError> {
        let name = required("name", &fields.name)?;
        let subject = required("subject", &fields.subject)?;
        if fields.body_template.trim().is_empty() {
            return Err(MailroomError::validation("body_template", "must not be empty"));
        }
        let sender_email = normalize_email(&fields.sender_email);
        validate_email(&sender_email)
            .map_err(|message| MailroomError::validation("sender_email", message))?;

        let at = now();
        let campaign = Campaign {
            id: new_id(),
            name,
            subject,
            body_template: fields.body_template,
            sender_name: fields.sender_name.trim().to_string(),
            sender_email,
            audience: fields.audience,
            status: CampaignStatus::Draft,
            schedule: None,
            recipient_count: 0,
            sent_count: 0,
            failed_count: 0,
            opened_count: 0,
            clicked_count: 0,
            lease_expires_at: None,
            created_at: at,
            updated_at: at,
        };
        campaigns::insert(&self.db, &campaign).await?;
        info!(campaign_id = %campaign.id, name = %campaign.name, "campaign created");
        Ok(campaign)
    }

    /// Attach (or replace) the schedule and move the campaign to `scheduled`.
    ///
    /// Allowed from `draft` and `paused` only.
    pub async fn attach_schedule(
        &self,
        id: &str,
        schedule: ScheduleSpec,
    ) -> Result<Campaign, MailroomError> {
        let at = now();
        let schedule = schedule.normalized(at)?;
        let current = self.get(id).await?;
        if !SCHEDULABLE.contains(&current.status) {
            return Err(illegal(id, current.status, CampaignStatus::Scheduled));
        }

        if !campaigns::set_schedule(&self.db, id, &schedule, &SCHEDULABLE, at).await? {
            // Lost a race with another writer; report what it left behind.
            let current = self.get(id).await?;
            return Err(illegal(id, current.status, CampaignStatus::Scheduled));
        }
        info!(
            campaign_id = %id,
            kind = %schedule.kind,
            next_run_at = ?schedule.next_run_at,
            "campaign scheduled"
        );
        self.get(id).await
    }

    /// Move `from -> to` if that edge is legal and the campaign is still in
    /// `from`. Either failure is an [`MailroomError::InvalidStateTransition`].
    pub async fn transition(
        &self,
        id: &str,
        from: CampaignStatus,
        to: CampaignStatus,
    ) -> Result<Campaign, MailroomError> {
        if !from.can_transition_to(to) {
            return Err(illegal(id, from, to));
        }
        if !campaigns::transition(&self.db, id, from, to, now()).await? {
            let current = self.get(id).await?;
            return Err(illegal(id, current.status, to));
        }
        info!(campaign_id = %id, %from, %to, "campaign status changed");
        self.get(id).await
    }

    pub async fn pause(&self, id: &str) -> Result<Campaign, MailroomError> {
        self.transition(id, CampaignStatus::Scheduled, CampaignStatus::Paused)
            .await
    }

    pub async fn resume(&self, id: &str) -> Result<Campaign, MailroomError> {
        self.transition(id, CampaignStatus::Paused, CampaignStatus::Scheduled)
            .await
    }

    /// Add recipients to the campaign's batch. Re-attaching is a no-op;
    /// returns the number of new memberships.
    pub async fn attach_recipients(
        &self,
        id: &str,
        recipient_ids: Vec<String>,
    ) -> Result<usize, MailroomError> {
        let campaign = self.get(id).await?;
        if campaign.status.is_terminal() {
            return Err(MailroomError::validation(
                "campaign",
                format!("cannot attach recipients to a {} campaign", campaign.status),
            ));
        }
        match campaigns::attach_recipients(&self.db, id, recipient_ids, now()).await? {
            AttachOutcome::Attached(count) => {
                info!(campaign_id = %id, attached = count, "recipients attached");
                Ok(count)
            }
            AttachOutcome::CampaignNotFound => Err(MailroomError::not_found("campaign", id)),
            AttachOutcome::UnknownRecipient(recipient_id) => {
                Err(MailroomError::not_found("recipient", recipient_id))
            }
        }
    }

    pub async fn get(&self, id: &str) -> Result<Campaign, MailroomError> {
        campaigns::get(&self.db, id)
            .await?
            .ok_or_else(|| MailroomError::not_found("campaign", id))
    }

    pub async fn list(
        &self,
        status: Option<CampaignStatus>,
    ) -> Result<Vec<Campaign>, MailroomError> {
        campaigns::list(&self.db, status).await
    }

    /// Recipient ids in the campaign's batch.
    pub async fn members(&self, id: &str) -> Result<Vec<String>, MailroomError> {
        campaigns::members(&self.db, id).await
    }

    /// Ledger rows for the campaign, oldest first.
    pub async fn ledger(&self, id: &str) -> Result<Vec<SendLedgerEntry>, MailroomError> {
        ledger::list_for_campaign(&self.db, id).await
    }
}

fn required(field: &str, value: &str) -> Result<String, MailroomError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(MailroomError::validation(field, "must not be empty"));
    }
    Ok(value.to_string())
}

fn illegal(id: &str, from: CampaignStatus, to: CampaignStatus) -> MailroomError {
    MailroomError::InvalidStateTransition {
        campaign_id: id.to_string(),
        from,
        to,
    }
}
