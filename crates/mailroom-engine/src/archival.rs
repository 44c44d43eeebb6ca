// SPDX-FileCopyrightText: 2026 Mailroom Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Soft delete and restore of recipients.
//!
//! Deleting a recipient moves it, its batch memberships, and its ledger rows
//! into shadow tables in one transaction, with campaign counters adjusted so
//! aggregates only ever reflect live rows.

use mailroom_core::{ArchivedRecipient, ArchivedSendLedgerEntry, MailroomError, Recipient};
use mailroom_storage::convert::now;
use mailroom_storage::queries::archive;
use mailroom_storage::{Database, RestoreOutcome};
use tracing::info;

use crate::token::new_id;

#[derive(Clone)]
pub struct ArchivalService {
    db: Database,
}

impl ArchivalService {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Archive a live recipient. `deleted_by` names the actor and is required.
    pub async fn soft_delete(
        &self,
        recipient_id: &str,
        deleted_by: &str,
        reason: &str,
    ) -> Result<ArchivedRecipient, MailroomError> {
        let actor = deleted_by.trim();
        if actor.is_empty() {
            return Err(MailroomError::validation("deleted_by", "must not be empty"));
        }
        let archived = archive::soft_delete(
            &self.db,
            recipient_id,
            &new_id(),
            actor,
            reason.trim(),
            now(),
        )
        .await?
        .ok_or_else(|| MailroomError::not_found("recipient", recipient_id))?;
        info!(
            recipient_id,
            archive_id = %archived.archive_id,
            deleted_by = actor,
            memberships = archived.memberships.len(),
            "recipient archived"
        );
        Ok(archived)
    }

    /// Move an archived recipient back, with its surviving memberships and
    /// ledger rows. `restored_by` names the actor and is required.
    pub async fn restore(
        &self,
        archive_id: &str,
        restored_by: &str,
    ) -> Result<Recipient, MailroomError> {
        let actor = restored_by.trim();
        if actor.is_empty() {
            return Err(MailroomError::validation("restored_by", "must not be empty"));
        }
        match archive::restore(&self.db, archive_id, now()).await? {
            RestoreOutcome::Restored(recipient) => {
                info!(
                    archive_id,
                    recipient_id = %recipient.id,
                    restored_by = actor,
                    "recipient restored"
                );
                Ok(recipient)
            }
            RestoreOutcome::NotFound => Err(MailroomError::not_found("archived recipient", archive_id)),
            RestoreOutcome::AlreadyRestored => Err(MailroomError::Conflict(format!(
                "archived recipient {archive_id} was already restored"
            ))),
            RestoreOutcome::EmailTaken => Err(MailroomError::Conflict(format!(
                "archived recipient {archive_id}: email is registered to a live recipient"
            ))),
        }
    }

    pub async fn get_archived(&self, archive_id: &str) -> Result<ArchivedRecipient, MailroomError> {
        archive::get_archived(&self.db, archive_id)
            .await?
            .ok_or_else(|| MailroomError::not_found("archived recipient", archive_id))
    }

    pub async fn list_archived(
        &self,
        include_restored: bool,
    ) -> Result<Vec<ArchivedRecipient>, MailroomError> {
        archive::list_archived(&self.db, include_restored).await
    }

    /// Ledger rows archived together with a recipient.
    pub async fn archived_sends(
        &self,
        archive_id: &str,
    ) -> Result<Vec<ArchivedSendLedgerEntry>, MailroomError> {
        self.get_archived(archive_id).await?;
        archive::archived_sends(&self.db, archive_id).await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use mailroom_core::{NewRecipient, ScheduleSpec};
    use mailroom_storage::convert::now as clock;
    use mailroom_test_utils::MockTransport;

    use super::*;
    use crate::campaigns::CampaignRepository;
    use crate::delivery::{DeliveryEngine, DeliverySettings};
    use crate::recipients::RecipientStore;
    use crate::scheduler::{Scheduler, SchedulerSettings};
    use crate::test_support::{new_campaign, setup_db};

    #[tokio::test]
    async fn soft_delete_archives_and_adjusts_counters() {
        let (db, _dir) = setup_db().await;
        let store = RecipientStore::new(db.clone());
        let repo = CampaignRepository::new(db.clone());
        let archival = ArchivalService::new(db.clone());

        let a = store
            .upsert_manual(NewRecipient::with_email("a@x.com"))
            .await
            .unwrap()
            .into_recipient();
        let b = store
            .upsert_manual(NewRecipient::with_email("b@x.com"))
            .await
            .unwrap()
            .into_recipient();
        let c = repo.create(new_campaign("Archive")).await.unwrap();
        repo.attach_recipients(&c.id, vec![a.id.clone(), b.id.clone()])
            .await
            .unwrap();
        repo.attach_schedule(&c.id, ScheduleSpec::immediate()).await.unwrap();
        let delivery = DeliveryEngine::new(
            db.clone(),
            Arc::new(MockTransport::new()),
            DeliverySettings::default(),
        );
        Scheduler::new(db.clone(), delivery, SchedulerSettings::default())
            .tick(clock())
            .await
            .unwrap();

        let archived = archival.soft_delete(&a.id, "admin", "requested erasure").await.unwrap();
        assert_eq!(archived.original_id, a.id);
        assert_eq!(archived.memberships, vec![c.id.clone()]);
        assert!(store.find_by_email("a@x.com").await.unwrap().is_none());

        let sends = archival.archived_sends(&archived.archive_id).await.unwrap();
        assert_eq!(sends.len(), 1);
        assert_eq!(sends[0].recipient_email, "a@x.com");

        let campaign = repo.get(&c.id).await.unwrap();
        assert_eq!(campaign.recipient_count, 1);
        assert_eq!(campaign.sent_count, 1);

        let restored = archival.restore(&archived.archive_id, "ops").await.unwrap();
        assert_eq!(restored.id, a.id);
        assert_eq!(repo.get(&c.id).await.unwrap().sent_count, 2);
        assert!(matches!(
            archival.restore(&archived.archive_id, "ops").await,
            Err(MailroomError::Conflict(_))
        ));
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn restore_conflicts_when_email_reused() {
        let (db, _dir) = setup_db().await;
        let store = RecipientStore::new(db.clone());
        let archival = ArchivalService::new(db.clone());
        let a = store
            .upsert_manual(NewRecipient::with_email("a@x.com"))
            .await
            .unwrap()
            .into_recipient();
        let archived = archival.soft_delete(&a.id, "admin", "").await.unwrap();
        store
            .upsert_manual(NewRecipient::with_email("a@x.com"))
            .await
            .unwrap();

        assert!(matches!(
            archival.restore(&archived.archive_id, "ops").await,
            Err(MailroomError::Conflict(_))
        ));
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn soft_delete_requires_actor_and_live_recipient() {
        let (db, _dir) = setup_db().await;
        let archival = ArchivalService::new(db.clone());
        assert!(matches!(
            archival.soft_delete("r1", " ", "x").await,
            Err(MailroomError::Validation { .. })
        ));
        assert!(matches!(
            archival.soft_delete("missing", "admin", "x").await,
            Err(MailroomError::NotFound { .. })
        ));
        assert!(archival.list_archived(true).await.unwrap().is_empty());
        db.close().await.unwrap();
    }
}
