// SPDX-FileCopyrightText: 2026 Mailroom Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Campaign rows and their status changes.
//!
//! Every status change is a conditional `UPDATE ... WHERE status = ?` whose
//! affected-row count tells the caller whether it won. Counter columns are
//! only written by the ledger and archive modules.

use chrono::{DateTime, Utc};
use mailroom_core::{CampaignStatus, MailroomError, ScheduleSpec};
use rusqlite::{OptionalExtension, Row, TransactionBehavior, params};

use crate::convert::{get_enum, get_opt_enum, get_opt_ts, get_ts, opt_ts, ts};
use crate::database::{Database, map_tr_err};
use crate::models::{AttachOutcome, Campaign};

const CAMPAIGN_COLUMNS: &str = "id, name, subject, body_template, sender_name, sender_email, \
     audience, status, schedule_type, next_run_at, recurrence_rule, anchor_at, last_run_at, \
     recipient_count, sent_count, failed_count, opened_count, clicked_count, lease_expires_at, \
     created_at, updated_at";

fn row_to_campaign(row: &Row<'_>) -> rusqlite::Result<Campaign> {
    let schedule = match get_opt_enum(row, 8)? {
        Some(kind) => Some(ScheduleSpec {
            kind,
            next_run_at: get_opt_ts(row, 9)?,
            recurrence: get_opt_enum(row, 10)?,
            anchor_at: get_opt_ts(row, 11)?,
            last_run_at: get_opt_ts(row, 12)?,
        }),
        None => None,
    };
    Ok(Campaign {
        id: row.get(0)?,
        name: row.get(1)?,
        subject: row.get(2)?,
        body_template: row.get(3)?,
        sender_name: row.get(4)?,
        sender_email: row.get(5)?,
        audience: get_enum(row, 6)?,
        status: get_enum(row, 7)?,
        schedule,
        recipient_count: row.get(13)?,
        sent_count: row.get(14)?,
        failed_count: row.get(15)?,
        opened_count: row.get(16)?,
        clicked_count: row.get(17)?,
        lease_expires_at: get_opt_ts(row, 18)?,
        created_at: get_ts(row, 19)?,
        updated_at: get_ts(row, 20)?,
    })
}

pub async fn insert(db: &Database, campaign: &Campaign) -> Result<(), MailroomError> {
    let c = campaign.clone();
    db.connection()
        .call(move |conn| {
            let schedule = c.schedule.as_ref();
            conn.execute(
                &format!(
                    "INSERT INTO campaigns ({CAMPAIGN_COLUMNS}) VALUES \
                     (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, \
                     ?14, ?15, ?16, ?17, ?18, ?19, ?20, ?21)"
                ),
                params![
                    c.id,
                    c.name,
                    c.subject,
                    c.body_template,
                    c.sender_name,
                    c.sender_email,
                    c.audience.as_ref(),
                    c.status.as_ref(),
                    schedule.map(|s| s.kind.as_ref().to_string()),
                    opt_ts(schedule.and_then(|s| s.next_run_at.as_ref())),
                    schedule.and_then(|s| s.recurrence).map(|r| r.as_ref().to_string()),
                    opt_ts(schedule.and_then(|s| s.anchor_at.as_ref())),
                    opt_ts(schedule.and_then(|s| s.last_run_at.as_ref())),
                    c.recipient_count,
                    c.sent_count,
                    c.failed_count,
                    c.opened_count,
                    c.clicked_count,
                    opt_ts(c.lease_expires_at.as_ref()),
                    ts(&c.created_at),
                    ts(&c.updated_at),
                ],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

pub async fn get(db: &Database, id: &str) -> Result<Option<Campaign>, MailroomError> {
    let id = id.to_string();
    db.connection()
        .call(move |conn| {
            conn.query_row(
                &format!("SELECT {CAMPAIGN_COLUMNS} FROM campaigns WHERE id = ?1"),
                params![id],
                row_to_campaign,
            )
            .optional()
        })
        .await
        .map_err(map_tr_err)
}

/// All campaigns, oldest first, optionally filtered by status.
pub async fn list(
    db: &Database,
    status: Option<CampaignStatus>,
) -> Result<Vec<Campaign>, MailroomError> {
    let status = status.map(|s| s.as_ref().to_string());
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {CAMPAIGN_COLUMNS} FROM campaigns \
                 WHERE ?1 IS NULL OR status = ?1 ORDER BY created_at ASC, id ASC"
            ))?;
            stmt.query_map(params![status], row_to_campaign)?
                .collect::<Result<Vec<_>, _>>()
        })
        .await
        .map_err(map_tr_err)
}

/// Store a schedule and move the campaign to `scheduled`, provided it is
/// currently in one of `from`.
pub async fn set_schedule(
    db: &Database,
    id: &str,
    schedule: &ScheduleSpec,
    from: &[CampaignStatus],
    now: DateTime<Utc>,
) -> Result<bool, MailroomError> {
    let id = id.to_string();
    let s = schedule.clone();
    let from: Vec<String> = from.iter().map(|f| f.as_ref().to_string()).collect();
    db.connection()
        .call(move |conn| {
            let placeholders = (0..from.len())
                .map(|i| format!("?{}", i + 8))
                .collect::<Vec<_>>()
                .join(", ");
            let sql = format!(
                "UPDATE campaigns SET status = 'scheduled', schedule_type = ?2, \
                 next_run_at = ?3, recurrence_rule = ?4, anchor_at = ?5, last_run_at = ?6, \
                 updated_at = ?7 WHERE id = ?1 AND status IN ({placeholders})"
            );
            let mut values: Vec<Option<String>> = vec![
                Some(id),
                Some(s.kind.as_ref().to_string()),
                opt_ts(s.next_run_at.as_ref()),
                s.recurrence.map(|r| r.as_ref().to_string()),
                opt_ts(s.anchor_at.as_ref()),
                opt_ts(s.last_run_at.as_ref()),
                Some(ts(&now)),
            ];
            values.extend(from.into_iter().map(Some));
            let changed = conn.execute(&sql, rusqlite::params_from_iter(values))?;
            Ok(changed == 1)
        })
        .await
        .map_err(map_tr_err)
}

/// Compare-and-set `from -> to`. Leaving `sending` drops any lease.
pub async fn transition(
    db: &Database,
    id: &str,
    from: CampaignStatus,
    to: CampaignStatus,
    now: DateTime<Utc>,
) -> Result<bool, MailroomError> {
    let id = id.to_string();
    db.connection()
        .call(move |conn| {
            let changed = conn.execute(
                "UPDATE campaigns SET status = ?3, updated_at = ?4, \
                 lease_owner = CASE WHEN ?2 = 'sending' THEN NULL ELSE lease_owner END, \
                 lease_expires_at = CASE WHEN ?2 = 'sending' THEN NULL ELSE lease_expires_at END \
                 WHERE id = ?1 AND status = ?2",
                params![id, from.as_ref(), to.as_ref(), ts(&now)],
            )?;
            Ok(changed == 1)
        })
        .await
        .map_err(map_tr_err)
}

/// Ids of `scheduled` campaigns whose run time has arrived, oldest due first.
pub async fn due(db: &Database, now: DateTime<Utc>, limit: i64) -> Result<Vec<String>, MailroomError> {
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id FROM campaigns WHERE status = 'scheduled' \
                 AND next_run_at IS NOT NULL AND next_run_at <= ?1 \
                 ORDER BY next_run_at ASC, created_at ASC LIMIT ?2",
            )?;
            stmt.query_map(params![ts(&now), limit], |row| row.get(0))?
                .collect::<Result<Vec<String>, _>>()
        })
        .await
        .map_err(map_tr_err)
}

/// Claim a due campaign: `scheduled -> sending` plus a lease, atomically.
pub async fn claim_due(
    db: &Database,
    id: &str,
    owner: &str,
    lease_until: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Result<bool, MailroomError> {
    let id = id.to_string();
    let owner = owner.to_string();
    db.connection()
        .call(move |conn| {
            let changed = conn.execute(
                "UPDATE campaigns SET status = 'sending', lease_owner = ?2, \
                 lease_expires_at = ?3, updated_at = ?4 \
                 WHERE id = ?1 AND status = 'scheduled' \
                 AND next_run_at IS NOT NULL AND next_run_at <= ?4",
                params![id, owner, ts(&lease_until), ts(&now)],
            )?;
            Ok(changed == 1)
        })
        .await
        .map_err(map_tr_err)
}

/// Ids of `sending` campaigns nobody holds a live lease on.
pub async fn stalled(
    db: &Database,
    now: DateTime<Utc>,
    limit: i64,
) -> Result<Vec<String>, MailroomError> {
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT id FROM campaigns WHERE status = 'sending' \
                 AND (lease_expires_at IS NULL OR lease_expires_at <= ?1) \
                 ORDER BY updated_at ASC LIMIT ?2",
            )?;
            stmt.query_map(params![ts(&now), limit], |row| row.get(0))?
                .collect::<Result<Vec<String>, _>>()
        })
        .await
        .map_err(map_tr_err)
}

/// Take over a `sending` campaign whose lease is free or expired.
pub async fn claim_stalled(
    db: &Database,
    id: &str,
    owner: &str,
    lease_until: DateTime<Utc>,
    now: DateTime<Utc>,
) -> Result<bool, MailroomError> {
    let id = id.to_string();
    let owner = owner.to_string();
    db.connection()
        .call(move |conn| {
            let changed = conn.execute(
                "UPDATE campaigns SET lease_owner = ?2, lease_expires_at = ?3, updated_at = ?4 \
                 WHERE id = ?1 AND status = 'sending' \
                 AND (lease_expires_at IS NULL OR lease_expires_at <= ?4)",
                params![id, owner, ts(&lease_until), ts(&now)],
            )?;
            Ok(changed == 1)
        })
        .await
        .map_err(map_tr_err)
}

/// Extend a lease held by `owner`. `false` means the campaign left
/// `sending` or another invocation took it over.
pub async fn renew_lease(
    db: &Database,
    id: &str,
    owner: &str,
    lease_until: DateTime<Utc>,
) -> Result<bool, MailroomError> {
    let id = id.to_string();
    let owner = owner.to_string();
    db.connection()
        .call(move |conn| {
            let changed = conn.execute(
                "UPDATE campaigns SET lease_expires_at = ?3 \
                 WHERE id = ?1 AND status = 'sending' AND lease_owner = ?2",
                params![id, owner, ts(&lease_until)],
            )?;
            Ok(changed == 1)
        })
        .await
        .map_err(map_tr_err)
}

/// Drop `owner`'s lease so the next tick can continue the campaign.
pub async fn release_lease(
    db: &Database,
    id: &str,
    owner: &str,
    now: DateTime<Utc>,
) -> Result<bool, MailroomError> {
    let id = id.to_string();
    let owner = owner.to_string();
    db.connection()
        .call(move |conn| {
            let changed = conn.execute(
                "UPDATE campaigns SET lease_owner = NULL, lease_expires_at = NULL, updated_at = ?3 \
                 WHERE id = ?1 AND status = 'sending' AND lease_owner = ?2",
                params![id, owner, ts(&now)],
            )?;
            Ok(changed == 1)
        })
        .await
        .map_err(map_tr_err)
}

/// End a delivery run held by `owner`: move `sending -> to`, record the run
/// time and the next run (`None` clears it), and drop the lease.
pub async fn finish_run(
    db: &Database,
    id: &str,
    owner: &str,
    to: CampaignStatus,
    next_run_at: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> Result<bool, MailroomError> {
    let id = id.to_string();
    let owner = owner.to_string();
    db.connection()
        .call(move |conn| {
            let changed = conn.execute(
                "UPDATE campaigns SET status = ?3, next_run_at = ?4, last_run_at = ?5, \
                 lease_owner = NULL, lease_expires_at = NULL, updated_at = ?5 \
                 WHERE id = ?1 AND status = 'sending' AND lease_owner = ?2",
                params![id, owner, to.as_ref(), opt_ts(next_run_at.as_ref()), ts(&now)],
            )?;
            Ok(changed == 1)
        })
        .await
        .map_err(map_tr_err)
}

/// Add batch memberships. Already-attached pairs are left alone; an unknown
/// recipient id aborts the whole call.
pub async fn attach_recipients(
    db: &Database,
    campaign_id: &str,
    recipient_ids: Vec<String>,
    now: DateTime<Utc>,
) -> Result<AttachOutcome, MailroomError> {
    let campaign_id = campaign_id.to_string();
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let exists: Option<String> = tx
                .query_row(
                    "SELECT id FROM campaigns WHERE id = ?1",
                    params![campaign_id],
                    |row| row.get(0),
                )
                .optional()?;
            if exists.is_none() {
                return Ok(AttachOutcome::CampaignNotFound);
            }

            let mut attached = 0;
            for recipient_id in &recipient_ids {
                let live: Option<String> = tx
                    .query_row(
                        "SELECT id FROM recipients WHERE id = ?1",
                        params![recipient_id],
                        |row| row.get(0),
                    )
                    .optional()?;
                if live.is_none() {
                    // Dropping the transaction rolls back earlier inserts.
                    return Ok(AttachOutcome::UnknownRecipient(recipient_id.clone()));
                }
                attached += tx.execute(
                    "INSERT INTO campaign_recipients (campaign_id, recipient_id, added_at) \
                     VALUES (?1, ?2, ?3) ON CONFLICT(campaign_id, recipient_id) DO NOTHING",
                    params![campaign_id, recipient_id, ts(&now)],
                )?;
            }
            tx.execute(
                "UPDATE campaigns SET updated_at = ?2 WHERE id = ?1",
                params![campaign_id, ts(&now)],
            )?;
            tx.commit()?;
            Ok(AttachOutcome::Attached(attached))
        })
        .await
        .map_err(map_tr_err)
}

/// Recipient ids attached to a campaign.
pub async fn members(db: &Database, campaign_id: &str) -> Result<Vec<String>, MailroomError> {
    let campaign_id = campaign_id.to_string();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT recipient_id FROM campaign_recipients WHERE campaign_id = ?1 \
                 ORDER BY added_at ASC, recipient_id ASC",
            )?;
            stmt.query_map(params![campaign_id], |row| row.get(0))?
                .collect::<Result<Vec<String>, _>>()
        })
        .await
        .map_err(map_tr_err)
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;
    use crate::convert::now;
    use crate::queries::recipients;
    use crate::test_support::{campaign, recipient, setup_db};

    #[tokio::test]
    async fn insert_get_and_list_by_status() {
        let (db, _dir) = setup_db().await;
        let draft = campaign("Spring sale");
        insert(&db, &draft).await.unwrap();

        assert_eq!(get(&db, &draft.id).await.unwrap().unwrap(), draft);
        assert_eq!(list(&db, None).await.unwrap().len(), 1);
        assert_eq!(
            list(&db, Some(CampaignStatus::Draft)).await.unwrap().len(),
            1
        );
        assert!(
            list(&db, Some(CampaignStatus::Sending))
                .await
                .unwrap()
                .is_empty()
        );
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn set_schedule_only_from_allowed_states() {
        let (db, _dir) = setup_db().await;
        let c = campaign("Weekly digest");
        insert(&db, &c).await.unwrap();
        let at = now();
        let spec = ScheduleSpec::once(at);

        assert!(
            set_schedule(&db, &c.id, &spec, &[CampaignStatus::Draft], at)
                .await
                .unwrap()
        );
        let loaded = get(&db, &c.id).await.unwrap().unwrap();
        assert_eq!(loaded.status, CampaignStatus::Scheduled);
        assert_eq!(loaded.schedule, Some(spec.clone()));

        // Already scheduled: the draft-only condition no longer holds.
        assert!(
            !set_schedule(&db, &c.id, &spec, &[CampaignStatus::Draft], at)
                .await
                .unwrap()
        );
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn claim_due_is_won_exactly_once() {
        let (db, _dir) = setup_db().await;
        let c = campaign("Launch");
        insert(&db, &c).await.unwrap();
        let at = now();
        set_schedule(&db, &c.id, &ScheduleSpec::once(at), &[CampaignStatus::Draft], at)
            .await
            .unwrap();

        assert_eq!(due(&db, at, 10).await.unwrap(), vec![c.id.clone()]);
        let lease = at + Duration::minutes(5);
        assert!(claim_due(&db, &c.id, "run-a", lease, at).await.unwrap());
        assert!(!claim_due(&db, &c.id, "run-b", lease, at).await.unwrap());
        assert!(due(&db, at, 10).await.unwrap().is_empty());
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn future_campaigns_are_not_due() {
        let (db, _dir) = setup_db().await;
        let c = campaign("Later");
        insert(&db, &c).await.unwrap();
        let at = now();
        let later = at + Duration::hours(1);
        set_schedule(&db, &c.id, &ScheduleSpec::once(later), &[CampaignStatus::Draft], at)
            .await
            .unwrap();
        assert!(due(&db, at, 10).await.unwrap().is_empty());
        assert!(
            !claim_due(&db, &c.id, "run-a", later, at).await.unwrap(),
            "a future campaign cannot be claimed early"
        );
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn leases_gate_resumption() {
        let (db, _dir) = setup_db().await;
        let c = campaign("Resumable");
        insert(&db, &c).await.unwrap();
        let at = now();
        set_schedule(&db, &c.id, &ScheduleSpec::once(at), &[CampaignStatus::Draft], at)
            .await
            .unwrap();
        let lease = at + Duration::minutes(5);
        claim_due(&db, &c.id, "run-a", lease, at).await.unwrap();

        // Live lease: nobody else may resume.
        assert!(stalled(&db, at, 10).await.unwrap().is_empty());
        assert!(!claim_stalled(&db, &c.id, "run-b", lease, at).await.unwrap());
        assert!(!renew_lease(&db, &c.id, "run-b", lease).await.unwrap());

        // Released lease: resumable immediately.
        assert!(release_lease(&db, &c.id, "run-a", at).await.unwrap());
        assert_eq!(stalled(&db, at, 10).await.unwrap(), vec![c.id.clone()]);
        assert!(claim_stalled(&db, &c.id, "run-b", lease, at).await.unwrap());
        assert!(!renew_lease(&db, &c.id, "run-a", lease).await.unwrap());

        // Only the owner may finish the run.
        assert!(
            !finish_run(&db, &c.id, "run-a", CampaignStatus::Completed, None, at)
                .await
                .unwrap()
        );
        assert!(
            finish_run(&db, &c.id, "run-b", CampaignStatus::Completed, None, at)
                .await
                .unwrap()
        );
        let done = get(&db, &c.id).await.unwrap().unwrap();
        assert_eq!(done.status, CampaignStatus::Completed);
        assert!(done.lease_expires_at.is_none());
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn transition_is_compare_and_set() {
        let (db, _dir) = setup_db().await;
        let c = campaign("CAS");
        insert(&db, &c).await.unwrap();
        let at = now();
        assert!(
            !transition(&db, &c.id, CampaignStatus::Scheduled, CampaignStatus::Paused, at)
                .await
                .unwrap()
        );
        assert!(
            transition(&db, &c.id, CampaignStatus::Draft, CampaignStatus::Scheduled, at)
                .await
                .unwrap()
        );
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn attach_is_idempotent_and_all_or_nothing() {
        let (db, _dir) = setup_db().await;
        let c = campaign("Members");
        insert(&db, &c).await.unwrap();
        let a = recipient("a@x.com");
        let b = recipient("b@x.com");
        recipients::insert_many(&db, vec![a.clone(), b.clone()])
            .await
            .unwrap();
        let at = now();

        assert_eq!(
            attach_recipients(&db, &c.id, vec![a.id.clone()], at)
                .await
                .unwrap(),
            AttachOutcome::Attached(1)
        );
        assert_eq!(
            attach_recipients(&db, &c.id, vec![a.id.clone(), b.id.clone()], at)
                .await
                .unwrap(),
            AttachOutcome::Attached(1)
        );
        assert_eq!(
            attach_recipients(&db, &c.id, vec!["nope".into()], at)
                .await
                .unwrap(),
            AttachOutcome::UnknownRecipient("nope".into())
        );
        assert_eq!(
            attach_recipients(&db, "missing", vec![a.id.clone()], at)
                .await
                .unwrap(),
            AttachOutcome::CampaignNotFound
        );
        assert_eq!(members(&db, &c.id).await.unwrap().len(), 2);
        db.close().await.unwrap();
    }
}
