// SPDX-FileCopyrightText: 2026 Mailroom Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Send ledger: one row per (campaign, recipient).
//!
//! The `UNIQUE (campaign_id, recipient_id)` key makes row creation
//! idempotent, and every status write is conditional on `status = 'pending'`,
//! so a row reaches a final status exactly once. Campaign counters move in
//! the same transaction as the ledger write that justifies them.

use chrono::{DateTime, Utc};
use mailroom_core::{Audience, MailroomError, SendStatus};
use rusqlite::{OptionalExtension, Row, TransactionBehavior, params};

use crate::convert::{get_enum, get_opt_ts, get_ts, ts};
use crate::database::{Database, map_tr_err};
use crate::models::{
    DeliveryCandidate, PendingClaim, Recipient, SendClaim, SendLedgerEntry, SendOutcome,
    TrackOutcome,
};
use crate::queries::recipients::{recipient_columns, row_to_recipient};

pub(crate) const SEND_COLUMNS: &str = "id, campaign_id, recipient_id, recipient_email, status, \
     attempts, last_error, tracking_token, sent_at, opened_at, clicked_at, open_events, \
     click_events, created_at";

pub(crate) fn row_to_send(row: &Row<'_>) -> rusqlite::Result<SendLedgerEntry> {
    Ok(SendLedgerEntry {
        id: row.get(0)?,
        campaign_id: row.get(1)?,
        recipient_id: row.get(2)?,
        recipient_email: row.get(3)?,
        status: get_enum(row, 4)?,
        attempts: row.get(5)?,
        last_error: row.get(6)?,
        tracking_token: row.get(7)?,
        sent_at: get_opt_ts(row, 8)?,
        opened_at: get_opt_ts(row, 9)?,
        clicked_at: get_opt_ts(row, 10)?,
        open_events: row.get(11)?,
        click_events: row.get(12)?,
        created_at: get_ts(row, 13)?,
    })
}

/// Audience members that still need a send: no ledger row yet, or a row an
/// interrupted run left `pending` whose claim is free, expired, or already
/// ours. Unsubscribed recipients are excluded.
fn candidates_sql(audience: Audience) -> String {
    let cols = recipient_columns("r");
    let open_row = "(s.id IS NULL OR (s.status = 'pending' AND (s.claim_owner IS NULL \
                    OR s.claim_owner = ?3 OR s.claim_expires_at <= ?4)))";
    match audience {
        Audience::Explicit => format!(
            "SELECT {cols}, s.id FROM campaign_recipients cr \
             JOIN recipients r ON r.id = cr.recipient_id \
             LEFT JOIN campaign_sends s ON s.campaign_id = cr.campaign_id AND s.recipient_id = r.id \
             WHERE cr.campaign_id = ?1 AND r.unsubscribed_at IS NULL AND {open_row} \
             ORDER BY cr.added_at ASC, cr.rowid ASC LIMIT ?2"
        ),
        Audience::All => format!(
            "SELECT {cols}, s.id FROM recipients r \
             LEFT JOIN campaign_sends s ON s.campaign_id = ?1 AND s.recipient_id = r.id \
             WHERE r.unsubscribed_at IS NULL AND {open_row} \
             ORDER BY r.created_at ASC, r.rowid ASC LIMIT ?2"
        ),
    }
}

/// Next sub-batch of recipients `owner` may deliver to as of `now`.
pub async fn candidates(
    db: &Database,
    campaign_id: &str,
    audience: Audience,
    owner: &str,
    now: DateTime<Utc>,
    limit: i64,
) -> Result<Vec<DeliveryCandidate>, MailroomError> {
    let campaign_id = campaign_id.to_string();
    let owner = owner.to_string();
    let sql = candidates_sql(audience);
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&sql)?;
            stmt.query_map(params![campaign_id, limit, owner, ts(&now)], |row| {
                Ok(DeliveryCandidate {
                    recipient: row_to_recipient(row, 0)?,
                    pending_send_id: row.get(10)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()
        })
        .await
        .map_err(map_tr_err)
}

/// Pending rows of a campaign under a live claim held by someone other than
/// `owner`.
pub async fn held_count(
    db: &Database,
    campaign_id: &str,
    owner: &str,
    now: DateTime<Utc>,
) -> Result<i64, MailroomError> {
    let campaign_id = campaign_id.to_string();
    let owner = owner.to_string();
    db.connection()
        .call(move |conn| {
            conn.query_row(
                "SELECT COUNT(*) FROM campaign_sends \
                 WHERE campaign_id = ?1 AND status = 'pending' \
                 AND claim_owner IS NOT NULL AND claim_owner <> ?2 AND claim_expires_at > ?3",
                params![campaign_id, owner, ts(&now)],
                |row| row.get(0),
            )
        })
        .await
        .map_err(map_tr_err)
}

/// Number of audience members whose ledger row is already final.
pub async fn settled_count(
    db: &Database,
    campaign_id: &str,
    audience: Audience,
) -> Result<i64, MailroomError> {
    let campaign_id = campaign_id.to_string();
    let sql = match audience {
        Audience::Explicit => {
            "SELECT COUNT(*) FROM campaign_recipients cr \
             JOIN campaign_sends s ON s.campaign_id = cr.campaign_id AND s.recipient_id = cr.recipient_id \
             WHERE cr.campaign_id = ?1 AND s.status <> 'pending'"
        }
        Audience::All => {
            "SELECT COUNT(*) FROM campaign_sends s \
             WHERE s.campaign_id = ?1 AND s.status <> 'pending'"
        }
    };
    db.connection()
        .call(move |conn| conn.query_row(sql, params![campaign_id], |row| row.get(0)))
        .await
        .map_err(map_tr_err)
}

/// Create or take over the `pending` row for this pair under `claim`.
///
/// An existing pending row is taken over only when its claim is free,
/// expired, or already ours. `recipient_count` grows only when a row is
/// created. A recipient deleted since the candidate list was read is
/// reported instead of failing the foreign key.
pub async fn ensure_pending(
    db: &Database,
    campaign_id: &str,
    recipient: &Recipient,
    send_id: &str,
    tracking_token: &str,
    claim: &SendClaim,
    now: DateTime<Utc>,
) -> Result<PendingClaim, MailroomError> {
    let campaign_id = campaign_id.to_string();
    let recipient_id = recipient.id.clone();
    let email = recipient.email.clone();
    let send_id = send_id.to_string();
    let token = tracking_token.to_string();
    let claim = claim.clone();
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let live: bool = tx.query_row(
                "SELECT EXISTS(SELECT 1 FROM recipients WHERE id = ?1)",
                params![recipient_id],
                |row| row.get(0),
            )?;
            if !live {
                return Ok(PendingClaim::RecipientGone);
            }

            let created = tx.execute(
                "INSERT INTO campaign_sends (id, campaign_id, recipient_id, recipient_email, \
                 status, attempts, tracking_token, created_at, claim_owner, claimed_at, \
                 claim_expires_at) \
                 VALUES (?1, ?2, ?3, ?4, 'pending', 0, ?5, ?6, ?7, ?6, ?8) \
                 ON CONFLICT(campaign_id, recipient_id) DO NOTHING",
                params![
                    send_id,
                    campaign_id,
                    recipient_id,
                    email,
                    token,
                    ts(&now),
                    claim.owner,
                    ts(&claim.expires_at)
                ],
            )? == 1;
            let held = if created {
                tx.execute(
                    "UPDATE campaigns SET recipient_count = recipient_count + 1, updated_at = ?2 \
                     WHERE id = ?1",
                    params![campaign_id, ts(&now)],
                )?;
                true
            } else {
                tx.execute(
                    "UPDATE campaign_sends SET claim_owner = ?3, claimed_at = ?4, \
                     claim_expires_at = ?5 \
                     WHERE campaign_id = ?1 AND recipient_id = ?2 AND status = 'pending' \
                     AND (claim_owner IS NULL OR claim_owner = ?3 OR claim_expires_at <= ?4)",
                    params![
                        campaign_id,
                        recipient_id,
                        claim.owner,
                        ts(&now),
                        ts(&claim.expires_at)
                    ],
                )? == 1
            };
            let entry = tx.query_row(
                &format!(
                    "SELECT {SEND_COLUMNS} FROM campaign_sends \
                     WHERE campaign_id = ?1 AND recipient_id = ?2"
                ),
                params![campaign_id, recipient_id],
                row_to_send,
            )?;
            tx.commit()?;
            Ok(if entry.status != SendStatus::Pending {
                PendingClaim::Settled
            } else if held {
                PendingClaim::Claimed(entry)
            } else {
                PendingClaim::Held
            })
        })
        .await
        .map_err(map_tr_err)
}

/// Move a `pending` row to its final status and bump the matching campaign
/// counter. Returns `false` if the row was no longer pending.
pub async fn record_outcome(
    db: &Database,
    send_id: &str,
    outcome: &SendOutcome,
) -> Result<bool, MailroomError> {
    let send_id = send_id.to_string();
    let outcome = outcome.clone();
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let sent = outcome.status == SendStatus::Sent;
            let changed = tx.execute(
                "UPDATE campaign_sends SET status = ?2, attempts = attempts + ?3, \
                 last_error = ?4, sent_at = ?5 WHERE id = ?1 AND status = 'pending'",
                params![
                    send_id,
                    outcome.status.as_ref(),
                    outcome.attempts,
                    outcome.last_error,
                    sent.then(|| ts(&outcome.at)),
                ],
            )?;
            if changed == 1 {
                let column = if sent { "sent_count" } else { "failed_count" };
                tx.execute(
                    &format!(
                        "UPDATE campaigns SET {column} = {column} + 1, updated_at = ?2 \
                         WHERE id = (SELECT campaign_id FROM campaign_sends WHERE id = ?1)"
                    ),
                    params![send_id, ts(&outcome.at)],
                )?;
            }
            tx.commit()?;
            Ok(changed == 1)
        })
        .await
        .map_err(map_tr_err)
}

pub async fn list_for_campaign(
    db: &Database,
    campaign_id: &str,
) -> Result<Vec<SendLedgerEntry>, MailroomError> {
    let campaign_id = campaign_id.to_string();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {SEND_COLUMNS} FROM campaign_sends WHERE campaign_id = ?1 \
                 ORDER BY created_at ASC, rowid ASC"
            ))?;
            stmt.query_map(params![campaign_id], row_to_send)?
                .collect::<Result<Vec<_>, _>>()
        })
        .await
        .map_err(map_tr_err)
}

pub async fn get_by_token(
    db: &Database,
    token: &str,
) -> Result<Option<SendLedgerEntry>, MailroomError> {
    let token = token.to_string();
    db.connection()
        .call(move |conn| {
            conn.query_row(
                &format!("SELECT {SEND_COLUMNS} FROM campaign_sends WHERE tracking_token = ?1"),
                params![token],
                row_to_send,
            )
            .optional()
        })
        .await
        .map_err(map_tr_err)
}

#[derive(Clone, Copy)]
enum Interaction {
    Open,
    Click,
}

impl Interaction {
    /// (first-seen column, event counter column, campaign counter column)
    fn columns(self) -> (&'static str, &'static str, &'static str) {
        match self {
            Self::Open => ("opened_at", "open_events", "opened_count"),
            Self::Click => ("clicked_at", "click_events", "clicked_count"),
        }
    }
}

async fn record_interaction(
    db: &Database,
    token: &str,
    kind: Interaction,
    now: DateTime<Utc>,
) -> Result<TrackOutcome, MailroomError> {
    let token = token.to_string();
    let (first_col, events_col, counter_col) = kind.columns();
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let row: Option<(String, String)> = tx
                .query_row(
                    "SELECT id, campaign_id FROM campaign_sends WHERE tracking_token = ?1",
                    params![token],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()?;
            let Some((send_id, campaign_id)) = row else {
                return Ok(TrackOutcome::UnknownToken);
            };

            tx.execute(
                &format!("UPDATE campaign_sends SET {events_col} = {events_col} + 1 WHERE id = ?1"),
                params![send_id],
            )?;
            // Conditional on NULL so concurrent first events count once.
            let first = tx.execute(
                &format!(
                    "UPDATE campaign_sends SET {first_col} = ?2 \
                     WHERE id = ?1 AND {first_col} IS NULL"
                ),
                params![send_id, ts(&now)],
            )? == 1;
            if first {
                tx.execute(
                    &format!(
                        "UPDATE campaigns SET {counter_col} = {counter_col} + 1, updated_at = ?2 \
                         WHERE id = ?1"
                    ),
                    params![campaign_id, ts(&now)],
                )?;
            }
            tx.commit()?;
            Ok(if first {
                TrackOutcome::First { campaign_id }
            } else {
                TrackOutcome::Repeat { campaign_id }
            })
        })
        .await
        .map_err(map_tr_err)
}

/// Record an open-pixel hit.
pub async fn record_open(
    db: &Database,
    token: &str,
    now: DateTime<Utc>,
) -> Result<TrackOutcome, MailroomError> {
    record_interaction(db, token, Interaction::Open, now).await
}

/// Record a click-through.
pub async fn record_click(
    db: &Database,
    token: &str,
    now: DateTime<Utc>,
) -> Result<TrackOutcome, MailroomError> {
    record_interaction(db, token, Interaction::Click, now).await
}

/// Flag the recipient behind `token` as unsubscribed.
///
/// Returns `true` only if a live, still-subscribed recipient was flagged.
pub async fn unsubscribe_by_token(
    db: &Database,
    token: &str,
    now: DateTime<Utc>,
) -> Result<bool, MailroomError> {
    let token = token.to_string();
    db.connection()
        .call(move |conn| {
            let changed = conn.execute(
                "UPDATE recipients SET unsubscribed_at = ?2, updated_at = ?2 \
                 WHERE unsubscribed_at IS NULL AND id = \
                 (SELECT recipient_id FROM campaign_sends WHERE tracking_token = ?1)",
                params![token, ts(&now)],
            )?;
            Ok(changed == 1)
        })
        .await
        .map_err(map_tr_err)
}

/// Total ledger rows for a campaign.
pub async fn count_for_campaign(db: &Database, campaign_id: &str) -> Result<i64, MailroomError> {
    let campaign_id = campaign_id.to_string();
    db.connection()
        .call(move |conn| {
            conn.query_row(
                "SELECT COUNT(*) FROM campaign_sends WHERE campaign_id = ?1",
                params![campaign_id],
                |row| row.get(0),
            )
        })
        .await
        .map_err(map_tr_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::convert::now;
    use crate::queries::{campaigns, recipients};
    use crate::test_support::{campaign, claim, pending_row, recipient, setup_db};

    async fn seeded() -> (Database, tempfile::TempDir, String, Vec<Recipient>) {
        let (db, dir) = setup_db().await;
        let c = campaign("Ledger");
        campaigns::insert(&db, &c).await.unwrap();
        let base = now();
        let rs: Vec<Recipient> = (0..3)
            .map(|i| {
                let mut r = recipient(&format!("r{i}@x.com"));
                r.created_at = base + chrono::Duration::seconds(i);
                r
            })
            .collect();
        recipients::insert_many(&db, rs.clone()).await.unwrap();
        let ids = rs.iter().map(|r| r.id.clone()).collect();
        campaigns::attach_recipients(&db, &c.id, ids, base).await.unwrap();
        (db, dir, c.id, rs)
    }

    fn outcome(status: SendStatus) -> SendOutcome {
        SendOutcome {
            status,
            attempts: 1,
            last_error: None,
            at: now(),
        }
    }

    #[tokio::test]
    async fn ensure_pending_creates_one_row_per_pair() {
        let (db, _dir, cid, rs) = seeded().await;
        let at = now();
        let first = pending_row(&db, &cid, &rs[0], "s1", "tok1", at).await;
        let again = pending_row(&db, &cid, &rs[0], "s2", "tok2", at).await;
        assert_eq!(first.id, again.id);
        assert_eq!(again.tracking_token, "tok1");
        assert_eq!(count_for_campaign(&db, &cid).await.unwrap(), 1);
        let c = campaigns::get(&db, &cid).await.unwrap().unwrap();
        assert_eq!(c.recipient_count, 1);
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn final_status_is_written_once_with_counters() {
        let (db, _dir, cid, rs) = seeded().await;
        let at = now();
        let row = pending_row(&db, &cid, &rs[0], "s1", "tok1", at).await;
        assert!(record_outcome(&db, &row.id, &outcome(SendStatus::Sent)).await.unwrap());
        assert!(!record_outcome(&db, &row.id, &outcome(SendStatus::Failed)).await.unwrap());

        let stored = get_by_token(&db, "tok1").await.unwrap().unwrap();
        assert_eq!(stored.status, SendStatus::Sent);
        assert!(stored.sent_at.is_some());
        let c = campaigns::get(&db, &cid).await.unwrap().unwrap();
        assert_eq!((c.sent_count, c.failed_count), (1, 0));

        // A settled row is skipped rather than reopened.
        assert_eq!(
            ensure_pending(&db, &cid, &rs[0], "s9", "tok9", &claim("run-b"), at)
                .await
                .unwrap(),
            PendingClaim::Settled
        );
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn live_claims_keep_rows_from_other_runs() {
        let (db, _dir, cid, rs) = seeded().await;
        let at = now();
        pending_row(&db, &cid, &rs[0], "s1", "tok1", at).await;

        // run-a holds r0 until its claim expires.
        assert_eq!(
            ensure_pending(&db, &cid, &rs[0], "s2", "tok2", &claim("run-b"), at)
                .await
                .unwrap(),
            PendingClaim::Held
        );
        let for_b = candidates(&db, &cid, Audience::Explicit, "run-b", at, 10)
            .await
            .unwrap();
        assert_eq!(for_b.len(), 2);
        assert!(for_b.iter().all(|c| c.recipient.id != rs[0].id));
        assert_eq!(held_count(&db, &cid, "run-b", at).await.unwrap(), 1);
        assert_eq!(held_count(&db, &cid, "run-a", at).await.unwrap(), 0);

        // Once the claim lapses the row is up for grabs again.
        let later = at + chrono::Duration::hours(2);
        let taken = ensure_pending(&db, &cid, &rs[0], "s2", "tok2", &claim("run-b"), later)
            .await
            .unwrap();
        assert!(matches!(taken, PendingClaim::Claimed(ref e) if e.id == "s1"));
        assert_eq!(held_count(&db, &cid, "run-b", later).await.unwrap(), 0);
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn deleted_recipient_is_reported_not_failed() {
        let (db, _dir, cid, _rs) = seeded().await;
        let ghost = recipient("ghost@x.com");
        let result = ensure_pending(&db, &cid, &ghost, "s1", "tok1", &claim("run-a"), now())
            .await
            .unwrap();
        assert_eq!(result, PendingClaim::RecipientGone);
        assert_eq!(count_for_campaign(&db, &cid).await.unwrap(), 0);
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn candidates_exclude_settled_and_unsubscribed() {
        let (db, _dir, cid, rs) = seeded().await;
        let at = now();
        let row = pending_row(&db, &cid, &rs[0], "s1", "tok1", at).await;
        record_outcome(&db, &row.id, &outcome(SendStatus::Bounced))
            .await
            .unwrap();
        let pending = pending_row(&db, &cid, &rs[1], "s2", "tok2", at).await;
        let mut gone = rs[2].clone();
        gone.unsubscribed_at = Some(at);
        recipients::update(&db, &gone).await.unwrap();

        let next = candidates(&db, &cid, Audience::Explicit, "run-a", at, 10)
            .await
            .unwrap();
        assert_eq!(next.len(), 1);
        assert_eq!(next[0].recipient.id, rs[1].id);
        assert_eq!(next[0].pending_send_id.as_deref(), Some(pending.id.as_str()));
        assert_eq!(
            settled_count(&db, &cid, Audience::Explicit).await.unwrap(),
            1
        );
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn repeated_opens_keep_first_timestamp() {
        let (db, _dir, cid, rs) = seeded().await;
        let first_at = now();
        let row = pending_row(&db, &cid, &rs[0], "s1", "tok1", first_at).await;
        record_outcome(&db, &row.id, &outcome(SendStatus::Sent))
            .await
            .unwrap();

        assert_eq!(
            record_open(&db, "tok1", first_at).await.unwrap(),
            TrackOutcome::First {
                campaign_id: cid.clone()
            }
        );
        let later = first_at + chrono::Duration::minutes(3);
        assert_eq!(
            record_open(&db, "tok1", later).await.unwrap(),
            TrackOutcome::Repeat {
                campaign_id: cid.clone()
            }
        );
        assert_eq!(
            record_open(&db, "missing", later).await.unwrap(),
            TrackOutcome::UnknownToken
        );

        let stored = get_by_token(&db, "tok1").await.unwrap().unwrap();
        assert_eq!(stored.opened_at, Some(first_at));
        assert_eq!(stored.open_events, 2);
        assert_eq!(
            campaigns::get(&db, &cid).await.unwrap().unwrap().opened_count,
            1
        );
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn unsubscribe_flags_only_once() {
        let (db, _dir, cid, rs) = seeded().await;
        let at = now();
        pending_row(&db, &cid, &rs[0], "s1", "tok1", at).await;
        assert!(unsubscribe_by_token(&db, "tok1", at).await.unwrap());
        assert!(!unsubscribe_by_token(&db, "tok1", at).await.unwrap());
        assert!(!unsubscribe_by_token(&db, "nope", at).await.unwrap());
        let r = recipients::get(&db, &rs[0].id).await.unwrap().unwrap();
        assert_eq!(r.unsubscribed_at, Some(at));
        db.close().await.unwrap();
    }
}
