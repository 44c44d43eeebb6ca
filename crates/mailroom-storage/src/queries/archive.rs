// SPDX-FileCopyrightText: 2026 Mailroom Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Soft deletion: moving recipients and their ledger rows between the live
//! tables and the append-only `deleted_*` shadow tables.
//!
//! Each move is one IMMEDIATE transaction. Children are copied and deleted
//! before their parent, and campaign counters are adjusted for every ledger
//! row that leaves or re-enters the live tables.

use chrono::{DateTime, Utc};
use mailroom_core::{MailroomError, SendStatus};
use rusqlite::{OptionalExtension, Row, Transaction, TransactionBehavior, params};

use crate::convert::{
    attributes_json, get_attributes, get_enum, get_opt_ts, get_string_list, get_ts, opt_ts, ts,
};
use crate::database::{Database, map_tr_err};
use crate::models::{
    ArchivedRecipient, ArchivedSendLedgerEntry, Recipient, RestoreOutcome, SendLedgerEntry,
};
use crate::queries::ledger::{SEND_COLUMNS, row_to_send};
use crate::queries::recipients::{recipient_columns, row_to_recipient};

const ARCHIVED_RECIPIENT_COLUMNS: &str = "archive_id, original_id, email, display_name, \
     first_name, last_name, organization, attributes, unsubscribed_at, created_at, memberships, \
     deleted_by, deletion_reason, deleted_at, restored_at";

const ARCHIVED_SEND_COLUMNS: &str = "archive_id, original_id, recipient_archive_id, campaign_id, \
     recipient_id, recipient_email, status, attempts, last_error, tracking_token, sent_at, \
     opened_at, clicked_at, open_events, click_events, created_at, deleted_by, deletion_reason, \
     deleted_at";

fn row_to_archived_recipient(row: &Row<'_>) -> rusqlite::Result<ArchivedRecipient> {
    Ok(ArchivedRecipient {
        archive_id: row.get(0)?,
        original_id: row.get(1)?,
        email: row.get(2)?,
        display_name: row.get(3)?,
        first_name: row.get(4)?,
        last_name: row.get(5)?,
        organization: row.get(6)?,
        attributes: get_attributes(row, 7)?,
        unsubscribed_at: get_opt_ts(row, 8)?,
        created_at: get_ts(row, 9)?,
        memberships: get_string_list(row, 10)?,
        deleted_by: row.get(11)?,
        deletion_reason: row.get(12)?,
        deleted_at: get_ts(row, 13)?,
        restored_at: get_opt_ts(row, 14)?,
    })
}

fn row_to_archived_send(row: &Row<'_>) -> rusqlite::Result<ArchivedSendLedgerEntry> {
    Ok(ArchivedSendLedgerEntry {
        archive_id: row.get(0)?,
        original_id: row.get(1)?,
        recipient_archive_id: row.get(2)?,
        campaign_id: row.get(3)?,
        recipient_id: row.get(4)?,
        recipient_email: row.get(5)?,
        status: get_enum(row, 6)?,
        attempts: row.get(7)?,
        last_error: row.get(8)?,
        tracking_token: row.get(9)?,
        sent_at: get_opt_ts(row, 10)?,
        opened_at: get_opt_ts(row, 11)?,
        clicked_at: get_opt_ts(row, 12)?,
        open_events: row.get(13)?,
        click_events: row.get(14)?,
        created_at: get_ts(row, 15)?,
        deleted_by: row.get(16)?,
        deletion_reason: row.get(17)?,
        deleted_at: get_ts(row, 18)?,
    })
}

/// Add `sign` (+1 or -1) times this row's contribution to its campaign's
/// counters, never going below zero.
fn adjust_counters(
    tx: &Transaction<'_>,
    send: &SendLedgerEntry,
    sign: i64,
    now: &DateTime<Utc>,
) -> rusqlite::Result<()> {
    let sent = i64::from(send.status == SendStatus::Sent);
    let failed = i64::from(matches!(send.status, SendStatus::Failed | SendStatus::Bounced));
    let opened = i64::from(send.opened_at.is_some());
    let clicked = i64::from(send.clicked_at.is_some());
    tx.execute(
        "UPDATE campaigns SET \
         recipient_count = MAX(recipient_count + ?2, 0), \
         sent_count = MAX(sent_count + ?3, 0), \
         failed_count = MAX(failed_count + ?4, 0), \
         opened_count = MAX(opened_count + ?5, 0), \
         clicked_count = MAX(clicked_count + ?6, 0), \
         updated_at = ?7 WHERE id = ?1",
        params![
            send.campaign_id,
            sign,
            sign * sent,
            sign * failed,
            sign * opened,
            sign * clicked,
            ts(now),
        ],
    )?;
    Ok(())
}

/// Archive a recipient with its ledger rows and memberships, then remove
/// them from the live tables. Returns `None` if no live recipient has `id`.
pub async fn soft_delete(
    db: &Database,
    recipient_id: &str,
    archive_id: &str,
    deleted_by: &str,
    deletion_reason: &str,
    now: DateTime<Utc>,
) -> Result<Option<ArchivedRecipient>, MailroomError> {
    let recipient_id = recipient_id.to_string();
    let archive_id = archive_id.to_string();
    let deleted_by = deleted_by.to_string();
    let deletion_reason = deletion_reason.to_string();
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let recipient: Option<Recipient> = tx
                .query_row(
                    &format!(
                        "SELECT {} FROM recipients r WHERE r.id = ?1",
                        recipient_columns("r")
                    ),
                    params![recipient_id],
                    |row| row_to_recipient(row, 0),
                )
                .optional()?;
            let Some(recipient) = recipient else {
                return Ok(None);
            };

            let memberships: Vec<String> = {
                let mut stmt = tx.prepare(
                    "SELECT campaign_id FROM campaign_recipients WHERE recipient_id = ?1 \
                     ORDER BY campaign_id",
                )?;
                stmt.query_map(params![recipient_id], |row| row.get(0))?
                    .collect::<Result<Vec<_>, _>>()?
            };
            let sends: Vec<SendLedgerEntry> = {
                let mut stmt = tx.prepare(&format!(
                    "SELECT {SEND_COLUMNS} FROM campaign_sends WHERE recipient_id = ?1 \
                     ORDER BY created_at, rowid"
                ))?;
                stmt.query_map(params![recipient_id], row_to_send)?
                    .collect::<Result<Vec<_>, _>>()?
            };

            let archived = ArchivedRecipient {
                archive_id: archive_id.clone(),
                original_id: recipient.id.clone(),
                email: recipient.email.clone(),
                display_name: recipient.display_name.clone(),
                first_name: recipient.first_name.clone(),
                last_name: recipient.last_name.clone(),
                organization: recipient.organization.clone(),
                attributes: recipient.attributes.clone(),
                unsubscribed_at: recipient.unsubscribed_at,
                created_at: recipient.created_at,
                memberships,
                deleted_by: deleted_by.clone(),
                deletion_reason: deletion_reason.clone(),
                deleted_at: now,
                restored_at: None,
            };
            let memberships_json =
                serde_json::to_string(&archived.memberships).unwrap_or_else(|_| "[]".to_string());
            tx.execute(
                &format!(
                    "INSERT INTO deleted_recipients ({ARCHIVED_RECIPIENT_COLUMNS}) VALUES \
                     (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, NULL)"
                ),
                params![
                    archived.archive_id,
                    archived.original_id,
                    archived.email,
                    archived.display_name,
                    archived.first_name,
                    archived.last_name,
                    archived.organization,
                    attributes_json(&archived.attributes),
                    opt_ts(archived.unsubscribed_at.as_ref()),
                    ts(&archived.created_at),
                    memberships_json,
                    archived.deleted_by,
                    archived.deletion_reason,
                    ts(&now),
                ],
            )?;

            for send in &sends {
                tx.execute(
                    &format!(
                        "INSERT INTO deleted_campaign_sends ({ARCHIVED_SEND_COLUMNS}) VALUES \
                         (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, \
                         ?16, ?17, ?18, ?19)"
                    ),
                    params![
                        uuid::Uuid::new_v4().to_string(),
                        send.id,
                        archive_id,
                        send.campaign_id,
                        send.recipient_id,
                        send.recipient_email,
                        send.status.as_ref(),
                        send.attempts,
                        send.last_error,
                        send.tracking_token,
                        opt_ts(send.sent_at.as_ref()),
                        opt_ts(send.opened_at.as_ref()),
                        opt_ts(send.clicked_at.as_ref()),
                        send.open_events,
                        send.click_events,
                        ts(&send.created_at),
                        deleted_by,
                        deletion_reason,
                        ts(&now),
                    ],
                )?;
                adjust_counters(&tx, send, -1, &now)?;
            }

            tx.execute(
                "DELETE FROM campaign_sends WHERE recipient_id = ?1",
                params![recipient_id],
            )?;
            tx.execute(
                "DELETE FROM campaign_recipients WHERE recipient_id = ?1",
                params![recipient_id],
            )?;
            tx.execute("DELETE FROM recipients WHERE id = ?1", params![recipient_id])?;
            tx.commit()?;
            Ok(Some(archived))
        })
        .await
        .map_err(map_tr_err)
}

/// Move an archived recipient back into the live tables with its ledger rows
/// and memberships. Rows for campaigns that no longer exist stay archived.
pub async fn restore(
    db: &Database,
    archive_id: &str,
    now: DateTime<Utc>,
) -> Result<RestoreOutcome, MailroomError> {
    let archive_id = archive_id.to_string();
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let archived: Option<ArchivedRecipient> = tx
                .query_row(
                    &format!(
                        "SELECT {ARCHIVED_RECIPIENT_COLUMNS} FROM deleted_recipients \
                         WHERE archive_id = ?1"
                    ),
                    params![archive_id],
                    row_to_archived_recipient,
                )
                .optional()?;
            let Some(archived) = archived else {
                return Ok(RestoreOutcome::NotFound);
            };
            if archived.restored_at.is_some() {
                return Ok(RestoreOutcome::AlreadyRestored);
            }
            let taken: Option<String> = tx
                .query_row(
                    "SELECT id FROM recipients WHERE email = ?1 OR id = ?2",
                    params![archived.email, archived.original_id],
                    |row| row.get(0),
                )
                .optional()?;
            if taken.is_some() {
                return Ok(RestoreOutcome::EmailTaken);
            }

            let recipient = Recipient {
                id: archived.original_id.clone(),
                email: archived.email.clone(),
                display_name: archived.display_name.clone(),
                first_name: archived.first_name.clone(),
                last_name: archived.last_name.clone(),
                organization: archived.organization.clone(),
                attributes: archived.attributes.clone(),
                unsubscribed_at: archived.unsubscribed_at,
                created_at: archived.created_at,
                updated_at: now,
            };
            tx.execute(
                "INSERT INTO recipients (id, email, display_name, first_name, last_name, \
                 organization, attributes, unsubscribed_at, created_at, updated_at) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                params![
                    recipient.id,
                    recipient.email,
                    recipient.display_name,
                    recipient.first_name,
                    recipient.last_name,
                    recipient.organization,
                    attributes_json(&recipient.attributes),
                    opt_ts(recipient.unsubscribed_at.as_ref()),
                    ts(&recipient.created_at),
                    ts(&now),
                ],
            )?;

            for campaign_id in &archived.memberships {
                tx.execute(
                    "INSERT OR IGNORE INTO campaign_recipients (campaign_id, recipient_id, added_at) \
                     SELECT id, ?2, ?3 FROM campaigns WHERE id = ?1",
                    params![campaign_id, recipient.id, ts(&now)],
                )?;
            }

            let sends: Vec<SendLedgerEntry> = {
                let mut stmt = tx.prepare(
                    "SELECT original_id, campaign_id, recipient_id, recipient_email, status, \
                     attempts, last_error, tracking_token, sent_at, opened_at, clicked_at, \
                     open_events, click_events, created_at \
                     FROM deleted_campaign_sends WHERE recipient_archive_id = ?1",
                )?;
                stmt.query_map(params![archive_id], row_to_send)?
                    .collect::<Result<Vec<_>, _>>()?
            };
            for send in &sends {
                let inserted = tx.execute(
                    &format!(
                        "INSERT OR IGNORE INTO campaign_sends ({SEND_COLUMNS}) \
                         SELECT ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14 \
                         WHERE EXISTS (SELECT 1 FROM campaigns WHERE id = ?2)"
                    ),
                    params![
                        send.id,
                        send.campaign_id,
                        send.recipient_id,
                        send.recipient_email,
                        send.status.as_ref(),
                        send.attempts,
                        send.last_error,
                        send.tracking_token,
                        opt_ts(send.sent_at.as_ref()),
                        opt_ts(send.opened_at.as_ref()),
                        opt_ts(send.clicked_at.as_ref()),
                        send.open_events,
                        send.click_events,
                        ts(&send.created_at),
                    ],
                )?;
                if inserted == 1 {
                    adjust_counters(&tx, send, 1, &now)?;
                }
            }

            tx.execute(
                "UPDATE deleted_recipients SET restored_at = ?2 WHERE archive_id = ?1",
                params![archive_id, ts(&now)],
            )?;
            tx.commit()?;
            Ok(RestoreOutcome::Restored(recipient))
        })
        .await
        .map_err(map_tr_err)
}

pub async fn get_archived(
    db: &Database,
    archive_id: &str,
) -> Result<Option<ArchivedRecipient>, MailroomError> {
    let archive_id = archive_id.to_string();
    db.connection()
        .call(move |conn| {
            conn.query_row(
                &format!(
                    "SELECT {ARCHIVED_RECIPIENT_COLUMNS} FROM deleted_recipients \
                     WHERE archive_id = ?1"
                ),
                params![archive_id],
                row_to_archived_recipient,
            )
            .optional()
        })
        .await
        .map_err(map_tr_err)
}

/// Archived recipients, most recently deleted first.
pub async fn list_archived(
    db: &Database,
    include_restored: bool,
) -> Result<Vec<ArchivedRecipient>, MailroomError> {
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {ARCHIVED_RECIPIENT_COLUMNS} FROM deleted_recipients \
                 WHERE ?1 OR restored_at IS NULL ORDER BY deleted_at DESC, archive_id ASC"
            ))?;
            stmt.query_map(params![include_restored], row_to_archived_recipient)?
                .collect::<Result<Vec<_>, _>>()
        })
        .await
        .map_err(map_tr_err)
}

/// Ledger rows archived together with `archive_id`.
pub async fn archived_sends(
    db: &Database,
    archive_id: &str,
) -> Result<Vec<ArchivedSendLedgerEntry>, MailroomError> {
    let archive_id = archive_id.to_string();
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {ARCHIVED_SEND_COLUMNS} FROM deleted_campaign_sends \
                 WHERE recipient_archive_id = ?1 ORDER BY created_at ASC, archive_id ASC"
            ))?;
            stmt.query_map(params![archive_id], row_to_archived_send)?
                .collect::<Result<Vec<_>, _>>()
        })
        .await
        .map_err(map_tr_err)
}
