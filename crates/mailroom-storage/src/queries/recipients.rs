// SPDX-FileCopyrightText: 2026 Mailroom Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Recipient rows. Email uniqueness is enforced by `idx_recipients_email`;
//! callers pass canonical (normalized) emails.

use mailroom_core::MailroomError;
use rusqlite::{OptionalExtension, Row, TransactionBehavior, params};

use crate::convert::{attributes_json, get_attributes, get_opt_ts, get_ts, opt_ts, ts};
use crate::database::{Database, map_tr_err};
use crate::models::{Recipient, UpdateOutcome};

/// Column list matching [`row_to_recipient`], qualified by `alias`.
pub(crate) fn recipient_columns(alias: &str) -> String {
    [
        "id",
        "email",
        "display_name",
        "first_name",
        "last_name",
        "organization",
        "attributes",
        "unsubscribed_at",
        "created_at",
        "updated_at",
    ]
    .iter()
    .map(|c| format!("{alias}.{c}"))
    .collect::<Vec<_>>()
    .join(", ")
}

/// Map a row selected with [`recipient_columns`] starting at column `base`.
pub(crate) fn row_to_recipient(row: &Row<'_>, base: usize) -> rusqlite::Result<Recipient> {
    Ok(Recipient {
        id: row.get(base)?,
        email: row.get(base + 1)?,
        display_name: row.get(base + 2)?,
        first_name: row.get(base + 3)?,
        last_name: row.get(base + 4)?,
        organization: row.get(base + 5)?,
        attributes: get_attributes(row, base + 6)?,
        unsubscribed_at: get_opt_ts(row, base + 7)?,
        created_at: get_ts(row, base + 8)?,
        updated_at: get_ts(row, base + 9)?,
    })
}

const INSERT_SQL: &str = "INSERT INTO recipients (id, email, display_name, first_name, last_name, \
     organization, attributes, unsubscribed_at, created_at, updated_at) \
     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10) \
     ON CONFLICT(email) DO NOTHING";

fn insert_row(conn: &rusqlite::Connection, r: &Recipient) -> rusqlite::Result<bool> {
    let changed = conn.execute(
        INSERT_SQL,
        params![
            r.id,
            r.email,
            r.display_name,
            r.first_name,
            r.last_name,
            r.organization,
            attributes_json(&r.attributes),
            opt_ts(r.unsubscribed_at.as_ref()),
            ts(&r.created_at),
            ts(&r.updated_at),
        ],
    )?;
    Ok(changed == 1)
}

/// Insert recipients in one transaction, skipping any whose email is already
/// taken (including by an earlier row of the same call).
///
/// Returns one flag per input row: `true` if that row was inserted.
pub async fn insert_many(
    db: &Database,
    recipients: Vec<Recipient>,
) -> Result<Vec<bool>, MailroomError> {
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let mut inserted = Vec::with_capacity(recipients.len());
            for recipient in &recipients {
                inserted.push(insert_row(&tx, recipient)?);
            }
            tx.commit()?;
            Ok(inserted)
        })
        .await
        .map_err(map_tr_err)
}

/// Insert one recipient unless its email is taken. Returns whether it was inserted.
pub async fn insert_if_absent(db: &Database, recipient: &Recipient) -> Result<bool, MailroomError> {
    let recipient = recipient.clone();
    db.connection()
        .call(move |conn| insert_row(conn, &recipient))
        .await
        .map_err(map_tr_err)
}

pub async fn get(db: &Database, id: &str) -> Result<Option<Recipient>, MailroomError> {
    let id = id.to_string();
    let sql = format!(
        "SELECT {} FROM recipients r WHERE r.id = ?1",
        recipient_columns("r")
    );
    db.connection()
        .call(move |conn| {
            conn.query_row(&sql, params![id], |row| row_to_recipient(row, 0))
                .optional()
        })
        .await
        .map_err(map_tr_err)
}

/// Look up a live recipient by canonical email.
pub async fn find_by_email(db: &Database, email: &str) -> Result<Option<Recipient>, MailroomError> {
    let email = email.to_string();
    let sql = format!(
        "SELECT {} FROM recipients r WHERE r.email = ?1",
        recipient_columns("r")
    );
    db.connection()
        .call(move |conn| {
            conn.query_row(&sql, params![email], |row| row_to_recipient(row, 0))
                .optional()
        })
        .await
        .map_err(map_tr_err)
}

/// Live recipients in creation order.
pub async fn list(db: &Database, limit: i64, offset: i64) -> Result<Vec<Recipient>, MailroomError> {
    let sql = format!(
        "SELECT {} FROM recipients r ORDER BY r.created_at ASC, r.id ASC LIMIT ?1 OFFSET ?2",
        recipient_columns("r")
    );
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&sql)?;
            stmt.query_map(params![limit, offset], |row| row_to_recipient(row, 0))?
                .collect::<Result<Vec<_>, _>>()
        })
        .await
        .map_err(map_tr_err)
}

pub async fn count(db: &Database) -> Result<i64, MailroomError> {
    db.connection()
        .call(|conn| conn.query_row("SELECT COUNT(*) FROM recipients", [], |row| row.get(0)))
        .await
        .map_err(map_tr_err)
}

/// Overwrite the mutable fields of a recipient.
///
/// The email check and the write run in one transaction so a concurrent
/// insert cannot slip in between.
pub async fn update(db: &Database, recipient: &Recipient) -> Result<UpdateOutcome, MailroomError> {
    let r = recipient.clone();
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            let owner: Option<String> = tx
                .query_row(
                    "SELECT id FROM recipients WHERE email = ?1",
                    params![r.email],
                    |row| row.get(0),
                )
                .optional()?;
            if owner.as_deref().is_some_and(|id| id != r.id) {
                return Ok(UpdateOutcome::EmailTaken);
            }
            let changed = tx.execute(
                "UPDATE recipients SET email = ?2, display_name = ?3, first_name = ?4, \
                 last_name = ?5, organization = ?6, attributes = ?7, unsubscribed_at = ?8, \
                 updated_at = ?9 WHERE id = ?1",
                params![
                    r.id,
                    r.email,
                    r.display_name,
                    r.first_name,
                    r.last_name,
                    r.organization,
                    attributes_json(&r.attributes),
                    opt_ts(r.unsubscribed_at.as_ref()),
                    ts(&r.updated_at),
                ],
            )?;
            tx.commit()?;
            Ok(if changed == 1 {
                UpdateOutcome::Updated
            } else {
                UpdateOutcome::NotFound
            })
        })
        .await
        .map_err(map_tr_err)
}
