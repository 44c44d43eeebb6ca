// SPDX-FileCopyrightText: 2026 Mailroom Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Recipient import, manual entry, lookup, and edits.
//!
//! Every email is normalized (trimmed, lower-cased) before it is validated or
//! compared, so `A@X.com` and ` a@x.com ` name the same recipient.

use std::sync::LazyLock;

use mailroom_core::{
    Attributes, ImportResult, ImportRowError, MailroomError, NewRecipient, Recipient,
};
use mailroom_storage::Database;
use mailroom_storage::UpdateOutcome;
use mailroom_storage::convert::now;
use mailroom_storage::queries::recipients;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::token::new_id;

/// Longest address accepted (RFC 5321 path limit).
const MAX_EMAIL_LEN: usize = 254;

static EMAIL_SHAPE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^[a-z0-9.!#$%&'*+/=?^_`{|}~-]+@[a-z0-9](?:[a-z0-9-]{0,61}[a-z0-9])?(?:\.[a-z0-9](?:[a-z0-9-]{0,61}[a-z0-9])?)+$",
    )
    .unwrap()
});

/// Canonical form of an email address.
pub fn normalize_email(raw: &str) -> String {
    raw.trim().to_lowercase()
}

/// Check a normalized address. The error is a human-readable reason.
pub fn validate_email(email: &str) -> Result<(), String> {
    if email.is_empty() {
        return Err("email is empty".to_string());
    }
    if email.len() > MAX_EMAIL_LEN {
        return Err(format!("email longer than {MAX_EMAIL_LEN} characters"));
    }
    if !EMAIL_SHAPE.is_match(email) {
        return Err(format!("'{email}' is not a valid email address"));
    }
    Ok(())
}

/// Result of a manual add.
#[derive(Debug, Clone, PartialEq)]
pub enum UpsertOutcome {
    Created(Recipient),
    /// The email was already registered; the stored record is returned
    /// unchanged.
    Existing(Recipient),
}

impl UpsertOutcome {
    pub fn recipient(&self) -> &Recipient {
        match self {
            Self::Created(r) | Self::Existing(r) => r,
        }
    }

    pub fn into_recipient(self) -> Recipient {
        match self {
            Self::Created(r) | Self::Existing(r) => r,
        }
    }

    pub fn is_created(&self) -> bool {
        matches!(self, Self::Created(_))
    }
}

/// Partial edit of a recipient. `None` leaves a field unchanged; an empty
/// string clears an optional field.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecipientPatch {
    pub email: Option<String>,
    pub display_name: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub organization: Option<String>,
    /// Replaces the attribute map wholesale.
    pub attributes: Option<Attributes>,
}

/// Recipient operations over the shared database.
#[derive(Clone)]
pub struct RecipientStore {
    db: Database,
}

impl RecipientStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Import a batch of raw rows.
    ///
    /// Invalid rows are reported and skipped without aborting the batch;
    /// rows whose email is already registered (or repeated earlier in the
    /// batch) count as `skipped`.
    pub async fn import_batch(&self, rows: Vec<NewRecipient>) -> Result<ImportResult, MailroomError> {
        let mut result = ImportResult::default();
        let mut accepted = Vec::with_capacity(rows.len());

        for (row, fields) in rows.into_iter().enumerate() {
            match build_recipient(fields) {
                Ok(recipient) => accepted.push(recipient),
                Err((email, message)) => {
                    debug!(row, %email, %message, "import row rejected");
                    result.failed += 1;
                    result.errors.push(ImportRowError {
                        row,
                        email,
                        message,
                    });
                }
            }
        }

        let inserted = recipients::insert_many(&self.db, accepted).await?;
        for flag in inserted {
            if flag {
                result.imported += 1;
            } else {
                result.skipped += 1;
            }
        }

        info!(
            imported = result.imported,
            skipped = result.skipped,
            failed = result.failed,
            "recipient import finished"
        );
        Ok(result)
    }

    /// Add a single recipient. A duplicate email is not an error: the
    /// existing record is returned untouched.
    pub async fn upsert_manual(&self, fields: NewRecipient) -> Result<UpsertOutcome, MailroomError> {
        let recipient = build_recipient(fields)
            .map_err(|(_, message)| MailroomError::validation("email", message))?;

        if recipients::insert_if_absent(&self.db, &recipient).await? {
            info!(recipient_id = %recipient.id, "recipient added");
            return Ok(UpsertOutcome::Created(recipient));
        }
        let existing = recipients::find_by_email(&self.db, &recipient.email)
            .await?
            .ok_or_else(|| {
                MailroomError::Internal(format!(
                    "recipient {} vanished during insert",
                    recipient.email
                ))
            })?;
        debug!(recipient_id = %existing.id, "recipient already registered");
        Ok(UpsertOutcome::Existing(existing))
    }

    pub async fn get(&self, id: &str) -> Result<Recipient, MailroomError> {
        recipients::get(&self.db, id)
            .await?
            .ok_or_else(|| MailroomError::not_found("recipient", id))
    }

    /// Look up by email in any casing or padding.
    pub async fn find_by_email(&self, email: &str) -> Result<Option<Recipient>, MailroomError> {
        recipients::find_by_email(&self.db, &normalize_email(email)).await
    }

    pub async fn list(&self, limit: i64, offset: i64) -> Result<Vec<Recipient>, MailroomError> {
        recipients::list(&self.db, limit, offset).await
    }

    pub async fn count(&self) -> Result<i64, MailroomError> {
        recipients::count(&self.db).await
    }

    /// Apply a partial edit. Moving onto an email another live recipient
    /// owns is a conflict.
    pub async fn update(&self, id: &str, patch: RecipientPatch) -> Result<Recipient, MailroomError> {
        let mut recipient = self.get(id).await?;

        if let Some(email) = patch.email {
            let email = normalize_email(&email);
            validate_email(&email).map_err(|message| MailroomError::validation("email", message))?;
            recipient.email = email;
        }
        if let Some(value) = patch.display_name {
            recipient.display_name = clean(Some(value));
        }
        if let Some(value) = patch.first_name {
            recipient.first_name = clean(Some(value));
        }
        if let Some(value) = patch.last_name {
            recipient.last_name = clean(Some(value));
        }
        if let Some(value) = patch.organization {
            recipient.organization = clean(Some(value));
        }
        if let Some(attributes) = patch.attributes {
            recipient.attributes = attributes;
        }
        recipient.updated_at = now();

        match recipients::update(&self.db, &recipient).await? {
            UpdateOutcome::Updated => Ok(recipient),
            UpdateOutcome::NotFound => Err(MailroomError::not_found("recipient", id)),
            UpdateOutcome::EmailTaken => Err(MailroomError::Conflict(format!(
                "email {} belongs to another recipient",
                recipient.email
            ))),
        }
    }
}

/// Trim an optional field, turning blanks into `None`.
fn clean(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Normalize and validate a raw row into a new record. On failure returns
/// the offending (normalized) email with the reason.
fn build_recipient(fields: NewRecipient) -> Result<Recipient, (String, String)> {
    let email = normalize_email(&fields.email);
    validate_email(&email).map_err(|message| (email.clone(), message))?;

    let display_name = clean(fields.display_name);
    let mut first_name = clean(fields.first_name);
    let mut last_name = clean(fields.last_name);

    // Fill name parts from a display name like "Ada King Lovelace".
    let derive_parts = first_name.is_none() && last_name.is_none();
    if let Some(name) = display_name.as_deref().filter(|_| derive_parts) {
        let mut parts = name.split_whitespace();
        first_name = parts.next().map(str::to_string);
        let rest = parts.collect::<Vec<_>>().join(" ");
        last_name = (!rest.is_empty()).then_some(rest);
    }

    let at = now();
    Ok(Recipient {
        id: new_id(),
        email,
        display_name,
        first_name,
        last_name,
        organization: clean(fields.organization),
        attributes: fields
            .attributes
            .into_iter()
            .map(|(k, v)| (k.trim().to_string(), v))
            .filter(|(k, _)| !k.is_empty())
            .collect(),
        unsubscribed_at: None,
        created_at: at,
        updated_at: at,
    })
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;
    use crate::test_support::setup_db;

    #[tokio::test]
    async fn import_deduplicates_case_and_whitespace() {
        let (db, _dir) = setup_db().await;
        let store = RecipientStore::new(db.clone());
        let result = store
            .import_batch(vec![
                NewRecipient::with_email("A@X.com"),
                NewRecipient::with_email(" a@x.com "),
            ])
            .await
            .unwrap();
        assert_eq!(result.imported, 1);
        assert_eq!(result.skipped, 1);
        assert_eq!(result.failed, 0);
        assert_eq!(store.count().await.unwrap(), 1);
        assert!(store.find_by_email("a@x.com").await.unwrap().is_some());
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn invalid_rows_are_reported_not_fatal() {
        let (db, _dir) = setup_db().await;
        let store = RecipientStore::new(db.clone());
        let result = store
            .import_batch(vec![
                NewRecipient::with_email("ok@example.com"),
                NewRecipient::with_email("not-an-email"),
                NewRecipient::with_email(""),
                NewRecipient::with_email("also.ok@example.org"),
            ])
            .await
            .unwrap();
        assert_eq!(result.imported, 2);
        assert_eq!(result.failed, 2);
        assert_eq!(result.errors[0].row, 1);
        assert_eq!(result.errors[0].email, "not-an-email");
        assert_eq!(result.errors[1].row, 2);
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn reimport_skips_everything() {
        let (db, _dir) = setup_db().await;
        let store = RecipientStore::new(db.clone());
        let rows = vec![
            NewRecipient::with_email("one@example.com"),
            NewRecipient::with_email("two@example.com"),
        ];
        store.import_batch(rows.clone()).await.unwrap();
        let again = store.import_batch(rows).await.unwrap();
        assert_eq!(again.imported, 0);
        assert_eq!(again.skipped, 2);
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn manual_duplicate_returns_existing() {
        let (db, _dir) = setup_db().await;
        let store = RecipientStore::new(db.clone());
        let first = store
            .upsert_manual(NewRecipient {
                display_name: Some("Ada Lovelace".into()),
                ..NewRecipient::with_email("ada@example.com")
            })
            .await
            .unwrap();
        assert!(first.is_created());
        assert_eq!(first.recipient().first_name.as_deref(), Some("Ada"));
        assert_eq!(first.recipient().last_name.as_deref(), Some("Lovelace"));

        let second = store
            .upsert_manual(NewRecipient::with_email("ADA@example.com"))
            .await
            .unwrap();
        assert!(!second.is_created());
        assert_eq!(second.recipient().id, first.recipient().id);
        assert_eq!(second.recipient().display_name.as_deref(), Some("Ada Lovelace"));
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn manual_add_rejects_malformed_email() {
        let (db, _dir) = setup_db().await;
        let store = RecipientStore::new(db.clone());
        let err = store
            .upsert_manual(NewRecipient::with_email("nobody@"))
            .await
            .unwrap_err();
        assert!(matches!(err, MailroomError::Validation { .. }));
        db.close().await.unwrap();
    }

    #[tokio::test]
    async fn update_normalizes_and_detects_conflicts() {
        let (db, _dir) = setup_db().await;
        let store = RecipientStore::new(db.clone());
        let a = store
            .upsert_manual(NewRecipient::with_email("a@example.com"))
            .await
            .unwrap()
            .into_recipient();
        let b = store
            .upsert_manual(NewRecipient::with_email("b@example.com"))
            .await
            .unwrap()
            .into_recipient();

        let updated = store
            .update(
                &b.id,
                RecipientPatch {
                    email: Some(" B2@Example.com".into()),
                    organization: Some("Analytical Engines".into()),
                    ..RecipientPatch::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.email, "b2@example.com");
        assert_eq!(updated.organization.as_deref(), Some("Analytical Engines"));

        let err = store
            .update(
                &b.id,
                RecipientPatch {
                    email: Some("A@example.com".into()),
                    ..RecipientPatch::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, MailroomError::Conflict(_)));
        assert_eq!(store.get(&a.id).await.unwrap().email, "a@example.com");

        let missing = store.update("nope", RecipientPatch::default()).await.unwrap_err();
        assert!(matches!(missing, MailroomError::NotFound { .. }));
        db.close().await.unwrap();
    }

    #[test]
    fn validation_examples() {
        assert!(validate_email("ada@example.com").is_ok());
        assert!(validate_email("first.last+tag@mail.example.co.uk").is_ok());
        assert!(validate_email("ada@localhost").is_err());
        assert!(validate_email("ada@@example.com").is_err());
        assert!(validate_email("ada example@example.com").is_err());
    }

    proptest! {
        #[test]
        fn normalization_is_idempotent(raw in "[ \\t]{0,3}[A-Za-z0-9._%+-]{1,20}@[A-Za-z0-9-]{1,20}\\.[A-Za-z]{2,6}[ \\t]{0,3}") {
            let once = normalize_email(&raw);
            prop_assert_eq!(normalize_email(&once), once.clone());
            prop_assert_eq!(once.trim(), once.as_str());
            prop_assert_eq!(once.to_lowercase(), once);
        }
    }
}
