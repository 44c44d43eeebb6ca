// SPDX-FileCopyrightText: 2026 Mailroom Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Resolution of open, click, and unsubscribe callbacks.
//!
//! Unknown tokens are never an error: the HTTP surface must answer them
//! exactly like known ones so tokens cannot be probed.

use http::{HeaderValue, Uri};
use mailroom_core::MailroomError;
use mailroom_prometheus::recording;
use mailroom_storage::convert::now;
use mailroom_storage::queries::ledger;
use mailroom_storage::{Database, TrackOutcome};
use tracing::{debug, info};

#[derive(Clone)]
pub struct TrackingResolver {
    db: Database,
    strict_redirects: bool,
}

impl TrackingResolver {
    pub fn new(db: Database) -> Self {
        Self {
            db,
            strict_redirects: false,
        }
    }

    /// Only redirect clicks to absolute `http`/`https` URLs.
    pub fn with_strict_redirects(mut self, strict: bool) -> Self {
        self.strict_redirects = strict;
        self
    }

    /// The URL a click on `target` redirects to, under this resolver's
    /// redirect policy.
    pub fn redirect_target(&self, target: Option<&str>) -> Result<String, MailroomError> {
        validate_redirect(target, self.strict_redirects)
    }

    /// Record an open-pixel hit. Only the first open moves the campaign's
    /// opened counter.
    pub async fn resolve_open(&self, token: &str) -> Result<TrackOutcome, MailroomError> {
        let outcome = ledger::record_open(&self.db, token, now()).await?;
        log_outcome("open", &outcome);
        Ok(outcome)
    }

    /// Record the click and return the URL to redirect to.
    ///
    /// A missing target is a validation error and nothing is recorded. With
    /// strict redirects, so is any target that is not an absolute
    /// `http`/`https` URL.
    pub async fn resolve_click(
        &self,
        token: &str,
        target: Option<&str>,
    ) -> Result<String, MailroomError> {
        let target = self.redirect_target(target)?;
        let outcome = ledger::record_click(&self.db, token, now()).await?;
        log_outcome("click", &outcome);
        Ok(target)
    }

    /// Flag the recipient behind `token` as unsubscribed. Returns whether
    /// anyone was newly unsubscribed.
    pub async fn resolve_unsubscribe(&self, token: &str) -> Result<bool, MailroomError> {
        let changed = ledger::unsubscribe_by_token(&self.db, token, now()).await?;
        recording::record_tracking_event("unsubscribe");
        if changed {
            info!("recipient unsubscribed");
        } else {
            debug!("unsubscribe for unknown token or already unsubscribed recipient");
        }
        Ok(changed)
    }
}

fn log_outcome(kind: &'static str, outcome: &TrackOutcome) {
    recording::record_tracking_event(kind);
    match outcome {
        TrackOutcome::UnknownToken => debug!(kind, "tracking token not found"),
        TrackOutcome::First { campaign_id } => debug!(kind, %campaign_id, "first tracking event"),
        TrackOutcome::Repeat { campaign_id } => debug!(kind, %campaign_id, "repeat tracking event"),
    }
}

/// Accept any target usable as a `Location` header; with `strict`, only
/// absolute http(s) URLs with a host.
pub fn validate_redirect(target: Option<&str>, strict: bool) -> Result<String, MailroomError> {
    let raw = target.map(str::trim).unwrap_or_default();
    if raw.is_empty() {
        return Err(MailroomError::validation("url", "missing redirect target"));
    }
    if HeaderValue::from_str(raw).is_err() {
        return Err(MailroomError::validation(
            "url",
            "redirect target contains characters not allowed in a header",
        ));
    }
    if !strict {
        return Ok(raw.to_string());
    }
    let uri: Uri = raw
        .parse()
        .map_err(|_| MailroomError::validation("url", "redirect target is not a valid URL"))?;
    let scheme_ok = uri
        .scheme_str()
        .is_some_and(|s| s.eq_ignore_ascii_case("http") || s.eq_ignore_ascii_case("https"));
    let has_host = uri.host().is_some_and(|h| !h.is_empty());
    if !scheme_ok || !has_host {
        return Err(MailroomError::validation(
            "url",
            "redirect target must be an absolute http or https URL",
        ));
    }
    Ok(raw.to_string())
}
