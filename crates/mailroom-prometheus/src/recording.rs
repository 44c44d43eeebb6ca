// SPDX-FileCopyrightText: 2026 Mailroom Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Metric registration and recording helpers.
//!
//! Uses the metrics-rs facade so any recorder (Prometheus, statsd, etc.)
//! can collect these metrics. With no recorder installed every call is a no-op.

use metrics::{describe_counter, describe_histogram};

/// Register all Mailroom metric descriptions.
///
/// Called once at startup after the recorder is installed.
pub fn register_metrics() {
    describe_counter!(
        "mailroom_sends_total",
        "Ledger rows finalized, by outcome (sent, failed, bounced)"
    );
    describe_counter!(
        "mailroom_tracking_events_total",
        "Tracking callbacks, by kind (open, click, unsubscribe)"
    );
    describe_counter!(
        "mailroom_campaigns_claimed_total",
        "Campaigns claimed by a scheduler tick"
    );
    describe_histogram!(
        "mailroom_send_latency_seconds",
        "Wall time of a single transport send"
    );
}

/// Record a finalized send.
pub fn record_send(outcome: &str) {
    metrics::counter!("mailroom_sends_total", "outcome" => outcome.to_string()).increment(1);
}

/// Record a tracking callback.
pub fn record_tracking_event(kind: &'static str) {
    metrics::counter!("mailroom_tracking_events_total", "kind" => kind).increment(1);
}

/// Record a campaign claimed by the scheduler.
pub fn record_campaign_claimed() {
    metrics::counter!("mailroom_campaigns_claimed_total").increment(1);
}

/// Record transport latency.
pub fn record_send_latency(seconds: f64) {
    metrics::histogram!("mailroom_send_latency_seconds").record(seconds);
}
