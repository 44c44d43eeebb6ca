// SPDX-FileCopyrightText: 2026 Mailroom Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `mailroom tick` command implementation.
//!
//! One scheduler pass, meant to be driven by cron or a systemd timer.
//! Overlapping invocations are safe. The report goes to stdout as JSON; the
//! exit status is non-zero when any claimed campaign aborted on an error.

use std::process::ExitCode;

use chrono::Utc;
use mailroom_config::MailroomConfig;
use mailroom_core::MailroomError;
use mailroom_engine::TickReport;
use tracing::{info, warn};

use crate::app::App;
use crate::output::print_json;

pub async fn run_tick(config: MailroomConfig) -> Result<ExitCode, MailroomError> {
    let app = App::open(config).await?;
    let report = app.engine.scheduler.tick(Utc::now()).await;
    app.close().await?;
    let report = report?;

    print_json(&report)?;
    Ok(if log_outcome(&report) {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

/// Returns `true` when no claimed campaign errored.
fn log_outcome(report: &TickReport) -> bool {
    if report.has_errors() {
        warn!(claimed = report.runs.len(), "tick finished with errors");
        return false;
    }
    info!(
        claimed = report.runs.len(),
        contended = report.contended.len(),
        "tick finished"
    );
    true
}

#[cfg(test)]
mod tests {
    use mailroom_engine::{CampaignRun, RunOutcome};

    use super::*;

    fn run(outcome: RunOutcome) -> CampaignRun {
        CampaignRun {
            campaign_id: "c1".into(),
            resumed: false,
            delivery: None,
            outcome,
        }
    }

    #[test]
    fn errored_runs_fail_the_process() {
        let ok = TickReport {
            runs: vec![run(RunOutcome::Completed), run(RunOutcome::Continuing)],
            contended: vec!["c2".into()],
        };
        assert!(log_outcome(&ok));

        let failed = TickReport {
            runs: vec![run(RunOutcome::Errored {
                message: "storage error".into(),
            })],
            contended: vec![],
        };
        assert!(!log_outcome(&failed));
    }

    #[tokio::test]
    async fn empty_database_ticks_cleanly() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = MailroomConfig::default();
        config.storage.database_path = dir.path().join("m.db").to_string_lossy().into_owned();
        run_tick(config).await.unwrap();
    }
}
