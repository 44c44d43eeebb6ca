// SPDX-FileCopyrightText: 2026 Mailroom Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `mailroom doctor` command implementation.
//!
//! Runs diagnostic checks against the Mailroom environment: storage, the
//! mail relay, and the tracking URL that goes into every message.

use std::path::Path;
use std::process::ExitCode;
use std::time::{Duration, Instant};

use mailroom_config::MailroomConfig;
use mailroom_core::{HealthStatus, MailroomError, PluginAdapter};
use mailroom_engine::tracking::validate_redirect;
use mailroom_storage::Database;

use crate::app::build_transport;
use crate::output::use_color;

/// Status of a diagnostic check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckStatus {
    Pass,
    Warn,
    Fail,
}

/// Result of a single diagnostic check.
#[derive(Debug, Clone)]
pub struct CheckResult {
    pub name: String,
    pub status: CheckStatus,
    pub message: String,
    pub duration: Duration,
}

impl CheckResult {
    fn new(name: &str, status: CheckStatus, message: impl Into<String>, start: Instant) -> Self {
        Self {
            name: name.to_string(),
            status,
            message: message.into(),
            duration: start.elapsed(),
        }
    }
}

/// Run the `mailroom doctor` command.
///
/// With `--deep`, also runs the SQLite integrity check and reports heap usage.
/// Exits non-zero when any check fails.
pub async fn run_doctor(
    config: &MailroomConfig,
    deep: bool,
    plain: bool,
) -> Result<ExitCode, MailroomError> {
    let color = use_color(plain);
    let mut results = vec![
        check_database(config).await,
        check_transport(config).await,
        check_public_url(&config.tracking.public_base_url),
    ];
    if deep {
        results.push(check_db_integrity(config).await);
        results.push(check_memory_baseline());
    }

    println!();
    println!("  mailroom doctor");
    println!("  {}", "-".repeat(50));
    for result in &results {
        println!("{}", render_line(result, color));
    }
    println!();

    let fails = count(&results, CheckStatus::Fail);
    let issues = fails + count(&results, CheckStatus::Warn);
    if issues > 0 {
        let issue_word = if issues == 1 { "issue" } else { "issues" };
        println!("  {issues} {issue_word} found.");
        if !deep {
            println!("  Run with --deep for detailed diagnostics.");
        }
    } else {
        println!("  All checks passed.");
    }
    println!();

    Ok(if fails > 0 {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    })
}

fn count(results: &[CheckResult], status: CheckStatus) -> usize {
    results.iter().filter(|r| r.status == status).count()
}

fn render_line(result: &CheckResult, color: bool) -> String {
    let duration_ms = result.duration.as_millis();
    if !color {
        let tag = match result.status {
            CheckStatus::Pass => "[OK]  ",
            CheckStatus::Warn => "[WARN]",
            CheckStatus::Fail => "[FAIL]",
        };
        return format!(
            "    {tag} {:<20} {} ({duration_ms}ms)",
            result.name, result.message
        );
    }

    use colored::Colorize;
    let (symbol, message) = match result.status {
        CheckStatus::Pass => ("✓".green(), result.message.normal()),
        CheckStatus::Warn => ("!".yellow(), result.message.yellow()),
        CheckStatus::Fail => ("✗".red(), result.message.red()),
    };
    format!("    {symbol} {:<20} {message} ({duration_ms}ms)", result.name)
}

/// Open the configured database, which also applies pending migrations.
async fn check_database(config: &MailroomConfig) -> CheckResult {
    let start = Instant::now();
    let path = &config.storage.database_path;
    if !Path::new(path).exists() {
        return CheckResult::new(
            "Database",
            CheckStatus::Warn,
            format!("not found: {path} (will be created on first run)"),
            start,
        );
    }

    match Database::open_with_config(&config.storage).await {
        Ok(db) => {
            let health = db.health_check().await;
            let _ = db.close().await;
            match health {
                HealthStatus::Healthy => {
                    CheckResult::new("Database", CheckStatus::Pass, "connected", start)
                }
                HealthStatus::Degraded(msg) => {
                    CheckResult::new("Database", CheckStatus::Warn, msg, start)
                }
                HealthStatus::Unhealthy(msg) => {
                    CheckResult::new("Database", CheckStatus::Fail, msg, start)
                }
            }
        }
        Err(e) => CheckResult::new(
            "Database",
            CheckStatus::Fail,
            format!("open failed: {e}"),
            start,
        ),
    }
}

/// Connect to the SMTP relay, or note that sends are dry runs.
async fn check_transport(config: &MailroomConfig) -> CheckResult {
    let start = Instant::now();
    let Some(host) = config.smtp.host.as_deref() else {
        return CheckResult::new(
            "Mail relay",
            CheckStatus::Warn,
            "no smtp.host configured (dry run: messages are only logged)",
            start,
        );
    };

    let transport = match build_transport(&config.smtp) {
        Ok(transport) => transport,
        Err(e) => return CheckResult::new("Mail relay", CheckStatus::Fail, e.to_string(), start),
    };
    match transport.health_check().await {
        Ok(HealthStatus::Healthy) => CheckResult::new(
            "Mail relay",
            CheckStatus::Pass,
            format!("{host}:{} reachable", config.smtp.port),
            start,
        ),
        Ok(HealthStatus::Degraded(msg)) => {
            CheckResult::new("Mail relay", CheckStatus::Warn, msg, start)
        }
        Ok(HealthStatus::Unhealthy(msg)) => {
            CheckResult::new("Mail relay", CheckStatus::Fail, msg, start)
        }
        Err(e) => CheckResult::new("Mail relay", CheckStatus::Fail, e.to_string(), start),
    }
}

/// Tracking links embed this URL, so it must be absolute http(s).
fn check_public_url(public_base_url: &str) -> CheckResult {
    let start = Instant::now();
    match validate_redirect(Some(public_base_url), true) {
        Ok(_) => CheckResult::new("Tracking URL", CheckStatus::Pass, public_base_url, start),
        Err(e) => CheckResult::new("Tracking URL", CheckStatus::Fail, e.to_string(), start),
    }
}

/// Deep check: SQLite integrity check.
async fn check_db_integrity(config: &MailroomConfig) -> CheckResult {
    let start = Instant::now();
    if !Path::new(&config.storage.database_path).exists() {
        return CheckResult::new(
            "DB integrity",
            CheckStatus::Warn,
            "database not found (skipped)",
            start,
        );
    }

    let db = match Database::open_with_config(&config.storage).await {
        Ok(db) => db,
        Err(e) => {
            return CheckResult::new(
                "DB integrity",
                CheckStatus::Fail,
                format!("open failed: {e}"),
                start,
            );
        }
    };
    let rows = db.integrity_check().await;
    let _ = db.close().await;
    match rows {
        Ok(rows) if rows.len() == 1 && rows[0] == "ok" => {
            CheckResult::new("DB integrity", CheckStatus::Pass, "ok", start)
        }
        Ok(rows) => CheckResult::new(
            "DB integrity",
            CheckStatus::Fail,
            format!("{} issue(s) found", rows.len()),
            start,
        ),
        Err(e) => CheckResult::new(
            "DB integrity",
            CheckStatus::Fail,
            format!("check failed: {e}"),
            start,
        ),
    }
}

/// Deep check: memory baseline via jemalloc.
fn check_memory_baseline() -> CheckResult {
    let start = Instant::now();

    #[cfg(not(target_env = "msvc"))]
    {
        let _ = tikv_jemalloc_ctl::epoch::advance();
        let allocated = tikv_jemalloc_ctl::stats::allocated::read().unwrap_or(0);
        let resident = tikv_jemalloc_ctl::stats::resident::read().unwrap_or(0);
        let allocated_mb = allocated as f64 / (1024.0 * 1024.0);
        let resident_mb = resident as f64 / (1024.0 * 1024.0);
        CheckResult::new(
            "Memory baseline",
            CheckStatus::Pass,
            format!("heap: {allocated_mb:.1} MB, resident: {resident_mb:.1} MB"),
            start,
        )
    }

    #[cfg(target_env = "msvc")]
    {
        CheckResult::new(
            "Memory baseline",
            CheckStatus::Warn,
            "jemalloc not available on MSVC",
            start,
        )
    }
}
