// SPDX-FileCopyrightText: 2026 Mailroom Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! End-to-end tests that drive the compiled `mailroom` binary.
//!
//! Each test writes its own config pointing at a temp database, so tests are
//! independent and order-insensitive. No SMTP host is configured, so sends go
//! through the dry-run transport and always succeed.

use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use serde_json::Value;
use tempfile::TempDir;

struct Workspace {
    dir: TempDir,
    config: PathBuf,
}

impl Workspace {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let config = dir.path().join("mailroom.toml");
        let db = dir.path().join("mailroom.db");
        std::fs::write(
            &config,
            format!(
                "[storage]\ndatabase_path = \"{}\"\n\n\
                 [tracking]\npublic_base_url = \"https://track.example.com\"\n",
                db.display()
            ),
        )
        .unwrap();
        Self { dir, config }
    }

    fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    fn run(&self, args: &[&str]) -> Output {
        Command::new(env!("CARGO_BIN_EXE_mailroom"))
            .args(args)
            .arg("--config")
            .arg(&self.config)
            .env_remove("RUST_LOG")
            .current_dir(self.dir.path())
            .output()
            .unwrap()
    }

    /// Run and parse stdout as JSON, failing the test on a non-zero exit.
    fn json(&self, args: &[&str]) -> Value {
        let out = self.run(args);
        assert!(
            out.status.success(),
            "`mailroom {}` failed: {}",
            args.join(" "),
            String::from_utf8_lossy(&out.stderr)
        );
        serde_json::from_slice(&out.stdout).unwrap()
    }
}

fn write(path: &Path, contents: &str) -> String {
    std::fs::write(path, contents).unwrap();
    path.to_string_lossy().into_owned()
}

#[test]
fn import_then_tick_delivers_once() {
    let ws = Workspace::new();
    let csv = write(
        &ws.path("people.csv"),
        "email,name,plan\n\
         ada@example.com,Ada Lovelace,pro\n\
         broken-address,,\n\
         bob@example.com,Bob,free\n",
    );

    let summary = ws.json(&["import", &csv]);
    assert_eq!(summary["imported"], 2);
    assert_eq!(summary["failed"], 1);
    assert_eq!(summary["errors"][0]["row"], 1);

    let campaign = ws.json(&[
        "campaign",
        "create",
        "--name",
        "Launch",
        "--subject",
        "Hi {{first_name}}",
        "--body",
        "Your plan: {{plan}}. Leave: {{unsubscribe_url}}",
        "--sender-name",
        "Team",
        "--sender-email",
        "team@example.com",
        "--audience",
        "all",
    ]);
    assert_eq!(campaign["status"], "draft");
    let id = campaign["id"].as_str().unwrap().to_string();

    let scheduled = ws.json(&["campaign", "schedule", &id]);
    assert_eq!(scheduled["status"], "scheduled");

    let report = ws.json(&["tick"]);
    assert_eq!(report["runs"][0]["campaign_id"], id.as_str());
    assert_eq!(report["runs"][0]["outcome"]["outcome"], "completed");
    assert_eq!(report["runs"][0]["delivery"]["sent"], 2);

    let shown = ws.json(&["campaign", "show", &id, "--ledger"]);
    assert_eq!(shown["status"], "completed");
    assert_eq!(shown["sent_count"], 2);
    assert_eq!(shown["ledger"].as_array().unwrap().len(), 2);
    assert_eq!(
        shown["placeholders"],
        serde_json::json!(["first_name", "plan", "unsubscribe_url"])
    );

    // Nothing is due any more.
    let again = ws.json(&["tick"]);
    assert!(again["runs"].as_array().unwrap().is_empty());
}

#[test]
fn explicit_audience_and_pause() {
    let ws = Workspace::new();
    let ada = ws.json(&["recipient", "add", "Ada@Example.com", "--attr", "team=core"]);
    assert_eq!(ada["created"], true);
    assert_eq!(ada["recipient"]["email"], "ada@example.com");
    let dup = ws.json(&["recipient", "add", "ada@example.com"]);
    assert_eq!(dup["created"], false);

    let campaign = ws.json(&[
        "campaign",
        "create",
        "--name",
        "Weekly",
        "--subject",
        "News",
        "--body",
        "Hello {{email}}",
        "--sender-name",
        "Team",
        "--sender-email",
        "team@example.com",
    ]);
    let id = campaign["id"].as_str().unwrap().to_string();

    let attached = ws.json(&["campaign", "attach", &id, "ada@example.com"]);
    assert_eq!(attached["attached"], 1);

    ws.json(&[
        "campaign",
        "schedule",
        &id,
        "--at",
        "2020-01-06T09:00:00Z",
        "--every",
        "weekly",
    ]);
    let paused = ws.json(&["campaign", "pause", &id]);
    assert_eq!(paused["status"], "paused");
    assert!(ws.json(&["tick"])["runs"].as_array().unwrap().is_empty());

    ws.json(&["campaign", "resume", &id]);
    let report = ws.json(&["tick"]);
    assert_eq!(report["runs"][0]["outcome"]["outcome"], "rescheduled");

    let listed = ws.json(&["campaign", "list", "--status", "scheduled", "--json"]);
    assert_eq!(listed[0]["id"], id.as_str());
    assert_eq!(listed[0]["sent_count"], 1);
}

#[test]
fn delete_and_restore_round_trip() {
    let ws = Workspace::new();
    ws.json(&["recipient", "add", "grace@example.com", "--name", "Grace Hopper"]);

    let archived = ws.json(&[
        "recipient",
        "delete",
        "grace@example.com",
        "--actor",
        "dpo",
        "--reason",
        "erasure request",
    ]);
    assert_eq!(archived["deleted_by"], "dpo");
    let archive_id = archived["archive_id"].as_str().unwrap().to_string();

    let list = ws.json(&["recipient", "archived"]);
    assert_eq!(list.as_array().unwrap().len(), 1);

    let restored = ws.json(&["recipient", "restore", &archive_id]);
    assert_eq!(restored["email"], "grace@example.com");

    let out = ws.run(&["recipient", "restore", &archive_id]);
    assert!(!out.status.success());
    assert!(String::from_utf8_lossy(&out.stderr).contains("already restored"));
}

#[test]
fn invalid_input_exits_non_zero() {
    let ws = Workspace::new();
    let out = ws.run(&["campaign", "pause", "no-such-campaign"]);
    assert!(!out.status.success());
    assert!(String::from_utf8_lossy(&out.stderr).contains("not found"));

    let bad = write(&ws.path("bad.toml"), "[storage]\ndatabse_path = \"x.db\"\n");
    let out = Command::new(env!("CARGO_BIN_EXE_mailroom"))
        .args(["tick", "--config", &bad])
        .output()
        .unwrap();
    assert!(!out.status.success());
}

#[test]
fn doctor_reports_dry_run_transport() {
    let ws = Workspace::new();
    // Creates the database so the storage checks pass.
    ws.json(&["tick"]);
    let out = ws.run(&["doctor", "--plain", "--deep"]);
    assert!(out.status.success());
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(stdout.contains("[OK]   Database"));
    assert!(stdout.contains("[WARN] Mail relay"));
    assert!(stdout.contains("[OK]   DB integrity"));
}
