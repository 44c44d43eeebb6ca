// SPDX-FileCopyrightText: 2026 Mailroom Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `mailroom campaign` subcommands.

use std::fmt::Display;
use std::path::PathBuf;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use clap::{Args, Subcommand};
use mailroom_config::MailroomConfig;
use mailroom_core::{
    Audience, Campaign, CampaignStatus, MailroomError, NewCampaign, Recurrence, ScheduleSpec,
    SendLedgerEntry,
};
use mailroom_engine::template;
use serde::Serialize;

use crate::app::App;
use crate::output::{print_json, status_label, use_color};

#[derive(Subcommand, Debug)]
pub enum CampaignCommand {
    /// Create a draft campaign.
    Create(CreateArgs),
    /// Attach a schedule and move the campaign to `scheduled`.
    ///
    /// Without `--at` or `--every` the campaign fires on the next tick.
    Schedule {
        id: String,
        /// First (or only) run time, RFC 3339.
        #[arg(long, value_parser = parse_timestamp)]
        at: Option<DateTime<Utc>>,
        /// Repeat daily, weekly or monthly.
        #[arg(long, value_parser = parse_enum::<Recurrence>)]
        every: Option<Recurrence>,
    },
    /// Add recipients, by id or email, to the campaign's batch.
    Attach {
        id: String,
        #[arg(required = true)]
        recipients: Vec<String>,
    },
    /// Stop a scheduled campaign from being claimed.
    Pause { id: String },
    /// Re-arm a paused campaign.
    Resume { id: String },
    /// List campaigns, oldest first.
    List {
        #[arg(long, value_parser = parse_enum::<CampaignStatus>)]
        status: Option<CampaignStatus>,
        /// Print JSON instead of a table.
        #[arg(long)]
        json: bool,
        /// Disable colored output.
        #[arg(long)]
        plain: bool,
    },
    /// Show one campaign with its counters.
    Show {
        id: String,
        /// Include the send ledger.
        #[arg(long)]
        ledger: bool,
    },
}

#[derive(Args, Debug)]
pub struct CreateArgs {
    #[arg(long)]
    name: String,
    /// Subject template.
    #[arg(long)]
    subject: String,
    /// Body template.
    #[arg(long, conflicts_with = "body_file", required_unless_present = "body_file")]
    body: Option<String>,
    /// Read the body template from a file.
    #[arg(long, value_name = "PATH")]
    body_file: Option<PathBuf>,
    #[arg(long)]
    sender_name: String,
    #[arg(long)]
    sender_email: String,
    /// `explicit` (attached recipients) or `all` (every subscribed recipient).
    #[arg(long, default_value = "explicit", value_parser = parse_enum::<Audience>)]
    audience: Audience,
}

#[derive(Serialize)]
struct CampaignDetail<'a> {
    #[serde(flatten)]
    campaign: &'a Campaign,
    members: usize,
    /// Merge fields the subject and body expect, subject first.
    placeholders: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    ledger: Option<Vec<SendLedgerEntry>>,
}

pub async fn run(config: MailroomConfig, command: CampaignCommand) -> Result<(), MailroomError> {
    let app = App::open(config).await?;
    let result = execute(&app, command).await;
    app.close().await?;
    result
}

async fn execute(app: &App, command: CampaignCommand) -> Result<(), MailroomError> {
    let campaigns = &app.engine.campaigns;
    match command {
        CampaignCommand::Create(args) => {
            let body_template = match (args.body, args.body_file) {
                (Some(body), _) => body,
                (None, Some(path)) => std::fs::read_to_string(&path).map_err(|e| {
                    MailroomError::validation("body_file", format!("{}: {e}", path.display()))
                })?,
                (None, None) => {
                    return Err(MailroomError::validation("body", "must not be empty"));
                }
            };
            let campaign = campaigns
                .create(NewCampaign {
                    name: args.name,
                    subject: args.subject,
                    body_template,
                    sender_name: args.sender_name,
                    sender_email: args.sender_email,
                    audience: args.audience,
                })
                .await?;
            print_json(&campaign)
        }
        CampaignCommand::Schedule { id, at, every } => {
            let schedule = schedule_spec(at, every, Utc::now());
            print_json(&campaigns.attach_schedule(&id, schedule).await?)
        }
        CampaignCommand::Attach { id, recipients } => {
            let mut ids = Vec::with_capacity(recipients.len());
            for key in &recipients {
                ids.push(app.resolve_recipient(key).await?);
            }
            let attached = campaigns.attach_recipients(&id, ids).await?;
            print_json(&serde_json::json!({ "campaign_id": id, "attached": attached }))
        }
        CampaignCommand::Pause { id } => print_json(&campaigns.pause(&id).await?),
        CampaignCommand::Resume { id } => print_json(&campaigns.resume(&id).await?),
        CampaignCommand::List {
            status,
            json,
            plain,
        } => {
            let list = campaigns.list(status).await?;
            if json {
                return print_json(&list);
            }
            print_table(&list, use_color(plain));
            Ok(())
        }
        CampaignCommand::Show { id, ledger } => {
            let campaign = campaigns.get(&id).await?;
            let members = campaigns.members(&id).await?.len();
            let ledger = if ledger {
                Some(campaigns.ledger(&id).await?)
            } else {
                None
            };
            print_json(&CampaignDetail {
                placeholders: merge_fields(&campaign.subject, &campaign.body_template),
                campaign: &campaign,
                members,
                ledger,
            })
        }
    }
}

fn merge_fields(subject: &str, body: &str) -> Vec<String> {
    let mut names = template::placeholders(subject);
    for name in template::placeholders(body) {
        if !names.contains(&name) {
            names.push(name);
        }
    }
    names
}

fn print_table(campaigns: &[Campaign], color: bool) {
    if campaigns.is_empty() {
        println!("no campaigns");
        return;
    }
    println!(
        "{:<36}  {:<10}  {:>13}  {:>6}  NAME",
        "ID", "STATUS", "SENT/TOTAL", "FAILED"
    );
    for c in campaigns {
        println!(
            "{:<36}  {}  {:>13}  {:>6}  {}",
            c.id,
            status_label(c.status, color),
            format!("{}/{}", c.sent_count, c.recipient_count),
            c.failed_count,
            c.name
        );
    }
}

/// Map the `--at`/`--every` flags onto a schedule.
fn schedule_spec(
    at: Option<DateTime<Utc>>,
    every: Option<Recurrence>,
    now: DateTime<Utc>,
) -> ScheduleSpec {
    match (at, every) {
        (None, None) => ScheduleSpec::immediate(),
        (Some(at), None) => ScheduleSpec::once(at),
        (at, Some(rule)) => ScheduleSpec::recurring(rule, at.unwrap_or(now)),
    }
}

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>, String> {
    DateTime::parse_from_rfc3339(s)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| format!("expected an RFC 3339 timestamp: {e}"))
}

fn parse_enum<T>(s: &str) -> Result<T, String>
where
    T: FromStr,
    T::Err: Display,
{
    s.parse().map_err(|e| format!("{e}: {s}"))
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use mailroom_core::ScheduleType;

    use super::*;

    #[test]
    fn schedule_flags_map_to_kinds() {
        let now = Utc.with_ymd_and_hms(2026, 1, 31, 8, 0, 0).unwrap();
        let at = Utc.with_ymd_and_hms(2026, 2, 1, 9, 0, 0).unwrap();

        assert_eq!(schedule_spec(None, None, now).kind, ScheduleType::Immediate);

        let once = schedule_spec(Some(at), None, now);
        assert_eq!(once.kind, ScheduleType::Once);
        assert_eq!(once.next_run_at, Some(at));

        let monthly = schedule_spec(None, Some(Recurrence::Monthly), now);
        assert_eq!(monthly.kind, ScheduleType::Recurring);
        assert_eq!(monthly.anchor_at, Some(now));
    }

    #[test]
    fn merge_fields_list_subject_then_body() {
        let names = merge_fields(
            "{{first_name}}, your {{plan}} renews",
            "Hi {{ first_name }}. {{plan}} ends {{renewal_date}}.",
        );
        assert_eq!(names, vec!["first_name", "plan", "renewal_date"]);
    }

    #[test]
    fn timestamps_are_normalized_to_utc() {
        let parsed = parse_timestamp("2026-03-01T10:00:00+01:00").unwrap();
        assert_eq!(parsed, Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap());
        assert!(parse_timestamp("tomorrow").is_err());
    }

    #[test]
    fn enum_flags_use_snake_case() {
        assert_eq!(parse_enum::<Recurrence>("weekly").unwrap(), Recurrence::Weekly);
        assert_eq!(parse_enum::<Audience>("all").unwrap(), Audience::All);
        assert!(parse_enum::<CampaignStatus>("archived").is_err());
    }

    #[tokio::test]
    async fn create_attach_and_schedule() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = MailroomConfig::default();
        config.storage.database_path = dir.path().join("m.db").to_string_lossy().into_owned();
        let app = App::open(config).await.unwrap();
        let ada = app
            .engine
            .recipients
            .upsert_manual(mailroom_core::NewRecipient::with_email("ada@example.com"))
            .await
            .unwrap()
            .into_recipient();

        execute(
            &app,
            CampaignCommand::Create(CreateArgs {
                name: "Launch".into(),
                subject: "Hi {{first_name}}".into(),
                body: Some("Hello".into()),
                body_file: None,
                sender_name: "Team".into(),
                sender_email: "team@example.com".into(),
                audience: Audience::Explicit,
            }),
        )
        .await
        .unwrap();
        let id = app.engine.campaigns.list(None).await.unwrap()[0].id.clone();

        execute(
            &app,
            CampaignCommand::Attach {
                id: id.clone(),
                recipients: vec!["ADA@example.com".into()],
            },
        )
        .await
        .unwrap();
        assert_eq!(app.engine.campaigns.members(&id).await.unwrap(), vec![ada.id]);

        let missing = execute(
            &app,
            CampaignCommand::Attach {
                id: id.clone(),
                recipients: vec!["nobody@example.com".into()],
            },
        )
        .await;
        assert!(matches!(missing, Err(MailroomError::NotFound { .. })));

        execute(
            &app,
            CampaignCommand::Schedule {
                id: id.clone(),
                at: None,
                every: None,
            },
        )
        .await
        .unwrap();
        assert_eq!(
            app.engine.campaigns.get(&id).await.unwrap().status,
            CampaignStatus::Scheduled
        );
        app.close().await.unwrap();
    }
}
