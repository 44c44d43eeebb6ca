// SPDX-FileCopyrightText: 2026 Mailroom Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `mailroom recipient` subcommands.

use clap::Subcommand;
use mailroom_config::MailroomConfig;
use mailroom_core::{MailroomError, NewRecipient};

use crate::app::App;
use crate::output::print_json;

#[derive(Subcommand, Debug)]
pub enum RecipientCommand {
    /// Add one recipient. An existing email is left untouched.
    Add {
        email: String,
        /// Full display name.
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        first_name: Option<String>,
        #[arg(long)]
        last_name: Option<String>,
        #[arg(long)]
        organization: Option<String>,
        /// Custom attribute as `key=value`; repeatable.
        #[arg(long = "attr", value_name = "KEY=VALUE", value_parser = parse_attr)]
        attrs: Vec<(String, String)>,
    },
    /// List live recipients, oldest first.
    List {
        #[arg(long, default_value_t = 100)]
        limit: i64,
        #[arg(long, default_value_t = 0)]
        offset: i64,
    },
    /// Archive a recipient (by id or email) with its send history.
    Delete {
        recipient: String,
        /// Who requested the deletion. Defaults to the service name.
        #[arg(long)]
        actor: Option<String>,
        #[arg(long, default_value = "")]
        reason: String,
    },
    /// Move an archived recipient back into the live tables.
    Restore {
        archive_id: String,
        /// Who requested the restore. Defaults to the service name.
        #[arg(long)]
        actor: Option<String>,
    },
    /// List archived recipients, or show one with its archived sends.
    Archived {
        archive_id: Option<String>,
        /// Include recipients that were already restored.
        #[arg(long)]
        all: bool,
    },
}

pub async fn run(config: MailroomConfig, command: RecipientCommand) -> Result<(), MailroomError> {
    let app = App::open(config).await?;
    let result = execute(&app, command).await;
    app.close().await?;
    result
}

async fn execute(app: &App, command: RecipientCommand) -> Result<(), MailroomError> {
    let engine = &app.engine;
    match command {
        RecipientCommand::Add {
            email,
            name,
            first_name,
            last_name,
            organization,
            attrs,
        } => {
            let outcome = engine
                .recipients
                .upsert_manual(NewRecipient {
                    email,
                    display_name: name,
                    first_name,
                    last_name,
                    organization,
                    attributes: attrs.into_iter().collect(),
                })
                .await?;
            let created = outcome.is_created();
            if !created {
                eprintln!("recipient already exists; left unchanged");
            }
            print_json(&serde_json::json!({
                "created": created,
                "recipient": outcome.recipient(),
            }))
        }
        RecipientCommand::List { limit, offset } => {
            let total = engine.recipients.count().await?;
            let recipients = engine.recipients.list(limit, offset).await?;
            print_json(&serde_json::json!({ "total": total, "recipients": recipients }))
        }
        RecipientCommand::Delete {
            recipient,
            actor,
            reason,
        } => {
            let id = app.resolve_recipient(&recipient).await?;
            let actor = actor.unwrap_or_else(|| app.config.service.name.clone());
            print_json(&engine.archival.soft_delete(&id, &actor, &reason).await?)
        }
        RecipientCommand::Restore { archive_id, actor } => {
            let actor = actor.unwrap_or_else(|| app.config.service.name.clone());
            print_json(&engine.archival.restore(&archive_id, &actor).await?)
        }
        RecipientCommand::Archived {
            archive_id: Some(archive_id),
            ..
        } => {
            let archived = engine.archival.get_archived(&archive_id).await?;
            let sends = engine.archival.archived_sends(&archive_id).await?;
            print_json(&serde_json::json!({ "recipient": archived, "sends": sends }))
        }
        RecipientCommand::Archived {
            archive_id: None,
            all,
        } => print_json(&engine.archival.list_archived(all).await?),
    }
}

fn parse_attr(s: &str) -> Result<(String, String), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got `{s}`"))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("attribute name is empty in `{s}`"));
    }
    Ok((key.to_string(), value.trim().to_string()))
}
