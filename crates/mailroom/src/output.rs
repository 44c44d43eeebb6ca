// SPDX-FileCopyrightText: 2026 Mailroom Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Terminal output helpers.

use std::io::IsTerminal;

use mailroom_core::{CampaignStatus, MailroomError};
use serde::Serialize;

/// Print `value` as pretty JSON on stdout.
pub fn print_json<T: Serialize>(value: &T) -> Result<(), MailroomError> {
    let text = serde_json::to_string_pretty(value)
        .map_err(|e| MailroomError::Internal(format!("failed to encode output: {e}")))?;
    println!("{text}");
    Ok(())
}

/// Colors only when requested and stdout is a terminal.
pub fn use_color(plain: bool) -> bool {
    !plain && std::io::stdout().is_terminal()
}

/// A fixed-width status column, colored by outcome.
pub fn status_label(status: CampaignStatus, color: bool) -> String {
    let padded = format!("{:<10}", status.as_ref());
    if !color {
        return padded;
    }
    use colored::Colorize;
    match status {
        CampaignStatus::Completed => padded.green().to_string(),
        CampaignStatus::Failed => padded.red().to_string(),
        CampaignStatus::Sending => padded.cyan().to_string(),
        CampaignStatus::Paused => padded.yellow().to_string(),
        CampaignStatus::Draft | CampaignStatus::Scheduled => padded,
    }
}
