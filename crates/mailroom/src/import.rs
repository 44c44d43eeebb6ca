// SPDX-FileCopyrightText: 2026 Mailroom Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `mailroom import` command implementation.
//!
//! Reads a CSV file with a header row. `email`, `name`, `first_name`,
//! `last_name` and `organization` map onto recipient fields (header names are
//! matched case-insensitively); every other column becomes a custom
//! attribute. Per-row problems such as a malformed email are reported by the
//! import summary, not treated as fatal.

use std::io::Read;
use std::path::Path;

use mailroom_config::MailroomConfig;
use mailroom_core::{Attributes, MailroomError, NewRecipient};
use tracing::info;

use crate::app::App;
use crate::output::print_json;

/// Where a CSV column lands on [`NewRecipient`].
#[derive(Debug, Clone, PartialEq, Eq)]
enum Column {
    Email,
    Name,
    FirstName,
    LastName,
    Organization,
    Attribute(String),
}

impl Column {
    fn from_header(header: &str) -> Self {
        let header = header.trim();
        match header.to_ascii_lowercase().as_str() {
            "email" => Self::Email,
            "name" => Self::Name,
            "first_name" => Self::FirstName,
            "last_name" => Self::LastName,
            "organization" => Self::Organization,
            _ => Self::Attribute(header.to_string()),
        }
    }
}

/// Parse CSV rows into import candidates, one per data row, in file order.
pub fn parse_recipients<R: Read>(reader: R) -> Result<Vec<NewRecipient>, MailroomError> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let columns: Vec<Column> = reader
        .headers()
        .map_err(csv_error)?
        .iter()
        .map(Column::from_header)
        .collect();
    if !columns.contains(&Column::Email) {
        return Err(MailroomError::validation("csv", "header row has no `email` column"));
    }

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.map_err(csv_error)?;
        let mut row = NewRecipient::with_email("");
        let mut attributes = Attributes::new();
        for (column, value) in columns.iter().zip(record.iter()) {
            let value = Some(value).filter(|v| !v.is_empty()).map(str::to_string);
            match column {
                Column::Email => row.email = value.unwrap_or_default(),
                Column::Name => row.display_name = value,
                Column::FirstName => row.first_name = value,
                Column::LastName => row.last_name = value,
                Column::Organization => row.organization = value,
                Column::Attribute(key) => {
                    if let Some(value) = value {
                        attributes.insert(key.clone(), value);
                    }
                }
            }
        }
        row.attributes = attributes;
        rows.push(row);
    }
    Ok(rows)
}

fn csv_error(e: csv::Error) -> MailroomError {
    let line = e.position().map(|p| p.line()).unwrap_or_default();
    MailroomError::validation("csv", format!("line {line}: {e}"))
}

/// Run the `mailroom import` command.
pub async fn run_import(config: MailroomConfig, path: &Path) -> Result<(), MailroomError> {
    let file = std::fs::File::open(path).map_err(|e| {
        MailroomError::validation("file", format!("cannot open {}: {e}", path.display()))
    })?;
    let rows = parse_recipients(file)?;
    info!(path = %path.display(), rows = rows.len(), "importing recipients");

    let app = App::open(config).await?;
    let result = app.engine.recipients.import_batch(rows).await;
    app.close().await?;
    print_json(&result?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recognized_columns_and_attributes() {
        let csv = "Email,Name,organization,plan,city\n\
                   ada@example.com,Ada Lovelace,Analytical,pro,\n\
                   bob@example.com,,,free,Paris\n";
        let rows = parse_recipients(csv.as_bytes()).unwrap();
        assert_eq!(rows.len(), 2);

        assert_eq!(rows[0].email, "ada@example.com");
        assert_eq!(rows[0].display_name.as_deref(), Some("Ada Lovelace"));
        assert_eq!(rows[0].organization.as_deref(), Some("Analytical"));
        assert_eq!(rows[0].attributes.get("plan").map(String::as_str), Some("pro"));
        assert!(!rows[0].attributes.contains_key("city"));

        assert_eq!(rows[1].display_name, None);
        assert_eq!(rows[1].attributes.get("city").map(String::as_str), Some("Paris"));
    }

    #[test]
    fn split_name_columns() {
        let csv = "first_name,last_name,email\nGrace,Hopper, grace@example.com \n";
        let rows = parse_recipients(csv.as_bytes()).unwrap();
        assert_eq!(rows[0].first_name.as_deref(), Some("Grace"));
        assert_eq!(rows[0].last_name.as_deref(), Some("Hopper"));
        assert_eq!(rows[0].email, "grace@example.com");
    }

    #[test]
    fn short_rows_keep_their_position() {
        let csv = "email,name\n\nnot-an-email\nc@example.com,C\n";
        let rows = parse_recipients(csv.as_bytes()).unwrap();
        // Blank lines are skipped; a short row still yields a candidate.
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].email, "not-an-email");
        assert_eq!(rows[0].display_name, None);
    }

    #[test]
    fn missing_email_column_is_rejected() {
        let err = parse_recipients("name,plan\nAda,pro\n".as_bytes()).unwrap_err();
        assert!(matches!(err, MailroomError::Validation { .. }));
    }

    #[tokio::test]
    async fn import_reports_per_row_errors() {
        let dir = tempfile::tempdir().unwrap();
        let csv_path = dir.path().join("people.csv");
        std::fs::write(
            &csv_path,
            "email,name\nada@example.com,Ada\nbroken,\nADA@example.com,Again\n",
        )
        .unwrap();
        let mut config = MailroomConfig::default();
        config.storage.database_path = dir.path().join("m.db").to_string_lossy().into_owned();

        run_import(config.clone(), &csv_path).await.unwrap();

        let app = App::open(config).await.unwrap();
        assert_eq!(app.engine.recipients.count().await.unwrap(), 1);
        app.close().await.unwrap();
    }
}
