// SPDX-FileCopyrightText: 2026 Mailroom Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test harness for end-to-end integration testing.
//!
//! `TestHarness` assembles the complete engine with a [`MockTransport`] and a
//! temp SQLite database, plus shortcuts for the setup most campaign tests
//! repeat: register recipients, create a scheduled campaign, run a tick.

use std::sync::Arc;

use chrono::Utc;
use mailroom_config::MailroomConfig;
use mailroom_core::{
    Campaign, MailroomError, NewCampaign, NewRecipient, Recipient, ScheduleSpec,
};
use mailroom_engine::{Engine, TickReport};
use mailroom_storage::Database;

use crate::mock_transport::MockTransport;

/// Builder for creating test environments with configurable options.
pub struct TestHarnessBuilder {
    config: MailroomConfig,
}

impl TestHarnessBuilder {
    fn new() -> Self {
        let mut config = MailroomConfig::default();
        // Keep retry backoff out of test wall time.
        config.delivery.retry_base_delay_ms = 1;
        config.delivery.retry_max_delay_ms = 5;
        config.tracking.public_base_url = "https://track.test".to_string();
        Self { config }
    }

    /// Override the delivery sub-batch size.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.config.delivery.batch_size = batch_size;
        self
    }

    /// Limit the number of sub-batches per run.
    pub fn with_max_batches(mut self, max_batches: usize) -> Self {
        self.config.delivery.max_batches_per_run = max_batches;
        self
    }

    /// Set the in-run transient retry budget.
    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.config.delivery.max_transient_retries = retries;
        self
    }

    /// Arbitrary config edits.
    pub fn with_config(mut self, edit: impl FnOnce(&mut MailroomConfig)) -> Self {
        edit(&mut self.config);
        self
    }

    /// Build the test harness, creating all required subsystems.
    pub async fn build(self) -> Result<TestHarness, MailroomError> {
        let temp_dir =
            tempfile::TempDir::new().map_err(|e| MailroomError::Storage { source: e.into() })?;
        let mut config = self.config;
        config.storage.database_path = temp_dir
            .path()
            .join("mailroom.db")
            .to_string_lossy()
            .to_string();

        let db = Database::open_with_config(&config.storage).await?;
        let transport = MockTransport::new();
        let engine = Engine::new(db.clone(), Arc::new(transport.clone()), &config);

        Ok(TestHarness {
            engine,
            transport,
            db,
            config,
            _temp_dir: temp_dir,
        })
    }
}

/// A complete test environment with a mock transport and temp storage.
pub struct TestHarness {
    pub engine: Engine,
    /// Shares state with the transport inside `engine`.
    pub transport: MockTransport,
    pub db: Database,
    pub config: MailroomConfig,
    _temp_dir: tempfile::TempDir,
}

impl TestHarness {
    pub fn builder() -> TestHarnessBuilder {
        TestHarnessBuilder::new()
    }

    /// A harness with default settings.
    pub async fn new() -> Result<Self, MailroomError> {
        Self::builder().build().await
    }

    /// Register recipients by email, returning the stored records in order.
    pub async fn add_recipients(&self, emails: &[&str]) -> Result<Vec<Recipient>, MailroomError> {
        let mut out = Vec::with_capacity(emails.len());
        for email in emails {
            let outcome = self
                .engine
                .recipients
                .upsert_manual(NewRecipient::with_email(*email))
                .await?;
            out.push(outcome.into_recipient());
        }
        Ok(out)
    }

    /// Create a campaign addressed to `emails` and attach `schedule`.
    pub async fn scheduled_campaign(
        &self,
        name: &str,
        emails: &[&str],
        schedule: ScheduleSpec,
    ) -> Result<Campaign, MailroomError> {
        let recipients = self.add_recipients(emails).await?;
        let campaign = self.engine.campaigns.create(sample_campaign(name)).await?;
        self.engine
            .campaigns
            .attach_recipients(&campaign.id, recipients.into_iter().map(|r| r.id).collect())
            .await?;
        self.engine
            .campaigns
            .attach_schedule(&campaign.id, schedule)
            .await
    }

    /// Run one scheduler tick at the current time.
    pub async fn tick(&self) -> Result<TickReport, MailroomError> {
        self.engine.scheduler.tick(Utc::now()).await
    }

    pub async fn campaign(&self, id: &str) -> Result<Campaign, MailroomError> {
        self.engine.campaigns.get(id).await
    }
}

/// Campaign fields with a templated subject and an unsubscribe footer.
pub fn sample_campaign(name: &str) -> NewCampaign {
    NewCampaign {
        name: name.to_string(),
        subject: "{{name}}, this week's news".to_string(),
        body_template: "Hello {{first_name}}!\n\nRead more: {{click_url}}?url=https://example.com/news\n\nUnsubscribe: {{unsubscribe_url}}".to_string(),
        sender_name: "Mailroom".to_string(),
        sender_email: "news@example.com".to_string(),
        ..NewCampaign::default()
    }
}
