// SPDX-FileCopyrightText: 2026 Mailroom Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Campaign engine for Mailroom.
//!
//! Owns the business rules on top of `mailroom-storage`: recipient
//! normalization and import, the campaign state machine, the scheduler tick,
//! ledger-backed delivery, tracking callbacks, and the soft-delete archive.
//! [`Engine`] wires every service to one database and one mail transport.

pub mod archival;
pub mod campaigns;
pub mod delivery;
pub mod recipients;
pub mod recurrence;
pub mod retry;
pub mod scheduler;
pub mod template;
pub mod token;
pub mod tracking;

use std::sync::Arc;

use mailroom_config::MailroomConfig;
use mailroom_core::MailTransport;
use mailroom_storage::Database;

pub use archival::ArchivalService;
pub use campaigns::CampaignRepository;
pub use delivery::{DeliveryEngine, DeliveryResult, DeliverySettings, Lease};
pub use recipients::{RecipientPatch, RecipientStore, UpsertOutcome, normalize_email};
pub use retry::RetryPolicy;
pub use scheduler::{CampaignRun, RunOutcome, Scheduler, SchedulerSettings, TickReport};
pub use tracking::TrackingResolver;

/// Every engine service over one database and transport.
#[derive(Clone)]
pub struct Engine {
    pub recipients: RecipientStore,
    pub campaigns: CampaignRepository,
    pub delivery: DeliveryEngine,
    pub scheduler: Scheduler,
    pub tracking: TrackingResolver,
    pub archival: ArchivalService,
}

impl Engine {
    pub fn new(db: Database, transport: Arc<dyn MailTransport>, config: &MailroomConfig) -> Self {
        let delivery = DeliveryEngine::new(
            db.clone(),
            transport,
            DeliverySettings::from_config(&config.delivery, &config.tracking),
        );
        let tracking = TrackingResolver::new(db.clone())
            .with_strict_redirects(config.tracking.strict_redirects);
        Self {
            tracking,
            ..Self::with_delivery(db, delivery, SchedulerSettings::from_config(&config.scheduler))
        }
    }

    /// Build around an already configured delivery engine.
    pub fn with_delivery(
        db: Database,
        delivery: DeliveryEngine,
        scheduler: SchedulerSettings,
    ) -> Self {
        Self {
            recipients: RecipientStore::new(db.clone()),
            campaigns: CampaignRepository::new(db.clone()),
            scheduler: Scheduler::new(db.clone(), delivery.clone(), scheduler),
            delivery,
            tracking: TrackingResolver::new(db.clone()),
            archival: ArchivalService::new(db),
        }
    }
}
