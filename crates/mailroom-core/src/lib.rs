// SPDX-FileCopyrightText: 2026 Mailroom Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the Mailroom campaign engine.
//!
//! This crate provides the error types, status enums, domain records, and
//! adapter traits shared by the storage, engine, gateway, and transport
//! crates.

pub mod error;
pub mod model;
pub mod traits;
pub mod types;

pub use error::{MailroomError, TransportError};
pub use model::{
    ArchivedRecipient, ArchivedSendLedgerEntry, Attributes, Campaign, ImportResult,
    ImportRowError, NewCampaign, NewRecipient, Recipient, ScheduleSpec, SendLedgerEntry,
};
pub use traits::{MailTransport, OutboundEmail, PluginAdapter};
pub use types::{
    AdapterType, Audience, CampaignStatus, HealthStatus, Recurrence, ScheduleType, SendStatus,
};
