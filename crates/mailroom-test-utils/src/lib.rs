// SPDX-FileCopyrightText: 2026 Mailroom Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities for Mailroom integration tests.
//!
//! Provides a scripted mail transport and a harness that wires the whole
//! engine to a temporary SQLite database, for fast, deterministic,
//! CI-runnable tests without an SMTP server.
//!
//! # Components
//!
//! - [`MockTransport`] - Mail transport with per-address scripted outcomes
//! - [`TestHarness`] - Engine, database, and mock transport in one place

pub mod harness;
pub mod mock_transport;

pub use harness::{TestHarness, TestHarnessBuilder, sample_campaign};
pub use mock_transport::MockTransport;
