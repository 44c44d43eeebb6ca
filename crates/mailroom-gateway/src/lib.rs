// SPDX-FileCopyrightText: 2026 Mailroom Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Public HTTP surface for email tracking.
//!
//! Serves the open pixel, the click redirect, and the unsubscribe page that
//! rendered campaign emails link to, plus unauthenticated `/health` and
//! `/metrics` endpoints for probes and Prometheus. Responses for unknown
//! tokens are indistinguishable from responses for known ones.

pub mod handlers;
pub mod server;

pub use server::{GatewayState, HealthState, ServerConfig, router, start_server};

/// A 1x1 transparent GIF.
pub const TRACKING_PIXEL: &[u8] = &[
    0x47, 0x49, 0x46, 0x38, 0x39, 0x61, 0x01, 0x00, 0x01, 0x00, 0x80, 0x00, 0x00, 0x00, 0x00,
    0x00, 0xff, 0xff, 0xff, 0x21, 0xf9, 0x04, 0x01, 0x00, 0x00, 0x00, 0x00, 0x2c, 0x00, 0x00,
    0x00, 0x00, 0x01, 0x00, 0x01, 0x00, 0x00, 0x02, 0x02, 0x44, 0x01, 0x00, 0x3b,
];
