// SPDX-FileCopyrightText: 2026 Mailroom Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Identifier and tracking-token generation.

use rand::RngCore;

/// Random bytes per tracking token (48 hex characters).
const TOKEN_BYTES: usize = 24;

/// A fresh opaque, unguessable tracking token.
pub fn tracking_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// A fresh row identifier.
pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
