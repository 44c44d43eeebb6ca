// SPDX-FileCopyrightText: 2026 Mailroom Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-run retry policy for transient send failures.

use std::time::Duration;

use mailroom_config::DeliveryConfig;

/// How often and how patiently a single send is retried within one run.
///
/// The first attempt is not a retry, so a message is tried at most
/// `max_retries + 1` times.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&DeliveryConfig::default())
    }
}

impl RetryPolicy {
    pub fn from_config(config: &DeliveryConfig) -> Self {
        Self {
            max_retries: config.max_transient_retries,
            base_delay: Duration::from_millis(config.retry_base_delay_ms),
            max_delay: Duration::from_millis(config.retry_max_delay_ms),
        }
    }

    /// No retries and no waiting.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
        }
    }

    /// Whether another attempt is allowed after `attempts` have been made.
    #[must_use]
    pub const fn should_retry(&self, attempts: u32) -> bool {
        attempts <= self.max_retries
    }

    /// Backoff before the attempt following attempt number `attempts` (1-based):
    /// `base * 2^(attempts - 1)`, capped at `max_delay`.
    #[must_use]
    pub fn delay_after(&self, attempts: u32) -> Duration {
        let exponent = attempts.saturating_sub(1).min(20);
        self.base_delay
            .saturating_mul(1u32 << exponent)
            .min(self.max_delay)
    }

    /// Sum of every backoff a send that uses its whole retry budget waits.
    #[must_use]
    pub fn total_backoff(&self) -> Duration {
        (1..=self.max_retries)
            .map(|attempts| self.delay_after(attempts))
            .fold(Duration::ZERO, Duration::saturating_add)
    }
}
