// SPDX-FileCopyrightText: 2026 Mailroom Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for the Mailroom campaign engine.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup, providing actionable error messages.

use serde::{Deserialize, Serialize};

/// Top-level Mailroom configuration.
///
/// Loaded from TOML files following XDG hierarchy, with environment variable overrides.
/// All sections are optional and default to sensible values.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct MailroomConfig {
    /// Service identity and logging.
    #[serde(default)]
    pub service: ServiceConfig,

    /// Storage backend settings.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Outbound SMTP relay settings.
    #[serde(default)]
    pub smtp: SmtpConfig,

    /// Delivery engine batching, retry, and timeout settings.
    #[serde(default)]
    pub delivery: DeliveryConfig,

    /// Scheduler tick settings.
    #[serde(default)]
    pub scheduler: SchedulerConfig,

    /// Tracking HTTP server settings.
    #[serde(default)]
    pub tracking: TrackingConfig,

    /// Prometheus metrics settings.
    #[serde(default)]
    pub prometheus: PrometheusConfig,
}

/// Service identity and logging configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ServiceConfig {
    /// Instance name, used in logs and as the default archival actor.
    #[serde(default = "default_service_name")]
    pub name: String,

    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: default_service_name(),
            log_level: default_log_level(),
        }
    }
}

fn default_service_name() -> String {
    "mailroom".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Storage backend configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_database_path")]
    pub database_path: String,

    /// Enable WAL (Write-Ahead Logging) mode for SQLite.
    #[serde(default = "default_wal_mode")]
    pub wal_mode: bool,

    /// How long a writer waits on a lock held by another process.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            wal_mode: default_wal_mode(),
            busy_timeout_ms: default_busy_timeout_ms(),
        }
    }
}

fn default_database_path() -> String {
    dirs::data_dir()
        .map(|p| p.join("mailroom").join("mailroom.db"))
        .unwrap_or_else(|| std::path::PathBuf::from("mailroom.db"))
        .to_string_lossy()
        .into_owned()
}

fn default_wal_mode() -> bool {
    true
}

fn default_busy_timeout_ms() -> u64 {
    5_000
}

/// Outbound SMTP relay configuration.
///
/// When `host` is unset the binary falls back to a dry-run transport that
/// only logs messages.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SmtpConfig {
    /// Relay hostname. `None` selects the dry-run transport.
    #[serde(default)]
    pub host: Option<String>,

    /// Relay port.
    #[serde(default = "default_smtp_port")]
    pub port: u16,

    /// Username for SMTP AUTH.
    #[serde(default)]
    pub username: Option<String>,

    /// Password for SMTP AUTH.
    #[serde(default, skip_serializing)]
    pub password: Option<String>,

    /// Upgrade the connection with STARTTLS (false = plaintext, local relays only).
    #[serde(default = "default_starttls")]
    pub starttls: bool,

    /// Connection and command timeout in seconds.
    #[serde(default = "default_smtp_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for SmtpConfig {
    fn default() -> Self {
        Self {
            host: None,
            port: default_smtp_port(),
            username: None,
            password: None,
            starttls: default_starttls(),
            timeout_secs: default_smtp_timeout_secs(),
        }
    }
}

fn default_smtp_port() -> u16 {
    587
}

fn default_starttls() -> bool {
    true
}

fn default_smtp_timeout_secs() -> u64 {
    30
}

/// Delivery engine configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct DeliveryConfig {
    /// Recipients processed per sub-batch.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Sub-batches processed per campaign per invocation before yielding.
    #[serde(default = "default_max_batches_per_run")]
    pub max_batches_per_run: usize,

    /// Extra attempts after a transient failure, within one run.
    #[serde(default = "default_max_transient_retries")]
    pub max_transient_retries: u32,

    /// Base delay for exponential backoff between transient retries.
    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,

    /// Cap on the backoff delay.
    #[serde(default = "default_retry_max_delay_ms")]
    pub retry_max_delay_ms: u64,

    /// Upper bound on a single transport call.
    #[serde(default = "default_send_timeout_secs")]
    pub send_timeout_secs: u64,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            max_batches_per_run: default_max_batches_per_run(),
            max_transient_retries: default_max_transient_retries(),
            retry_base_delay_ms: default_retry_base_delay_ms(),
            retry_max_delay_ms: default_retry_max_delay_ms(),
            send_timeout_secs: default_send_timeout_secs(),
        }
    }
}

fn default_batch_size() -> usize {
    100
}

fn default_max_batches_per_run() -> usize {
    10
}

fn default_max_transient_retries() -> u32 {
    2
}

fn default_retry_base_delay_ms() -> u64 {
    500
}

fn default_retry_max_delay_ms() -> u64 {
    5_000
}

fn default_send_timeout_secs() -> u64 {
    30
}

/// Scheduler configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SchedulerConfig {
    /// Maximum campaigns claimed by a single tick.
    #[serde(default = "default_max_campaigns_per_tick")]
    pub max_campaigns_per_tick: usize,

    /// How long a claim on a `sending` campaign stays exclusive. Renewed
    /// before each send, so it must exceed one send with all its retries.
    #[serde(default = "default_lease_secs")]
    pub lease_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_campaigns_per_tick: default_max_campaigns_per_tick(),
            lease_secs: default_lease_secs(),
        }
    }
}

fn default_max_campaigns_per_tick() -> usize {
    20
}

fn default_lease_secs() -> u64 {
    900 // 15 minutes
}

/// Tracking HTTP server configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct TrackingConfig {
    /// Address to bind the tracking server to.
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    /// Port to bind the tracking server to.
    #[serde(default = "default_tracking_port")]
    pub port: u16,

    /// Public URL prefix embedded in outbound links (no trailing slash).
    #[serde(default = "default_public_base_url")]
    pub public_base_url: String,

    /// Text shown on the unsubscribe confirmation page.
    #[serde(default = "default_unsubscribe_message")]
    pub unsubscribe_message: String,

    /// Refuse click redirects to anything but absolute http(s) URLs.
    /// Off by default: every present target is redirected to.
    #[serde(default)]
    pub strict_redirects: bool,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: default_tracking_port(),
            public_base_url: default_public_base_url(),
            unsubscribe_message: default_unsubscribe_message(),
            strict_redirects: false,
        }
    }
}

fn default_bind_address() -> String {
    "127.0.0.1".to_string()
}

fn default_tracking_port() -> u16 {
    8025
}

fn default_public_base_url() -> String {
    "http://127.0.0.1:8025".to_string()
}

fn default_unsubscribe_message() -> String {
    "You will no longer receive these emails.".to_string()
}

/// Prometheus metrics configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct PrometheusConfig {
    /// Install the Prometheus recorder and serve `/metrics`.
    #[serde(default)]
    pub enabled: bool,
}
