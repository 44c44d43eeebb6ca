// SPDX-FileCopyrightText: 2026 Mailroom Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration loader using Figment for layered config merging.
//!
//! Supports XDG hierarchy: `./mailroom.toml` > `~/.config/mailroom/mailroom.toml` >
//! `/etc/mailroom/mailroom.toml` with environment variable overrides via `MAILROOM_` prefix.

#![allow(clippy::result_large_err)] // figment::Error is external and cannot be boxed without wrapper

use std::path::Path;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};

use crate::model::MailroomConfig;

/// Config file name searched in every layer.
pub const CONFIG_FILE: &str = "mailroom.toml";

/// System-wide config file.
pub const SYSTEM_CONFIG_PATH: &str = "/etc/mailroom/mailroom.toml";

/// Config sections recognized in `MAILROOM_<SECTION>_<KEY>` variables.
const ENV_SECTIONS: &[&str] = &[
    "service",
    "storage",
    "smtp",
    "delivery",
    "scheduler",
    "tracking",
    "prometheus",
];

/// Load configuration from the standard XDG hierarchy with env var overrides.
///
/// Merge order (later overrides earlier):
/// 1. Compiled defaults
/// 2. `/etc/mailroom/mailroom.toml` (system-wide)
/// 3. `~/.config/mailroom/mailroom.toml` (user XDG config)
/// 4. `./mailroom.toml` (local directory)
/// 5. `MAILROOM_*` environment variables
pub fn load_config() -> Result<MailroomConfig, figment::Error> {
    build_figment().extract()
}

/// Load configuration from a TOML string only (no XDG lookup, no env).
///
/// Used for testing and explicit configuration.
pub fn load_config_from_str(toml_content: &str) -> Result<MailroomConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(MailroomConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Load configuration from a specific file path with env var overrides.
pub fn load_config_from_path(path: &Path) -> Result<MailroomConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(MailroomConfig::default()))
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()
}

/// Build the Figment used internally for config loading (exposed for diagnostic use).
pub fn build_figment() -> Figment {
    Figment::new()
        .merge(Serialized::defaults(MailroomConfig::default()))
        .merge(Toml::file(SYSTEM_CONFIG_PATH))
        .merge(Toml::file(
            dirs::config_dir()
                .map(|d| d.join("mailroom").join(CONFIG_FILE))
                .unwrap_or_default(),
        ))
        .merge(Toml::file(CONFIG_FILE))
        .merge(env_provider())
}

/// Map a lowercased, prefix-stripped env key onto its dotted config path.
///
/// Only the first underscore after a known section name becomes a dot, so
/// `smtp_timeout_secs` maps to `smtp.timeout_secs`.
pub fn env_key_to_path(key: &str) -> String {
    for section in ENV_SECTIONS {
        if let Some(rest) = key
            .strip_prefix(section)
            .and_then(|rest| rest.strip_prefix('_'))
        {
            return format!("{section}.{rest}");
        }
    }
    key.to_string()
}

/// Create the environment variable provider using explicit `map()` for section-to-dot mapping.
///
/// Uses `Env::map()` rather than `Env::split("_")` because key names contain
/// underscores themselves.
fn env_provider() -> Env {
    Env::prefixed("MAILROOM_").map(|key| env_key_to_path(key.as_str()).into())
}
