// SPDX-FileCopyrightText: 2026 Mailroom Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation for configuration values.
//!
//! Validates semantic constraints that cannot be expressed via serde attributes,
//! such as valid bind addresses, non-zero batch sizes, and coherent retry bounds.

use crate::diagnostic::ConfigError;
use crate::model::MailroomConfig;

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Validate a deserialized configuration for semantic correctness.
///
/// Returns `Ok(())` if all validations pass, or `Err(Vec<ConfigError>)` with
/// all collected validation errors (does not fail fast).
pub fn validate_config(config: &MailroomConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();
    let mut fail = |message: String| errors.push(ConfigError::Validation { message });

    if !LOG_LEVELS.contains(&config.service.log_level.as_str()) {
        fail(format!(
            "service.log_level `{}` must be one of {}",
            config.service.log_level,
            LOG_LEVELS.join(", ")
        ));
    }

    if config.storage.database_path.trim().is_empty() {
        fail("storage.database_path must not be empty".to_string());
    }

    let addr = config.tracking.bind_address.trim();
    if addr.is_empty() {
        fail("tracking.bind_address must not be empty".to_string());
    } else {
        let is_valid_ip = addr.parse::<std::net::IpAddr>().is_ok();
        let is_valid_hostname = addr
            .chars()
            .all(|c| c.is_alphanumeric() || c == '.' || c == '-' || c == ':');
        if !is_valid_ip && !is_valid_hostname {
            fail(format!(
                "tracking.bind_address `{addr}` is not a valid IP address or hostname"
            ));
        }
    }

    let base = &config.tracking.public_base_url;
    if !(base.starts_with("http://") || base.starts_with("https://")) {
        fail(format!(
            "tracking.public_base_url `{base}` must start with http:// or https://"
        ));
    } else if base.ends_with('/') {
        fail(format!(
            "tracking.public_base_url `{base}` must not end with a slash"
        ));
    }

    if let Some(host) = &config.smtp.host
        && host.trim().is_empty()
    {
        fail("smtp.host must not be empty when set".to_string());
    }

    if config.smtp.username.is_some() != config.smtp.password.is_some() {
        fail("smtp.username and smtp.password must be set together".to_string());
    }

    if config.delivery.batch_size == 0 {
        fail("delivery.batch_size must be at least 1".to_string());
    }

    if config.delivery.max_batches_per_run == 0 {
        fail("delivery.max_batches_per_run must be at least 1".to_string());
    }

    if config.delivery.send_timeout_secs == 0 {
        fail("delivery.send_timeout_secs must be at least 1".to_string());
    }

    if config.delivery.retry_base_delay_ms > config.delivery.retry_max_delay_ms {
        fail(format!(
            "delivery.retry_base_delay_ms ({}) must not exceed delivery.retry_max_delay_ms ({})",
            config.delivery.retry_base_delay_ms, config.delivery.retry_max_delay_ms
        ));
    }

    if config.scheduler.max_campaigns_per_tick == 0 {
        fail("scheduler.max_campaigns_per_tick must be at least 1".to_string());
    }

    // The lease is renewed before every send, so it only has to outlast the
    // slowest single send: every attempt timing out plus every backoff.
    let delivery = &config.delivery;
    let attempts = u64::from(delivery.max_transient_retries).saturating_add(1);
    let worst_send_ms = delivery
        .send_timeout_secs
        .saturating_mul(1000)
        .saturating_mul(attempts)
        .saturating_add(
            u64::from(delivery.max_transient_retries).saturating_mul(delivery.retry_max_delay_ms),
        );
    if config.scheduler.lease_secs.saturating_mul(1000) <= worst_send_ms {
        fail(format!(
            "scheduler.lease_secs ({}) must exceed the longest single send ({worst_send_ms} ms: \
             delivery.send_timeout_secs x (max_transient_retries + 1) plus retry backoff)",
            config.scheduler.lease_secs
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn has_error(errors: &[ConfigError], needle: &str) -> bool {
        errors
            .iter()
            .any(|e| matches!(e, ConfigError::Validation { message } if message.contains(needle)))
    }

    #[test]
    fn default_config_validates() {
        let config = MailroomConfig::default();
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn empty_database_path_fails_validation() {
        let mut config = MailroomConfig::default();
        config.storage.database_path = "".to_string();
        let errors = validate_config(&config).unwrap_err();
        assert!(has_error(&errors, "database_path"));
    }

    #[test]
    fn zero_batch_size_fails_validation() {
        let mut config = MailroomConfig::default();
        config.delivery.batch_size = 0;
        let errors = validate_config(&config).unwrap_err();
        assert!(has_error(&errors, "batch_size"));
    }

    #[test]
    fn inverted_retry_bounds_fail_validation() {
        let mut config = MailroomConfig::default();
        config.delivery.retry_base_delay_ms = 10_000;
        config.delivery.retry_max_delay_ms = 100;
        let errors = validate_config(&config).unwrap_err();
        assert!(has_error(&errors, "retry_base_delay_ms"));
    }

    #[test]
    fn lease_shorter_than_send_timeout_fails_validation() {
        let mut config = MailroomConfig::default();
        config.scheduler.lease_secs = 10;
        config.delivery.send_timeout_secs = 30;
        let errors = validate_config(&config).unwrap_err();
        assert!(has_error(&errors, "lease_secs"));
    }

    #[test]
    fn lease_must_cover_every_retry_of_one_send() {
        let mut config = MailroomConfig::default();
        config.delivery.send_timeout_secs = 30;
        config.delivery.max_transient_retries = 2;
        config.delivery.retry_max_delay_ms = 5_000;

        // 3 attempts x 30s + 2 backoffs x 5s = 100s.
        config.scheduler.lease_secs = 60;
        let errors = validate_config(&config).unwrap_err();
        assert!(has_error(&errors, "longest single send"));

        config.scheduler.lease_secs = 100;
        assert!(validate_config(&config).is_err());

        config.scheduler.lease_secs = 101;
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn base_url_with_trailing_slash_fails_validation() {
        let mut config = MailroomConfig::default();
        config.tracking.public_base_url = "https://mail.example.com/".to_string();
        let errors = validate_config(&config).unwrap_err();
        assert!(has_error(&errors, "must not end with a slash"));
    }

    #[test]
    fn half_configured_smtp_auth_fails_validation() {
        let mut config = MailroomConfig::default();
        config.smtp.username = Some("mailer".to_string());
        let errors = validate_config(&config).unwrap_err();
        assert!(has_error(&errors, "smtp.username"));
    }

    #[test]
    fn unknown_log_level_fails_validation() {
        let mut config = MailroomConfig::default();
        config.service.log_level = "verbose".to_string();
        let errors = validate_config(&config).unwrap_err();
        assert!(has_error(&errors, "log_level"));
    }

    #[test]
    fn all_errors_are_collected() {
        let mut config = MailroomConfig::default();
        config.storage.database_path = " ".to_string();
        config.delivery.batch_size = 0;
        config.scheduler.max_campaigns_per_tick = 0;
        let errors = validate_config(&config).unwrap_err();
        assert_eq!(errors.len(), 3);
    }

    #[test]
    fn valid_custom_config_passes() {
        let mut config = MailroomConfig::default();
        config.tracking.bind_address = "0.0.0.0".to_string();
        config.tracking.public_base_url = "https://t.example.com".to_string();
        config.storage.database_path = "/tmp/test.db".to_string();
        config.smtp.host = Some("smtp.example.com".to_string());
        config.smtp.username = Some("mailer".to_string());
        config.smtp.password = Some("hunter2".to_string());
        assert!(validate_config(&config).is_ok());
    }
}
