// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation for configuration values.
//!
//! Checks constraints serde cannot express: positive intervals, weights in
//! range, hour windows inside a day, and the cooldown factor bound.

use crate::diagnostic::ConfigError;
use crate::model::{CourierConfig, HourWindow};

/// Validate a deserialized configuration for semantic correctness.
///
/// Collects every failure instead of stopping at the first one.
pub fn validate_config(config: &CourierConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();
    let mut fail = |message: String| errors.push(ConfigError::Validation { message });

    let s = &config.scheduler;
    if s.tick_interval_ms == 0 {
        fail("scheduler.tick_interval_ms must be greater than 0".into());
    }
    if s.dispatches_per_tick == 0 {
        fail("scheduler.dispatches_per_tick must be at least 1".into());
    }
    if !(1..=64).contains(&s.max_workers) {
        fail(format!(
            "scheduler.max_workers must be between 1 and 64, got {}",
            s.max_workers
        ));
    }
    if s.max_attempts == 0 {
        fail("scheduler.max_attempts must be at least 1".into());
    }
    if s.dispatch_timeout_secs == 0 {
        fail("scheduler.dispatch_timeout_secs must be greater than 0".into());
    }
    if !(s.restricted_priority_factor > 0.0 && s.restricted_priority_factor <= 1.0) {
        fail(format!(
            "scheduler.restricted_priority_factor must be in (0, 1], got {}",
            s.restricted_priority_factor
        ));
    }
    if !matches!(
        s.log_level.as_str(),
        "trace" | "debug" | "info" | "warn" | "error"
    ) {
        fail(format!(
            "scheduler.log_level `{}` is not one of trace, debug, info, warn, error",
            s.log_level
        ));
    }

    let c = &config.cooldown;
    if c.agent_group_factor < 1.0 {
        fail(format!(
            "cooldown.agent_group_factor must be at least 1.0, got {}",
            c.agent_group_factor
        ));
    }
    if c.hard_ttl_secs < c.per_recipient_secs || c.hard_ttl_secs < c.per_group_min_secs {
        fail("cooldown.hard_ttl_secs must not be shorter than any cooldown interval".into());
    }
    if c.hard_ttl_secs < config.interval.max_ceiling_secs {
        fail("cooldown.hard_ttl_secs must not be shorter than interval.max_ceiling_secs".into());
    }
    if c.max_sends_per_minute == 0 {
        fail("cooldown.max_sends_per_minute must be at least 1".into());
    }

    let i = &config.interval;
    if !(i.ema_alpha > 0.0 && i.ema_alpha <= 1.0) {
        fail(format!(
            "interval.ema_alpha must be in (0, 1], got {}",
            i.ema_alpha
        ));
    }
    if i.min_floor_secs > i.max_ceiling_secs {
        fail(format!(
            "interval.min_floor_secs ({}) exceeds interval.max_ceiling_secs ({})",
            i.min_floor_secs, i.max_ceiling_secs
        ));
    }
    if i.default_secs < i.min_floor_secs || i.default_secs > i.max_ceiling_secs {
        fail("interval.default_secs must lie between min_floor_secs and max_ceiling_secs".into());
    }
    if i.active_multiplier <= 0.0 || i.quiet_multiplier <= 0.0 {
        fail("interval multipliers must be positive".into());
    }
    if i.utc_offset_minutes.abs() > 14 * 60 {
        fail(format!(
            "interval.utc_offset_minutes must be within +/-840, got {}",
            i.utc_offset_minutes
        ));
    }
    check_windows("interval.active_hours", &i.active_hours, &mut fail);
    check_windows("interval.quiet_hours", &i.quiet_hours, &mut fail);

    let w = &config.scoring;
    for (name, value) in [
        ("response_rate_weight", w.response_rate_weight),
        ("activity_weight", w.activity_weight),
        ("member_count_weight", w.member_count_weight),
        ("spam_tolerance_weight", w.spam_tolerance_weight),
        ("fatigue_penalty_weight", w.fatigue_penalty_weight),
    ] {
        if !(0.0..=1.0).contains(&value) {
            fail(format!("scoring.{name} must be in [0, 1], got {value}"));
        }
    }

    if config.spam.probe_interval_secs == 0 || config.spam.probe_tick_secs == 0 {
        fail("spam probe intervals must be greater than 0".into());
    }
    if config.spam.ban_window_secs == 0 {
        fail("spam.ban_window_secs must be greater than 0".into());
    }

    if config.contact.record_ttl_secs < config.contact.retention_secs {
        fail("contact.record_ttl_secs must not be shorter than contact.retention_secs".into());
    }

    if config.storage.database_path.trim().is_empty() {
        fail("storage.database_path must not be empty".into());
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_windows(name: &str, windows: &[HourWindow], fail: &mut impl FnMut(String)) {
    for (idx, w) in windows.iter().enumerate() {
        if w.start_hour > 23 || w.end_hour > 24 || w.start_hour == w.end_hour {
            fail(format!(
                "{name}[{idx}] must satisfy start_hour < 24, end_hour <= 24 and start != end"
            ));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn messages(config: &CourierConfig) -> Vec<String> {
        validate_config(config)
            .unwrap_err()
            .into_iter()
            .map(|e| e.to_string())
            .collect()
    }

    #[test]
    fn default_config_validates() {
        assert!(validate_config(&CourierConfig::default()).is_ok());
    }

    #[test]
    fn group_factor_below_one_is_rejected() {
        let mut config = CourierConfig::default();
        config.cooldown.agent_group_factor = 0.5;
        assert!(messages(&config)
            .iter()
            .any(|m| m.contains("agent_group_factor")));
    }

    #[test]
    fn all_errors_are_collected() {
        let mut config = CourierConfig::default();
        config.scheduler.max_workers = 0;
        config.interval.ema_alpha = 1.5;
        config.storage.database_path = " ".into();
        assert_eq!(messages(&config).len(), 3);
    }

    #[test]
    fn degenerate_hour_window_is_rejected() {
        let mut config = CourierConfig::default();
        config.interval.quiet_hours = vec![HourWindow {
            start_hour: 5,
            end_hour: 5,
        }];
        assert!(messages(&config).iter().any(|m| m.contains("quiet_hours[0]")));
    }
}
