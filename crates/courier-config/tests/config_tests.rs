// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Integration tests for the Courier configuration system.

use std::time::Duration;

use courier_config::diagnostic::ConfigError;
use courier_config::model::{CourierConfig, HourWindow};
use courier_config::{load_and_validate_str, load_config_from_str};

#[test]
fn valid_toml_deserializes_into_courier_config() {
    let toml = r#"
[scheduler]
tick_interval_ms = 250
max_workers = 4
max_attempts = 2
log_level = "debug"

[cooldown]
per_recipient_secs = 900
per_group_min_secs = 120
agent_group_factor = 2.0
max_sends_per_minute = 3

[interval]
ema_alpha = 0.5
utc_offset_minutes = 180
active_hours = [{ start_hour = 20, end_hour = 2 }]
quiet_hours = []

[scoring]
response_rate_weight = 0.4

[spam]
ban_window_secs = 43200
probe_interval_secs = 1800

[contact]
retention_secs = 3600

[storage]
database_path = "/tmp/courier-test.db"
wal_mode = false
"#;

    let config = load_config_from_str(toml).expect("valid TOML should deserialize");
    assert_eq!(config.scheduler.tick_interval(), Duration::from_millis(250));
    assert_eq!(config.scheduler.max_workers, 4);
    assert_eq!(config.scheduler.max_attempts, 2);
    assert_eq!(config.scheduler.log_level, "debug");
    assert_eq!(config.cooldown.per_recipient(), Duration::from_secs(900));
    assert_eq!(config.cooldown.max_sends_per_minute, 3);
    assert_eq!(config.interval.utc_offset_minutes, 180);
    assert_eq!(
        config.interval.active_hours,
        vec![HourWindow {
            start_hour: 20,
            end_hour: 2
        }]
    );
    assert!(config.interval.quiet_hours.is_empty());
    assert!((config.scoring.response_rate_weight - 0.4).abs() < f64::EPSILON);
    // Unset weights keep their defaults.
    assert!((config.scoring.activity_weight - 0.25).abs() < f64::EPSILON);
    assert_eq!(config.spam.ban_window(), Duration::from_secs(43_200));
    assert_eq!(config.contact.retention(), Duration::from_secs(3_600));
    assert_eq!(config.storage.database_path, "/tmp/courier-test.db");
    assert!(!config.storage.wal_mode);
}

#[test]
fn empty_toml_yields_defaults() {
    let config = load_config_from_str("").expect("empty config uses defaults");
    let defaults = CourierConfig::default();
    assert_eq!(config.scheduler.max_workers, defaults.scheduler.max_workers);
    assert_eq!(config.spam.probe_interval_secs, 3_600);
    assert_eq!(config.cooldown.per_group_min_secs, 300);
}

#[test]
fn unknown_field_suggests_correction() {
    let toml = r#"
[cooldown]
per_recipent_secs = 60
"#;
    let errors = load_and_validate_str(toml).unwrap_err();
    assert_eq!(errors.len(), 1);
    match &errors[0] {
        ConfigError::UnknownKey {
            key, suggestion, ..
        } => {
            assert_eq!(key, "per_recipent_secs");
            assert_eq!(suggestion.as_deref(), Some("per_recipient_secs"));
        }
        other => panic!("expected UnknownKey, got {other:?}"),
    }
}

#[test]
fn unknown_section_is_rejected() {
    let toml = r#"
[metrics]
enabled = true
"#;
    let errors = load_and_validate_str(toml).unwrap_err();
    assert!(
        errors
            .iter()
            .any(|e| matches!(e, ConfigError::UnknownKey { key, .. } if key == "metrics"))
    );
}

#[test]
fn wrong_type_produces_invalid_type() {
    let toml = r#"
[scheduler]
max_workers = "many"
"#;
    let errors = load_and_validate_str(toml).unwrap_err();
    assert!(
        errors
            .iter()
            .any(|e| matches!(e, ConfigError::InvalidType { key, .. } if key.contains("max_workers")))
    );
}

#[test]
fn semantic_violations_are_reported_after_parsing() {
    let toml = r#"
[cooldown]
agent_group_factor = 0.9

[interval]
min_floor_secs = 2000
max_ceiling_secs = 1000
"#;
    let errors = load_and_validate_str(toml).unwrap_err();
    let rendered: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
    assert!(rendered.iter().any(|m| m.contains("agent_group_factor")));
    assert!(rendered.iter().any(|m| m.contains("min_floor_secs")));
}
