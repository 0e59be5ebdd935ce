// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for the Courier delivery scheduler.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup. Durations are stored as integer seconds (or
//! milliseconds where noted) and exposed through accessor methods.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Top-level Courier configuration, supplied once at startup.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct CourierConfig {
    /// Delivery loop and worker pool settings.
    #[serde(default)]
    pub scheduler: SchedulerConfig,

    /// Cooldown ledger settings.
    #[serde(default)]
    pub cooldown: CooldownConfig,

    /// Adaptive per-group interval settings.
    #[serde(default)]
    pub interval: IntervalConfig,

    /// Target priority weight table.
    #[serde(default)]
    pub scoring: ScoringConfig,

    /// Agent restriction tracking and probe cadence.
    #[serde(default)]
    pub spam: SpamConfig,

    /// Contact fallback retention.
    #[serde(default)]
    pub contact: ContactConfig,

    /// State store backend settings.
    #[serde(default)]
    pub storage: StorageConfig,
}

/// Delivery loop configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SchedulerConfig {
    /// Tick cadence of the control loop, in milliseconds.
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,

    /// Candidates popped per tick.
    #[serde(default = "default_dispatches_per_tick")]
    pub dispatches_per_tick: usize,

    /// Size of the dispatch worker pool.
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,

    /// Timeout applied to every transport and content call.
    #[serde(default = "default_dispatch_timeout_secs")]
    pub dispatch_timeout_secs: u64,

    /// Transport attempts per candidate for unclassified failures, first try included.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Base backoff between unclassified-failure retries; doubles per attempt.
    #[serde(default = "default_retry_backoff_secs")]
    pub retry_backoff_secs: u64,

    /// Requeue delay after a content generator or profile store failure.
    #[serde(default = "default_collaborator_retry_secs")]
    pub collaborator_retry_secs: u64,

    /// Requeue delay for group candidates whose agent is restricted.
    #[serde(default = "default_restricted_requeue_secs")]
    pub restricted_requeue_secs: u64,

    /// Priority multiplier applied to candidates requeued because of a restriction.
    #[serde(default = "default_restricted_priority_factor")]
    pub restricted_priority_factor: f64,

    /// Interval between health report log lines.
    #[serde(default = "default_report_interval_secs")]
    pub report_interval_secs: u64,

    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: default_tick_interval_ms(),
            dispatches_per_tick: default_dispatches_per_tick(),
            max_workers: default_max_workers(),
            dispatch_timeout_secs: default_dispatch_timeout_secs(),
            max_attempts: default_max_attempts(),
            retry_backoff_secs: default_retry_backoff_secs(),
            collaborator_retry_secs: default_collaborator_retry_secs(),
            restricted_requeue_secs: default_restricted_requeue_secs(),
            restricted_priority_factor: default_restricted_priority_factor(),
            report_interval_secs: default_report_interval_secs(),
            log_level: default_log_level(),
        }
    }
}

impl SchedulerConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn dispatch_timeout(&self) -> Duration {
        Duration::from_secs(self.dispatch_timeout_secs)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_secs(self.retry_backoff_secs)
    }

    pub fn collaborator_retry(&self) -> Duration {
        Duration::from_secs(self.collaborator_retry_secs)
    }

    pub fn restricted_requeue(&self) -> Duration {
        Duration::from_secs(self.restricted_requeue_secs)
    }

    pub fn report_interval(&self) -> Duration {
        Duration::from_secs(self.report_interval_secs)
    }
}

fn default_tick_interval_ms() -> u64 {
    2_000
}

fn default_dispatches_per_tick() -> usize {
    1
}

fn default_max_workers() -> usize {
    8
}

fn default_dispatch_timeout_secs() -> u64 {
    30
}

fn default_max_attempts() -> u32 {
    3
}

fn default_retry_backoff_secs() -> u64 {
    30
}

fn default_collaborator_retry_secs() -> u64 {
    60
}

fn default_restricted_requeue_secs() -> u64 {
    900
}

fn default_restricted_priority_factor() -> f64 {
    0.5
}

fn default_report_interval_secs() -> u64 {
    300
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Cooldown ledger configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct CooldownConfig {
    /// Minimum spacing between sends from one agent to one user.
    #[serde(default = "default_per_recipient_secs")]
    pub per_recipient_secs: u64,

    /// Lower bound of the per-agent, per-group spacing.
    #[serde(default = "default_per_group_min_secs")]
    pub per_group_min_secs: u64,

    /// PER_GROUP interval = max(per_group_min, GROUP_GLOBAL interval * factor). Must be >= 1.
    #[serde(default = "default_agent_group_factor")]
    pub agent_group_factor: f64,

    /// Hard TTL written on every cooldown entry as a safety net.
    #[serde(default = "default_hard_ttl_secs")]
    pub hard_ttl_secs: u64,

    /// Ceiling on reservations per agent in any rolling 60 seconds, across all targets.
    #[serde(default = "default_max_sends_per_minute")]
    pub max_sends_per_minute: u32,
}

impl Default for CooldownConfig {
    fn default() -> Self {
        Self {
            per_recipient_secs: default_per_recipient_secs(),
            per_group_min_secs: default_per_group_min_secs(),
            agent_group_factor: default_agent_group_factor(),
            hard_ttl_secs: default_hard_ttl_secs(),
            max_sends_per_minute: default_max_sends_per_minute(),
        }
    }
}

impl CooldownConfig {
    pub fn per_recipient(&self) -> Duration {
        Duration::from_secs(self.per_recipient_secs)
    }

    pub fn per_group_min(&self) -> Duration {
        Duration::from_secs(self.per_group_min_secs)
    }

    pub fn hard_ttl(&self) -> Duration {
        Duration::from_secs(self.hard_ttl_secs)
    }
}

fn default_per_recipient_secs() -> u64 {
    600
}

fn default_per_group_min_secs() -> u64 {
    300
}

fn default_agent_group_factor() -> f64 {
    3.0
}

fn default_hard_ttl_secs() -> u64 {
    86_400
}

fn default_max_sends_per_minute() -> u32 {
    6
}

/// An hour-of-day window `[start_hour, end_hour)`; wraps past midnight when start > end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct HourWindow {
    pub start_hour: u32,
    pub end_hour: u32,
}

impl HourWindow {
    pub fn contains(&self, hour: u32) -> bool {
        if self.start_hour <= self.end_hour {
            hour >= self.start_hour && hour < self.end_hour
        } else {
            hour >= self.start_hour || hour < self.end_hour
        }
    }
}

/// Adaptive interval configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct IntervalConfig {
    /// EMA smoothing factor per organic observation.
    #[serde(default = "default_ema_alpha")]
    pub ema_alpha: f64,

    #[serde(default = "default_min_floor_secs")]
    pub min_floor_secs: u64,

    #[serde(default = "default_max_ceiling_secs")]
    pub max_ceiling_secs: u64,

    /// Interval used when a target has no usable organic observations.
    #[serde(default = "default_interval_secs")]
    pub default_secs: u64,

    /// Observations older than this are considered stale.
    #[serde(default = "default_trailing_window_secs")]
    pub trailing_window_secs: u64,

    #[serde(default = "default_active_hours")]
    pub active_hours: Vec<HourWindow>,

    #[serde(default = "default_quiet_hours")]
    pub quiet_hours: Vec<HourWindow>,

    #[serde(default = "default_active_multiplier")]
    pub active_multiplier: f64,

    #[serde(default = "default_quiet_multiplier")]
    pub quiet_multiplier: f64,

    /// Offset from UTC, in minutes, used to evaluate hour windows.
    #[serde(default)]
    pub utc_offset_minutes: i32,
}

impl Default for IntervalConfig {
    fn default() -> Self {
        Self {
            ema_alpha: default_ema_alpha(),
            min_floor_secs: default_min_floor_secs(),
            max_ceiling_secs: default_max_ceiling_secs(),
            default_secs: default_interval_secs(),
            trailing_window_secs: default_trailing_window_secs(),
            active_hours: default_active_hours(),
            quiet_hours: default_quiet_hours(),
            active_multiplier: default_active_multiplier(),
            quiet_multiplier: default_quiet_multiplier(),
            utc_offset_minutes: 0,
        }
    }
}

impl IntervalConfig {
    pub fn min_floor(&self) -> Duration {
        Duration::from_secs(self.min_floor_secs)
    }

    pub fn max_ceiling(&self) -> Duration {
        Duration::from_secs(self.max_ceiling_secs)
    }

    pub fn default_interval(&self) -> Duration {
        Duration::from_secs(self.default_secs)
    }

    pub fn trailing_window(&self) -> Duration {
        Duration::from_secs(self.trailing_window_secs)
    }
}

fn default_ema_alpha() -> f64 {
    0.2
}

fn default_min_floor_secs() -> u64 {
    10
}

fn default_max_ceiling_secs() -> u64 {
    1_800
}

fn default_interval_secs() -> u64 {
    600
}

fn default_trailing_window_secs() -> u64 {
    1_800
}

fn default_active_hours() -> Vec<HourWindow> {
    vec![HourWindow {
        start_hour: 18,
        end_hour: 23,
    }]
}

fn default_quiet_hours() -> Vec<HourWindow> {
    vec![HourWindow {
        start_hour: 1,
        end_hour: 7,
    }]
}

fn default_active_multiplier() -> f64 {
    0.7
}

fn default_quiet_multiplier() -> f64 {
    1.5
}

/// Weight table for target priority scoring.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ScoringConfig {
    #[serde(default = "default_response_rate_weight")]
    pub response_rate_weight: f64,

    #[serde(default = "default_activity_weight")]
    pub activity_weight: f64,

    #[serde(default = "default_member_count_weight")]
    pub member_count_weight: f64,

    #[serde(default = "default_spam_tolerance_weight")]
    pub spam_tolerance_weight: f64,

    /// Subtractive weight applied to the fatigue score.
    #[serde(default = "default_fatigue_penalty_weight")]
    pub fatigue_penalty_weight: f64,

    /// Cadence of the profile rescan.
    #[serde(default = "default_rescan_interval_secs")]
    pub rescan_interval_secs: u64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            response_rate_weight: default_response_rate_weight(),
            activity_weight: default_activity_weight(),
            member_count_weight: default_member_count_weight(),
            spam_tolerance_weight: default_spam_tolerance_weight(),
            fatigue_penalty_weight: default_fatigue_penalty_weight(),
            rescan_interval_secs: default_rescan_interval_secs(),
        }
    }
}

impl ScoringConfig {
    pub fn rescan_interval(&self) -> Duration {
        Duration::from_secs(self.rescan_interval_secs)
    }
}

fn default_response_rate_weight() -> f64 {
    0.3
}

fn default_activity_weight() -> f64 {
    0.25
}

fn default_member_count_weight() -> f64 {
    0.2
}

fn default_spam_tolerance_weight() -> f64 {
    0.1
}

fn default_fatigue_penalty_weight() -> f64 {
    0.2
}

fn default_rescan_interval_secs() -> u64 {
    1_800
}

/// Agent restriction tracking configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SpamConfig {
    /// Estimated restriction length after a refused send.
    #[serde(default = "default_ban_window_secs")]
    pub ban_window_secs: u64,

    /// How often each agent is probed.
    #[serde(default = "default_probe_interval_secs")]
    pub probe_interval_secs: u64,

    /// How often the probe runner looks for agents that are due.
    #[serde(default = "default_probe_tick_secs")]
    pub probe_tick_secs: u64,

    #[serde(default = "default_probe_timeout_secs")]
    pub probe_timeout_secs: u64,
}

impl Default for SpamConfig {
    fn default() -> Self {
        Self {
            ban_window_secs: default_ban_window_secs(),
            probe_interval_secs: default_probe_interval_secs(),
            probe_tick_secs: default_probe_tick_secs(),
            probe_timeout_secs: default_probe_timeout_secs(),
        }
    }
}

impl SpamConfig {
    pub fn ban_window(&self) -> Duration {
        Duration::from_secs(self.ban_window_secs)
    }

    pub fn probe_interval(&self) -> Duration {
        Duration::from_secs(self.probe_interval_secs)
    }

    pub fn probe_tick(&self) -> Duration {
        Duration::from_secs(self.probe_tick_secs)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }
}

fn default_ban_window_secs() -> u64 {
    86_400
}

fn default_probe_interval_secs() -> u64 {
    3_600
}

fn default_probe_tick_secs() -> u64 {
    60
}

fn default_probe_timeout_secs() -> u64 {
    15
}

/// Contact fallback configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ContactConfig {
    /// Open requests with no progress for this long expire.
    #[serde(default = "default_retention_secs")]
    pub retention_secs: u64,

    #[serde(default = "default_sweep_interval_secs")]
    pub sweep_interval_secs: u64,

    /// Hard store TTL on contact records, terminal ones included.
    #[serde(default = "default_record_ttl_secs")]
    pub record_ttl_secs: u64,
}

impl Default for ContactConfig {
    fn default() -> Self {
        Self {
            retention_secs: default_retention_secs(),
            sweep_interval_secs: default_sweep_interval_secs(),
            record_ttl_secs: default_record_ttl_secs(),
        }
    }
}

impl ContactConfig {
    pub fn retention(&self) -> Duration {
        Duration::from_secs(self.retention_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }

    pub fn record_ttl(&self) -> Duration {
        Duration::from_secs(self.record_ttl_secs)
    }
}

fn default_retention_secs() -> u64 {
    86_400
}

fn default_sweep_interval_secs() -> u64 {
    600
}

fn default_record_ttl_secs() -> u64 {
    7 * 86_400
}

/// State store backend configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_database_path")]
    pub database_path: String,

    /// Enable WAL (Write-Ahead Logging) mode for SQLite.
    #[serde(default = "default_wal_mode")]
    pub wal_mode: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            wal_mode: default_wal_mode(),
        }
    }
}

fn default_database_path() -> String {
    dirs::data_dir()
        .map(|p| p.join("courier").join("courier.db"))
        .unwrap_or_else(|| std::path::PathBuf::from("courier.db"))
        .to_string_lossy()
        .to_string()
}

fn default_wal_mode() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hour_window_plain_range() {
        let w = HourWindow {
            start_hour: 1,
            end_hour: 7,
        };
        assert!(w.contains(1));
        assert!(w.contains(6));
        assert!(!w.contains(7));
        assert!(!w.contains(0));
    }

    #[test]
    fn hour_window_wraps_midnight() {
        let w = HourWindow {
            start_hour: 22,
            end_hour: 2,
        };
        assert!(w.contains(23));
        assert!(w.contains(0));
        assert!(w.contains(1));
        assert!(!w.contains(2));
        assert!(!w.contains(12));
    }

    #[test]
    fn defaults_match_documented_values() {
        let config = CourierConfig::default();
        assert_eq!(config.scheduler.max_attempts, 3);
        assert_eq!(config.spam.ban_window(), Duration::from_secs(86_400));
        assert_eq!(config.spam.probe_interval(), Duration::from_secs(3_600));
        assert_eq!(config.contact.retention(), Duration::from_secs(86_400));
        assert!((config.interval.ema_alpha - 0.2).abs() < f64::EPSILON);
        assert!(config.cooldown.agent_group_factor >= 1.0);
    }
}
