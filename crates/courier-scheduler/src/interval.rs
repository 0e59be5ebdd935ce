// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Adaptive per-group send interval.
//!
//! Organic (non-agent) arrivals in a target feed an exponential moving
//! average of the instantaneous message rate. The base interval is the
//! average gap between organic messages, clamped to the configured floor
//! and ceiling, then stretched or shortened by time of day.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Timelike, Utc};
use dashmap::DashMap;

use courier_config::model::IntervalConfig;
use courier_core::{Clock, TargetId};

/// No interval is ever shorter than this, whatever the configuration says.
pub const SAFETY_FLOOR: Duration = Duration::from_secs(5);

/// Arrivals closer than this are counted as this far apart.
const MIN_GAP_SECS: f64 = 1.0;

#[derive(Debug, Clone, Copy)]
struct ArrivalStats {
    last_arrival: DateTime<Utc>,
    /// Smoothed messages per minute; `None` until a second arrival is seen.
    ema_mpm: Option<f64>,
}

pub struct AdaptiveIntervalCalculator {
    config: IntervalConfig,
    clock: Arc<dyn Clock>,
    stats: DashMap<TargetId, ArrivalStats>,
}

impl AdaptiveIntervalCalculator {
    pub fn new(config: IntervalConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            config,
            clock,
            stats: DashMap::new(),
        }
    }

    /// Record one organic message in `target` at `at`.
    pub fn observe_organic(&self, target: &TargetId, at: DateTime<Utc>) {
        let alpha = self.config.ema_alpha;
        self.stats
            .entry(target.clone())
            .and_modify(|s| {
                // Out-of-order arrivals carry no rate information.
                if at <= s.last_arrival {
                    return;
                }
                let gap = ((at - s.last_arrival).num_milliseconds() as f64 / 1000.0).max(MIN_GAP_SECS);
                let instant = 60.0 / gap;
                s.ema_mpm = Some(match s.ema_mpm {
                    Some(prev) => alpha * instant + (1.0 - alpha) * prev,
                    None => instant,
                });
                s.last_arrival = at;
            })
            .or_insert(ArrivalStats {
                last_arrival: at,
                ema_mpm: None,
            });
    }

    /// Smoothed organic rate, if there are fresh observations.
    pub fn messages_per_minute(&self, target: &TargetId) -> Option<f64> {
        let now = self.clock.now();
        let window = courier_core::clock::chrono_duration(self.config.trailing_window());
        let stats = self.stats.get(target)?;
        if now - stats.last_arrival > window {
            return None;
        }
        stats.ema_mpm.filter(|mpm| *mpm > 0.0 && mpm.is_finite())
    }

    /// Minimum spacing between agent sends in `target` right now.
    pub fn required_interval(&self, target: &TargetId) -> Duration {
        let Some(mpm) = self.messages_per_minute(target) else {
            return self.config.default_interval().max(SAFETY_FLOOR);
        };
        let floor = self.config.min_floor().as_secs_f64();
        let ceiling = self.config.max_ceiling().as_secs_f64().max(floor);
        let base = (60.0 / mpm).clamp(floor, ceiling);
        let adjusted = base * self.time_of_day_multiplier(self.clock.now());
        Duration::from_secs_f64(adjusted).max(SAFETY_FLOOR)
    }

    /// Quiet hours win over active hours when both match.
    pub fn time_of_day_multiplier(&self, now: DateTime<Utc>) -> f64 {
        let local = now + chrono::Duration::minutes(i64::from(self.config.utc_offset_minutes));
        let hour = local.hour();
        if self.config.quiet_hours.iter().any(|w| w.contains(hour)) {
            self.config.quiet_multiplier
        } else if self.config.active_hours.iter().any(|w| w.contains(hour)) {
            self.config.active_multiplier
        } else {
            1.0
        }
    }

    /// Forget observations for targets that went silent.
    pub fn prune_stale(&self) -> usize {
        let now = self.clock.now();
        let window = courier_core::clock::chrono_duration(self.config.trailing_window());
        let before = self.stats.len();
        self.stats.retain(|_, s| now - s.last_arrival <= window);
        before - self.stats.len()
    }
}
