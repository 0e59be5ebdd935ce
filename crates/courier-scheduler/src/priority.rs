// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Target priority scoring.
//!
//! One weight table turns profile-store signals into a score in
//! [`SCORE_MIN`]..=[`SCORE_MAX`]:
//!
//! | signal          | weight | normalization                         |
//! |-----------------|--------|---------------------------------------|
//! | response rate   | 0.30   | as is                                 |
//! | activity level  | 0.25   | dead 0.2 .. very high 1.0, unknown 0.5 |
//! | member count    | 0.20   | tiers at 50 / 200 / 1000 / 5000       |
//! | spam tolerance  | 0.10   | as is                                 |
//! | fatigue         | -0.20  | as is, subtracted                     |
//!
//! The weighted sum is scaled so a target maxing every positive signal
//! scores [`SCORE_MAX`], then clamped.

use std::cmp::Ordering;

use chrono::{DateTime, Utc};

use courier_config::model::ScoringConfig;
use courier_core::{ActivityLevel, PrioritySignals, Target};

pub const SCORE_MIN: f64 = 0.0;
pub const SCORE_MAX: f64 = 100.0;

/// Score used for targets with no profile data yet.
pub const NEUTRAL_SCORE: f64 = 50.0;

/// Score plus the freshness of the data behind it. Higher compares greater.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Priority {
    pub score: f64,
    pub refreshed_at: Option<DateTime<Utc>>,
}

impl Priority {
    pub fn new(score: f64, refreshed_at: Option<DateTime<Utc>>) -> Self {
        Self {
            score,
            refreshed_at,
        }
    }
}

impl Eq for Priority {}

impl PartialOrd for Priority {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Priority {
    /// Equal scores prefer the fresher profile; `None` is the stalest.
    fn cmp(&self, other: &Self) -> Ordering {
        self.score
            .total_cmp(&other.score)
            .then_with(|| self.refreshed_at.cmp(&other.refreshed_at))
    }
}

pub fn activity_score(level: ActivityLevel) -> f64 {
    match level {
        ActivityLevel::VeryHigh => 1.0,
        ActivityLevel::High => 0.8,
        ActivityLevel::Medium => 0.6,
        ActivityLevel::Low => 0.4,
        ActivityLevel::Dead => 0.2,
        ActivityLevel::Unknown => 0.5,
    }
}

pub fn member_tier(member_count: Option<u64>) -> f64 {
    match member_count {
        None => 0.5,
        Some(n) if n < 50 => 0.2,
        Some(n) if n < 200 => 0.4,
        Some(n) if n < 1_000 => 0.6,
        Some(n) if n < 5_000 => 0.8,
        Some(_) => 1.0,
    }
}

fn unit(x: f64) -> f64 {
    if x.is_nan() { 0.0 } else { x.clamp(0.0, 1.0) }
}

#[derive(Debug, Clone)]
pub struct TargetPriorityScorer {
    weights: ScoringConfig,
}

impl TargetPriorityScorer {
    pub fn new(weights: ScoringConfig) -> Self {
        Self { weights }
    }

    pub fn score(&self, target: &Target) -> f64 {
        match &target.signals {
            Some(signals) => self.score_signals(signals),
            None => NEUTRAL_SCORE,
        }
    }

    pub fn priority(&self, target: &Target) -> Priority {
        Priority::new(
            self.score(target),
            target.signals.as_ref().map(|s| s.refreshed_at),
        )
    }

    pub fn score_signals(&self, s: &PrioritySignals) -> f64 {
        let w = &self.weights;
        let positive = w.response_rate_weight
            + w.activity_weight
            + w.member_count_weight
            + w.spam_tolerance_weight;
        if positive <= 0.0 {
            return SCORE_MIN;
        }
        let raw = w.response_rate_weight * unit(s.response_rate)
            + w.activity_weight * activity_score(s.activity_level)
            + w.member_count_weight * member_tier(s.member_count)
            + w.spam_tolerance_weight * unit(s.spam_tolerance)
            - w.fatigue_penalty_weight * unit(s.fatigue_score);
        (raw / positive * SCORE_MAX).clamp(SCORE_MIN, SCORE_MAX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use proptest::prelude::*;

    fn signals(rr: f64, level: ActivityLevel, fatigue: f64, tol: f64, members: Option<u64>) -> PrioritySignals {
        PrioritySignals {
            response_rate: rr,
            activity_level: level,
            fatigue_score: fatigue,
            spam_tolerance: tol,
            member_count: members,
            refreshed_at: Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap(),
        }
    }

    fn scorer() -> TargetPriorityScorer {
        TargetPriorityScorer::new(ScoringConfig::default())
    }

    #[test]
    fn best_possible_target_scores_max() {
        let s = signals(1.0, ActivityLevel::VeryHigh, 0.0, 1.0, Some(10_000));
        assert!((scorer().score_signals(&s) - SCORE_MAX).abs() < 1e-9);
    }

    #[test]
    fn fatigue_lowers_score() {
        let fresh = signals(0.5, ActivityLevel::Medium, 0.0, 0.5, Some(300));
        let tired = signals(0.5, ActivityLevel::Medium, 0.9, 0.5, Some(300));
        assert!(scorer().score_signals(&tired) < scorer().score_signals(&fresh));
    }

    #[test]
    fn dead_exhausted_target_clamps_to_min() {
        let s = signals(0.0, ActivityLevel::Dead, 1.0, 0.0, Some(3));
        // 0.25*0.2 + 0.2*0.2 - 0.2 < 0
        assert_eq!(scorer().score_signals(&s), SCORE_MIN);
    }

    #[test]
    fn missing_signals_score_neutral() {
        assert_eq!(scorer().score(&Target::group("g")), NEUTRAL_SCORE);
    }

    #[test]
    fn member_tiers() {
        assert_eq!(member_tier(Some(49)), 0.2);
        assert_eq!(member_tier(Some(50)), 0.4);
        assert_eq!(member_tier(Some(999)), 0.6);
        assert_eq!(member_tier(Some(4_999)), 0.8);
        assert_eq!(member_tier(Some(5_000)), 1.0);
        assert_eq!(member_tier(None), 0.5);
    }

    #[test]
    fn ties_prefer_fresher_profile() {
        let old = Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap();
        let new = Utc.with_ymd_and_hms(2026, 3, 1, 6, 0, 0).unwrap();
        assert!(Priority::new(40.0, Some(new)) > Priority::new(40.0, Some(old)));
        assert!(Priority::new(40.0, Some(old)) > Priority::new(40.0, None));
        assert!(Priority::new(41.0, None) > Priority::new(40.0, Some(new)));
    }

    proptest! {
        #[test]
        fn score_stays_in_bounds(
            rr in -1.0f64..2.0,
            fatigue in -1.0f64..2.0,
            tol in -1.0f64..2.0,
            members in proptest::option::of(0u64..100_000),
            level in 0usize..6,
        ) {
            let levels = [
                ActivityLevel::Dead,
                ActivityLevel::Low,
                ActivityLevel::Medium,
                ActivityLevel::High,
                ActivityLevel::VeryHigh,
                ActivityLevel::Unknown,
            ];
            let s = signals(rr, levels[level], fatigue, tol, members);
            let score = scorer().score_signals(&s);
            prop_assert!((SCORE_MIN..=SCORE_MAX).contains(&score));
        }

        #[test]
        fn higher_response_rate_never_lowers_score(a in 0.0f64..1.0, b in 0.0f64..1.0) {
            let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
            let low = signals(lo, ActivityLevel::Medium, 0.3, 0.5, Some(500));
            let high = signals(hi, ActivityLevel::Medium, 0.3, 0.5, Some(500));
            prop_assert!(scorer().score_signals(&high) >= scorer().score_signals(&low));
        }
    }
}
