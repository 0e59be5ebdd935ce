// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test harness for end-to-end scheduler tests.
//!
//! `TestHarness` bundles a [`ManualClock`], an in-memory state store behind
//! a [`FlakyStateStore`], every mock collaborator and a default
//! configuration. Tests build the scheduler from its public fields.

use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};

use courier_config::model::CourierConfig;
use courier_core::{ActivityLevel, ManualClock, PrioritySignals};
use courier_storage::MemoryStateStore;

use crate::flaky_store::FlakyStateStore;
use crate::mocks::{MockContent, MockProbe, MockProfileStore, MockTransport};

pub struct TestHarness {
    pub clock: Arc<ManualClock>,
    pub store: Arc<FlakyStateStore>,
    pub transport: Arc<MockTransport>,
    pub probe: Arc<MockProbe>,
    pub content: Arc<MockContent>,
    pub profile: Arc<MockProfileStore>,
    pub config: CourierConfig,
}

impl TestHarness {
    /// Midday UTC, outside the default active and quiet hours.
    pub fn start_time() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0)
            .single()
            .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
    }

    pub fn new() -> Self {
        Self::at(Self::start_time())
    }

    pub fn at(start: DateTime<Utc>) -> Self {
        Self::with_config(start, CourierConfig::default())
    }

    pub fn with_config(start: DateTime<Utc>, config: CourierConfig) -> Self {
        let clock = Arc::new(ManualClock::new(start));
        let memory = Arc::new(MemoryStateStore::new(clock.clone()));
        Self {
            store: Arc::new(FlakyStateStore::new(memory)),
            clock,
            transport: Arc::new(MockTransport::new()),
            probe: Arc::new(MockProbe::new()),
            content: Arc::new(MockContent::new()),
            profile: Arc::new(MockProfileStore::new()),
            config,
        }
    }

    /// Signals of a responsive, large, rested group.
    pub fn hot_signals(refreshed_at: DateTime<Utc>) -> PrioritySignals {
        PrioritySignals {
            response_rate: 0.9,
            activity_level: ActivityLevel::VeryHigh,
            fatigue_score: 0.0,
            spam_tolerance: 0.8,
            member_count: Some(2_000),
            refreshed_at,
        }
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use courier_core::{Clock, StateStore};

    #[tokio::test]
    async fn flaky_store_refuses_calls_while_down() {
        let h = TestHarness::new();
        assert_eq!(h.clock.now(), TestHarness::start_time());
        assert!(h.store.compare_and_swap("k", None, Some("v"), None).await.unwrap());

        h.store.set_available(false);
        let err = h.store.get("k").await.unwrap_err();
        assert!(err.is_store_failure());

        h.store.set_available(true);
        assert_eq!(h.store.get("k").await.unwrap().as_deref(), Some("v"));
    }
}
