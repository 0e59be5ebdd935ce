// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-agent restriction state machine.
//!
//! Every call site that learns something about an agent's broadcast
//! capability reports it here: send outcomes through [`record_outcome`] and
//! platform answers through [`refresh`]. The record itself is persisted in
//! the state store under `spam:{agent}`.
//!
//! [`record_outcome`]: SpamStateTracker::record_outcome
//! [`refresh`]: SpamStateTracker::refresh

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use courier_config::model::SpamConfig;
use courier_core::clock::chrono_duration;
use courier_core::traits::{Mutation, get_json, mutate_json};
use courier_core::{
    AgentId, AgentRecord, Clock, CourierError, DeliveryOutcome, PlatformProbe, ProbeReport,
    SpamState, StateStore,
};

use crate::keys;
use crate::recording;

/// Stored value of a rate-limit blackout.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Blackout {
    pub until: DateTime<Utc>,
}

pub struct SpamStateTracker {
    store: Arc<dyn StateStore>,
    probe: Arc<dyn PlatformProbe>,
    clock: Arc<dyn Clock>,
    config: SpamConfig,
}

impl SpamStateTracker {
    pub fn new(
        store: Arc<dyn StateStore>,
        probe: Arc<dyn PlatformProbe>,
        clock: Arc<dyn Clock>,
        config: SpamConfig,
    ) -> Self {
        Self {
            store,
            probe,
            clock,
            config,
        }
    }

    /// Registers an agent. New agents start UNKNOWN; known agents keep their record.
    pub async fn register(&self, agent: &AgentId) -> Result<AgentRecord, CourierError> {
        let now = self.clock.now();
        let fresh = AgentRecord::unknown(agent.clone(), now);
        let (_, after) = mutate_json::<AgentRecord, _>(
            self.store.as_ref(),
            &keys::agent_record(agent),
            None,
            |current| match current {
                Some(_) => Mutation::Keep,
                None => Mutation::Put(fresh.clone()),
            },
        )
        .await?;
        Ok(after.unwrap_or(fresh))
    }

    /// Current record, or a transient UNKNOWN record if the agent was never seen.
    pub async fn record(&self, agent: &AgentId) -> Result<AgentRecord, CourierError> {
        let stored: Option<AgentRecord> =
            get_json(self.store.as_ref(), &keys::agent_record(agent)).await?;
        Ok(stored.unwrap_or_else(|| AgentRecord::unknown(agent.clone(), self.clock.now())))
    }

    pub async fn get_state(&self, agent: &AgentId) -> Result<SpamState, CourierError> {
        Ok(self.record(agent).await?.spam_state)
    }

    /// Every agent with a persisted record.
    pub async fn agents(&self) -> Result<Vec<AgentId>, CourierError> {
        let rows = self.store.scan_prefix(keys::SPAM_PREFIX).await?;
        Ok(rows
            .into_iter()
            .filter_map(|(key, _)| {
                key.strip_prefix(keys::SPAM_PREFIX)
                    .map(|id| AgentId(id.to_string()))
            })
            .collect())
    }

    /// Feeds a transport outcome into the state machine and returns the resulting state.
    ///
    /// FORBIDDEN restricts the agent for the configured ban window. RATE_LIMITED
    /// leaves the state alone and writes a blackout the cooldown ledger honors.
    /// OK resolves UNKNOWN to CLEAN but never clears a restriction, because a
    /// direct send succeeding says nothing about group broadcast capability.
    pub async fn record_outcome(
        &self,
        agent: &AgentId,
        outcome: &DeliveryOutcome,
    ) -> Result<SpamState, CourierError> {
        let now = self.clock.now();
        match outcome {
            DeliveryOutcome::Ok => {
                self.transition(agent, |record| {
                    if record.spam_state == SpamState::Unknown {
                        record.spam_state = SpamState::Clean;
                    }
                })
                .await
            }
            DeliveryOutcome::Forbidden => {
                let until = now + chrono_duration(self.config.ban_window());
                self.transition(agent, |record| {
                    record.spam_state = SpamState::Restricted;
                    record.restricted_until = Some(match record.restricted_until {
                        Some(existing) if existing > until => existing,
                        _ => until,
                    });
                })
                .await
            }
            DeliveryOutcome::RateLimited { retry_after } => {
                self.impose_blackout(agent, *retry_after).await?;
                self.get_state(agent).await
            }
            DeliveryOutcome::Other { .. } => self.get_state(agent).await,
        }
    }

    /// Writes `blackout:{agent}` expiring after `retry_after`. A longer blackout already in place wins.
    pub async fn impose_blackout(
        &self,
        agent: &AgentId,
        retry_after: std::time::Duration,
    ) -> Result<(), CourierError> {
        let until = self.clock.now() + chrono_duration(retry_after);
        let (_, after) = mutate_json::<Blackout, _>(
            self.store.as_ref(),
            &keys::blackout(agent),
            Some(retry_after),
            |current| match current {
                Some(existing) if existing.until >= until => Mutation::Keep,
                _ => Mutation::Put(Blackout { until }),
            },
        )
        .await?;
        debug!(agent_id = %agent, until = ?after.map(|b| b.until), "rate-limit blackout set");
        Ok(())
    }

    /// Asks the platform probe about `agent` and applies the answer.
    ///
    /// A probe error or timeout leaves the record untouched and is returned
    /// to the caller; an ambiguous signal never clears a restriction.
    pub async fn refresh(&self, agent: &AgentId) -> Result<SpamState, CourierError> {
        let timeout = self.config.probe_timeout();
        let report = match tokio::time::timeout(timeout, self.probe.check_restricted(agent)).await
        {
            Ok(Ok(report)) => report,
            Ok(Err(e)) => {
                warn!(agent_id = %agent, error = %e, "probe failed, state unchanged");
                return Err(e);
            }
            Err(_) => {
                warn!(agent_id = %agent, ?timeout, "probe timed out, state unchanged");
                return Err(CourierError::Timeout { duration: timeout });
            }
        };
        self.apply_probe(agent, &report).await
    }

    async fn apply_probe(
        &self,
        agent: &AgentId,
        report: &ProbeReport,
    ) -> Result<SpamState, CourierError> {
        let now = self.clock.now();
        let fallback_until = now + chrono_duration(self.config.ban_window());
        self.transition(agent, |record| {
            record.last_probe_at = Some(now);
            if report.restricted {
                let carried = record.restricted_until.filter(|until| *until > now);
                record.spam_state = SpamState::Restricted;
                record.restricted_until = report.until.or(carried).or(Some(fallback_until));
            } else {
                record.spam_state = SpamState::Clean;
                record.restricted_until = None;
            }
        })
        .await
    }

    /// Whether the probe runner should check `agent` now.
    ///
    /// Due when never probed, when the probe interval has elapsed, or when a
    /// restriction window has run out. Running out only schedules a probe;
    /// the agent stays RESTRICTED until the probe answers.
    pub async fn is_due(&self, agent: &AgentId) -> Result<bool, CourierError> {
        let record = self.record(agent).await?;
        Ok(self.due_at(&record) <= self.clock.now())
    }

    fn due_at(&self, record: &AgentRecord) -> DateTime<Utc> {
        let Some(last) = record.last_probe_at else {
            return DateTime::<Utc>::MIN_UTC;
        };
        let periodic = last + chrono_duration(self.config.probe_interval());
        match (record.spam_state, record.restricted_until) {
            (SpamState::Restricted, Some(until)) if until > last => periodic.min(until),
            _ => periodic,
        }
    }

    /// Number of agents currently RESTRICTED.
    pub async fn restricted_count(&self) -> Result<usize, CourierError> {
        let rows = self.store.scan_prefix(keys::SPAM_PREFIX).await?;
        Ok(rows
            .iter()
            .filter_map(|(_, raw)| serde_json::from_str::<AgentRecord>(raw).ok())
            .filter(|r| r.spam_state == SpamState::Restricted)
            .count())
    }

    async fn transition<F>(&self, agent: &AgentId, apply: F) -> Result<SpamState, CourierError>
    where
        F: Fn(&mut AgentRecord) + Send + Sync,
    {
        let now = self.clock.now();
        let (before, after) = mutate_json::<AgentRecord, _>(
            self.store.as_ref(),
            &keys::agent_record(agent),
            None,
            |current| {
                let mut next = current
                    .cloned()
                    .unwrap_or_else(|| AgentRecord::unknown(agent.clone(), now));
                apply(&mut next);
                if current == Some(&next) {
                    Mutation::Keep
                } else {
                    next.updated_at = now;
                    Mutation::Put(next)
                }
            },
        )
        .await?;

        let old_state = before.map_or(SpamState::Unknown, |r| r.spam_state);
        let new_state = after.map_or(SpamState::Unknown, |r| r.spam_state);
        if old_state != new_state {
            info!(agent_id = %agent, from = %old_state, to = %new_state, "agent state changed");
            recording::record_state_transition(new_state);
        }
        Ok(new_state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use courier_core::ManualClock;
    use courier_storage::MemoryStateStore;
    use courier_test_utils::MockProbe;
    use std::time::Duration;

    struct Fixture {
        tracker: SpamStateTracker,
        clock: Arc<ManualClock>,
        probe: Arc<MockProbe>,
        store: Arc<MemoryStateStore>,
    }

    fn fixture() -> Fixture {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap(),
        ));
        let store = Arc::new(MemoryStateStore::new(clock.clone()));
        let probe = Arc::new(MockProbe::new());
        let tracker = SpamStateTracker::new(
            store.clone(),
            probe.clone(),
            clock.clone(),
            SpamConfig::default(),
        );
        Fixture {
            tracker,
            clock,
            probe,
            store,
        }
    }

    #[tokio::test]
    async fn new_agent_starts_unknown_and_ok_resolves_clean() {
        let f = fixture();
        let agent = AgentId::from("a");
        assert_eq!(f.tracker.register(&agent).await.unwrap().spam_state, SpamState::Unknown);
        let state = f.tracker.record_outcome(&agent, &DeliveryOutcome::Ok).await.unwrap();
        assert_eq!(state, SpamState::Clean);
    }

    #[tokio::test]
    async fn forbidden_restricts_for_ban_window() {
        let f = fixture();
        let agent = AgentId::from("a");
        f.tracker.register(&agent).await.unwrap();
        f.tracker
            .record_outcome(&agent, &DeliveryOutcome::Forbidden)
            .await
            .unwrap();
        let record = f.tracker.record(&agent).await.unwrap();
        assert_eq!(record.spam_state, SpamState::Restricted);
        assert_eq!(
            record.restricted_until.unwrap() - f.clock.now(),
            chrono::Duration::hours(24)
        );

        // A later OK (direct send) does not lift the restriction.
        f.tracker.record_outcome(&agent, &DeliveryOutcome::Ok).await.unwrap();
        assert_eq!(f.tracker.get_state(&agent).await.unwrap(), SpamState::Restricted);
    }

    #[tokio::test]
    async fn rate_limited_sets_blackout_without_state_change() {
        let f = fixture();
        let agent = AgentId::from("a");
        f.tracker.register(&agent).await.unwrap();
        f.tracker
            .record_outcome(
                &agent,
                &DeliveryOutcome::RateLimited {
                    retry_after: Duration::from_secs(30),
                },
            )
            .await
            .unwrap();
        assert_eq!(f.tracker.get_state(&agent).await.unwrap(), SpamState::Unknown);
        assert!(f.store.get(&keys::blackout(&agent)).await.unwrap().is_some());
        f.clock.advance(Duration::from_secs(31));
        assert!(f.store.get(&keys::blackout(&agent)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn probe_clears_restriction_when_platform_confirms() {
        let f = fixture();
        let agent = AgentId::from("b");
        f.tracker.register(&agent).await.unwrap();
        f.tracker
            .record_outcome(&agent, &DeliveryOutcome::Forbidden)
            .await
            .unwrap();
        f.clock.advance(Duration::from_secs(3600));
        f.probe.set_restricted(&agent, false, None);
        assert_eq!(f.tracker.refresh(&agent).await.unwrap(), SpamState::Clean);
        assert_eq!(f.tracker.record(&agent).await.unwrap().restricted_until, None);
    }

    #[tokio::test]
    async fn probe_failure_leaves_state_unchanged() {
        let f = fixture();
        let agent = AgentId::from("b");
        f.tracker.register(&agent).await.unwrap();
        f.tracker
            .record_outcome(&agent, &DeliveryOutcome::Forbidden)
            .await
            .unwrap();
        f.probe.fail_next(&agent);
        assert!(f.tracker.refresh(&agent).await.is_err());
        let record = f.tracker.record(&agent).await.unwrap();
        assert_eq!(record.spam_state, SpamState::Restricted);
        assert_eq!(record.last_probe_at, None);
    }

    #[tokio::test]
    async fn window_expiry_makes_probe_due_but_keeps_restriction() {
        let f = fixture();
        let agent = AgentId::from("c");
        f.tracker.register(&agent).await.unwrap();
        f.probe.set_restricted(&agent, true, Some(f.clock.now() + chrono::Duration::minutes(90)));
        f.tracker.refresh(&agent).await.unwrap();
        assert!(!f.tracker.is_due(&agent).await.unwrap());

        // The hourly cadence comes first.
        f.clock.advance(Duration::from_secs(3600));
        assert!(f.tracker.is_due(&agent).await.unwrap());
        f.tracker.refresh(&agent).await.unwrap();

        // Window ends at +90min, before the next hourly probe at +120min.
        f.clock.advance(Duration::from_secs(30 * 60));
        assert!(f.tracker.is_due(&agent).await.unwrap());
        assert_eq!(f.tracker.get_state(&agent).await.unwrap(), SpamState::Restricted);
    }

    #[tokio::test]
    async fn agents_lists_registered_records() {
        let f = fixture();
        f.tracker.register(&AgentId::from("a")).await.unwrap();
        f.tracker.register(&AgentId::from("b")).await.unwrap();
        f.tracker
            .record_outcome(&AgentId::from("b"), &DeliveryOutcome::Forbidden)
            .await
            .unwrap();
        let mut agents = f.tracker.agents().await.unwrap();
        agents.sort();
        assert_eq!(agents, vec![AgentId::from("a"), AgentId::from("b")]);
        assert_eq!(f.tracker.restricted_count().await.unwrap(), 1);
    }
}
