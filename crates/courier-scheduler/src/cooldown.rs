// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Cooldown ledger: minimum spacing between sends at three granularities.
//!
//! Every reservation is a compare-and-swap against the state store, so two
//! concurrent attempts on the same key can never both succeed, whichever
//! process they come from. A reservation first writes a *hold* next to the
//! committed `last_sent_at`; the hold blocks other reservations exactly like
//! a send would. After dispatch the caller either commits (the hold becomes
//! the new `last_sent_at`) or rolls back (only its own hold is removed).
//!
//! A multi-scope reservation takes the agent's per-minute slot and then
//! each applicable scope in [`CooldownScope::ORDER`]. If any step is
//! rejected, every earlier step is rolled back before returning.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use courier_config::model::CooldownConfig;
use courier_core::clock::chrono_duration;
use courier_core::traits::{Mutation, get_json, mutate_json};
use courier_core::{AgentId, Clock, CooldownScope, CourierError, StateStore, TargetId};

use crate::keys;
use crate::recording;
use crate::spam_state::Blackout;

const RATE_WINDOW: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Hold {
    token: String,
    reserved_at: DateTime<Utc>,
}

/// Stored value of one cooldown key.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
struct CooldownEntry {
    last_sent_at: Option<DateTime<Utc>>,
    hold: Option<Hold>,
}

impl CooldownEntry {
    fn effective_last(&self) -> Option<DateTime<Utc>> {
        let held = self.hold.as_ref().map(|h| h.reserved_at);
        match (self.last_sent_at, held) {
            (Some(a), Some(b)) => Some(a.max(b)),
            (a, b) => a.or(b),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct RateStamp {
    token: String,
    at: DateTime<Utc>,
}

/// Reservations taken by one agent during the trailing minute.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
struct RateWindow {
    stamps: Vec<RateStamp>,
}

/// What a send is about to touch. Determines which scopes apply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendContext {
    pub agent: AgentId,
    pub group: Option<TargetId>,
    pub recipient: Option<TargetId>,
}

impl SendContext {
    /// Unprompted post to a group: PER_GROUP and GROUP_GLOBAL.
    pub fn broadcast(agent: AgentId, group: TargetId) -> Self {
        Self {
            agent,
            group: Some(group),
            recipient: None,
        }
    }

    /// Reply to `user` inside `group`: all three scopes.
    pub fn reply(agent: AgentId, group: TargetId, user: TargetId) -> Self {
        Self {
            agent,
            group: Some(group),
            recipient: Some(user),
        }
    }

    /// Direct message to `user`: PER_RECIPIENT in the direct context.
    pub fn direct(agent: AgentId, user: TargetId) -> Self {
        Self {
            agent,
            group: None,
            recipient: Some(user),
        }
    }

    /// The applicable scopes, in reservation order, with their store keys.
    pub fn scope_keys(&self) -> Vec<(CooldownScope, String)> {
        let mut out = Vec::with_capacity(3);
        for scope in CooldownScope::ORDER {
            let key = match (scope, &self.group, &self.recipient) {
                (CooldownScope::PerRecipient, group, Some(user)) => {
                    Some(keys::per_recipient(&self.agent, group.as_ref(), user))
                }
                (CooldownScope::PerGroup, Some(group), _) => {
                    Some(keys::per_group(&self.agent, group))
                }
                (CooldownScope::GroupGlobal, Some(group), _) => Some(keys::group_global(group)),
                _ => None,
            };
            if let Some(key) = key {
                out.push((scope, key));
            }
        }
        out
    }
}

/// Minimum spacing for each scope of one send.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CooldownIntervals {
    pub per_recipient: Duration,
    pub per_group: Duration,
    pub group_global: Duration,
}

impl CooldownIntervals {
    /// Derive the scope intervals from the group's adaptive interval.
    ///
    /// PER_GROUP is never shorter than GROUP_GLOBAL, so one agent cannot
    /// send at the group-wide cadence on its own.
    pub fn derive(config: &CooldownConfig, group_interval: Duration) -> Self {
        let factor = config.agent_group_factor.max(1.0);
        let scaled = group_interval.mul_f64(factor);
        Self {
            per_recipient: config.per_recipient(),
            per_group: scaled.max(config.per_group_min()).max(group_interval),
            group_global: group_interval,
        }
    }

    pub fn for_scope(&self, scope: CooldownScope) -> Duration {
        match scope {
            CooldownScope::PerRecipient => self.per_recipient,
            CooldownScope::PerGroup => self.per_group,
            CooldownScope::GroupGlobal => self.group_global,
        }
    }
}

/// Why a multi-scope reservation was refused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectReason {
    /// The agent is inside a rate-limit blackout.
    Blackout { until: DateTime<Utc> },
    /// The agent already used its per-minute allowance.
    RateCap,
    /// A cooldown scope has not elapsed.
    Scope(CooldownScope),
}

impl RejectReason {
    pub fn label(&self) -> &'static str {
        match self {
            RejectReason::Blackout { .. } => "blackout",
            RejectReason::RateCap => "rate_cap",
            RejectReason::Scope(CooldownScope::PerRecipient) => "per_recipient",
            RejectReason::Scope(CooldownScope::PerGroup) => "per_group",
            RejectReason::Scope(CooldownScope::GroupGlobal) => "group_global",
        }
    }
}

/// A successful multi-scope reservation. Must be committed or rolled back.
#[derive(Debug, Clone, PartialEq)]
pub struct Reservation {
    pub agent: AgentId,
    pub reserved_at: DateTime<Utc>,
    token: String,
    scope_keys: Vec<String>,
    rate_key: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ReserveOutcome {
    Reserved(Reservation),
    Rejected(RejectReason),
}

pub struct CooldownLedger {
    store: Arc<dyn StateStore>,
    clock: Arc<dyn Clock>,
    config: CooldownConfig,
}

impl CooldownLedger {
    pub fn new(store: Arc<dyn StateStore>, clock: Arc<dyn Clock>, config: CooldownConfig) -> Self {
        Self {
            store,
            clock,
            config,
        }
    }

    pub fn config(&self) -> &CooldownConfig {
        &self.config
    }

    /// Reserve a single scope and record the send immediately.
    ///
    /// For PER_RECIPIENT the target is a user in the direct context; for the
    /// group scopes it is the group. Returns `false` without side effects if
    /// `min_interval` has not elapsed since the last send on that key.
    pub async fn try_reserve(
        &self,
        agent: &AgentId,
        target: &TargetId,
        scope: CooldownScope,
        min_interval: Duration,
    ) -> Result<bool, CourierError> {
        let key = match scope {
            CooldownScope::PerRecipient => keys::per_recipient(agent, None, target),
            CooldownScope::PerGroup => keys::per_group(agent, target),
            CooldownScope::GroupGlobal => keys::group_global(target),
        };
        let now = self.clock.now();
        let token = Uuid::new_v4().to_string();
        if !self.acquire(&key, &token, now, min_interval).await? {
            recording::record_cooldown_rejection(&scope.to_string());
            return Ok(false);
        }
        self.settle(&key, &token, Some(now)).await?;
        Ok(true)
    }

    /// Reserve every scope applicable to `ctx`, or none of them.
    pub async fn reserve_all(
        &self,
        ctx: &SendContext,
        intervals: &CooldownIntervals,
    ) -> Result<ReserveOutcome, CourierError> {
        let now = self.clock.now();

        if let Some(until) = self.blackout_until(&ctx.agent).await? {
            recording::record_cooldown_rejection("blackout");
            return Ok(ReserveOutcome::Rejected(RejectReason::Blackout { until }));
        }

        let token = Uuid::new_v4().to_string();
        let rate_key = keys::rate_window(&ctx.agent);
        if !self.take_rate_slot(&rate_key, &token, now).await? {
            recording::record_cooldown_rejection("rate_cap");
            return Ok(ReserveOutcome::Rejected(RejectReason::RateCap));
        }

        let mut taken: Vec<String> = Vec::new();
        for (scope, key) in ctx.scope_keys() {
            let acquired = match self
                .acquire(&key, &token, now, intervals.for_scope(scope))
                .await
            {
                Ok(acquired) => acquired,
                Err(e) => {
                    self.release_all(&taken, &rate_key, &token).await;
                    return Err(e);
                }
            };
            if !acquired {
                debug!(agent_id = %ctx.agent, %scope, key, "cooldown not elapsed");
                recording::record_cooldown_rejection(&scope.to_string());
                self.release_all(&taken, &rate_key, &token).await;
                return Ok(ReserveOutcome::Rejected(RejectReason::Scope(scope)));
            }
            taken.push(key);
        }

        Ok(ReserveOutcome::Reserved(Reservation {
            agent: ctx.agent.clone(),
            reserved_at: now,
            token,
            scope_keys: taken,
            rate_key,
        }))
    }

    /// Turn the holds of a reservation into recorded sends.
    pub async fn commit(&self, reservation: &Reservation) -> Result<(), CourierError> {
        for key in &reservation.scope_keys {
            self.settle(key, &reservation.token, Some(reservation.reserved_at))
                .await?;
        }
        Ok(())
    }

    /// Undo a reservation whose send did not happen.
    ///
    /// Removes only this reservation's holds and its per-minute slot; any
    /// `last_sent_at` written by an earlier send stays.
    pub async fn rollback(&self, reservation: &Reservation) -> Result<(), CourierError> {
        for key in &reservation.scope_keys {
            self.settle(key, &reservation.token, None).await?;
        }
        self.drop_rate_slot(&reservation.rate_key, &reservation.token)
            .await
    }

    /// Best-effort rollback used while already failing.
    async fn release_all(&self, keys: &[String], rate_key: &str, token: &str) {
        for key in keys {
            if let Err(e) = self.settle(key, token, None).await {
                warn!(key = %key, error = %e, "failed to release cooldown hold");
            }
        }
        if let Err(e) = self.drop_rate_slot(rate_key, token).await {
            warn!(key = rate_key, error = %e, "failed to release rate slot");
        }
    }

    /// Last send (or live hold) of `agent` in `group`, used to spread load across agents.
    pub async fn last_group_send(
        &self,
        agent: &AgentId,
        group: &TargetId,
    ) -> Result<Option<DateTime<Utc>>, CourierError> {
        self.last_send(&keys::per_group(agent, group)).await
    }

    /// Last send (or live hold) of `agent` to `user` in the direct context.
    pub async fn last_direct_send(
        &self,
        agent: &AgentId,
        user: &TargetId,
    ) -> Result<Option<DateTime<Utc>>, CourierError> {
        self.last_send(&keys::per_recipient(agent, None, user)).await
    }

    async fn last_send(&self, key: &str) -> Result<Option<DateTime<Utc>>, CourierError> {
        let entry: Option<CooldownEntry> = get_json(self.store.as_ref(), key).await?;
        Ok(entry.and_then(|e| e.effective_last()))
    }

    /// Active blackout end for `agent`, if any.
    pub async fn blackout_until(
        &self,
        agent: &AgentId,
    ) -> Result<Option<DateTime<Utc>>, CourierError> {
        let now = self.clock.now();
        let blackout: Option<Blackout> =
            get_json(self.store.as_ref(), &keys::blackout(agent)).await?;
        Ok(blackout.map(|b| b.until).filter(|until| *until > now))
    }

    /// Remove every cooldown entry `agent` holds in `group`. Returns how many keys were deleted.
    ///
    /// Administrative cleanup; the group-wide key is shared by all agents and is left alone.
    pub async fn clear_agent_group(
        &self,
        agent: &AgentId,
        group: &TargetId,
    ) -> Result<usize, CourierError> {
        let mut doomed = vec![keys::per_group(agent, group)];
        doomed.extend(
            self.store
                .scan_prefix(&keys::per_recipient_group_prefix(agent, group))
                .await?
                .into_iter()
                .map(|(key, _)| key),
        );

        let mut removed = 0;
        for key in doomed {
            let (before, _) = mutate_json::<CooldownEntry, _>(
                self.store.as_ref(),
                &key,
                None,
                |_| Mutation::Delete,
            )
            .await?;
            if before.is_some() {
                removed += 1;
            }
        }
        debug!(agent_id = %agent, group_id = %group, removed, "cleared agent cooldowns");
        Ok(removed)
    }

    /// Place a hold on `key` if `interval` has elapsed since its effective last send.
    async fn acquire(
        &self,
        key: &str,
        token: &str,
        now: DateTime<Utc>,
        interval: Duration,
    ) -> Result<bool, CourierError> {
        let interval = chrono_duration(interval);
        let (_, after) = mutate_json::<CooldownEntry, _>(
            self.store.as_ref(),
            key,
            Some(self.config.hard_ttl()),
            |current| {
                let entry = current.cloned().unwrap_or_default();
                match entry.effective_last() {
                    Some(last) if now < last + interval => Mutation::Keep,
                    _ => Mutation::Put(CooldownEntry {
                        last_sent_at: entry.last_sent_at,
                        hold: Some(Hold {
                            token: token.to_string(),
                            reserved_at: now,
                        }),
                    }),
                }
            },
        )
        .await?;
        Ok(after
            .and_then(|e| e.hold)
            .is_some_and(|h| h.token == token))
    }

    /// Resolve this token's hold on `key`: fold `sent_at` into `last_sent_at`
    /// (commit) or just drop the hold (rollback, `sent_at = None`).
    async fn settle(
        &self,
        key: &str,
        token: &str,
        sent_at: Option<DateTime<Utc>>,
    ) -> Result<(), CourierError> {
        mutate_json::<CooldownEntry, _>(
            self.store.as_ref(),
            key,
            Some(self.config.hard_ttl()),
            |current| {
                let Some(entry) = current else {
                    return match sent_at {
                        Some(at) => Mutation::Put(CooldownEntry {
                            last_sent_at: Some(at),
                            hold: None,
                        }),
                        None => Mutation::Keep,
                    };
                };
                let own_hold = entry.hold.as_ref().is_some_and(|h| h.token == token);
                let last_sent_at = match (entry.last_sent_at, sent_at) {
                    (Some(a), Some(b)) => Some(a.max(b)),
                    (a, b) => a.or(b),
                };
                let next = CooldownEntry {
                    last_sent_at,
                    hold: if own_hold { None } else { entry.hold.clone() },
                };
                if next == *entry {
                    Mutation::Keep
                } else if next.last_sent_at.is_none() && next.hold.is_none() {
                    Mutation::Delete
                } else {
                    Mutation::Put(next)
                }
            },
        )
        .await?;
        Ok(())
    }

    async fn take_rate_slot(
        &self,
        key: &str,
        token: &str,
        now: DateTime<Utc>,
    ) -> Result<bool, CourierError> {
        let cap = self.config.max_sends_per_minute as usize;
        let window_start = now - chrono_duration(RATE_WINDOW);
        let (_, after) = mutate_json::<RateWindow, _>(
            self.store.as_ref(),
            key,
            Some(RATE_WINDOW * 2),
            |current| {
                let mut stamps: Vec<RateStamp> = current
                    .map(|w| w.stamps.clone())
                    .unwrap_or_default()
                    .into_iter()
                    .filter(|s| s.at > window_start)
                    .collect();
                if stamps.len() >= cap {
                    return Mutation::Keep;
                }
                stamps.push(RateStamp {
                    token: token.to_string(),
                    at: now,
                });
                Mutation::Put(RateWindow { stamps })
            },
        )
        .await?;
        Ok(after.is_some_and(|w| w.stamps.iter().any(|s| s.token == token)))
    }

    async fn drop_rate_slot(&self, key: &str, token: &str) -> Result<(), CourierError> {
        mutate_json::<RateWindow, _>(self.store.as_ref(), key, Some(RATE_WINDOW * 2), |current| {
            let Some(window) = current else {
                return Mutation::Keep;
            };
            if !window.stamps.iter().any(|s| s.token == token) {
                return Mutation::Keep;
            }
            let stamps: Vec<RateStamp> = window
                .stamps
                .iter()
                .filter(|s| s.token != token)
                .cloned()
                .collect();
            if stamps.is_empty() {
                Mutation::Delete
            } else {
                Mutation::Put(RateWindow { stamps })
            }
        })
        .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use courier_core::ManualClock;
    use courier_storage::MemoryStateStore;

    fn ledger_with(config: CooldownConfig) -> (Arc<CooldownLedger>, Arc<ManualClock>, Arc<MemoryStateStore>) {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap(),
        ));
        let store = Arc::new(MemoryStateStore::new(clock.clone()));
        let ledger = Arc::new(CooldownLedger::new(store.clone(), clock.clone(), config));
        (ledger, clock, store)
    }

    fn ledger() -> (Arc<CooldownLedger>, Arc<ManualClock>, Arc<MemoryStateStore>) {
        ledger_with(CooldownConfig::default())
    }

    fn intervals(secs: u64) -> CooldownIntervals {
        CooldownIntervals {
            per_recipient: Duration::from_secs(secs),
            per_group: Duration::from_secs(secs),
            group_global: Duration::from_secs(secs),
        }
    }

    #[tokio::test]
    async fn sixty_second_interval_scenario() {
        let (ledger, clock, _) = ledger();
        let a = AgentId::from("A");
        let g = TargetId::from("g");
        let interval = Duration::from_secs(60);

        assert!(ledger.try_reserve(&a, &g, CooldownScope::PerGroup, interval).await.unwrap());
        clock.advance(Duration::from_secs(30));
        assert!(!ledger.try_reserve(&a, &g, CooldownScope::PerGroup, interval).await.unwrap());
        clock.advance(Duration::from_secs(31));
        assert!(ledger.try_reserve(&a, &g, CooldownScope::PerGroup, interval).await.unwrap());
    }

    #[tokio::test]
    async fn reservation_succeeds_exactly_at_interval_boundary() {
        let (ledger, clock, _) = ledger();
        let a = AgentId::from("A");
        let u = TargetId::from("u");
        let interval = Duration::from_secs(120);
        assert!(ledger.try_reserve(&a, &u, CooldownScope::PerRecipient, interval).await.unwrap());
        clock.advance(Duration::from_secs(119));
        assert!(!ledger.try_reserve(&a, &u, CooldownScope::PerRecipient, interval).await.unwrap());
        clock.advance(Duration::from_secs(1));
        assert!(ledger.try_reserve(&a, &u, CooldownScope::PerRecipient, interval).await.unwrap());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_reservations_admit_one() {
        let (ledger, _, _) = ledger();
        let mut handles = Vec::new();
        for _ in 0..24 {
            let ledger = ledger.clone();
            handles.push(tokio::spawn(async move {
                ledger
                    .try_reserve(
                        &AgentId::from("A"),
                        &TargetId::from("g"),
                        CooldownScope::GroupGlobal,
                        Duration::from_secs(60),
                    )
                    .await
                    .unwrap()
            }));
        }
        let mut granted = 0;
        for h in handles {
            if h.await.unwrap() {
                granted += 1;
            }
        }
        assert_eq!(granted, 1);
    }

    #[tokio::test]
    async fn later_scope_rejection_rolls_back_earlier_holds() {
        let (ledger, _, store) = ledger();
        let g = TargetId::from("g");
        let user = TargetId::from("u");

        // Another agent just posted in the group, so GROUP_GLOBAL is hot.
        let other = SendContext::broadcast(AgentId::from("B"), g.clone());
        let ReserveOutcome::Reserved(r) = ledger.reserve_all(&other, &intervals(60)).await.unwrap()
        else {
            panic!("first reservation must pass");
        };
        ledger.commit(&r).await.unwrap();

        let ctx = SendContext::reply(AgentId::from("A"), g.clone(), user.clone());
        let outcome = ledger.reserve_all(&ctx, &intervals(60)).await.unwrap();
        assert_eq!(
            outcome,
            ReserveOutcome::Rejected(RejectReason::Scope(CooldownScope::GroupGlobal))
        );

        // Nothing of A's attempt survives.
        let a = AgentId::from("A");
        assert!(store.get(&keys::per_recipient(&a, Some(&g), &user)).await.unwrap().is_none());
        assert!(store.get(&keys::per_group(&a, &g)).await.unwrap().is_none());
        assert!(store.get(&keys::rate_window(&a)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn hold_blocks_until_rolled_back() {
        let (ledger, _, _) = ledger();
        let ctx = SendContext::broadcast(AgentId::from("A"), TargetId::from("g"));
        let ReserveOutcome::Reserved(first) = ledger.reserve_all(&ctx, &intervals(60)).await.unwrap()
        else {
            panic!("expected reservation");
        };
        assert!(matches!(
            ledger.reserve_all(&ctx, &intervals(60)).await.unwrap(),
            ReserveOutcome::Rejected(RejectReason::Scope(CooldownScope::PerGroup))
        ));
        ledger.rollback(&first).await.unwrap();
        assert!(matches!(
            ledger.reserve_all(&ctx, &intervals(60)).await.unwrap(),
            ReserveOutcome::Reserved(_)
        ));
    }

    #[tokio::test]
    async fn rollback_keeps_committed_last_send() {
        let (ledger, clock, _) = ledger();
        let a = AgentId::from("A");
        let g = TargetId::from("g");
        let ctx = SendContext::broadcast(a.clone(), g.clone());

        let ReserveOutcome::Reserved(first) = ledger.reserve_all(&ctx, &intervals(60)).await.unwrap()
        else {
            panic!("expected reservation");
        };
        ledger.commit(&first).await.unwrap();
        let committed = ledger.last_group_send(&a, &g).await.unwrap();

        clock.advance(Duration::from_secs(61));
        let ReserveOutcome::Reserved(second) = ledger.reserve_all(&ctx, &intervals(60)).await.unwrap()
        else {
            panic!("expected reservation");
        };
        ledger.rollback(&second).await.unwrap();
        assert_eq!(ledger.last_group_send(&a, &g).await.unwrap(), committed);
    }

    #[tokio::test]
    async fn blackout_rejects_every_scope() {
        let (ledger, clock, store) = ledger();
        let a = AgentId::from("A");
        let until = clock.now() + chrono::Duration::seconds(30);
        let raw = serde_json::to_string(&Blackout { until }).unwrap();
        store
            .compare_and_swap(&keys::blackout(&a), None, Some(&raw), Some(Duration::from_secs(30)))
            .await
            .unwrap();

        let ctx = SendContext::direct(a.clone(), TargetId::from("u"));
        assert_eq!(
            ledger.reserve_all(&ctx, &intervals(1)).await.unwrap(),
            ReserveOutcome::Rejected(RejectReason::Blackout { until })
        );
        clock.advance(Duration::from_secs(30));
        assert!(matches!(
            ledger.reserve_all(&ctx, &intervals(1)).await.unwrap(),
            ReserveOutcome::Reserved(_)
        ));
    }

    #[tokio::test]
    async fn per_minute_cap_spans_targets() {
        let config = CooldownConfig {
            max_sends_per_minute: 2,
            ..CooldownConfig::default()
        };
        let (ledger, clock, _) = ledger_with(config);
        let a = AgentId::from("A");
        for user in ["u1", "u2"] {
            let ctx = SendContext::direct(a.clone(), TargetId::from(user));
            assert!(matches!(
                ledger.reserve_all(&ctx, &intervals(1)).await.unwrap(),
                ReserveOutcome::Reserved(_)
            ));
        }
        let third = SendContext::direct(a.clone(), TargetId::from("u3"));
        assert_eq!(
            ledger.reserve_all(&third, &intervals(1)).await.unwrap(),
            ReserveOutcome::Rejected(RejectReason::RateCap)
        );
        clock.advance(Duration::from_secs(61));
        assert!(matches!(
            ledger.reserve_all(&third, &intervals(1)).await.unwrap(),
            ReserveOutcome::Reserved(_)
        ));
    }

    #[test]
    fn per_group_interval_never_below_group_global() {
        let config = CooldownConfig {
            per_group_min_secs: 0,
            agent_group_factor: 0.5,
            ..CooldownConfig::default()
        };
        let derived = CooldownIntervals::derive(&config, Duration::from_secs(90));
        assert_eq!(derived.group_global, Duration::from_secs(90));
        assert!(derived.per_group >= derived.group_global);

        let derived = CooldownIntervals::derive(&CooldownConfig::default(), Duration::from_secs(30));
        assert_eq!(derived.per_group, Duration::from_secs(300));
        let derived = CooldownIntervals::derive(&CooldownConfig::default(), Duration::from_secs(200));
        assert_eq!(derived.per_group, Duration::from_secs(600));
    }

    #[test]
    fn scope_keys_follow_send_context() {
        let a = AgentId::from("A");
        let g = TargetId::from("g");
        let u = TargetId::from("u");
        let scopes = |ctx: SendContext| -> Vec<CooldownScope> {
            ctx.scope_keys().into_iter().map(|(s, _)| s).collect()
        };
        assert_eq!(
            scopes(SendContext::broadcast(a.clone(), g.clone())),
            vec![CooldownScope::PerGroup, CooldownScope::GroupGlobal]
        );
        assert_eq!(scopes(SendContext::reply(a.clone(), g, u.clone())), CooldownScope::ORDER.to_vec());
        assert_eq!(scopes(SendContext::direct(a, u)), vec![CooldownScope::PerRecipient]);
    }

    #[tokio::test]
    async fn clear_agent_group_removes_only_that_agent() {
        let (ledger, _, store) = ledger();
        let g = TargetId::from("g");
        for (agent, user) in [("A", "u1"), ("A", "u2"), ("B", "u1")] {
            let ctx = SendContext::reply(AgentId::from(agent), g.clone(), TargetId::from(user));
            let ReserveOutcome::Reserved(r) = ledger.reserve_all(&ctx, &intervals(0)).await.unwrap()
            else {
                panic!("expected reservation");
            };
            ledger.commit(&r).await.unwrap();
        }
        let removed = ledger.clear_agent_group(&AgentId::from("A"), &g).await.unwrap();
        assert_eq!(removed, 3);
        assert!(ledger
            .last_group_send(&AgentId::from("B"), &g)
            .await
            .unwrap()
            .is_some());
        assert!(store.get(&keys::group_global(&g)).await.unwrap().is_some());
    }
}
