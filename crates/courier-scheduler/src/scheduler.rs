// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The delivery control loop.
//!
//! Each tick pops up to `dispatches_per_tick` eligible candidates, picks an
//! agent, gates the attempt through the restriction tracker and the
//! cooldown ledger, and hands reserved sends to a bounded pool of dispatch
//! tasks. Outcomes are fed back from the dispatch task itself, so the loop
//! never waits on a transport call.
//!
//! The loop fails closed: while the state store is unhealthy, or after any
//! store error, no candidate is popped until a health check passes again.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::{DashMap, DashSet};
use tokio::sync::{Mutex, Notify, OwnedSemaphorePermit, RwLock, Semaphore};
use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, info, warn};

use courier_config::model::CourierConfig;
use courier_core::clock::chrono_duration;
use courier_core::{
    AgentId, AgentRecord, Clock, ContentGenerator, CourierError, DeliveryOutcome, HealthStatus,
    PendingContactRequest, PlatformProbe, ProfileStore, SpamState, StateStore, Target, TargetId,
    Transport,
};

use crate::campaign::{Campaign, CampaignPlanner};
use crate::cooldown::{
    CooldownIntervals, CooldownLedger, RejectReason, Reservation, ReserveOutcome, SendContext,
};
use crate::fallback::{ContactFallbackCoordinator, SweepReport};
use crate::interval::AdaptiveIntervalCalculator;
use crate::priority::TargetPriorityScorer;
use crate::probe_runner::ProbeRunner;
use crate::queue::{CandidateKey, CandidateQueue, ScheduleCandidate};
use crate::recording;
use crate::shutdown;
use crate::spam_state::SpamStateTracker;

/// External services the scheduler drives.
pub struct Collaborators {
    pub transport: Arc<dyn Transport>,
    pub probe: Arc<dyn PlatformProbe>,
    pub content: Arc<dyn ContentGenerator>,
    pub profile: Arc<dyn ProfileStore>,
    pub store: Arc<dyn StateStore>,
}

/// What one tick did with the candidates it popped.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    pub popped: usize,
    /// Reserved and handed to a dispatch task.
    pub dispatched: usize,
    pub rescheduled: usize,
    /// Replies converted into a contact handshake.
    pub redirected: usize,
    pub dropped: usize,
    pub halted: bool,
}

/// Periodic health snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HealthReport {
    pub queue_depth: usize,
    pub in_flight: usize,
    pub halted: bool,
    pub restricted_agents: usize,
    pub pending_contacts: usize,
}

enum Step {
    Dispatched,
    Rescheduled,
    Redirected,
    Dropped,
}

impl TickReport {
    fn count(&mut self, step: Step) {
        match step {
            Step::Dispatched => self.dispatched += 1,
            Step::Rescheduled => self.rescheduled += 1,
            Step::Redirected => self.redirected += 1,
            Step::Dropped => self.dropped += 1,
        }
    }
}

/// `now + d`, saturating at the end of representable time.
fn later(now: DateTime<Utc>, d: Duration) -> DateTime<Utc> {
    now.checked_add_signed(chrono_duration(d))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

fn send_context(candidate: &ScheduleCandidate, agent: &AgentId) -> SendContext {
    let target = &candidate.target;
    match &candidate.reply_to {
        Some(user) if target.is_group() => {
            SendContext::reply(agent.clone(), target.id.clone(), user.clone())
        }
        _ if target.is_group() => SendContext::broadcast(agent.clone(), target.id.clone()),
        _ => SendContext::direct(agent.clone(), target.id.clone()),
    }
}

struct Inner {
    config: CourierConfig,
    clock: Arc<dyn Clock>,
    transport: Arc<dyn Transport>,
    content: Arc<dyn ContentGenerator>,
    profile: Arc<dyn ProfileStore>,
    store: Arc<dyn StateStore>,
    tracker: Arc<SpamStateTracker>,
    ledger: CooldownLedger,
    intervals: AdaptiveIntervalCalculator,
    scorer: TargetPriorityScorer,
    planner: CampaignPlanner,
    fallback: ContactFallbackCoordinator,
    queue: Mutex<CandidateQueue>,
    agents: RwLock<BTreeSet<AgentId>>,
    targets: DashMap<TargetId, Target>,
    in_flight: DashSet<(AgentId, TargetId)>,
    workers: Arc<Semaphore>,
    tasks: Mutex<JoinSet<()>>,
    idle: Notify,
    halted: AtomicBool,
}

/// Marks an (agent, target) pair busy and holds a worker slot until dropped.
struct InFlight {
    inner: Arc<Inner>,
    pair: (AgentId, TargetId),
    permit: Option<OwnedSemaphorePermit>,
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.permit.take();
        self.inner.in_flight.remove(&self.pair);
        if self.inner.in_flight.is_empty() {
            self.inner.idle.notify_waiters();
        }
    }
}

impl Inner {
    async fn requeue(&self, mut candidate: ScheduleCandidate, at: DateTime<Utc>) {
        candidate.earliest_eligible_at = at;
        let mut queue = self.queue.lock().await;
        queue.push(candidate);
        recording::set_queue_depth(queue.len());
    }

    fn halt(&self, cause: &CourierError) {
        if !self.halted.swap(true, Ordering::SeqCst) {
            error!(error = %cause, "state store failure, halting dispatch");
        }
    }

    /// Keep the stored profile data for a target unless `target` brings fresher signals.
    fn remember(&self, target: Target) -> Target {
        match self.targets.entry(target.id.clone()) {
            Entry::Occupied(mut known) => {
                if target.signals.is_some() {
                    known.insert(target.clone());
                    target
                } else {
                    known.get().clone()
                }
            }
            Entry::Vacant(slot) => {
                slot.insert(target.clone());
                target
            }
        }
    }

    /// Longest-idle eligible agent for `target`, ties broken by agent id.
    ///
    /// Agents already sending to the target or sitting out a rate-limit
    /// blackout are skipped. Restricted agents are skipped for groups only.
    async fn select_agent(&self, target: &Target) -> Result<Option<AgentId>, CourierError> {
        let agents: Vec<AgentId> = self.agents.read().await.iter().cloned().collect();
        let mut best: Option<(Option<DateTime<Utc>>, AgentId)> = None;
        for agent in agents {
            if self.in_flight.contains(&(agent.clone(), target.id.clone())) {
                continue;
            }
            if self.ledger.blackout_until(&agent).await?.is_some() {
                continue;
            }
            let last = if target.is_group() {
                if self.tracker.get_state(&agent).await? == SpamState::Restricted {
                    continue;
                }
                self.ledger.last_group_send(&agent, &target.id).await?
            } else {
                self.ledger.last_direct_send(&agent, &target.id).await?
            };
            if best.as_ref().is_none_or(|(idle_since, _)| last < *idle_since) {
                best = Some((last, agent));
            }
        }
        Ok(best.map(|(_, agent)| agent))
    }

    /// Give back a reservation whose send did not happen.
    async fn abandon(&self, reservation: &Reservation) {
        if let Err(e) = self.ledger.rollback(reservation).await {
            if e.is_store_failure() {
                self.halt(&e);
            }
            warn!(agent_id = %reservation.agent, error = %e, "cooldown rollback failed");
        }
    }

    async fn dispatch(&self, candidate: ScheduleCandidate, agent: AgentId, reservation: Reservation) {
        let target_id = candidate.target.id.clone();
        let timeout = self.config.scheduler.dispatch_timeout();

        let generated =
            tokio::time::timeout(timeout, self.content.generate(&target_id, candidate.category))
                .await;
        let text = match generated {
            Ok(Ok(text)) => text,
            Ok(Err(e)) => {
                warn!(agent_id = %agent, target_id = %target_id, error = %e, "content generation failed, requeueing");
                self.abandon(&reservation).await;
                let at = later(self.clock.now(), self.config.scheduler.collaborator_retry());
                self.requeue(candidate, at).await;
                return;
            }
            Err(_) => {
                warn!(agent_id = %agent, target_id = %target_id, ?timeout, "content generation timed out, requeueing");
                self.abandon(&reservation).await;
                let at = later(self.clock.now(), self.config.scheduler.collaborator_retry());
                self.requeue(candidate, at).await;
                return;
            }
        };

        let started = Instant::now();
        let outcome =
            match tokio::time::timeout(timeout, self.transport.send(&agent, &target_id, &text))
                .await
            {
                Ok(Ok(outcome)) => outcome,
                Ok(Err(e)) => DeliveryOutcome::Other {
                    message: e.to_string(),
                },
                Err(_) => DeliveryOutcome::Other {
                    message: format!("send timed out after {timeout:?}"),
                },
            };
        recording::record_dispatch_latency(started.elapsed().as_secs_f64());
        recording::record_dispatch(outcome.label());

        if outcome == DeliveryOutcome::Ok {
            if let Err(e) = self.ledger.commit(&reservation).await {
                self.halt(&e);
            }
        } else {
            self.abandon(&reservation).await;
        }
        if let Err(e) = self.tracker.record_outcome(&agent, &outcome).await {
            if e.is_store_failure() {
                self.halt(&e);
            }
            warn!(agent_id = %agent, error = %e, "failed to record send outcome");
        }

        let now = self.clock.now();
        match outcome {
            DeliveryOutcome::Ok => {
                info!(
                    agent_id = %agent,
                    target_id = %target_id,
                    category = %candidate.category,
                    "message delivered"
                );
            }
            DeliveryOutcome::RateLimited { retry_after } => {
                info!(agent_id = %agent, target_id = %target_id, ?retry_after, "rate limited, requeueing after blackout");
                self.requeue(candidate, later(now, retry_after)).await;
            }
            DeliveryOutcome::Forbidden if candidate.target.is_group() => {
                warn!(agent_id = %agent, target_id = %target_id, "agent forbidden in group, marked restricted");
                self.requeue(candidate, now).await;
            }
            DeliveryOutcome::Forbidden => {
                self.retry_or_drop(candidate, &agent, "forbidden", now).await;
            }
            DeliveryOutcome::Other { message } => {
                self.retry_or_drop(candidate, &agent, &message, now).await;
            }
        }
    }

    /// Requeue with exponential backoff, or drop once attempts are spent.
    async fn retry_or_drop(
        &self,
        mut candidate: ScheduleCandidate,
        agent: &AgentId,
        reason: &str,
        now: DateTime<Utc>,
    ) {
        candidate.attempt += 1;
        let max_attempts = self.config.scheduler.max_attempts;
        if candidate.attempt >= max_attempts {
            warn!(
                agent_id = %agent,
                target_id = %candidate.target.id,
                attempt = candidate.attempt,
                reason,
                "dropping candidate after repeated send failures"
            );
            return;
        }
        let backoff = self
            .config
            .scheduler
            .retry_backoff()
            .saturating_mul(2u32.saturating_pow(candidate.attempt - 1));
        debug!(
            agent_id = %agent,
            target_id = %candidate.target.id,
            attempt = candidate.attempt,
            ?backoff,
            reason,
            "send failed, retrying"
        );
        self.requeue(candidate, later(now, backoff)).await;
    }
}

/// Handle to the scheduler. Cheap to clone; clones share all state.
#[derive(Clone)]
pub struct DeliveryScheduler {
    inner: Arc<Inner>,
}

impl DeliveryScheduler {
    pub fn new(config: CourierConfig, collaborators: Collaborators, clock: Arc<dyn Clock>) -> Self {
        let Collaborators {
            transport,
            probe,
            content,
            profile,
            store,
        } = collaborators;

        let tracker = Arc::new(SpamStateTracker::new(
            store.clone(),
            probe,
            clock.clone(),
            config.spam.clone(),
        ));
        let ledger = CooldownLedger::new(store.clone(), clock.clone(), config.cooldown.clone());
        let intervals = AdaptiveIntervalCalculator::new(config.interval.clone(), clock.clone());
        let scorer = TargetPriorityScorer::new(config.scoring.clone());
        let planner = CampaignPlanner::new(scorer.clone());
        let fallback = ContactFallbackCoordinator::new(
            store.clone(),
            transport.clone(),
            clock.clone(),
            config.contact.clone(),
            config.scheduler.dispatch_timeout(),
        );
        let workers = Arc::new(Semaphore::new(config.scheduler.max_workers));

        Self {
            inner: Arc::new(Inner {
                config,
                clock,
                transport,
                content,
                profile,
                store,
                tracker,
                ledger,
                intervals,
                scorer,
                planner,
                fallback,
                queue: Mutex::new(CandidateQueue::new()),
                agents: RwLock::new(BTreeSet::new()),
                targets: DashMap::new(),
                in_flight: DashSet::new(),
                workers,
                tasks: Mutex::new(JoinSet::new()),
                idle: Notify::new(),
                halted: AtomicBool::new(false),
            }),
        }
    }

    pub fn config(&self) -> &CourierConfig {
        &self.inner.config
    }

    pub fn tracker(&self) -> &Arc<SpamStateTracker> {
        &self.inner.tracker
    }

    pub fn ledger(&self) -> &CooldownLedger {
        &self.inner.ledger
    }

    pub fn intervals(&self) -> &AdaptiveIntervalCalculator {
        &self.inner.intervals
    }

    pub fn fallback(&self) -> &ContactFallbackCoordinator {
        &self.inner.fallback
    }

    /// Add an agent to the selection pool. New agents start UNKNOWN.
    pub async fn register_agent(&self, agent: &AgentId) -> Result<AgentRecord, CourierError> {
        let record = self.inner.tracker.register(agent).await?;
        self.inner.agents.write().await.insert(agent.clone());
        info!(agent_id = %agent, state = %record.spam_state, "agent registered");
        Ok(record)
    }

    pub async fn agents(&self) -> Vec<AgentId> {
        self.inner.agents.read().await.iter().cloned().collect()
    }

    /// Make `target` known to profile rescans without queueing anything.
    pub fn add_target(&self, target: Target) {
        self.inner.remember(target);
    }

    pub async fn enqueue(&self, candidate: ScheduleCandidate) -> CandidateKey {
        self.inner.remember(candidate.target.clone());
        let key = candidate.key();
        let mut queue = self.inner.queue.lock().await;
        queue.push(candidate);
        recording::set_queue_depth(queue.len());
        key
    }

    /// Queue an unpinned broadcast to `group`, eligible now.
    pub async fn enqueue_broadcast(&self, group: Target) -> CandidateKey {
        let group = self.inner.remember(group);
        let priority = self.inner.scorer.priority(&group);
        let now = self.inner.clock.now();
        self.enqueue(ScheduleCandidate::broadcast(group, priority, now))
            .await
    }

    /// Queue a reply from `agent` to `user`, who addressed it inside `group`.
    pub async fn enqueue_reply(&self, group: Target, user: TargetId, agent: AgentId) -> CandidateKey {
        let group = self.inner.remember(group);
        let priority = self.inner.scorer.priority(&group);
        let now = self.inner.clock.now();
        self.enqueue(ScheduleCandidate::reply(group, user, agent, priority, now))
            .await
    }

    pub async fn enqueue_direct(&self, user: Target, agent: Option<AgentId>) -> CandidateKey {
        let user = self.inner.remember(user);
        let priority = self.inner.scorer.priority(&user);
        let now = self.inner.clock.now();
        self.enqueue(ScheduleCandidate::direct(user, agent, priority, now))
            .await
    }

    /// Plan and queue a campaign. Returns how many candidates were queued.
    pub async fn submit_campaign(&self, campaign: &Campaign) -> usize {
        let resolved = Campaign {
            targets: campaign
                .targets
                .iter()
                .cloned()
                .map(|t| self.inner.remember(t))
                .collect(),
            ..campaign.clone()
        };
        let planned = self.inner.planner.plan(&resolved, self.inner.clock.now());
        let count = planned.len();
        let mut queue = self.inner.queue.lock().await;
        for candidate in planned {
            queue.push(candidate);
        }
        recording::set_queue_depth(queue.len());
        info!(campaign_id = %campaign.id, planned = count, "campaign submitted");
        count
    }

    /// Feed one organic (non-agent) message into the interval calculator.
    pub fn observe_organic(&self, target: &TargetId, at: DateTime<Utc>) {
        self.inner.intervals.observe_organic(target, at);
    }

    pub async fn record_inbound_dm(
        &self,
        user: &TargetId,
        agent: &AgentId,
    ) -> Result<Option<PendingContactRequest>, CourierError> {
        self.inner.fallback.record_inbound_dm(user, agent).await
    }

    pub async fn is_queued(&self, key: &CandidateKey) -> bool {
        self.inner.queue.lock().await.contains(key)
    }

    pub async fn queue_depth(&self) -> usize {
        self.inner.queue.lock().await.len()
    }

    pub fn in_flight(&self) -> usize {
        self.inner.in_flight.len()
    }

    pub fn is_halted(&self) -> bool {
        self.inner.halted.load(Ordering::SeqCst)
    }

    /// Resolves once no dispatch is in flight.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.inner.idle.notified();
            if self.inner.in_flight.is_empty() {
                return;
            }
            notified.await;
        }
    }

    async fn reap(&self) {
        let mut tasks = self.inner.tasks.lock().await;
        while let Some(joined) = tasks.try_join_next() {
            if let Err(e) = joined {
                error!(error = %e, "dispatch task failed");
            }
        }
    }

    /// Health-check the store and update the halt flag. Returns `true` if dispatch may run.
    async fn store_ready(&self) -> bool {
        let healthy = match self.inner.store.health_check().await {
            Ok(HealthStatus::Healthy) | Ok(HealthStatus::Degraded(_)) => true,
            Ok(HealthStatus::Unhealthy(reason)) => {
                debug!(reason = %reason, "state store unhealthy");
                false
            }
            Err(e) => {
                debug!(error = %e, "state store health check failed");
                false
            }
        };
        let was_halted = self.inner.halted.swap(!healthy, Ordering::SeqCst);
        match (was_halted, healthy) {
            (true, true) => info!("state store recovered, resuming dispatch"),
            (false, false) => error!("state store unavailable, halting dispatch"),
            _ => {}
        }
        healthy
    }

    /// Run one scheduling pass.
    pub async fn tick(&self) -> Result<TickReport, CourierError> {
        let mut report = TickReport::default();
        self.reap().await;

        if !self.store_ready().await {
            report.halted = true;
            return Ok(report);
        }

        for _ in 0..self.inner.config.scheduler.dispatches_per_tick {
            let Ok(permit) = self.inner.workers.clone().try_acquire_owned() else {
                debug!("worker pool saturated");
                break;
            };
            let now = self.inner.clock.now();
            let Some(candidate) = self.inner.queue.lock().await.pop_ready(now) else {
                break;
            };
            report.popped += 1;

            let retained = candidate.clone();
            match self.process(candidate, permit, now).await {
                Ok(step) => report.count(step),
                Err(e) if e.is_store_failure() => {
                    self.inner.halt(&e);
                    self.inner.requeue(retained, now).await;
                    report.halted = true;
                    break;
                }
                Err(e) => {
                    warn!(target_id = %retained.target.id, error = %e, "candidate evaluation failed, requeueing");
                    let at = later(now, self.inner.config.scheduler.collaborator_retry());
                    self.inner.requeue(retained, at).await;
                    report.rescheduled += 1;
                }
            }
        }

        recording::set_queue_depth(self.queue_depth().await);
        Ok(report)
    }

    async fn process(
        &self,
        candidate: ScheduleCandidate,
        permit: OwnedSemaphorePermit,
        now: DateTime<Utc>,
    ) -> Result<Step, CourierError> {
        let inner = &self.inner;
        if candidate.is_expired(now) {
            info!(
                target_id = %candidate.target.id,
                campaign_id = candidate.campaign_id.as_deref().unwrap_or(""),
                "dropping candidate past its campaign window"
            );
            return Ok(Step::Dropped);
        }

        let agent = match &candidate.agent_id {
            Some(agent) => {
                if candidate.target.is_group()
                    && inner.tracker.get_state(agent).await? == SpamState::Restricted
                {
                    return self.divert(candidate, now).await;
                }
                agent.clone()
            }
            None => match inner.select_agent(&candidate.target).await? {
                Some(agent) => agent,
                None => {
                    debug!(target_id = %candidate.target.id, "no eligible agent");
                    let at = later(now, inner.config.scheduler.restricted_requeue());
                    inner.requeue(candidate, at).await;
                    return Ok(Step::Rescheduled);
                }
            },
        };

        let pair = (agent.clone(), candidate.target.id.clone());
        if !inner.in_flight.insert(pair.clone()) {
            let at = later(now, inner.config.scheduler.tick_interval());
            inner.requeue(candidate, at).await;
            return Ok(Step::Rescheduled);
        }
        let guard = InFlight {
            inner: Arc::clone(inner),
            pair,
            permit: Some(permit),
        };

        let group_interval = inner.intervals.required_interval(&candidate.target.id);
        let cooldowns = CooldownIntervals::derive(&inner.config.cooldown, group_interval);
        let ctx = send_context(&candidate, &agent);
        let reservation = match inner.ledger.reserve_all(&ctx, &cooldowns).await? {
            ReserveOutcome::Reserved(reservation) => reservation,
            ReserveOutcome::Rejected(reason) => {
                let at = match reason {
                    RejectReason::Blackout { until } => until,
                    _ => later(now, group_interval),
                };
                debug!(
                    agent_id = %agent,
                    target_id = %candidate.target.id,
                    reason = reason.label(),
                    "not eligible yet, rescheduling"
                );
                inner.requeue(candidate, at).await;
                return Ok(Step::Rescheduled);
            }
        };

        let task_inner = Arc::clone(inner);
        inner.tasks.lock().await.spawn(
            async move {
                let _guard = guard;
                task_inner.dispatch(candidate, agent, reservation).await;
            }
            .instrument(tracing::Span::current()),
        );
        Ok(Step::Dispatched)
    }

    /// Route a candidate whose pinned agent is restricted in its group.
    ///
    /// Replies become a contact handshake and leave the queue. Anything else
    /// is demoted and retried later, when the agent may have recovered.
    async fn divert(&self, mut candidate: ScheduleCandidate, now: DateTime<Utc>) -> Result<Step, CourierError> {
        let inner = &self.inner;
        if let (Some(user), Some(agent)) = (&candidate.reply_to, &candidate.agent_id) {
            let request = inner
                .fallback
                .handshake(user, agent, &candidate.target.id)
                .await?;
            info!(
                agent_id = %agent,
                user_id = %user,
                group_id = %candidate.target.id,
                status = %request.status,
                "reply redirected to contact fallback"
            );
            return Ok(Step::Redirected);
        }

        let until = later(now, inner.config.scheduler.restricted_requeue());
        candidate.demote(inner.config.scheduler.restricted_priority_factor, until);
        debug!(
            target_id = %candidate.target.id,
            score = candidate.priority.score,
            "pinned agent restricted, demoting"
        );
        inner.requeue(candidate, until).await;
        Ok(Step::Rescheduled)
    }

    /// Pull fresh signals for every known target and rescore queued candidates.
    ///
    /// A failed lookup keeps the previous snapshot. Returns how many targets refreshed.
    pub async fn rescan_profiles(&self) -> usize {
        let inner = &self.inner;
        let timeout = inner.config.scheduler.dispatch_timeout();
        let ids: Vec<TargetId> = inner.targets.iter().map(|e| e.key().clone()).collect();
        let mut refreshed = 0;
        for id in ids {
            let signals = match tokio::time::timeout(timeout, inner.profile.get_signals(&id)).await {
                Ok(Ok(signals)) => signals,
                Ok(Err(e)) => {
                    warn!(target_id = %id, error = %e, "profile refresh failed, keeping previous snapshot");
                    continue;
                }
                Err(_) => {
                    warn!(target_id = %id, ?timeout, "profile refresh timed out, keeping previous snapshot");
                    continue;
                }
            };
            let updated = match inner.targets.get_mut(&id) {
                Some(mut target) => {
                    target.signals = Some(signals);
                    target.clone()
                }
                None => continue,
            };
            let priority = inner.scorer.priority(&updated);
            inner.queue.lock().await.rescore_target(&updated, priority);
            refreshed += 1;
        }
        refreshed
    }

    pub async fn sweep_contacts(&self) -> Result<SweepReport, CourierError> {
        self.inner.fallback.sweep().await
    }

    pub async fn report(&self) -> Result<HealthReport, CourierError> {
        Ok(HealthReport {
            queue_depth: self.queue_depth().await,
            in_flight: self.in_flight(),
            halted: self.is_halted(),
            restricted_agents: self.inner.tracker.restricted_count().await?,
            pending_contacts: self.inner.fallback.open_count().await?,
        })
    }

    /// Drive every background duty until `cancel` fires, then drain dispatches.
    pub async fn run(&self, cancel: CancellationToken) -> Result<(), CourierError> {
        let config = &self.inner.config;
        let probes = ProbeRunner::new(self.inner.tracker.clone(), config.spam.probe_tick())
            .spawn(cancel.child_token());

        let mut ticker = tokio::time::interval(config.scheduler.tick_interval());
        let mut rescan = tokio::time::interval(config.scoring.rescan_interval());
        let mut sweep = tokio::time::interval(config.contact.sweep_interval());
        let mut health = tokio::time::interval(config.scheduler.report_interval());
        for interval in [&mut ticker, &mut rescan, &mut sweep, &mut health] {
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        }

        let agents = self.inner.agents.read().await.len();
        info!(
            workers = config.scheduler.max_workers,
            agents,
            "delivery scheduler started"
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match self.tick().await {
                        Ok(report) if report.popped > 0 => debug!(?report, "tick"),
                        Ok(_) => {}
                        Err(e) => warn!(error = %e, "tick failed (non-fatal)"),
                    }
                }
                _ = rescan.tick() => {
                    let refreshed = self.rescan_profiles().await;
                    let pruned = self.inner.intervals.prune_stale();
                    debug!(refreshed, pruned, "profile rescan done");
                }
                _ = sweep.tick() => {
                    if let Err(e) = self.sweep_contacts().await {
                        warn!(error = %e, "contact sweep failed (non-fatal)");
                    }
                }
                _ = health.tick() => {
                    match self.report().await {
                        Ok(r) => info!(
                            queue_depth = r.queue_depth,
                            in_flight = r.in_flight,
                            halted = r.halted,
                            restricted_agents = r.restricted_agents,
                            pending_contacts = r.pending_contacts,
                            "scheduler health"
                        ),
                        Err(e) => warn!(error = %e, "health report failed"),
                    }
                }
                _ = cancel.cancelled() => {
                    info!("delivery scheduler shutting down");
                    break;
                }
            }
        }

        shutdown::drain_dispatches(self, config.scheduler.dispatch_timeout()).await;
        if let Err(e) = probes.await {
            warn!(error = %e, "probe runner task failed");
        }
        info!("delivery scheduler stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use courier_core::{ContentCategory, ContactStatus};
    use courier_test_utils::TestHarness;

    fn scheduler(h: &TestHarness) -> DeliveryScheduler {
        DeliveryScheduler::new(
            h.config.clone(),
            Collaborators {
                transport: h.transport.clone(),
                probe: h.probe.clone(),
                content: h.content.clone(),
                profile: h.profile.clone(),
                store: h.store.clone(),
            },
            h.clock.clone(),
        )
    }

    async fn tick_and_settle(s: &DeliveryScheduler) -> TickReport {
        let report = s.tick().await.unwrap();
        s.wait_idle().await;
        report
    }

    #[tokio::test]
    async fn dispatches_and_commits_cooldown() {
        let h = TestHarness::new();
        let s = scheduler(&h);
        let a = AgentId::from("a1");
        s.register_agent(&a).await.unwrap();
        s.enqueue_broadcast(Target::group("g1")).await;

        let report = tick_and_settle(&s).await;
        assert_eq!(report.dispatched, 1);
        assert_eq!(h.transport.send_count(&TargetId::from("g1")), 1);
        assert_eq!(
            s.ledger().last_group_send(&a, &TargetId::from("g1")).await.unwrap(),
            Some(h.clock.now())
        );
        assert_eq!(s.tracker().get_state(&a).await.unwrap(), SpamState::Clean);
    }

    #[tokio::test]
    async fn picks_longest_idle_agent() {
        let h = TestHarness::new();
        let s = scheduler(&h);
        let (a, b) = (AgentId::from("a1"), AgentId::from("a2"));
        s.register_agent(&a).await.unwrap();
        s.register_agent(&b).await.unwrap();

        s.enqueue_broadcast(Target::group("g1")).await;
        tick_and_settle(&s).await;
        // Past every cooldown; a1 sent most recently so a2 is preferred.
        h.clock.advance(Duration::from_secs(3 * 3600));
        s.enqueue_broadcast(Target::group("g1")).await;
        tick_and_settle(&s).await;

        let senders: Vec<AgentId> = h.transport.sends().into_iter().map(|(agent, _, _)| agent).collect();
        assert_eq!(senders, vec![a, b]);
    }

    #[tokio::test]
    async fn cooldown_rejection_pushes_candidate_out() {
        let h = TestHarness::new();
        let s = scheduler(&h);
        s.register_agent(&AgentId::from("a1")).await.unwrap();
        s.enqueue_broadcast(Target::group("g1")).await;
        tick_and_settle(&s).await;

        let key = s.enqueue_broadcast(Target::group("g1")).await;
        let report = tick_and_settle(&s).await;
        assert_eq!(report.rescheduled, 1);
        assert!(s.is_queued(&key).await);
        assert_eq!(h.transport.send_count(&TargetId::from("g1")), 1);
    }

    #[tokio::test]
    async fn restricted_pinned_reply_goes_to_fallback() {
        let h = TestHarness::new();
        let s = scheduler(&h);
        let a = AgentId::from("a1");
        s.register_agent(&a).await.unwrap();
        s.tracker().record_outcome(&a, &DeliveryOutcome::Forbidden).await.unwrap();

        let user = TargetId::from("u1");
        let key = s.enqueue_reply(Target::group("g1"), user.clone(), a.clone()).await;
        let report = tick_and_settle(&s).await;

        assert_eq!(report.redirected, 1);
        assert!(!s.is_queued(&key).await);
        assert_eq!(h.transport.send_count(&TargetId::from("g1")), 0);
        let request = s.fallback().get(&user, &a).await.unwrap().unwrap();
        assert_eq!(request.status, ContactStatus::Added);
    }

    #[tokio::test]
    async fn restricted_pinned_broadcast_is_demoted() {
        let h = TestHarness::new();
        let s = scheduler(&h);
        let a = AgentId::from("a1");
        s.register_agent(&a).await.unwrap();
        s.tracker().record_outcome(&a, &DeliveryOutcome::Forbidden).await.unwrap();

        let now = h.clock.now();
        let candidate = ScheduleCandidate {
            agent_id: Some(a.clone()),
            ..ScheduleCandidate::broadcast(Target::group("g1"), crate::Priority::new(80.0, None), now)
        };
        let key = s.enqueue(candidate).await;
        let report = tick_and_settle(&s).await;

        assert_eq!(report.rescheduled, 1);
        assert!(s.is_queued(&key).await);
        assert_eq!(s.fallback().open_count().await.unwrap(), 0);
        // Not eligible again before the requeue delay.
        assert_eq!(tick_and_settle(&s).await.popped, 0);
    }

    #[tokio::test]
    async fn restricted_agent_still_sends_direct() {
        let h = TestHarness::new();
        let s = scheduler(&h);
        let a = AgentId::from("a1");
        s.register_agent(&a).await.unwrap();
        s.tracker().record_outcome(&a, &DeliveryOutcome::Forbidden).await.unwrap();

        s.enqueue_direct(Target::user("u1"), None).await;
        assert_eq!(tick_and_settle(&s).await.dispatched, 1);
        assert_eq!(h.transport.send_count(&TargetId::from("u1")), 1);
    }

    #[tokio::test]
    async fn content_failure_rolls_back_and_requeues() {
        let h = TestHarness::new();
        let s = scheduler(&h);
        let a = AgentId::from("a1");
        s.register_agent(&a).await.unwrap();
        h.content.set_failing(true);

        let key = s.enqueue_broadcast(Target::group("g1")).await;
        tick_and_settle(&s).await;
        assert!(s.is_queued(&key).await);
        assert_eq!(h.transport.send_count(&TargetId::from("g1")), 0);
        assert_eq!(
            s.ledger().last_group_send(&a, &TargetId::from("g1")).await.unwrap(),
            None
        );

        h.content.set_failing(false);
        h.clock.advance(Duration::from_secs(60));
        assert_eq!(tick_and_settle(&s).await.dispatched, 1);
    }

    #[tokio::test]
    async fn rate_limit_blacks_out_agent() {
        let h = TestHarness::new();
        let s = scheduler(&h);
        let a = AgentId::from("a1");
        s.register_agent(&a).await.unwrap();
        h.transport.script(
            &TargetId::from("g1"),
            vec![DeliveryOutcome::RateLimited {
                retry_after: Duration::from_secs(120),
            }],
        );

        let key = s.enqueue_broadcast(Target::group("g1")).await;
        tick_and_settle(&s).await;
        assert!(s.is_queued(&key).await);
        assert!(s.ledger().blackout_until(&a).await.unwrap().is_some());
        assert_eq!(s.tracker().get_state(&a).await.unwrap(), SpamState::Unknown);

        h.clock.advance(Duration::from_secs(121));
        assert_eq!(tick_and_settle(&s).await.dispatched, 1);
        assert_eq!(h.transport.send_count(&TargetId::from("g1")), 2);
    }

    #[tokio::test]
    async fn halts_while_store_unavailable() {
        let h = TestHarness::new();
        let s = scheduler(&h);
        s.register_agent(&AgentId::from("a1")).await.unwrap();
        s.enqueue_broadcast(Target::group("g1")).await;

        h.store.set_available(false);
        let report = tick_and_settle(&s).await;
        assert!(report.halted);
        assert!(s.is_halted());
        assert_eq!(report.popped, 0);

        h.store.set_available(true);
        let report = tick_and_settle(&s).await;
        assert!(!s.is_halted());
        assert_eq!(report.dispatched, 1);
    }

    #[tokio::test]
    async fn expired_campaign_candidates_are_dropped() {
        let h = TestHarness::new();
        let s = scheduler(&h);
        s.register_agent(&AgentId::from("a1")).await.unwrap();
        let now = h.clock.now();
        let planned = s
            .submit_campaign(&Campaign {
                id: "c1".into(),
                category: ContentCategory::Broadcast,
                targets: vec![Target::group("g1"), Target::group("g2")],
                starts_at: now,
                ends_at: Some(now + chrono::Duration::minutes(5)),
            })
            .await;
        assert_eq!(planned, 2);

        h.clock.advance(Duration::from_secs(600));
        let report = tick_and_settle(&s).await;
        assert_eq!(report.dropped, 1);
        assert_eq!(h.transport.sends().len(), 0);
    }

    #[tokio::test]
    async fn rescan_applies_profile_signals() {
        let h = TestHarness::new();
        let s = scheduler(&h);
        s.register_agent(&AgentId::from("a1")).await.unwrap();
        s.enqueue_broadcast(Target::group("cold")).await;
        s.enqueue_broadcast(Target::group("hot")).await;
        h.profile.set_signals(&TargetId::from("hot"), TestHarness::hot_signals(h.clock.now()));

        // "cold" has no profile entry and keeps its neutral score.
        assert_eq!(s.rescan_profiles().await, 1);
        tick_and_settle(&s).await;
        assert_eq!(h.transport.sends()[0].1, TargetId::from("hot"));
    }

    #[tokio::test]
    async fn health_report_counts() {
        let h = TestHarness::new();
        let s = scheduler(&h);
        let a = AgentId::from("a1");
        s.register_agent(&a).await.unwrap();
        s.tracker().record_outcome(&a, &DeliveryOutcome::Forbidden).await.unwrap();
        h.transport.refuse_contact_adds();
        s.enqueue_reply(Target::group("g1"), TargetId::from("u1"), a.clone()).await;
        s.enqueue_broadcast(Target::group("g2")).await;
        tick_and_settle(&s).await;

        let report = s.report().await.unwrap();
        assert_eq!(report.restricted_agents, 1);
        assert_eq!(report.pending_contacts, 1);
        assert_eq!(report.in_flight, 0);
        assert!(!report.halted);
    }
}
