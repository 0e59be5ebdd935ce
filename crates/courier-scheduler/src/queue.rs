// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Scheduler-local candidate queue.
//!
//! Two heaps with lazy deletion: `waiting` is a min-heap on
//! `earliest_eligible_at`, `ready` is a max-heap on [`Priority`]. Each
//! candidate key maps to its live slot and a generation number; pushing a
//! new version of a key or rescoring it bumps the generation and leaves the
//! old heap entries to be skipped when they surface. Updates cost
//! O(log n) instead of a rebuild, and the heaps are compacted when stale
//! entries outnumber live ones.
//!
//! The queue is an optimization. Duplicate sends are prevented by the
//! cooldown ledger, not by anything here.

use std::cmp::{Ordering, Reverse};
use std::collections::{BinaryHeap, HashMap};

use chrono::{DateTime, Utc};

use courier_core::{AgentId, ContentCategory, Target, TargetId};

use crate::priority::Priority;

/// Slack before stale heap entries trigger a rebuild.
const COMPACT_SLACK: usize = 64;

/// A (possibly agent-pinned) send waiting for its turn.
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduleCandidate {
    pub target: Target,
    /// Pinned agent; `None` lets the scheduler pick the longest-idle agent.
    pub agent_id: Option<AgentId>,
    pub priority: Priority,
    pub earliest_eligible_at: DateTime<Utc>,
    pub category: ContentCategory,
    /// User who addressed the agent inside the group, for replies.
    pub reply_to: Option<TargetId>,
    pub campaign_id: Option<String>,
    /// Candidates past this instant are dropped instead of sent.
    pub expires_at: Option<DateTime<Utc>>,
    /// Transport calls already spent on unclassified failures.
    pub attempt: u32,
    /// Multiplier kept across rescoring; below 1.0 after a demotion.
    pub demotion: f64,
}

impl ScheduleCandidate {
    /// An unpinned broadcast to a group.
    pub fn broadcast(target: Target, priority: Priority, at: DateTime<Utc>) -> Self {
        Self {
            target,
            agent_id: None,
            priority,
            earliest_eligible_at: at,
            category: ContentCategory::Broadcast,
            reply_to: None,
            campaign_id: None,
            expires_at: None,
            attempt: 0,
            demotion: 1.0,
        }
    }

    /// A reply from `agent` to `user` inside `group`.
    pub fn reply(
        group: Target,
        user: TargetId,
        agent: AgentId,
        priority: Priority,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            agent_id: Some(agent),
            category: ContentCategory::Reply,
            reply_to: Some(user),
            ..Self::broadcast(group, priority, at)
        }
    }

    /// A direct message to a user, optionally from a specific agent.
    pub fn direct(
        user: Target,
        agent: Option<AgentId>,
        priority: Priority,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            agent_id: agent,
            category: ContentCategory::Direct,
            ..Self::broadcast(user, priority, at)
        }
    }

    pub fn key(&self) -> CandidateKey {
        CandidateKey {
            target: self.target.id.clone(),
            agent: self.agent_id.clone(),
            reply_to: self.reply_to.clone(),
            campaign_id: self.campaign_id.clone(),
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|end| end <= now)
    }

    /// Lower this candidate's priority by `factor` and delay it to `until`.
    pub fn demote(&mut self, factor: f64, until: DateTime<Utc>) {
        self.demotion *= factor;
        self.priority.score *= factor;
        self.earliest_eligible_at = until;
    }
}

/// Identity of a candidate in the queue. Pushing an equal key supersedes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CandidateKey {
    pub target: TargetId,
    pub agent: Option<AgentId>,
    pub reply_to: Option<TargetId>,
    pub campaign_id: Option<String>,
}

#[derive(Debug)]
struct Slot {
    candidate: ScheduleCandidate,
    generation: u64,
}

#[derive(Debug, PartialEq, Eq)]
struct ReadyEntry {
    priority: Priority,
    seq: u64,
    key: CandidateKey,
    generation: u64,
}

impl Ord for ReadyEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        self.priority
            .cmp(&other.priority)
            // Earlier insertion wins among equals.
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

impl PartialOrd for ReadyEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

type WaitingEntry = Reverse<(DateTime<Utc>, u64, CandidateKey, u64)>;

#[derive(Debug, Default)]
pub struct CandidateQueue {
    slots: HashMap<CandidateKey, Slot>,
    waiting: BinaryHeap<WaitingEntry>,
    ready: BinaryHeap<ReadyEntry>,
    next_seq: u64,
}

impl CandidateQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a candidate, replacing any queued candidate with the same key.
    pub fn push(&mut self, candidate: ScheduleCandidate) {
        let key = candidate.key();
        let generation = self.bump();
        let eligible = candidate.earliest_eligible_at;
        self.slots.insert(
            key.clone(),
            Slot {
                candidate,
                generation,
            },
        );
        let seq = self.bump();
        self.waiting
            .push(Reverse((eligible, seq, key, generation)));
        self.maybe_compact();
    }

    /// Remove and return the best candidate eligible at `now`.
    pub fn pop_ready(&mut self, now: DateTime<Utc>) -> Option<ScheduleCandidate> {
        self.promote(now);
        while let Some(entry) = self.ready.pop() {
            if self.is_live(&entry.key, entry.generation) {
                return self.slots.remove(&entry.key).map(|slot| slot.candidate);
            }
        }
        None
    }

    /// Refresh the target data and priority of every queued candidate for
    /// `target_data.id`. Returns how many changed.
    pub fn rescore_target(&mut self, target_data: &Target, priority: Priority) -> usize {
        let target = &target_data.id;
        let keys: Vec<CandidateKey> = self
            .slots
            .keys()
            .filter(|k| &k.target == target)
            .cloned()
            .collect();
        let mut changed = 0;
        for key in keys {
            let Some(slot) = self.slots.get(&key) else {
                continue;
            };
            let fresh =
                Priority::new(priority.score * slot.candidate.demotion, priority.refreshed_at);
            if slot.candidate.priority == fresh && slot.candidate.target == *target_data {
                continue;
            }
            let mut candidate = slot.candidate.clone();
            candidate.priority = fresh;
            candidate.target = target_data.clone();
            self.push(candidate);
            changed += 1;
        }
        changed
    }

    pub fn remove(&mut self, key: &CandidateKey) -> Option<ScheduleCandidate> {
        self.slots.remove(key).map(|slot| slot.candidate)
    }

    pub fn contains(&self, key: &CandidateKey) -> bool {
        self.slots.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Earliest time any queued candidate becomes eligible.
    pub fn next_eligible_at(&self) -> Option<DateTime<Utc>> {
        self.slots
            .values()
            .map(|s| s.candidate.earliest_eligible_at)
            .min()
    }

    /// Distinct targets with queued candidates.
    pub fn targets(&self) -> Vec<TargetId> {
        let mut targets: Vec<TargetId> = self.slots.keys().map(|k| k.target.clone()).collect();
        targets.sort();
        targets.dedup();
        targets
    }

    fn promote(&mut self, now: DateTime<Utc>) {
        while let Some(Reverse((eligible, _, _, _))) = self.waiting.peek() {
            if *eligible > now {
                break;
            }
            let Some(Reverse((_, _, key, generation))) = self.waiting.pop() else {
                break;
            };
            if let Some(slot) = self.slots.get(&key)
                && slot.generation == generation
            {
                let priority = slot.candidate.priority;
                let seq = self.bump();
                self.ready.push(ReadyEntry {
                    priority,
                    seq,
                    key,
                    generation,
                });
            }
        }
    }

    fn is_live(&self, key: &CandidateKey, generation: u64) -> bool {
        self.slots
            .get(key)
            .is_some_and(|slot| slot.generation == generation)
    }

    fn bump(&mut self) -> u64 {
        self.next_seq += 1;
        self.next_seq
    }

    fn maybe_compact(&mut self) {
        let heap_entries = self.waiting.len() + self.ready.len();
        if heap_entries <= 2 * self.slots.len() + COMPACT_SLACK {
            return;
        }
        let slots = &self.slots;
        self.waiting
            .retain(|Reverse((_, _, key, generation))| {
                slots.get(key).is_some_and(|s| s.generation == *generation)
            });
        self.ready
            .retain(|entry| slots.get(&entry.key).is_some_and(|s| s.generation == entry.generation));
    }
}
