// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Adaptive multi-agent delivery scheduler.
//!
//! The [`DeliveryScheduler`] pulls the best eligible (agent, target)
//! candidate each tick, gates it through the [`SpamStateTracker`] and the
//! [`CooldownLedger`], and dispatches through the transport on a bounded
//! worker pool. Shared state lives in the injected state store so several
//! scheduler processes can run against one store.

pub mod campaign;
pub mod cooldown;
pub mod fallback;
pub mod interval;
pub mod keys;
pub mod priority;
pub mod probe_runner;
pub mod queue;
pub mod recording;
pub mod scheduler;
pub mod shutdown;
pub mod spam_state;

pub use campaign::{Campaign, CampaignPlanner};
pub use cooldown::{CooldownIntervals, CooldownLedger, RejectReason, Reservation, ReserveOutcome, SendContext};
pub use fallback::{ContactFallbackCoordinator, SweepReport};
pub use interval::AdaptiveIntervalCalculator;
pub use priority::{Priority, TargetPriorityScorer};
pub use probe_runner::ProbeRunner;
pub use queue::{CandidateKey, CandidateQueue, ScheduleCandidate};
pub use scheduler::{Collaborators, DeliveryScheduler, HealthReport, TickReport};
pub use spam_state::SpamStateTracker;
