// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Background task that re-probes agents on schedule.
//!
//! Every `probe_tick` the runner asks the [`SpamStateTracker`] which agents
//! are due and refreshes them. A failed probe is logged and retried on the
//! next tick; it never changes an agent's state.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use courier_core::CourierError;

use crate::spam_state::SpamStateTracker;

pub struct ProbeRunner {
    tracker: Arc<SpamStateTracker>,
    tick: Duration,
}

impl ProbeRunner {
    pub fn new(tracker: Arc<SpamStateTracker>, tick: Duration) -> Self {
        Self { tracker, tick }
    }

    /// Refresh every due agent once. Returns how many probes succeeded.
    pub async fn run_once(&self) -> Result<usize, CourierError> {
        let mut refreshed = 0;
        for agent in self.tracker.agents().await? {
            if !self.tracker.is_due(&agent).await? {
                continue;
            }
            match self.tracker.refresh(&agent).await {
                Ok(state) => {
                    debug!(agent_id = %agent, %state, "agent re-probed");
                    refreshed += 1;
                }
                Err(e) if e.is_store_failure() => return Err(e),
                Err(_) => {}
            }
        }
        Ok(refreshed)
    }

    /// Run until `cancel` fires.
    pub fn spawn(self, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(self.tick);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = interval.tick() => {
                        if let Err(e) = self.run_once().await {
                            warn!(error = %e, "probe pass failed (non-fatal)");
                        }
                    }
                    _ = cancel.cancelled() => {
                        info!("probe runner shutting down");
                        break;
                    }
                }
            }
        })
    }
}
