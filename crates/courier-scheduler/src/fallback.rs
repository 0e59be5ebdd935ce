// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Contact fallback for restricted agents.
//!
//! When a user addresses an agent inside a group the agent can no longer
//! post in, the reply is converted into a contact-add handshake tracked as
//! a [`PendingContactRequest`] under `contact:{agent}:{user}`.
//!
//! Lifecycle: PENDING -> ADDED -> DM_STARTED, or PENDING/ADDED -> EXPIRED
//! once the retention window passes with no progress. Expired requests are
//! purged by the same sweep that expires them.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};
use uuid::Uuid;

use courier_config::model::ContactConfig;
use courier_core::clock::chrono_duration;
use courier_core::traits::{Mutation, get_json, mutate_json};
use courier_core::{
    AgentId, Clock, ContactStatus, CourierError, PendingContactRequest, StateStore, TargetId,
    Transport,
};

use crate::keys;
use crate::recording;

/// Result of one cleanup sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    /// Open requests that ran out of time during this sweep.
    pub expired: usize,
    /// Records deleted from the store.
    pub purged: usize,
}

enum Advance {
    Apply,
    Unchanged,
    Missing,
    Invalid(ContactStatus),
}

pub struct ContactFallbackCoordinator {
    store: Arc<dyn StateStore>,
    transport: Arc<dyn Transport>,
    clock: Arc<dyn Clock>,
    config: ContactConfig,
    call_timeout: std::time::Duration,
}

impl ContactFallbackCoordinator {
    pub fn new(
        store: Arc<dyn StateStore>,
        transport: Arc<dyn Transport>,
        clock: Arc<dyn Clock>,
        config: ContactConfig,
        call_timeout: std::time::Duration,
    ) -> Self {
        Self {
            store,
            transport,
            clock,
            config,
            call_timeout,
        }
    }

    /// An open request that outlived the retention window counts as expired
    /// even before a sweep has marked it.
    fn is_live(&self, request: &PendingContactRequest, now: DateTime<Utc>) -> bool {
        match request.status {
            ContactStatus::Expired => false,
            ContactStatus::DmStarted => true,
            _ => request.updated_at + chrono_duration(self.config.retention()) > now,
        }
    }

    /// Create a PENDING request for `(user, agent)`, or return the live one.
    ///
    /// Repeated redirects for the same pair while a request is live return
    /// the same request, so the user is never told twice.
    pub async fn redirect(
        &self,
        user: &TargetId,
        agent: &AgentId,
        group: &TargetId,
    ) -> Result<PendingContactRequest, CourierError> {
        let now = self.clock.now();
        let fresh = PendingContactRequest {
            id: Uuid::new_v4().to_string(),
            user_id: user.clone(),
            agent_id: agent.clone(),
            group_id: group.clone(),
            requested_at: now,
            updated_at: now,
            status: ContactStatus::Pending,
        };

        let (before, after) = mutate_json::<PendingContactRequest, _>(
            self.store.as_ref(),
            &keys::contact(agent, user),
            Some(self.config.record_ttl()),
            |current| match current {
                Some(existing) if self.is_live(existing, now) => Mutation::Keep,
                _ => Mutation::Put(fresh.clone()),
            },
        )
        .await?;

        let request = after.unwrap_or(fresh);
        if before.as_ref().map(|b| &b.id) == Some(&request.id) {
            debug!(user_id = %user, agent_id = %agent, request_id = %request.id, "contact request already open");
        } else {
            info!(
                user_id = %user,
                agent_id = %agent,
                group_id = %group,
                request_id = %request.id,
                "redirected reply to contact handshake"
            );
            recording::record_contact_status(ContactStatus::Pending);
        }
        Ok(request)
    }

    /// Move the request for `(user, agent)` forward to `new_status`.
    ///
    /// Advancing to the current status is a no-op. Backward moves, moves out
    /// of a terminal status, and moves on a request past retention fail with
    /// [`CourierError::InvalidTransition`].
    pub async fn advance(
        &self,
        user: &TargetId,
        agent: &AgentId,
        new_status: ContactStatus,
    ) -> Result<PendingContactRequest, CourierError> {
        let now = self.clock.now();
        let mut verdict = Advance::Missing;
        let (_, after) = mutate_json::<PendingContactRequest, _>(
            self.store.as_ref(),
            &keys::contact(agent, user),
            Some(self.config.record_ttl()),
            |current| {
                let Some(existing) = current else {
                    verdict = Advance::Missing;
                    return Mutation::Keep;
                };
                let status = if self.is_live(existing, now) {
                    existing.status
                } else {
                    ContactStatus::Expired
                };
                if status == new_status {
                    verdict = Advance::Unchanged;
                    return Mutation::Keep;
                }
                if !status.can_transition_to(new_status) {
                    verdict = Advance::Invalid(status);
                    return Mutation::Keep;
                }
                verdict = Advance::Apply;
                let mut next = existing.clone();
                next.status = new_status;
                next.updated_at = now;
                Mutation::Put(next)
            },
        )
        .await?;

        match (verdict, after) {
            (Advance::Apply, Some(request)) => {
                info!(
                    user_id = %user,
                    agent_id = %agent,
                    status = %new_status,
                    "contact request advanced"
                );
                recording::record_contact_status(new_status);
                Ok(request)
            }
            (Advance::Unchanged, Some(request)) => Ok(request),
            (Advance::Invalid(from), _) => Err(CourierError::InvalidTransition {
                from: from.to_string(),
                to: new_status.to_string(),
            }),
            _ => Err(CourierError::ContactNotFound {
                user_id: user.to_string(),
                agent_id: agent.to_string(),
            }),
        }
    }

    /// Redirect, then ask the transport to add the user as a contact.
    ///
    /// A confirmed add advances the request to ADDED. A refused, failed or
    /// timed-out add leaves it PENDING for the sweep to expire.
    pub async fn handshake(
        &self,
        user: &TargetId,
        agent: &AgentId,
        group: &TargetId,
    ) -> Result<PendingContactRequest, CourierError> {
        let request = self.redirect(user, agent, group).await?;
        if request.status != ContactStatus::Pending {
            return Ok(request);
        }

        match tokio::time::timeout(self.call_timeout, self.transport.add_contact(agent, user)).await
        {
            Ok(Ok(true)) => self.advance(user, agent, ContactStatus::Added).await,
            Ok(Ok(false)) => {
                debug!(user_id = %user, agent_id = %agent, "contact add not confirmed yet");
                Ok(request)
            }
            Ok(Err(e)) => {
                warn!(user_id = %user, agent_id = %agent, error = %e, "contact add failed");
                Ok(request)
            }
            Err(_) => {
                warn!(user_id = %user, agent_id = %agent, "contact add timed out");
                Ok(request)
            }
        }
    }

    /// First inbound direct message from `user` to `agent`.
    ///
    /// Returns `None` when there is no open request for the pair.
    pub async fn record_inbound_dm(
        &self,
        user: &TargetId,
        agent: &AgentId,
    ) -> Result<Option<PendingContactRequest>, CourierError> {
        match self.advance(user, agent, ContactStatus::DmStarted).await {
            Ok(request) => Ok(Some(request)),
            Err(CourierError::ContactNotFound { .. }) | Err(CourierError::InvalidTransition { .. }) => {
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    pub async fn get(
        &self,
        user: &TargetId,
        agent: &AgentId,
    ) -> Result<Option<PendingContactRequest>, CourierError> {
        get_json(self.store.as_ref(), &keys::contact(agent, user)).await
    }

    /// Number of PENDING or ADDED requests still inside their retention window.
    pub async fn open_count(&self) -> Result<usize, CourierError> {
        let now = self.clock.now();
        Ok(self
            .all()
            .await?
            .iter()
            .filter(|r| r.status.is_open() && self.is_live(r, now))
            .count())
    }

    async fn all(&self) -> Result<Vec<PendingContactRequest>, CourierError> {
        let rows = self.store.scan_prefix(keys::CONTACT_PREFIX).await?;
        Ok(rows
            .into_iter()
            .filter_map(|(key, raw)| match serde_json::from_str(&raw) {
                Ok(request) => Some(request),
                Err(e) => {
                    warn!(key = %key, error = %e, "skipping unreadable contact record");
                    None
                }
            })
            .collect())
    }

    /// Expire open requests past retention and purge every expired record.
    pub async fn sweep(&self) -> Result<SweepReport, CourierError> {
        let now = self.clock.now();
        let mut report = SweepReport::default();

        for request in self.all().await? {
            let key = keys::contact(&request.agent_id, &request.user_id);
            let mut expired_here = false;
            let (before, _) = mutate_json::<PendingContactRequest, _>(
                self.store.as_ref(),
                &key,
                None,
                |current| match current {
                    Some(r) if r.status == ContactStatus::Expired => {
                        expired_here = false;
                        Mutation::Delete
                    }
                    Some(r) if r.status.is_open() && !self.is_live(r, now) => {
                        expired_here = true;
                        Mutation::Delete
                    }
                    _ => {
                        expired_here = false;
                        Mutation::Keep
                    }
                },
            )
            .await?;

            let Some(before) = before else {
                continue;
            };
            if expired_here {
                report.expired += 1;
                recording::record_contact_status(ContactStatus::Expired);
                info!(
                    user_id = %before.user_id,
                    agent_id = %before.agent_id,
                    request_id = %before.id,
                    "contact request expired"
                );
            }
            if expired_here || before.status == ContactStatus::Expired {
                report.purged += 1;
            }
        }

        if report.purged > 0 {
            debug!(expired = report.expired, purged = report.purged, "contact sweep done");
        }
        Ok(report)
    }
}
