// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Common types used across adapter traits and the Courier scheduler.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Stable identifier of an authenticated sending identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AgentId(pub String);

/// Identifier of a group or an individual user.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TargetId(pub String);

impl AgentId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TargetId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for TargetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AgentId {
    fn from(s: &str) -> Self {
        AgentId(s.to_string())
    }
}

impl From<&str> for TargetId {
    fn from(s: &str) -> Self {
        TargetId(s.to_string())
    }
}

/// Health status reported by adapter health checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthStatus {
    /// Adapter is fully operational.
    Healthy,
    /// Adapter is operational but experiencing issues.
    Degraded(String),
    /// Adapter is not operational.
    Unhealthy(String),
}

/// Identifies the kind of collaborator behind an adapter.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
pub enum AdapterType {
    Transport,
    Probe,
    Content,
    Profile,
    StateStore,
}

/// Whether a target is a group or an individual user.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
pub enum TargetKind {
    Group,
    User,
}

/// Broadcast capability of an agent as last observed.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
pub enum SpamState {
    Clean,
    Restricted,
    Unknown,
}

/// Ordinal activity level of a target as reported by the profile store.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    Display,
    EnumString,
    Serialize,
    Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ActivityLevel {
    Dead,
    Low,
    Medium,
    High,
    VeryHigh,
    #[default]
    Unknown,
}

/// Snapshot of profile-store signals used for priority scoring.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrioritySignals {
    /// Historical response rate in [0, 1].
    pub response_rate: f64,
    pub activity_level: ActivityLevel,
    /// How saturated the target is with recent messages, in [0, 1].
    pub fatigue_score: f64,
    /// How tolerant the target is of automated messages, in [0, 1].
    pub spam_tolerance: f64,
    /// Member count (groups only).
    pub member_count: Option<u64>,
    /// When the profile store produced this snapshot.
    pub refreshed_at: DateTime<Utc>,
}

/// A group or user reachable by agents.
#[derive(Debug, Clone, PartialEq)]
pub struct Target {
    pub id: TargetId,
    pub kind: TargetKind,
    pub signals: Option<PrioritySignals>,
}

impl Target {
    pub fn group(id: &str) -> Self {
        Self {
            id: TargetId::from(id),
            kind: TargetKind::Group,
            signals: None,
        }
    }

    pub fn user(id: &str) -> Self {
        Self {
            id: TargetId::from(id),
            kind: TargetKind::User,
            signals: None,
        }
    }

    pub fn with_signals(mut self, signals: PrioritySignals) -> Self {
        self.signals = Some(signals);
        self
    }

    pub fn is_group(&self) -> bool {
        self.kind == TargetKind::Group
    }
}

/// Result of a single transport send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// The platform accepted the message.
    Ok,
    /// The platform asked the agent to wait before sending again.
    RateLimited { retry_after: Duration },
    /// The platform refused to let the agent post here.
    Forbidden,
    /// Any failure the transport could not classify.
    Other { message: String },
}

impl DeliveryOutcome {
    /// Short label used in logs and metrics.
    pub fn label(&self) -> &'static str {
        match self {
            DeliveryOutcome::Ok => "ok",
            DeliveryOutcome::RateLimited { .. } => "rate_limited",
            DeliveryOutcome::Forbidden => "forbidden",
            DeliveryOutcome::Other { .. } => "other",
        }
    }
}

/// Answer from the platform probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeReport {
    pub restricted: bool,
    pub until: Option<DateTime<Utc>>,
}

/// Persisted restriction state of one agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentRecord {
    pub agent_id: AgentId,
    pub spam_state: SpamState,
    pub restricted_until: Option<DateTime<Utc>>,
    pub last_probe_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl AgentRecord {
    pub fn unknown(agent_id: AgentId, now: DateTime<Utc>) -> Self {
        Self {
            agent_id,
            spam_state: SpamState::Unknown,
            restricted_until: None,
            last_probe_at: None,
            updated_at: now,
        }
    }
}

/// Lifecycle of a contact-add handshake.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
pub enum ContactStatus {
    Pending,
    Added,
    DmStarted,
    Expired,
}

impl ContactStatus {
    /// Pending and Added requests are still waiting for progress and may expire.
    pub fn is_open(self) -> bool {
        matches!(self, ContactStatus::Pending | ContactStatus::Added)
    }

    /// Forward-only transitions: Pending -> Added -> DmStarted, open -> Expired.
    ///
    /// An inbound DM may arrive before the add is confirmed, so Pending may
    /// jump straight to DmStarted.
    pub fn can_transition_to(self, next: ContactStatus) -> bool {
        use ContactStatus::*;
        matches!(
            (self, next),
            (Pending, Added) | (Pending, DmStarted) | (Added, DmStarted) | (Pending, Expired) | (Added, Expired)
        )
    }
}

/// A redirected in-group reply waiting on a contact-add handshake.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingContactRequest {
    pub id: String,
    pub user_id: TargetId,
    pub agent_id: AgentId,
    pub group_id: TargetId,
    pub requested_at: DateTime<Utc>,
    /// Last status change; the retention window runs from here.
    pub updated_at: DateTime<Utc>,
    pub status: ContactStatus,
}

/// Granularity of a cooldown entry.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
pub enum CooldownScope {
    /// Keyed by (agent, user) inside a group or direct context.
    PerRecipient,
    /// Keyed by (agent, group).
    PerGroup,
    /// Keyed by group alone; last send by any agent.
    GroupGlobal,
}

impl CooldownScope {
    /// Fixed reservation order.
    pub const ORDER: [CooldownScope; 3] = [
        CooldownScope::PerRecipient,
        CooldownScope::PerGroup,
        CooldownScope::GroupGlobal,
    ];
}

/// What kind of message the content generator should produce.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ContentCategory {
    /// Unprompted message posted to a group.
    Broadcast,
    /// Answer to a user who addressed the agent in a group.
    Reply,
    /// Direct message to a user.
    Direct,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn contact_status_forward_transitions() {
        use ContactStatus::*;
        assert!(Pending.can_transition_to(Added));
        assert!(Added.can_transition_to(DmStarted));
        assert!(Pending.can_transition_to(DmStarted));
        assert!(Added.can_transition_to(Expired));
        assert!(!Added.can_transition_to(Pending));
        assert!(!DmStarted.can_transition_to(Expired));
        assert!(!Expired.can_transition_to(Added));
    }

    #[test]
    fn open_statuses() {
        assert!(ContactStatus::Pending.is_open());
        assert!(ContactStatus::Added.is_open());
        assert!(!ContactStatus::DmStarted.is_open());
        assert!(!ContactStatus::Expired.is_open());
    }

    #[test]
    fn activity_level_parses_snake_case() {
        assert_eq!(
            ActivityLevel::from_str("very_high").unwrap(),
            ActivityLevel::VeryHigh
        );
        assert_eq!(ActivityLevel::Dead.to_string(), "dead");
        let json = serde_json::to_string(&ActivityLevel::VeryHigh).unwrap();
        assert_eq!(json, "\"very_high\"");
    }

    #[test]
    fn cooldown_scope_order_is_recipient_group_global() {
        assert_eq!(
            CooldownScope::ORDER,
            [
                CooldownScope::PerRecipient,
                CooldownScope::PerGroup,
                CooldownScope::GroupGlobal
            ]
        );
        assert_eq!(CooldownScope::GroupGlobal.to_string(), "group_global");
    }

    #[test]
    fn agent_record_round_trips_through_json() {
        let now = Utc::now();
        let record = AgentRecord::unknown(AgentId::from("agent-a"), now);
        let json = serde_json::to_string(&record).unwrap();
        let parsed: AgentRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, record);
        assert_eq!(parsed.spam_state, SpamState::Unknown);
    }

    #[test]
    fn outcome_labels() {
        assert_eq!(DeliveryOutcome::Ok.label(), "ok");
        assert_eq!(
            DeliveryOutcome::RateLimited {
                retry_after: Duration::from_secs(30)
            }
            .label(),
            "rate_limited"
        );
        assert_eq!(DeliveryOutcome::Forbidden.label(), "forbidden");
    }
}
