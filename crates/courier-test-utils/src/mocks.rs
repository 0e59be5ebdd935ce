// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock collaborators for deterministic testing.
//!
//! Every mock records what it was asked and answers from state the test
//! sets up beforehand. Accessors are synchronous so assertions read plainly.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use courier_core::traits::PluginAdapter;
use courier_core::{
    AdapterType, AgentId, ContentCategory, ContentGenerator, CourierError, DeliveryOutcome,
    HealthStatus, PlatformProbe, PrioritySignals, ProbeReport, ProfileStore, TargetId, Transport,
};

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|e| e.into_inner())
}

macro_rules! mock_adapter {
    ($ty:ty, $name:literal, $kind:expr) => {
        #[async_trait]
        impl PluginAdapter for $ty {
            fn name(&self) -> &str {
                $name
            }

            fn version(&self) -> semver::Version {
                semver::Version::new(0, 1, 0)
            }

            fn adapter_type(&self) -> AdapterType {
                $kind
            }

            async fn health_check(&self) -> Result<HealthStatus, CourierError> {
                Ok(HealthStatus::Healthy)
            }

            async fn shutdown(&self) -> Result<(), CourierError> {
                Ok(())
            }
        }
    };
}

/// A transport that answers each send from a per-target script.
///
/// Targets without a script (or whose script ran out) answer `Ok`.
/// Contact adds are confirmed unless [`refuse_contact_adds`](Self::refuse_contact_adds) was called.
#[derive(Default)]
pub struct MockTransport {
    scripts: Mutex<HashMap<TargetId, VecDeque<DeliveryOutcome>>>,
    sends: Mutex<Vec<(AgentId, TargetId, String)>>,
    contact_adds: Mutex<Vec<(AgentId, TargetId)>>,
    refuse_adds: Mutex<bool>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue outcomes for the next sends to `target`, in order.
    pub fn script(&self, target: &TargetId, outcomes: Vec<DeliveryOutcome>) {
        lock(&self.scripts)
            .entry(target.clone())
            .or_default()
            .extend(outcomes);
    }

    /// Every send attempted, in call order, with the text sent.
    pub fn sends(&self) -> Vec<(AgentId, TargetId, String)> {
        lock(&self.sends).clone()
    }

    pub fn send_count(&self, target: &TargetId) -> usize {
        lock(&self.sends).iter().filter(|(_, t, _)| t == target).count()
    }

    pub fn contact_adds(&self) -> Vec<(AgentId, TargetId)> {
        lock(&self.contact_adds).clone()
    }

    pub fn refuse_contact_adds(&self) {
        *lock(&self.refuse_adds) = true;
    }
}

mock_adapter!(MockTransport, "mock-transport", AdapterType::Transport);

#[async_trait]
impl Transport for MockTransport {
    async fn send(
        &self,
        agent: &AgentId,
        target: &TargetId,
        text: &str,
    ) -> Result<DeliveryOutcome, CourierError> {
        lock(&self.sends).push((agent.clone(), target.clone(), text.to_string()));
        let scripted = lock(&self.scripts)
            .get_mut(target)
            .and_then(VecDeque::pop_front);
        Ok(scripted.unwrap_or(DeliveryOutcome::Ok))
    }

    async fn add_contact(&self, agent: &AgentId, user: &TargetId) -> Result<bool, CourierError> {
        lock(&self.contact_adds).push((agent.clone(), user.clone()));
        Ok(!*lock(&self.refuse_adds))
    }
}

/// A platform probe with settable answers. Unknown agents are not restricted.
#[derive(Default)]
pub struct MockProbe {
    answers: Mutex<HashMap<AgentId, ProbeReport>>,
    failing: Mutex<HashSet<AgentId>>,
    calls: Mutex<HashMap<AgentId, usize>>,
}

impl MockProbe {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_restricted(&self, agent: &AgentId, restricted: bool, until: Option<DateTime<Utc>>) {
        lock(&self.answers).insert(agent.clone(), ProbeReport { restricted, until });
    }

    /// Make the next probe of `agent` fail.
    pub fn fail_next(&self, agent: &AgentId) {
        lock(&self.failing).insert(agent.clone());
    }

    pub fn calls(&self, agent: &AgentId) -> usize {
        lock(&self.calls).get(agent).copied().unwrap_or(0)
    }
}

mock_adapter!(MockProbe, "mock-probe", AdapterType::Probe);

#[async_trait]
impl PlatformProbe for MockProbe {
    async fn check_restricted(&self, agent: &AgentId) -> Result<ProbeReport, CourierError> {
        *lock(&self.calls).entry(agent.clone()).or_default() += 1;
        if lock(&self.failing).remove(agent) {
            return Err(CourierError::Probe {
                message: format!("probe for {agent} unavailable"),
                source: None,
            });
        }
        Ok(lock(&self.answers)
            .get(agent)
            .cloned()
            .unwrap_or(ProbeReport {
                restricted: false,
                until: None,
            }))
    }
}

/// Content generator producing `"<category> for <target>"`.
#[derive(Default)]
pub struct MockContent {
    failing: Mutex<bool>,
}

impl MockContent {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        *lock(&self.failing) = failing;
    }
}

mock_adapter!(MockContent, "mock-content", AdapterType::Content);

#[async_trait]
impl ContentGenerator for MockContent {
    async fn generate(
        &self,
        target: &TargetId,
        category: ContentCategory,
    ) -> Result<String, CourierError> {
        if *lock(&self.failing) {
            return Err(CourierError::Content {
                message: "generator offline".into(),
                source: None,
            });
        }
        Ok(format!("{category} for {target}"))
    }
}

/// Profile store backed by a map. Targets without an entry return an error.
#[derive(Default)]
pub struct MockProfileStore {
    signals: Mutex<HashMap<TargetId, PrioritySignals>>,
    failing: Mutex<bool>,
}

impl MockProfileStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_signals(&self, target: &TargetId, signals: PrioritySignals) {
        lock(&self.signals).insert(target.clone(), signals);
    }

    pub fn set_failing(&self, failing: bool) {
        *lock(&self.failing) = failing;
    }
}

mock_adapter!(MockProfileStore, "mock-profile", AdapterType::Profile);

#[async_trait]
impl ProfileStore for MockProfileStore {
    async fn get_signals(&self, target: &TargetId) -> Result<PrioritySignals, CourierError> {
        if *lock(&self.failing) {
            return Err(CourierError::Profile {
                message: "profile store offline".into(),
                source: None,
            });
        }
        lock(&self.signals)
            .get(target)
            .cloned()
            .ok_or_else(|| CourierError::Profile {
                message: format!("no profile for {target}"),
                source: None,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn transport_follows_script_then_succeeds() {
        let transport = MockTransport::new();
        let (a, g) = (AgentId::from("a"), TargetId::from("g"));
        transport.script(&g, vec![DeliveryOutcome::RateLimited { retry_after: Duration::from_secs(5) }]);

        assert_eq!(
            transport.send(&a, &g, "hi").await.unwrap(),
            DeliveryOutcome::RateLimited { retry_after: Duration::from_secs(5) }
        );
        assert_eq!(transport.send(&a, &g, "hi").await.unwrap(), DeliveryOutcome::Ok);
        assert_eq!(transport.send_count(&g), 2);
    }

    #[tokio::test]
    async fn probe_failure_is_one_shot() {
        let probe = MockProbe::new();
        let a = AgentId::from("a");
        probe.fail_next(&a);
        assert!(probe.check_restricted(&a).await.is_err());
        assert!(!probe.check_restricted(&a).await.unwrap().restricted);
        assert_eq!(probe.calls(&a), 2);
    }
}
