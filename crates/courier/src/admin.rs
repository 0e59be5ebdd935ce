// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `courier status` and `courier sweep` command implementations.
//!
//! Both commands work directly on the configured SQLite state store. They
//! read and clean up restriction records and contact requests; nothing is
//! ever sent, so the platform-facing collaborators are stubbed with
//! [`Offline`].

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use tracing::info;

use courier_config::model::CourierConfig;
use courier_core::traits::PluginAdapter;
use courier_core::{
    AdapterType, AgentId, AgentRecord, Clock, CourierError, DeliveryOutcome, HealthStatus,
    PlatformProbe, ProbeReport, SystemClock, TargetId, Transport,
};
use courier_scheduler::{ContactFallbackCoordinator, SpamStateTracker, SweepReport};
use courier_storage::SqliteStateStore;

/// Stand-in for the transport and the probe in admin commands. Every call fails.
pub struct Offline;

#[async_trait]
impl PluginAdapter for Offline {
    fn name(&self) -> &str {
        "offline"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Transport
    }

    async fn health_check(&self) -> Result<HealthStatus, CourierError> {
        Ok(HealthStatus::Degraded("no platform connection in admin mode".into()))
    }

    async fn shutdown(&self) -> Result<(), CourierError> {
        Ok(())
    }
}

fn offline_error(what: &str) -> CourierError {
    CourierError::Transport {
        message: format!("{what} is unavailable in admin mode"),
        source: None,
    }
}

#[async_trait]
impl Transport for Offline {
    async fn send(
        &self,
        _agent: &AgentId,
        _target: &TargetId,
        _text: &str,
    ) -> Result<DeliveryOutcome, CourierError> {
        Err(offline_error("send"))
    }

    async fn add_contact(&self, _agent: &AgentId, _user: &TargetId) -> Result<bool, CourierError> {
        Err(offline_error("add_contact"))
    }
}

#[async_trait]
impl PlatformProbe for Offline {
    async fn check_restricted(&self, _agent: &AgentId) -> Result<ProbeReport, CourierError> {
        Err(CourierError::Probe {
            message: "probe is unavailable in admin mode".into(),
            source: None,
        })
    }
}

/// Structured output of `courier status`.
#[derive(Debug, Serialize)]
pub struct StatusReport {
    pub agents: Vec<AgentRecord>,
    pub restricted_agents: usize,
    pub open_contacts: usize,
}

/// Read-only views over a state store.
pub struct Admin {
    store: Arc<SqliteStateStore>,
    tracker: SpamStateTracker,
    fallback: ContactFallbackCoordinator,
}

impl Admin {
    pub fn new(store: Arc<SqliteStateStore>, clock: Arc<dyn Clock>, config: &CourierConfig) -> Self {
        let offline = Arc::new(Offline);
        Self {
            tracker: SpamStateTracker::new(
                store.clone(),
                offline.clone(),
                clock.clone(),
                config.spam.clone(),
            ),
            fallback: ContactFallbackCoordinator::new(
                store.clone(),
                offline,
                clock,
                config.contact.clone(),
                config.scheduler.dispatch_timeout(),
            ),
            store,
        }
    }

    pub async fn open(config: &CourierConfig) -> Result<Self, CourierError> {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let store = Arc::new(SqliteStateStore::open(&config.storage, clock.clone()).await?);
        Ok(Self::new(store, clock, config))
    }

    pub async fn status(&self) -> Result<StatusReport, CourierError> {
        let mut agents = Vec::new();
        for agent in self.tracker.agents().await? {
            agents.push(self.tracker.record(&agent).await?);
        }
        agents.sort_by(|a, b| a.agent_id.cmp(&b.agent_id));
        Ok(StatusReport {
            restricted_agents: self.tracker.restricted_count().await?,
            open_contacts: self.fallback.open_count().await?,
            agents,
        })
    }

    /// Expire stale contact requests, then drop every row past its TTL.
    pub async fn sweep(&self) -> Result<(SweepReport, usize), CourierError> {
        let contacts = self.fallback.sweep().await?;
        let purged = self.store.purge_expired().await?;
        Ok((contacts, purged))
    }
}

pub async fn run_status(config: &CourierConfig, json: bool) -> Result<(), CourierError> {
    let report = Admin::open(config).await?.status().await?;

    if json {
        let out = serde_json::to_string_pretty(&report)
            .map_err(|e| CourierError::Internal(format!("failed to encode status: {e}")))?;
        println!("{out}");
        return Ok(());
    }

    println!("agents:            {}", report.agents.len());
    println!("restricted agents: {}", report.restricted_agents);
    println!("open contacts:     {}", report.open_contacts);
    for record in &report.agents {
        let until = record
            .restricted_until
            .map(|t| format!(" until {}", t.to_rfc3339()))
            .unwrap_or_default();
        println!("  {:<24} {}{}", record.agent_id.as_str(), record.spam_state, until);
    }
    Ok(())
}

pub async fn run_sweep(config: &CourierConfig) -> Result<(), CourierError> {
    let (contacts, purged) = Admin::open(config).await?.sweep().await?;
    info!(
        expired = contacts.expired,
        purged_contacts = contacts.purged,
        purged_rows = purged,
        "sweep complete"
    );
    println!(
        "expired {} contact request(s), purged {} contact record(s) and {} expired row(s)",
        contacts.expired, contacts.purged, purged
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use courier_core::{ManualClock, SpamState};
    use std::time::Duration;

    async fn admin_at(dir: &tempfile::TempDir) -> (Admin, Arc<ManualClock>, CourierConfig) {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap(),
        ));
        let mut config = CourierConfig::default();
        config.storage.database_path = dir.path().join("state.db").to_string_lossy().into_owned();
        let store = Arc::new(
            SqliteStateStore::open(&config.storage, clock.clone())
                .await
                .unwrap(),
        );
        (Admin::new(store, clock.clone(), &config), clock, config)
    }

    #[tokio::test]
    async fn status_lists_agents_and_contacts() {
        let dir = tempfile::tempdir().unwrap();
        let (admin, _clock, _) = admin_at(&dir).await;
        let (a, b) = (AgentId::from("a1"), AgentId::from("a2"));
        admin.tracker.register(&a).await.unwrap();
        admin.tracker.register(&b).await.unwrap();
        admin.tracker.record_outcome(&b, &DeliveryOutcome::Forbidden).await.unwrap();
        admin
            .fallback
            .redirect(&TargetId::from("u1"), &b, &TargetId::from("g1"))
            .await
            .unwrap();

        let report = admin.status().await.unwrap();
        assert_eq!(report.agents.len(), 2);
        assert_eq!(report.agents[1].spam_state, SpamState::Restricted);
        assert_eq!(report.restricted_agents, 1);
        assert_eq!(report.open_contacts, 1);
    }

    #[tokio::test]
    async fn sweep_clears_stale_contacts() {
        let dir = tempfile::tempdir().unwrap();
        let (admin, clock, _) = admin_at(&dir).await;
        admin
            .fallback
            .redirect(&TargetId::from("u1"), &AgentId::from("a1"), &TargetId::from("g1"))
            .await
            .unwrap();

        clock.advance(Duration::from_secs(24 * 3600 + 1));
        let (contacts, _) = admin.sweep().await.unwrap();
        assert_eq!(contacts.expired, 1);
        assert_eq!(admin.status().await.unwrap().open_contacts, 0);
    }

    #[tokio::test]
    async fn offline_collaborators_refuse() {
        let offline = Offline;
        let a = AgentId::from("a1");
        assert!(offline.send(&a, &TargetId::from("g"), "x").await.is_err());
        assert!(offline.check_restricted(&a).await.is_err());
    }
}
