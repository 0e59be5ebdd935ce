// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-process [`StateStore`] on a sharded concurrent map.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use courier_core::clock::chrono_duration;
use courier_core::{AdapterType, Clock, CourierError, HealthStatus, PluginAdapter, StateStore};

#[derive(Debug, Clone)]
struct Slot {
    value: String,
    expires_at: Option<DateTime<Utc>>,
}

impl Slot {
    fn live(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_none_or(|at| at > now)
    }
}

/// State store for a single scheduler process.
///
/// Each compare-and-swap holds the shard lock for its key, so concurrent
/// workers in the same process observe a linearizable history per key.
pub struct MemoryStateStore {
    map: DashMap<String, Slot>,
    clock: Arc<dyn Clock>,
}

impl MemoryStateStore {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            map: DashMap::new(),
            clock,
        }
    }

    /// Drop every expired entry. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let before = self.map.len();
        self.map.retain(|_, slot| slot.live(now));
        before.saturating_sub(self.map.len())
    }

    /// Number of live keys.
    pub fn len(&self) -> usize {
        let now = self.clock.now();
        self.map.iter().filter(|e| e.value().live(now)).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl PluginAdapter for MemoryStateStore {
    fn name(&self) -> &str {
        "memory"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::StateStore
    }

    async fn health_check(&self) -> Result<HealthStatus, CourierError> {
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), CourierError> {
        Ok(())
    }
}

#[async_trait]
impl StateStore for MemoryStateStore {
    async fn get(&self, key: &str) -> Result<Option<String>, CourierError> {
        let now = self.clock.now();
        Ok(self
            .map
            .get(key)
            .filter(|slot| slot.live(now))
            .map(|slot| slot.value.clone()))
    }

    async fn compare_and_swap(
        &self,
        key: &str,
        expected: Option<&str>,
        new: Option<&str>,
        ttl: Option<Duration>,
    ) -> Result<bool, CourierError> {
        let now = self.clock.now();
        let expires_at = ttl.map(|t| now + chrono_duration(t));

        match self.map.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => {
                let current = occupied
                    .get()
                    .live(now)
                    .then(|| occupied.get().value.as_str());
                if current != expected {
                    return Ok(false);
                }
                match new {
                    Some(value) => {
                        occupied.insert(Slot {
                            value: value.to_string(),
                            expires_at,
                        });
                    }
                    None => {
                        occupied.remove();
                    }
                }
                Ok(true)
            }
            Entry::Vacant(vacant) => {
                if expected.is_some() {
                    return Ok(false);
                }
                if let Some(value) = new {
                    vacant.insert(Slot {
                        value: value.to_string(),
                        expires_at,
                    });
                }
                Ok(true)
            }
        }
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, CourierError> {
        let now = self.clock.now();
        match self.map.get_mut(key) {
            Some(mut slot) if slot.live(now) => {
                slot.expires_at = Some(now + chrono_duration(ttl));
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn scan_prefix(&self, prefix: &str) -> Result<Vec<(String, String)>, CourierError> {
        let now = self.clock.now();
        let mut rows: Vec<(String, String)> = self
            .map
            .iter()
            .filter(|e| e.key().starts_with(prefix) && e.value().live(now))
            .map(|e| (e.key().clone(), e.value().value.clone()))
            .collect();
        rows.sort();
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use courier_core::ManualClock;

    fn store() -> (MemoryStateStore, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap(),
        ));
        (MemoryStateStore::new(clock.clone()), clock)
    }

    #[tokio::test]
    async fn cas_semantics_match_sqlite_backend() {
        let (store, _) = store();
        assert!(store.compare_and_swap("k", None, Some("a"), None).await.unwrap());
        assert!(!store.compare_and_swap("k", None, Some("b"), None).await.unwrap());
        assert!(store.compare_and_swap("k", Some("a"), Some("b"), None).await.unwrap());
        assert!(store.compare_and_swap("k", Some("b"), None, None).await.unwrap());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn expired_value_is_absent_for_cas() {
        let (store, clock) = store();
        store
            .compare_and_swap("k", None, Some("a"), Some(Duration::from_secs(5)))
            .await
            .unwrap();
        clock.advance(Duration::from_secs(5));
        assert_eq!(store.get("k").await.unwrap(), None);
        assert!(!store.compare_and_swap("k", Some("a"), Some("z"), None).await.unwrap());
        assert!(store.compare_and_swap("k", None, Some("b"), None).await.unwrap());
    }

    #[tokio::test]
    async fn purge_and_scan_skip_expired() {
        let (store, clock) = store();
        store.compare_and_swap("cd:glob:g1", None, Some("1"), None).await.unwrap();
        store
            .compare_and_swap("cd:glob:g2", None, Some("2"), Some(Duration::from_secs(1)))
            .await
            .unwrap();
        clock.advance(Duration::from_secs(2));
        assert_eq!(store.scan_prefix("cd:").await.unwrap().len(), 1);
        assert_eq!(store.purge_expired(), 1);
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn concurrent_cas_admits_exactly_one_writer() {
        let (store, _) = store();
        let store = Arc::new(store);
        let mut handles = Vec::new();
        for i in 0..32 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store
                    .compare_and_swap("slot", None, Some(&i.to_string()), None)
                    .await
                    .unwrap()
            }));
        }
        let mut winners = 0;
        for h in handles {
            if h.await.unwrap() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
    }
}
