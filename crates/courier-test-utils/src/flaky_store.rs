// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! A state store that can be switched off mid-test.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;

use courier_core::traits::PluginAdapter;
use courier_core::{AdapterType, CourierError, HealthStatus, StateStore};
use courier_storage::MemoryStateStore;

/// Wraps a [`MemoryStateStore`]. While unavailable, every call fails with
/// [`CourierError::StoreUnavailable`] and health checks report unhealthy.
pub struct FlakyStateStore {
    inner: Arc<MemoryStateStore>,
    available: AtomicBool,
}

impl FlakyStateStore {
    pub fn new(inner: Arc<MemoryStateStore>) -> Self {
        Self {
            inner,
            available: AtomicBool::new(true),
        }
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    pub fn inner(&self) -> &Arc<MemoryStateStore> {
        &self.inner
    }

    fn check(&self) -> Result<(), CourierError> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(CourierError::StoreUnavailable("connection refused".into()))
        }
    }
}

#[async_trait]
impl PluginAdapter for FlakyStateStore {
    fn name(&self) -> &str {
        "flaky"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::StateStore
    }

    async fn health_check(&self) -> Result<HealthStatus, CourierError> {
        match self.check() {
            Ok(()) => self.inner.health_check().await,
            Err(e) => Ok(HealthStatus::Unhealthy(e.to_string())),
        }
    }

    async fn shutdown(&self) -> Result<(), CourierError> {
        self.inner.shutdown().await
    }
}

#[async_trait]
impl StateStore for FlakyStateStore {
    async fn get(&self, key: &str) -> Result<Option<String>, CourierError> {
        self.check()?;
        self.inner.get(key).await
    }

    async fn compare_and_swap(
        &self,
        key: &str,
        expected: Option<&str>,
        new: Option<&str>,
        ttl: Option<Duration>,
    ) -> Result<bool, CourierError> {
        self.check()?;
        self.inner.compare_and_swap(key, expected, new, ttl).await
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, CourierError> {
        self.check()?;
        self.inner.expire(key, ttl).await
    }

    async fn scan_prefix(&self, prefix: &str) -> Result<Vec<(String, String)>, CourierError> {
        self.check()?;
        self.inner.scan_prefix(prefix).await
    }
}
