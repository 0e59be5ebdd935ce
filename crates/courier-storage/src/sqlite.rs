// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite implementation of the [`StateStore`] trait.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rusqlite::{OptionalExtension, TransactionBehavior, params};
use tracing::debug;

use courier_config::model::StorageConfig;
use courier_core::clock::chrono_duration;
use courier_core::{AdapterType, Clock, CourierError, HealthStatus, PluginAdapter, StateStore};

use crate::database::{Database, map_tr_err};

/// SQLite-backed state store.
///
/// Expiry is evaluated against the injected clock at read time, so expired
/// rows are invisible before [`purge_expired`](Self::purge_expired) removes them.
pub struct SqliteStateStore {
    db: Database,
    clock: Arc<dyn Clock>,
}

impl SqliteStateStore {
    pub fn new(db: Database, clock: Arc<dyn Clock>) -> Self {
        Self { db, clock }
    }

    /// Open the database described by `config`.
    pub async fn open(config: &StorageConfig, clock: Arc<dyn Clock>) -> Result<Self, CourierError> {
        let db = Database::open(&config.database_path, config.wal_mode).await?;
        Ok(Self::new(db, clock))
    }

    fn now_ms(&self) -> i64 {
        self.clock.now().timestamp_millis()
    }

    fn expiry_ms(&self, ttl: Duration) -> i64 {
        (self.clock.now() + chrono_duration(ttl)).timestamp_millis()
    }

    /// Delete every expired row. Returns how many were removed.
    pub async fn purge_expired(&self) -> Result<usize, CourierError> {
        let now = self.now_ms();
        let removed = self
            .db
            .connection()
            .call(move |conn| {
                conn.execute(
                    "DELETE FROM state_kv WHERE expires_at IS NOT NULL AND expires_at <= ?1",
                    params![now],
                )
            })
            .await
            .map_err(map_tr_err)?;
        debug!(removed, "purged expired state rows");
        Ok(removed)
    }
}

#[async_trait]
impl PluginAdapter for SqliteStateStore {
    fn name(&self) -> &str {
        "sqlite"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::StateStore
    }

    async fn health_check(&self) -> Result<HealthStatus, CourierError> {
        let result = self
            .db
            .connection()
            .call(|conn| {
                conn.execute_batch("SELECT 1;")?;
                Ok(())
            })
            .await
            .map_err(map_tr_err);
        match result {
            Ok(()) => Ok(HealthStatus::Healthy),
            Err(e) => Ok(HealthStatus::Unhealthy(e.to_string())),
        }
    }

    async fn shutdown(&self) -> Result<(), CourierError> {
        self.db.close().await
    }
}

#[async_trait]
impl StateStore for SqliteStateStore {
    async fn get(&self, key: &str) -> Result<Option<String>, CourierError> {
        let key = key.to_string();
        let now = self.now_ms();
        self.db
            .connection()
            .call(move |conn| {
                conn.query_row(
                    "SELECT value FROM state_kv
                     WHERE key = ?1 AND (expires_at IS NULL OR expires_at > ?2)",
                    params![key, now],
                    |row| row.get(0),
                )
                .optional()
            })
            .await
            .map_err(map_tr_err)
    }

    async fn compare_and_swap(
        &self,
        key: &str,
        expected: Option<&str>,
        new: Option<&str>,
        ttl: Option<Duration>,
    ) -> Result<bool, CourierError> {
        let key = key.to_string();
        let expected = expected.map(str::to_string);
        let new = new.map(str::to_string);
        let now = self.now_ms();
        let expires_at = ttl.map(|t| self.expiry_ms(t));

        self.db
            .connection()
            .call(move |conn| {
                let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
                let current: Option<String> = tx
                    .query_row(
                        "SELECT value FROM state_kv
                         WHERE key = ?1 AND (expires_at IS NULL OR expires_at > ?2)",
                        params![key, now],
                        |row| row.get(0),
                    )
                    .optional()?;

                if current != expected {
                    // Dropping the transaction rolls it back.
                    return Ok(false);
                }

                match new {
                    Some(value) => {
                        tx.execute(
                            "INSERT INTO state_kv (key, value, expires_at) VALUES (?1, ?2, ?3)
                             ON CONFLICT(key) DO UPDATE
                             SET value = excluded.value, expires_at = excluded.expires_at",
                            params![key, value, expires_at],
                        )?;
                    }
                    None => {
                        tx.execute("DELETE FROM state_kv WHERE key = ?1", params![key])?;
                    }
                }
                tx.commit()?;
                Ok(true)
            })
            .await
            .map_err(map_tr_err)
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, CourierError> {
        let key = key.to_string();
        let now = self.now_ms();
        let expires_at = self.expiry_ms(ttl);
        let updated = self
            .db
            .connection()
            .call(move |conn| {
                conn.execute(
                    "UPDATE state_kv SET expires_at = ?2
                     WHERE key = ?1 AND (expires_at IS NULL OR expires_at > ?3)",
                    params![key, expires_at, now],
                )
            })
            .await
            .map_err(map_tr_err)?;
        Ok(updated > 0)
    }

    async fn scan_prefix(&self, prefix: &str) -> Result<Vec<(String, String)>, CourierError> {
        let prefix = prefix.to_string();
        let now = self.now_ms();
        self.db
            .connection()
            .call(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT key, value FROM state_kv
                     WHERE substr(key, 1, length(?1)) = ?1
                       AND (expires_at IS NULL OR expires_at > ?2)
                     ORDER BY key",
                )?;
                let rows = stmt
                    .query_map(params![prefix, now], |row| Ok((row.get(0)?, row.get(1)?)))?
                    .collect::<Result<Vec<(String, String)>, _>>()?;
                Ok(rows)
            })
            .await
            .map_err(map_tr_err)
    }
}
