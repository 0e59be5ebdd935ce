// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! State store trait and JSON read-modify-write helpers.
//!
//! The state store is the only place shared mutable scheduler state lives:
//! cooldown entries, agent restriction records, blackouts, and pending
//! contact requests. Every mutation is a compare-and-swap so several
//! scheduler processes can share one store.

use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::CourierError;
use crate::traits::adapter::PluginAdapter;

/// Upper bound on compare-and-swap retries before reporting contention.
pub const MAX_CAS_ATTEMPTS: u32 = 16;

/// Atomic key-value store over string keys.
///
/// Expired keys behave exactly like absent keys for every operation.
#[async_trait]
pub trait StateStore: PluginAdapter {
    /// Reads the current value of `key`.
    async fn get(&self, key: &str) -> Result<Option<String>, CourierError>;

    /// Atomically replaces the value of `key` if it currently equals `expected`.
    ///
    /// `expected = None` means "key absent". `new = None` deletes the key.
    /// `ttl` sets a hard expiry on the written value; `None` writes without expiry.
    /// Returns `false` without side effects when the comparison fails.
    async fn compare_and_swap(
        &self,
        key: &str,
        expected: Option<&str>,
        new: Option<&str>,
        ttl: Option<Duration>,
    ) -> Result<bool, CourierError>;

    /// Sets a TTL on an existing key. Returns `false` if the key is absent.
    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, CourierError>;

    /// Lists all live keys starting with `prefix`, with their values.
    async fn scan_prefix(&self, prefix: &str) -> Result<Vec<(String, String)>, CourierError>;
}

/// What a read-modify-write closure wants done with the current value.
#[derive(Debug, Clone, PartialEq)]
pub enum Mutation<T> {
    /// Leave the stored value as is.
    Keep,
    /// Write a new value.
    Put(T),
    /// Remove the key.
    Delete,
}

/// Reads and decodes a JSON value.
pub async fn get_json<T>(store: &dyn StateStore, key: &str) -> Result<Option<T>, CourierError>
where
    T: DeserializeOwned,
{
    match store.get(key).await? {
        Some(raw) => serde_json::from_str(&raw)
            .map(Some)
            .map_err(CourierError::storage),
        None => Ok(None),
    }
}

/// Applies `f` to the current JSON value of `key` under compare-and-swap.
///
/// `f` may run several times if other writers race on the same key; it must
/// be a pure function of its input. Returns the value observed by the winning
/// attempt and the value left in the store.
pub async fn mutate_json<T, F>(
    store: &dyn StateStore,
    key: &str,
    ttl: Option<Duration>,
    mut f: F,
) -> Result<(Option<T>, Option<T>), CourierError>
where
    T: Serialize + DeserializeOwned + Clone + Send,
    F: FnMut(Option<&T>) -> Mutation<T> + Send,
{
    for _ in 0..MAX_CAS_ATTEMPTS {
        let raw = store.get(key).await?;
        let current: Option<T> = match &raw {
            Some(s) => Some(serde_json::from_str(s).map_err(CourierError::storage)?),
            None => None,
        };

        match f(current.as_ref()) {
            Mutation::Keep => {
                let unchanged = current.clone();
                return Ok((current, unchanged));
            }
            Mutation::Put(next) => {
                let encoded = serde_json::to_string(&next).map_err(CourierError::storage)?;
                if store
                    .compare_and_swap(key, raw.as_deref(), Some(&encoded), ttl)
                    .await?
                {
                    return Ok((current, Some(next)));
                }
            }
            Mutation::Delete => {
                if raw.is_none() {
                    return Ok((None, None));
                }
                if store
                    .compare_and_swap(key, raw.as_deref(), None, None)
                    .await?
                {
                    return Ok((current, None));
                }
            }
        }
    }

    Err(CourierError::Contention {
        key: key.to_string(),
        attempts: MAX_CAS_ATTEMPTS,
    })
}
