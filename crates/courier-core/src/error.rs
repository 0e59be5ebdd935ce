// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the Courier delivery scheduler.

use thiserror::Error;

/// The primary error type used across all Courier adapter traits and core operations.
///
/// Eligibility rejections (cooldown not elapsed, agent restricted) are never
/// errors; they are ordinary return values of the components that decide them.
#[derive(Debug, Error)]
pub enum CourierError {
    /// Configuration errors (invalid TOML, missing required fields, type mismatches).
    #[error("configuration error: {0}")]
    Config(String),

    /// State store backend errors (query failure, serialization of stored values).
    #[error("storage error: {source}")]
    Storage {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// The state store is unreachable. The scheduler halts dispatch until it recovers.
    #[error("state store unavailable: {0}")]
    StoreUnavailable(String),

    /// Transport client errors that are not a classified delivery outcome.
    #[error("transport error: {message}")]
    Transport {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Platform probe errors.
    #[error("probe error: {message}")]
    Probe {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Content generator errors.
    #[error("content error: {message}")]
    Content {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Profile store errors.
    #[error("profile error: {message}")]
    Profile {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// No pending contact request exists for the pair.
    #[error("no contact request for user {user_id} and agent {agent_id}")]
    ContactNotFound { user_id: String, agent_id: String },

    /// A contact request status change that the state machine does not allow.
    #[error("invalid contact transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    /// A compare-and-swap loop gave up after repeated conflicting writers.
    #[error("contention on key {key} after {attempts} attempts")]
    Contention { key: String, attempts: u32 },

    /// Operation timed out.
    #[error("operation timed out after {duration:?}")]
    Timeout { duration: std::time::Duration },

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl CourierError {
    /// Wrap any error as a storage error.
    pub fn storage<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        CourierError::Storage {
            source: Box::new(err),
        }
    }

    /// Returns `true` for errors that mean the state store cannot be trusted.
    ///
    /// The scheduler fails closed on these: no new dispatch is attempted until
    /// the store reports healthy again.
    pub fn is_store_failure(&self) -> bool {
        matches!(
            self,
            CourierError::Storage { .. }
                | CourierError::StoreUnavailable(_)
                | CourierError::Contention { .. }
        )
    }
}
