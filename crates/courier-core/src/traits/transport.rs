// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Transport adapter trait for the messaging platform client.

use async_trait::async_trait;

use crate::error::CourierError;
use crate::traits::adapter::PluginAdapter;
use crate::types::{AgentId, DeliveryOutcome, TargetId};

/// Sends messages on behalf of already-authenticated agents.
///
/// Classified platform answers (rate limits, refusals) are reported as a
/// [`DeliveryOutcome`]; `Err` is reserved for failures of the client itself
/// and is treated by the scheduler like [`DeliveryOutcome::Other`].
#[async_trait]
pub trait Transport: PluginAdapter {
    /// Sends `text` from `agent` to `target`.
    async fn send(
        &self,
        agent: &AgentId,
        target: &TargetId,
        text: &str,
    ) -> Result<DeliveryOutcome, CourierError>;

    /// Adds `user` to the agent's contacts. Returns `true` once the platform confirms.
    async fn add_contact(&self, agent: &AgentId, user: &TargetId) -> Result<bool, CourierError>;
}
