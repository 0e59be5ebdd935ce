// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Platform probe trait.

use async_trait::async_trait;

use crate::error::CourierError;
use crate::traits::adapter::PluginAdapter;
use crate::types::{AgentId, ProbeReport};

/// Asks the platform whether an agent is currently restricted from broadcasting.
#[async_trait]
pub trait PlatformProbe: PluginAdapter {
    async fn check_restricted(&self, agent: &AgentId) -> Result<ProbeReport, CourierError>;
}
