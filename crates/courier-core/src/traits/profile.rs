// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Profile store trait.

use async_trait::async_trait;

use crate::error::CourierError;
use crate::traits::adapter::PluginAdapter;
use crate::types::{PrioritySignals, TargetId};

/// Read-only source of per-target scoring signals.
#[async_trait]
pub trait ProfileStore: PluginAdapter {
    async fn get_signals(&self, target: &TargetId) -> Result<PrioritySignals, CourierError>;
}
