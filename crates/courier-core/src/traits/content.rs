// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Content generator trait.

use async_trait::async_trait;

use crate::error::CourierError;
use crate::traits::adapter::PluginAdapter;
use crate::types::{ContentCategory, TargetId};

/// Produces message text. Opaque to the scheduler.
#[async_trait]
pub trait ContentGenerator: PluginAdapter {
    async fn generate(
        &self,
        target: &TargetId,
        category: ContentCategory,
    ) -> Result<String, CourierError>;
}
