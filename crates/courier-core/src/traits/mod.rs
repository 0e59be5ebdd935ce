// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Adapter trait definitions for the external collaborators.
//!
//! All adapters extend the [`PluginAdapter`] base trait and use
//! `#[async_trait]` for dynamic dispatch compatibility.

pub mod adapter;
pub mod content;
pub mod probe;
pub mod profile;
pub mod state_store;
pub mod transport;

pub use adapter::PluginAdapter;
pub use content::ContentGenerator;
pub use probe::PlatformProbe;
pub use profile::ProfileStore;
pub use state_store::{Mutation, StateStore, get_json, mutate_json};
pub use transport::Transport;
