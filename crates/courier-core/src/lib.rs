// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the Courier delivery scheduler.
//!
//! This crate provides the error type, the domain types shared by every
//! scheduler component, the injectable [`Clock`], and the adapter traits
//! for the external collaborators (transport client, platform probe,
//! content generator, profile store, state store).

pub mod clock;
pub mod error;
pub mod traits;
pub mod types;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::CourierError;
pub use types::{
    ActivityLevel, AdapterType, AgentId, AgentRecord, ContactStatus, ContentCategory,
    CooldownScope, DeliveryOutcome, HealthStatus, PendingContactRequest, PrioritySignals,
    ProbeReport, SpamState, Target, TargetId, TargetKind,
};

pub use traits::{
    ContentGenerator, PlatformProbe, PluginAdapter, ProfileStore, StateStore, Transport,
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn adapter_type_has_five_variants() {
        use std::str::FromStr;

        let variants = [
            AdapterType::Transport,
            AdapterType::Probe,
            AdapterType::Content,
            AdapterType::Profile,
            AdapterType::StateStore,
        ];

        for variant in &variants {
            let s = variant.to_string();
            let parsed = AdapterType::from_str(&s).expect("should parse back");
            assert_eq!(*variant, parsed);
        }
    }

    #[test]
    fn all_trait_modules_are_exported() {
        fn _assert_transport<T: Transport>() {}
        fn _assert_probe<T: PlatformProbe>() {}
        fn _assert_content<T: ContentGenerator>() {}
        fn _assert_profile<T: ProfileStore>() {}
        fn _assert_state_store<T: StateStore>() {}
    }
}
