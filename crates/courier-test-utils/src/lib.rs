// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities for Courier integration tests.
//!
//! Provides scripted mock collaborators and a harness wiring them to an
//! in-memory state store and a manual clock, for fast, deterministic tests
//! without a messaging platform.
//!
//! # Components
//!
//! - [`MockTransport`] - scripted send outcomes and captured sends
//! - [`MockProbe`] - settable restriction answers and injected failures
//! - [`MockContent`] / [`MockProfileStore`] - toggleable collaborator failures
//! - [`FlakyStateStore`] - state store that can be switched off
//! - [`TestHarness`] - all of the above plus a [`ManualClock`](courier_core::ManualClock)

pub mod flaky_store;
pub mod harness;
pub mod mocks;

pub use flaky_store::FlakyStateStore;
pub use harness::TestHarness;
pub use mocks::{MockContent, MockProbe, MockProfileStore, MockTransport};
