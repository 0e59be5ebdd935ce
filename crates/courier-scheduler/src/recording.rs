// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Metric registration and recording helpers.
//!
//! Uses the metrics-rs facade so any installed recorder can collect these.

use courier_core::{ContactStatus, SpamState};
use metrics::{describe_counter, describe_gauge, describe_histogram};

/// Register all Courier metric descriptions.
///
/// Called once at startup after the recorder is installed.
pub fn register_metrics() {
    describe_counter!("courier_dispatch_total", "Transport sends by outcome");
    describe_counter!(
        "courier_cooldown_rejections_total",
        "Reservations rejected by the cooldown ledger, by scope"
    );
    describe_gauge!("courier_queue_depth", "Candidates waiting in the scheduler queue");
    describe_histogram!(
        "courier_dispatch_latency_seconds",
        "Transport send latency in seconds"
    );
    describe_counter!(
        "courier_agent_state_transitions_total",
        "Agent restriction state changes, by new state"
    );
    describe_counter!(
        "courier_contact_requests_total",
        "Contact fallback requests, by status reached"
    );
}

pub fn record_dispatch(outcome: &'static str) {
    metrics::counter!("courier_dispatch_total", "outcome" => outcome).increment(1);
}

pub fn record_cooldown_rejection(scope: &str) {
    metrics::counter!("courier_cooldown_rejections_total", "scope" => scope.to_string())
        .increment(1);
}

pub fn set_queue_depth(depth: usize) {
    metrics::gauge!("courier_queue_depth").set(depth as f64);
}

pub fn record_dispatch_latency(seconds: f64) {
    metrics::histogram!("courier_dispatch_latency_seconds").record(seconds);
}

pub fn record_state_transition(to: SpamState) {
    metrics::counter!("courier_agent_state_transitions_total", "to" => to.to_string())
        .increment(1);
}

pub fn record_contact_status(status: ContactStatus) {
    metrics::counter!("courier_contact_requests_total", "status" => status.to_string())
        .increment(1);
}
