//! Metrics collection.
//!
//! # Metrics
//! - `chain_provider_requests_total` (counter): requests by chain, host
//! - `chain_provider_fallbacks_total` (counter): provider switches by chain, host
//! - `chain_provider_health` (gauge): 1=healthy, 0=unhealthy, by host
//! - `card_session_events_total` (counter): session lifecycle events by event
//! - `card_apdu_round_trips_total` (counter): APDUs exchanged by instruction, status
//! - `pending_transactions` (gauge): pending records by chain
//!
//! # Design Decisions
//! - Low-overhead metric updates through the `metrics` facade
//! - No recorder is installed here; without one every call is a no-op
//! - `observability.metrics_enabled = false` turns every call into a no-op
//!   even when the host has a recorder installed

use std::sync::atomic::{AtomicBool, Ordering};

use metrics::{counter, gauge};

use crate::config::ObservabilityConfig;

static ENABLED: AtomicBool = AtomicBool::new(true);

pub fn set_enabled(enabled: bool) {
    ENABLED.store(enabled, Ordering::Relaxed);
}

pub fn is_enabled() -> bool {
    ENABLED.load(Ordering::Relaxed)
}

/// Apply `metrics_enabled` from the observability config.
pub fn init_from_config(config: &ObservabilityConfig) {
    set_enabled(config.metrics_enabled);
}

pub fn record_provider_request(chain: &str, host: &str) {
    if !is_enabled() {
        return;
    }
    counter!(
        "chain_provider_requests_total",
        "chain" => chain.to_string(),
        "host" => host.to_string()
    )
    .increment(1);
}

pub fn record_provider_fallback(chain: &str, from_host: &str) {
    if !is_enabled() {
        return;
    }
    counter!(
        "chain_provider_fallbacks_total",
        "chain" => chain.to_string(),
        "host" => from_host.to_string()
    )
    .increment(1);
}

pub fn record_provider_health(host: &str, healthy: bool) {
    if !is_enabled() {
        return;
    }
    gauge!("chain_provider_health", "host" => host.to_string()).set(if healthy { 1.0 } else { 0.0 });
}

pub fn record_session_event(event: &'static str) {
    if !is_enabled() {
        return;
    }
    counter!("card_session_events_total", "event" => event).increment(1);
}

pub fn record_apdu_round_trip(instruction: &'static str, status: u16) {
    if !is_enabled() {
        return;
    }
    counter!(
        "card_apdu_round_trips_total",
        "instruction" => instruction,
        "status" => format!("{status:04X}")
    )
    .increment(1);
}

pub fn record_pending_transactions(chain: &str, count: usize) {
    if !is_enabled() {
        return;
    }
    gauge!("pending_transactions", "chain" => chain.to_string()).set(count as f64);
}
