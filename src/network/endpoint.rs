//! Provider endpoint abstraction.
//!
//! # Responsibilities
//! - Represent a single provider base URL
//! - Track health state (Healthy/Unhealthy) with hysteresis for diagnostics

use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};

use url::Url;

use crate::observability::metrics;

/// Health State enum.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthState {
    Unknown = 0,
    Healthy = 1,
    Unhealthy = 2,
}

impl From<u8> for HealthState {
    fn from(val: u8) -> Self {
        match val {
            1 => HealthState::Healthy,
            2 => HealthState::Unhealthy,
            _ => HealthState::Unknown,
        }
    }
}

/// A single provider endpoint.
#[derive(Debug)]
pub struct Endpoint {
    /// Base URL every request path is joined onto.
    pub base_url: Url,
    host: String,
    healthy_threshold: usize,
    unhealthy_threshold: usize,

    state: AtomicU8,
    consecutive_failures: AtomicUsize,
    consecutive_successes: AtomicUsize,
}

impl Endpoint {
    /// Parse `raw` into an endpoint. A trailing slash is appended so relative
    /// joins keep any path prefix.
    pub fn new(raw: &str, healthy_threshold: usize, unhealthy_threshold: usize) -> Result<Self, url::ParseError> {
        let mut base_url = Url::parse(raw)?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        let host = match (base_url.host_str(), base_url.port()) {
            (Some(h), Some(p)) => format!("{h}:{p}"),
            (Some(h), None) => h.to_string(),
            (None, _) => raw.to_string(),
        };
        Ok(Self {
            base_url,
            host,
            healthy_threshold: healthy_threshold.max(1),
            unhealthy_threshold: unhealthy_threshold.max(1),
            state: AtomicU8::new(HealthState::Unknown as u8),
            consecutive_failures: AtomicUsize::new(0),
            consecutive_successes: AtomicUsize::new(0),
        })
    }

    /// `host[:port]` used in logs, metrics and send results.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Join a relative path (no leading slash) onto the base URL.
    pub fn url(&self, path: &str) -> Result<Url, url::ParseError> {
        self.base_url.join(path.trim_start_matches('/'))
    }

    pub fn health_state(&self) -> HealthState {
        HealthState::from(self.state.load(Ordering::Relaxed))
    }

    /// Return true if endpoint is considered healthy (Healthy or Unknown).
    pub fn is_healthy(&self) -> bool {
        self.health_state() != HealthState::Unhealthy
    }

    /// Report a successful request.
    pub fn mark_success(&self) {
        self.consecutive_failures.store(0, Ordering::Relaxed);
        if self.health_state() == HealthState::Healthy {
            return;
        }

        let successes = self.consecutive_successes.fetch_add(1, Ordering::Relaxed) + 1;
        if successes >= self.healthy_threshold {
            self.state.store(HealthState::Healthy as u8, Ordering::Relaxed);
            metrics::record_provider_health(&self.host, true);
        }
    }

    /// Report a failed request.
    pub fn mark_failure(&self) {
        self.consecutive_successes.store(0, Ordering::Relaxed);
        if self.health_state() == HealthState::Unhealthy {
            return;
        }

        let failures = self.consecutive_failures.fetch_add(1, Ordering::Relaxed) + 1;
        if failures >= self.unhealthy_threshold {
            self.state.store(HealthState::Unhealthy as u8, Ordering::Relaxed);
            metrics::record_provider_health(&self.host, false);
            tracing::warn!(host = %self.host, failures, "Provider marked unhealthy");
        }
    }
}
