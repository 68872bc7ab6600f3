//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the wallet
//! core. All types derive Serde traits for deserialization from config files.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::resilience::BackoffPolicy;

/// Root configuration for the wallet core.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct CoreConfig {
    /// HTTP client settings shared by every provider.
    pub network: NetworkConfig,

    /// Fallback pacing between providers.
    pub resilience: ResilienceConfig,

    /// Cosmos SDK REST (LCD) providers.
    pub cosmos: ProvidersConfig,

    /// Solana JSON-RPC providers.
    pub solana: ProvidersConfig,

    /// XRP Ledger JSON-RPC providers.
    pub xrp: ProvidersConfig,

    /// Card session behaviour.
    pub card: CardConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// HTTP client configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Per-request timeout in seconds.
    pub request_timeout_secs: u64,

    /// Consecutive failures before an endpoint is reported unhealthy.
    pub unhealthy_threshold: usize,

    /// Consecutive successes before an endpoint is reported healthy again.
    pub healthy_threshold: usize,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: 10,
            unhealthy_threshold: 3,
            healthy_threshold: 2,
        }
    }
}

/// Backoff between provider switches.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ResilienceConfig {
    /// Base delay in milliseconds. Zero switches immediately.
    pub base_delay_ms: u64,

    /// Upper bound for the delay in milliseconds.
    pub max_delay_ms: u64,
}

impl Default for ResilienceConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: 0,
            max_delay_ms: 2_000,
        }
    }
}

impl ResilienceConfig {
    pub fn backoff(&self) -> BackoffPolicy {
        BackoffPolicy {
            base_delay_ms: self.base_delay_ms,
            max_delay_ms: self.max_delay_ms,
        }
    }
}

/// Ordered provider list for one chain family.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ProvidersConfig {
    /// Base URLs, tried in order.
    pub providers: Vec<String>,

    /// Seconds a sent transaction may stay pending before it is dropped.
    /// Zero keeps records until the chain confirms them.
    pub pending_ttl_secs: u64,
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        Self {
            providers: Vec::new(),
            pending_ttl_secs: 300,
        }
    }
}

impl ProvidersConfig {
    pub fn pending_ttl(&self) -> Option<Duration> {
        (self.pending_ttl_secs > 0).then(|| Duration::from_secs(self.pending_ttl_secs))
    }
}

/// Card session configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CardConfig {
    /// Delay before polling again after a wrong card was presented.
    pub wrong_card_retry_delay_ms: u64,

    /// How long to wait for a lost tag to come back.
    pub tag_reconnect_timeout_ms: u64,

    /// Allow the fast encryption mode before escalating to strong.
    pub allow_fast_encryption: bool,

    /// Attach a terminal key to read commands.
    pub linked_terminal: bool,

    /// Force legacy mode. Derived from the reader when unset.
    pub legacy_mode: Option<bool>,

    /// Default access code used until the caller overrides it.
    pub default_pin1: String,

    /// Default passcode used until the caller overrides it.
    pub default_pin2: String,
}

impl Default for CardConfig {
    fn default() -> Self {
        Self {
            wrong_card_retry_delay_ms: 1_500,
            tag_reconnect_timeout_ms: 10_000,
            allow_fast_encryption: true,
            linked_terminal: true,
            legacy_mode: None,
            default_pin1: "000000".to_string(),
            default_pin2: "000".to_string(),
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level directive for this crate (trace, debug, info, warn, error).
    pub log_level: String,

    /// Emit metrics through the `metrics` facade.
    pub metrics_enabled: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            metrics_enabled: true,
        }
    }
}
