//! Structured logging.
//!
//! # Responsibilities
//! - Initialize the tracing subscriber for hosts that do not bring one
//! - Honour `RUST_LOG` before the configured level
//!
//! # Design Decisions
//! - Uses tracing crate for structured logging
//! - Initialization is fallible instead of panicking when a subscriber exists

use tracing_subscriber::util::TryInitError;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::ObservabilityConfig;

/// Directive used when `RUST_LOG` is not set.
pub fn default_directive(level: &str) -> String {
    format!("cardwallet_core={level}")
}

/// Install a global fmt subscriber filtered by `RUST_LOG` or `level`.
pub fn init(level: &str) -> Result<(), TryInitError> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| default_directive(level).into()))
        .with(tracing_subscriber::fmt::layer())
        .try_init()
}

/// Install logging as described by the observability config.
pub fn init_from_config(config: &ObservabilityConfig) -> Result<(), TryInitError> {
    init(&config.log_level)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_directive() {
        assert_eq!(default_directive("debug"), "cardwallet_core=debug");
    }

    #[test]
    fn test_second_init_does_not_panic() {
        let _ = init("info");
        assert!(init("info").is_err());
    }
}
