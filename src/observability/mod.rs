//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! Network services, managers and card sessions produce:
//!     → logging.rs (structured tracing events)
//!     → metrics.rs (counters and gauges through the metrics facade)
//!
//! Consumers:
//!     → whatever subscriber / recorder the host application installs
//! ```
//!
//! # Design Decisions
//! - The core never installs an exporter; the host owns exposition
//! - Metrics are cheap (atomic increments behind the facade)
//! - Secrets (PINs, keys, session keys) never appear in events

pub mod logging;
pub mod metrics;

use tracing_subscriber::util::TryInitError;

use crate::config::ObservabilityConfig;

/// Apply the metrics switch and install logging from `config`.
pub fn init(config: &ObservabilityConfig) -> Result<(), TryInitError> {
    metrics::init_from_config(config);
    logging::init_from_config(config)
}
