//! Resilience helpers for provider fallback.
//!
//! # Data Flow
//! ```text
//! MultiProvider attempt N fails (retryable)
//!     → backoff.rs (BackoffPolicy::delay_for(N))
//!     → sleep, then the next provider is tried
//! ```
//!
//! # Design Decisions
//! - A zero base delay disables waiting entirely
//! - Jitter is bounded to 10% of the capped delay

pub mod backoff;

pub use backoff::{calculate_backoff, BackoffPolicy};
