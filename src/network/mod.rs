//! Multi-provider network client.
//!
//! # Data Flow
//! ```text
//! Chain service operation (e.g. account sync)
//!     → multi.rs (MultiProvider::execute, starting at the current provider)
//!     → closure issues every sub-request on that one provider (try_join)
//!     → http.rs (JsonHttpClient with per-request deadline)
//!     → chain service decodes the envelope, re-classifies embedded errors
//!     → transport-class error: endpoint.rs marks failure, next provider
//!     → chain-protocol error: surfaced immediately
//! ```
//!
//! # Design Decisions
//! - The current provider index is scoped to one MultiProvider instance
//! - Each provider is tried at most once per operation
//! - Health counters are diagnostics only; ordering never skips a provider

pub mod endpoint;
pub mod error;
pub mod http;
pub mod multi;

pub use endpoint::{Endpoint, HealthState};
pub use error::{ChainErrorKind, NetworkError, NetworkResult};
pub use http::{HttpReply, JsonHttpClient};
pub use multi::{HostProvider, MultiProvider};
