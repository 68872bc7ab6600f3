//! Pending-transaction tracking.
//!
//! # Data Flow
//! ```text
//! Manager::send succeeds
//!     → store.rs (insert record keyed by hash)
//! Manager::update
//!     → reconciler.rs (lookup each hash on the provider serving the update)
//!     → confirmed (height > 0): removed; unknown / not-found: kept
//! ```

pub mod reconciler;
pub mod store;

pub use reconciler::{reconcile, ReconcileReport, TransactionLookup};
pub use store::{PendingTransactionRecord, PendingTransactionStore};
