//! Fee estimation.
//!
//! # Data Flow
//! ```text
//! Cosmos:  simulate(dummy-signed tx) → gas_used → estimator::gas_fee_tiers
//! Solana:  getFeeForMessage(unsigned msg) + rent for a missing token account
//! XRP:     fee oracle [minimum, open_ledger, median] → estimator::oracle_fee_tiers
//! ```
//!
//! The network-facing half lives in each chain's wallet manager; this module
//! holds the pure arithmetic.

pub mod estimator;

pub use estimator::{gas_fee_tiers, oracle_fee_tiers};
