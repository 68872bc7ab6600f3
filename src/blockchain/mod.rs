//! Chain wallet managers.
//!
//! # Data Flow
//! ```text
//! CoreConfig provider lists
//!     → factory.rs (Endpoint + JsonHttpClient per URL → MultiProvider)
//!     → <family>/network.rs (chain RPC, envelope decoding)
//!     → <family>/manager.rs (update / get_fee / send)
//!          ├─ <family>/builder.rs (payload for sign, payload for send)
//!          ├─ TransactionSigner (card session or local key)
//!          └─ wallet.rs (balances, pending store)
//! ```
//!
//! # Security Constraints
//! - Managers hold public keys only
//! - Never log signatures or signing payloads

pub mod cosmos;
pub mod factory;
pub mod manager;
pub mod solana;
pub mod wallet;
pub mod xrp;

pub use manager::WalletManager;
pub use wallet::{BalanceKey, BalanceMap, Wallet};
