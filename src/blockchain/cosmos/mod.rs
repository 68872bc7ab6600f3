//! Cosmos SDK family: protobuf payloads, LCD service and wallet manager.
//!
//! # Data Flow
//! ```text
//! update:  LCD accounts + balances + tx lookups (one provider, try_join)
//!          → builder gets account number and sequence
//! get_fee: builder.build_for_simulation → /simulate → fees::gas_fee_tiers
//! send:    builder.build_for_sign → SHA-256(SignDoc) → signer
//!          → build_for_send (strip recovery byte, TxRaw, broadcast JSON)
//!          → /txs (BROADCAST_MODE_SYNC) → pending store
//! ```

pub mod builder;
pub mod manager;
pub mod network;
pub mod proto;

pub use builder::{CosmosTransactionBuilder, CosmosUnsignedTransaction};
pub use manager::CosmosWalletManager;
pub use network::{CosmosAccount, CosmosNetworkService, CosmosRestProvider};
