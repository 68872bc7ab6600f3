//! Solana: legacy message builder, JSON-RPC service and wallet manager.
//!
//! # Data Flow
//! ```text
//! update:  getBalance + getTokenAccountsByOwner + getSignatureStatuses
//!          (one provider, try_join)
//! get_fee: getAccountInfo (mint owner, once per mint)
//!          → getAccountInfo (destination or its token account)
//!          → compute budget → message → getFeeForMessage
//!          → + rent exemption when a token account must be created
//! send:    coin to a new account must cover getMinimumBalanceForRentExemption(0)
//!          getLatestBlockhash → message → ed25519 signer
//!          → base64 wire transaction → sendTransaction → pending store
//! ```

pub mod builder;
pub mod manager;
pub mod message;
pub mod network;

pub use builder::{
    associated_token_address, compute_budget_for, SolanaTransactionBuilder, SolanaUnsignedTransaction, TokenProgram,
};
pub use manager::SolanaWalletManager;
pub use message::Pubkey;
pub use network::{SolanaNetworkService, SolanaRpcProvider, SolanaTokenAccounts};
