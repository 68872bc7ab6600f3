//! Multi-chain wallet core and hardware card session engine.

pub mod blockchain;
pub mod card;
pub mod chain;
pub mod config;
pub mod error;
pub mod fees;
pub mod network;
pub mod observability;
pub mod pending;
pub mod resilience;
pub mod transaction;

pub use chain::{Amount, AmountType, Chain, ChainDescriptor, Token};
pub use config::schema::CoreConfig;
pub use error::{ErrorKind, WalletError};
pub use transaction::{Fee, FeeParameters, TransactionIntent, TransactionSigner};
