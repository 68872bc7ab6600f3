//! Transaction model shared by every chain family.
//!
//! # Data Flow
//! ```text
//! TransactionIntent (amount, fee, addresses, params)
//!     → builder.rs (TransactionBuilder::build_for_sign → unsigned + hash)
//!     → signer.rs (TransactionSigner::sign, possibly a card session)
//!     → signature.rs (strip recovery byte, DER encode)
//!     → builder.rs (build_for_send → wire payload)
//! ```
//!
//! # Design Decisions
//! - Builders never touch the network; chain state is set on them beforehand
//! - The signer is an opaque async capability

pub mod builder;
pub mod signature;
pub mod signer;
pub mod types;

pub use builder::TransactionBuilder;
pub use signer::{EllipticCurve, SignerError, TransactionSigner, WalletPublicKey};
pub use types::{
    BuildError, BuildResult, Fee, FeeParameters, TransactionIntent, TransactionParams,
    TransactionSendResult,
};
