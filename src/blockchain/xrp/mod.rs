//! XRP Ledger: binary codec, rippled service and wallet manager.
//!
//! # Data Flow
//! ```text
//! update:  account_info + account_lines + server_state + tx lookups
//!          (one provider, try_join) → sequence, reserve, trust lines
//! get_fee: fee → [minimum, open_ledger, median], doubled when the token's
//!          trust line still ripples
//! send:    Payment (or TrustSet + Payment via sign_many)
//!          → codec (sorted fields) → STX\0 signing data → signer
//!          → DER signature → tx_blob → submit → pending store
//! ```
//!
//! # Design Decisions
//! - Tokens are addressed as `CUR.rIssuer` (or a bare issuer with the
//!   token symbol as currency code)
//! - Only classic `r...` addresses are accepted

pub mod builder;
pub mod codec;
pub mod manager;
pub mod network;

pub use builder::{IssuedCurrency, XrpSignedTransaction, XrpTransactionBuilder, XrpUnsignedTransaction};
pub use manager::XrpWalletManager;
pub use network::{FeeQuote, ReserveSettings, TrustLine, XrpNetworkService, XrpRpcProvider};
