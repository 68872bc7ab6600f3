//! Chain descriptors and amount conversion.
//!
//! # Data Flow
//! ```text
//! Chain (closed enum)
//!     → descriptor.rs (ChainDescriptor: denominations, decimals, rounding, tax)
//!     → descriptor.rs (GasPriced: gas tiers, only for gas-priced families)
//!     → amount.rs (display value ⇄ smallest units)
//!     → builders and fee estimators read constants, never mutate them
//! ```
//!
//! # Design Decisions
//! - Descriptors are plain values; no chain carries runtime state here
//! - Rounding is a descriptor property (Cosmos truncates, Solana/XRP half-even)
//! - Gas tiers exist only behind `GasPriced`

pub mod amount;
pub mod cosmos;
pub mod descriptor;
pub mod solana;
pub mod xrp;

pub use amount::{
    convert_from_smallest_unit, convert_to_smallest_unit, Amount, AmountType, ConversionError,
    RoundingPolicy, Token,
};
pub use cosmos::CosmosChain;
pub use descriptor::{ChainDescriptor, FeePaidCurrency, GasPriced};
pub use solana::SolanaChain;
pub use xrp::XrpChain;

/// Every supported chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Chain {
    Cosmos(CosmosChain),
    Solana(SolanaChain),
    Xrp(XrpChain),
}

impl Chain {
    /// All chains, mainnets and testnets.
    pub fn all() -> Vec<Chain> {
        let mut chains: Vec<Chain> = CosmosChain::all().into_iter().map(Chain::Cosmos).collect();
        chains.push(Chain::Solana(SolanaChain { testnet: false }));
        chains.push(Chain::Solana(SolanaChain { testnet: true }));
        chains.push(Chain::Xrp(XrpChain));
        chains
    }

    pub fn descriptor(&self) -> &dyn ChainDescriptor {
        match self {
            Chain::Cosmos(chain) => chain,
            Chain::Solana(chain) => chain,
            Chain::Xrp(chain) => chain,
        }
    }

    /// The gas-tier view, for families that price fees by gas.
    pub fn gas_priced(&self) -> Option<&dyn GasPriced> {
        match self {
            Chain::Cosmos(chain) => Some(chain as &dyn GasPriced),
            Chain::Solana(_) | Chain::Xrp(_) => None,
        }
    }
}

impl Amount {
    /// A native-coin amount at the chain's precision.
    pub fn coin(chain: &dyn ChainDescriptor, value: rust_decimal::Decimal) -> Self {
        Amount::new(AmountType::Coin, value, chain.decimal_count())
    }
}
