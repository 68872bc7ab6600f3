//! Solana descriptor.

use crate::chain::amount::RoundingPolicy;
use crate::chain::descriptor::ChainDescriptor;

/// Solana mainnet-beta or testnet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct SolanaChain {
    pub testnet: bool,
}

impl ChainDescriptor for SolanaChain {
    fn display_name(&self) -> &'static str {
        if self.testnet {
            "Solana Testnet"
        } else {
            "Solana"
        }
    }

    fn currency_symbol(&self) -> &'static str {
        "SOL"
    }

    fn smallest_denomination(&self) -> &'static str {
        "lamports"
    }

    fn chain_id(&self) -> &'static str {
        if self.testnet {
            "testnet"
        } else {
            "mainnet-beta"
        }
    }

    fn decimal_count(&self) -> u32 {
        9
    }

    fn is_testnet(&self) -> bool {
        self.testnet
    }

    fn allows_fee_selection(&self) -> bool {
        false
    }

    fn rounding(&self) -> RoundingPolicy {
        RoundingPolicy::HalfEven
    }
}
