//! XRP Ledger descriptor.

use crate::chain::amount::RoundingPolicy;
use crate::chain::descriptor::ChainDescriptor;

/// The XRP Ledger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct XrpChain;

impl ChainDescriptor for XrpChain {
    fn display_name(&self) -> &'static str {
        "XRP Ledger"
    }

    fn currency_symbol(&self) -> &'static str {
        "XRP"
    }

    fn smallest_denomination(&self) -> &'static str {
        "drops"
    }

    fn chain_id(&self) -> &'static str {
        "mainnet"
    }

    fn decimal_count(&self) -> u32 {
        6
    }

    fn is_testnet(&self) -> bool {
        false
    }

    fn allows_fee_selection(&self) -> bool {
        true
    }

    fn rounding(&self) -> RoundingPolicy {
        RoundingPolicy::HalfEven
    }
}
