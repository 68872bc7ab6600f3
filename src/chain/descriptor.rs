//! Chain descriptor traits.

use rust_decimal::Decimal;

use crate::chain::amount::{
    convert_from_smallest_unit, convert_to_smallest_unit, AmountType, ConversionError,
    RoundingPolicy, Token,
};

/// Which currency pays a transfer's fee.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeePaidCurrency {
    /// Fees are always paid in the native coin.
    Coin,
    /// Token transfers pay their fee in the token itself.
    SameCurrency,
}

/// Static, per-chain constants consulted by builders and fee estimators.
pub trait ChainDescriptor: Send + Sync {
    fn display_name(&self) -> &'static str;
    fn currency_symbol(&self) -> &'static str;
    fn smallest_denomination(&self) -> &'static str;
    fn chain_id(&self) -> &'static str;
    fn decimal_count(&self) -> u32;
    fn is_testnet(&self) -> bool;
    fn allows_fee_selection(&self) -> bool;
    fn rounding(&self) -> RoundingPolicy;

    fn fee_multiplier(&self) -> Decimal {
        Decimal::ONE
    }

    fn fee_paid_currency(&self) -> FeePaidCurrency {
        FeePaidCurrency::Coin
    }

    /// Percentage (0..100) of the transferred amount charged as tax.
    fn tax_percentage(&self, _kind: &AmountType) -> Option<Decimal> {
        None
    }

    /// Flat extra fee in display units for a transfer of `amount`.
    fn extra_fee(&self, _amount: Decimal) -> Option<Decimal> {
        None
    }

    fn token_denomination(&self, _token: &Token) -> Option<&'static str> {
        None
    }

    fn token_fee_denomination(&self, _token: &Token) -> Option<&'static str> {
        None
    }

    fn to_smallest_unit(&self, value: Decimal) -> Result<u64, ConversionError> {
        convert_to_smallest_unit(value, self.decimal_count(), self.rounding())
    }

    fn from_smallest_unit(&self, units: u64) -> Decimal {
        convert_from_smallest_unit(units, self.decimal_count())
    }
}

/// Chains whose fees derive from gas tiers.
///
/// Fee-fixed families (Solana, XRP) do not implement this trait, so asking
/// them for gas prices does not compile.
pub trait GasPriced: ChainDescriptor {
    /// Gas price tiers in smallest units per gas, ascending. Never empty.
    fn gas_prices(&self, kind: &AmountType) -> &'static [Decimal];

    fn gas_multiplier(&self) -> u64;
}
