//! Fee tier computation.
//!
//! # Responsibilities
//! - Gas-priced chains: gas used → ordered fee tiers
//! - Oracle-priced chains: oracle drops → ordered fee tiers
//! - Overflow of the integer domain is reported, never wrapped

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;

use crate::chain::{convert_from_smallest_unit, Amount, AmountType, FeePaidCurrency, GasPriced};
use crate::transaction::{BuildError, BuildResult, Fee, FeeParameters};

/// Fee tiers for a gas-priced transfer of `amount` that simulated at `gas_used`.
///
/// Output order equals the descriptor's tier order; the first tier is the default.
pub fn gas_fee_tiers<C>(chain: &C, gas_used: u64, amount: &Amount) -> BuildResult<Vec<Fee>>
where
    C: GasPriced + ?Sized,
{
    let gas = gas_used.checked_mul(chain.gas_multiplier()).ok_or_else(|| {
        BuildError::AmountOverflow(format!("gas {gas_used} × {}", chain.gas_multiplier()))
    })?;

    let (fee_kind, fee_decimals) = fee_denomination(chain, amount);

    let tax_units = match chain.tax_percentage(&amount.kind) {
        Some(percent) => {
            let units = Decimal::from(amount.to_smallest_unit(chain.rounding())?);
            to_units(units * percent / Decimal::ONE_HUNDRED)?
        }
        None => 0,
    };
    let extra = chain.extra_fee(amount.value);

    chain
        .gas_prices(&amount.kind)
        .iter()
        .map(|price| {
            let raw = Decimal::from(gas)
                .checked_mul(*price)
                .and_then(|v| v.checked_mul(chain.fee_multiplier()))
                .ok_or_else(|| BuildError::AmountOverflow(format!("gas {gas} × price {price}")))?;
            let units = to_units(raw)?
                .checked_add(tax_units)
                .ok_or_else(|| BuildError::AmountOverflow("fee + tax".into()))?;

            let mut value = convert_from_smallest_unit(units, fee_decimals);
            if let Some(extra) = extra {
                value += extra;
            }

            Ok(Fee::with_parameters(
                Amount::new(fee_kind.clone(), value, fee_decimals),
                FeeParameters::Cosmos { gas },
            ))
        })
        .collect()
}

/// Denomination and precision a gas-priced fee is expressed in.
fn fee_denomination<C: GasPriced + ?Sized>(chain: &C, amount: &Amount) -> (AmountType, u32) {
    match (&amount.kind, chain.fee_paid_currency()) {
        (AmountType::Token(token), FeePaidCurrency::SameCurrency) => {
            (amount.kind.clone(), token.decimal_count)
        }
        _ => (AmountType::Coin, chain.decimal_count()),
    }
}

/// Floor into u64 smallest units.
fn to_units(value: Decimal) -> BuildResult<u64> {
    value
        .floor()
        .to_u64()
        .ok_or_else(|| BuildError::AmountOverflow(value.to_string()))
}

/// Fee tiers from oracle-quoted smallest units, optionally doubled.
pub fn oracle_fee_tiers(
    tiers_in_units: &[u64],
    decimals: u32,
    double: bool,
) -> BuildResult<Vec<Fee>> {
    tiers_in_units
        .iter()
        .map(|units| {
            let units = if double {
                units
                    .checked_mul(2)
                    .ok_or_else(|| BuildError::AmountOverflow(format!("{units} × 2")))?
            } else {
                *units
            };
            let value = convert_from_smallest_unit(units, decimals);
            Ok(Fee::new(Amount::new(AmountType::Coin, value, decimals)))
        })
        .collect()
}
