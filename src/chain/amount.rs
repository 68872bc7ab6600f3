//! Amounts and the decimal/smallest-unit converter.
//!
//! # Responsibilities
//! - Represent a value together with what it is denominated in
//! - Convert display values to integer smallest units and back
//!
//! # Design Decisions
//! - Decimal arithmetic only; binary floats never touch an amount
//! - The rounding policy belongs to the chain, never to the call site

use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Highest scale a `Decimal` can carry.
const MAX_SCALE: u32 = 28;

/// How a chain rounds display values into smallest units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RoundingPolicy {
    /// Banker's rounding.
    HalfEven,
    /// Truncate toward zero.
    Down,
}

impl RoundingPolicy {
    fn strategy(self) -> RoundingStrategy {
        match self {
            RoundingPolicy::HalfEven => RoundingStrategy::MidpointNearestEven,
            RoundingPolicy::Down => RoundingStrategy::ToZero,
        }
    }
}

/// Errors raised while converting amounts.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConversionError {
    #[error("negative amount {0}")]
    Negative(Decimal),

    #[error("amount {value} does not fit into u64 at {decimals} decimals")]
    Overflow { value: Decimal, decimals: u32 },

    #[error("unsupported decimal count {0}")]
    UnsupportedDecimals(u32),
}

/// A fungible token living on a chain.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Token {
    pub name: String,
    pub symbol: String,
    pub contract_address: String,
    pub decimal_count: u32,
}

impl Token {
    pub fn new(
        name: impl Into<String>,
        symbol: impl Into<String>,
        contract_address: impl Into<String>,
        decimal_count: u32,
    ) -> Self {
        Self {
            name: name.into(),
            symbol: symbol.into(),
            contract_address: contract_address.into(),
            decimal_count,
        }
    }
}

/// What an amount is denominated in.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AmountType {
    Coin,
    Token(Token),
    Reserve,
    FeeResource,
}

impl AmountType {
    pub fn token(&self) -> Option<&Token> {
        match self {
            AmountType::Token(token) => Some(token),
            _ => None,
        }
    }
}

/// A display-unit value with its denomination and precision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Amount {
    pub kind: AmountType,
    pub value: Decimal,
    pub decimals: u32,
}

impl Amount {
    pub fn new(kind: AmountType, value: Decimal, decimals: u32) -> Self {
        Self { kind, value, decimals }
    }

    /// An amount of a token, at the token's own precision.
    pub fn token(token: Token, value: Decimal) -> Self {
        let decimals = token.decimal_count;
        Self::new(AmountType::Token(token), value, decimals)
    }

    pub fn is_zero(&self) -> bool {
        self.value.is_zero()
    }

    /// Converts into smallest units under `policy`.
    pub fn to_smallest_unit(&self, policy: RoundingPolicy) -> Result<u64, ConversionError> {
        convert_to_smallest_unit(self.value, self.decimals, policy)
    }
}

fn scale_factor(decimals: u32) -> Result<Decimal, ConversionError> {
    10u64
        .checked_pow(decimals)
        .map(Decimal::from)
        .ok_or(ConversionError::UnsupportedDecimals(decimals))
}

/// Converts a display value into integer smallest units.
pub fn convert_to_smallest_unit(
    value: Decimal,
    decimals: u32,
    policy: RoundingPolicy,
) -> Result<u64, ConversionError> {
    if value.is_sign_negative() && !value.is_zero() {
        return Err(ConversionError::Negative(value));
    }

    let overflow = || ConversionError::Overflow { value, decimals };
    let scaled = value.checked_mul(scale_factor(decimals)?).ok_or_else(overflow)?;

    scaled
        .round_dp_with_strategy(0, policy.strategy())
        .to_u64()
        .ok_or_else(overflow)
}

/// Converts integer smallest units into a display value.
pub fn convert_from_smallest_unit(units: u64, decimals: u32) -> Decimal {
    let mut value = Decimal::from(units);
    // Scales above MAX_SCALE are clamped; no chain or token table carries one.
    if value.set_scale(decimals.min(MAX_SCALE)).is_err() {
        return Decimal::from(units);
    }
    value.normalize()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_to_smallest_unit_rounding() {
        assert_eq!(
            convert_to_smallest_unit(dec!(0.0000025), 6, RoundingPolicy::HalfEven).unwrap(),
            2
        );
        assert_eq!(
            convert_to_smallest_unit(dec!(0.0000035), 6, RoundingPolicy::HalfEven).unwrap(),
            4
        );
        assert_eq!(
            convert_to_smallest_unit(dec!(0.0000039), 6, RoundingPolicy::Down).unwrap(),
            3
        );
    }

    #[test]
    fn test_round_trip_at_chain_precision() {
        for value in [dec!(1.5), dec!(0.000001), dec!(123456.789012), dec!(0)] {
            let units = convert_to_smallest_unit(value, 6, RoundingPolicy::HalfEven).unwrap();
            assert_eq!(convert_from_smallest_unit(units, 6), value);
        }
        let lamports = convert_to_smallest_unit(dec!(0.000000001), 9, RoundingPolicy::HalfEven).unwrap();
        assert_eq!(lamports, 1);
        assert_eq!(convert_from_smallest_unit(lamports, 9), dec!(0.000000001));
    }

    #[test]
    fn test_negative_and_overflow() {
        assert!(matches!(
            convert_to_smallest_unit(dec!(-1), 6, RoundingPolicy::Down),
            Err(ConversionError::Negative(_))
        ));
        assert!(matches!(
            convert_to_smallest_unit(dec!(100000000000000), 6, RoundingPolicy::Down),
            Err(ConversionError::Overflow { .. })
        ));
        assert!(matches!(
            convert_to_smallest_unit(dec!(1), 25, RoundingPolicy::Down),
            Err(ConversionError::UnsupportedDecimals(25))
        ));
    }

    #[test]
    fn test_from_smallest_unit_normalizes() {
        assert_eq!(convert_from_smallest_unit(1_500_000, 6).to_string(), "1.5");
        assert_eq!(convert_from_smallest_unit(4000, 6).to_string(), "0.004");
    }
}
