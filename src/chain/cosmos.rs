//! Cosmos SDK family descriptors.

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::chain::amount::{AmountType, RoundingPolicy, Token};
use crate::chain::descriptor::{ChainDescriptor, FeePaidCurrency, GasPriced};

static COSMOS_GAS_PRICES: [Decimal; 3] = [dec!(0.01), dec!(0.025), dec!(0.04)];
static GAIA_GAS_PRICES: [Decimal; 1] = [dec!(0.001)];
static TERRA_V1_GAS_PRICES: [Decimal; 1] = [dec!(28.325)];
static TERRA_V1_USD_GAS_PRICES: [Decimal; 1] = [dec!(1)];
static TERRA_V2_GAS_PRICES: [Decimal; 3] = [dec!(0.015), dec!(0.025), dec!(0.040)];

/// Denomination of the USTC stablecoin on TerraV1.
pub const TERRA_V1_USD_DENOM: &str = "uusd";

/// Chains built on the Cosmos SDK bank module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CosmosChain {
    Cosmos { testnet: bool },
    /// Legacy test network used by signing vectors.
    Gaia,
    TerraV1,
    TerraV2,
}

impl CosmosChain {
    pub fn all() -> [CosmosChain; 5] {
        [
            CosmosChain::Cosmos { testnet: false },
            CosmosChain::Cosmos { testnet: true },
            CosmosChain::Gaia,
            CosmosChain::TerraV1,
            CosmosChain::TerraV2,
        ]
    }

    /// Bech32 human-readable address prefix.
    pub fn address_prefix(&self) -> &'static str {
        match self {
            CosmosChain::Cosmos { .. } | CosmosChain::Gaia => "cosmos",
            CosmosChain::TerraV1 | CosmosChain::TerraV2 => "terra",
        }
    }

    fn is_terra_usd(&self, token: &Token) -> bool {
        matches!(self, CosmosChain::TerraV1) && token.contract_address == TERRA_V1_USD_DENOM
    }
}

impl ChainDescriptor for CosmosChain {
    fn display_name(&self) -> &'static str {
        match self {
            CosmosChain::Cosmos { testnet: false } => "Cosmos",
            CosmosChain::Cosmos { testnet: true } => "Cosmos Testnet",
            CosmosChain::Gaia => "Gaia",
            CosmosChain::TerraV1 => "Terra Classic",
            CosmosChain::TerraV2 => "Terra",
        }
    }

    fn currency_symbol(&self) -> &'static str {
        match self {
            CosmosChain::Cosmos { .. } => "ATOM",
            CosmosChain::Gaia => "MUON",
            CosmosChain::TerraV1 => "LUNC",
            CosmosChain::TerraV2 => "LUNA",
        }
    }

    fn smallest_denomination(&self) -> &'static str {
        match self {
            CosmosChain::Cosmos { .. } => "uatom",
            CosmosChain::Gaia => "muon",
            CosmosChain::TerraV1 | CosmosChain::TerraV2 => "uluna",
        }
    }

    fn chain_id(&self) -> &'static str {
        match self {
            CosmosChain::Cosmos { testnet: false } => "cosmoshub-4",
            CosmosChain::Cosmos { testnet: true } => "theta-testnet-001",
            CosmosChain::Gaia => "gaia-13003",
            CosmosChain::TerraV1 => "columbus-5",
            CosmosChain::TerraV2 => "phoenix-1",
        }
    }

    fn decimal_count(&self) -> u32 {
        6
    }

    fn is_testnet(&self) -> bool {
        matches!(self, CosmosChain::Cosmos { testnet: true } | CosmosChain::Gaia)
    }

    fn allows_fee_selection(&self) -> bool {
        matches!(self, CosmosChain::Cosmos { .. } | CosmosChain::TerraV2)
    }

    fn rounding(&self) -> RoundingPolicy {
        RoundingPolicy::Down
    }

    fn fee_multiplier(&self) -> Decimal {
        match self {
            CosmosChain::TerraV1 => dec!(1.5),
            _ => Decimal::ONE,
        }
    }

    fn fee_paid_currency(&self) -> FeePaidCurrency {
        match self {
            CosmosChain::TerraV1 => FeePaidCurrency::SameCurrency,
            _ => FeePaidCurrency::Coin,
        }
    }

    fn tax_percentage(&self, kind: &AmountType) -> Option<Decimal> {
        match kind {
            AmountType::Token(token) if self.is_terra_usd(token) => Some(dec!(0.2)),
            _ => None,
        }
    }

    fn extra_fee(&self, amount: Decimal) -> Option<Decimal> {
        match self {
            CosmosChain::TerraV1 => Some(amount * dec!(0.005)),
            _ => None,
        }
    }

    fn token_denomination(&self, token: &Token) -> Option<&'static str> {
        self.is_terra_usd(token).then_some(TERRA_V1_USD_DENOM)
    }

    fn token_fee_denomination(&self, token: &Token) -> Option<&'static str> {
        self.is_terra_usd(token).then_some(TERRA_V1_USD_DENOM)
    }
}

impl GasPriced for CosmosChain {
    fn gas_prices(&self, kind: &AmountType) -> &'static [Decimal] {
        match self {
            CosmosChain::Cosmos { .. } => &COSMOS_GAS_PRICES,
            CosmosChain::Gaia => &GAIA_GAS_PRICES,
            CosmosChain::TerraV1 => match kind {
                AmountType::Token(token) if self.is_terra_usd(token) => &TERRA_V1_USD_GAS_PRICES,
                _ => &TERRA_V1_GAS_PRICES,
            },
            CosmosChain::TerraV2 => &TERRA_V2_GAS_PRICES,
        }
    }

    fn gas_multiplier(&self) -> u64 {
        match self {
            CosmosChain::Gaia => 1,
            CosmosChain::TerraV1 => 4,
            CosmosChain::Cosmos { .. } | CosmosChain::TerraV2 => 2,
        }
    }
}
