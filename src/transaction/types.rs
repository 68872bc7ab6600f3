//! Transaction intent, fee and build error definitions.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::chain::amount::{Amount, ConversionError};

/// Chain-specific fee parameters chosen during estimation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FeeParameters {
    Cosmos {
        gas: u64,
    },
    Solana {
        compute_unit_limit: u32,
        compute_unit_price: u64,
        destination_account_exists: bool,
    },
}

/// A fee option: its amount and the parameters that produce it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fee {
    pub amount: Amount,
    pub parameters: Option<FeeParameters>,
}

impl Fee {
    pub fn new(amount: Amount) -> Self {
        Self { amount, parameters: None }
    }

    pub fn with_parameters(amount: Amount, parameters: FeeParameters) -> Self {
        Self { amount, parameters: Some(parameters) }
    }
}

/// Optional per-chain transaction extras.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransactionParams {
    Memo(String),
    DestinationTag(u32),
}

/// A user's request to move value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionIntent {
    pub amount: Amount,
    pub fee: Fee,
    pub source_address: String,
    pub destination_address: String,
    pub params: Option<TransactionParams>,
}

impl TransactionIntent {
    pub fn new(
        amount: Amount,
        fee: Fee,
        source_address: impl Into<String>,
        destination_address: impl Into<String>,
    ) -> Self {
        Self {
            amount,
            fee,
            source_address: source_address.into(),
            destination_address: destination_address.into(),
            params: None,
        }
    }

    pub fn with_params(mut self, params: TransactionParams) -> Self {
        self.params = Some(params);
        self
    }

    pub fn memo(&self) -> Option<&str> {
        match &self.params {
            Some(TransactionParams::Memo(memo)) => Some(memo),
            _ => None,
        }
    }

    pub fn destination_tag(&self) -> Option<u32> {
        match self.params {
            Some(TransactionParams::DestinationTag(tag)) => Some(tag),
            _ => None,
        }
    }
}

/// Outcome of a successful broadcast.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionSendResult {
    pub hash: String,
    pub current_provider_host: String,
}

/// Errors raised while assembling a payload.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum BuildError {
    /// The amount type cannot be transferred on this chain.
    #[error("amount type is not supported by this chain")]
    InvalidAmountType,

    /// Chain state such as a sequence number or blockhash was never set.
    #[error("missing chain state: {0}")]
    MissingChainState(&'static str),

    #[error("failed to build transaction: {0}")]
    BuildFailed(String),

    #[error("no denomination known for {0}")]
    UnknownDenomination(String),

    #[error("invalid signature: {0}")]
    InvalidSignature(String),

    #[error("invalid address {0}")]
    InvalidAddress(String),

    #[error("invalid public key: {0}")]
    InvalidPublicKey(String),

    #[error("amount overflow: {0}")]
    AmountOverflow(String),

    /// A new account would be created below its rent-exempt minimum.
    #[error("amount must be at least {minimum} to create the destination account")]
    BelowRentExemption { minimum: rust_decimal::Decimal },
}

impl From<ConversionError> for BuildError {
    fn from(e: ConversionError) -> Self {
        match e {
            ConversionError::Overflow { .. } => BuildError::AmountOverflow(e.to_string()),
            other => BuildError::BuildFailed(other.to_string()),
        }
    }
}

/// Result type for payload construction.
pub type BuildResult<T> = Result<T, BuildError>;
