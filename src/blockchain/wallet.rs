//! Wallet state shared by the chain managers.
//!
//! # Security
//! - Wallets hold public keys only; signing is delegated to a `TransactionSigner`

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use thiserror::Error;

use crate::chain::{Amount, AmountType, Token};
use crate::pending::PendingTransactionStore;
use crate::transaction::WalletPublicKey;

/// Which balance an entry describes.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum BalanceKey {
    Coin,
    /// Keyed by contract address (or denomination / issuer).
    Token(String),
    Reserve,
}

impl BalanceKey {
    pub fn for_amount_type(kind: &AmountType) -> Option<Self> {
        match kind {
            AmountType::Coin => Some(BalanceKey::Coin),
            AmountType::Token(token) => Some(BalanceKey::Token(token.contract_address.clone())),
            AmountType::Reserve => Some(BalanceKey::Reserve),
            AmountType::FeeResource => None,
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("duplicate balance entry {0:?}")]
pub struct DuplicateBalance(pub BalanceKey);

/// Balances with unique keys.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BalanceMap {
    entries: BTreeMap<BalanceKey, Amount>,
}

impl BalanceMap {
    /// Build from entries, rejecting repeated keys.
    pub fn from_entries<I>(entries: I) -> Result<Self, DuplicateBalance>
    where
        I: IntoIterator<Item = Amount>,
    {
        let mut map = BalanceMap::default();
        for amount in entries {
            let Some(key) = BalanceKey::for_amount_type(&amount.kind) else {
                continue;
            };
            if map.entries.contains_key(&key) {
                return Err(DuplicateBalance(key));
            }
            map.entries.insert(key, amount);
        }
        Ok(map)
    }

    /// Replace the balance for the amount's key.
    pub fn set(&mut self, amount: Amount) {
        if let Some(key) = BalanceKey::for_amount_type(&amount.kind) {
            self.entries.insert(key, amount);
        }
    }

    pub fn get(&self, key: &BalanceKey) -> Option<&Amount> {
        self.entries.get(key)
    }

    pub fn coin(&self) -> Option<Decimal> {
        self.entries.get(&BalanceKey::Coin).map(|a| a.value)
    }

    pub fn token(&self, token: &Token) -> Option<Decimal> {
        self.entries
            .get(&BalanceKey::Token(token.contract_address.clone()))
            .map(|a| a.value)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&BalanceKey, &Amount)> {
        self.entries.iter()
    }
}

/// One address on one chain.
#[derive(Debug, Clone)]
pub struct Wallet {
    pub address: String,
    pub public_key: WalletPublicKey,
    pub balances: BalanceMap,
    pub pending: PendingTransactionStore,
}

impl Wallet {
    pub fn new(address: impl Into<String>, public_key: WalletPublicKey, pending: PendingTransactionStore) -> Self {
        Self {
            address: address.into(),
            public_key,
            balances: BalanceMap::default(),
            pending,
        }
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::XrpChain;
    use rust_decimal_macros::dec;

    #[test]
    fn test_duplicate_keys_rejected() {
        let usd = Token::new("USD", "USD", "rIssuer", 15);
        let result = BalanceMap::from_entries([
            Amount::coin(&XrpChain, dec!(10)),
            Amount::token(usd.clone(), dec!(1)),
            Amount::token(usd, dec!(2)),
        ]);
        assert_eq!(
            result.unwrap_err(),
            DuplicateBalance(BalanceKey::Token("rIssuer".into()))
        );
    }

    #[test]
    fn test_set_replaces() {
        let mut balances = BalanceMap::from_entries([Amount::coin(&XrpChain, dec!(10))]).unwrap();
        balances.set(Amount::coin(&XrpChain, dec!(12)));
        assert_eq!(balances.len(), 1);
        assert_eq!(balances.coin(), Some(dec!(12)));
    }
}
