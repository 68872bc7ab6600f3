//! One handle over every chain family's wallet manager.

use crate::blockchain::cosmos::CosmosWalletManager;
use crate::blockchain::solana::SolanaWalletManager;
use crate::blockchain::wallet::Wallet;
use crate::blockchain::xrp::XrpWalletManager;
use crate::chain::{Amount, Chain, XrpChain};
use crate::error::WalletError;
use crate::transaction::{Fee, TransactionIntent, TransactionSendResult, TransactionSigner};

#[derive(Debug)]
pub enum WalletManager {
    Cosmos(CosmosWalletManager),
    Solana(SolanaWalletManager),
    Xrp(XrpWalletManager),
}

impl WalletManager {
    pub fn chain(&self) -> Chain {
        match self {
            WalletManager::Cosmos(m) => Chain::Cosmos(m.chain()),
            WalletManager::Solana(m) => Chain::Solana(m.chain()),
            WalletManager::Xrp(_) => Chain::Xrp(XrpChain),
        }
    }

    pub fn wallet(&self) -> Wallet {
        match self {
            WalletManager::Cosmos(m) => m.wallet(),
            WalletManager::Solana(m) => m.wallet(),
            WalletManager::Xrp(m) => m.wallet(),
        }
    }

    pub fn current_host(&self) -> String {
        match self {
            WalletManager::Cosmos(m) => m.current_host(),
            WalletManager::Solana(m) => m.current_host(),
            WalletManager::Xrp(m) => m.current_host(),
        }
    }

    pub async fn update(&self) -> Result<(), WalletError> {
        let result = match self {
            WalletManager::Cosmos(m) => m.update().await,
            WalletManager::Solana(m) => m.update().await,
            WalletManager::Xrp(m) => m.update().await,
        };
        if let Err(e) = &result {
            e.report("update");
        }
        result
    }

    pub async fn get_fee(&self, amount: &Amount, destination: &str) -> Result<Vec<Fee>, WalletError> {
        let result = match self {
            WalletManager::Cosmos(m) => m.get_fee(amount, destination).await,
            WalletManager::Solana(m) => m.get_fee(amount, destination).await,
            WalletManager::Xrp(m) => m.get_fee(amount, destination).await,
        };
        if let Err(e) = &result {
            e.report("get_fee");
        }
        result
    }

    pub async fn send(
        &self,
        intent: &TransactionIntent,
        signer: &dyn TransactionSigner,
    ) -> Result<TransactionSendResult, WalletError> {
        let result = match self {
            WalletManager::Cosmos(m) => m.send(intent, signer).await,
            WalletManager::Solana(m) => m.send(intent, signer).await,
            WalletManager::Xrp(m) => m.send(intent, signer).await,
        };
        if let Err(e) = &result {
            e.report("send");
        }
        result
    }
}
