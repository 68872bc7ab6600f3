//! Cosmos wallet manager.

use std::sync::{Mutex, PoisonError, RwLock};
use std::time::Duration;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use rust_decimal::Decimal;

use crate::blockchain::cosmos::builder::CosmosTransactionBuilder;
use crate::blockchain::cosmos::network::CosmosNetworkService;
use crate::blockchain::wallet::Wallet;
use crate::chain::{convert_from_smallest_unit, Amount, ChainDescriptor, CosmosChain, Token};
use crate::error::WalletError;
use crate::fees::gas_fee_tiers;
use crate::observability::metrics;
use crate::pending::{PendingTransactionRecord, PendingTransactionStore};
use crate::transaction::{
    Fee, FeeParameters, TransactionBuilder, TransactionIntent, TransactionSendResult,
    TransactionSigner, WalletPublicKey,
};

/// Account sync, fee estimation and sending for one Cosmos SDK address.
#[derive(Debug)]
pub struct CosmosWalletManager {
    chain: CosmosChain,
    wallet: RwLock<Wallet>,
    builder: Mutex<CosmosTransactionBuilder>,
    network: CosmosNetworkService,
    tokens: Vec<Token>,
}

impl CosmosWalletManager {
    pub fn new(
        chain: CosmosChain,
        address: impl Into<String>,
        public_key: WalletPublicKey,
        tokens: Vec<Token>,
        network: CosmosNetworkService,
    ) -> Result<Self, WalletError> {
        let builder = CosmosTransactionBuilder::new(public_key.key.clone(), chain)?;
        Ok(Self {
            chain,
            wallet: RwLock::new(Wallet::new(address, public_key, PendingTransactionStore::new(None))),
            builder: Mutex::new(builder),
            network,
            tokens,
        })
    }

    /// Drop pending records older than `ttl` on each update.
    pub fn with_pending_ttl(self, ttl: Option<Duration>) -> Self {
        self.wallet.write().unwrap_or_else(PoisonError::into_inner).pending = PendingTransactionStore::new(ttl);
        self
    }

    pub fn chain(&self) -> CosmosChain {
        self.chain
    }

    /// Snapshot of the wallet.
    pub fn wallet(&self) -> Wallet {
        self.wallet.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn current_host(&self) -> String {
        self.network.current_host()
    }

    /// Sync account numbers, balances and pending confirmations.
    pub async fn update(&self) -> Result<(), WalletError> {
        let (address, pending) = {
            let wallet = self.wallet.read().unwrap_or_else(PoisonError::into_inner);
            (wallet.address.clone(), wallet.pending.clone())
        };

        let info = self.network.account_info(&address, &pending).await?;

        {
            let mut builder = self.builder.lock().unwrap_or_else(PoisonError::into_inner);
            builder.set_account_number(info.account.account_number);
            builder.set_sequence_number(info.account.sequence);
        }

        let mut wallet = self.wallet.write().unwrap_or_else(PoisonError::into_inner);
        let coin_units = info
            .balances
            .get(self.chain.smallest_denomination())
            .copied()
            .unwrap_or(0);
        wallet
            .balances
            .set(Amount::coin(&self.chain, self.chain.from_smallest_unit(coin_units)));

        for token in &self.tokens {
            let Some(denom) = self.chain.token_denomination(token) else {
                continue;
            };
            let units = info.balances.get(denom).copied().unwrap_or(0);
            let value = convert_from_smallest_unit(units, token.decimal_count);
            wallet.balances.set(Amount::token(token.clone(), value));
        }

        metrics::record_pending_transactions(self.chain.display_name(), wallet.pending.len());
        tracing::debug!(
            chain = self.chain.display_name(),
            sequence = info.account.sequence,
            confirmed = info.reconciled.confirmed.len(),
            "Cosmos account updated"
        );
        Ok(())
    }

    /// Fee tiers for sending `amount` to `destination`, from a simulated transaction.
    pub async fn get_fee(&self, amount: &Amount, destination: &str) -> Result<Vec<Fee>, WalletError> {
        let source = self.wallet.read().unwrap_or_else(PoisonError::into_inner).address.clone();
        let zero_fee = Fee::with_parameters(
            Amount::new(amount.kind.clone(), Decimal::ZERO, amount.decimals),
            FeeParameters::Cosmos { gas: 0 },
        );
        let intent = TransactionIntent::new(amount.clone(), zero_fee, source, destination);

        let tx_bytes = self
            .builder
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .build_for_simulation(&intent)?;
        let gas_used = self.network.estimate_gas(&BASE64.encode(tx_bytes)).await?;

        Ok(gas_fee_tiers(&self.chain, gas_used, amount)?)
    }

    /// Build, sign and broadcast `intent`.
    pub async fn send(
        &self,
        intent: &TransactionIntent,
        signer: &dyn TransactionSigner,
    ) -> Result<TransactionSendResult, WalletError> {
        let public_key = self.wallet.read().unwrap_or_else(PoisonError::into_inner).public_key.clone();

        let (unsigned, hash) = self
            .builder
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .build_for_sign(intent)?;
        let signature = signer.sign(&hash, &public_key).await?;
        let payload = self
            .builder
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .build_for_send(&unsigned, &signature)?;

        let tx_hash = self.network.send(&payload).await?;

        {
            let mut builder = self.builder.lock().unwrap_or_else(PoisonError::into_inner);
            if let Some(sequence) = builder.sequence_number() {
                builder.set_sequence_number(sequence + 1);
            }
        }

        let wallet = self.wallet.read().unwrap_or_else(PoisonError::into_inner);
        wallet.pending.insert(PendingTransactionRecord::new(
            tx_hash.clone(),
            intent.source_address.clone(),
            intent.destination_address.clone(),
            intent.amount.clone(),
            intent.fee.amount.clone(),
        ));

        tracing::info!(chain = self.chain.display_name(), hash = %tx_hash, "Transaction broadcast");
        Ok(TransactionSendResult {
            hash: tx_hash,
            current_provider_host: self.network.current_host(),
        })
    }
}
