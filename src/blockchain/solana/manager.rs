//! Solana wallet manager.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError, RwLock};
use std::time::Duration;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;

use crate::blockchain::solana::builder::{
    associated_token_address, compute_budget_for, SolanaTransactionBuilder, TokenProgram,
};
use crate::blockchain::solana::message::Pubkey;
use crate::blockchain::solana::network::SolanaNetworkService;
use crate::blockchain::wallet::Wallet;
use crate::chain::{convert_from_smallest_unit, Amount, AmountType, ChainDescriptor, SolanaChain, Token};
use crate::error::WalletError;
use crate::observability::metrics;
use crate::pending::{PendingTransactionRecord, PendingTransactionStore};
use crate::transaction::{
    BuildError, Fee, FeeParameters, TransactionBuilder, TransactionIntent, TransactionSendResult,
    TransactionSigner, WalletPublicKey,
};

/// Account sync, fee estimation and sending for one Solana address.
#[derive(Debug)]
pub struct SolanaWalletManager {
    chain: SolanaChain,
    wallet: RwLock<Wallet>,
    builder: Mutex<SolanaTransactionBuilder>,
    network: SolanaNetworkService,
    tokens: Vec<Token>,
    /// Size of the owner's token account per mint, reused for new destination accounts.
    token_account_spaces: RwLock<HashMap<String, u64>>,
}

impl SolanaWalletManager {
    pub fn new(
        chain: SolanaChain,
        address: impl Into<String>,
        public_key: WalletPublicKey,
        tokens: Vec<Token>,
        network: SolanaNetworkService,
    ) -> Result<Self, WalletError> {
        let builder = SolanaTransactionBuilder::new(&public_key.key, chain)?;
        Ok(Self {
            chain,
            wallet: RwLock::new(Wallet::new(address, public_key, PendingTransactionStore::new(None))),
            builder: Mutex::new(builder),
            network,
            tokens,
            token_account_spaces: RwLock::new(HashMap::new()),
        })
    }

    /// Drop pending records older than `ttl` on each update.
    pub fn with_pending_ttl(self, ttl: Option<Duration>) -> Self {
        self.wallet.write().unwrap_or_else(PoisonError::into_inner).pending = PendingTransactionStore::new(ttl);
        self
    }

    pub fn chain(&self) -> SolanaChain {
        self.chain
    }

    pub fn wallet(&self) -> Wallet {
        self.wallet.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn current_host(&self) -> String {
        self.network.current_host()
    }

    pub async fn update(&self) -> Result<(), WalletError> {
        let (address, pending) = {
            let wallet = self.wallet.read().unwrap_or_else(PoisonError::into_inner);
            (wallet.address.clone(), wallet.pending.clone())
        };

        let info = self.network.account_info(&address, &pending).await?;

        {
            let mut builder = self.builder.lock().unwrap_or_else(PoisonError::into_inner);
            for (mint, program) in &info.tokens.programs {
                builder.set_token_program(mint.clone(), *program);
            }
        }
        self.token_account_spaces
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .extend(info.tokens.spaces.clone());

        let mut wallet = self.wallet.write().unwrap_or_else(PoisonError::into_inner);
        wallet
            .balances
            .set(Amount::coin(&self.chain, self.chain.from_smallest_unit(info.lamports)));
        for token in &self.tokens {
            let units = info.tokens.balances.get(&token.contract_address).copied().unwrap_or(0);
            let value = convert_from_smallest_unit(units, token.decimal_count);
            wallet.balances.set(Amount::token(token.clone(), value));
        }

        metrics::record_pending_transactions(self.chain.display_name(), wallet.pending.len());
        tracing::debug!(
            chain = self.chain.display_name(),
            lamports = info.lamports,
            confirmed = info.reconciled.confirmed.len(),
            "Solana account updated"
        );
        Ok(())
    }

    /// The program owning `token`'s mint, asking the network once per mint.
    async fn token_program(&self, token: &Token) -> Result<TokenProgram, WalletError> {
        let cached = self
            .builder
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .token_program(&token.contract_address);
        if let Some(program) = cached {
            return Ok(program);
        }

        let program = self.network.token_program(&token.contract_address).await?;
        self.builder
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .set_token_program(token.contract_address.clone(), program);
        Ok(program)
    }

    /// The account a transfer of `kind` credits: the destination itself for
    /// coins, its associated token account for tokens.
    async fn receiving_account(
        &self,
        kind: &AmountType,
        destination: &str,
    ) -> Result<(String, Option<TokenProgram>), WalletError> {
        let AmountType::Token(token) = kind else {
            return Ok((destination.to_string(), None));
        };
        let program = self.token_program(token).await?;
        let owner = Pubkey::from_base58(destination)?;
        let mint = Pubkey::from_base58(&token.contract_address)?;
        let account = associated_token_address(&owner, &mint, program)?;
        Ok((account.to_base58(), Some(program)))
    }

    /// The single network fee for sending `amount` to `destination`.
    ///
    /// When a token transfer must create the destination's token account, its
    /// rent exemption is added to the fee. Coin transfers to new accounts are
    /// checked by [`Self::validate_destination_for_rent_exemption`] instead.
    pub async fn get_fee(&self, amount: &Amount, destination: &str) -> Result<Vec<Fee>, WalletError> {
        let (account, program) = self.receiving_account(&amount.kind, destination).await?;
        let exists = self.network.account_exists(&account).await?;
        let parameters = compute_budget_for(exists);
        let blockhash = self.network.latest_blockhash().await?;

        let source = self.wallet.read().unwrap_or_else(PoisonError::into_inner).address.clone();
        let draft = TransactionIntent::new(
            amount.clone(),
            Fee::with_parameters(Amount::coin(&self.chain, rust_decimal::Decimal::ZERO), parameters.clone()),
            source,
            destination,
        );
        let message = {
            let mut builder = self.builder.lock().unwrap_or_else(PoisonError::into_inner);
            builder.set_recent_blockhash(&blockhash)?;
            builder.build_message(&draft)?
        };

        let mut lamports = self.network.fee_for_message(&BASE64.encode(message)).await?;
        if let (false, AmountType::Token(token), Some(program)) = (exists, &amount.kind, program) {
            let space = self
                .token_account_spaces
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .get(&token.contract_address)
                .copied()
                .unwrap_or_else(|| program.base_account_space());
            let rent = self.network.minimum_balance_for_rent_exemption(space).await?;
            lamports = lamports.saturating_add(rent);
        }

        let fee = Amount::coin(&self.chain, self.chain.from_smallest_unit(lamports));
        Ok(vec![Fee::with_parameters(fee, parameters)])
    }

    /// Reject a coin transfer that would create an account below its rent-exempt minimum.
    pub async fn validate_destination_for_rent_exemption(&self, amount: &Amount, fee: &Fee) -> Result<(), WalletError> {
        if amount.kind != AmountType::Coin {
            return Ok(());
        }
        let Some(FeeParameters::Solana {
            destination_account_exists: false,
            ..
        }) = fee.parameters
        else {
            return Ok(());
        };

        // A plain system account has no data.
        let minimum = self.network.minimum_balance_for_rent_exemption(0).await?;
        let lamports = self.chain.to_smallest_unit(amount.value).map_err(BuildError::from)?;
        if lamports < minimum {
            return Err(BuildError::BelowRentExemption {
                minimum: self.chain.from_smallest_unit(minimum),
            }
            .into());
        }
        Ok(())
    }

    /// Fetch a fresh blockhash, then build, sign and submit `intent`.
    pub async fn send(
        &self,
        intent: &TransactionIntent,
        signer: &dyn TransactionSigner,
    ) -> Result<TransactionSendResult, WalletError> {
        self.validate_destination_for_rent_exemption(&intent.amount, &intent.fee)
            .await?;
        if let AmountType::Token(token) = &intent.amount.kind {
            self.token_program(token).await?;
        }

        let public_key = self.wallet.read().unwrap_or_else(PoisonError::into_inner).public_key.clone();
        let blockhash = self.network.latest_blockhash().await?;

        let (unsigned, message) = {
            let mut builder = self.builder.lock().unwrap_or_else(PoisonError::into_inner);
            builder.set_recent_blockhash(&blockhash)?;
            builder.build_for_sign(intent)?
        };
        let signature = signer.sign(&message, &public_key).await?;
        let payload = self
            .builder
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .build_for_send(&unsigned, &signature)?;

        let tx_hash = self.network.send(&payload).await?;

        let wallet = self.wallet.read().unwrap_or_else(PoisonError::into_inner);
        wallet.pending.insert(PendingTransactionRecord::new(
            tx_hash.clone(),
            intent.source_address.clone(),
            intent.destination_address.clone(),
            intent.amount.clone(),
            intent.fee.amount.clone(),
        ));

        tracing::info!(chain = self.chain.display_name(), hash = %tx_hash, "Transaction submitted");
        Ok(TransactionSendResult {
            hash: tx_hash,
            current_provider_host: self.network.current_host(),
        })
    }
}
