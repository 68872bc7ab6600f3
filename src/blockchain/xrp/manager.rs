//! XRP wallet manager.

use std::sync::{Mutex, PoisonError, RwLock};
use std::time::{Duration, Instant};

use rust_decimal::Decimal;

use crate::blockchain::xrp::builder::{IssuedCurrency, XrpTransactionBuilder};
use crate::blockchain::xrp::network::{TrustLine, XrpNetworkService};
use crate::blockchain::wallet::Wallet;
use crate::chain::{Amount, AmountType, ChainDescriptor, Token, XrpChain};
use crate::error::WalletError;
use crate::fees::oracle_fee_tiers;
use crate::observability::metrics;
use crate::pending::{PendingTransactionRecord, PendingTransactionStore};
use crate::transaction::{
    BuildError, Fee, SignerError, TransactionBuilder, TransactionIntent, TransactionSendResult,
    TransactionSigner, WalletPublicKey,
};

/// Ledgers a transaction stays valid for after the current one.
pub const LAST_LEDGER_OFFSET: u32 = 20;

/// How long a trust line opening is reported as in progress.
pub const TRUSTLINE_OPERATION_WINDOW: Duration = Duration::from_secs(10);

/// Account sync, fee estimation and sending for one XRP account.
#[derive(Debug)]
pub struct XrpWalletManager {
    chain: XrpChain,
    wallet: RwLock<Wallet>,
    builder: Mutex<XrpTransactionBuilder>,
    network: XrpNetworkService,
    tokens: Vec<Token>,
    lines: RwLock<Vec<TrustLine>>,
    last_trustline_open_attempt: Mutex<Option<Instant>>,
}

impl XrpWalletManager {
    pub fn new(
        address: impl Into<String>,
        public_key: WalletPublicKey,
        tokens: Vec<Token>,
        network: XrpNetworkService,
    ) -> Result<Self, WalletError> {
        let address = address.into();
        let builder = XrpTransactionBuilder::new(address.clone(), public_key.clone())?;
        Ok(Self {
            chain: XrpChain,
            wallet: RwLock::new(Wallet::new(address, public_key, PendingTransactionStore::new(None))),
            builder: Mutex::new(builder),
            network,
            tokens,
            lines: RwLock::new(Vec::new()),
            last_trustline_open_attempt: Mutex::new(None),
        })
    }

    /// Drop pending records older than `ttl` on each update.
    pub fn with_pending_ttl(self, ttl: Option<Duration>) -> Self {
        self.wallet.write().unwrap_or_else(PoisonError::into_inner).pending = PendingTransactionStore::new(ttl);
        self
    }

    pub fn wallet(&self) -> Wallet {
        self.wallet.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn current_host(&self) -> String {
        self.network.current_host()
    }

    /// Sync sequence, balances, reserve and trust lines.
    pub async fn update(&self) -> Result<(), WalletError> {
        let (address, pending) = {
            let wallet = self.wallet.read().unwrap_or_else(PoisonError::into_inner);
            (wallet.address.clone(), wallet.pending.clone())
        };

        let info = self.network.account_info(&address, &pending).await?;

        {
            let mut builder = self.builder.lock().unwrap_or_else(PoisonError::into_inner);
            builder.set_sequence(info.account.sequence);
            builder.set_last_ledger_sequence(
                info.account.ledger_current_index.checked_add(LAST_LEDGER_OFFSET),
            );
        }

        let reserve_drops = info.reserve.for_owner_count(info.account.owner_count);
        let mut wallet = self.wallet.write().unwrap_or_else(PoisonError::into_inner);
        wallet.balances.set(Amount::coin(
            &self.chain,
            self.chain.from_smallest_unit(info.account.balance_drops),
        ));
        wallet.balances.set(Amount::new(
            AmountType::Reserve,
            self.chain.from_smallest_unit(reserve_drops),
            self.chain.decimal_count(),
        ));
        for token in &self.tokens {
            let value = find_line(&info.lines, token).map_or(Decimal::ZERO, |line| line.balance);
            wallet.balances.set(Amount::token(token.clone(), value));
        }
        *self.lines.write().unwrap_or_else(PoisonError::into_inner) = info.lines;

        metrics::record_pending_transactions(self.chain.display_name(), wallet.pending.len());
        tracing::debug!(
            chain = self.chain.display_name(),
            sequence = info.account.sequence,
            confirmed = info.reconciled.confirmed.len(),
            "XRP account updated"
        );
        Ok(())
    }

    /// Whether sending `token` must first disable rippling on its trust line.
    pub fn requires_no_ripple_update(&self, token: &Token) -> bool {
        let lines = self.lines.read().unwrap_or_else(PoisonError::into_inner);
        find_line(&lines, token).is_some_and(|line| !line.no_ripple)
    }

    /// Fee tiers `[minimum, open ledger, median]`.
    ///
    /// Doubled when a token transfer will be preceded by a `TrustSet`.
    pub async fn get_fee(&self, amount: &Amount, _destination: &str) -> Result<Vec<Fee>, WalletError> {
        let quote = self.network.fee().await?;
        let double = amount
            .kind
            .token()
            .is_some_and(|token| self.requires_no_ripple_update(token));
        Ok(oracle_fee_tiers(&quote.tiers(), self.chain.decimal_count(), double)?)
    }

    /// Build, sign and submit `intent`, prefixed by a `TrustSet` when the
    /// token's trust line still ripples.
    pub async fn send(
        &self,
        intent: &TransactionIntent,
        signer: &dyn TransactionSigner,
    ) -> Result<TransactionSendResult, WalletError> {
        let needs_trust_set = intent
            .amount
            .kind
            .token()
            .filter(|token| self.requires_no_ripple_update(token))
            .cloned();

        let Some(token) = needs_trust_set else {
            let hash = self.sign_and_submit_payment(intent, signer).await?;
            return Ok(self.finish(intent, hash));
        };

        // The doubled fee is split across both transactions.
        let half_fee = intent.fee.amount.value / Decimal::TWO;
        let public_key = self.wallet.read().unwrap_or_else(PoisonError::into_inner).public_key.clone();
        let (trust_set, payment, hashes) = {
            let builder = self.builder.lock().unwrap_or_else(PoisonError::into_inner);
            let sequence = builder
                .sequence()
                .ok_or(BuildError::MissingChainState("account sequence"))?;
            let mut payment_intent = intent.clone();
            payment_intent.fee.amount.value = half_fee;

            let trust_set = builder.trust_set(&token, half_fee, sequence)?;
            let next = sequence
                .checked_add(1)
                .ok_or_else(|| BuildError::AmountOverflow(format!("account sequence {sequence} has no successor")))?;
            let payment = builder.payment(&payment_intent, next)?;
            let hashes = vec![builder.signing_data(&trust_set)?, builder.signing_data(&payment)?];
            (trust_set, payment, hashes)
        };

        let signatures = signer.sign_many(&hashes, &public_key).await?;
        if signatures.len() != 2 {
            return Err(SignerError::CountMismatch {
                expected: 2,
                actual: signatures.len(),
            }
            .into());
        }

        let (trust_set, payment) = {
            let builder = self.builder.lock().unwrap_or_else(PoisonError::into_inner);
            (
                builder.build_for_send(&trust_set, &signatures[0])?,
                builder.build_for_send(&payment, &signatures[1])?,
            )
        };

        self.mark_trustline_attempt();
        self.network.submit(&trust_set.blob).await?;
        self.bump_sequence(1);
        self.network.submit(&payment.blob).await?;
        self.bump_sequence(1);

        tracing::info!(
            chain = self.chain.display_name(),
            trust_set = %trust_set.hash,
            hash = %payment.hash,
            "Trust line updated and payment submitted"
        );
        Ok(self.finish(intent, payment.hash))
    }

    /// Open a trust line for `token` with rippling disabled.
    pub async fn open_trustline(
        &self,
        token: &Token,
        fee: &Fee,
        signer: &dyn TransactionSigner,
    ) -> Result<String, WalletError> {
        let public_key = self.wallet.read().unwrap_or_else(PoisonError::into_inner).public_key.clone();
        let (unsigned, data) = {
            let builder = self.builder.lock().unwrap_or_else(PoisonError::into_inner);
            let sequence = builder
                .sequence()
                .ok_or(BuildError::MissingChainState("account sequence"))?;
            let unsigned = builder.trust_set(token, fee.amount.value, sequence)?;
            let data = builder.signing_data(&unsigned)?;
            (unsigned, data)
        };
        let signature = signer.sign(&data, &public_key).await?;
        let signed = self
            .builder
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .build_for_send(&unsigned, &signature)?;

        self.mark_trustline_attempt();
        self.network.submit(&signed.blob).await?;
        self.bump_sequence(1);
        tracing::info!(chain = self.chain.display_name(), hash = %signed.hash, "Trust line opened");
        Ok(signed.hash)
    }

    /// A trust line was opened within the last ten seconds.
    ///
    /// Best effort only: it says nothing about ledger validation.
    pub fn is_trustline_operation_in_progress(&self) -> bool {
        self.last_trustline_open_attempt
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some_and(|at| at.elapsed() < TRUSTLINE_OPERATION_WINDOW)
    }

    fn mark_trustline_attempt(&self) {
        *self
            .last_trustline_open_attempt
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(Instant::now());
    }

    async fn sign_and_submit_payment(
        &self,
        intent: &TransactionIntent,
        signer: &dyn TransactionSigner,
    ) -> Result<String, WalletError> {
        let public_key = self.wallet.read().unwrap_or_else(PoisonError::into_inner).public_key.clone();
        let (unsigned, data) = self
            .builder
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .build_for_sign(intent)?;
        let signature = signer.sign(&data, &public_key).await?;
        let signed = self
            .builder
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .build_for_send(&unsigned, &signature)?;

        self.network.submit(&signed.blob).await?;
        self.bump_sequence(1);
        tracing::info!(chain = self.chain.display_name(), hash = %signed.hash, "Transaction submitted");
        Ok(signed.hash)
    }

    fn bump_sequence(&self, by: u32) {
        let mut builder = self.builder.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(sequence) = builder.sequence() {
            builder.set_sequence(sequence.saturating_add(by));
        }
    }

    fn finish(&self, intent: &TransactionIntent, hash: String) -> TransactionSendResult {
        let wallet = self.wallet.read().unwrap_or_else(PoisonError::into_inner);
        wallet.pending.insert(PendingTransactionRecord::new(
            hash.clone(),
            intent.source_address.clone(),
            intent.destination_address.clone(),
            intent.amount.clone(),
            intent.fee.amount.clone(),
        ));
        TransactionSendResult {
            hash,
            current_provider_host: self.network.current_host(),
        }
    }
}

fn find_line<'a>(lines: &'a [TrustLine], token: &Token) -> Option<&'a TrustLine> {
    let issued = IssuedCurrency::from_token(token);
    lines
        .iter()
        .find(|line| line.issuer == issued.issuer && line.currency == issued.currency)
}
