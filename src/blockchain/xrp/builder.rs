//! XRP `Payment` and `TrustSet` builder.

use rust_decimal::Decimal;

use crate::blockchain::xrp::codec::{
    currency_code, decode_account_id, sha512_half, Field, FieldValue, IssuedValue, TransactionType,
    XrpAmount, XrpTransaction, SIGNING_PREFIX, TRANSACTION_ID_PREFIX,
};
use crate::chain::{AmountType, ChainDescriptor, Token, XrpChain};
use crate::transaction::signature::der_encode_secp256k1;
use crate::transaction::{
    BuildError, BuildResult, EllipticCurve, TransactionBuilder, TransactionIntent, WalletPublicKey,
};

/// Require canonical signatures.
pub const TF_FULLY_CANONICAL_SIG: u32 = 0x8000_0000;
/// Disable rippling on the trust line.
pub const TF_SET_NO_RIPPLE: u32 = 0x0002_0000;

/// Marker byte that prefixes ed25519 public keys on the ledger.
const ED25519_KEY_PREFIX: u8 = 0xED;

/// An issued currency: code plus issuing account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedCurrency {
    pub currency: String,
    pub issuer: String,
}

impl IssuedCurrency {
    /// Parses `CUR.rIssuer`; a bare issuer takes the token symbol as its code.
    pub fn from_token(token: &Token) -> Self {
        match token.contract_address.split_once('.') {
            Some((currency, issuer)) => Self {
                currency: currency.to_string(),
                issuer: issuer.to_string(),
            },
            None => Self {
                currency: token.symbol.clone(),
                issuer: token.contract_address.clone(),
            },
        }
    }

    fn amount(&self, value: IssuedValue) -> BuildResult<XrpAmount> {
        Ok(XrpAmount::Issued {
            value,
            currency: currency_code(&self.currency)?,
            issuer: decode_account_id(&self.issuer)?,
        })
    }
}

/// A transaction awaiting its signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XrpUnsignedTransaction {
    pub transaction: XrpTransaction,
}

/// Signed blob ready for `submit`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XrpSignedTransaction {
    /// Upper-case hex `tx_blob`.
    pub blob: String,
    /// Upper-case hex transaction hash.
    pub hash: String,
}

/// Builds transactions for one account.
#[derive(Debug, Clone)]
pub struct XrpTransactionBuilder {
    chain: XrpChain,
    public_key: WalletPublicKey,
    account: String,
    sequence: Option<u32>,
    last_ledger_sequence: Option<u32>,
}

impl XrpTransactionBuilder {
    pub fn new(account: impl Into<String>, public_key: WalletPublicKey) -> BuildResult<Self> {
        let account = account.into();
        decode_account_id(&account)?;
        match public_key.curve {
            EllipticCurve::Secp256k1 => {
                k256::PublicKey::from_sec1_bytes(&public_key.key)
                    .map_err(|e| BuildError::InvalidPublicKey(e.to_string()))?;
                if public_key.key.len() != 33 {
                    return Err(BuildError::InvalidPublicKey("expected a compressed key".into()));
                }
            }
            EllipticCurve::Ed25519 => {
                if public_key.key.len() != 32 {
                    return Err(BuildError::InvalidPublicKey(format!(
                        "expected 32-byte ed25519 key, got {} bytes",
                        public_key.key.len()
                    )));
                }
            }
        }
        Ok(Self {
            chain: XrpChain,
            public_key,
            account,
            sequence: None,
            last_ledger_sequence: None,
        })
    }

    pub fn set_sequence(&mut self, sequence: u32) {
        self.sequence = Some(sequence);
    }

    pub fn sequence(&self) -> Option<u32> {
        self.sequence
    }

    pub fn set_last_ledger_sequence(&mut self, ledger: Option<u32>) {
        self.last_ledger_sequence = ledger;
    }

    /// `SigningPubKey` bytes as the ledger expects them.
    fn signing_public_key(&self) -> Vec<u8> {
        match self.public_key.curve {
            EllipticCurve::Secp256k1 => self.public_key.key.clone(),
            EllipticCurve::Ed25519 => {
                let mut key = Vec::with_capacity(33);
                key.push(ED25519_KEY_PREFIX);
                key.extend_from_slice(&self.public_key.key);
                key
            }
        }
    }

    fn base(&self, kind: TransactionType, flags: u32, sequence: u32, fee: Decimal) -> BuildResult<XrpTransaction> {
        let fee = self.chain.to_smallest_unit(fee)?;
        let mut tx = XrpTransaction::new(kind);
        tx.set(Field::FLAGS, FieldValue::UInt32(flags))
            .set(Field::SEQUENCE, FieldValue::UInt32(sequence))
            .set(Field::FEE, FieldValue::Amount(XrpAmount::Drops(fee)))
            .set(Field::SIGNING_PUB_KEY, FieldValue::Blob(self.signing_public_key()))
            .set(Field::ACCOUNT, FieldValue::Account(decode_account_id(&self.account)?));
        if let Some(ledger) = self.last_ledger_sequence {
            tx.set(Field::LAST_LEDGER_SEQUENCE, FieldValue::UInt32(ledger));
        }
        Ok(tx)
    }

    fn current_sequence(&self) -> BuildResult<u32> {
        self.sequence.ok_or(BuildError::MissingChainState("account sequence"))
    }

    /// A `Payment` at `sequence`.
    pub fn payment(&self, intent: &TransactionIntent, sequence: u32) -> BuildResult<XrpUnsignedTransaction> {
        let amount = match &intent.amount.kind {
            AmountType::Coin => XrpAmount::Drops(self.chain.to_smallest_unit(intent.amount.value)?),
            AmountType::Token(token) => {
                IssuedCurrency::from_token(token).amount(IssuedValue::from_decimal(intent.amount.value)?)?
            }
            AmountType::Reserve | AmountType::FeeResource => return Err(BuildError::InvalidAmountType),
        };

        let mut tx = self.base(TransactionType::Payment, TF_FULLY_CANONICAL_SIG, sequence, intent.fee.amount.value)?;
        tx.set(Field::AMOUNT, FieldValue::Amount(amount))
            .set(
                Field::DESTINATION,
                FieldValue::Account(decode_account_id(&intent.destination_address)?),
            );
        if let Some(tag) = intent.destination_tag() {
            tx.set(Field::DESTINATION_TAG, FieldValue::UInt32(tag));
        }
        Ok(XrpUnsignedTransaction { transaction: tx })
    }

    /// A `TrustSet` opening an unlimited trust line with rippling disabled.
    pub fn trust_set(&self, token: &Token, fee: Decimal, sequence: u32) -> BuildResult<XrpUnsignedTransaction> {
        let limit = IssuedCurrency::from_token(token).amount(IssuedValue::MAX)?;
        let mut tx = self.base(
            TransactionType::TrustSet,
            TF_FULLY_CANONICAL_SIG | TF_SET_NO_RIPPLE,
            sequence,
            fee,
        )?;
        tx.set(Field::LIMIT_AMOUNT, FieldValue::Amount(limit));
        Ok(XrpUnsignedTransaction { transaction: tx })
    }

    /// Bytes handed to the signer for `unsigned`.
    ///
    /// secp256k1 signs the SHA-512-half digest; ed25519 signs the prefixed
    /// blob itself.
    pub fn signing_data(&self, unsigned: &XrpUnsignedTransaction) -> BuildResult<Vec<u8>> {
        let blob = unsigned.transaction.serialize(true)?;
        Ok(match self.public_key.curve {
            EllipticCurve::Secp256k1 => sha512_half(&[&SIGNING_PREFIX, &blob]).to_vec(),
            EllipticCurve::Ed25519 => [SIGNING_PREFIX.as_slice(), &blob].concat(),
        })
    }
}

impl TransactionBuilder for XrpTransactionBuilder {
    type Unsigned = XrpUnsignedTransaction;
    type Payload = XrpSignedTransaction;

    fn build_for_sign(&self, intent: &TransactionIntent) -> BuildResult<(Self::Unsigned, Vec<u8>)> {
        let unsigned = self.payment(intent, self.current_sequence()?)?;
        let data = self.signing_data(&unsigned)?;
        Ok((unsigned, data))
    }

    fn build_for_send(&self, unsigned: &Self::Unsigned, signature: &[u8]) -> BuildResult<Self::Payload> {
        let signature = match self.public_key.curve {
            EllipticCurve::Secp256k1 => der_encode_secp256k1(signature)?,
            EllipticCurve::Ed25519 if signature.len() == 64 => signature.to_vec(),
            EllipticCurve::Ed25519 => {
                return Err(BuildError::InvalidSignature(format!(
                    "expected 64-byte ed25519 signature, got {}",
                    signature.len()
                )))
            }
        };

        let mut signed = unsigned.transaction.clone();
        signed.set(Field::TXN_SIGNATURE, FieldValue::Blob(signature));
        let blob = signed.serialize(false)?;
        let hash = sha512_half(&[&TRANSACTION_ID_PREFIX, &blob]);
        Ok(XrpSignedTransaction {
            blob: hex::encode_upper(&blob),
            hash: hex::encode_upper(hash),
        })
    }
}
