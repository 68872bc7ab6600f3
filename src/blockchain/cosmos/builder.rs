//! Cosmos `MsgSend` transaction builder.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use prost::Message;
use rust_decimal::Decimal;
use serde_json::json;
use sha2::{Digest, Sha256};

use crate::blockchain::cosmos::proto;
use crate::chain::{convert_to_smallest_unit, AmountType, ChainDescriptor, CosmosChain, FeePaidCurrency};
use crate::transaction::signature::{normalize_secp256k1, strip_recovery_id};
use crate::transaction::{BuildError, BuildResult, FeeParameters, TransactionBuilder, TransactionIntent};

/// Broadcast mode sent with every transaction.
pub const BROADCAST_MODE: &str = "BROADCAST_MODE_SYNC";

/// A serialized but unsigned transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CosmosUnsignedTransaction {
    pub body_bytes: Vec<u8>,
    pub auth_info_bytes: Vec<u8>,
}

/// Builds SIGN_MODE_DIRECT bank transfers for one wallet key.
#[derive(Debug, Clone)]
pub struct CosmosTransactionBuilder {
    chain: CosmosChain,
    public_key: Vec<u8>,
    sequence_number: Option<u64>,
    account_number: Option<u64>,
}

impl CosmosTransactionBuilder {
    /// `public_key` must be a compressed secp256k1 point.
    pub fn new(public_key: Vec<u8>, chain: CosmosChain) -> BuildResult<Self> {
        k256::PublicKey::from_sec1_bytes(&public_key)
            .map_err(|e| BuildError::InvalidPublicKey(e.to_string()))?;
        if public_key.len() != 33 {
            return Err(BuildError::InvalidPublicKey(format!(
                "expected 33-byte compressed key, got {} bytes",
                public_key.len()
            )));
        }
        Ok(Self {
            chain,
            public_key,
            sequence_number: None,
            account_number: None,
        })
    }

    pub fn chain(&self) -> CosmosChain {
        self.chain
    }

    pub fn set_sequence_number(&mut self, sequence: u64) {
        self.sequence_number = Some(sequence);
    }

    pub fn set_account_number(&mut self, account_number: u64) {
        self.account_number = Some(account_number);
    }

    pub fn sequence_number(&self) -> Option<u64> {
        self.sequence_number
    }

    /// `TxRaw` bytes carrying a zeroed signature, for `simulate`.
    pub fn build_for_simulation(&self, intent: &TransactionIntent) -> BuildResult<Vec<u8>> {
        let unsigned = self.unsigned(intent)?;
        Ok(Self::raw(&unsigned, vec![0u8; 64]))
    }

    fn unsigned(&self, intent: &TransactionIntent) -> BuildResult<CosmosUnsignedTransaction> {
        let sequence = self
            .sequence_number
            .ok_or(BuildError::MissingChainState("sequence number"))?;
        let gas = match intent.fee.parameters {
            Some(FeeParameters::Cosmos { gas }) => gas,
            _ => return Err(BuildError::BuildFailed("missing Cosmos gas parameter".into())),
        };

        let decimals = self.transfer_decimals(&intent.amount.kind)?;
        let denom = self.denomination(&intent.amount.kind, false)?;
        let amount = self.units(intent.amount.value, decimals)?;

        let fee_denom = self.denomination(&intent.amount.kind, true)?;
        let fee_amount = self.units(intent.fee.amount.value, decimals)?;

        let send = proto::MsgSend {
            from_address: intent.source_address.clone(),
            to_address: intent.destination_address.clone(),
            amount: vec![proto::Coin {
                denom: denom.to_string(),
                amount: amount.to_string(),
            }],
        };
        let body = proto::TxBody {
            messages: vec![proto::Any {
                type_url: proto::MSG_SEND_TYPE_URL.to_string(),
                value: send.encode_to_vec(),
            }],
            memo: intent.memo().unwrap_or_default().to_string(),
            timeout_height: 0,
        };

        let signer = proto::SignerInfo {
            public_key: Some(proto::Any {
                type_url: proto::SECP256K1_PUBKEY_TYPE_URL.to_string(),
                value: proto::PubKey {
                    key: self.public_key.clone(),
                }
                .encode_to_vec(),
            }),
            mode_info: Some(proto::ModeInfo {
                single: Some(proto::ModeInfoSingle {
                    mode: proto::SIGN_MODE_DIRECT,
                }),
            }),
            sequence,
        };
        let auth_info = proto::AuthInfo {
            signer_infos: vec![signer],
            fee: Some(proto::Fee {
                amount: vec![proto::Coin {
                    denom: fee_denom.to_string(),
                    amount: fee_amount.to_string(),
                }],
                gas_limit: gas,
            }),
        };

        Ok(CosmosUnsignedTransaction {
            body_bytes: body.encode_to_vec(),
            auth_info_bytes: auth_info.encode_to_vec(),
        })
    }

    /// Precision of the transferred value.
    fn transfer_decimals(&self, kind: &AmountType) -> BuildResult<u32> {
        match kind {
            AmountType::Coin => Ok(self.chain.decimal_count()),
            AmountType::Token(token) => Ok(match self.chain.fee_paid_currency() {
                FeePaidCurrency::Coin => self.chain.decimal_count(),
                FeePaidCurrency::SameCurrency => token.decimal_count,
            }),
            AmountType::Reserve | AmountType::FeeResource => Err(BuildError::InvalidAmountType),
        }
    }

    fn denomination(&self, kind: &AmountType, for_fee: bool) -> BuildResult<&'static str> {
        match kind {
            AmountType::Coin => Ok(self.chain.smallest_denomination()),
            AmountType::Token(token) => {
                let denom = if for_fee {
                    self.chain.token_fee_denomination(token)
                } else {
                    self.chain.token_denomination(token)
                };
                denom.ok_or_else(|| BuildError::UnknownDenomination(token.contract_address.clone()))
            }
            AmountType::Reserve | AmountType::FeeResource => Err(BuildError::InvalidAmountType),
        }
    }

    fn units(&self, value: Decimal, decimals: u32) -> BuildResult<u64> {
        Ok(convert_to_smallest_unit(value, decimals, self.chain.rounding())?)
    }

    fn raw(unsigned: &CosmosUnsignedTransaction, signature: Vec<u8>) -> Vec<u8> {
        proto::TxRaw {
            body_bytes: unsigned.body_bytes.clone(),
            auth_info_bytes: unsigned.auth_info_bytes.clone(),
            signatures: vec![signature],
        }
        .encode_to_vec()
    }
}

impl TransactionBuilder for CosmosTransactionBuilder {
    type Unsigned = CosmosUnsignedTransaction;
    /// Broadcast request body (JSON).
    type Payload = Vec<u8>;

    fn build_for_sign(&self, intent: &TransactionIntent) -> BuildResult<(CosmosUnsignedTransaction, Vec<u8>)> {
        let account_number = self
            .account_number
            .ok_or(BuildError::MissingChainState("account number"))?;
        let unsigned = self.unsigned(intent)?;

        let sign_doc = proto::SignDoc {
            body_bytes: unsigned.body_bytes.clone(),
            auth_info_bytes: unsigned.auth_info_bytes.clone(),
            chain_id: self.chain.chain_id().to_string(),
            account_number,
        };
        let hash = Sha256::digest(sign_doc.encode_to_vec()).to_vec();
        Ok((unsigned, hash))
    }

    fn build_for_send(&self, unsigned: &CosmosUnsignedTransaction, signature: &[u8]) -> BuildResult<Vec<u8>> {
        let compact = strip_recovery_id(signature)?;
        let low_s = normalize_secp256k1(&compact)?;
        let tx_bytes = Self::raw(unsigned, low_s.to_bytes().to_vec());
        serde_json::to_vec(&json!({
            "tx_bytes": BASE64.encode(tx_bytes),
            "mode": BROADCAST_MODE,
        }))
        .map_err(|e| BuildError::BuildFailed(e.to_string()))
    }
}
