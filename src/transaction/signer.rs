//! Signing capability consumed by wallet managers.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::card::SessionError;

/// Curve of a wallet key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EllipticCurve {
    Secp256k1,
    Ed25519,
}

impl EllipticCurve {
    /// Identifier used on the card wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            EllipticCurve::Secp256k1 => "secp256k1",
            EllipticCurve::Ed25519 => "ed25519",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "secp256k1" => Some(EllipticCurve::Secp256k1),
            "ed25519" => Some(EllipticCurve::Ed25519),
            _ => None,
        }
    }
}

/// A wallet's public key and its curve.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WalletPublicKey {
    pub key: Vec<u8>,
    pub curve: EllipticCurve,
}

impl WalletPublicKey {
    pub fn new(key: Vec<u8>, curve: EllipticCurve) -> Self {
        Self { key, curve }
    }
}

/// Errors surfaced by a signer.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SignerError {
    #[error("signing was cancelled")]
    Cancelled,

    #[error("signer returned {actual} signatures for {expected} hashes")]
    CountMismatch { expected: usize, actual: usize },

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error("signing failed: {0}")]
    Failed(String),
}

/// An opaque signing capability.
///
/// Implementations may hold keys locally or route through a card session.
#[async_trait]
pub trait TransactionSigner: Send + Sync {
    async fn sign(&self, hash: &[u8], public_key: &WalletPublicKey) -> Result<Vec<u8>, SignerError>;

    /// Signs several hashes, in order.
    async fn sign_many(
        &self,
        hashes: &[Vec<u8>],
        public_key: &WalletPublicKey,
    ) -> Result<Vec<Vec<u8>>, SignerError> {
        let mut signatures = Vec::with_capacity(hashes.len());
        for hash in hashes {
            signatures.push(self.sign(hash, public_key).await?);
        }
        Ok(signatures)
    }
}
