//! `TransactionSigner` backed by a card session.

use std::sync::Arc;

use async_trait::async_trait;

use crate::card::commands::{SignCommand, MAX_HASHES_PER_COMMAND};
use crate::card::crypto::verify_wallet_signature;
use crate::card::error::{SessionError, SessionResult};
use crate::card::sdk::CardSdk;
use crate::card::session::{CardSession, CardSessionRunnable};
use crate::transaction::{SignerError, TransactionSigner, WalletPublicKey};

/// Signs every chunk of hashes inside one session, so the user taps once.
struct SignAllTask {
    commands: Vec<SignCommand>,
}

#[async_trait]
impl CardSessionRunnable for SignAllTask {
    type Response = Vec<Vec<u8>>;

    async fn run(&self, session: &CardSession) -> SessionResult<Vec<Vec<u8>>> {
        let mut signatures = Vec::new();
        for command in &self.commands {
            signatures.extend(session.send(command).await?.signatures);
        }
        Ok(signatures)
    }
}

#[derive(Debug, Clone)]
pub struct CardSigner {
    sdk: Arc<CardSdk>,
    card_id: Option<String>,
}

impl CardSigner {
    pub fn new(sdk: Arc<CardSdk>, card_id: Option<String>) -> Self {
        Self { sdk, card_id }
    }
}

fn signer_error(error: SessionError) -> SignerError {
    match error {
        SessionError::UserCancelled => SignerError::Cancelled,
        other => SignerError::Session(other),
    }
}

#[async_trait]
impl TransactionSigner for CardSigner {
    async fn sign(&self, hash: &[u8], public_key: &WalletPublicKey) -> Result<Vec<u8>, SignerError> {
        let mut signatures = self.sign_many(&[hash.to_vec()], public_key).await?;
        signatures.pop().ok_or(SignerError::CountMismatch { expected: 1, actual: 0 })
    }

    async fn sign_many(
        &self,
        hashes: &[Vec<u8>],
        public_key: &WalletPublicKey,
    ) -> Result<Vec<Vec<u8>>, SignerError> {
        let commands = hashes
            .chunks(MAX_HASHES_PER_COMMAND)
            .map(|chunk| SignCommand::new(chunk.to_vec()).map(|c| c.for_wallet(public_key.key.clone())))
            .collect::<SessionResult<Vec<_>>>()
            .map_err(signer_error)?;
        if commands.is_empty() {
            return Err(signer_error(SessionError::EmptyHashes));
        }

        let signatures = self
            .sdk
            .start_session(&SignAllTask { commands }, self.card_id.as_deref())
            .await
            .map_err(signer_error)?;

        if signatures.len() != hashes.len() {
            return Err(SignerError::CountMismatch {
                expected: hashes.len(),
                actual: signatures.len(),
            });
        }
        hashes
            .iter()
            .zip(&signatures)
            .map(|(hash, signature)| {
                verify_wallet_signature(public_key, hash, signature).ok_or_else(|| {
                    SignerError::Failed("card signature does not verify against the wallet key".to_string())
                })
            })
            .collect()
    }
}
