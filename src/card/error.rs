//! Card session error types.

use thiserror::Error;

use crate::card::apdu::StatusWord;
use crate::card::environment::CardStatus;
use crate::error::ErrorKind;

/// Errors raised while a card session runs.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("a card session or command is already in progress")]
    Busy,

    #[error("the user cancelled the card session")]
    UserCancelled,

    #[error("this device cannot read cards")]
    UnsupportedDevice,

    #[error("the card session is not running")]
    NotActive,

    #[error("the card was removed before the command finished")]
    TagLost,

    #[error("failed to establish an encrypted channel with the card")]
    FailedToEstablishEncryption,

    #[error("card reader error: {0}")]
    Reader(String),

    #[error("failed to serialize command: {0}")]
    Serialize(String),

    #[error("failed to parse card response: {0}")]
    Deserialize(String),

    #[error("card returned {0}")]
    Card(StatusWord),

    #[error("the card requires a valid access code")]
    AccessCodeRequired,

    #[error("the card has not been read in this session")]
    MissingPreflightRead,

    #[error("issuer signature verification failed")]
    VerificationFailed,

    #[error("no issuer public key is available to verify issuer data")]
    MissingIssuerPublicKey,

    #[error("the card requires an issuer data counter")]
    MissingCounter,

    #[error("data of {size} bytes exceeds the {max} byte limit")]
    DataSizeTooLarge { size: usize, max: usize },

    #[error("no hashes to sign")]
    EmptyHashes,

    #[error("{0} hashes exceed the per-command limit")]
    TooManyHashes(usize),

    #[error("hash of {0} bytes cannot be signed")]
    InvalidHashSize(usize),

    #[error("all hashes must have the same length")]
    HashSizeMustBeEqual,

    #[error("the card has no wallet")]
    WalletNotCreated,

    #[error("the card already has a wallet")]
    AlreadyCreated,

    #[error("the wallet on this card was purged")]
    WalletPurged,

    #[error("the card is not personalized")]
    NotPersonalized,

    #[error("the card does not allow purging its wallet")]
    PurgeProhibited,

    #[error("the wallet has no remaining signatures")]
    NoRemainingSignatures,

    #[error("the card holds a different wallet key")]
    WalletMismatch,

    #[error("card status {0:?} does not allow this command")]
    InvalidCardStatus(CardStatus),
}

impl SessionError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SessionError::Busy => ErrorKind::SessionBusy,
            SessionError::UserCancelled => ErrorKind::UserCancelled,
            SessionError::FailedToEstablishEncryption => ErrorKind::EncryptionNegotiation,
            _ => ErrorKind::CardSession,
        }
    }
}

pub type SessionResult<T> = Result<T, SessionError>;
