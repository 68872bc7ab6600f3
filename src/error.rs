//! Canonical error taxonomy.
//!
//! Every subsystem error maps onto one `ErrorKind`; user-facing text is
//! derived from the kind, and cancellations are reported silently.

use std::fmt;

use thiserror::Error;

use crate::card::SessionError;
use crate::config::ConfigError;
use crate::network::NetworkError;
use crate::transaction::{BuildError, SignerError};

/// Category every error in the crate maps onto.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// No provider could be reached or answered sensibly.
    NetworkTransport,
    /// A node answered and rejected the request.
    ChainProtocol,
    /// A payload could not be assembled.
    Build,
    /// The card session could not agree on, or keep, an encrypted channel.
    EncryptionNegotiation,
    /// A card session is already running or a send is in flight.
    SessionBusy,
    /// The user stopped the operation.
    UserCancelled,
    /// Any other card-side failure.
    CardSession,
    /// A signer failed outside of a card session.
    Signing,
    Configuration,
}

impl ErrorKind {
    pub fn user_message(&self) -> &'static str {
        match self {
            ErrorKind::NetworkTransport => {
                "The network is unreachable right now. Check your connection and try again."
            }
            ErrorKind::ChainProtocol => "The network rejected the request.",
            ErrorKind::Build => "The transaction could not be prepared.",
            ErrorKind::EncryptionNegotiation => {
                "A secure channel with the card could not be established. Hold the card still and try again."
            }
            ErrorKind::SessionBusy => "Another card operation is already in progress.",
            ErrorKind::UserCancelled => "The operation was cancelled.",
            ErrorKind::CardSession => "The card operation failed.",
            ErrorKind::Signing => "The transaction could not be signed.",
            ErrorKind::Configuration => "The configuration is invalid.",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Any error surfaced by the wallet core.
#[derive(Debug, Error)]
pub enum WalletError {
    #[error(transparent)]
    Network(#[from] NetworkError),

    #[error(transparent)]
    Build(#[from] BuildError),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Signer(#[from] SignerError),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl WalletError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            WalletError::Network(e) => network_kind(e),
            WalletError::Build(_) => ErrorKind::Build,
            WalletError::Session(e) => e.kind(),
            WalletError::Signer(SignerError::Cancelled) => ErrorKind::UserCancelled,
            WalletError::Signer(SignerError::Session(e)) => e.kind(),
            WalletError::Signer(_) => ErrorKind::Signing,
            WalletError::Config(_) => ErrorKind::Configuration,
        }
    }

    /// Human-readable message derived from the kind, followed by the chain's
    /// own message when a node supplied one.
    pub fn user_message(&self) -> String {
        let base = self.kind().user_message();
        match self {
            WalletError::Network(e) => match chain_detail(e) {
                Some(detail) => format!("{base} ({detail})"),
                None => base.to_string(),
            },
            _ => base.to_string(),
        }
    }

    /// Cancelled operations are silent: never shown, never logged as failures.
    pub fn is_cancelled(&self) -> bool {
        self.kind() == ErrorKind::UserCancelled
    }

    /// Log the error for `operation` at the level its kind deserves.
    pub fn report(&self, operation: &str) {
        if self.is_cancelled() {
            tracing::debug!(operation, "Operation cancelled");
        } else {
            tracing::warn!(operation, kind = %self.kind(), error = %self, "Operation failed");
        }
    }
}

fn network_kind(error: &NetworkError) -> ErrorKind {
    match error {
        NetworkError::Chain { .. } => ErrorKind::ChainProtocol,
        NetworkError::Http { status, .. } if (400..500).contains(status) && *status != 429 => {
            ErrorKind::ChainProtocol
        }
        _ => ErrorKind::NetworkTransport,
    }
}

/// The node's message for a chain rejection, or its kind when the node sent none.
fn chain_detail(e: &NetworkError) -> Option<String> {
    match e {
        NetworkError::Chain { message, .. } if !message.trim().is_empty() => Some(message.trim().to_string()),
        NetworkError::Chain { kind, .. } => Some(kind.to_string()),
        NetworkError::AllProvidersExhausted { last, .. } => chain_detail(last),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::ChainErrorKind;

    #[test]
    fn test_kinds() {
        let exhausted = WalletError::from(NetworkError::AllProvidersExhausted {
            attempts: 2,
            last: Box::new(NetworkError::Transport("reset".into())),
        });
        assert_eq!(exhausted.kind(), ErrorKind::NetworkTransport);

        let fee = WalletError::from(NetworkError::chain(ChainErrorKind::InsufficientFee, Some(13), "fee"));
        assert_eq!(fee.kind(), ErrorKind::ChainProtocol);

        assert_eq!(WalletError::from(SessionError::Busy).kind(), ErrorKind::SessionBusy);
        assert_eq!(
            WalletError::from(SessionError::FailedToEstablishEncryption).kind(),
            ErrorKind::EncryptionNegotiation
        );
        assert_eq!(
            WalletError::from(BuildError::InvalidAmountType).kind(),
            ErrorKind::Build
        );
    }

    #[test]
    fn test_cancellation_is_silent() {
        assert!(WalletError::from(SessionError::UserCancelled).is_cancelled());
        assert!(WalletError::from(SignerError::Cancelled).is_cancelled());
        assert!(WalletError::from(SignerError::Session(SessionError::UserCancelled)).is_cancelled());
        assert!(!WalletError::from(SessionError::Busy).is_cancelled());
    }

    #[test]
    fn test_user_message_carries_node_message() {
        let rejected = WalletError::from(NetworkError::chain(
            ChainErrorKind::InsufficientFee,
            Some(13),
            "insufficient fees; got: 10uatom required: 500uatom",
        ));
        let message = rejected.user_message();
        assert!(message.starts_with(ErrorKind::ChainProtocol.user_message()));
        assert!(message.ends_with("(insufficient fees; got: 10uatom required: 500uatom)"));

        let silent = WalletError::from(NetworkError::chain(ChainErrorKind::InsufficientFee, Some(13), ""));
        assert!(silent.user_message().ends_with(&format!("({})", ChainErrorKind::InsufficientFee)));

        let exhausted = WalletError::from(NetworkError::AllProvidersExhausted {
            attempts: 2,
            last: Box::new(NetworkError::chain(ChainErrorKind::NodeUnavailable, None, "node is behind by 40 slots")),
        });
        assert!(exhausted.user_message().ends_with("(node is behind by 40 slots)"));

        let transport = WalletError::from(NetworkError::Transport("reset".into()));
        assert_eq!(transport.user_message(), ErrorKind::NetworkTransport.user_message());
    }
}
