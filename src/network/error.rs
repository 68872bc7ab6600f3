//! Network error definitions.

use std::fmt;
use std::time::Duration;

use thiserror::Error;

/// Classification of errors reported by a chain node inside a well-formed response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainErrorKind {
    InsufficientFee,
    InsufficientFunds,
    AccountNotFound,
    TransactionNotFound,
    SequenceMismatch,
    /// The node answered but cannot serve the request right now.
    NodeUnavailable,
    Rejected,
    Other,
}

impl fmt::Display for ChainErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            ChainErrorKind::InsufficientFee => "insufficient fee",
            ChainErrorKind::InsufficientFunds => "insufficient funds",
            ChainErrorKind::AccountNotFound => "account not found",
            ChainErrorKind::TransactionNotFound => "transaction not found",
            ChainErrorKind::SequenceMismatch => "sequence mismatch",
            ChainErrorKind::NodeUnavailable => "node unavailable",
            ChainErrorKind::Rejected => "transaction rejected",
            ChainErrorKind::Other => "chain error",
        };
        f.write_str(text)
    }
}

/// Errors that can occur while talking to chain providers.
#[derive(Debug, Clone, Error)]
pub enum NetworkError {
    /// Connection-level failure.
    #[error("transport error: {0}")]
    Transport(String),

    /// Request exceeded its deadline.
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    /// Non-success HTTP status without a decodable chain error.
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    /// Response body did not match the expected shape.
    #[error("malformed response: {0}")]
    Decode(String),

    /// The node reported a protocol-level error.
    #[error("{kind}: {message}")]
    Chain {
        kind: ChainErrorKind,
        code: Option<i64>,
        message: String,
    },

    /// Every provider failed with a retryable error.
    #[error("all {attempts} providers failed, last error: {last}")]
    AllProvidersExhausted {
        attempts: usize,
        last: Box<NetworkError>,
    },

    #[error("no providers configured")]
    NoProviders,
}

impl NetworkError {
    pub fn chain(kind: ChainErrorKind, code: Option<i64>, message: impl Into<String>) -> Self {
        NetworkError::Chain {
            kind,
            code,
            message: message.into(),
        }
    }

    /// Whether the next provider should be tried.
    pub fn is_retryable(&self) -> bool {
        match self {
            NetworkError::Transport(_) | NetworkError::Timeout(_) | NetworkError::Decode(_) => true,
            NetworkError::Http { status, .. } => *status >= 500 || *status == 429,
            NetworkError::Chain { kind, .. } => *kind == ChainErrorKind::NodeUnavailable,
            NetworkError::AllProvidersExhausted { .. } | NetworkError::NoProviders => false,
        }
    }

    /// Whether the error means the queried object does not exist (yet).
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            NetworkError::Chain {
                kind: ChainErrorKind::TransactionNotFound | ChainErrorKind::AccountNotFound,
                ..
            }
        )
    }

    /// The chain error kind, if the node reported one.
    pub fn chain_kind(&self) -> Option<ChainErrorKind> {
        match self {
            NetworkError::Chain { kind, .. } => Some(*kind),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for NetworkError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            NetworkError::Decode(e.to_string())
        } else if let Some(status) = e.status() {
            NetworkError::Http {
                status: status.as_u16(),
                body: e.to_string(),
            }
        } else {
            NetworkError::Transport(e.to_string())
        }
    }
}

impl From<serde_json::Error> for NetworkError {
    fn from(e: serde_json::Error) -> Self {
        NetworkError::Decode(e.to_string())
    }
}

/// Result type for network operations.
pub type NetworkResult<T> = Result<T, NetworkError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_classification() {
        assert!(NetworkError::Transport("reset".into()).is_retryable());
        assert!(NetworkError::Timeout(Duration::from_secs(1)).is_retryable());
        assert!(NetworkError::Http { status: 503, body: String::new() }.is_retryable());
        assert!(NetworkError::Http { status: 429, body: String::new() }.is_retryable());
        assert!(!NetworkError::Http { status: 400, body: String::new() }.is_retryable());
        assert!(!NetworkError::chain(ChainErrorKind::InsufficientFee, Some(13), "fee").is_retryable());
        assert!(NetworkError::chain(ChainErrorKind::NodeUnavailable, Some(-32005), "behind").is_retryable());
    }

    #[test]
    fn test_not_found() {
        assert!(NetworkError::chain(ChainErrorKind::TransactionNotFound, None, "txnNotFound").is_not_found());
        assert!(!NetworkError::Transport("x".into()).is_not_found());
    }
}
