//! Reconciling pending records against chain confirmations.

use async_trait::async_trait;

use crate::network::NetworkResult;
use crate::pending::store::{now_secs, PendingTransactionStore};

/// Looks up whether a transaction has been included on chain.
#[async_trait]
pub trait TransactionLookup: Send + Sync {
    /// `Some(height)` once included, `None` while unknown to the node.
    async fn confirmation(&self, hash: &str) -> NetworkResult<Option<u64>>;
}

/// What a reconciliation pass did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub confirmed: Vec<String>,
    pub still_pending: Vec<String>,
    pub expired: Vec<String>,
}

/// Remove every pending record the chain reports as confirmed.
///
/// Not-found lookups keep the record; any other lookup error is returned
/// and leaves the remaining records untouched.
pub async fn reconcile<L>(store: &PendingTransactionStore, lookup: &L) -> NetworkResult<ReconcileReport>
where
    L: TransactionLookup + ?Sized,
{
    let mut report = ReconcileReport {
        expired: store.expire(now_secs()),
        ..ReconcileReport::default()
    };

    let mut hashes = store.hashes();
    hashes.sort();

    for hash in hashes {
        let confirmation = match lookup.confirmation(&hash).await {
            Ok(confirmation) => confirmation,
            Err(e) if e.is_not_found() => None,
            Err(e) => return Err(e),
        };

        match confirmation {
            Some(height) if height > 0 => {
                tracing::debug!(hash = %hash, height, "Pending transaction confirmed");
                store.remove(&hash);
                report.confirmed.push(hash);
            }
            _ => report.still_pending.push(hash),
        }
    }

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::{Amount, SolanaChain};
    use crate::network::{ChainErrorKind, NetworkError};
    use crate::pending::store::PendingTransactionRecord;
    use rust_decimal_macros::dec;
    use std::collections::HashMap;

    struct MapLookup(HashMap<&'static str, NetworkResult<Option<u64>>>);

    #[async_trait]
    impl TransactionLookup for MapLookup {
        async fn confirmation(&self, hash: &str) -> NetworkResult<Option<u64>> {
            self.0.get(hash).cloned().unwrap_or(Ok(None))
        }
    }

    fn store_with(hashes: &[&str]) -> PendingTransactionStore {
        let store = PendingTransactionStore::new(None);
        for hash in hashes {
            store.insert(PendingTransactionRecord::new(
                *hash,
                "from",
                "to",
                Amount::coin(&SolanaChain::default(), dec!(1)),
                Amount::coin(&SolanaChain::default(), dec!(0.000005)),
            ));
        }
        store
    }

    #[tokio::test]
    async fn test_confirmed_removed_unknown_kept() {
        let store = store_with(&["A", "B", "C", "D"]);
        let lookup = MapLookup(HashMap::from([
            ("A", Ok(Some(120))),
            ("B", Ok(None)),
            ("C", Err(NetworkError::chain(ChainErrorKind::TransactionNotFound, Some(5), "tx not found"))),
            ("D", Ok(Some(0))),
        ]));

        let report = reconcile(&store, &lookup).await.unwrap();
        assert_eq!(report.confirmed, vec!["A"]);
        assert_eq!(report.still_pending, vec!["B", "C", "D"]);
        assert_eq!(store.len(), 3);
        assert!(!store.contains("A"));
    }

    #[tokio::test]
    async fn test_other_errors_surface() {
        let store = store_with(&["A"]);
        let lookup = MapLookup(HashMap::from([("A", Err(NetworkError::Transport("reset".into())))]));
        assert!(reconcile(&store, &lookup).await.is_err());
        assert!(store.contains("A"));
    }
}
