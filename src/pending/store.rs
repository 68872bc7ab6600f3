//! Concurrent store of submitted, unconfirmed transactions.

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

use crate::chain::Amount;

/// A broadcast transaction awaiting confirmation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingTransactionRecord {
    pub hash: String,
    pub source: String,
    pub destination: String,
    pub amount: Amount,
    pub fee: Amount,
    /// Submission time (seconds since epoch).
    pub submitted_at: u64,
}

impl PendingTransactionRecord {
    pub fn new(
        hash: impl Into<String>,
        source: impl Into<String>,
        destination: impl Into<String>,
        amount: Amount,
        fee: Amount,
    ) -> Self {
        Self {
            hash: hash.into(),
            source: source.into(),
            destination: destination.into(),
            amount,
            fee,
            submitted_at: now_secs(),
        }
    }

    /// Check if the record is older than `ttl` at `now`.
    pub fn is_expired_at(&self, ttl: Duration, now: u64) -> bool {
        self.submitted_at.saturating_add(ttl.as_secs()) <= now
    }
}

pub(crate) fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// A thread-safe map of pending records keyed by transaction hash.
#[derive(Debug, Clone, Default)]
pub struct PendingTransactionStore {
    inner: Arc<DashMap<String, PendingTransactionRecord>>,
    ttl: Option<Duration>,
}

impl PendingTransactionStore {
    /// Create an empty store. Records older than `ttl` are dropped on reconciliation.
    pub fn new(ttl: Option<Duration>) -> Self {
        Self {
            inner: Arc::new(DashMap::new()),
            ttl,
        }
    }

    /// Insert a record. Returns false and keeps the existing record if the
    /// hash is already pending.
    pub fn insert(&self, record: PendingTransactionRecord) -> bool {
        match self.inner.entry(record.hash.clone()) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(record);
                true
            }
        }
    }

    pub fn remove(&self, hash: &str) -> Option<PendingTransactionRecord> {
        self.inner.remove(hash).map(|(_, record)| record)
    }

    pub fn contains(&self, hash: &str) -> bool {
        self.inner.contains_key(hash)
    }

    pub fn get(&self, hash: &str) -> Option<PendingTransactionRecord> {
        self.inner.get(hash).map(|r| r.value().clone())
    }

    /// Snapshot of pending hashes.
    pub fn hashes(&self) -> Vec<String> {
        self.inner.iter().map(|r| r.key().clone()).collect()
    }

    /// Snapshot of pending records.
    pub fn records(&self) -> Vec<PendingTransactionRecord> {
        self.inner.iter().map(|r| r.value().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Drop records older than the configured ttl, returning their hashes.
    pub fn expire(&self, now: u64) -> Vec<String> {
        let Some(ttl) = self.ttl else {
            return Vec::new();
        };
        let expired: Vec<String> = self
            .inner
            .iter()
            .filter(|r| r.value().is_expired_at(ttl, now))
            .map(|r| r.key().clone())
            .collect();
        for hash in &expired {
            self.inner.remove(hash);
        }
        expired
    }
}
