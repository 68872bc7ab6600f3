//! The payload builder contract.

use crate::transaction::types::{BuildResult, TransactionIntent};

/// Turns an intent plus chain state into a sign-ready hash and a wire payload.
///
/// Builders are pure: the same intent and chain state yield byte-identical
/// unsigned payloads, and no builder performs I/O.
pub trait TransactionBuilder {
    /// Chain-specific unsigned transaction retained between the two phases.
    type Unsigned;
    /// Wire payload handed to the network layer.
    type Payload;

    /// Returns the unsigned transaction and the bytes the signer must sign.
    fn build_for_sign(&self, intent: &TransactionIntent) -> BuildResult<(Self::Unsigned, Vec<u8>)>;

    fn build_for_send(&self, unsigned: &Self::Unsigned, signature: &[u8]) -> BuildResult<Self::Payload>;
}
