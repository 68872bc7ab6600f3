//! Legacy Solana message encoding.

use curve25519_dalek::edwards::CompressedEdwardsY;
use sha2::{Digest, Sha256};

use crate::transaction::{BuildError, BuildResult};

/// A 32-byte account address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Pubkey(pub [u8; 32]);

impl Pubkey {
    pub fn from_base58(value: &str) -> BuildResult<Self> {
        let bytes = bs58::decode(value)
            .into_vec()
            .map_err(|_| BuildError::InvalidAddress(value.to_string()))?;
        Self::from_slice(&bytes).ok_or_else(|| BuildError::InvalidAddress(value.to_string()))
    }

    pub fn from_slice(bytes: &[u8]) -> Option<Self> {
        <[u8; 32]>::try_from(bytes).ok().map(Pubkey)
    }

    pub fn to_base58(&self) -> String {
        bs58::encode(self.0).into_string()
    }

    /// Whether the bytes decode to a point on the ed25519 curve.
    pub fn is_on_curve(&self) -> bool {
        CompressedEdwardsY(self.0).decompress().is_some()
    }

    /// Derive a program address: the first off-curve hash for bump 255..=0.
    pub fn find_program_address(seeds: &[&[u8]], program_id: &Pubkey) -> BuildResult<(Pubkey, u8)> {
        for bump in (0..=u8::MAX).rev() {
            let mut hasher = Sha256::new();
            for seed in seeds {
                hasher.update(seed);
            }
            hasher.update([bump]);
            hasher.update(program_id.0);
            hasher.update(b"ProgramDerivedAddress");
            let candidate = Pubkey(hasher.finalize().into());
            if !candidate.is_on_curve() {
                return Ok((candidate, bump));
            }
        }
        Err(BuildError::BuildFailed("no viable program address bump".into()))
    }
}

impl std::fmt::Display for Pubkey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_base58())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountMeta {
    pub pubkey: Pubkey,
    pub is_signer: bool,
    pub is_writable: bool,
}

impl AccountMeta {
    pub fn writable(pubkey: Pubkey, is_signer: bool) -> Self {
        Self { pubkey, is_signer, is_writable: true }
    }

    pub fn readonly(pubkey: Pubkey, is_signer: bool) -> Self {
        Self { pubkey, is_signer, is_writable: false }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instruction {
    pub program_id: Pubkey,
    pub accounts: Vec<AccountMeta>,
    pub data: Vec<u8>,
}

/// Append Solana's "short vec" length prefix.
pub fn encode_compact_u16(out: &mut Vec<u8>, value: u16) {
    let mut rem = value;
    loop {
        let mut byte = (rem & 0x7f) as u8;
        rem >>= 7;
        if rem == 0 {
            out.push(byte);
            return;
        }
        byte |= 0x80;
        out.push(byte);
    }
}

fn compact_len(out: &mut Vec<u8>, len: usize) -> BuildResult<()> {
    let len = u16::try_from(len).map_err(|_| BuildError::BuildFailed("message too large".into()))?;
    encode_compact_u16(out, len);
    Ok(())
}

/// Serialize a legacy message with `fee_payer` as the first signer.
pub fn compile_message(
    fee_payer: &Pubkey,
    instructions: &[Instruction],
    recent_blockhash: &[u8; 32],
) -> BuildResult<Vec<u8>> {
    // (pubkey, signer, writable), fee payer first, in first-seen order.
    let mut keys: Vec<(Pubkey, bool, bool)> = vec![(*fee_payer, true, true)];
    let mut touch = |pubkey: Pubkey, signer: bool, writable: bool| {
        match keys.iter_mut().find(|(k, _, _)| *k == pubkey) {
            Some(entry) => {
                entry.1 |= signer;
                entry.2 |= writable;
            }
            None => keys.push((pubkey, signer, writable)),
        }
    };
    for ix in instructions {
        for meta in &ix.accounts {
            touch(meta.pubkey, meta.is_signer, meta.is_writable);
        }
        touch(ix.program_id, false, false);
    }

    // Stable sort keeps first-seen order within each class; the fee payer
    // stays first because it is a writable signer seen first.
    let class = |(_, signer, writable): &(Pubkey, bool, bool)| match (signer, writable) {
        (true, true) => 0,
        (true, false) => 1,
        (false, true) => 2,
        (false, false) => 3,
    };
    keys.sort_by_key(class);

    let num_signers = keys.iter().filter(|k| k.1).count();
    let readonly_signed = keys.iter().filter(|k| k.1 && !k.2).count();
    let readonly_unsigned = keys.iter().filter(|k| !k.1 && !k.2).count();
    let header = [num_signers, readonly_signed, readonly_unsigned]
        .map(|n| u8::try_from(n).map_err(|_| BuildError::BuildFailed("too many accounts".into())));

    let mut out = Vec::new();
    for byte in header {
        out.push(byte?);
    }

    compact_len(&mut out, keys.len())?;
    for (key, _, _) in &keys {
        out.extend_from_slice(&key.0);
    }
    out.extend_from_slice(recent_blockhash);

    let index_of = |pubkey: &Pubkey| -> BuildResult<u8> {
        keys.iter()
            .position(|(k, _, _)| k == pubkey)
            .and_then(|i| u8::try_from(i).ok())
            .ok_or_else(|| BuildError::BuildFailed("account index out of range".into()))
    };

    compact_len(&mut out, instructions.len())?;
    for ix in instructions {
        out.push(index_of(&ix.program_id)?);
        compact_len(&mut out, ix.accounts.len())?;
        for meta in &ix.accounts {
            out.push(index_of(&meta.pubkey)?);
        }
        compact_len(&mut out, ix.data.len())?;
        out.extend_from_slice(&ix.data);
    }
    Ok(out)
}

/// Wire transaction: signature count, signatures, message.
pub fn encode_transaction(signatures: &[[u8; 64]], message: &[u8]) -> BuildResult<Vec<u8>> {
    let mut out = Vec::with_capacity(1 + signatures.len() * 64 + message.len());
    compact_len(&mut out, signatures.len())?;
    for sig in signatures {
        out.extend_from_slice(sig);
    }
    out.extend_from_slice(message);
    Ok(out)
}
