//! Signature post-processing.

use k256::ecdsa::Signature;

use crate::transaction::types::{BuildError, BuildResult};

/// Reduces a signer output to the 64-byte compact `r ‖ s` form.
///
/// Accepts 64 bytes as-is and drops the trailing recovery byte of a
/// 65-byte signature.
pub fn strip_recovery_id(signature: &[u8]) -> BuildResult<[u8; 64]> {
    let compact = match signature.len() {
        64 => signature,
        65 => &signature[..64],
        n => {
            return Err(BuildError::InvalidSignature(format!(
                "expected 64 or 65 bytes, got {n}"
            )))
        }
    };
    let mut out = [0u8; 64];
    out.copy_from_slice(compact);
    Ok(out)
}

/// Parses a compact secp256k1 signature and normalizes it to low-S.
pub fn normalize_secp256k1(compact: &[u8]) -> BuildResult<Signature> {
    let signature = Signature::from_slice(compact)
        .map_err(|e| BuildError::InvalidSignature(e.to_string()))?;
    Ok(signature.normalize_s().unwrap_or(signature))
}

/// DER-encodes a compact secp256k1 signature with low-S.
pub fn der_encode_secp256k1(compact: &[u8]) -> BuildResult<Vec<u8>> {
    let compact = strip_recovery_id(compact)?;
    Ok(normalize_secp256k1(&compact)?.to_der().as_bytes().to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;

    // Order of secp256k1 minus one; any S above n/2 must flip.
    const HIGH_S: &str = "fffffffffffffffffffffffffffffffebaaedce6af48a03bbfd25e8cd0364140";

    #[test]
    fn test_strip_recovery_id() {
        let mut sig = vec![7u8; 65];
        sig[64] = 1;
        assert_eq!(strip_recovery_id(&sig).unwrap(), [7u8; 64]);
        assert_eq!(strip_recovery_id(&[7u8; 64]).unwrap(), [7u8; 64]);
        assert!(matches!(
            strip_recovery_id(&[0u8; 10]),
            Err(BuildError::InvalidSignature(_))
        ));
    }

    #[test]
    fn test_der_low_s() {
        let mut compact = [0u8; 64];
        compact[31] = 1;
        compact[32..].copy_from_slice(&hex::decode(HIGH_S).unwrap());

        let der = der_encode_secp256k1(&compact).unwrap();
        let parsed = Signature::from_der(&der).unwrap();
        assert!(parsed.normalize_s().is_none(), "S was not normalized");
        assert_eq!(der[0], 0x30);
        // low S of n-1 is 1
        assert_eq!(parsed.to_bytes()[63], 1);
    }
}
