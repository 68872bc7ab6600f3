//! Session key derivation, payload sealing and signature checks.
//!
//! # Key Derivation
//! ```text
//! fast:   HKDF-SHA256(ikm = SHA-256(pin1), salt = uid, info = "fast"   ‖ A ‖ B)
//! strong: HKDF-SHA256(ikm = ECDH(a, B),    salt = uid, info = "strong" ‖ A ‖ B)
//! ```
//! `A` is the terminal's half of the exchange, `B` the card's.
//!
//! Sealed payloads are `nonce(12) ‖ AES-256-GCM ciphertext`.

use aes_gcm::aead::Aead;
use aes_gcm::{Aes256Gcm, KeyInit, Nonce};
use hkdf::Hkdf;
use k256::ecdh::EphemeralSecret;
use k256::ecdsa::signature::hazmat::PrehashVerifier;
use k256::ecdsa::signature::Verifier;
use k256::elliptic_curve::sec1::ToEncodedPoint;
use k256::PublicKey;
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha256};
use zeroize::Zeroizing;

use crate::card::error::SessionError;
use crate::transaction::{EllipticCurve, WalletPublicKey};

pub const SESSION_KEY_LEN: usize = 32;
pub const FAST_NONCE_LEN: usize = 16;
const GCM_NONCE_LEN: usize = 12;

pub type SessionKey = Zeroizing<[u8; SESSION_KEY_LEN]>;

pub fn sha256(data: &[u8]) -> [u8; 32] {
    Sha256::digest(data).into()
}

fn session_key(label: &[u8], ikm: &[u8], uid: &[u8], a: &[u8], b: &[u8]) -> Result<SessionKey, SessionError> {
    let mut info = Vec::with_capacity(label.len() + a.len() + b.len());
    info.extend_from_slice(label);
    info.extend_from_slice(a);
    info.extend_from_slice(b);

    let mut okm = Zeroizing::new([0u8; SESSION_KEY_LEN]);
    Hkdf::<Sha256>::new(Some(uid), ikm)
        .expand(&info, &mut okm[..])
        .map_err(|_| SessionError::FailedToEstablishEncryption)?;
    Ok(okm)
}

pub fn derive_fast_key(pin1_hash: &[u8], uid: &[u8], a: &[u8], b: &[u8]) -> Result<SessionKey, SessionError> {
    session_key(b"fast", pin1_hash, uid, a, b)
}

pub fn derive_strong_key(shared_secret: &[u8], uid: &[u8], a: &[u8], b: &[u8]) -> Result<SessionKey, SessionError> {
    session_key(b"strong", shared_secret, uid, a, b)
}

pub fn random_nonce() -> [u8; FAST_NONCE_LEN] {
    let mut nonce = [0u8; FAST_NONCE_LEN];
    OsRng.fill_bytes(&mut nonce);
    nonce
}

/// The terminal's half of a strong-mode exchange.
pub struct EphemeralExchange {
    secret: EphemeralSecret,
    public: Vec<u8>,
}

impl EphemeralExchange {
    pub fn new() -> Self {
        let secret = EphemeralSecret::random(&mut OsRng);
        let public = secret.public_key().to_encoded_point(true).as_bytes().to_vec();
        Self { secret, public }
    }

    /// SEC1 compressed public key sent to the peer.
    pub fn public_key(&self) -> &[u8] {
        &self.public
    }

    /// Raw ECDH secret with the peer's SEC1 public key.
    pub fn shared_secret(&self, peer: &[u8]) -> Result<Zeroizing<Vec<u8>>, SessionError> {
        let peer = PublicKey::from_sec1_bytes(peer).map_err(|_| SessionError::FailedToEstablishEncryption)?;
        let shared = self.secret.diffie_hellman(&peer);
        Ok(Zeroizing::new(shared.raw_secret_bytes().to_vec()))
    }
}

impl Default for EphemeralExchange {
    fn default() -> Self {
        Self::new()
    }
}

pub fn seal(key: &[u8], plaintext: &[u8]) -> Result<Vec<u8>, SessionError> {
    let cipher = Aes256Gcm::new_from_slice(key).map_err(|_| SessionError::FailedToEstablishEncryption)?;
    let mut nonce = [0u8; GCM_NONCE_LEN];
    OsRng.fill_bytes(&mut nonce);
    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&nonce), plaintext)
        .map_err(|_| SessionError::FailedToEstablishEncryption)?;

    let mut out = Vec::with_capacity(GCM_NONCE_LEN + ciphertext.len());
    out.extend_from_slice(&nonce);
    out.extend_from_slice(&ciphertext);
    Ok(out)
}

/// Any decrypt failure is a broken channel.
pub fn open(key: &[u8], sealed: &[u8]) -> Result<Vec<u8>, SessionError> {
    if sealed.len() < GCM_NONCE_LEN {
        return Err(SessionError::FailedToEstablishEncryption);
    }
    let cipher = Aes256Gcm::new_from_slice(key).map_err(|_| SessionError::FailedToEstablishEncryption)?;
    let (nonce, ciphertext) = sealed.split_at(GCM_NONCE_LEN);
    cipher
        .decrypt(Nonce::from_slice(nonce), ciphertext)
        .map_err(|_| SessionError::FailedToEstablishEncryption)
}

/// Checks an issuer signature (raw `r ‖ s`) over SHA-256 of `message`.
pub fn verify_issuer_signature(public_key: &[u8], message: &[u8], signature: &[u8]) -> Result<(), SessionError> {
    let key = k256::ecdsa::VerifyingKey::from_sec1_bytes(public_key).map_err(|_| SessionError::VerificationFailed)?;
    let signature = k256::ecdsa::Signature::from_slice(signature).map_err(|_| SessionError::VerificationFailed)?;
    key.verify(message, &signature)
        .map_err(|_| SessionError::VerificationFailed)
}

/// Checks a wallet signature over `hash` and returns it in canonical form.
///
/// Cards do not guarantee low-S, so a secp256k1 signature is normalized
/// before verification and the low-S bytes are returned.
pub fn verify_wallet_signature(public_key: &WalletPublicKey, hash: &[u8], signature: &[u8]) -> Option<Vec<u8>> {
    match public_key.curve {
        EllipticCurve::Secp256k1 => {
            let key = k256::ecdsa::VerifyingKey::from_sec1_bytes(&public_key.key).ok()?;
            let signature = k256::ecdsa::Signature::from_slice(signature).ok()?;
            let signature = signature.normalize_s().unwrap_or(signature);
            key.verify_prehash(hash, &signature).ok()?;
            Some(signature.to_bytes().to_vec())
        }
        EllipticCurve::Ed25519 => {
            let key_bytes = <[u8; 32]>::try_from(public_key.key.as_slice()).ok()?;
            let key = ed25519_dalek::VerifyingKey::from_bytes(&key_bytes).ok()?;
            let parsed = ed25519_dalek::Signature::from_slice(signature).ok()?;
            key.verify(hash, &parsed).ok()?;
            Some(signature.to_vec())
        }
    }
}
