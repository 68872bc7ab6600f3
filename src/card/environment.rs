//! Card identity and per-session mutable state.

use std::fmt;

use k256::ecdsa::SigningKey;
use k256::elliptic_curve::sec1::ToEncodedPoint;
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use crate::card::apdu::EncryptionMode;
use crate::card::crypto::{sha256, SessionKey};
use crate::card::error::SessionError;
use crate::card::tlv::{TlvDecoder, TlvTag};
use crate::config::schema::CardConfig;
use crate::transaction::{EllipticCurve, WalletPublicKey};

/// Lifecycle status reported by the card.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum CardStatus {
    NotPersonalized = 0,
    Empty = 1,
    Loaded = 2,
    Purged = 3,
}

impl CardStatus {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(CardStatus::NotPersonalized),
            1 => Some(CardStatus::Empty),
            2 => Some(CardStatus::Loaded),
            3 => Some(CardStatus::Purged),
            _ => None,
        }
    }

    pub(crate) fn decode(decoder: &TlvDecoder) -> Result<Self, SessionError> {
        let raw = decoder.uint(TlvTag::Status)?;
        u8::try_from(raw)
            .ok()
            .and_then(CardStatus::from_u8)
            .ok_or_else(|| SessionError::Deserialize(format!("unknown card status {raw}")))
    }
}

/// Personalization flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct SettingsMask(pub u32);

impl SettingsMask {
    pub const IS_REUSABLE: u32 = 0x0001;
    pub const PROHIBIT_PURGE_WALLET: u32 = 0x0004;
    pub const PROTECT_ISSUER_DATA_AGAINST_REPLAY: u32 = 0x0080;

    pub fn contains(&self, flag: u32) -> bool {
        self.0 & flag == flag
    }
}

/// What a read reveals about a card.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Card {
    /// Upper-case hex.
    pub card_id: String,
    pub manufacturer_name: String,
    pub status: CardStatus,
    pub firmware_version: Option<String>,
    pub card_public_key: Option<Vec<u8>>,
    pub settings_mask: SettingsMask,
    pub curve: EllipticCurve,
    pub wallet_public_key: Option<Vec<u8>>,
    pub max_signatures: Option<u64>,
    pub remaining_signatures: Option<u64>,
    pub signed_hashes: Option<u64>,
    pub pause_before_pin2: Option<u64>,
    pub health: Option<u64>,
    pub issuer_data_public_key: Option<Vec<u8>>,
    pub is_activated: bool,
    pub is_linked: bool,
}

impl Card {
    pub(crate) fn decode(decoder: &TlvDecoder) -> Result<Self, SessionError> {
        let curve_name = decoder.string(TlvTag::CurveId)?;
        let curve = EllipticCurve::parse(&curve_name)
            .ok_or_else(|| SessionError::Deserialize(format!("unsupported curve {curve_name}")))?;
        let settings_mask = decoder.optional_uint(TlvTag::SettingsMask)?.unwrap_or_default();

        Ok(Self {
            card_id: decoder.hex(TlvTag::CardId)?,
            manufacturer_name: decoder.string(TlvTag::ManufacturerName)?,
            status: CardStatus::decode(decoder)?,
            firmware_version: decoder.optional(TlvTag::FirmwareVersion).map(|v| String::from_utf8_lossy(v).into_owned()),
            card_public_key: decoder.optional(TlvTag::CardPublicKey).map(<[u8]>::to_vec),
            settings_mask: SettingsMask(settings_mask as u32),
            curve,
            wallet_public_key: decoder.optional(TlvTag::WalletPublicKey).map(<[u8]>::to_vec),
            max_signatures: decoder.optional_uint(TlvTag::MaxSignatures)?,
            remaining_signatures: decoder.optional_uint(TlvTag::WalletRemainingSignatures)?,
            signed_hashes: decoder.optional_uint(TlvTag::WalletSignedHashes)?,
            pause_before_pin2: decoder.optional_uint(TlvTag::PauseBeforePin2)?,
            health: decoder.optional_uint(TlvTag::Health)?,
            issuer_data_public_key: decoder.optional(TlvTag::IssuerDataPublicKey).map(<[u8]>::to_vec),
            is_activated: decoder.flag(TlvTag::IsActivated),
            is_linked: decoder.flag(TlvTag::IsLinked),
        })
    }

    pub fn wallet(&self) -> Option<WalletPublicKey> {
        self.wallet_public_key
            .as_ref()
            .map(|key| WalletPublicKey::new(key.clone(), self.curve))
    }

    pub fn card_id_bytes(&self) -> Result<Vec<u8>, SessionError> {
        hex::decode(&self.card_id).map_err(|e| SessionError::Serialize(format!("card id: {e}")))
    }
}

/// Key pair a linked terminal presents on read.
pub struct TerminalKeys {
    secret: SigningKey,
    public: Vec<u8>,
}

impl TerminalKeys {
    pub fn generate() -> Self {
        let secret = SigningKey::random(&mut OsRng);
        let public = secret.verifying_key().to_encoded_point(false).as_bytes().to_vec();
        Self { secret, public }
    }

    pub fn public_key(&self) -> &[u8] {
        &self.public
    }

    pub fn signing_key(&self) -> &SigningKey {
        &self.secret
    }
}

/// State owned by one running session.
///
/// The session key is present only while `encryption_mode` is not `None`
/// and the tag has stayed connected since it was negotiated.
pub struct SessionEnvironment {
    pub encryption_mode: EncryptionMode,
    pub encryption_key: Option<SessionKey>,
    pub terminal_keys: Option<TerminalKeys>,
    pub legacy_mode: bool,
    pub pin1: Zeroizing<[u8; 32]>,
    pub pin2: Zeroizing<[u8; 32]>,
    pub cvc: Option<String>,
    pub card: Option<Card>,
    pub(crate) tag_uid: Option<Vec<u8>>,
    pub(crate) tag_seen: bool,
}

impl SessionEnvironment {
    pub fn new(config: &CardConfig, legacy_mode: bool) -> Self {
        let terminal_keys = (config.linked_terminal && !legacy_mode).then(TerminalKeys::generate);
        Self {
            encryption_mode: EncryptionMode::None,
            encryption_key: None,
            terminal_keys,
            legacy_mode,
            pin1: Zeroizing::new(sha256(config.default_pin1.as_bytes())),
            pin2: Zeroizing::new(sha256(config.default_pin2.as_bytes())),
            cvc: None,
            card: None,
            tag_uid: None,
            tag_seen: false,
        }
    }

    pub fn set_pin1(&mut self, pin: &str) {
        self.pin1 = Zeroizing::new(sha256(pin.as_bytes()));
    }

    pub fn set_pin2(&mut self, pin: &str) {
        self.pin2 = Zeroizing::new(sha256(pin.as_bytes()));
    }

    /// UID of the tag currently in the field.
    pub fn tag_uid(&self) -> Option<&[u8]> {
        self.tag_uid.as_deref()
    }

    /// Drops the session key; the mode is kept so the next command renegotiates.
    pub fn clear_key(&mut self) {
        self.encryption_key = None;
    }

    pub fn card(&self) -> Result<&Card, SessionError> {
        self.card.as_ref().ok_or(SessionError::MissingPreflightRead)
    }
}

impl fmt::Debug for SessionEnvironment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionEnvironment")
            .field("encryption_mode", &self.encryption_mode)
            .field("has_key", &self.encryption_key.is_some())
            .field("linked", &self.terminal_keys.is_some())
            .field("legacy_mode", &self.legacy_mode)
            .field("card", &self.card.as_ref().map(|c| c.card_id.as_str()))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::card::tlv::TlvBuilder;

    fn card_payload() -> Vec<u8> {
        TlvBuilder::new()
            .append(TlvTag::CardId, &[0xCB, 0x22, 0x00, 0x01])
            .unwrap()
            .append_str(TlvTag::ManufacturerName, "ACME")
            .unwrap()
            .append_u8(TlvTag::Status, 2)
            .unwrap()
            .append_str(TlvTag::CurveId, "secp256k1")
            .unwrap()
            .append_u32(TlvTag::SettingsMask, SettingsMask::PROHIBIT_PURGE_WALLET)
            .unwrap()
            .append(TlvTag::WalletPublicKey, &[2; 33])
            .unwrap()
            .append_u32(TlvTag::WalletRemainingSignatures, 99)
            .unwrap()
            .append(TlvTag::IsLinked, &[])
            .unwrap()
            .finish()
    }

    #[test]
    fn test_card_decode() {
        let card = Card::decode(&TlvDecoder::new(&card_payload()).unwrap()).unwrap();
        assert_eq!(card.card_id, "CB220001");
        assert_eq!(card.status, CardStatus::Loaded);
        assert_eq!(card.curve, EllipticCurve::Secp256k1);
        assert!(card.settings_mask.contains(SettingsMask::PROHIBIT_PURGE_WALLET));
        assert_eq!(card.remaining_signatures, Some(99));
        assert!(card.is_linked);
        assert!(!card.is_activated);
        assert_eq!(card.wallet().unwrap().key, vec![2; 33]);
        assert_eq!(card.card_id_bytes().unwrap(), vec![0xCB, 0x22, 0x00, 0x01]);
    }

    #[test]
    fn test_environment_defaults() {
        let config = CardConfig::default();
        let env = SessionEnvironment::new(&config, false);
        assert!(env.terminal_keys.is_some());
        assert_eq!(*env.pin1, sha256(b"000000"));
        assert_eq!(env.card(), Err(SessionError::MissingPreflightRead));

        let legacy = SessionEnvironment::new(&config, true);
        assert!(legacy.terminal_keys.is_none());
    }
}
