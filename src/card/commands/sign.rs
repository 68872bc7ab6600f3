use k256::ecdsa::signature::Signer;

use crate::card::apdu::{CommandApdu, Instruction, ResponseApdu};
use crate::card::commands::{authorized_payload_with_pin2, Command};
use crate::card::environment::{Card, CardStatus, SessionEnvironment};
use crate::card::error::{SessionError, SessionResult};
use crate::card::tlv::{TlvDecoder, TlvTag};

pub const MAX_HASHES_PER_COMMAND: usize = 10;
const SIGNATURE_LEN: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignResponse {
    pub card_id: String,
    /// One 64-byte signature per hash, in request order.
    pub signatures: Vec<Vec<u8>>,
    pub remaining_signatures: Option<u64>,
    pub signed_hashes: Option<u64>,
}

/// Signs up to ten equal-length hashes with the card's wallet key.
#[derive(Debug, Clone)]
pub struct SignCommand {
    hashes: Vec<Vec<u8>>,
    wallet_public_key: Option<Vec<u8>>,
}

impl SignCommand {
    pub fn new(hashes: Vec<Vec<u8>>) -> SessionResult<Self> {
        let first = hashes.first().ok_or(SessionError::EmptyHashes)?;
        if hashes.len() > MAX_HASHES_PER_COMMAND {
            return Err(SessionError::TooManyHashes(hashes.len()));
        }
        if first.is_empty() || first.len() > usize::from(u16::MAX) {
            return Err(SessionError::InvalidHashSize(first.len()));
        }
        if hashes.iter().any(|h| h.len() != first.len()) {
            return Err(SessionError::HashSizeMustBeEqual);
        }
        Ok(Self {
            hashes,
            wallet_public_key: None,
        })
    }

    /// Refuse to sign unless the card holds this wallet key.
    pub fn for_wallet(mut self, public_key: Vec<u8>) -> Self {
        self.wallet_public_key = Some(public_key);
        self
    }

    pub fn hashes(&self) -> &[Vec<u8>] {
        &self.hashes
    }
}

impl Command for SignCommand {
    type Response = SignResponse;

    fn instruction(&self) -> Instruction {
        Instruction::Sign
    }

    fn pre_check(&self, card: &Card) -> SessionResult<()> {
        match card.status {
            CardStatus::Loaded => {}
            CardStatus::Empty => return Err(SessionError::WalletNotCreated),
            CardStatus::Purged => return Err(SessionError::WalletPurged),
            CardStatus::NotPersonalized => return Err(SessionError::NotPersonalized),
        }
        if card.remaining_signatures == Some(0) {
            return Err(SessionError::NoRemainingSignatures);
        }
        if let Some(expected) = &self.wallet_public_key {
            if card.wallet_public_key.as_ref() != Some(expected) {
                return Err(SessionError::WalletMismatch);
            }
        }
        Ok(())
    }

    fn serialize(&self, env: &SessionEnvironment) -> SessionResult<CommandApdu> {
        let joined = self.hashes.concat();
        let mut tlv = authorized_payload_with_pin2(env)?;
        // Whole messages (ed25519) can exceed one byte of size.
        match u8::try_from(self.hashes[0].len()) {
            Ok(size) => tlv.append_u8(TlvTag::TransactionOutHashSize, size)?,
            Err(_) => tlv.append_u16(TlvTag::TransactionOutHashSize, self.hashes[0].len() as u16)?,
        };
        tlv.append(TlvTag::TransactionOutHash, &joined)?;

        let linked = env.card.as_ref().is_some_and(|card| card.is_linked);
        if let (true, Some(keys)) = (linked, env.terminal_keys.as_ref()) {
            let signature: k256::ecdsa::Signature = keys.signing_key().sign(&joined);
            tlv.append(TlvTag::TerminalTransactionSignature, &signature.to_bytes())?;
        }
        Ok(CommandApdu::new(self.instruction(), tlv.finish()))
    }

    fn deserialize(&self, _env: &SessionEnvironment, response: ResponseApdu) -> SessionResult<SignResponse> {
        let decoder = TlvDecoder::new(&response.data)?;
        let raw = decoder.bytes(TlvTag::Signature)?;
        if raw.len() != self.hashes.len() * SIGNATURE_LEN {
            return Err(SessionError::Deserialize(format!(
                "{} signature bytes for {} hashes",
                raw.len(),
                self.hashes.len()
            )));
        }
        Ok(SignResponse {
            card_id: decoder.hex(TlvTag::CardId)?,
            signatures: raw.chunks(SIGNATURE_LEN).map(<[u8]>::to_vec).collect(),
            remaining_signatures: decoder.optional_uint(TlvTag::WalletRemainingSignatures)?,
            signed_hashes: decoder.optional_uint(TlvTag::WalletSignedHashes)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::card::apdu::StatusWord;
    use crate::card::environment::SettingsMask;
    use crate::card::tlv::TlvBuilder;
    use crate::config::schema::CardConfig;
    use crate::transaction::EllipticCurve;

    fn loaded_card() -> Card {
        Card {
            card_id: "CB22000000000001".to_string(),
            manufacturer_name: "ACME".to_string(),
            status: CardStatus::Loaded,
            firmware_version: None,
            card_public_key: None,
            settings_mask: SettingsMask::default(),
            curve: EllipticCurve::Secp256k1,
            wallet_public_key: Some(vec![2; 33]),
            max_signatures: None,
            remaining_signatures: Some(5),
            signed_hashes: None,
            pause_before_pin2: None,
            health: None,
            issuer_data_public_key: None,
            is_activated: false,
            is_linked: false,
        }
    }

    #[test]
    fn test_hash_validation() {
        assert_eq!(SignCommand::new(vec![]).unwrap_err(), SessionError::EmptyHashes);
        assert_eq!(
            SignCommand::new(vec![vec![1; 32]; 11]).unwrap_err(),
            SessionError::TooManyHashes(11)
        );
        assert_eq!(
            SignCommand::new(vec![vec![1; 32], vec![1; 20]]).unwrap_err(),
            SessionError::HashSizeMustBeEqual
        );
        assert_eq!(
            SignCommand::new(vec![vec![]]).unwrap_err(),
            SessionError::InvalidHashSize(0)
        );
        assert!(SignCommand::new(vec![vec![1; 32]; 10]).is_ok());
        assert!(SignCommand::new(vec![vec![1; 400]]).is_ok());
    }

    #[test]
    fn test_pre_check() {
        let command = SignCommand::new(vec![vec![1; 32]]).unwrap();
        assert!(command.pre_check(&loaded_card()).is_ok());

        let mut card = loaded_card();
        card.status = CardStatus::Empty;
        assert_eq!(command.pre_check(&card), Err(SessionError::WalletNotCreated));

        let mut card = loaded_card();
        card.remaining_signatures = Some(0);
        assert_eq!(command.pre_check(&card), Err(SessionError::NoRemainingSignatures));

        let other = command.clone().for_wallet(vec![3; 33]);
        assert_eq!(other.pre_check(&loaded_card()), Err(SessionError::WalletMismatch));
    }

    #[test]
    fn test_round_trip_with_card() {
        let mut env = SessionEnvironment::new(&CardConfig::default(), false);
        env.card = Some(loaded_card());
        let command = SignCommand::new(vec![vec![0xAA; 32], vec![0xBB; 32]]).unwrap();

        let apdu = command.serialize(&env).unwrap();
        let decoder = TlvDecoder::new(&apdu.data).unwrap();
        assert_eq!(decoder.uint(TlvTag::TransactionOutHashSize).unwrap(), 32);
        assert_eq!(decoder.bytes(TlvTag::TransactionOutHash).unwrap().len(), 64);
        assert_eq!(decoder.hex(TlvTag::CardId).unwrap(), "CB22000000000001");
        assert!(decoder.optional(TlvTag::TerminalTransactionSignature).is_none());

        let data = TlvBuilder::new()
            .append_hex(TlvTag::CardId, "CB22000000000001")
            .unwrap()
            .append(TlvTag::Signature, &[7; 128])
            .unwrap()
            .append_u32(TlvTag::WalletRemainingSignatures, 3)
            .unwrap()
            .finish();
        let response = command
            .deserialize(&env, ResponseApdu::new(data, StatusWord::ProcessCompleted))
            .unwrap();
        assert_eq!(response.signatures.len(), 2);
        assert_eq!(response.remaining_signatures, Some(3));

        let short = TlvBuilder::new()
            .append_hex(TlvTag::CardId, "CB22000000000001")
            .unwrap()
            .append(TlvTag::Signature, &[7; 64])
            .unwrap()
            .finish();
        assert!(command
            .deserialize(&env, ResponseApdu::new(short, StatusWord::ProcessCompleted))
            .is_err());
    }

    #[test]
    fn test_linked_card_gets_terminal_signature() {
        let mut env = SessionEnvironment::new(&CardConfig::default(), false);
        let mut card = loaded_card();
        card.is_linked = true;
        env.card = Some(card);

        let apdu = SignCommand::new(vec![vec![1; 32]]).unwrap().serialize(&env).unwrap();
        let decoder = TlvDecoder::new(&apdu.data).unwrap();
        assert_eq!(decoder.bytes(TlvTag::TerminalTransactionSignature).unwrap().len(), 64);
    }
}
