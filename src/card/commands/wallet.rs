use crate::card::apdu::{CommandApdu, Instruction, ResponseApdu, StatusWord};
use crate::card::commands::{authorized_payload_with_pin2, Command};
use crate::card::environment::{Card, CardStatus, SessionEnvironment, SettingsMask};
use crate::card::error::{SessionError, SessionResult};
use crate::card::tlv::{TlvDecoder, TlvTag};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateWalletResponse {
    pub card_id: String,
    pub status: CardStatus,
    pub wallet_public_key: Vec<u8>,
}

/// Generates the wallet key on an empty card.
#[derive(Debug, Default, Clone)]
pub struct CreateWalletCommand;

impl CreateWalletCommand {
    pub fn new() -> Self {
        Self
    }
}

impl Command for CreateWalletCommand {
    type Response = CreateWalletResponse;

    fn instruction(&self) -> Instruction {
        Instruction::CreateWallet
    }

    fn pre_check(&self, card: &Card) -> SessionResult<()> {
        match card.status {
            CardStatus::Empty => Ok(()),
            CardStatus::Loaded => Err(SessionError::AlreadyCreated),
            CardStatus::Purged => Err(SessionError::WalletPurged),
            CardStatus::NotPersonalized => Err(SessionError::NotPersonalized),
        }
    }

    fn serialize(&self, env: &SessionEnvironment) -> SessionResult<CommandApdu> {
        let mut tlv = authorized_payload_with_pin2(env)?;
        Ok(CommandApdu::new(self.instruction(), tlv.finish()))
    }

    fn deserialize(&self, _env: &SessionEnvironment, response: ResponseApdu) -> SessionResult<CreateWalletResponse> {
        let decoder = TlvDecoder::new(&response.data)?;
        Ok(CreateWalletResponse {
            card_id: decoder.hex(TlvTag::CardId)?,
            status: CardStatus::decode(&decoder)?,
            wallet_public_key: decoder.bytes(TlvTag::WalletPublicKey)?,
        })
    }

    fn map_error(&self, _card: Option<&Card>, status: StatusWord) -> SessionError {
        match status {
            StatusWord::InvalidState => SessionError::AlreadyCreated,
            StatusWord::InvalidParams => SessionError::AccessCodeRequired,
            other => SessionError::Card(other),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PurgeWalletResponse {
    pub card_id: String,
    pub status: CardStatus,
}

/// Destroys the wallet key.
#[derive(Debug, Default, Clone)]
pub struct PurgeWalletCommand;

impl PurgeWalletCommand {
    pub fn new() -> Self {
        Self
    }
}

impl Command for PurgeWalletCommand {
    type Response = PurgeWalletResponse;

    fn instruction(&self) -> Instruction {
        Instruction::PurgeWallet
    }

    fn pre_check(&self, card: &Card) -> SessionResult<()> {
        match card.status {
            CardStatus::Loaded => {}
            CardStatus::Empty => return Err(SessionError::WalletNotCreated),
            CardStatus::Purged => return Err(SessionError::WalletPurged),
            CardStatus::NotPersonalized => return Err(SessionError::NotPersonalized),
        }
        if card.settings_mask.contains(SettingsMask::PROHIBIT_PURGE_WALLET) {
            return Err(SessionError::PurgeProhibited);
        }
        Ok(())
    }

    fn serialize(&self, env: &SessionEnvironment) -> SessionResult<CommandApdu> {
        let mut tlv = authorized_payload_with_pin2(env)?;
        Ok(CommandApdu::new(self.instruction(), tlv.finish()))
    }

    fn deserialize(&self, _env: &SessionEnvironment, response: ResponseApdu) -> SessionResult<PurgeWalletResponse> {
        let decoder = TlvDecoder::new(&response.data)?;
        Ok(PurgeWalletResponse {
            card_id: decoder.hex(TlvTag::CardId)?,
            status: CardStatus::decode(&decoder)?,
        })
    }
}
