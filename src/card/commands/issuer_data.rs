use crate::card::apdu::{CommandApdu, Instruction, ResponseApdu};
use crate::card::commands::{authorized_payload, Command};
use crate::card::crypto::verify_issuer_signature;
use crate::card::environment::{Card, SessionEnvironment, SettingsMask};
use crate::card::error::{SessionError, SessionResult};
use crate::card::tlv::{TlvDecoder, TlvTag};

pub const MAX_ISSUER_DATA_SIZE: usize = 512;

/// Bytes an issuer signs: `card_id ‖ data [‖ counter]`.
pub(crate) fn issuer_message(card_id: &[u8], data: &[u8], counter: Option<u32>) -> Vec<u8> {
    let mut message = Vec::with_capacity(card_id.len() + data.len() + 4);
    message.extend_from_slice(card_id);
    message.extend_from_slice(data);
    if let Some(counter) = counter {
        message.extend_from_slice(&counter.to_be_bytes());
    }
    message
}

/// Explicit key wins over the one personalized on the card.
pub(crate) fn issuer_key(explicit: Option<&Vec<u8>>, card: Option<&Card>) -> SessionResult<Vec<u8>> {
    explicit
        .cloned()
        .or_else(|| card.and_then(|c| c.issuer_data_public_key.clone()))
        .ok_or(SessionError::MissingIssuerPublicKey)
}

pub(crate) fn counter_from(decoder: &TlvDecoder) -> SessionResult<Option<u32>> {
    decoder
        .optional_uint(TlvTag::IssuerDataCounter)?
        .map(|c| u32::try_from(c).map_err(|_| SessionError::Deserialize(format!("issuer data counter {c}"))))
        .transpose()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadIssuerDataResponse {
    pub card_id: String,
    pub issuer_data: Vec<u8>,
    pub issuer_data_signature: Vec<u8>,
    pub issuer_data_counter: Option<u32>,
}

/// Reads the issuer's data block and verifies its signature.
#[derive(Debug, Default, Clone)]
pub struct ReadIssuerDataCommand {
    issuer_public_key: Option<Vec<u8>>,
}

impl ReadIssuerDataCommand {
    pub fn new(issuer_public_key: Option<Vec<u8>>) -> Self {
        Self { issuer_public_key }
    }
}

impl Command for ReadIssuerDataCommand {
    type Response = ReadIssuerDataResponse;

    fn instruction(&self) -> Instruction {
        Instruction::ReadIssuerData
    }

    fn serialize(&self, env: &SessionEnvironment) -> SessionResult<CommandApdu> {
        let mut tlv = authorized_payload(env)?;
        Ok(CommandApdu::new(self.instruction(), tlv.finish()))
    }

    fn deserialize(&self, env: &SessionEnvironment, response: ResponseApdu) -> SessionResult<ReadIssuerDataResponse> {
        let decoder = TlvDecoder::new(&response.data)?;
        let response = ReadIssuerDataResponse {
            card_id: decoder.hex(TlvTag::CardId)?,
            issuer_data: decoder.optional(TlvTag::IssuerData).map(<[u8]>::to_vec).unwrap_or_default(),
            issuer_data_signature: decoder
                .optional(TlvTag::IssuerDataSignature)
                .map(<[u8]>::to_vec)
                .unwrap_or_default(),
            issuer_data_counter: counter_from(&decoder)?,
        };

        // An unwritten block has nothing to verify.
        if !response.issuer_data.is_empty() {
            let key = issuer_key(self.issuer_public_key.as_ref(), env.card.as_ref())?;
            let card_id = hex::decode(&response.card_id).map_err(|e| SessionError::Deserialize(e.to_string()))?;
            let message = issuer_message(&card_id, &response.issuer_data, response.issuer_data_counter);
            verify_issuer_signature(&key, &message, &response.issuer_data_signature)?;
        }
        Ok(response)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteIssuerDataResponse {
    pub card_id: String,
}

/// Writes a signed issuer data block.
#[derive(Debug, Clone)]
pub struct WriteIssuerDataCommand {
    issuer_data: Vec<u8>,
    issuer_data_signature: Vec<u8>,
    issuer_data_counter: Option<u32>,
    issuer_public_key: Option<Vec<u8>>,
}

impl WriteIssuerDataCommand {
    pub fn new(
        issuer_data: Vec<u8>,
        issuer_data_signature: Vec<u8>,
        issuer_data_counter: Option<u32>,
        issuer_public_key: Option<Vec<u8>>,
    ) -> Self {
        Self {
            issuer_data,
            issuer_data_signature,
            issuer_data_counter,
            issuer_public_key,
        }
    }
}

impl Command for WriteIssuerDataCommand {
    type Response = WriteIssuerDataResponse;

    fn instruction(&self) -> Instruction {
        Instruction::WriteIssuerData
    }

    fn pre_check(&self, card: &Card) -> SessionResult<()> {
        if self.issuer_data.len() > MAX_ISSUER_DATA_SIZE {
            return Err(SessionError::DataSizeTooLarge {
                size: self.issuer_data.len(),
                max: MAX_ISSUER_DATA_SIZE,
            });
        }
        if card.settings_mask.contains(SettingsMask::PROTECT_ISSUER_DATA_AGAINST_REPLAY)
            && self.issuer_data_counter.is_none()
        {
            return Err(SessionError::MissingCounter);
        }
        let key = issuer_key(self.issuer_public_key.as_ref(), Some(card))?;
        let message = issuer_message(&card.card_id_bytes()?, &self.issuer_data, self.issuer_data_counter);
        verify_issuer_signature(&key, &message, &self.issuer_data_signature)
    }

    fn serialize(&self, env: &SessionEnvironment) -> SessionResult<CommandApdu> {
        let mut tlv = authorized_payload(env)?;
        tlv.append(TlvTag::IssuerData, &self.issuer_data)?
            .append(TlvTag::IssuerDataSignature, &self.issuer_data_signature)?;
        if let Some(counter) = self.issuer_data_counter {
            tlv.append_u32(TlvTag::IssuerDataCounter, counter)?;
        }
        Ok(CommandApdu::new(self.instruction(), tlv.finish()))
    }

    fn deserialize(&self, _env: &SessionEnvironment, response: ResponseApdu) -> SessionResult<WriteIssuerDataResponse> {
        let decoder = TlvDecoder::new(&response.data)?;
        Ok(WriteIssuerDataResponse {
            card_id: decoder.hex(TlvTag::CardId)?,
        })
    }
}
