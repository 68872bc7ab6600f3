//! Chunked transfer of the issuer's extra data area.
//!
//! # Write sequence
//! ```text
//! Start    (Mode=1, Size, start signature [, Counter])
//! Part × N (Mode=2, Offset, IssuerData ≤ 512 bytes)
//! Finalize (Mode=3, final signature)
//! ```
//! The start signature covers `card_id [‖ counter] ‖ size`, the final one
//! `card_id ‖ data [‖ counter]`.

use async_trait::async_trait;

use crate::card::apdu::{CommandApdu, Instruction, ResponseApdu};
use crate::card::commands::issuer_data::{counter_from, issuer_key, issuer_message};
use crate::card::commands::{authorized_payload, Command};
use crate::card::crypto::verify_issuer_signature;
use crate::card::environment::{Card, SessionEnvironment, SettingsMask};
use crate::card::error::{SessionError, SessionResult};
use crate::card::session::{CardSession, CardSessionRunnable};
use crate::card::tlv::{TlvDecoder, TlvTag};

pub const MAX_EXTRA_DATA_SIZE: usize = 32 * 1024;
pub const EXTRA_DATA_CHUNK_SIZE: usize = 512;

pub(crate) fn start_message(card_id: &[u8], counter: Option<u32>, size: usize) -> SessionResult<Vec<u8>> {
    let size = u16::try_from(size).map_err(|_| SessionError::DataSizeTooLarge {
        size,
        max: MAX_EXTRA_DATA_SIZE,
    })?;
    let mut message = card_id.to_vec();
    if let Some(counter) = counter {
        message.extend_from_slice(&counter.to_be_bytes());
    }
    message.extend_from_slice(&size.to_be_bytes());
    Ok(message)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
enum WriteMode {
    Start = 1,
    Part = 2,
    Finalize = 3,
}

struct ReadChunk {
    offset: u32,
}

struct Chunk {
    size: Option<u64>,
    data: Vec<u8>,
    signature: Option<Vec<u8>>,
    counter: Option<u32>,
}

impl Command for ReadChunk {
    type Response = Chunk;

    fn instruction(&self) -> Instruction {
        Instruction::ReadIssuerExtraData
    }

    fn serialize(&self, env: &SessionEnvironment) -> SessionResult<CommandApdu> {
        let mut tlv = authorized_payload(env)?;
        tlv.append_u32(TlvTag::Offset, self.offset)?;
        Ok(CommandApdu::new(self.instruction(), tlv.finish()))
    }

    fn deserialize(&self, _env: &SessionEnvironment, response: ResponseApdu) -> SessionResult<Chunk> {
        let decoder = TlvDecoder::new(&response.data)?;
        Ok(Chunk {
            size: decoder.optional_uint(TlvTag::Size)?,
            data: decoder.optional(TlvTag::IssuerData).map(<[u8]>::to_vec).unwrap_or_default(),
            signature: decoder.optional(TlvTag::IssuerDataSignature).map(<[u8]>::to_vec),
            counter: counter_from(&decoder)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadIssuerExtraDataResponse {
    pub card_id: String,
    pub issuer_data: Vec<u8>,
    pub issuer_data_signature: Vec<u8>,
    pub issuer_data_counter: Option<u32>,
}

/// Reads the extra data area chunk by chunk and verifies the final signature.
#[derive(Debug, Default, Clone)]
pub struct ReadIssuerExtraDataTask {
    issuer_public_key: Option<Vec<u8>>,
}

impl ReadIssuerExtraDataTask {
    pub fn new(issuer_public_key: Option<Vec<u8>>) -> Self {
        Self { issuer_public_key }
    }
}

#[async_trait]
impl CardSessionRunnable for ReadIssuerExtraDataTask {
    type Response = ReadIssuerExtraDataResponse;

    async fn run(&self, session: &CardSession) -> SessionResult<ReadIssuerExtraDataResponse> {
        let card = session.card().await.ok_or(SessionError::MissingPreflightRead)?;
        let key = issuer_key(self.issuer_public_key.as_ref(), Some(&card))?;

        let first = session.send(&ReadChunk { offset: 0 }).await?;
        let size = first
            .size
            .ok_or_else(|| SessionError::Deserialize("first extra data chunk has no size".to_string()))?;
        let size = usize::try_from(size).unwrap_or(usize::MAX);
        if size > MAX_EXTRA_DATA_SIZE {
            return Err(SessionError::DataSizeTooLarge {
                size,
                max: MAX_EXTRA_DATA_SIZE,
            });
        }

        let mut data = first.data;
        let mut signature = first.signature;
        let mut counter = first.counter;
        while data.len() < size {
            let chunk = session.send(&ReadChunk { offset: data.len() as u32 }).await?;
            if chunk.data.is_empty() {
                return Err(SessionError::Deserialize(format!(
                    "extra data ended at {} of {size} bytes",
                    data.len()
                )));
            }
            data.extend_from_slice(&chunk.data);
            signature = chunk.signature.or(signature);
            counter = chunk.counter.or(counter);
        }
        data.truncate(size);
        tracing::debug!(session_id = %session.id(), size, "Issuer extra data read");

        let signature = signature.unwrap_or_default();
        if !data.is_empty() {
            let message = issuer_message(&card.card_id_bytes()?, &data, counter);
            verify_issuer_signature(&key, &message, &signature)?;
        }

        Ok(ReadIssuerExtraDataResponse {
            card_id: card.card_id,
            issuer_data: data,
            issuer_data_signature: signature,
            issuer_data_counter: counter,
        })
    }
}

struct WriteStep<'a> {
    mode: WriteMode,
    offset: u32,
    data: &'a [u8],
    total_size: usize,
    signature: &'a [u8],
    counter: Option<u32>,
}

impl Command for WriteStep<'_> {
    type Response = ();

    fn instruction(&self) -> Instruction {
        Instruction::WriteIssuerExtraData
    }

    fn serialize(&self, env: &SessionEnvironment) -> SessionResult<CommandApdu> {
        let mut tlv = authorized_payload(env)?;
        tlv.append_u8(TlvTag::Mode, self.mode as u8)?;
        match self.mode {
            WriteMode::Start => {
                tlv.append_u32(TlvTag::Size, self.total_size as u32)?
                    .append(TlvTag::IssuerDataSignature, self.signature)?;
                if let Some(counter) = self.counter {
                    tlv.append_u32(TlvTag::IssuerDataCounter, counter)?;
                }
            }
            WriteMode::Part => {
                tlv.append_u32(TlvTag::Offset, self.offset)?
                    .append(TlvTag::IssuerData, self.data)?;
            }
            WriteMode::Finalize => {
                tlv.append(TlvTag::IssuerDataSignature, self.signature)?;
            }
        }
        Ok(CommandApdu::new(self.instruction(), tlv.finish()))
    }

    fn deserialize(&self, _env: &SessionEnvironment, response: ResponseApdu) -> SessionResult<()> {
        TlvDecoder::new(&response.data)?.bytes(TlvTag::CardId)?;
        Ok(())
    }
}

/// Writes up to 32 KiB of signed extra data.
#[derive(Debug, Clone)]
pub struct WriteIssuerExtraDataTask {
    issuer_data: Vec<u8>,
    start_signature: Vec<u8>,
    finalize_signature: Vec<u8>,
    issuer_data_counter: Option<u32>,
    issuer_public_key: Option<Vec<u8>>,
}

impl WriteIssuerExtraDataTask {
    pub fn new(
        issuer_data: Vec<u8>,
        start_signature: Vec<u8>,
        finalize_signature: Vec<u8>,
        issuer_data_counter: Option<u32>,
        issuer_public_key: Option<Vec<u8>>,
    ) -> Self {
        Self {
            issuer_data,
            start_signature,
            finalize_signature,
            issuer_data_counter,
            issuer_public_key,
        }
    }

    fn verify(&self, card: &Card) -> SessionResult<()> {
        if self.issuer_data.len() > MAX_EXTRA_DATA_SIZE {
            return Err(SessionError::DataSizeTooLarge {
                size: self.issuer_data.len(),
                max: MAX_EXTRA_DATA_SIZE,
            });
        }
        if card.settings_mask.contains(SettingsMask::PROTECT_ISSUER_DATA_AGAINST_REPLAY)
            && self.issuer_data_counter.is_none()
        {
            return Err(SessionError::MissingCounter);
        }

        let key = issuer_key(self.issuer_public_key.as_ref(), Some(card))?;
        let card_id = card.card_id_bytes()?;
        let start = start_message(&card_id, self.issuer_data_counter, self.issuer_data.len())?;
        verify_issuer_signature(&key, &start, &self.start_signature)?;
        let finalize = issuer_message(&card_id, &self.issuer_data, self.issuer_data_counter);
        verify_issuer_signature(&key, &finalize, &self.finalize_signature)
    }
}

#[async_trait]
impl CardSessionRunnable for WriteIssuerExtraDataTask {
    type Response = String;

    async fn run(&self, session: &CardSession) -> SessionResult<String> {
        let card = session.card().await.ok_or(SessionError::MissingPreflightRead)?;
        self.verify(&card)?;

        let mut step = WriteStep {
            mode: WriteMode::Start,
            offset: 0,
            data: &[],
            total_size: self.issuer_data.len(),
            signature: &self.start_signature,
            counter: self.issuer_data_counter,
        };
        session.send(&step).await?;

        for (index, chunk) in self.issuer_data.chunks(EXTRA_DATA_CHUNK_SIZE).enumerate() {
            step.mode = WriteMode::Part;
            step.offset = (index * EXTRA_DATA_CHUNK_SIZE) as u32;
            step.data = chunk;
            session.send(&step).await?;
        }

        step.mode = WriteMode::Finalize;
        step.data = &[];
        step.signature = &self.finalize_signature;
        session.send(&step).await?;

        tracing::debug!(session_id = %session.id(), size = self.issuer_data.len(), "Issuer extra data written");
        Ok(card.card_id)
    }
}
