//! APDU framing and status words.
//!
//! # Command layout
//! ```text
//! CLA(0x00) INS P1(encryption mode) P2(0x00) 0x00 LEN_HI LEN_LO DATA...
//! ```
//! Responses are `DATA... SW1 SW2`.

use std::fmt;

use crate::card::error::SessionError;

const CLA: u8 = 0x00;

/// Card instructions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Instruction {
    Read = 0xF2,
    WriteIssuerData = 0xF6,
    ReadIssuerData = 0xF7,
    CreateWallet = 0xF8,
    Sign = 0xFB,
    PurgeWallet = 0xFC,
    OpenSession = 0xFF,
    WriteIssuerExtraData = 0xD6,
    ReadIssuerExtraData = 0xD7,
}

impl Instruction {
    pub fn from_u8(ins: u8) -> Option<Self> {
        match ins {
            0xF2 => Some(Instruction::Read),
            0xF6 => Some(Instruction::WriteIssuerData),
            0xF7 => Some(Instruction::ReadIssuerData),
            0xF8 => Some(Instruction::CreateWallet),
            0xFB => Some(Instruction::Sign),
            0xFC => Some(Instruction::PurgeWallet),
            0xFF => Some(Instruction::OpenSession),
            0xD6 => Some(Instruction::WriteIssuerExtraData),
            0xD7 => Some(Instruction::ReadIssuerExtraData),
            _ => None,
        }
    }

    /// Label used in logs and metrics.
    pub fn name(&self) -> &'static str {
        match self {
            Instruction::Read => "read",
            Instruction::WriteIssuerData => "write_issuer_data",
            Instruction::ReadIssuerData => "read_issuer_data",
            Instruction::CreateWallet => "create_wallet",
            Instruction::Sign => "sign",
            Instruction::PurgeWallet => "purge_wallet",
            Instruction::OpenSession => "open_session",
            Instruction::WriteIssuerExtraData => "write_issuer_extra_data",
            Instruction::ReadIssuerExtraData => "read_issuer_extra_data",
        }
    }
}

/// Encryption applied to APDU payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum EncryptionMode {
    #[default]
    None = 0,
    Fast = 1,
    Strong = 3,
}

impl EncryptionMode {
    pub fn from_p1(p1: u8) -> Option<Self> {
        match p1 {
            0 => Some(EncryptionMode::None),
            1 => Some(EncryptionMode::Fast),
            3 => Some(EncryptionMode::Strong),
            _ => None,
        }
    }
}

/// Card status words.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusWord {
    ProcessCompleted,
    Pin1Changed,
    NeedPause,
    NeedEncryption,
    InvalidParams,
    ErrorProcessingCommand,
    InvalidState,
    InsNotSupported,
    FileNotFound,
    Unknown(u16),
}

impl StatusWord {
    pub fn from_u16(sw: u16) -> Self {
        match sw {
            0x9000 => StatusWord::ProcessCompleted,
            0x9001 => StatusWord::Pin1Changed,
            0x9789 => StatusWord::NeedPause,
            0x6982 => StatusWord::NeedEncryption,
            0x6A86 => StatusWord::InvalidParams,
            0x6286 => StatusWord::ErrorProcessingCommand,
            0x6985 => StatusWord::InvalidState,
            0x6D00 => StatusWord::InsNotSupported,
            0x6A82 => StatusWord::FileNotFound,
            other => StatusWord::Unknown(other),
        }
    }

    pub fn as_u16(&self) -> u16 {
        match self {
            StatusWord::ProcessCompleted => 0x9000,
            StatusWord::Pin1Changed => 0x9001,
            StatusWord::NeedPause => 0x9789,
            StatusWord::NeedEncryption => 0x6982,
            StatusWord::InvalidParams => 0x6A86,
            StatusWord::ErrorProcessingCommand => 0x6286,
            StatusWord::InvalidState => 0x6985,
            StatusWord::InsNotSupported => 0x6D00,
            StatusWord::FileNotFound => 0x6A82,
            StatusWord::Unknown(sw) => *sw,
        }
    }

    /// The command finished and carries a response.
    pub fn is_success(&self) -> bool {
        matches!(self, StatusWord::ProcessCompleted | StatusWord::Pin1Changed)
    }
}

impl fmt::Display for StatusWord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} ({:#06X})", self, self.as_u16())
    }
}

/// An outgoing command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandApdu {
    pub ins: Instruction,
    pub p1: EncryptionMode,
    pub data: Vec<u8>,
}

impl CommandApdu {
    pub fn new(ins: Instruction, data: Vec<u8>) -> Self {
        Self {
            ins,
            p1: EncryptionMode::None,
            data,
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, SessionError> {
        let len = u16::try_from(self.data.len())
            .map_err(|_| SessionError::Serialize(format!("APDU data of {} bytes", self.data.len())))?;
        let mut out = Vec::with_capacity(7 + self.data.len());
        out.extend_from_slice(&[CLA, self.ins as u8, self.p1 as u8, 0x00, 0x00]);
        out.extend_from_slice(&len.to_be_bytes());
        out.extend_from_slice(&self.data);
        Ok(out)
    }

    /// Parse the card-side view of a command.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, SessionError> {
        let malformed = || SessionError::Deserialize(format!("malformed command APDU of {} bytes", bytes.len()));
        if bytes.len() < 7 || bytes[0] != CLA {
            return Err(malformed());
        }
        let ins = Instruction::from_u8(bytes[1]).ok_or_else(malformed)?;
        let p1 = EncryptionMode::from_p1(bytes[2]).ok_or_else(malformed)?;
        let len = usize::from(u16::from_be_bytes([bytes[5], bytes[6]]));
        let data = bytes.get(7..7 + len).ok_or_else(malformed)?;
        Ok(Self {
            ins,
            p1,
            data: data.to_vec(),
        })
    }
}

/// A card reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseApdu {
    pub data: Vec<u8>,
    pub status: StatusWord,
}

impl ResponseApdu {
    pub fn new(data: Vec<u8>, status: StatusWord) -> Self {
        Self { data, status }
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, SessionError> {
        if bytes.len() < 2 {
            return Err(SessionError::Deserialize(format!(
                "response of {} bytes has no status word",
                bytes.len()
            )));
        }
        let (data, sw) = bytes.split_at(bytes.len() - 2);
        Ok(Self {
            data: data.to_vec(),
            status: StatusWord::from_u16(u16::from_be_bytes([sw[0], sw[1]])),
        })
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = self.data.clone();
        out.extend_from_slice(&self.status.as_u16().to_be_bytes());
        out
    }
}
