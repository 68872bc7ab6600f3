//! Tag-length-value payload encoding.
//!
//! One tag byte, then a one-byte length, or `0xFF` followed by a big-endian
//! u16 length for values of 255 bytes or more.

use crate::card::error::SessionError;

/// Tags used by the commands in this crate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum TlvTag {
    CardId = 0x01,
    Status = 0x02,
    CardPublicKey = 0x03,
    CurveId = 0x05,
    SigningMethod = 0x07,
    MaxSignatures = 0x08,
    PauseBeforePin2 = 0x09,
    SettingsMask = 0x0A,
    Uid = 0x0B,
    CardData = 0x0C,
    Health = 0x0F,
    Pin = 0x10,
    Pin2 = 0x11,
    Cvc = 0x19,
    SessionKeyA = 0x1A,
    SessionKeyB = 0x1B,
    Pause = 0x1C,
    ManufacturerName = 0x20,
    Offset = 0x23,
    Size = 0x25,
    Flash = 0x28,
    Mode = 0x29,
    IssuerDataPublicKey = 0x30,
    IssuerData = 0x32,
    IssuerDataSignature = 0x33,
    IssuerDataCounter = 0x35,
    IsActivated = 0x3A,
    TransactionOutHash = 0x50,
    TransactionOutHashSize = 0x51,
    TerminalTransactionSignature = 0x57,
    IsLinked = 0x58,
    TerminalPublicKey = 0x5C,
    WalletPublicKey = 0x60,
    Signature = 0x61,
    WalletRemainingSignatures = 0x62,
    WalletSignedHashes = 0x63,
    FirmwareVersion = 0x80,
}

/// One decoded entry. Unknown tags are kept as raw bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tlv {
    pub tag: u8,
    pub value: Vec<u8>,
}

/// Accumulates TLVs for a command payload.
#[derive(Debug, Default, Clone)]
pub struct TlvBuilder {
    out: Vec<u8>,
}

impl TlvBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&mut self, tag: TlvTag, value: &[u8]) -> Result<&mut Self, SessionError> {
        self.out.push(tag as u8);
        if value.len() < 0xFF {
            self.out.push(value.len() as u8);
        } else {
            let len = u16::try_from(value.len())
                .map_err(|_| SessionError::Serialize(format!("{tag:?} value of {} bytes", value.len())))?;
            self.out.push(0xFF);
            self.out.extend_from_slice(&len.to_be_bytes());
        }
        self.out.extend_from_slice(value);
        Ok(self)
    }

    pub fn append_u8(&mut self, tag: TlvTag, value: u8) -> Result<&mut Self, SessionError> {
        self.append(tag, &[value])
    }

    pub fn append_u16(&mut self, tag: TlvTag, value: u16) -> Result<&mut Self, SessionError> {
        self.append(tag, &value.to_be_bytes())
    }

    pub fn append_u32(&mut self, tag: TlvTag, value: u32) -> Result<&mut Self, SessionError> {
        self.append(tag, &value.to_be_bytes())
    }

    pub fn append_hex(&mut self, tag: TlvTag, value: &str) -> Result<&mut Self, SessionError> {
        let bytes = hex::decode(value).map_err(|e| SessionError::Serialize(format!("{tag:?}: {e}")))?;
        self.append(tag, &bytes)
    }

    pub fn append_str(&mut self, tag: TlvTag, value: &str) -> Result<&mut Self, SessionError> {
        self.append(tag, value.as_bytes())
    }

    pub fn finish(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.out)
    }
}

/// Parse a whole payload into TLVs.
pub fn decode(bytes: &[u8]) -> Result<Vec<Tlv>, SessionError> {
    let truncated = |at: usize| SessionError::Deserialize(format!("TLV truncated at byte {at}"));
    let mut entries = Vec::new();
    let mut i = 0;
    while i < bytes.len() {
        let tag = bytes[i];
        let mut len = usize::from(*bytes.get(i + 1).ok_or_else(|| truncated(i))?);
        i += 2;
        if len == 0xFF {
            let hi = *bytes.get(i).ok_or_else(|| truncated(i))?;
            let lo = *bytes.get(i + 1).ok_or_else(|| truncated(i))?;
            len = usize::from(u16::from_be_bytes([hi, lo]));
            i += 2;
        }
        let value = bytes.get(i..i + len).ok_or_else(|| truncated(i))?;
        entries.push(Tlv {
            tag,
            value: value.to_vec(),
        });
        i += len;
    }
    Ok(entries)
}

/// Typed lookups over a decoded payload.
#[derive(Debug, Clone)]
pub struct TlvDecoder {
    entries: Vec<Tlv>,
}

impl TlvDecoder {
    pub fn new(bytes: &[u8]) -> Result<Self, SessionError> {
        Ok(Self { entries: decode(bytes)? })
    }

    pub fn optional(&self, tag: TlvTag) -> Option<&[u8]> {
        self.entries
            .iter()
            .find(|entry| entry.tag == tag as u8)
            .map(|entry| entry.value.as_slice())
    }

    pub fn bytes(&self, tag: TlvTag) -> Result<Vec<u8>, SessionError> {
        self.optional(tag)
            .map(<[u8]>::to_vec)
            .ok_or_else(|| SessionError::Deserialize(format!("missing {tag:?}")))
    }

    pub fn hex(&self, tag: TlvTag) -> Result<String, SessionError> {
        Ok(hex::encode_upper(self.bytes(tag)?))
    }

    pub fn string(&self, tag: TlvTag) -> Result<String, SessionError> {
        String::from_utf8(self.bytes(tag)?)
            .map_err(|e| SessionError::Deserialize(format!("{tag:?} is not UTF-8: {e}")))
    }

    /// Big-endian unsigned integer of up to eight bytes.
    pub fn uint(&self, tag: TlvTag) -> Result<u64, SessionError> {
        let bytes = self.bytes(tag)?;
        if bytes.is_empty() || bytes.len() > 8 {
            return Err(SessionError::Deserialize(format!("{tag:?} has {} bytes", bytes.len())));
        }
        Ok(bytes.iter().fold(0u64, |acc, b| (acc << 8) | u64::from(*b)))
    }

    pub fn optional_uint(&self, tag: TlvTag) -> Result<Option<u64>, SessionError> {
        match self.optional(tag) {
            Some(_) => self.uint(tag).map(Some),
            None => Ok(None),
        }
    }

    /// Presence flag (empty value) or one-byte boolean.
    pub fn flag(&self, tag: TlvTag) -> bool {
        match self.optional(tag) {
            Some([]) => true,
            Some(value) => value.iter().any(|b| *b != 0),
            None => false,
        }
    }
}
