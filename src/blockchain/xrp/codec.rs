//! XRP Ledger canonical binary codec, limited to the fields a
//! `Payment` or `TrustSet` needs.

use std::collections::BTreeMap;

use rust_decimal::Decimal;
use sha2::{Digest, Sha256, Sha512};

use crate::transaction::{BuildError, BuildResult};

/// `STX\0`, prefixed to a blob before signing.
pub const SIGNING_PREFIX: [u8; 4] = [0x53, 0x54, 0x58, 0x00];
/// `TXN\0`, prefixed to a signed blob to derive its hash.
pub const TRANSACTION_ID_PREFIX: [u8; 4] = [0x54, 0x58, 0x4E, 0x00];

const ACCOUNT_ID_VERSION: u8 = 0x00;
const MAX_DROPS: u64 = 100_000_000_000_000_000;
const NATIVE_POSITIVE: u64 = 0x4000_0000_0000_0000;
const ISSUED_NOT_NATIVE: u64 = 0x8000_0000_0000_0000;
const ISSUED_POSITIVE: u64 = 0x4000_0000_0000_0000;
const MIN_MANTISSA: u64 = 1_000_000_000_000_000;
const MAX_MANTISSA: u64 = 9_999_999_999_999_999;
const MIN_EXPONENT: i32 = -96;
const MAX_EXPONENT: i32 = 80;

/// A serialized field identifier, ordered by (type code, field code).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Field {
    pub type_code: u8,
    pub field_code: u8,
}

impl Field {
    const fn new(type_code: u8, field_code: u8) -> Self {
        Self { type_code, field_code }
    }

    pub const TRANSACTION_TYPE: Field = Field::new(1, 2);
    pub const FLAGS: Field = Field::new(2, 2);
    pub const SEQUENCE: Field = Field::new(2, 4);
    pub const DESTINATION_TAG: Field = Field::new(2, 14);
    pub const LAST_LEDGER_SEQUENCE: Field = Field::new(2, 27);
    pub const AMOUNT: Field = Field::new(6, 1);
    pub const LIMIT_AMOUNT: Field = Field::new(6, 3);
    pub const FEE: Field = Field::new(6, 8);
    pub const SIGNING_PUB_KEY: Field = Field::new(7, 3);
    pub const TXN_SIGNATURE: Field = Field::new(7, 4);
    pub const ACCOUNT: Field = Field::new(8, 1);
    pub const DESTINATION: Field = Field::new(8, 3);

    /// Field ID header bytes.
    pub fn header(&self) -> Vec<u8> {
        match (self.type_code < 16, self.field_code < 16) {
            (true, true) => vec![(self.type_code << 4) | self.field_code],
            (true, false) => vec![self.type_code << 4, self.field_code],
            (false, true) => vec![self.field_code, self.type_code],
            (false, false) => vec![0, self.type_code, self.field_code],
        }
    }
}

/// Transaction types this codec emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum TransactionType {
    Payment = 0,
    TrustSet = 20,
}

/// Mantissa and exponent of an issued-currency value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IssuedValue {
    pub negative: bool,
    pub mantissa: u64,
    pub exponent: i32,
}

impl IssuedValue {
    pub const ZERO: IssuedValue = IssuedValue {
        negative: false,
        mantissa: 0,
        exponent: 0,
    };

    /// The largest representable value, used as an open trust limit.
    pub const MAX: IssuedValue = IssuedValue {
        negative: false,
        mantissa: MAX_MANTISSA,
        exponent: MAX_EXPONENT,
    };

    /// Normalize a decimal into the 16-significant-digit form.
    ///
    /// Digits beyond sixteen are truncated.
    pub fn from_decimal(value: Decimal) -> BuildResult<Self> {
        if value.is_zero() {
            return Ok(Self::ZERO);
        }
        let negative = value.is_sign_negative();
        let mut mantissa = value.mantissa().unsigned_abs();
        let mut exponent = -(value.scale() as i32);

        while mantissa > u128::from(MAX_MANTISSA) {
            mantissa /= 10;
            exponent += 1;
        }
        while mantissa < u128::from(MIN_MANTISSA) {
            mantissa *= 10;
            exponent -= 1;
        }
        if !(MIN_EXPONENT..=MAX_EXPONENT).contains(&exponent) {
            return Err(BuildError::AmountOverflow(format!("issued value {value} out of range")));
        }
        Ok(Self {
            negative,
            mantissa: mantissa as u64,
            exponent,
        })
    }

    pub fn to_bits(&self) -> u64 {
        if self.mantissa == 0 {
            return ISSUED_NOT_NATIVE;
        }
        let sign = if self.negative { 0 } else { ISSUED_POSITIVE };
        let exponent = (self.exponent + 97) as u64;
        ISSUED_NOT_NATIVE | sign | (exponent << 54) | self.mantissa
    }
}

/// An `Amount`-typed field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum XrpAmount {
    Drops(u64),
    Issued {
        value: IssuedValue,
        currency: [u8; 20],
        issuer: [u8; 20],
    },
}

impl XrpAmount {
    fn encode(&self, out: &mut Vec<u8>) -> BuildResult<()> {
        match self {
            XrpAmount::Drops(drops) => {
                if *drops > MAX_DROPS {
                    return Err(BuildError::AmountOverflow(format!("{drops} drops")));
                }
                out.extend_from_slice(&(NATIVE_POSITIVE | drops).to_be_bytes());
            }
            XrpAmount::Issued { value, currency, issuer } => {
                out.extend_from_slice(&value.to_bits().to_be_bytes());
                out.extend_from_slice(currency);
                out.extend_from_slice(issuer);
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    UInt16(u16),
    UInt32(u32),
    Amount(XrpAmount),
    Blob(Vec<u8>),
    Account([u8; 20]),
}

/// A transaction as a sorted field map.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XrpTransaction {
    fields: BTreeMap<Field, FieldValue>,
}

impl XrpTransaction {
    pub fn new(kind: TransactionType) -> Self {
        let mut fields = BTreeMap::new();
        fields.insert(Field::TRANSACTION_TYPE, FieldValue::UInt16(kind as u16));
        Self { fields }
    }

    pub fn set(&mut self, field: Field, value: FieldValue) -> &mut Self {
        self.fields.insert(field, value);
        self
    }

    pub fn get(&self, field: &Field) -> Option<&FieldValue> {
        self.fields.get(field)
    }

    /// Canonical bytes, optionally leaving out the signature.
    pub fn serialize(&self, for_signing: bool) -> BuildResult<Vec<u8>> {
        let mut out = Vec::with_capacity(256);
        for (field, value) in &self.fields {
            if for_signing && *field == Field::TXN_SIGNATURE {
                continue;
            }
            out.extend_from_slice(&field.header());
            match value {
                FieldValue::UInt16(v) => out.extend_from_slice(&v.to_be_bytes()),
                FieldValue::UInt32(v) => out.extend_from_slice(&v.to_be_bytes()),
                FieldValue::Amount(amount) => amount.encode(&mut out)?,
                FieldValue::Blob(bytes) => {
                    encode_vl_length(&mut out, bytes.len())?;
                    out.extend_from_slice(bytes);
                }
                FieldValue::Account(id) => {
                    encode_vl_length(&mut out, id.len())?;
                    out.extend_from_slice(id);
                }
            }
        }
        Ok(out)
    }
}

/// Variable-length prefix for blobs and account IDs.
pub fn encode_vl_length(out: &mut Vec<u8>, len: usize) -> BuildResult<()> {
    match len {
        0..=192 => out.push(len as u8),
        193..=12480 => {
            let rest = len - 193;
            out.push(193 + (rest >> 8) as u8);
            out.push((rest & 0xff) as u8);
        }
        12481..=918744 => {
            let rest = len - 12481;
            out.push(241 + (rest >> 16) as u8);
            out.push(((rest >> 8) & 0xff) as u8);
            out.push((rest & 0xff) as u8);
        }
        _ => return Err(BuildError::BuildFailed(format!("field of {len} bytes is too long"))),
    }
    Ok(())
}

/// First half of SHA-512.
pub fn sha512_half(parts: &[&[u8]]) -> [u8; 32] {
    let mut hasher = Sha512::new();
    for part in parts {
        hasher.update(part);
    }
    let digest = hasher.finalize();
    let mut out = [0u8; 32];
    out.copy_from_slice(&digest[..32]);
    out
}

fn checksum(payload: &[u8]) -> [u8; 4] {
    let digest = Sha256::digest(Sha256::digest(payload));
    [digest[0], digest[1], digest[2], digest[3]]
}

/// Decode a classic `r...` address into its 20-byte account ID.
pub fn decode_account_id(address: &str) -> BuildResult<[u8; 20]> {
    let invalid = || BuildError::InvalidAddress(address.to_string());
    let bytes = bs58::decode(address)
        .with_alphabet(bs58::Alphabet::RIPPLE)
        .into_vec()
        .map_err(|_| invalid())?;
    if bytes.len() != 25 || bytes[0] != ACCOUNT_ID_VERSION {
        return Err(invalid());
    }
    if checksum(&bytes[..21]) != bytes[21..] {
        return Err(invalid());
    }
    let mut id = [0u8; 20];
    id.copy_from_slice(&bytes[1..21]);
    Ok(id)
}

pub fn encode_account_id(id: &[u8; 20]) -> String {
    let mut payload = Vec::with_capacity(25);
    payload.push(ACCOUNT_ID_VERSION);
    payload.extend_from_slice(id);
    let check = checksum(&payload);
    payload.extend_from_slice(&check);
    bs58::encode(payload)
        .with_alphabet(bs58::Alphabet::RIPPLE)
        .into_string()
}

/// Standard three-character code, or a raw 40-hex-digit code.
pub fn currency_code(code: &str) -> BuildResult<[u8; 20]> {
    let invalid = || BuildError::BuildFailed(format!("invalid currency code {code}"));
    let mut out = [0u8; 20];
    if code.len() == 3 && code.is_ascii() {
        if code == "XRP" {
            return Err(invalid());
        }
        out[12..15].copy_from_slice(code.as_bytes());
        return Ok(out);
    }
    if code.len() == 40 {
        let raw = hex::decode(code).map_err(|_| invalid())?;
        out.copy_from_slice(&raw);
        return Ok(out);
    }
    Err(invalid())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_account_id_vectors() {
        let cases = [
            ("rHb9CJAWyB4rj91VRWn96DkukG4bwdtyTh", "b5f762798a53d543a014caf8b297cff8f2f937e8"),
            ("rrrrrrrrrrrrrrrrrrrrrhoLvTp", "0000000000000000000000000000000000000000"),
            ("rPT1Sjq2YGrBMTttX4GZHjKu9dyfzbpAYe", "f667b0ca50cc7709a220b0561b85e53a48461fa8"),
        ];
        for (address, id) in cases {
            let decoded = decode_account_id(address).unwrap();
            assert_eq!(hex::encode(decoded), id, "{address}");
            assert_eq!(encode_account_id(&decoded), address);
        }
    }

    #[test]
    fn test_bad_checksum_rejected() {
        assert!(decode_account_id("rHb9CJAWyB4rj91VRWn96DkukG4bwdtyTi").is_err());
        assert!(decode_account_id("not an address").is_err());
    }

    #[test]
    fn test_field_headers() {
        assert_eq!(Field::TRANSACTION_TYPE.header(), vec![0x12]);
        assert_eq!(Field::ACCOUNT.header(), vec![0x81]);
        assert_eq!(Field::FEE.header(), vec![0x68]);
        assert_eq!(Field::LAST_LEDGER_SEQUENCE.header(), vec![0x20, 0x1B]);
    }

    #[test]
    fn test_vl_length_boundaries() {
        let encode = |len| {
            let mut out = Vec::new();
            encode_vl_length(&mut out, len).unwrap();
            out
        };
        assert_eq!(encode(33), vec![33]);
        assert_eq!(encode(192), vec![192]);
        assert_eq!(encode(193), vec![193, 0]);
        assert_eq!(encode(12480), vec![240, 255]);
        assert_eq!(encode(12481), vec![241, 0, 0]);
    }

    #[test]
    fn test_amounts() {
        let mut out = Vec::new();
        XrpAmount::Drops(1).encode(&mut out).unwrap();
        assert_eq!(hex::encode(&out), "4000000000000001");

        assert_eq!(IssuedValue::from_decimal(dec!(1)).unwrap().to_bits(), 0xD483_8D7E_A4C6_8000);
        assert_eq!(IssuedValue::from_decimal(dec!(0)).unwrap().to_bits(), 0x8000_0000_0000_0000);
        let negative = IssuedValue::from_decimal(dec!(-1)).unwrap().to_bits();
        assert_eq!(negative, 0x9483_8D7E_A4C6_8000);
        assert!(XrpAmount::Drops(MAX_DROPS + 1).encode(&mut Vec::new()).is_err());
    }

    #[test]
    fn test_currency_codes() {
        let usd = currency_code("USD").unwrap();
        assert_eq!(&usd[12..15], b"USD");
        assert!(usd[..12].iter().all(|b| *b == 0));
        assert!(currency_code("XRP").is_err());
        let raw = "0158415500000000C1F76FF6ECB0BAC600000000";
        assert_eq!(hex::encode_upper(currency_code(raw).unwrap()), raw);
    }

    #[test]
    fn test_fields_serialize_in_canonical_order() {
        let mut tx = XrpTransaction::new(TransactionType::Payment);
        tx.set(Field::ACCOUNT, FieldValue::Account([1; 20]))
            .set(Field::FEE, FieldValue::Amount(XrpAmount::Drops(12)))
            .set(Field::SEQUENCE, FieldValue::UInt32(5))
            .set(Field::TXN_SIGNATURE, FieldValue::Blob(vec![9; 3]));

        let signed = tx.serialize(false).unwrap();
        let mut expected = vec![0x12, 0x00, 0x00, 0x24, 0, 0, 0, 5, 0x68];
        expected.extend_from_slice(&0x4000_0000_0000_000Cu64.to_be_bytes());
        expected.extend_from_slice(&[0x74, 3, 9, 9, 9, 0x81, 20]);
        expected.extend_from_slice(&[1; 20]);
        assert_eq!(signed, expected);

        let unsigned = tx.serialize(true).unwrap();
        assert_eq!(unsigned.len(), signed.len() - 5);
    }
}
