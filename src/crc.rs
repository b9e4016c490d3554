use crate::error::Error;
use crate::ByteBuffer;
use serde::ser::{Serialize, Serializer};

/******************************
 *
 * CRC
 *
 ******************************/

pub type CrcRawType = u8;

use crc::{Crc, CRC_16_IBM_SDLC, CRC_32_ISO_HDLC};

/// CRC-16 with the CCITT polynomial 0x1021 in its X-25 parameterisation.
pub const X25: Crc<u16> = Crc::<u16>::new(&CRC_16_IBM_SDLC);
/// CRC-32 with the IEEE 802.3 polynomial 0x04C11DB7.
pub const IEEE: Crc<u32> = Crc::<u32>::new(&CRC_32_ISO_HDLC);

#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum CrcValue {
    #[default]
    CrcNo,
    Crc16Empty,
    Crc32Empty,
    Crc16([u8; 2]),
    Crc32([u8; 4]),
    Unknown(CrcRawType),
}

impl CrcValue {
    pub fn has_crc(&self) -> bool {
        !matches!(self, CrcValue::CrcNo)
    }
    pub fn to_code(&self) -> CrcRawType {
        match self {
            CrcValue::CrcNo => CRC_NO,
            CrcValue::Crc16(_) => CRC_16,
            CrcValue::Crc16Empty => CRC_16,
            CrcValue::Crc32(_) => CRC_32,
            CrcValue::Crc32Empty => CRC_32,
            CrcValue::Unknown(code) => *code,
        }
    }
    pub fn bytes(&self) -> Option<&[u8]> {
        match self {
            CrcValue::Unknown(_) => None,
            CrcValue::CrcNo => None,
            CrcValue::Crc16(buf) => Some(buf),
            CrcValue::Crc16Empty => Some(&CRC16_EMPTY),
            CrcValue::Crc32(buf) => Some(buf),
            CrcValue::Crc32Empty => Some(&CRC32_EMPTY),
        }
    }
    /// Empty placeholder of the given type, filled in on the next crc calculation.
    pub fn empty(crc_type: CrcRawType) -> CrcValue {
        match crc_type {
            CRC_NO => CrcValue::CrcNo,
            CRC_16 => CrcValue::Crc16Empty,
            CRC_32 => CrcValue::Crc32Empty,
            _ => CrcValue::Unknown(crc_type),
        }
    }
    /// Build a value from the checksum bytes found on the wire.
    pub fn from_wire(crc_type: CrcRawType, buf: &[u8]) -> Result<CrcValue, String> {
        match crc_type {
            CRC_NO => Ok(CrcValue::CrcNo),
            CRC_16 => buf
                .try_into()
                .map(CrcValue::Crc16)
                .map_err(|_| format!("crc16 value must be 2 bytes, got {}", buf.len())),
            CRC_32 => buf
                .try_into()
                .map(CrcValue::Crc32)
                .map_err(|_| format!("crc32 value must be 4 bytes, got {}", buf.len())),
            _ => Err(format!("unknown crc type {}", crc_type)),
        }
    }
}
pub(crate) const CRC16_EMPTY: [u8; 2] = [0; 2];
pub(crate) const CRC32_EMPTY: [u8; 4] = [0; 4];

pub const CRC_NO: CrcRawType = 0;
pub const CRC_16: CrcRawType = 1;
pub const CRC_32: CrcRawType = 2;

/// Number of checksum bytes for a known crc type.
pub fn crc_len(crc_type: CrcRawType) -> Option<usize> {
    match crc_type {
        CRC_NO => Some(0),
        CRC_16 => Some(2),
        CRC_32 => Some(4),
        _ => None,
    }
}

pub trait CrcTypeName {
    fn crc_name(self) -> &'static str;
}
impl CrcTypeName for CrcRawType {
    fn crc_name(self) -> &'static str {
        match self {
            CRC_NO => "no",
            CRC_16 => "16",
            CRC_32 => "32",
            _ => "unknown",
        }
    }
}

/// Checksum of `data` for the given crc type.
pub fn checksum(crc_type: CrcRawType, data: &[u8]) -> Result<CrcValue, Error> {
    match crc_type {
        CRC_NO => Ok(CrcValue::CrcNo),
        CRC_16 => Ok(CrcValue::Crc16(X25.checksum(data).to_be_bytes())),
        CRC_32 => Ok(CrcValue::Crc32(IEEE.checksum(data).to_be_bytes())),
        _ => Err(Error::InvalidCrcType(crc_type)),
    }
}

/// Verify the checksum of a block as it was received.
///
/// `raw` is the complete encoded block whose last bytes hold the crc value.
pub fn verify_raw(crc_type: CrcRawType, raw: &[u8]) -> Result<bool, Error> {
    let n = crc_len(crc_type).ok_or(Error::InvalidCrcType(crc_type))?;
    if n == 0 {
        return Ok(true);
    }
    if raw.len() < n {
        return Ok(false);
    }
    let split = raw.len() - n;
    let mut zeroed = raw.to_vec();
    zeroed[split..].fill(0);
    let computed = checksum(crc_type, &zeroed)?;
    Ok(computed.bytes() == Some(&raw[split..]))
}

pub trait CrcBlock: Sized {
    fn crc_value(&self) -> &CrcValue;
    fn set_crc(&mut self, crc: CrcValue);
    /// Serialize the block with `crc` in place of the stored crc value.
    fn serialize_with_crc<S>(&self, crc: &CrcValue, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer;

    fn has_crc(&self) -> bool {
        self.crc_value().has_crc()
    }
    /// Return the crc type code
    fn crc_type(&self) -> CrcRawType {
        self.crc_value().to_code()
    }
    /// Set crc type
    /// CRC_NO, CRC_16, CRC_32
    fn set_crc_type(&mut self, crc_type: CrcRawType) {
        self.set_crc(CrcValue::empty(crc_type));
    }
    /// Returns raw crc checksum
    fn crc(&self) -> Option<&[u8]> {
        self.crc_value().bytes()
    }
    /// Compute the checksum over the block encoding without touching the stored value.
    fn calculate_crc(&self) -> Result<CrcValue, Error> {
        let crc_type = self.crc_type();
        let n = crc_len(crc_type).ok_or(Error::InvalidCrcType(crc_type))?;
        if n == 0 {
            return Ok(CrcValue::CrcNo);
        }
        let data = encode_block(self)?;
        CrcValue::from_wire(crc_type, &data[data.len() - n..]).map_err(|e| Error::codec(None, e))
    }
    /// Recalculate crc value
    fn update_crc(&mut self) -> Result<(), Error> {
        let new_crc = self.calculate_crc()?;
        self.set_crc(new_crc);
        Ok(())
    }
    /// Check if crc value is valid
    fn check_crc(&self) -> bool {
        if !self.has_crc() {
            return true;
        }
        match self.calculate_crc() {
            Ok(computed) => computed.bytes() == self.crc(),
            Err(_) => false,
        }
    }
}

/// Serializes a block with an explicit crc value.
pub struct WithCrc<'a, B> {
    block: &'a B,
    crc: &'a CrcValue,
}

impl<'a, B: CrcBlock> WithCrc<'a, B> {
    pub fn new(block: &'a B, crc: &'a CrcValue) -> Self {
        WithCrc { block, crc }
    }
}

impl<B: CrcBlock> Serialize for WithCrc<'_, B> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        self.block.serialize_with_crc(self.crc, serializer)
    }
}

/// Encode a block with a freshly computed crc value.
///
/// The block is serialized with a zeroed crc, the checksum is taken over
/// those bytes and written into the trailing crc field.
pub fn encode_block<B: CrcBlock>(blk: &B) -> Result<ByteBuffer, Error> {
    let crc_type = blk.crc_type();
    let n = crc_len(crc_type).ok_or(Error::InvalidCrcType(crc_type))?;
    let placeholder = CrcValue::empty(crc_type);
    let mut data = serde_cbor::to_vec(&WithCrc::new(blk, &placeholder))
        .map_err(|e| Error::codec(None, e))?;
    if n > 0 {
        let sum = checksum(crc_type, &data)?;
        let split = data.len() - n;
        if let Some(bytes) = sum.bytes() {
            data[split..].copy_from_slice(bytes);
        }
    }
    Ok(data)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_check_values() {
        assert_eq!(X25.checksum(b"123456789"), 0x906e);
        assert_eq!(IEEE.checksum(b"123456789"), 0xcbf4_3926);
    }

    #[test]
    fn wire_values_need_exact_length() {
        assert_eq!(
            CrcValue::from_wire(CRC_16, &[1, 2]),
            Ok(CrcValue::Crc16([1, 2]))
        );
        assert!(CrcValue::from_wire(CRC_16, &[1, 2, 3]).is_err());
        assert!(CrcValue::from_wire(CRC_32, &[1, 2]).is_err());
        assert!(CrcValue::from_wire(7, &[]).is_err());
    }

    #[test]
    fn unknown_type_is_rejected() {
        assert_eq!(checksum(9, b"x"), Err(Error::InvalidCrcType(9)));
        assert_eq!(verify_raw(9, b"x"), Err(Error::InvalidCrcType(9)));
    }
}
