use crate::error::Error;
use crate::error::ErrorList;

use crate::bundle::*;
use crate::crc::{crc_len, CrcBlock, CrcRawType, CrcValue};
use crate::eid::*;
use crate::flags::*;
use core::fmt;
use serde::de::{SeqAccess, Visitor};
use serde::ser::{self, SerializeSeq, Serializer};
use serde::{de, Deserialize, Deserializer, Serialize};
use thiserror::Error;

/******************************
 *
 * Canonical Block
 *
 ******************************/

pub type CanonicalBlockType = u64;

pub(crate) const PAYLOAD_BLOCK_NUMBER: CanonicalBlockNumberType = 1;

// PAYLOAD_BLOCK is a BlockType for a payload block as defined in 4.2.3.
pub const PAYLOAD_BLOCK: CanonicalBlockType = 1;

// PREVIOUS_NODE_BLOCK is a BlockType for a Previous Node block as defined
// in section 4.4.1.
pub const PREVIOUS_NODE_BLOCK: CanonicalBlockType = 6;

// BUNDLE_AGE_BLOCK is a BlockType for a Bundle Age block as defined in
// section 4.4.2.
pub const BUNDLE_AGE_BLOCK: CanonicalBlockType = 7;

// HOP_COUNT_BLOCK is a BlockType for a Hop Count block as defined in
// section 4.4.3.
pub const HOP_COUNT_BLOCK: CanonicalBlockType = 10;

#[derive(Debug, Clone, PartialEq, Default)]
pub struct CanonicalBlockBuilder {
    block_type: CanonicalBlockType,
    block_number: CanonicalBlockNumberType,
    block_control_flags: BlockControlFlagsType,
    crc: CrcValue,
    data: Option<CanonicalData>,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CanonicalBuilderError {
    #[error("Missing canonical data")]
    MissingData,
}

impl CanonicalBlockBuilder {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn block_type(mut self, block_type: CanonicalBlockType) -> Self {
        self.block_type = block_type;
        self
    }
    pub fn block_number(mut self, block_number: CanonicalBlockNumberType) -> Self {
        self.block_number = block_number;
        self
    }
    pub fn block_control_flags(mut self, block_control_flags: BlockControlFlagsType) -> Self {
        self.block_control_flags = block_control_flags;
        self
    }
    pub fn crc(mut self, crc: CrcValue) -> Self {
        self.crc = crc;
        self
    }
    pub fn data(mut self, data: CanonicalData) -> Self {
        self.data = Some(data);
        self
    }
    pub fn build(self) -> Result<CanonicalBlock, CanonicalBuilderError> {
        if let Some(data) = self.data {
            Ok(CanonicalBlock {
                block_type: self.block_type,
                block_number: self.block_number,
                block_control_flags: self.block_control_flags,
                crc: self.crc,
                data,
            })
        } else {
            Err(CanonicalBuilderError::MissingData)
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CanonicalBlock {
    pub block_type: CanonicalBlockType,
    pub block_number: CanonicalBlockNumberType,
    pub block_control_flags: BlockControlFlagsType,
    pub crc: CrcValue,
    data: CanonicalData,
}

impl Serialize for CanonicalBlock {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        self.serialize_with_crc(&self.crc, serializer)
    }
}

fn decode_block_data<T, E>(raw: &[u8], what: &str) -> Result<T, E>
where
    T: de::DeserializeOwned,
    E: de::Error,
{
    serde_cbor::from_slice(raw)
        .map_err(|err| E::custom(format!("error decoding {} block: {}", what, err)))
}

impl<'de> Deserialize<'de> for CanonicalBlock {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct CanonicalBlockVisitor;

        impl<'de> Visitor<'de> for CanonicalBlockVisitor {
            type Value = CanonicalBlock;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("CanonicalBlock")
            }

            fn visit_seq<V>(self, mut seq: V) -> Result<Self::Value, V::Error>
            where
                V: SeqAccess<'de>,
            {
                let block_type: CanonicalBlockType = seq
                    .next_element()?
                    .ok_or_else(|| de::Error::invalid_length(0, &self))?;
                let block_number: CanonicalBlockNumberType = seq
                    .next_element()?
                    .ok_or_else(|| de::Error::invalid_length(1, &self))?;
                let block_control_flags: BlockControlFlagsType = seq
                    .next_element()?
                    .ok_or_else(|| de::Error::invalid_length(2, &self))?;
                let crc_type: CrcRawType = seq
                    .next_element()?
                    .ok_or_else(|| de::Error::invalid_length(3, &self))?;
                let n_crc = crc_len(crc_type).ok_or_else(|| {
                    de::Error::custom(format!("unknown crc type {}", crc_type))
                })?;

                // get block type specific data as raw byte buffer
                let raw_data: WireBytes = seq
                    .next_element()?
                    .ok_or_else(|| de::Error::invalid_length(4, &self))?;
                let raw_data = raw_data.0;

                // parse nested data according to block_type
                let data = match block_type {
                    PAYLOAD_BLOCK => CanonicalData::Data(raw_data),
                    BUNDLE_AGE_BLOCK => {
                        CanonicalData::BundleAge(decode_block_data(&raw_data, "bundle age")?)
                    }
                    HOP_COUNT_BLOCK => {
                        let (limit, count): (u64, u64) =
                            decode_block_data(&raw_data, "hop count")?;
                        CanonicalData::HopCount(limit, count)
                    }
                    PREVIOUS_NODE_BLOCK => {
                        CanonicalData::PreviousNode(decode_block_data(&raw_data, "previous node")?)
                    }
                    _ => CanonicalData::Unknown(raw_data),
                };

                let crc = if n_crc == 0 {
                    CrcValue::CrcNo
                } else {
                    let crcbuf: WireBytes = seq
                        .next_element()?
                        .ok_or_else(|| de::Error::invalid_length(5, &self))?;
                    CrcValue::from_wire(crc_type, &crcbuf.0).map_err(de::Error::custom)?
                };

                Ok(CanonicalBlock {
                    block_type,
                    block_number,
                    block_control_flags,
                    crc,
                    data,
                })
            }
        }

        deserializer.deserialize_seq(CanonicalBlockVisitor)
    }
}
impl Default for CanonicalBlock {
    fn default() -> Self {
        CanonicalBlock::new()
    }
}

impl CrcBlock for CanonicalBlock {
    fn crc_value(&self) -> &CrcValue {
        &self.crc
    }
    fn set_crc(&mut self, crc: CrcValue) {
        self.crc = crc;
    }
    fn serialize_with_crc<S>(&self, crc: &CrcValue, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let crc_bytes = crc.bytes();
        let num_elems = if crc_bytes.is_some() { 6 } else { 5 };

        let mut seq = serializer.serialize_seq(Some(num_elems))?;
        seq.serialize_element(&self.block_type)?;
        seq.serialize_element(&self.block_number)?;
        seq.serialize_element(&self.block_control_flags)?;
        seq.serialize_element(&crc.to_code())?;
        match self.data {
            CanonicalData::Data(ref payload) | CanonicalData::Unknown(ref payload) => {
                seq.serialize_element(&serde_bytes::Bytes::new(payload))?;
            }
            _ => {
                let inner = self.data.to_cbor().map_err(ser::Error::custom)?;
                seq.serialize_element(&serde_bytes::Bytes::new(&inner))?;
            }
        };
        if let Some(bytes) = crc_bytes {
            seq.serialize_element(&serde_bytes::Bytes::new(bytes))?;
        }

        seq.end()
    }
}

pub fn new_canonical_block(
    block_type: CanonicalBlockType,
    block_number: CanonicalBlockNumberType,
    block_control_flags: BlockControlFlagsType,
    data: CanonicalData,
) -> CanonicalBlock {
    CanonicalBlock {
        block_type,
        block_number,
        block_control_flags,
        crc: CrcValue::CrcNo,
        data,
    }
}

impl CanonicalBlock {
    pub fn new() -> CanonicalBlock {
        CanonicalBlock {
            block_type: PAYLOAD_BLOCK,
            block_number: PAYLOAD_BLOCK_NUMBER,
            block_control_flags: 0,
            crc: CrcValue::CrcNo,
            data: CanonicalData::Data(Vec::new()),
        }
    }

    pub fn validate(&self) -> Result<(), ErrorList> {
        let mut errors: ErrorList = Vec::new();

        if self.block_number == 0 {
            errors.push(Error::CanonicalBlockError(format!(
                "block of type {} has block number 0, reserved for the primary block",
                self.block_type
            )));
        }
        if crc_len(self.crc_type()).is_none() {
            errors.push(Error::InvalidCrcType(self.crc_type()));
        }
        if let Err(err) = self.extension_validation() {
            errors.push(err);
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
    pub fn extension_validation(&self) -> Result<(), Error> {
        let expected_type = match &self.data {
            CanonicalData::Data(_) => {
                if self.block_type == PAYLOAD_BLOCK && self.block_number != PAYLOAD_BLOCK_NUMBER
                {
                    return Err(Error::CanonicalBlockError(
                        "Payload Block's block number is not one".to_string(),
                    ));
                }
                PAYLOAD_BLOCK
            }
            CanonicalData::BundleAge(_) => BUNDLE_AGE_BLOCK,
            CanonicalData::HopCount(limit, _) => {
                if *limit == 0 || *limit > 255 {
                    return Err(Error::CanonicalBlockError(format!(
                        "hop limit {} outside of 1..=255",
                        limit
                    )));
                }
                HOP_COUNT_BLOCK
            }
            CanonicalData::PreviousNode(prev_eid) => {
                prev_eid.validate()?;
                PREVIOUS_NODE_BLOCK
            }
            CanonicalData::Unknown(_) => {
                if matches!(
                    self.block_type,
                    PAYLOAD_BLOCK | PREVIOUS_NODE_BLOCK | BUNDLE_AGE_BLOCK | HOP_COUNT_BLOCK
                ) {
                    return Err(Error::CanonicalBlockError(format!(
                        "opaque data for known block type {}",
                        self.block_type
                    )));
                }
                // Nothing to check as content is unknown
                return Ok(());
            }
        };
        if self.block_type != expected_type {
            return Err(Error::CanonicalBlockError(format!(
                "data of block type {} stored in block of type {}",
                expected_type, self.block_type
            )));
        }
        Ok(())
    }
    pub fn data(&self) -> &CanonicalData {
        &self.data
    }
    pub fn set_data(&mut self, data: CanonicalData) {
        self.data = data;
    }
    pub fn payload_data(&self) -> Option<&ByteBuffer> {
        match &self.data {
            CanonicalData::Data(data) => Some(data),
            _ => None,
        }
    }
    pub fn hop_count_get(&self) -> Option<(u64, u64)> {
        if self.block_type == HOP_COUNT_BLOCK {
            if let CanonicalData::HopCount(hc_limit, hc_count) = self.data() {
                return Some((*hc_limit, *hc_count));
            }
        }
        None
    }
    pub fn hop_count_increase(&mut self) -> bool {
        if let Some((hc_limit, hc_count)) = self.hop_count_get() {
            self.set_data(CanonicalData::HopCount(hc_limit, hc_count.saturating_add(1)));
            return true;
        }
        false
    }
    pub fn hop_count_exceeded(&self) -> bool {
        matches!(self.hop_count_get(), Some((limit, count)) if count > limit)
    }
    pub fn bundle_age_update(&mut self, age: u64) -> bool {
        if self.bundle_age_get().is_some() {
            self.set_data(CanonicalData::BundleAge(age));
            return true;
        }
        false
    }
    /// Bundle age in milliseconds.
    pub fn bundle_age_get(&self) -> Option<u64> {
        if self.block_type == BUNDLE_AGE_BLOCK {
            if let CanonicalData::BundleAge(age) = self.data() {
                return Some(*age);
            }
        }
        None
    }
    pub fn previous_node_update(&mut self, nodeid: EndpointID) -> bool {
        if self.previous_node_get().is_some() {
            self.set_data(CanonicalData::PreviousNode(nodeid));
            return true;
        }
        false
    }
    pub fn previous_node_get(&self) -> Option<&EndpointID> {
        if self.block_type == PREVIOUS_NODE_BLOCK {
            if let CanonicalData::PreviousNode(eid) = self.data() {
                return Some(eid);
            }
        }
        None
    }
}

/// Block type specific data.
///
/// Decoding is driven by the block type code, see the `CanonicalBlock` deserializer.
#[derive(Debug, Serialize, Clone, PartialEq)]
#[serde(untagged)]
pub enum CanonicalData {
    HopCount(u64, u64),
    Data(#[serde(with = "serde_bytes")] ByteBuffer),
    BundleAge(u64),
    PreviousNode(EndpointID),
    Unknown(#[serde(with = "serde_bytes")] ByteBuffer),
}
impl CanonicalData {
    pub fn to_cbor(&self) -> Result<ByteBuffer, serde_cbor::Error> {
        serde_cbor::to_vec(&self)
    }
}

/// the hop count limit must be between 1 and 255 (RFC 9171: Sec. 4.4.3)
pub fn new_hop_count_block(
    block_number: CanonicalBlockNumberType,
    bcf: BlockControlFlags,
    limit: u64,
) -> CanonicalBlock {
    new_canonical_block(
        HOP_COUNT_BLOCK,
        block_number,
        bcf.bits(),
        CanonicalData::HopCount(limit, 0),
    )
}

pub fn new_payload_block(bcf: BlockControlFlags, data: ByteBuffer) -> CanonicalBlock {
    new_canonical_block(
        PAYLOAD_BLOCK,
        PAYLOAD_BLOCK_NUMBER,
        bcf.bits(),
        CanonicalData::Data(data),
    )
}

pub fn new_previous_node_block(
    block_number: CanonicalBlockNumberType,
    bcf: BlockControlFlags,
    prev: EndpointID,
) -> CanonicalBlock {
    new_canonical_block(
        PREVIOUS_NODE_BLOCK,
        block_number,
        bcf.bits(),
        CanonicalData::PreviousNode(prev),
    )
}

pub fn new_bundle_age_block(
    block_number: CanonicalBlockNumberType,
    bcf: BlockControlFlags,
    time_in_millis: u64,
) -> CanonicalBlock {
    new_canonical_block(
        BUNDLE_AGE_BLOCK,
        block_number,
        bcf.bits(),
        CanonicalData::BundleAge(time_in_millis),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn typed_data_is_wrapped_in_byte_string() {
        let blk = new_bundle_age_block(2, BlockControlFlags::empty(), 1000);
        let buf = serde_cbor::to_vec(&blk).unwrap();
        // [7, 2, 0, 0, h'1903e8']
        assert_eq!(buf, vec![0x85, 7, 2, 0, 0, 0x43, 0x19, 0x03, 0xe8]);
    }

    #[test]
    fn payload_block_number_must_be_one() {
        let mut blk = new_payload_block(BlockControlFlags::empty(), b"abc".to_vec());
        assert!(blk.validate().is_ok());
        blk.block_number = 3;
        assert!(blk.validate().is_err());
        blk.block_number = 0;
        assert_eq!(blk.validate().unwrap_err().len(), 2);
    }

    #[test]
    fn data_must_match_type() {
        let blk = new_canonical_block(HOP_COUNT_BLOCK, 2, 0, CanonicalData::BundleAge(3));
        assert!(blk.validate().is_err());
        let blk = new_canonical_block(BUNDLE_AGE_BLOCK, 2, 0, CanonicalData::Unknown(vec![]));
        assert!(blk.validate().is_err());
        let blk = new_canonical_block(192, 2, 0, CanonicalData::Unknown(vec![1, 2]));
        assert!(blk.validate().is_ok());
    }

    #[test]
    fn byte_string_required_for_block_data() {
        // payload given as text string instead of byte string
        let buf = [0x85, 1, 1, 0, 0, 0x63, b'a', b'b', b'c'];
        assert!(serde_cbor::from_slice::<CanonicalBlock>(&buf).is_err());
    }
}
