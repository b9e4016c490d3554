use core::convert::TryFrom;
use core::fmt;
use serde::de::{self, Deserialize, Deserializer, Visitor};
use serde::ser::{SerializeSeq, Serializer};
use serde::Serialize;
use std::collections::HashSet;
use thiserror::Error;

use crate::bundle_id::BundleId;
use crate::canonical::*;
use crate::crc::*;
use crate::dtntime::*;
use crate::eid::*;
use crate::error::{Error, ErrorList};
use crate::flags::*;
use crate::primary::*;

/// Version for upcoming bundle protocol standard is 7.
pub const DTN_VERSION: u32 = 7;

pub type ByteBuffer = Vec<u8>;

pub type DtnVersionType = u32;
pub type CanonicalBlockNumberType = u64;
pub type FragOffsetType = u64;
pub type LifetimeType = u64;
pub type TotalDataLengthType = u64;

/// A CBOR byte string. Text strings and arrays of integers are rejected.
pub(crate) struct WireBytes(pub ByteBuffer);

impl<'de> Deserialize<'de> for WireBytes {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct WireBytesVisitor;

        impl<'de> Visitor<'de> for WireBytesVisitor {
            type Value = WireBytes;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("a byte string")
            }
            fn visit_bytes<E: de::Error>(self, v: &[u8]) -> Result<Self::Value, E> {
                Ok(WireBytes(v.to_vec()))
            }
            fn visit_byte_buf<E: de::Error>(self, v: Vec<u8>) -> Result<Self::Value, E> {
                Ok(WireBytes(v))
            }
        }

        deserializer.deserialize_byte_buf(WireBytesVisitor)
    }
}

/******************************
 *
 * Bundle
 *
 ******************************/

#[derive(Error, Debug, Clone, PartialEq)]
pub enum BundleBuilderError {
    #[error("no primary block was given")]
    NoPrimaryBlock,
    #[error("no payload block was given")]
    NoPayloadBlock,
    #[error("primary block: {0}")]
    Primary(#[from] PrimaryBuilderError),
    #[error("crc calculation failed: {0}")]
    Crc(#[from] Error),
}

/// Assembles a bundle and computes its checksums.
///
/// Blocks are kept in the order they were added. A payload given through
/// [`BundleBuilder::payload`] is appended as the last block.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct BundleBuilder {
    primary: Option<PrimaryBlock>,
    canonicals: Vec<CanonicalBlock>,
    crc_type: Option<CrcRawType>,
}

impl BundleBuilder {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn primary(mut self, primary: PrimaryBlock) -> Self {
        self.primary = Some(primary);
        self
    }
    pub fn canonicals(mut self, canonicals: Vec<CanonicalBlock>) -> Self {
        self.canonicals = canonicals;
        self
    }
    pub fn canonical(mut self, block: CanonicalBlock) -> Self {
        self.canonicals.push(block);
        self
    }
    pub fn payload(self, data: ByteBuffer) -> Self {
        self.canonical(new_payload_block(BlockControlFlags::empty(), data))
    }
    /// Apply the same crc type to every block.
    pub fn crc(mut self, crc_type: CrcRawType) -> Self {
        self.crc_type = Some(crc_type);
        self
    }
    pub fn build(self) -> Result<Bundle, BundleBuilderError> {
        let primary = self.primary.ok_or(BundleBuilderError::NoPrimaryBlock)?;
        if !self
            .canonicals
            .iter()
            .any(|c| c.block_type == PAYLOAD_BLOCK)
        {
            return Err(BundleBuilderError::NoPayloadBlock);
        }
        let mut bundle = Bundle::new(primary, self.canonicals);
        if let Some(crc_type) = self.crc_type {
            bundle.set_crc(crc_type);
        }
        bundle.calculate_crc()?;
        Ok(bundle)
    }
}

/// Bundle of type Bundle
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Bundle {
    pub primary: PrimaryBlock,
    pub canonicals: Vec<CanonicalBlock>,
}

impl Serialize for Bundle {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut seq = serializer.serialize_seq(None)?;
        seq.serialize_element(&self.primary)?;
        for e in &self.canonicals {
            seq.serialize_element(&e)?;
        }
        seq.end()
    }
}

impl Bundle {
    pub fn new(primary: PrimaryBlock, canonicals: Vec<CanonicalBlock>) -> Bundle {
        Bundle {
            primary,
            canonicals,
        }
    }

    /// Validate bundle and optionally return list of errors.
    pub fn validate(&self) -> Result<(), ErrorList> {
        let mut errors: ErrorList = Vec::new();

        let payload_len = self.payload().map_or(0, |p| p.len() as u64);
        if let Err(mut err) = self.primary.validate_with_payload_len(payload_len) {
            errors.append(&mut err);
        }
        if !self.primary.check_crc() {
            errors.push(Error::CrcMismatch(0));
        }

        let mut b_numbers = HashSet::new();
        let mut b_types = HashSet::new();
        let mut payload_blocks = 0;
        let mut block_status_requested = false;
        for blck in &self.canonicals {
            if let Err(mut err) = blck.validate() {
                errors.append(&mut err);
            }
            if !blck.check_crc() {
                errors.push(Error::CrcMismatch(blck.block_number));
            }
            if !b_numbers.insert(blck.block_number) {
                errors.push(Error::BundleError(format!(
                    "Block number {} occurred multiple times",
                    blck.block_number
                )));
            }
            match blck.block_type {
                PAYLOAD_BLOCK => payload_blocks += 1,
                PREVIOUS_NODE_BLOCK | BUNDLE_AGE_BLOCK | HOP_COUNT_BLOCK => {
                    if !b_types.insert(blck.block_type) {
                        errors.push(Error::BundleError(format!(
                            "Block type {} occurred multiple times",
                            blck.block_type
                        )));
                    }
                }
                _ => {}
            }
            if blck
                .block_control_flags
                .has_block_flag(BlockControlFlags::BLOCK_STATUS_REPORT)
            {
                block_status_requested = true;
            }
        }

        match payload_blocks {
            0 => errors.push(Error::BundleError("Missing payload block".to_string())),
            1 => {
                if self.canonicals.last().map(|c| c.block_type) != Some(PAYLOAD_BLOCK) {
                    errors.push(Error::BundleError(
                        "Payload block is not the last block".to_string(),
                    ));
                }
            }
            n => errors.push(Error::BundleError(format!(
                "{} payload blocks, exactly one is allowed",
                n
            ))),
        }

        if (self.primary.source == EndpointID::none() || self.primary.is_administrative_record())
            && block_status_requested
        {
            errors.push(Error::BundleError(
                "Bundle Processing Control Flags indicate that this bundle's payload is an administrative record or the source node is omitted, but the \"Transmit status report if block cannot be processed\" Block Processing Control Flag was set in a Canonical Block".to_string()
            ));
        }

        if self.primary.creation_timestamp.dtntime() == DTN_TIME_EPOCH
            && !b_types.contains(&BUNDLE_AGE_BLOCK)
        {
            errors.push(Error::BundleError(
                "Creation Timestamp is zero, but no Bundle Age block is present".to_string(),
            ));
        }

        if !errors.is_empty() {
            return Err(errors);
        }
        Ok(())
    }

    pub fn is_valid(&self) -> bool {
        self.validate().is_ok()
    }

    /// All violations wrapped in a single [`Error::ValidationError`].
    pub fn validation_error(&self) -> Option<Error> {
        self.validate().err().map(Error::ValidationError)
    }

    /// Sets the given CRCType for each block. The crc value
    /// is calculated on-the-fly before serializing.
    pub fn set_crc(&mut self, crc_type: CrcRawType) {
        self.primary.set_crc_type(crc_type);
        for b in &mut self.canonicals {
            b.set_crc_type(crc_type);
        }
    }
    /// Check whether a bundle has only valid CRC checksums in all blocks.
    pub fn crc_valid(&self) -> bool {
        self.primary.check_crc() && self.canonicals.iter().all(|b| b.check_crc())
    }
    /// Calculate crc for all blocks.
    pub fn calculate_crc(&mut self) -> Result<(), Error> {
        self.primary.update_crc()?;
        for b in &mut self.canonicals {
            b.update_crc()?;
        }
        Ok(())
    }

    pub fn source(&self) -> &EndpointID {
        &self.primary.source
    }
    pub fn destination(&self) -> &EndpointID {
        &self.primary.destination
    }
    pub fn creation_timestamp(&self) -> CreationTimestamp {
        self.primary.creation_timestamp
    }
    pub fn is_administrative_record(&self) -> bool {
        self.primary.is_administrative_record()
    }

    /// Get first extension block matching the block type
    pub fn extension_block_by_type(
        &self,
        block_type: CanonicalBlockType,
    ) -> Option<&CanonicalBlock> {
        self.canonicals.iter().find(|b| b.block_type == block_type)
    }
    /// Get mutable first extension block matching the block type
    pub fn extension_block_by_type_mut(
        &mut self,
        block_type: CanonicalBlockType,
    ) -> Option<&mut CanonicalBlock> {
        self.canonicals
            .iter_mut()
            .find(|b| b.block_type == block_type)
    }

    pub fn payload_block(&self) -> Option<&CanonicalBlock> {
        self.extension_block_by_type(PAYLOAD_BLOCK)
    }
    /// Return payload of bundle if a payload block exists and carries data.
    pub fn payload(&self) -> Option<&ByteBuffer> {
        self.payload_block().and_then(|b| b.payload_data())
    }
    /// Replace the data of the payload block, the crc must be recalculated afterwards.
    pub fn set_payload(&mut self, data: ByteBuffer) -> Result<(), Error> {
        let blck = self
            .extension_block_by_type_mut(PAYLOAD_BLOCK)
            .ok_or_else(|| Error::BundleError("Missing payload block".to_string()))?;
        blck.set_data(CanonicalData::Data(data));
        Ok(())
    }

    /// Adds an extension block, assigning the next free block number.
    ///
    /// The block is inserted in front of the payload block so the payload
    /// stays last. Returns the assigned block number.
    pub fn add_canonical_block(&mut self, mut blck: CanonicalBlock) -> CanonicalBlockNumberType {
        let highest = self
            .canonicals
            .iter()
            .map(|b| b.block_number)
            .max()
            .unwrap_or(PAYLOAD_BLOCK_NUMBER);
        let number = highest.max(PAYLOAD_BLOCK_NUMBER) + 1;
        blck.block_number = number;
        match self
            .canonicals
            .iter()
            .position(|b| b.block_type == PAYLOAD_BLOCK)
        {
            Some(pos) => self.canonicals.insert(pos, blck),
            None => self.canonicals.push(blck),
        }
        number
    }

    pub fn previous_node(&self) -> Option<&EndpointID> {
        self.extension_block_by_type(PREVIOUS_NODE_BLOCK)
            .and_then(|b| b.previous_node_get())
    }

    /// Update extension blocks such as hop count, bundle age and previous node.
    /// Return true if all successful, omit missing blocks.
    /// Return false if hop count is exceeded, bundle age exceeds life time or bundle lifetime itself is exceeded
    pub fn update_extensions(&mut self, local_node: EndpointID, residence_time: u64) -> bool {
        if let Some(hcblock) = self.extension_block_by_type_mut(HOP_COUNT_BLOCK) {
            hcblock.hop_count_increase();
            if hcblock.hop_count_exceeded() {
                return false;
            }
        }
        if let Some(pnblock) = self.extension_block_by_type_mut(PREVIOUS_NODE_BLOCK) {
            pnblock.previous_node_update(local_node);
        }
        let lifetime = self.primary.lifetime;
        if let Some(bablock) = self.extension_block_by_type_mut(BUNDLE_AGE_BLOCK) {
            if let Some(ba_orig) = bablock.bundle_age_get() {
                let age = ba_orig.saturating_add(residence_time);
                bablock.bundle_age_update(age);
                if age >= lifetime {
                    return false;
                }
            }
        }
        !self.primary.is_lifetime_exceeded(dtn_time_now())
    }

    /// Compare two bundles ignoring the order of their canonical blocks.
    pub fn same_content(&self, other: &Bundle) -> bool {
        if self.primary != other.primary || self.canonicals.len() != other.canonicals.len() {
            return false;
        }
        let mut mine: Vec<&CanonicalBlock> = self.canonicals.iter().collect();
        let mut theirs: Vec<&CanonicalBlock> = other.canonicals.iter().collect();
        mine.sort_by_key(|b| b.block_number);
        theirs.sort_by_key(|b| b.block_number);
        mine == theirs
    }

    /// Serialize bundle as CBOR encoded byte buffer.
    pub fn to_cbor(&self) -> Result<ByteBuffer, Error> {
        crate::codec::encode(self)
    }

    /// Serialize bundle as JSON encoded string.
    pub fn to_json(&self) -> Result<String, Error> {
        Ok(serde_json::to_string(&self)?)
    }

    /// ID when used with a bundle protocol agent
    pub fn id(&self) -> String {
        BundleId::from_bundle(self).to_string()
    }
}

impl TryFrom<&[u8]> for Bundle {
    type Error = Error;
    fn try_from(item: &[u8]) -> Result<Self, Self::Error> {
        crate::codec::decode(item)
    }
}

impl TryFrom<ByteBuffer> for Bundle {
    type Error = Error;
    fn try_from(item: ByteBuffer) -> Result<Self, Self::Error> {
        crate::codec::decode(&item)
    }
}

/// Creates a new bundle with the given endpoints, a hop count block and a payload block.
/// CRC is set to CrcNo by default and the lifetime is set to 60 * 60 seconds.
pub fn new_std_payload_bundle(
    src: EndpointID,
    dst: EndpointID,
    data: ByteBuffer,
    counter: &SequenceCounter,
) -> Result<Bundle, BundleBuilderError> {
    let flags = BundleControlFlags::BUNDLE_MUST_NOT_FRAGMENTED
        | BundleControlFlags::BUNDLE_STATUS_REQUEST_DELIVERY;
    let pblock = PrimaryBlockBuilder::default()
        .bundle_control_flags(flags.bits())
        .destination(dst)
        .source(src)
        .creation_timestamp(CreationTimestamp::now(counter))
        .lifetime(DEFAULT_LIFETIME)
        .build()?;
    BundleBuilder::default()
        .primary(pblock)
        .canonical(new_hop_count_block(2, BlockControlFlags::empty(), 32))
        .payload(data)
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Bundle {
        let pblock = PrimaryBlockBuilder::new()
            .destination(EndpointID::with_ipn(2, 1))
            .source(EndpointID::with_ipn(1, 1))
            .creation_timestamp(CreationTimestamp::with_time_and_seq(1000, 0))
            .build()
            .unwrap();
        BundleBuilder::new()
            .primary(pblock)
            .payload(b"hello".to_vec())
            .build()
            .unwrap()
    }

    #[test]
    fn add_block_keeps_payload_last() {
        let mut b = sample();
        let n = b.add_canonical_block(new_hop_count_block(0, BlockControlFlags::empty(), 16));
        assert_eq!(n, 2);
        let n = b.add_canonical_block(new_bundle_age_block(0, BlockControlFlags::empty(), 0));
        assert_eq!(n, 3);
        assert_eq!(b.canonicals.last().unwrap().block_type, PAYLOAD_BLOCK);
        assert!(b.is_valid());
    }

    #[test]
    fn builder_requires_payload() {
        let pblock = sample().primary;
        assert_eq!(
            BundleBuilder::new().primary(pblock).build(),
            Err(BundleBuilderError::NoPayloadBlock)
        );
    }

    #[test]
    fn same_content_ignores_order() {
        let mut a = sample();
        a.add_canonical_block(new_hop_count_block(0, BlockControlFlags::empty(), 16));
        let mut b = a.clone();
        b.canonicals.swap(0, 1);
        assert_ne!(a, b);
        assert!(a.same_content(&b));
    }

    #[test]
    fn update_extensions_counts_hops() {
        let mut b = sample();
        b.primary.creation_timestamp = CreationTimestamp::with_time_and_seq(dtn_time_now(), 0);
        b.add_canonical_block(new_hop_count_block(0, BlockControlFlags::empty(), 1));
        assert!(b.update_extensions(EndpointID::with_ipn(3, 0), 10));
        assert!(!b.update_extensions(EndpointID::with_ipn(3, 0), 10));
    }

    #[test]
    fn validation_error_wraps_all_violations() {
        let mut b = sample();
        b.primary.lifetime = 0;
        b.canonicals[0].block_number = 0;
        match b.validation_error() {
            Some(Error::ValidationError(errs)) => {
                assert!(errs.contains(&Error::InvalidLifetime));
                assert!(errs.len() >= 2);
            }
            other => panic!("unexpected {:?}", other),
        }
    }
}
