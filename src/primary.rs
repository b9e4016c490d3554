use crate::bundle::*;
use crate::crc::*;
use crate::dtntime::*;
use crate::eid::*;
use crate::error::{Error, ErrorList};
use crate::flags::*;
use core::fmt;
use core::time::Duration;
use serde::de::{SeqAccess, Visitor};
use serde::ser::{SerializeSeq, Serializer};
use serde::{de, Deserialize, Deserializer, Serialize};
use thiserror::Error;

/******************************
 *
 * Primary Block
 *
 ******************************/

/// Lifetime used when none is given explicitly.
pub const DEFAULT_LIFETIME: Duration = Duration::from_secs(60 * 60);

/// Position of a fragment inside the original application data unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FragmentInfo {
    pub offset: FragOffsetType,
    pub total_adu_length: TotalDataLengthType,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PrimaryBuilderError {
    #[error("no destination endpoint was given")]
    NoDestination,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PrimaryBlockBuilder {
    bundle_control_flags: BundleControlFlagsType,
    crc: CrcValue,
    destination: Option<EndpointID>,
    source: EndpointID,
    report_to: Option<EndpointID>,
    creation_timestamp: CreationTimestamp,
    lifetime: Duration,
    fragment: Option<FragmentInfo>,
}

impl Default for PrimaryBlockBuilder {
    fn default() -> Self {
        PrimaryBlockBuilder {
            bundle_control_flags: 0,
            crc: CrcValue::CrcNo,
            destination: None,
            source: EndpointID::none(),
            report_to: None,
            creation_timestamp: CreationTimestamp::new(),
            lifetime: DEFAULT_LIFETIME,
            fragment: None,
        }
    }
}

impl PrimaryBlockBuilder {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn bundle_control_flags(mut self, flags: BundleControlFlagsType) -> Self {
        self.bundle_control_flags = flags;
        self
    }
    pub fn crc(mut self, crc: CrcValue) -> Self {
        self.crc = crc;
        self
    }
    pub fn destination(mut self, destination: EndpointID) -> Self {
        self.destination = Some(destination);
        self
    }
    pub fn source(mut self, source: EndpointID) -> Self {
        self.source = source;
        self
    }
    /// Report-to endpoint, defaults to the source when not set.
    pub fn report_to(mut self, report_to: EndpointID) -> Self {
        self.report_to = Some(report_to);
        self
    }
    pub fn creation_timestamp(mut self, creation_timestamp: CreationTimestamp) -> Self {
        self.creation_timestamp = creation_timestamp;
        self
    }
    pub fn lifetime(mut self, lifetime: Duration) -> Self {
        self.lifetime = lifetime;
        self
    }
    /// Marks the block as a fragment, also setting the is-fragment flag.
    pub fn fragment(
        mut self,
        offset: FragOffsetType,
        total_adu_length: TotalDataLengthType,
    ) -> Self {
        self.fragment = Some(FragmentInfo {
            offset,
            total_adu_length,
        });
        self
    }
    pub fn build(self) -> Result<PrimaryBlock, PrimaryBuilderError> {
        let destination = self
            .destination
            .ok_or(PrimaryBuilderError::NoDestination)?;
        let mut bundle_control_flags = self.bundle_control_flags;
        if self.fragment.is_some() {
            bundle_control_flags.set_flag(BundleControlFlags::BUNDLE_IS_FRAGMENT, true);
        }
        let report_to = self.report_to.unwrap_or_else(|| self.source.clone());
        Ok(PrimaryBlock {
            version: DTN_VERSION,
            bundle_control_flags,
            crc: self.crc,
            destination,
            source: self.source,
            report_to,
            creation_timestamp: self.creation_timestamp,
            lifetime: self.lifetime.as_millis().try_into().unwrap_or(u64::MAX),
            fragment: self.fragment,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PrimaryBlock {
    version: DtnVersionType,
    pub bundle_control_flags: BundleControlFlagsType,
    pub crc: CrcValue,
    pub destination: EndpointID,
    pub source: EndpointID,
    pub report_to: EndpointID,
    pub creation_timestamp: CreationTimestamp,
    /// Lifetime in milliseconds.
    pub lifetime: LifetimeType,
    pub fragment: Option<FragmentInfo>,
}

impl Serialize for PrimaryBlock {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        self.serialize_with_crc(&self.crc, serializer)
    }
}

impl<'de> Deserialize<'de> for PrimaryBlock {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct PrimaryBlockVisitor;

        impl<'de> Visitor<'de> for PrimaryBlockVisitor {
            type Value = PrimaryBlock;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("PrimaryBlock")
            }

            fn visit_seq<V>(self, mut seq: V) -> Result<Self::Value, V::Error>
            where
                V: SeqAccess<'de>,
            {
                let version: DtnVersionType = seq
                    .next_element()?
                    .ok_or_else(|| de::Error::invalid_length(0, &self))?;
                let bundle_control_flags: BundleControlFlagsType = seq
                    .next_element()?
                    .ok_or_else(|| de::Error::invalid_length(1, &self))?;
                let crc_type: CrcRawType = seq
                    .next_element()?
                    .ok_or_else(|| de::Error::invalid_length(2, &self))?;
                let crc_fields = match crc_len(crc_type) {
                    Some(0) => 0,
                    Some(_) => 1,
                    None => {
                        return Err(de::Error::custom(format!("unknown crc type {}", crc_type)))
                    }
                };
                let destination: EndpointID = seq
                    .next_element()?
                    .ok_or_else(|| de::Error::invalid_length(3, &self))?;
                let source: EndpointID = seq
                    .next_element()?
                    .ok_or_else(|| de::Error::invalid_length(4, &self))?;
                let report_to: EndpointID = seq
                    .next_element()?
                    .ok_or_else(|| de::Error::invalid_length(5, &self))?;
                let creation_timestamp: CreationTimestamp = seq
                    .next_element()?
                    .ok_or_else(|| de::Error::invalid_length(6, &self))?;
                let lifetime: LifetimeType = seq
                    .next_element()?
                    .ok_or_else(|| de::Error::invalid_length(7, &self))?;

                // the optional fragment fields sit between lifetime and crc
                let has_fragment = match seq.size_hint() {
                    Some(rest) if rest == crc_fields => false,
                    Some(rest) if rest == crc_fields + 2 => true,
                    Some(rest) => return Err(de::Error::invalid_length(8 + rest, &self)),
                    None => {
                        bundle_control_flags.has(BundleControlFlags::BUNDLE_IS_FRAGMENT)
                    }
                };
                let fragment = if has_fragment {
                    let offset: FragOffsetType = seq
                        .next_element()?
                        .ok_or_else(|| de::Error::invalid_length(8, &self))?;
                    let total_adu_length: TotalDataLengthType = seq
                        .next_element()?
                        .ok_or_else(|| de::Error::invalid_length(9, &self))?;
                    Some(FragmentInfo {
                        offset,
                        total_adu_length,
                    })
                } else {
                    None
                };
                let crc_pos = if has_fragment { 10 } else { 8 };

                let crc = if crc_fields == 0 {
                    CrcValue::CrcNo
                } else {
                    let crcbuf: WireBytes = seq
                        .next_element()?
                        .ok_or_else(|| de::Error::invalid_length(crc_pos, &self))?;
                    CrcValue::from_wire(crc_type, &crcbuf.0).map_err(de::Error::custom)?
                };
                Ok(PrimaryBlock {
                    version,
                    bundle_control_flags,
                    crc,
                    destination,
                    source,
                    report_to,
                    creation_timestamp,
                    lifetime,
                    fragment,
                })
            }
        }

        deserializer.deserialize_seq(PrimaryBlockVisitor)
    }
}
impl Default for PrimaryBlock {
    fn default() -> Self {
        PrimaryBlock::new()
    }
}
impl PrimaryBlock {
    pub fn new() -> PrimaryBlock {
        PrimaryBlock {
            version: DTN_VERSION,
            bundle_control_flags: 0,
            crc: CrcValue::CrcNo,
            destination: EndpointID::new(),
            source: EndpointID::new(),
            report_to: EndpointID::new(),
            creation_timestamp: CreationTimestamp::new(),
            lifetime: 0,
            fragment: None,
        }
    }

    pub fn version(&self) -> DtnVersionType {
        self.version
    }

    pub fn has_fragmentation(&self) -> bool {
        self.is_fragment()
    }
    pub fn is_fragment(&self) -> bool {
        self.bundle_control_flags
            .has(BundleControlFlags::BUNDLE_IS_FRAGMENT)
    }
    pub fn is_administrative_record(&self) -> bool {
        self.bundle_control_flags
            .has(BundleControlFlags::BUNDLE_ADMINISTRATIVE_RECORD_PAYLOAD)
    }
    pub fn must_not_fragment(&self) -> bool {
        self.bundle_control_flags
            .has(BundleControlFlags::BUNDLE_MUST_NOT_FRAGMENTED)
    }
    pub fn request_user_application_ack(&self) -> bool {
        self.bundle_control_flags
            .has(BundleControlFlags::BUNDLE_REQUEST_USER_APPLICATION_ACK)
    }
    pub fn request_status_time(&self) -> bool {
        self.bundle_control_flags
            .has(BundleControlFlags::BUNDLE_REQUEST_STATUS_TIME)
    }
    pub fn status_request_reception(&self) -> bool {
        self.bundle_control_flags
            .has(BundleControlFlags::BUNDLE_STATUS_REQUEST_RECEPTION)
    }
    pub fn status_request_forward(&self) -> bool {
        self.bundle_control_flags
            .has(BundleControlFlags::BUNDLE_STATUS_REQUEST_FORWARD)
    }
    pub fn status_request_delivery(&self) -> bool {
        self.bundle_control_flags
            .has(BundleControlFlags::BUNDLE_STATUS_REQUEST_DELIVERY)
    }
    pub fn status_request_deletion(&self) -> bool {
        self.bundle_control_flags
            .has(BundleControlFlags::BUNDLE_STATUS_REQUEST_DELETION)
    }

    /// Whether the bundle outlived its lifetime at `now`.
    ///
    /// Bundles created without a clock (creation time 0) carry their age in a
    /// bundle age block instead and are never reported as expired here.
    pub fn is_lifetime_exceeded(&self, now: DtnTime) -> bool {
        let created = self.creation_timestamp.dtntime();
        if created == DTN_TIME_EPOCH {
            return false;
        }
        created.saturating_add(self.lifetime) <= now
    }

    /// Offset plus payload length must stay within the total ADU length.
    pub fn validate_fragment_range(&self, payload_len: u64) -> Result<(), Error> {
        if let Some(frag) = self.fragment {
            let end = frag.offset.checked_add(payload_len);
            if end.map_or(true, |end| end > frag.total_adu_length) {
                return Err(Error::FragmentRangeError {
                    offset: frag.offset,
                    payload_len,
                    total: frag.total_adu_length,
                });
            }
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ErrorList> {
        self.validate_with_payload_len(0)
    }

    pub(crate) fn validate_with_payload_len(&self, payload_len: u64) -> Result<(), ErrorList> {
        let mut errors: ErrorList = Vec::new();

        if self.version != DTN_VERSION {
            errors.push(Error::VersionMismatch {
                found: self.version,
            });
        }
        if crc_len(self.crc_type()).is_none() {
            errors.push(Error::InvalidCrcType(self.crc_type()));
        }
        if self.lifetime == 0 {
            errors.push(Error::InvalidLifetime);
        }

        match (self.is_fragment(), self.fragment.is_some()) {
            (true, false) => errors.push(Error::InconsistentFragmentFields(
                "is-fragment flag set but no fragment offset and total length present".to_string(),
            )),
            (false, true) => errors.push(Error::InconsistentFragmentFields(
                "fragment offset and total length present but is-fragment flag not set"
                    .to_string(),
            )),
            _ => {}
        }
        if let Err(err) = self.validate_fragment_range(payload_len) {
            errors.push(err);
        }

        for eid in [&self.destination, &self.source, &self.report_to] {
            if let Err(err) = eid.validate() {
                errors.push(err.into());
            }
        }

        if let Err(mut err) = self.bundle_control_flags.validate() {
            errors.append(&mut err);
        }

        if !errors.is_empty() {
            return Err(errors);
        }
        Ok(())
    }
}

impl CrcBlock for PrimaryBlock {
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
        let num_elems = 8 + self.fragment.map_or(0, |_| 2) + crc_bytes.map_or(0, |_| 1);

        let mut seq = serializer.serialize_seq(Some(num_elems))?;
        seq.serialize_element(&self.version)?;
        seq.serialize_element(&self.bundle_control_flags)?;
        seq.serialize_element(&crc.to_code())?;
        seq.serialize_element(&self.destination)?;
        seq.serialize_element(&self.source)?;
        seq.serialize_element(&self.report_to)?;
        seq.serialize_element(&self.creation_timestamp)?;
        seq.serialize_element(&self.lifetime)?;
        if let Some(frag) = &self.fragment {
            seq.serialize_element(&frag.offset)?;
            seq.serialize_element(&frag.total_adu_length)?;
        }
        if let Some(bytes) = crc_bytes {
            seq.serialize_element(&serde_bytes::Bytes::new(bytes))?;
        }

        seq.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> PrimaryBlock {
        PrimaryBlockBuilder::new()
            .destination(EndpointID::with_ipn(2, 1))
            .source(EndpointID::with_ipn(1, 1))
            .creation_timestamp(CreationTimestamp::with_time_and_seq(5000, 0))
            .build()
            .unwrap()
    }

    #[test]
    fn builder_defaults() {
        let p = sample();
        assert_eq!(p.version(), DTN_VERSION);
        assert_eq!(p.report_to, EndpointID::with_ipn(1, 1));
        assert_eq!(p.lifetime, 3_600_000);
        assert!(p.validate().is_ok());
        assert_eq!(
            PrimaryBlockBuilder::new().build(),
            Err(PrimaryBuilderError::NoDestination)
        );
    }

    #[test]
    fn lifetime_exceeded() {
        let p = sample();
        assert!(!p.is_lifetime_exceeded(5000 + 3_599_999));
        assert!(p.is_lifetime_exceeded(5000 + 3_600_000));
    }

    #[test]
    fn fragment_consistency() {
        let mut p = sample();
        p.bundle_control_flags
            .set_flag(BundleControlFlags::BUNDLE_IS_FRAGMENT, true);
        let errs = p.validate().unwrap_err();
        assert!(matches!(errs[0], Error::InconsistentFragmentFields(_)));

        let p = PrimaryBlockBuilder::new()
            .destination(EndpointID::with_ipn(2, 1))
            .fragment(10, 5)
            .build()
            .unwrap();
        assert!(p.is_fragment());
        assert_eq!(
            p.validate().unwrap_err(),
            vec![Error::FragmentRangeError {
                offset: 10,
                payload_len: 0,
                total: 5
            }]
        );
    }
}
