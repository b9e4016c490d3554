//! Administrative records (RFC 9171 6.1) carried as the payload of bundles
//! with the administrative record flag set.
//!
//! Only the bundle status report is understood, other record types are kept
//! as their type code and raw content.

use core::fmt;
use std::convert::TryFrom;

use serde::de::{SeqAccess, Visitor};
use serde::ser::{SerializeSeq, Serializer};
use serde::{de, Deserialize, Deserializer, Serialize};

use crate::bundle::{Bundle, BundleBuilder, BundleBuilderError, ByteBuffer, FragOffsetType};
use crate::bundle_id::BundleId;
use crate::canonical::{new_payload_block, CanonicalBlock};
use crate::crc::CrcRawType;
use crate::dtntime::{CreationTimestamp, DtnTime, SequenceCounter};
use crate::eid::EndpointID;
use crate::error::Error;
use crate::flags::{BlockControlFlags, BundleControlFlags};
use crate::primary::{PrimaryBlockBuilder, DEFAULT_LIFETIME};

pub type AdministrativeRecordTypeCode = u32;

pub const BUNDLE_STATUS_REPORT_TYPE_CODE: AdministrativeRecordTypeCode = 1;

#[derive(Debug, Clone, PartialEq)]
pub enum AdministrativeRecord {
    BundleStatusReport(StatusReport),
    Unknown(AdministrativeRecordTypeCode, ByteBuffer),
}

impl AdministrativeRecord {
    pub fn type_code(&self) -> AdministrativeRecordTypeCode {
        match self {
            AdministrativeRecord::BundleStatusReport(_) => BUNDLE_STATUS_REPORT_TYPE_CODE,
            AdministrativeRecord::Unknown(code, _) => *code,
        }
    }

    pub fn to_cbor(&self) -> Result<ByteBuffer, Error> {
        serde_cbor::to_vec(self).map_err(|e| Error::AdministrativeRecordError(e.to_string()))
    }

    /// Payload block (number 1, no flags) carrying this record.
    pub fn to_payload(&self) -> Result<CanonicalBlock, Error> {
        Ok(new_payload_block(BlockControlFlags::empty(), self.to_cbor()?))
    }
}

impl Serialize for AdministrativeRecord {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut seq = serializer.serialize_seq(Some(2))?;
        seq.serialize_element(&self.type_code())?;
        match self {
            AdministrativeRecord::BundleStatusReport(sr) => seq.serialize_element(sr)?,
            AdministrativeRecord::Unknown(_, data) => {
                seq.serialize_element(&serde_bytes::Bytes::new(data))?
            }
        }
        seq.end()
    }
}

impl<'de> Deserialize<'de> for AdministrativeRecord {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct AdministrativeRecordVisitor;

        impl<'de> Visitor<'de> for AdministrativeRecordVisitor {
            type Value = AdministrativeRecord;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("administrative record")
            }

            fn visit_seq<V>(self, mut seq: V) -> Result<Self::Value, V::Error>
            where
                V: SeqAccess<'de>,
            {
                let code: AdministrativeRecordTypeCode = seq
                    .next_element()?
                    .ok_or_else(|| de::Error::invalid_length(0, &self))?;
                if code == BUNDLE_STATUS_REPORT_TYPE_CODE {
                    let sr: StatusReport = seq
                        .next_element()?
                        .ok_or_else(|| de::Error::invalid_length(1, &self))?;
                    Ok(AdministrativeRecord::BundleStatusReport(sr))
                } else {
                    let data: serde_bytes::ByteBuf = seq
                        .next_element()?
                        .ok_or_else(|| de::Error::invalid_length(1, &self))?;
                    Ok(AdministrativeRecord::Unknown(code, data.into_vec()))
                }
            }
        }

        deserializer.deserialize_any(AdministrativeRecordVisitor)
    }
}

impl TryFrom<&Bundle> for AdministrativeRecord {
    type Error = Error;

    fn try_from(bundle: &Bundle) -> Result<Self, Self::Error> {
        if !bundle.is_administrative_record() {
            return Err(Error::AdministrativeRecordError(
                "bundle is not an administrative record".to_string(),
            ));
        }
        let payload = bundle.payload().ok_or_else(|| {
            Error::AdministrativeRecordError("bundle has no payload".to_string())
        })?;
        AdministrativeRecord::try_from(payload.as_slice())
    }
}

impl TryFrom<&[u8]> for AdministrativeRecord {
    type Error = Error;

    fn try_from(data: &[u8]) -> Result<Self, Self::Error> {
        serde_cbor::from_slice(data).map_err(|e| Error::AdministrativeRecordError(e.to_string()))
    }
}

// Bundle Status Report

pub type StatusReportReason = u32;

/// No additional information.
pub const NO_INFORMATION: StatusReportReason = 0;

/// Lifetime expired.
pub const LIFETIME_EXPIRED: StatusReportReason = 1;

/// Forwarded over unidirectional link.
pub const FORWARD_UNIDIRECTIONAL_LINK: StatusReportReason = 2;

/// Transmission canceled.
pub const TRANSMISSION_CANCELED: StatusReportReason = 3;

/// Depleted storage.
pub const DEPLETED_STORAGE: StatusReportReason = 4;

/// Destination endpoint ID unintelligible.
pub const DEST_ENDPOINT_UNINTELLIGIBLE: StatusReportReason = 5;

/// No known route to destination from here.
pub const NO_ROUTE_TO_DESTINATION: StatusReportReason = 6;

/// No timely contact with next node on route.
pub const NO_NEXT_NODE_CONTACT: StatusReportReason = 7;

/// Block unintelligible.
pub const BLOCK_UNINTELLIGIBLE: StatusReportReason = 8;

/// Hop limit exceeded.
pub const HOP_LIMIT_EXCEEDED: StatusReportReason = 9;

/// Traffic pared.
pub const TRAFFIC_PARED: StatusReportReason = 10;

/// Block unsupported.
pub const BLOCK_UNSUPPORTED: StatusReportReason = 11;

/// One assertion of a status report. The time is only present when the
/// status is asserted and the subject bundle asked for status times.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BundleStatusItem {
    pub asserted: bool,
    pub time: Option<DtnTime>,
}

impl BundleStatusItem {
    pub fn new(asserted: bool) -> BundleStatusItem {
        BundleStatusItem {
            asserted,
            time: None,
        }
    }

    pub fn with_time(time: DtnTime) -> BundleStatusItem {
        BundleStatusItem {
            asserted: true,
            time: Some(time),
        }
    }
}

impl Serialize for BundleStatusItem {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let time = self.time.filter(|_| self.asserted);
        let num_elems = if time.is_some() { 2 } else { 1 };

        let mut seq = serializer.serialize_seq(Some(num_elems))?;
        seq.serialize_element(&self.asserted)?;
        if let Some(t) = time {
            seq.serialize_element(&t)?;
        }
        seq.end()
    }
}

impl<'de> Deserialize<'de> for BundleStatusItem {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct BundleStatusItemVisitor;

        impl<'de> Visitor<'de> for BundleStatusItemVisitor {
            type Value = BundleStatusItem;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("bundle status item")
            }

            fn visit_seq<V>(self, mut seq: V) -> Result<Self::Value, V::Error>
            where
                V: SeqAccess<'de>,
            {
                let asserted: bool = seq
                    .next_element()?
                    .ok_or_else(|| de::Error::invalid_length(0, &self))?;
                let time: Option<DtnTime> = seq.next_element()?;
                if time.is_some() && !asserted {
                    return Err(de::Error::custom("status time on an unasserted item"));
                }
                Ok(BundleStatusItem { asserted, time })
            }
        }

        deserializer.deserialize_any(BundleStatusItemVisitor)
    }
}

/// Index of the status items inside a report.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusInformationPos {
    ReceivedBundle = 0,
    ForwardedBundle = 1,
    DeliveredBundle = 2,
    DeletedBundle = 3,
}

/// Number of status items in a report.
pub const STATUS_ITEMS: usize = 4;

/// Fragment position of the subject bundle, reported when it is a fragment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubjectFragment {
    pub offset: FragOffsetType,
    pub payload_len: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StatusReport {
    pub status_information: Vec<BundleStatusItem>,
    pub report_reason: StatusReportReason,
    pub source_node: EndpointID,
    pub timestamp: CreationTimestamp,
    pub fragment: Option<SubjectFragment>,
}

impl StatusReport {
    /// Id of the bundle this report is about.
    pub fn subject(&self) -> BundleId {
        BundleId {
            source: self.source_node.clone(),
            timestamp: self.timestamp,
            fragment: None,
        }
    }

    pub fn is_asserted(&self, pos: StatusInformationPos) -> bool {
        self.status_information
            .get(pos as usize)
            .is_some_and(|item| item.asserted)
    }

    pub fn status_time(&self, pos: StatusInformationPos) -> Option<DtnTime> {
        self.status_information
            .get(pos as usize)
            .and_then(|item| item.time)
    }
}

impl Serialize for StatusReport {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let num_elems = if self.fragment.is_some() { 6 } else { 4 };

        let mut seq = serializer.serialize_seq(Some(num_elems))?;
        seq.serialize_element(&self.status_information)?;
        seq.serialize_element(&self.report_reason)?;
        seq.serialize_element(&self.source_node)?;
        seq.serialize_element(&self.timestamp)?;
        if let Some(frag) = self.fragment {
            seq.serialize_element(&frag.offset)?;
            seq.serialize_element(&frag.payload_len)?;
        }
        seq.end()
    }
}

impl<'de> Deserialize<'de> for StatusReport {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct StatusReportVisitor;

        impl<'de> Visitor<'de> for StatusReportVisitor {
            type Value = StatusReport;

            fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                formatter.write_str("status report")
            }

            fn visit_seq<V>(self, mut seq: V) -> Result<Self::Value, V::Error>
            where
                V: SeqAccess<'de>,
            {
                let status_information: Vec<BundleStatusItem> = seq
                    .next_element()?
                    .ok_or_else(|| de::Error::invalid_length(0, &self))?;
                if status_information.len() < STATUS_ITEMS {
                    return Err(de::Error::invalid_length(
                        status_information.len(),
                        &"4 status items",
                    ));
                }
                let report_reason: StatusReportReason = seq
                    .next_element()?
                    .ok_or_else(|| de::Error::invalid_length(1, &self))?;
                let source_node: EndpointID = seq
                    .next_element()?
                    .ok_or_else(|| de::Error::invalid_length(2, &self))?;
                let timestamp: CreationTimestamp = seq
                    .next_element()?
                    .ok_or_else(|| de::Error::invalid_length(3, &self))?;

                let fragment = match seq.next_element::<FragOffsetType>()? {
                    Some(offset) => {
                        let payload_len: u64 = seq
                            .next_element()?
                            .ok_or_else(|| de::Error::invalid_length(5, &self))?;
                        Some(SubjectFragment {
                            offset,
                            payload_len,
                        })
                    }
                    None => None,
                };

                Ok(StatusReport {
                    status_information,
                    report_reason,
                    source_node,
                    timestamp,
                    fragment,
                })
            }
        }

        deserializer.deserialize_any(StatusReportVisitor)
    }
}

/// Status report about `bndl` asserting the status at `status`.
///
/// The status time is included when the subject bundle requested status
/// times. A fragment's offset and payload length are carried along.
pub fn new_status_report(
    bndl: &Bundle,
    status: StatusInformationPos,
    reason: StatusReportReason,
    time: DtnTime,
) -> StatusReport {
    let mut status_information = vec![BundleStatusItem::new(false); STATUS_ITEMS];
    status_information[status as usize] = if bndl.primary.request_status_time() {
        BundleStatusItem::with_time(time)
    } else {
        BundleStatusItem::new(true)
    };

    let fragment = bndl
        .primary
        .fragment
        .filter(|_| bndl.primary.is_fragment())
        .map(|frag| SubjectFragment {
            offset: frag.offset,
            payload_len: bndl.payload().map_or(0, |p| p.len() as u64),
        });

    StatusReport {
        status_information,
        report_reason: reason,
        source_node: bndl.primary.source.clone(),
        timestamp: bndl.primary.creation_timestamp,
        fragment,
    }
}

/// Bundle from `source` to the report-to endpoint of `orig` carrying a
/// status report about `orig`.
///
/// No reports are generated about administrative records or for bundles
/// whose report-to endpoint is `dtn:none`.
pub fn new_status_report_bundle(
    orig: &Bundle,
    source: EndpointID,
    crc_type: CrcRawType,
    status: StatusInformationPos,
    reason: StatusReportReason,
    counter: &SequenceCounter,
) -> Result<Bundle, Error> {
    if orig.is_administrative_record() {
        return Err(Error::AdministrativeRecordError(
            "no status reports about administrative records".to_string(),
        ));
    }
    if orig.primary.report_to == EndpointID::DtnNone {
        return Err(Error::AdministrativeRecordError(
            "report-to endpoint is dtn:none".to_string(),
        ));
    }

    let now = CreationTimestamp::now(counter);
    let report = new_status_report(orig, status, reason, now.dtntime());
    let record = AdministrativeRecord::BundleStatusReport(report);

    let primary = PrimaryBlockBuilder::new()
        .bundle_control_flags(BundleControlFlags::BUNDLE_ADMINISTRATIVE_RECORD_PAYLOAD.bits())
        .destination(orig.primary.report_to.clone())
        .source(source.clone())
        .report_to(source)
        .creation_timestamp(now)
        .lifetime(DEFAULT_LIFETIME)
        .build()
        .map_err(|e| Error::AdministrativeRecordError(e.to_string()))?;

    BundleBuilder::new()
        .primary(primary)
        .canonical(record.to_payload()?)
        .crc(crc_type)
        .build()
        .map_err(|e| match e {
            BundleBuilderError::Crc(err) => err,
            other => Error::AdministrativeRecordError(other.to_string()),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    fn subject() -> Bundle {
        crate::api::construct_default(
            "dtn://node1/app",
            "dtn://node2/inbox",
            b"hello",
            CreationTimestamp::with_time_and_seq(5000, 3),
        )
        .unwrap()
    }

    #[test_case(BundleStatusItem::new(false), &[0x81, 0xf4] ; "unasserted")]
    #[test_case(BundleStatusItem::new(true), &[0x81, 0xf5] ; "asserted")]
    #[test_case(BundleStatusItem::with_time(100), &[0x82, 0xf5, 0x18, 0x64] ; "asserted with time")]
    fn status_item_cbor(item: BundleStatusItem, expected: &[u8]) {
        assert_eq!(serde_cbor::to_vec(&item).unwrap(), expected);
        let back: BundleStatusItem = serde_cbor::from_slice(expected).unwrap();
        assert_eq!(back, item);
    }

    #[test]
    fn time_on_unasserted_item_is_rejected() {
        assert!(serde_cbor::from_slice::<BundleStatusItem>(&[0x82, 0xf4, 0x01]).is_err());
    }

    #[test]
    fn report_without_status_time() {
        let b = subject();
        let sr = new_status_report(&b, StatusInformationPos::DeliveredBundle, NO_INFORMATION, 9);
        assert!(sr.is_asserted(StatusInformationPos::DeliveredBundle));
        assert!(!sr.is_asserted(StatusInformationPos::ReceivedBundle));
        assert_eq!(sr.status_time(StatusInformationPos::DeliveredBundle), None);
        assert_eq!(sr.subject().to_string(), "dtn://node1/app-5000-3");
        assert_eq!(sr.fragment, None);
    }

    #[test]
    fn unknown_record_keeps_content() {
        let rec = AdministrativeRecord::Unknown(7, vec![1, 2, 3]);
        let buf = rec.to_cbor().unwrap();
        assert_eq!(buf, vec![0x82, 0x07, 0x43, 1, 2, 3]);
        assert_eq!(AdministrativeRecord::try_from(buf.as_slice()).unwrap(), rec);
    }
}
