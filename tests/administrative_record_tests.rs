use bp7::administrative_record::*;
use bp7::crc::{self, CrcRawType};
use bp7::flags::*;
use bp7::primary::{PrimaryBlockBuilder, DEFAULT_LIFETIME};
use bp7::*;
use std::convert::TryFrom;
use test_case::test_case;

fn new_subject_bundle(flags: BundleControlFlags, fragment: Option<(u64, u64)>) -> Bundle {
    let src = eid::EndpointID::with_dtn("//node1/123456").unwrap();
    let mut pblock = PrimaryBlockBuilder::default()
        .bundle_control_flags(flags.bits())
        .destination(eid::EndpointID::with_dtn("//node2/inbox").unwrap())
        .source(src.clone())
        .report_to(src)
        .creation_timestamp(CreationTimestamp::with_time_and_seq(700_000, 4))
        .lifetime(DEFAULT_LIFETIME);
    if let Some((offset, total)) = fragment {
        pblock = pblock.fragment(offset, total);
    }
    let b = BundleBuilder::default()
        .primary(pblock.build().unwrap())
        .payload(b"ABC".to_vec())
        .build()
        .unwrap();
    assert!(b.is_valid(), "{:?}", b.validate());
    b
}

#[test_case(StatusInformationPos::ReceivedBundle, false ; "received")]
#[test_case(StatusInformationPos::ForwardedBundle, false ; "forwarded")]
#[test_case(StatusInformationPos::DeliveredBundle, true ; "delivered with time")]
#[test_case(StatusInformationPos::DeletedBundle, true ; "deleted with time")]
fn status_report_tests(pos: StatusInformationPos, status_time: bool) {
    let mut flags = BundleControlFlags::BUNDLE_STATUS_REQUEST_DELETION;
    if status_time {
        flags |= BundleControlFlags::BUNDLE_REQUEST_STATUS_TIME;
    }
    let bndl = new_subject_bundle(flags, None);
    assert!(!bndl.is_administrative_record());

    let sr = new_status_report(&bndl, pos, LIFETIME_EXPIRED, 800_000);
    assert_eq!(sr.subject().to_string(), "dtn://node1/123456-700000-4");
    assert!(sr.is_asserted(pos));
    assert_eq!(
        sr.status_information.iter().filter(|i| i.asserted).count(),
        1
    );
    let expected_time = if status_time { Some(800_000) } else { None };
    assert_eq!(sr.status_time(pos), expected_time);

    let encoded = serde_cbor::to_vec(&sr).unwrap();
    let decoded: StatusReport = serde_cbor::from_slice(&encoded).unwrap();
    assert_eq!(decoded, sr);
}

#[test]
fn fragment_report_carries_offset_and_length() {
    let flags = BundleControlFlags::BUNDLE_STATUS_REQUEST_RECEPTION;
    let bndl = new_subject_bundle(flags, Some((10, 100)));

    let sr = new_status_report(
        &bndl,
        StatusInformationPos::ReceivedBundle,
        NO_INFORMATION,
        800_000,
    );
    assert_eq!(
        sr.fragment,
        Some(SubjectFragment {
            offset: 10,
            payload_len: 3
        })
    );

    let encoded = serde_cbor::to_vec(&sr).unwrap();
    // definite array of 6 elements
    assert_eq!(encoded[0], 0x86);
    let decoded: StatusReport = serde_cbor::from_slice(&encoded).unwrap();
    assert_eq!(decoded, sr);
}

#[test_case(crc::CRC_NO ; "no crc")]
#[test_case(crc::CRC_16 ; "crc 16")]
#[test_case(crc::CRC_32 ; "crc 32")]
fn status_report_bundle_round_trip(crc_type: CrcRawType) {
    let counter = SequenceCounter::new();
    let orig = new_subject_bundle(BundleControlFlags::BUNDLE_STATUS_REQUEST_DELIVERY, None);
    let node = EndpointID::with_dtn("//node2/").unwrap();

    let report = new_status_report_bundle(
        &orig,
        node.clone(),
        crc_type,
        StatusInformationPos::DeliveredBundle,
        NO_INFORMATION,
        &counter,
    )
    .unwrap();
    assert!(report.is_administrative_record());
    assert!(report.is_valid(), "{:?}", report.validate());
    assert_eq!(report.destination(), &orig.primary.report_to);
    assert_eq!(report.source(), &node);

    let decoded = Bundle::try_from(report.to_cbor().unwrap().as_slice()).unwrap();
    assert_eq!(decoded, report);

    match AdministrativeRecord::try_from(&decoded).unwrap() {
        AdministrativeRecord::BundleStatusReport(sr) => {
            assert_eq!(sr.subject(), BundleId::from_bundle(&orig));
            assert!(sr.is_asserted(StatusInformationPos::DeliveredBundle));
            assert_eq!(sr.report_reason, NO_INFORMATION);
        }
        other => panic!("unexpected record {:?}", other),
    }
}

#[test]
fn no_report_about_administrative_records() {
    let counter = SequenceCounter::new();
    let orig = new_subject_bundle(BundleControlFlags::empty(), None);
    let report = new_status_report_bundle(
        &orig,
        EndpointID::with_ipn(2, 0),
        crc::CRC_NO,
        StatusInformationPos::ReceivedBundle,
        NO_INFORMATION,
        &counter,
    )
    .unwrap();

    let err = new_status_report_bundle(
        &report,
        EndpointID::with_ipn(3, 0),
        crc::CRC_NO,
        StatusInformationPos::ReceivedBundle,
        NO_INFORMATION,
        &counter,
    )
    .unwrap_err();
    assert!(matches!(err, Error::AdministrativeRecordError(_)));
}

#[test]
fn no_report_to_none_endpoint() {
    let counter = SequenceCounter::new();
    let mut orig = new_subject_bundle(BundleControlFlags::empty(), None);
    orig.primary.report_to = EndpointID::none();

    let err = new_status_report_bundle(
        &orig,
        EndpointID::with_ipn(2, 0),
        crc::CRC_NO,
        StatusInformationPos::DeletedBundle,
        DEPLETED_STORAGE,
        &counter,
    )
    .unwrap_err();
    assert!(matches!(err, Error::AdministrativeRecordError(_)));
}

#[test]
fn plain_bundle_is_not_a_record() {
    let b = new_subject_bundle(BundleControlFlags::empty(), None);
    assert!(matches!(
        AdministrativeRecord::try_from(&b),
        Err(Error::AdministrativeRecordError(_))
    ));
}

#[test_case(&[0x81, 0x01] ; "missing content")]
#[test_case(&[0x82, 0x01] ; "truncated")]
fn malformed_records_are_rejected(data: &[u8]) {
    assert!(matches!(
        AdministrativeRecord::try_from(data),
        Err(Error::AdministrativeRecordError(_))
    ));
}

#[test]
fn short_status_information_is_rejected() {
    let b = new_subject_bundle(BundleControlFlags::empty(), None);
    let mut sr = new_status_report(&b, StatusInformationPos::ReceivedBundle, NO_INFORMATION, 0);
    sr.status_information.truncate(3);
    let buf = AdministrativeRecord::BundleStatusReport(sr).to_cbor().unwrap();
    assert!(matches!(
        AdministrativeRecord::try_from(buf.as_slice()),
        Err(Error::AdministrativeRecordError(_))
    ));
}
