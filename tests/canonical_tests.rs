use bp7::crc::{CrcBlock, CrcValue, CRC_16, CRC_32};
use bp7::flags::*;
use bp7::*;
use std::convert::TryFrom;
use std::convert::TryInto;

#[test]
fn canonical_data_tests() {
    let data = CanonicalData::Data(b"bla".to_vec());
    assert_eq!(data.to_cbor().unwrap(), vec![0x43, b'b', b'l', b'a']);

    let bundleage = CanonicalData::BundleAge(23);
    assert_eq!(bundleage.to_cbor().unwrap(), vec![23]);

    let hopcount = CanonicalData::HopCount(23, 42);
    assert_eq!(hopcount.to_cbor().unwrap(), vec![0x82, 23, 24, 42]);

    let previous = CanonicalData::PreviousNode(EndpointID::with_ipn(1, 0));
    assert_eq!(previous.to_cbor().unwrap(), vec![0x82, 2, 0x82, 1, 0]);
}

fn encode_decode_test_canonical(data: CanonicalBlock) {
    let encoded_data = serde_cbor::to_vec(&data).expect("encoding error");
    let decoded_data: CanonicalBlock =
        serde_cbor::from_slice(&encoded_data).expect("decoding error");
    assert_eq!(data, decoded_data);
    assert_eq!(decoded_data.data(), data.data());
}

#[test]
fn canonical_block_tests() {
    let data = new_payload_block(BlockControlFlags::empty(), b"ABCDEFG".to_vec());
    encode_decode_test_canonical(data);

    let data = new_hop_count_block(2, BlockControlFlags::empty(), 32);
    encode_decode_test_canonical(data);

    let data = new_bundle_age_block(3, BlockControlFlags::empty(), 0);
    encode_decode_test_canonical(data);

    let data = new_previous_node_block(
        4,
        BlockControlFlags::BLOCK_REPLICATE,
        "dtn://node2/".try_into().unwrap(),
    );
    encode_decode_test_canonical(data);

    let data = new_canonical_block(200, 5, 0x80, CanonicalData::Unknown(vec![1, 2, 3]));
    encode_decode_test_canonical(data);
}

#[test]
fn canonical_block_crc_tests() {
    for crc_type in [CRC_16, CRC_32] {
        let mut blk = new_hop_count_block(2, BlockControlFlags::empty(), 32);
        blk.set_crc_type(crc_type);
        assert!(!blk.check_crc());
        blk.update_crc().unwrap();
        assert!(blk.check_crc());
        encode_decode_test_canonical(blk.clone());

        blk.hop_count_increase();
        assert!(!blk.check_crc());
    }
}

#[test]
fn builder_tests() {
    let blk = CanonicalBlockBuilder::new()
        .block_type(BUNDLE_AGE_BLOCK)
        .block_number(2)
        .crc(CrcValue::Crc16Empty)
        .data(CanonicalData::BundleAge(5))
        .build()
        .unwrap();
    assert_eq!(blk.bundle_age_get(), Some(5));
    assert!(blk.validate().is_ok());
    assert_eq!(
        CanonicalBlockBuilder::new().block_number(2).build(),
        Err(CanonicalBuilderError::MissingData)
    );
}

#[test]
fn malformed_typed_data_is_rejected() {
    // hop count block whose data is a single integer
    let buf = [0x85, 10, 2, 0, 0, 0x41, 0x05];
    assert!(serde_cbor::from_slice::<CanonicalBlock>(&buf).is_err());
    // crc16 value of the wrong length
    let buf = [0x86, 1, 1, 0, 1, 0x41, 0x61, 0x43, 0, 0, 0];
    assert!(serde_cbor::from_slice::<CanonicalBlock>(&buf).is_err());
}

#[test]
fn hopcount_tests() {
    let mut block = new_hop_count_block(1, BlockControlFlags::empty(), 1);

    assert_eq!(block.block_type, bp7::HOP_COUNT_BLOCK);
    assert!(!block.hop_count_exceeded());

    if let CanonicalData::HopCount(hc_limit, hc_count) = block.data() {
        assert!(*hc_limit == 1);
        assert!(*hc_count == 0);
    } else {
        panic!("Not a hop count block!");
    }

    assert!(block.hop_count_increase());
    if let Some((hc_limit, hc_count)) = block.hop_count_get() {
        assert!(hc_limit == 1);
        assert!(hc_count == 1);
    } else {
        panic!("Not a hop count block!");
    }

    assert!(block.hop_count_increase());
    assert!(block.hop_count_exceeded());

    let mut wrong_block = new_bundle_age_block(1, BlockControlFlags::empty(), 0);
    assert!(!wrong_block.hop_count_increase());
    assert!(!wrong_block.hop_count_exceeded());
    assert_eq!(wrong_block.hop_count_get(), None);
}

#[test]
fn previousnode_tests() {
    let mut block = new_previous_node_block(
        2,
        BlockControlFlags::empty(),
        "dtn://node1/".try_into().unwrap(),
    );

    assert_eq!(block.block_type, bp7::PREVIOUS_NODE_BLOCK);
    if let Some(eid) = block.previous_node_get() {
        assert_eq!(*eid, EndpointID::try_from("dtn://node1/").unwrap());
    } else {
        panic!("Not a previous node block!");
    }

    assert!(block.previous_node_update("dtn://node2/".try_into().unwrap()));

    if let Some(eid) = block.previous_node_get() {
        assert_eq!(*eid, EndpointID::try_from("dtn://node2/").unwrap());
    } else {
        panic!("Not a previous node block!");
    }

    let mut wrong_block = new_bundle_age_block(1, BlockControlFlags::empty(), 0);
    assert_eq!(wrong_block.previous_node_get(), None);
    assert!(!wrong_block.previous_node_update("dtn://node2/".try_into().unwrap()));
}

#[test]
fn bundleage_tests() {
    let mut block = new_bundle_age_block(1, BlockControlFlags::empty(), 0);

    assert_eq!(block.block_type, bp7::BUNDLE_AGE_BLOCK);
    if let Some(age) = block.bundle_age_get() {
        assert_eq!(age, 0);
    } else {
        panic!("Not a bundle age block!");
    }

    assert!(block.bundle_age_update(200));

    if let Some(age) = block.bundle_age_get() {
        assert_eq!(age, 200);
    } else {
        panic!("Not a bundle age block!");
    }

    let mut wrong_block = new_hop_count_block(1, BlockControlFlags::empty(), 1);
    assert_eq!(wrong_block.bundle_age_get(), None);
    assert!(!wrong_block.bundle_age_update(2342));
}

#[test]
fn unknown_crc_type_is_invalid() {
    let mut blk = new_hop_count_block(2, BlockControlFlags::empty(), 16);
    assert!(blk.validate().is_ok());
    blk.crc = CrcValue::Unknown(5);
    assert_eq!(blk.validate().unwrap_err(), vec![Error::InvalidCrcType(5)]);
    assert!(blk.calculate_crc().is_err());
}
