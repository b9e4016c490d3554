//! Small stateless surface for foreign callers.
//!
//! Everything here takes and returns plain values, bindings for other
//! languages only need to wrap these functions.

use crate::bundle::{Bundle, BundleBuilder, BundleBuilderError, ByteBuffer};
use crate::canonical::new_bundle_age_block;
use crate::dtntime::{CreationTimestamp, DtnTime, DTN_TIME_EPOCH};
use crate::eid::EndpointID;
use crate::error::Error;
use crate::flags::{BlockControlFlags, BundleControlFlags};
use crate::primary::{PrimaryBlockBuilder, DEFAULT_LIFETIME};

pub const API_VERSION: u32 = 1;

/// Bundle from `source` to `destination` carrying `payload`.
///
/// The bundle must not be fragmented, has no crc and lives for one hour.
/// Bundles created at DTN time 0 get a bundle age block.
///
/// ```
/// use bp7::api;
/// use bp7::dtntime::CreationTimestamp;
///
/// let now = CreationTimestamp::with_time_and_seq(1000, 0);
/// let b = api::construct_default("dtn://a/", "ipn:2.1", b"hello", now).unwrap();
/// assert!(api::is_valid(&b));
/// assert_eq!(api::bundle_id(&b), "dtn://a/-1000-0");
/// ```
pub fn construct_default(
    source: &str,
    destination: &str,
    payload: &[u8],
    now: CreationTimestamp,
) -> Result<Bundle, Error> {
    let src = EndpointID::parse(source)?;
    let dst = EndpointID::parse(destination)?;
    let primary = PrimaryBlockBuilder::new()
        .bundle_control_flags(BundleControlFlags::BUNDLE_MUST_NOT_FRAGMENTED.bits())
        .destination(dst)
        .source(src.clone())
        .report_to(src)
        .creation_timestamp(now)
        .lifetime(DEFAULT_LIFETIME)
        .build()
        .map_err(|e| Error::BundleError(e.to_string()))?;

    let mut builder = BundleBuilder::new().primary(primary);
    if now.dtntime() == DTN_TIME_EPOCH {
        builder = builder.canonical(new_bundle_age_block(2, BlockControlFlags::empty(), 0));
    }
    builder
        .payload(payload.to_vec())
        .build()
        .map_err(|e| match e {
            BundleBuilderError::Crc(err) => err,
            other => Error::BundleError(other.to_string()),
        })
}

/// Random valid bundle, see [`crate::helpers::rnd_bundle`].
pub fn construct_random(now: CreationTimestamp) -> Bundle {
    crate::helpers::rnd_bundle(now)
}

pub fn encode(bundle: &Bundle) -> Result<ByteBuffer, Error> {
    crate::codec::encode(bundle)
}

pub fn decode(data: &[u8]) -> Result<Bundle, Error> {
    crate::codec::decode(data)
}

pub fn is_valid(bundle: &Bundle) -> bool {
    bundle.is_valid()
}

pub fn bundle_id(bundle: &Bundle) -> String {
    bundle.id()
}

pub fn payload(bundle: &Bundle) -> Option<&[u8]> {
    bundle.payload().map(|p| p.as_slice())
}

pub fn source(bundle: &Bundle) -> String {
    bundle.source().to_string()
}

pub fn destination(bundle: &Bundle) -> String {
    bundle.destination().to_string()
}

pub fn creation_time(bundle: &Bundle) -> DtnTime {
    bundle.creation_timestamp().dtntime()
}
