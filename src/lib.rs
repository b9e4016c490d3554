//! Rust implementation of the dtn Bundle Protocol Version 7 ([RFC 9171](https://www.rfc-editor.org/rfc/rfc9171.html))
//!
//! Bundles are built with the builders in [`primary`], [`canonical`] and
//! [`bundle`], checked with [`Bundle::validate`] and converted to and from
//! their CBOR wire form by [`codec`].
//!
//! # Examples
//!
//! ```
//! use bp7::{api, dtntime, Bundle};
//! use std::convert::TryFrom;
//!
//! let now = dtntime::CreationTimestamp::with_time_and_seq(1000, 0);
//! let b = api::construct_default("dtn://a/", "dtn://b/", b"hi", now).unwrap();
//! let serialized = b.to_cbor().unwrap();
//! let binary_bundle = [
//!     159, 136, 7, 4, 0, 130, 1, 100, 47, 47, 98, 47, 130, 1, 100, 47, 47, 97, 47, 130, 1, 100,
//!     47, 47, 97, 47, 130, 25, 3, 232, 0, 26, 0, 54, 238, 128, 133, 1, 1, 0, 0, 66, 104, 105,
//!     255,
//! ];
//! assert_eq!(&binary_bundle[..], &serialized[..]);
//!
//! let decoded = Bundle::try_from(&serialized[..]).unwrap();
//! assert_eq!(decoded, b);
//! assert_eq!(decoded.id(), "dtn://a/-1000-0");
//! ```

#![forbid(unsafe_code)]

pub mod administrative_record;
pub mod api;
pub mod bundle;
pub mod bundle_id;
pub mod canonical;
pub mod codec;
pub mod crc;
pub mod dtntime;
pub mod eid;
pub mod error;
pub mod flags;
pub mod helpers;
pub mod primary;

pub use bundle::{Bundle, BundleBuilder, ByteBuffer};
pub use bundle_id::BundleId;
pub use canonical::*;
pub use dtntime::{dtn_time_now, CreationTimestamp, DtnTime, SequenceCounter};
pub use eid::EndpointID;
pub use error::{Error, ErrorList};
pub use helpers::{hexify, rnd_bundle, unhexify};
