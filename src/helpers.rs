use crate::bundle::{Bundle, ByteBuffer};
use crate::canonical::{new_bundle_age_block, new_hop_count_block, new_payload_block};
use crate::crc::{crc_len, CrcRawType, CRC_16, CRC_32, CRC_NO};
use crate::dtntime::{dtn_time_now, CreationTimestamp, DTN_TIME_EPOCH};
use crate::eid::EndpointID;
use crate::error::Error;
use crate::flags::{BlockControlFlags, BundleControlFlags};
use crate::primary::{PrimaryBlock, PrimaryBlockBuilder};

use core::num::ParseIntError;
use core::time::Duration;
use nanorand::{Rng, WyRand};
use serde::Deserialize;
use thiserror::Error;

/// Convert byte slice into a hex string
pub fn hexify(buf: &[u8]) -> String {
    buf.iter().map(|b| format!("{:02x}", b)).collect()
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum HexError {
    #[error("odd number of hex digits")]
    OddLength,
    #[error("non-ascii character in hex string")]
    NonAscii,
    #[error("invalid hex digit: {0}")]
    InvalidDigit(#[from] ParseIntError),
}

/// Convert a hex string into a byte vector
pub fn unhexify(s: &str) -> Result<Vec<u8>, HexError> {
    if !s.is_ascii() {
        return Err(HexError::NonAscii);
    }
    if s.len() % 2 != 0 {
        return Err(HexError::OddLength);
    }
    s.as_bytes()
        .chunks(2)
        .map(|pair| -> Result<u8, HexError> {
            // ascii was checked above, every pair is valid utf-8
            let digits = std::str::from_utf8(pair).map_err(|_| HexError::NonAscii)?;
            Ok(u8::from_str_radix(digits, 16)?)
        })
        .collect()
}

/// Knobs for the random bundle generator.
///
/// Missing keys take their default values, so an empty config file is valid.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct GeneratorConfig {
    pub min_payload_len: usize,
    pub max_payload_len: usize,
    pub lifetime_ms: u64,
    /// crc types to choose from, one is picked per bundle
    pub crc_types: Vec<CrcRawType>,
    /// endpoint schemes to choose from, `dtn` and/or `ipn`
    pub schemes: Vec<String>,
    pub hop_count: bool,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        GeneratorConfig {
            min_payload_len: 1,
            max_payload_len: 64,
            lifetime_ms: 60 * 60 * 1000,
            crc_types: vec![CRC_NO, CRC_16, CRC_32],
            schemes: vec!["dtn".to_string(), "ipn".to_string()],
            hop_count: true,
        }
    }
}

impl GeneratorConfig {
    pub fn validate(&self) -> Result<(), Error> {
        if self.min_payload_len == 0 || self.min_payload_len > self.max_payload_len {
            return Err(Error::BundleError(format!(
                "payload length range {}..={} is empty or starts at 0",
                self.min_payload_len, self.max_payload_len
            )));
        }
        if self.lifetime_ms == 0 {
            return Err(Error::InvalidLifetime);
        }
        if self.crc_types.is_empty() {
            return Err(Error::BundleError("no crc types to choose from".into()));
        }
        if let Some(bad) = self.crc_types.iter().find(|t| crc_len(**t).is_none()) {
            return Err(Error::InvalidCrcType(*bad));
        }
        if self.schemes.is_empty() {
            return Err(Error::BundleError("no endpoint schemes to choose from".into()));
        }
        if let Some(bad) = self.schemes.iter().find(|s| *s != "dtn" && *s != "ipn") {
            return Err(Error::BundleError(format!("unsupported scheme {}", bad)));
        }
        Ok(())
    }
}

const SERVICES: [&str; 8] = [
    "sms", "files", "123456", "incoming", "mavlink", "~news", "~tele", "~mavlink",
];

fn rnd_eid(rng: &mut WyRand, scheme: &str) -> EndpointID {
    let node = rng.generate_range(1_u64..99);
    if scheme == "ipn" {
        EndpointID::with_ipn(node, rng.generate_range(1_u64..256))
    } else {
        let service = SERVICES[rng.generate_range(0_usize..SERVICES.len())];
        EndpointID::Dtn(format!("//node{}/{}", node, service))
    }
}

fn pick<'a, T>(rng: &mut WyRand, items: &'a [T]) -> Option<&'a T> {
    if items.is_empty() {
        return None;
    }
    items.get(rng.generate_range(0_usize..items.len()))
}

fn generate(cfg: &GeneratorConfig, now: CreationTimestamp, rng: &mut WyRand) -> Bundle {
    let scheme = pick(rng, &cfg.schemes).map_or("dtn", |s| s.as_str());
    let src = rnd_eid(rng, scheme);
    let dst = rnd_eid(rng, scheme);

    let len = rng.generate_range(cfg.min_payload_len..=cfg.max_payload_len);
    let mut payload: ByteBuffer = vec![0; len];
    rng.fill_bytes(&mut payload);

    let mut primary = PrimaryBlock::new();
    primary.bundle_control_flags = BundleControlFlags::BUNDLE_MUST_NOT_FRAGMENTED.bits();
    primary.destination = dst;
    primary.report_to = src.clone();
    primary.source = src;
    primary.creation_timestamp = now;
    primary.lifetime = cfg.lifetime_ms;

    let mut canonicals = Vec::new();
    let mut next_number = 2;
    if cfg.hop_count && rng.generate_range(0_u8..2) == 1 {
        canonicals.push(new_hop_count_block(
            next_number,
            BlockControlFlags::empty(),
            rng.generate_range(1_u64..=255),
        ));
        next_number += 1;
    }
    if now.dtntime() == DTN_TIME_EPOCH {
        canonicals.push(new_bundle_age_block(
            next_number,
            BlockControlFlags::empty(),
            0,
        ));
    }
    canonicals.push(new_payload_block(BlockControlFlags::empty(), payload));

    let mut b = Bundle::new(primary, canonicals);
    let crc_type = pick(rng, &cfg.crc_types)
        .copied()
        .filter(|t| crc_len(*t).is_some())
        .unwrap_or(CRC_NO);
    b.set_crc(crc_type);
    if b.calculate_crc().is_err() {
        b.set_crc(CRC_NO);
    }
    b
}

/// A random, valid bundle created at `now` with the default generator settings.
pub fn rnd_bundle(now: CreationTimestamp) -> Bundle {
    generate(&GeneratorConfig::default(), now, &mut WyRand::new())
}

/// A random, valid bundle created at `now` following `cfg`.
pub fn rnd_bundle_with(cfg: &GeneratorConfig, now: CreationTimestamp) -> Result<Bundle, Error> {
    cfg.validate()?;
    Ok(generate(cfg, now, &mut WyRand::new()))
}

/// Fixed bundle used by the benchmarks.
pub fn get_bench_bundle(crc_type: CrcRawType) -> Result<Bundle, Error> {
    let dst = EndpointID::with_dtn("//node2/inbox")?;
    let src = EndpointID::with_dtn("//node1/123456")?;
    let now = CreationTimestamp::with_time_and_seq(dtn_time_now(), 0);

    let pblock = PrimaryBlockBuilder::default()
        .destination(dst)
        .source(src.clone())
        .report_to(src)
        .creation_timestamp(now)
        .lifetime(Duration::from_secs(60 * 60))
        .build()
        .map_err(|e| Error::BundleError(e.to_string()))?;
    let cblocks = vec![
        new_bundle_age_block(
            2,                          // block number
            BlockControlFlags::empty(), // flags
            0,                          // time elapsed
        ),
        new_payload_block(BlockControlFlags::empty(), b"ABC".to_vec()),
    ];
    let mut b = Bundle::new(pblock, cblocks);
    b.set_crc(crc_type);
    b.calculate_crc()?;
    b.validate().map_err(Error::ValidationError)?;
    Ok(b)
}
