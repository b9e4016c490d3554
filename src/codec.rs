//! Conversion between [`Bundle`] values and their CBOR wire form.
//!
//! A bundle is an indefinite-length CBOR array holding the primary block
//! followed by the canonical blocks, each of which is a definite-length
//! array whose last element is the optional crc value.

use crate::bundle::*;
use crate::canonical::*;
use crate::crc::*;
use crate::error::Error;
use crate::primary::*;
use serde::de::DeserializeOwned;
use serde::Serialize;

const CBOR_ARRAY_INDEFINITE: u8 = 0x9f;
const CBOR_BREAK: u8 = 0xff;
const CBOR_MAJOR_MASK: u8 = 0xe0;
const CBOR_MAJOR_ARRAY: u8 = 0x80;

/// Encode a bundle, computing all crc values on the way.
///
/// The bundle itself is left untouched, stored crc values are ignored.
pub fn encode(bundle: &Bundle) -> Result<ByteBuffer, Error> {
    let primary = &bundle.primary;
    for eid in [&primary.destination, &primary.source, &primary.report_to] {
        eid.validate()?;
    }
    for blck in &bundle.canonicals {
        if let Some(eid) = blck.previous_node_get() {
            eid.validate()?;
        }
    }

    let mut buf: ByteBuffer = vec![CBOR_ARRAY_INDEFINITE];
    buf.extend(encode_block(primary)?);
    for blck in &bundle.canonicals {
        buf.extend(encode_block(blck)?);
    }
    buf.push(CBOR_BREAK);
    Ok(buf)
}

/// Decode a bundle and verify the crc of every block against the received bytes.
///
/// Every block must be in its canonical form, i.e. encoding the decoded block
/// again yields exactly the received bytes.
pub fn decode(data: &[u8]) -> Result<Bundle, Error> {
    let (&head, _) = data
        .split_first()
        .ok_or_else(|| Error::codec(None, "empty input"))?;
    let mut pos = 1;
    let expected = if head == CBOR_ARRAY_INDEFINITE {
        None
    } else if head & CBOR_MAJOR_MASK == CBOR_MAJOR_ARRAY {
        let (len, consumed) = read_length(head, &data[1..])
            .ok_or_else(|| Error::codec(None, "truncated or invalid array header"))?;
        pos += consumed;
        Some(len)
    } else {
        return Err(Error::codec(None, "bundle is not a CBOR array"));
    };

    let mut primary: Option<(PrimaryBlock, &[u8])> = None;
    let mut canonicals: Vec<(CanonicalBlock, &[u8])> = Vec::new();
    let mut index = 0usize;
    loop {
        match expected {
            Some(len) if index as u64 == len => break,
            None if data.get(pos) == Some(&CBOR_BREAK) => {
                pos += 1;
                break;
            }
            _ => {}
        }
        if pos >= data.len() {
            return Err(Error::codec(None, "unexpected end of input"));
        }
        if index == 0 {
            let (blck, consumed) = decode_element::<PrimaryBlock>(&data[pos..], index)?;
            primary = Some((blck, &data[pos..pos + consumed]));
            pos += consumed;
        } else {
            let (blck, consumed) = decode_element::<CanonicalBlock>(&data[pos..], index)?;
            canonicals.push((blck, &data[pos..pos + consumed]));
            pos += consumed;
        }
        index += 1;
    }

    if pos != data.len() {
        return Err(Error::codec(None, "trailing bytes after bundle"));
    }
    let (primary, primary_raw) = match primary {
        Some(p) if !canonicals.is_empty() => p,
        _ => {
            return Err(Error::codec(
                None,
                "bundle needs a primary block and at least one canonical block",
            ))
        }
    };

    if primary.version() != DTN_VERSION {
        return Err(Error::VersionMismatch {
            found: primary.version(),
        });
    }

    if !verify_raw(primary.crc_type(), primary_raw)? {
        return Err(Error::CrcMismatch(0));
    }
    for (blck, raw) in &canonicals {
        if !verify_raw(blck.crc_type(), raw)? {
            return Err(Error::CrcMismatch(blck.block_number));
        }
    }

    Ok(Bundle::new(
        primary,
        canonicals.into_iter().map(|(blck, _)| blck).collect(),
    ))
}

/// Decode one block, returning it with the number of bytes it occupied.
fn decode_element<T>(data: &[u8], index: usize) -> Result<(T, usize), Error>
where
    T: DeserializeOwned + Serialize,
{
    match data.first() {
        Some(&b) if b & CBOR_MAJOR_MASK == CBOR_MAJOR_ARRAY && b != CBOR_ARRAY_INDEFINITE => {}
        _ => return Err(Error::codec(Some(index), "block is not a definite-length array")),
    }
    let mut de = serde_cbor::Deserializer::from_slice(data);
    let value = T::deserialize(&mut de).map_err(|e| Error::codec(Some(index), e))?;
    let consumed = de.byte_offset();

    let canonical = serde_cbor::to_vec(&value).map_err(|e| Error::codec(Some(index), e))?;
    if canonical.as_slice() != &data[..consumed] {
        return Err(Error::codec(Some(index), "non-canonical encoding"));
    }
    Ok((value, consumed))
}

/// Length argument of a CBOR header, with the number of extra bytes read.
fn read_length(head: u8, rest: &[u8]) -> Option<(u64, usize)> {
    let info = head & 0x1f;
    let n = match info {
        0..=23 => return Some((info as u64, 0)),
        24 => 1,
        25 => 2,
        26 => 4,
        27 => 8,
        _ => return None,
    };
    let bytes = rest.get(..n)?;
    let len = bytes.iter().fold(0u64, |acc, &b| (acc << 8) | b as u64);
    Some((len, n))
}
