//! Record wire format
//!
//! ```text
//! [version: u8][payload: bincode(WireRecord)][crc32(version + payload): u32 LE]
//! ```
//!
//! The same bytes are written to both indexes, so the order index member
//! and the point index value for one record are byte-identical.

use crate::model::Record;
use bytes::{BufMut, Bytes, BytesMut};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

pub const FORMAT_VERSION: u8 = 1;

const HEADER_LEN: usize = 1;
const CHECKSUM_LEN: usize = 4;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("frame too short: {0} bytes")]
    Truncated(usize),
    #[error("unsupported format version {0}")]
    UnsupportedVersion(u8),
    #[error("checksum mismatch: stored {stored:#010x}, computed {computed:#010x}")]
    ChecksumMismatch { stored: u32, computed: u32 },
    #[error("malformed payload: {0}")]
    Payload(#[from] bincode::Error),
    #[error("record has nil identity")]
    NilIdentity,
}

#[derive(Serialize, Deserialize)]
struct WireRecord {
    id: [u8; 16],
    timestamp: i64,
    max: i64,
}

pub fn encode(record: &Record) -> Result<Bytes, CodecError> {
    let wire = WireRecord {
        id: *record.id.as_bytes(),
        timestamp: record.timestamp,
        max: record.max,
    };
    let payload = bincode::serialize(&wire)?;

    let mut buf = BytesMut::with_capacity(HEADER_LEN + payload.len() + CHECKSUM_LEN);
    buf.put_u8(FORMAT_VERSION);
    buf.put_slice(&payload);
    let checksum = crc32fast::hash(&buf);
    buf.put_u32_le(checksum);

    Ok(buf.freeze())
}

/// Decode and validate. A nil identity is rejected here so no caller ever
/// sees one.
pub fn decode(frame: &[u8]) -> Result<Record, CodecError> {
    if frame.len() < HEADER_LEN + CHECKSUM_LEN + 1 {
        return Err(CodecError::Truncated(frame.len()));
    }

    let (body, trailer) = frame.split_at(frame.len() - CHECKSUM_LEN);
    let mut stored_bytes = [0u8; CHECKSUM_LEN];
    stored_bytes.copy_from_slice(trailer);
    let stored = u32::from_le_bytes(stored_bytes);
    let computed = crc32fast::hash(body);
    if stored != computed {
        return Err(CodecError::ChecksumMismatch { stored, computed });
    }

    let version = body[0];
    if version != FORMAT_VERSION {
        return Err(CodecError::UnsupportedVersion(version));
    }

    let wire: WireRecord = bincode::deserialize(&body[HEADER_LEN..])?;
    let record = Record::new(Uuid::from_bytes(wire.id), wire.timestamp, wire.max);
    if !record.has_valid_identity() {
        return Err(CodecError::NilIdentity);
    }
    Ok(record)
}
