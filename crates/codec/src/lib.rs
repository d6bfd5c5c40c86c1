//! # Codec: record and hint framing
//!
//! Pure functions over byte buffers. Every frame written to a data file or a
//! hint file is produced and parsed here; the codec itself never touches a
//! file handle.
//!
//! ## Record frame (data files)
//!
//! ```text
//! [crc32: u32 LE][timestamp: u32 LE][key_size: u32 LE][value_size: u32 LE][key][value]
//! ```
//!
//! The CRC-32 (IEEE) covers every byte after itself, i.e. the remaining 12
//! header bytes plus key plus value. It is computed last and patched into the
//! first four bytes.
//!
//! ## Hint frame (hint files)
//!
//! ```text
//! [timestamp: u32 LE][key_size: u32 LE][value_size: u32 LE][value_offset: u64 LE][key]
//! ```
//!
//! Hint entries carry no CRC; they are a derived index and can be rebuilt
//! from the data file. `value_offset` is the absolute position of the *value*
//! within its data file, not the start of the record.

use byteorder::{ByteOrder, LittleEndian};
use crc32fast::Hasher as Crc32;
use thiserror::Error;

/// Fixed prefix of every record frame: crc + timestamp + key_size + value_size.
pub const RECORD_HEADER_SIZE: usize = 16;

/// Fixed prefix of every hint frame: timestamp + key_size + value_size + value_offset.
pub const HINT_HEADER_SIZE: usize = 20;

/// Errors produced while parsing frames.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CodecError {
    /// The buffer is too short for the declared sizes, or the stored CRC does
    /// not match the frame contents.
    #[error("corrupt record")]
    Corrupt,
}

/// The fixed-size header of a record frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordHeader {
    pub crc: u32,
    pub timestamp: u32,
    pub key_size: u32,
    pub value_size: u32,
}

/// A fully decoded record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub timestamp: u32,
    pub key: Vec<u8>,
    pub value: Vec<u8>,
}

/// The fixed-size header of a hint frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HintHeader {
    pub timestamp: u32,
    pub key_size: u32,
    pub value_size: u32,
    pub value_offset: u64,
}

/// Frames a key-value pair into a record buffer ready for appending.
///
/// The returned buffer is exactly `RECORD_HEADER_SIZE + key.len() +
/// value.len()` bytes. The CRC is computed over everything after itself and
/// patched in last.
pub fn encode_record(key: &[u8], value: &[u8], timestamp: u32) -> Vec<u8> {
    let mut buf = Vec::with_capacity(RECORD_HEADER_SIZE + key.len() + value.len());

    // Reserve the CRC slot, filled after the rest of the frame is in place.
    buf.extend_from_slice(&[0u8; 4]);
    buf.extend_from_slice(&timestamp.to_le_bytes());
    buf.extend_from_slice(&(key.len() as u32).to_le_bytes());
    buf.extend_from_slice(&(value.len() as u32).to_le_bytes());
    buf.extend_from_slice(key);
    buf.extend_from_slice(value);

    let mut hasher = Crc32::new();
    hasher.update(&buf[4..]);
    let crc = hasher.finalize();
    buf[0..4].copy_from_slice(&crc.to_le_bytes());

    buf
}

/// Parses the 16-byte record header. The CRC is *not* verified here; only
/// [`decode_record`] sees the full frame.
pub fn decode_record_header(data: &[u8]) -> Result<RecordHeader, CodecError> {
    if data.len() < RECORD_HEADER_SIZE {
        return Err(CodecError::Corrupt);
    }

    Ok(RecordHeader {
        crc: LittleEndian::read_u32(&data[0..4]),
        timestamp: LittleEndian::read_u32(&data[4..8]),
        key_size: LittleEndian::read_u32(&data[8..12]),
        value_size: LittleEndian::read_u32(&data[12..16]),
    })
}

/// Decodes and verifies a full record frame.
///
/// Fails with [`CodecError::Corrupt`] when the buffer is shorter than the
/// declared key and value sizes, or when the stored CRC does not match the
/// frame contents.
pub fn decode_record(data: &[u8]) -> Result<Record, CodecError> {
    let header = decode_record_header(data)?;

    let key_size = header.key_size as usize;
    let value_size = header.value_size as usize;
    let frame_len = RECORD_HEADER_SIZE + key_size + value_size;
    if data.len() < frame_len {
        return Err(CodecError::Corrupt);
    }

    let mut hasher = Crc32::new();
    hasher.update(&data[4..frame_len]);
    if hasher.finalize() != header.crc {
        return Err(CodecError::Corrupt);
    }

    let key = data[RECORD_HEADER_SIZE..RECORD_HEADER_SIZE + key_size].to_vec();
    let value = data[RECORD_HEADER_SIZE + key_size..frame_len].to_vec();

    Ok(Record {
        timestamp: header.timestamp,
        key,
        value,
    })
}

/// Frames a hint entry. `value_offset` must be the absolute position of the
/// value bytes within the data file.
pub fn encode_hint(timestamp: u32, value_size: u32, value_offset: u64, key: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(HINT_HEADER_SIZE + key.len());

    buf.extend_from_slice(&timestamp.to_le_bytes());
    buf.extend_from_slice(&(key.len() as u32).to_le_bytes());
    buf.extend_from_slice(&value_size.to_le_bytes());
    buf.extend_from_slice(&value_offset.to_le_bytes());
    buf.extend_from_slice(key);

    buf
}

/// Parses the 20-byte hint header.
pub fn decode_hint_header(data: &[u8]) -> Result<HintHeader, CodecError> {
    if data.len() < HINT_HEADER_SIZE {
        return Err(CodecError::Corrupt);
    }

    Ok(HintHeader {
        timestamp: LittleEndian::read_u32(&data[0..4]),
        key_size: LittleEndian::read_u32(&data[4..8]),
        value_size: LittleEndian::read_u32(&data[8..12]),
        value_offset: LittleEndian::read_u64(&data[12..20]),
    })
}
