//! EBML primitives
//!
//! Element IDs are stored with their length-marker bits included, exactly as
//! they appear on disk. Sizes use the variable-length integer encoding; the
//! all-ones 8-byte value means "unknown size" and is used for live streams.

use bytes::{BufMut, BytesMut};
use std::io;

pub const EBML: u32 = 0x1A45_DFA3;
pub const EBML_VERSION: u32 = 0x4286;
pub const EBML_READ_VERSION: u32 = 0x42F7;
pub const EBML_MAX_ID_LENGTH: u32 = 0x42F2;
pub const EBML_MAX_SIZE_LENGTH: u32 = 0x42F3;
pub const DOC_TYPE: u32 = 0x4282;
pub const DOC_TYPE_VERSION: u32 = 0x4287;
pub const DOC_TYPE_READ_VERSION: u32 = 0x4285;

pub const SEGMENT: u32 = 0x1853_8067;
pub const INFO: u32 = 0x1549_A966;
pub const TIMECODE_SCALE: u32 = 0x2A_D7B1;
pub const MUXING_APP: u32 = 0x4D80;
pub const WRITING_APP: u32 = 0x5741;

pub const TRACKS: u32 = 0x1654_AE6B;
pub const TRACK_ENTRY: u32 = 0xAE;
pub const TRACK_NUMBER: u32 = 0xD7;
pub const TRACK_UID: u32 = 0x73C5;
pub const TRACK_TYPE: u32 = 0x83;
pub const NAME: u32 = 0x536E;
pub const CODEC_ID: u32 = 0x86;
pub const VIDEO: u32 = 0xE0;
pub const PIXEL_WIDTH: u32 = 0xB0;
pub const PIXEL_HEIGHT: u32 = 0xBA;
pub const AUDIO: u32 = 0xE1;
pub const SAMPLING_FREQUENCY: u32 = 0xB5;
pub const CHANNELS: u32 = 0x9F;

pub const CLUSTER: u32 = 0x1F43_B675;
pub const TIMECODE: u32 = 0xE7;
pub const SIMPLE_BLOCK: u32 = 0xA3;

pub const UNKNOWN_SIZE: [u8; 8] = [0x01, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF];

pub fn put_id(buf: &mut BytesMut, id: u32) {
    let bytes = id.to_be_bytes();
    let skip = bytes.iter().take_while(|&&b| b == 0).count().min(3);
    buf.put_slice(&bytes[skip..]);
}

/// Variable-length integer, shortest form. Also used for track numbers
/// inside SimpleBlock headers.
pub fn put_vint(buf: &mut BytesMut, value: u64) {
    let mut len = 1;
    // all-ones is reserved at every length
    while len < 8 && value >= (1u64 << (7 * len)) - 1 {
        len += 1;
    }
    let marked = value | (1u64 << (7 * len));
    buf.put_slice(&marked.to_be_bytes()[8 - len..]);
}

pub fn put_unknown_size(buf: &mut BytesMut) {
    buf.put_slice(&UNKNOWN_SIZE);
}

pub fn put_uint(buf: &mut BytesMut, id: u32, value: u64) {
    let bytes = value.to_be_bytes();
    let skip = bytes.iter().take_while(|&&b| b == 0).count().min(7);
    put_id(buf, id);
    put_vint(buf, (8 - skip) as u64);
    buf.put_slice(&bytes[skip..]);
}

pub fn put_float(buf: &mut BytesMut, id: u32, value: f64) {
    put_id(buf, id);
    put_vint(buf, 8);
    buf.put_f64(value);
}

pub fn put_string(buf: &mut BytesMut, id: u32, value: &str) {
    put_id(buf, id);
    put_vint(buf, value.len() as u64);
    buf.put_slice(value.as_bytes());
}

pub fn put_master(buf: &mut BytesMut, id: u32, body: &[u8]) {
    put_id(buf, id);
    put_vint(buf, body.len() as u64);
    buf.put_slice(body);
}

fn truncated() -> io::Error {
    io::Error::new(io::ErrorKind::UnexpectedEof, "truncated EBML element")
}

/// Read an element ID, markers included. Returns the ID and its length.
pub fn read_id(data: &[u8]) -> io::Result<(u32, usize)> {
    let first = *data.first().ok_or_else(truncated)?;
    let len = first.leading_zeros() as usize + 1;
    if len > 4 {
        return Err(io::Error::new(io::ErrorKind::InvalidData, "invalid EBML ID"));
    }
    if data.len() < len {
        return Err(truncated());
    }
    let id = data[..len].iter().fold(0u32, |acc, &b| (acc << 8) | b as u32);
    Ok((id, len))
}

/// Read a size field. `None` means unknown size.
pub fn read_vint(data: &[u8]) -> io::Result<(Option<u64>, usize)> {
    let first = *data.first().ok_or_else(truncated)?;
    let len = first.leading_zeros() as usize + 1;
    if len > 8 {
        return Err(io::Error::new(io::ErrorKind::InvalidData, "invalid EBML size"));
    }
    if data.len() < len {
        return Err(truncated());
    }
    let mask = if len == 8 { 0 } else { 0xFFu8 >> len };
    let mut value = (first & mask) as u64;
    for &b in &data[1..len] {
        value = (value << 8) | b as u64;
    }
    let all_ones = (1u64 << (7 * len)) - 1;
    if value == all_ones {
        Ok((None, len))
    } else {
        Ok((Some(value), len))
    }
}

pub fn read_uint(body: &[u8]) -> u64 {
    body.iter().fold(0u64, |acc, &b| (acc << 8) | b as u64)
}

pub fn read_float(body: &[u8]) -> io::Result<f64> {
    match body.len() {
        4 => Ok(f32::from_be_bytes([body[0], body[1], body[2], body[3]]) as f64),
        8 => {
            let mut raw = [0u8; 8];
            raw.copy_from_slice(body);
            Ok(f64::from_be_bytes(raw))
        }
        0 => Ok(0.0),
        _ => Err(io::Error::new(io::ErrorKind::InvalidData, "invalid EBML float")),
    }
}
