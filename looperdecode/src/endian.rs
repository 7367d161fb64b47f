//! Byte-order primitives shared by every container parser.
//!
//! Container headers in this crate are parsed from byte slices that were
//! already read from disk, so the readers here never perform I/O. A short
//! slice is a truncated header and surfaces as
//! [`DecodeError::MalformedContainer`].

use crate::error::DecodeError;

/// Longest encoding accepted by [`decode_varint`].
pub const MAX_VARINT_LEN: usize = 5;

#[inline]
pub const fn swap16(value: u16) -> u16 {
    value.swap_bytes()
}

#[inline]
pub const fn swap32(value: u32) -> u32 {
    value.swap_bytes()
}

#[inline]
pub const fn swap64(value: u64) -> u64 {
    value.swap_bytes()
}

/// Decodes a big-endian base-128 integer where every byte but the last has
/// its high bit set, as used by CAF packet tables.
///
/// Returns the value and the number of bytes consumed.
pub fn decode_varint(bytes: &[u8]) -> Result<(u32, u32), DecodeError> {
    let mut value: u32 = 0;
    for (index, &byte) in bytes.iter().take(MAX_VARINT_LEN).enumerate() {
        value = (value << 7) | u32::from(byte & 0x7F);
        if byte & 0x80 == 0 {
            return Ok((value, index as u32 + 1));
        }
    }
    Err(DecodeError::MalformedVarInt)
}

/// Appends the encoding read back by [`decode_varint`] and returns its length.
pub fn encode_varint(mut value: u32, out: &mut Vec<u8>) -> usize {
    let mut groups = [0u8; MAX_VARINT_LEN];
    let mut len = 0;
    loop {
        groups[len] = (value & 0x7F) as u8;
        len += 1;
        value >>= 7;
        if value == 0 {
            break;
        }
    }
    for i in (0..len).rev() {
        let continuation = if i == 0 { 0 } else { 0x80 };
        out.push(groups[i] | continuation);
    }
    len
}

fn take<const N: usize>(bytes: &[u8], offset: usize) -> Result<[u8; N], DecodeError> {
    offset
        .checked_add(N)
        .and_then(|end| bytes.get(offset..end))
        .and_then(|slice| <[u8; N]>::try_from(slice).ok())
        .ok_or_else(|| {
            DecodeError::malformed(format!(
                "header truncated: need {N} bytes at offset {offset}, have {}",
                bytes.len()
            ))
        })
}

pub fn be_u16(bytes: &[u8], offset: usize) -> Result<u16, DecodeError> {
    take::<2>(bytes, offset).map(u16::from_be_bytes)
}

pub fn be_u32(bytes: &[u8], offset: usize) -> Result<u32, DecodeError> {
    take::<4>(bytes, offset).map(u32::from_be_bytes)
}

pub fn be_i32(bytes: &[u8], offset: usize) -> Result<i32, DecodeError> {
    take::<4>(bytes, offset).map(i32::from_be_bytes)
}

pub fn be_u64(bytes: &[u8], offset: usize) -> Result<u64, DecodeError> {
    take::<8>(bytes, offset).map(u64::from_be_bytes)
}

pub fn be_i64(bytes: &[u8], offset: usize) -> Result<i64, DecodeError> {
    take::<8>(bytes, offset).map(i64::from_be_bytes)
}

pub fn be_f64(bytes: &[u8], offset: usize) -> Result<f64, DecodeError> {
    take::<8>(bytes, offset).map(f64::from_be_bytes)
}

pub fn le_u16(bytes: &[u8], offset: usize) -> Result<u16, DecodeError> {
    take::<2>(bytes, offset).map(u16::from_le_bytes)
}

pub fn le_u32(bytes: &[u8], offset: usize) -> Result<u32, DecodeError> {
    take::<4>(bytes, offset).map(u32::from_le_bytes)
}

/// Packs a four-character code into the big-endian integer form used by
/// [`crate::chunk::ChunkRef::tag`].
#[inline]
pub const fn fourcc(code: &[u8; 4]) -> u32 {
    u32::from_be_bytes(*code)
}

/// Renders a packed tag for log and error messages.
pub fn fourcc_str(tag: u32) -> String {
    tag.to_be_bytes()
        .iter()
        .map(|&b| if b.is_ascii_graphic() || b == b' ' { b as char } else { '?' })
        .collect()
}
