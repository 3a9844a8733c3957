//! Self-Delimiting Numeric Value (SDNV) codec.
//!
//! An SDNV packs an unsigned integer into a sequence of 7-bit big-endian
//! groups, most-significant group first. Every byte but the last has its
//! high bit set, signalling "more bytes follow".


use thiserror::Error;

/// Errors produced while decoding an SDNV.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// The buffer ended before a terminating (high-bit-clear) byte was seen.
    #[error("SDNV value incomplete: buffer ended mid-value")]
    Incomplete,

    /// The decoded value does not fit in the requested integer width.
    #[error("SDNV value overflowed the target width")]
    Overflow,
}

/// Number of bytes `encode` would emit for `value`.
pub fn encoded_len(value: u64) -> usize {
    // Every group holds 7 bits; a zero value is still one byte.
    let bits = 64 - value.leading_zeros() as usize;
    core::cmp::max(1, bits.div_ceil(7))
}

/// Appends the SDNV encoding of `value` to `out`, returning the number of
/// bytes written.
pub fn encode(value: u64, out: &mut Vec<u8>) -> usize {
    let len = encoded_len(value);
    let start = out.len();
    out.resize(start + len, 0);
    let mut v = value;
    for i in (0..len).rev() {
        out[start + i] = (v & 0x7f) as u8 | if i != len - 1 { 0x80 } else { 0x00 };
        v >>= 7;
    }
    len
}

/// Encodes `value` into a freshly allocated buffer.
pub fn encode_to_vec(value: u64) -> Vec<u8> {
    let mut out = Vec::with_capacity(encoded_len(value));
    encode(value, &mut out);
    out
}

/// Decodes a single SDNV from the front of `data`.
///
/// Returns the decoded value and the number of bytes it occupied.
pub fn decode(data: &[u8]) -> Result<(u64, usize), Error> {
    decode_bounded(data, 64)
}

/// Decodes a single SDNV, failing with [`Error::Overflow`] if the value
/// requires more than `max_bits` bits to represent.
pub fn decode_bounded(data: &[u8], max_bits: u32) -> Result<(u64, usize), Error> {
    let mut value: u64 = 0;
    for (i, &byte) in data.iter().enumerate() {
        let group = (byte & 0x7f) as u64;
        if value >> 57 != 0 {
            // Top 7 bits already occupied: shifting left by 7 would discard them.
            return Err(Error::Overflow);
        }
        value = (value << 7) | group;

        if byte & 0x80 == 0 {
            let used_bits = 64 - value.leading_zeros();
            if used_bits > max_bits {
                return Err(Error::Overflow);
            }
            return Ok((value, i + 1));
        }
    }
    Err(Error::Incomplete)
}

/// Decodes a single SDNV bounded to `u32`, as used for CIDs and SDNV fill
/// counts.
pub fn decode_u32(data: &[u8]) -> Result<(u32, usize), Error> {
    let (v, len) = decode_bounded(data, 32)?;
    Ok((v as u32, len))
}
