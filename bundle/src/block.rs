//! Generic RFC 5050 canonical block framing: a one-byte type code, an SDNV
//! processing-flags field, an SDNV content length, then the content.

use crate::Error;

pub const BLOCK_TYPE_PAYLOAD: u8 = 1;
pub const BLOCK_TYPE_PREVIOUS_NODE: u8 = 6;
/// RFC 5050 reserves 192-255 for application-specific block types.
pub const BLOCK_TYPE_INTEGRITY: u8 = 192;
/// Carries the custody identifier a requesting channel assigned this bundle,
/// present iff `CUSTODY_REQUESTED` is set. Not part of literal RFC 5050;
/// `bplib`'s `bundle_update(..., bp_val_t cid, ...)` patches an equivalent
/// value into the bundle after custody-transfer CID assignment.
pub const BLOCK_TYPE_CUSTODY_ID: u8 = 193;

pub const BLOCK_FLAG_LAST_BLOCK: u64 = 1 << 0;
/// Set on a block the sender considers mandatory: an unrecognised block
/// type carrying this bit raises `NONCOMPLIANT` instead of being silently
/// skipped.
pub const BLOCK_FLAG_MUST_REPLICATE: u64 = 1 << 1;

pub(crate) fn encode(block_type: u8, flags: u64, content: &[u8], out: &mut Vec<u8>) {
    out.push(block_type);
    dtnchan_sdnv::encode(flags, out);
    dtnchan_sdnv::encode(content.len() as u64, out);
    out.extend_from_slice(content);
}

/// Decodes one canonical block, returning `(type, flags, content, consumed)`.
pub(crate) fn decode(data: &[u8]) -> Result<(u8, u64, &[u8], usize), Error> {
    let block_type = *data.first().ok_or(Error::Incomplete)?;
    let mut pos = 1;
    let (flags, n) = dtnchan_sdnv::decode(&data[pos..])?;
    pos += n;
    let (len, n) = dtnchan_sdnv::decode(&data[pos..])?;
    pos += n;
    let len = len as usize;
    let content = data.get(pos..pos + len).ok_or(Error::Incomplete)?;
    pos += len;
    Ok((block_type, flags, content, pos))
}
