//! Primary block: the SDNV-encoded subset of RFC 5050's primary bundle block.
//!
//! Unlike RFC 5050 proper this omits the shared byte-string dictionary —
//! every EID is written inline as a `(node, service)` SDNV pair — since the
//! IPN-only scheme this engine supports has no variable-length URI parts to
//! amortise. `block_length` is still carried so the body can be framed and
//! validated the way a real RFC 5050 parser would skip an unrecognised tail.

use crate::eid::Eid;
use crate::flags::PrimaryFlags;
use crate::Error;

pub const BP_VERSION: u8 = 6;

/// Fragmentation metadata, present only when [`PrimaryFlags::IS_FRAGMENT`] is set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FragmentInfo {
    pub offset: u32,
    pub total_adu_length: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrimaryBlock {
    pub flags: PrimaryFlags,
    pub dest: Eid,
    pub src: Eid,
    pub report_to: Eid,
    /// The bundle's current custodian — the node a DACS for this bundle's
    /// CID should be addressed to.
    pub custodian: Eid,
    pub creation_seconds: u64,
    pub creation_sequence: u64,
    pub lifetime: u32,
    pub fragment: Option<FragmentInfo>,
}

impl PrimaryBlock {
    pub fn encode(&self, out: &mut Vec<u8>) {
        let mut body = Vec::new();
        self.dest.encode(&mut body);
        self.src.encode(&mut body);
        self.report_to.encode(&mut body);
        self.custodian.encode(&mut body);
        dtnchan_sdnv::encode(self.creation_seconds, &mut body);
        dtnchan_sdnv::encode(self.creation_sequence, &mut body);
        dtnchan_sdnv::encode(self.lifetime as u64, &mut body);
        if let Some(frag) = self.fragment {
            dtnchan_sdnv::encode(frag.offset as u64, &mut body);
            dtnchan_sdnv::encode(frag.total_adu_length as u64, &mut body);
        }

        out.push(BP_VERSION);
        dtnchan_sdnv::encode(self.flags.bits() as u64, out);
        dtnchan_sdnv::encode(body.len() as u64, out);
        out.extend_from_slice(&body);
    }

    /// Decodes a primary block, returning it and the number of bytes consumed.
    pub fn decode(data: &[u8]) -> Result<(Self, usize), Error> {
        let version = *data.first().ok_or(Error::Incomplete)?;
        if version != BP_VERSION {
            return Err(Error::WrongVersion(version));
        }
        let mut pos = 1;

        let (flags_bits, n) = dtnchan_sdnv::decode(&data[pos..])?;
        pos += n;
        let flags = PrimaryFlags::from_bits_retain(flags_bits as u32);

        let (body_len, n) = dtnchan_sdnv::decode(&data[pos..])?;
        pos += n;
        let body_len = body_len as usize;
        let body = data.get(pos..pos + body_len).ok_or(Error::Incomplete)?;
        let total_consumed = pos + body_len;

        let mut bp = 0;
        let (dest, n) = Eid::decode(&body[bp..])?;
        bp += n;
        let (src, n) = Eid::decode(&body[bp..])?;
        bp += n;
        let (report_to, n) = Eid::decode(&body[bp..])?;
        bp += n;
        let (custodian, n) = Eid::decode(&body[bp..])?;
        bp += n;
        let (creation_seconds, n) = dtnchan_sdnv::decode(&body[bp..])?;
        bp += n;
        let (creation_sequence, n) = dtnchan_sdnv::decode(&body[bp..])?;
        bp += n;
        let (lifetime, n) = dtnchan_sdnv::decode_u32(&body[bp..])?;
        bp += n;

        let fragment = if flags.contains(PrimaryFlags::IS_FRAGMENT) {
            let (offset, n) = dtnchan_sdnv::decode_u32(&body[bp..])?;
            bp += n;
            let (total_adu_length, n) = dtnchan_sdnv::decode_u32(&body[bp..])?;
            bp += n;
            Some(FragmentInfo {
                offset,
                total_adu_length,
            })
        } else {
            None
        };

        if bp != body.len() {
            return Err(Error::InvalidDescriptor);
        }

        Ok((
            Self {
                flags,
                dest,
                src,
                report_to,
                custodian,
                creation_seconds,
                creation_sequence,
                lifetime,
                fragment,
            },
            total_consumed,
        ))
    }

    /// Parses only enough of a wire bundle to recover the destination EID,
    /// without allocating.
    pub fn routeinfo(data: &[u8]) -> Result<(u32, u32), Error> {
        let version = *data.first().ok_or(Error::Incomplete)?;
        if version != BP_VERSION {
            return Err(Error::WrongVersion(version));
        }
        let mut pos = 1;
        let (_flags, n) = dtnchan_sdnv::decode(&data[pos..])?;
        pos += n;
        let (_body_len, n) = dtnchan_sdnv::decode(&data[pos..])?;
        pos += n;
        let (dest, _) = Eid::decode(&data[pos..])?;
        Ok((dest.node, dest.service))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> PrimaryBlock {
        PrimaryBlock {
            flags: PrimaryFlags::CUSTODY_REQUESTED,
            dest: Eid::new(3, 4),
            src: Eid::new(1, 2),
            report_to: Eid::new(1, 0),
            custodian: Eid::new(1, 2),
            creation_seconds: 1_000_000,
            creation_sequence: 0,
            lifetime: 3600,
            fragment: None,
        }
    }

    #[test]
    fn round_trips() {
        let pb = sample();
        let mut buf = Vec::new();
        pb.encode(&mut buf);
        let (decoded, len) = PrimaryBlock::decode(&buf).unwrap();
        assert_eq!(decoded, pb);
        assert_eq!(len, buf.len());
    }

    #[test]
    fn round_trips_with_fragment_info() {
        let mut pb = sample();
        pb.flags |= PrimaryFlags::IS_FRAGMENT;
        pb.fragment = Some(FragmentInfo {
            offset: 4096,
            total_adu_length: 10_000,
        });
        let mut buf = Vec::new();
        pb.encode(&mut buf);
        let (decoded, _) = PrimaryBlock::decode(&buf).unwrap();
        assert_eq!(decoded, pb);
    }

    #[test]
    fn routeinfo_recovers_destination_without_full_decode() {
        let pb = sample();
        let mut buf = Vec::new();
        pb.encode(&mut buf);
        assert_eq!(PrimaryBlock::routeinfo(&buf).unwrap(), (3, 4));
    }

    #[test]
    fn rejects_wrong_version() {
        let mut buf = vec![7u8];
        buf.extend_from_slice(&[0, 0]);
        assert_eq!(PrimaryBlock::decode(&buf), Err(Error::WrongVersion(7)));
    }

    #[test]
    fn rejects_truncated_buffer() {
        let pb = sample();
        let mut buf = Vec::new();
        pb.encode(&mut buf);
        buf.truncate(buf.len() - 2);
        assert!(matches!(PrimaryBlock::decode(&buf), Err(Error::Incomplete)));
    }
}
