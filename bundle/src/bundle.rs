//! Top-level bundle assembly: generate (payload → wire bytes, with
//! fragmentation) and receive (wire bytes → classified bundle).

use crate::block::{self, BLOCK_FLAG_LAST_BLOCK, BLOCK_FLAG_MUST_REPLICATE};
use crate::eid::Eid;
use crate::flags::PrimaryFlags;
use crate::integrity::{self, CipherSuite};
use crate::primary::{FragmentInfo, PrimaryBlock};
use crate::Error;
use bitflags::bitflags;

bitflags! {
    /// Transient, non-fatal conditions surfaced while decoding a bundle.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct DecodeFlags: u8 {
        /// An unrecognised canonical block carried `BLOCK_FLAG_MUST_REPLICATE`.
        const NONCOMPLIANT = 1 << 0;
    }
}

/// The immutable source/destination/report-to triple for a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Route {
    pub source: Eid,
    pub destination: Eid,
    pub report_to: Eid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CreationTimestamp {
    pub seconds: u64,
    pub sequence: u64,
}

impl CreationTimestamp {
    pub fn new(seconds: u64, sequence: u64) -> Self {
        Self { seconds, sequence }
    }
}

/// The subset of channel attributes that shape bundle generation.
#[derive(Debug, Clone, Copy)]
pub struct GenerateOptions {
    pub lifetime_secs: u32,
    pub request_custody: bool,
    pub admin_record: bool,
    pub integrity_check: Option<CipherSuite>,
    pub allow_fragmentation: bool,
    pub max_length: Option<usize>,
}

impl Default for GenerateOptions {
    fn default() -> Self {
        Self {
            lifetime_secs: 3600,
            request_custody: false,
            admin_record: false,
            integrity_check: None,
            allow_fragmentation: false,
            max_length: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bundle {
    pub primary: PrimaryBlock,
    pub previous_node: Option<Eid>,
    /// Which cipher the integrity block was built/verified with, if present.
    pub integrity: Option<CipherSuite>,
    /// The custody identifier the requesting channel assigned this bundle,
    /// present iff custody was requested. Unset by [`generate`]; a channel
    /// patches it in via [`Bundle::with_custody_id`] once its active table
    /// has assigned a CID, mirroring `bplib`'s `bundle_update`.
    pub custody_id: Option<u32>,
    pub payload: Vec<u8>,
}

impl Bundle {
    /// Patches in the custody identifier a channel's active table assigned
    /// after this bundle was generated.
    pub fn with_custody_id(mut self, cid: u32) -> Self {
        self.custody_id = Some(cid);
        self
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        self.primary.encode(&mut out);

        if let Some(prev) = self.previous_node {
            let mut content = Vec::new();
            prev.encode(&mut content);
            block::encode(block::BLOCK_TYPE_PREVIOUS_NODE, 0, &content, &mut out);
        }

        if let Some(cid) = self.custody_id {
            let mut content = Vec::new();
            dtnchan_sdnv::encode(cid as u64, &mut content);
            block::encode(block::BLOCK_TYPE_CUSTODY_ID, BLOCK_FLAG_MUST_REPLICATE, &content, &mut out);
        }

        let payload_flags = if self.integrity.is_none() {
            BLOCK_FLAG_LAST_BLOCK
        } else {
            0
        };
        block::encode(block::BLOCK_TYPE_PAYLOAD, payload_flags, &self.payload, &mut out);

        if let Some(cipher) = self.integrity {
            integrity::encode(cipher, &self.payload, &mut out);
        }

        out
    }

    pub fn decode(data: &[u8]) -> Result<(Self, DecodeFlags), Error> {
        let (primary, mut pos) = PrimaryBlock::decode(data)?;

        let mut previous_node = None;
        let mut integrity = None;
        let mut custody_id = None;
        let mut payload: Option<Vec<u8>> = None;
        let mut flags = DecodeFlags::empty();

        while pos < data.len() {
            let (block_type, block_flags, content, consumed) = block::decode(&data[pos..])?;
            pos += consumed;

            match block_type {
                block::BLOCK_TYPE_PAYLOAD => payload = Some(content.to_vec()),
                block::BLOCK_TYPE_PREVIOUS_NODE => {
                    let (eid, _) = Eid::decode(content)?;
                    previous_node = Some(eid);
                }
                block::BLOCK_TYPE_CUSTODY_ID => {
                    let (cid, _) = dtnchan_sdnv::decode_u32(content)?;
                    custody_id = Some(cid);
                }
                block::BLOCK_TYPE_INTEGRITY => {
                    let (cipher, crc) = integrity::decode(content)?;
                    if let Some(p) = &payload {
                        integrity::verify(cipher, crc, p)?;
                    }
                    integrity = Some(cipher);
                }
                _ => {
                    if block_flags & BLOCK_FLAG_MUST_REPLICATE != 0 {
                        flags |= DecodeFlags::NONCOMPLIANT;
                    }
                }
            }

            if block_flags & BLOCK_FLAG_LAST_BLOCK != 0 {
                break;
            }
        }

        let payload = payload.ok_or(Error::InvalidDescriptor)?;
        Ok((
            Self {
                primary,
                previous_node,
                integrity,
                custody_id,
                payload,
            },
            flags,
        ))
    }
}

/// Result of classifying a received bundle against the local node's EID.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Received {
    /// Addressed to this channel's own node/service.
    Local { bundle: Bundle, is_admin_record: bool },
    /// Addressed elsewhere; `custodian` names who to forward custody to.
    Forward { bundle: Bundle, custodian: Eid },
}

/// Decodes `data` and classifies it relative to `local`.
pub fn receive(data: &[u8], local: &Eid) -> Result<(Received, DecodeFlags), Error> {
    let (bundle, flags) = Bundle::decode(data)?;
    if bundle.primary.dest == *local {
        let is_admin_record = bundle.primary.flags.contains(PrimaryFlags::IS_ADMIN_RECORD);
        Ok((Received::Local { bundle, is_admin_record }, flags))
    } else {
        let custodian = bundle.primary.custodian;
        Ok((Received::Forward { bundle, custodian }, flags))
    }
}

/// Builds one or more bundles carrying `payload`, fragmenting if it would
/// otherwise exceed `opts.max_length`.
pub fn generate(
    route: &Route,
    custodian: Eid,
    opts: &GenerateOptions,
    payload: &[u8],
    creation: CreationTimestamp,
) -> Result<Vec<Bundle>, Error> {
    let mut flags = PrimaryFlags::empty();
    if opts.request_custody {
        flags |= PrimaryFlags::CUSTODY_REQUESTED;
    }
    if opts.admin_record {
        flags |= PrimaryFlags::IS_ADMIN_RECORD;
    }

    let base_primary = PrimaryBlock {
        flags,
        dest: route.destination,
        src: route.source,
        report_to: route.report_to,
        custodian,
        creation_seconds: creation.seconds,
        creation_sequence: creation.sequence,
        lifetime: opts.lifetime_secs,
        fragment: None,
    };

    let whole = Bundle {
        primary: base_primary,
        previous_node: None,
        integrity: opts.integrity_check,
        custody_id: None,
        payload: payload.to_vec(),
    };

    // The real CID is assigned by the channel after `generate` returns (via
    // `Bundle::with_custody_id`), so size checks here must reserve space for
    // the worst-case encoding of that not-yet-known block up front.
    let custody_overhead = if opts.request_custody { custody_id_probe_len() } else { 0 };

    let Some(max_length) = opts.max_length else {
        return Ok(vec![whole]);
    };
    if whole.encode().len() + custody_overhead <= max_length {
        return Ok(vec![whole]);
    }
    if !opts.allow_fragmentation {
        return Err(Error::BundleTooLarge);
    }
    fragment(&base_primary, payload, max_length)
}

/// Worst-case wire length of a custody-id block (SDNV of `u32::MAX`, the
/// largest value any real CID can take).
fn custody_id_probe_len() -> usize {
    let mut content = Vec::new();
    dtnchan_sdnv::encode(u32::MAX as u64, &mut content);
    let mut buf = Vec::new();
    block::encode(block::BLOCK_TYPE_CUSTODY_ID, BLOCK_FLAG_MUST_REPLICATE, &content, &mut buf);
    buf.len()
}

/// Splits `payload` across multiple fragment bundles, each at most
/// `max_length` bytes on the wire. Fragments never carry an integrity block
/// (the payload boundary differs per fragment; whole-ADU integrity is a
/// receiver-side reassembly concern outside this codec's scope).
fn fragment(base: &PrimaryBlock, payload: &[u8], max_length: usize) -> Result<Vec<Bundle>, Error> {
    // Probe with `offset == total_adu_length`: every real fragment's offset
    // is strictly smaller, and an SDNV never shrinks as its value grows, so
    // this probe's encoded size is an upper bound on every real fragment.
    let mut probe_primary = *base;
    probe_primary.flags |= PrimaryFlags::IS_FRAGMENT;
    probe_primary.fragment = Some(FragmentInfo {
        offset: payload.len() as u32,
        total_adu_length: payload.len() as u32,
    });

    let mut overhead = Vec::new();
    probe_primary.encode(&mut overhead);
    let mut header = Vec::new();
    block::encode(block::BLOCK_TYPE_PAYLOAD, BLOCK_FLAG_LAST_BLOCK, &[], &mut header);
    let custody_overhead = if base.flags.contains(PrimaryFlags::CUSTODY_REQUESTED) {
        custody_id_probe_len()
    } else {
        0
    };
    let overhead = overhead.len() + header.len() + custody_overhead;

    if overhead >= max_length {
        return Err(Error::BundleTooLarge);
    }
    let chunk_size = max_length - overhead;

    let mut bundles = Vec::new();
    let mut offset = 0usize;
    while offset < payload.len() {
        let end = (offset + chunk_size).min(payload.len());
        let mut primary = probe_primary;
        primary.fragment = Some(FragmentInfo {
            offset: offset as u32,
            total_adu_length: payload.len() as u32,
        });
        bundles.push(Bundle {
            primary,
            previous_node: None,
            integrity: None,
            custody_id: None,
            payload: payload[offset..end].to_vec(),
        });
        offset = end;
    }
    Ok(bundles)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn route() -> Route {
        Route {
            source: Eid::new(1, 2),
            destination: Eid::new(3, 4),
            report_to: Eid::new(1, 0),
        }
    }

    #[test]
    fn generate_then_receive_round_trips_payload_and_route() {
        let bundles = generate(
            &route(),
            Eid::new(1, 2),
            &GenerateOptions::default(),
            b"hello",
            CreationTimestamp::new(1000, 0),
        )
        .unwrap();
        assert_eq!(bundles.len(), 1);
        let wire = bundles[0].encode();

        assert_eq!(PrimaryBlock::routeinfo(&wire).unwrap(), (3, 4));

        let (received, flags) = receive(&wire, &Eid::new(3, 4)).unwrap();
        assert_eq!(flags, DecodeFlags::empty());
        match received {
            Received::Local { bundle, is_admin_record } => {
                assert!(!is_admin_record);
                assert_eq!(bundle.payload, b"hello");
                assert_eq!(bundle.primary.src, Eid::new(1, 2));
            }
            Received::Forward { .. } => panic!("expected a local delivery"),
        }
    }

    #[test]
    fn receive_for_a_different_node_reports_forward() {
        let bundles = generate(
            &route(),
            Eid::new(1, 2),
            &GenerateOptions::default(),
            b"hello",
            CreationTimestamp::new(1000, 0),
        )
        .unwrap();
        let wire = bundles[0].encode();

        let (received, _) = receive(&wire, &Eid::new(9, 9)).unwrap();
        match received {
            Received::Forward { custodian, .. } => assert_eq!(custodian, Eid::new(1, 2)),
            Received::Local { .. } => panic!("expected forward"),
        }
    }

    #[test]
    fn oversized_bundle_without_fragmentation_fails() {
        let opts = GenerateOptions {
            max_length: Some(16),
            allow_fragmentation: false,
            ..Default::default()
        };
        let err = generate(
            &route(),
            Eid::new(1, 2),
            &opts,
            &vec![0u8; 256],
            CreationTimestamp::new(1000, 0),
        )
        .unwrap_err();
        assert_eq!(err, Error::BundleTooLarge);
    }

    #[test]
    fn oversized_bundle_with_fragmentation_splits_and_reassembles() {
        let opts = GenerateOptions {
            max_length: Some(64),
            allow_fragmentation: true,
            ..Default::default()
        };
        let payload = (0..500u32).map(|v| v as u8).collect::<Vec<_>>();
        let bundles = generate(
            &route(),
            Eid::new(1, 2),
            &opts,
            &payload,
            CreationTimestamp::new(1000, 0),
        )
        .unwrap();
        assert!(bundles.len() > 1);

        let mut reassembled = Vec::new();
        for b in &bundles {
            assert!(b.encode().len() <= 64);
            let frag = b.primary.fragment.unwrap();
            assert_eq!(frag.offset as usize, reassembled.len());
            assert_eq!(frag.total_adu_length as usize, payload.len());
            reassembled.extend_from_slice(&b.payload);
        }
        assert_eq!(reassembled, payload);
    }

    #[test]
    fn integrity_check_survives_round_trip() {
        let opts = GenerateOptions {
            integrity_check: Some(CipherSuite::Crc32),
            ..Default::default()
        };
        let bundles = generate(
            &route(),
            Eid::new(1, 2),
            &opts,
            b"hello",
            CreationTimestamp::new(1000, 0),
        )
        .unwrap();
        let wire = bundles[0].encode();
        let (received, _) = receive(&wire, &Eid::new(3, 4)).unwrap();
        let Received::Local { bundle, .. } = received else {
            panic!("expected local delivery");
        };
        assert_eq!(bundle.integrity, Some(CipherSuite::Crc32));
    }

    #[test]
    fn corrupted_payload_fails_integrity_check() {
        let opts = GenerateOptions {
            integrity_check: Some(CipherSuite::Crc16),
            ..Default::default()
        };
        let bundles = generate(
            &route(),
            Eid::new(1, 2),
            &opts,
            b"hello",
            CreationTimestamp::new(1000, 0),
        )
        .unwrap();
        let mut wire = bundles[0].encode();
        let last = wire.len() - 1;
        wire[last] ^= 0xFF;
        assert_eq!(receive(&wire, &Eid::new(3, 4)), Err(Error::FailedIntegrityCheck));
    }

    #[test]
    fn custody_id_patched_in_after_generate_survives_round_trip() {
        let opts = GenerateOptions {
            request_custody: true,
            ..Default::default()
        };
        let bundles = generate(
            &route(),
            Eid::new(1, 2),
            &opts,
            b"hello",
            CreationTimestamp::new(1000, 0),
        )
        .unwrap();
        assert_eq!(bundles[0].custody_id, None);

        let bundle = bundles.into_iter().next().unwrap().with_custody_id(42);
        let wire = bundle.encode();

        let (received, _) = receive(&wire, &Eid::new(3, 4)).unwrap();
        let Received::Local { bundle, .. } = received else {
            panic!("expected local delivery");
        };
        assert_eq!(bundle.custody_id, Some(42));
    }

    #[test]
    fn fragments_with_custody_requested_stay_within_max_length_after_patching() {
        let opts = GenerateOptions {
            request_custody: true,
            max_length: Some(64),
            allow_fragmentation: true,
            ..Default::default()
        };
        let payload = (0..500u32).map(|v| v as u8).collect::<Vec<_>>();
        let bundles = generate(
            &route(),
            Eid::new(1, 2),
            &opts,
            &payload,
            CreationTimestamp::new(1000, 0),
        )
        .unwrap();
        assert!(bundles.len() > 1);

        for (i, b) in bundles.into_iter().enumerate() {
            let patched = b.with_custody_id(u32::MAX - i as u32);
            assert!(patched.encode().len() <= 64);
        }
    }
}
