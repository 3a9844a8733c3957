//! Integrity block: a CRC computed over the payload block's content bytes.

use crate::block::{self, BLOCK_TYPE_INTEGRITY};
use crate::Error;

/// Which CRC width `INTEGRITY_CHECK` attaches. Named `CIPHER_SUITE` in
/// spec.md §3; this subset only ever selects a CRC width (no HMAC).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CipherSuite {
    Crc16,
    Crc32,
}

impl CipherSuite {
    fn tag(self) -> u8 {
        match self {
            CipherSuite::Crc16 => 0,
            CipherSuite::Crc32 => 1,
        }
    }

    fn from_tag(tag: u8) -> Result<Self, Error> {
        match tag {
            0 => Ok(CipherSuite::Crc16),
            1 => Ok(CipherSuite::Crc32),
            _ => Err(Error::InvalidDescriptor),
        }
    }

    fn params(self) -> dtnchan_crc::CrcParams {
        match self {
            CipherSuite::Crc16 => dtnchan_crc::crc16_x25(),
            CipherSuite::Crc32 => dtnchan_crc::crc32_castagnoli(),
        }
    }
}

/// Appends an integrity block computed over `payload` to `out`.
pub fn encode(cipher: CipherSuite, payload: &[u8], out: &mut Vec<u8>) {
    let crc = cipher.params().crc_get(payload);
    let mut content = Vec::with_capacity(1 + cipher.params().descriptor().width.byte_len());
    content.push(cipher.tag());
    match cipher {
        CipherSuite::Crc16 => content.extend_from_slice(&(crc as u16).to_be_bytes()),
        CipherSuite::Crc32 => content.extend_from_slice(&crc.to_be_bytes()),
    }
    block::encode(BLOCK_TYPE_INTEGRITY, 0, &content, out);
}

/// Decodes an integrity block's content (already stripped of the canonical
/// block header by the caller) into `(cipher, crc)`.
pub fn decode(content: &[u8]) -> Result<(CipherSuite, u32), Error> {
    let tag = *content.first().ok_or(Error::Incomplete)?;
    let cipher = CipherSuite::from_tag(tag)?;
    let bytes = &content[1..];
    let crc = match cipher {
        CipherSuite::Crc16 => {
            let arr: [u8; 2] = bytes.try_into().map_err(|_| Error::InvalidDescriptor)?;
            u16::from_be_bytes(arr) as u32
        }
        CipherSuite::Crc32 => {
            let arr: [u8; 4] = bytes.try_into().map_err(|_| Error::InvalidDescriptor)?;
            u32::from_be_bytes(arr)
        }
    };
    Ok((cipher, crc))
}

/// Verifies `crc` (as decoded by [`decode`]) against `payload`.
pub fn verify(cipher: CipherSuite, crc: u32, payload: &[u8]) -> Result<(), Error> {
    if cipher.params().crc_get(payload) == crc {
        Ok(())
    } else {
        Err(Error::FailedIntegrityCheck)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn crc16_round_trips_and_verifies() {
        let payload = b"hello, dtn";
        let mut buf = Vec::new();
        encode(CipherSuite::Crc16, payload, &mut buf);
        let (block_type, _flags, content, consumed) = block::decode(&buf).unwrap();
        assert_eq!(block_type, BLOCK_TYPE_INTEGRITY);
        assert_eq!(consumed, buf.len());
        let (cipher, crc) = decode(content).unwrap();
        assert_eq!(cipher, CipherSuite::Crc16);
        verify(cipher, crc, payload).unwrap();
    }

    #[test]
    fn crc32_detects_corruption() {
        let payload = b"hello, dtn".to_vec();
        let mut buf = Vec::new();
        encode(CipherSuite::Crc32, &payload, &mut buf);
        let (_, _, content, _) = block::decode(&buf).unwrap();
        let (cipher, crc) = decode(content).unwrap();

        let mut corrupted = payload.clone();
        corrupted[0] ^= 0xFF;
        assert_eq!(
            verify(cipher, crc, &corrupted),
            Err(Error::FailedIntegrityCheck)
        );
    }
}
