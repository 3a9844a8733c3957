//! IPN-scheme endpoint identifiers, `ipn:<node>.<service>`.

use crate::Error;
use std::fmt;
use std::str::FromStr;

/// A node/service endpoint pair. The only EID scheme this subset supports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Eid {
    pub node: u32,
    pub service: u32,
}

impl Eid {
    pub fn new(node: u32, service: u32) -> Self {
        Self { node, service }
    }

    pub(crate) fn encode(&self, out: &mut Vec<u8>) {
        dtnchan_sdnv::encode(self.node as u64, out);
        dtnchan_sdnv::encode(self.service as u64, out);
    }

    pub(crate) fn decode(data: &[u8]) -> Result<(Self, usize), Error> {
        let (node, n) = dtnchan_sdnv::decode_u32(data)?;
        let (service, s) = dtnchan_sdnv::decode_u32(&data[n..])?;
        Ok((Self { node, service }, n + s))
    }
}

impl fmt::Display for Eid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ipn:{}.{}", self.node, self.service)
    }
}

impl FromStr for Eid {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let rest = s.strip_prefix("ipn:").ok_or(Error::ParmErr)?;
        let (node, service) = rest.split_once('.').ok_or(Error::ParmErr)?;
        let node: u32 = node.parse().map_err(|_| Error::ParmErr)?;
        let service: u32 = service.parse().map_err(|_| Error::ParmErr)?;
        Ok(Self { node, service })
    }
}

/// Converts an `ipn:<node>.<service>` string to its `(node, service)` pair.
pub fn eid2ipn(s: &str) -> Result<(u32, u32), Error> {
    let eid: Eid = s.parse()?;
    Ok((eid.node, eid.service))
}

/// Converts a `(node, service)` pair to its `ipn:<node>.<service>` string form.
pub fn ipn2eid(node: u32, service: u32) -> String {
    Eid::new(node, service).to_string()
}
