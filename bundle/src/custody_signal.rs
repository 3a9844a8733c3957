//! Custody-signal (DACS) administrative record payload: SDNV `status`,
//! SDNV `reason_code`, then a run of `(first_cid, fill)` SDNV pairs.

use crate::Error;

pub const STATUS_SUCCEEDED: u64 = 1;
pub const REASON_NO_ADDITIONAL_INFO: u64 = 0;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CustodySignal {
    pub status: u64,
    pub reason_code: u64,
    /// `(first_cid, fill)` pairs, one per custody-tree range.
    pub ranges: Vec<(u32, u32)>,
}

impl CustodySignal {
    pub fn accepted(ranges: Vec<(u32, u32)>) -> Self {
        Self {
            status: STATUS_SUCCEEDED,
            reason_code: REASON_NO_ADDITIONAL_INFO,
            ranges,
        }
    }

    pub fn encode(&self, out: &mut Vec<u8>) {
        dtnchan_sdnv::encode(self.status, out);
        dtnchan_sdnv::encode(self.reason_code, out);
        for &(first_cid, fill) in &self.ranges {
            dtnchan_sdnv::encode(first_cid as u64, out);
            dtnchan_sdnv::encode(fill as u64, out);
        }
    }

    pub fn encoded_len(&self) -> usize {
        let mut buf = Vec::new();
        self.encode(&mut buf);
        buf.len()
    }

    pub fn decode(data: &[u8]) -> Result<Self, Error> {
        let mut pos = 0;
        let (status, n) = dtnchan_sdnv::decode(&data[pos..])?;
        pos += n;
        let (reason_code, n) = dtnchan_sdnv::decode(&data[pos..])?;
        pos += n;

        let mut ranges = Vec::new();
        while pos < data.len() {
            let (first_cid, n) = dtnchan_sdnv::decode_u32(&data[pos..])?;
            pos += n;
            let (fill, n) = dtnchan_sdnv::decode_u32(&data[pos..])?;
            pos += n;
            ranges.push((first_cid, fill));
        }

        Ok(Self {
            status,
            reason_code,
            ranges,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_with_several_ranges() {
        let sig = CustodySignal::accepted(vec![(0, 9), (20, 0), (100, 4)]);
        let mut buf = Vec::new();
        sig.encode(&mut buf);
        assert_eq!(buf.len(), sig.encoded_len());
        assert_eq!(CustodySignal::decode(&buf).unwrap(), sig);
    }

    #[test]
    fn round_trips_with_no_ranges() {
        let sig = CustodySignal::accepted(vec![]);
        let mut buf = Vec::new();
        sig.encode(&mut buf);
        assert_eq!(CustodySignal::decode(&buf).unwrap(), sig);
    }

    #[test]
    fn single_pair_matches_scenario_3_shape() {
        let sig = CustodySignal::accepted(vec![(0, 9)]);
        assert_eq!(sig.ranges, vec![(0, 9)]);
    }
}
