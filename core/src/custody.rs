//! §4.7 custody engine: accumulates received CIDs into a range-set and
//! periodically drains them into one or more DACS payloads.

use crate::Flags;
use dtnchan_bundle::{CustodySignal, Eid};
use dtnchan_rangeset::{Inserted, Tree};
use std::time::{Duration, Instant};

pub struct CustodyEngine {
    tree: Tree,
    last_dacs_time: Instant,
    last_custodian: Option<Eid>,
    highest_cid: Option<u32>,
}

impl CustodyEngine {
    pub fn new(capacity: usize) -> Self {
        Self {
            tree: Tree::new(capacity),
            last_dacs_time: Instant::now(),
            last_custodian: None,
            highest_cid: None,
        }
    }

    /// Accumulates a custody-requested bundle's CID. Returns any flags the
    /// accumulation itself raised (duplicate CID, tree at capacity, or a CID
    /// lower than one already seen from this sender).
    pub fn ingest(&mut self, cid: u32, custodian: Eid) -> Flags {
        self.last_custodian = Some(custodian);

        let mut flags = match self.highest_cid {
            Some(highest) if cid < highest => Flags::CIDWENTBACKWARDS,
            _ => Flags::empty(),
        };
        self.highest_cid = Some(self.highest_cid.map_or(cid, |highest| highest.max(cid)));

        flags |= match self.tree.insert(cid) {
            Ok(Inserted::New) => Flags::empty(),
            Ok(Inserted::Duplicate) => Flags::DUPLICATES,
            Err(_) => Flags::RBTREEFULL,
        };
        flags
    }

    pub fn is_full(&self) -> bool {
        self.tree.is_full()
    }

    /// A DACS is due once the tree fills, or once `dacs_rate` has elapsed
    /// since the last one — but never while the tree is empty (spec.md §9
    /// Open Question (b): no emission with nothing accumulated, even at
    /// `DACS_RATE == 0`).
    pub fn due(&self, now: Instant, dacs_rate: Duration) -> bool {
        if self.tree.is_empty() {
            return false;
        }
        self.tree.is_full() || now.duration_since(self.last_dacs_time) >= dacs_rate
    }

    /// Greedily packs the accumulated ranges into one or more signals, each
    /// at most `max_payload` encoded bytes, then clears the tree. Returns
    /// the signals (addressed to the most recently ingested custodian) and
    /// flags raised by the packing itself.
    pub fn emit(&mut self, now: Instant, max_payload: Option<usize>) -> (Vec<CustodySignal>, Option<Eid>, Flags) {
        let mut flags = Flags::empty();
        if self.tree.is_empty() {
            return (Vec::new(), None, flags);
        }

        let mut signals = Vec::new();
        let mut current: Vec<(u32, u32)> = Vec::new();

        for range in self.tree.iter() {
            let pair = (range.value, range.offset);
            if let Some(max) = max_payload {
                let mut candidate = current.clone();
                candidate.push(pair);
                if CustodySignal::accepted(candidate).encoded_len() > max {
                    if current.is_empty() {
                        // Even a single pair overflows the budget; emit it
                        // alone rather than loop forever.
                        flags |= Flags::FILLOVERFLOW;
                    } else {
                        signals.push(CustodySignal::accepted(std::mem::take(&mut current)));
                    }
                }
            }
            current.push(pair);
        }
        if !current.is_empty() {
            signals.push(CustodySignal::accepted(current));
        }
        if signals.len() > 1 {
            flags |= Flags::TOOMANYFILLS;
        }

        self.tree.clear();
        self.last_dacs_time = now;
        (signals, self.last_custodian.take(), flags)
    }
}

/// Expands a decoded DACS's `(first_cid, fill)` pairs into the individual
/// CIDs it acknowledges.
pub fn ranges_from_signal(signal: &CustodySignal) -> impl Iterator<Item = u32> + '_ {
    signal.ranges.iter().flat_map(|&(first, fill)| first..=first + fill)
}
