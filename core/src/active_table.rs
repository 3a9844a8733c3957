//! §4.4 active table: a ring of `capacity` slots indexed by `cid % capacity`.
//!
//! CIDs are assigned in strictly increasing order, so the slot a new CID
//! lands on is always occupied (if at all) by the oldest still-live CID —
//! no separate `oldest_cid`/`newest_cid` bookkeeping is needed, unlike the
//! `bplib` original's explicit window tracking.
//!
//! A slot is reserved (via [`ActiveTable::reserve`]) before its bundle's
//! `storage_id` is known, since `dtnchan_storage::Storage::enqueue` reports
//! only success/failure, never the id it assigned (confirmed by both
//! spec.md §4.5 and `bplib_store_pfile_enqueue`'s `int`-only return). The
//! real id is attached later, once `Channel::load` dequeues the bundle for
//! transmission.

use dtnchan_storage::StorageId;
use std::time::Instant;

#[derive(Debug, Clone, Copy)]
struct Slot {
    cid: u32,
    storage_id: Option<StorageId>,
    retransmit_due: Option<Instant>,
    expires_at: Instant,
}

/// Outcome of a slot that needs attention during a retransmit scan.
#[derive(Debug, Clone, Copy)]
pub enum Due {
    /// Still within its lifetime; retransmit its stored bytes.
    Retransmit { cid: u32, storage_id: StorageId },
    /// Past its lifetime; drop it.
    Expired { cid: u32, storage_id: Option<StorageId> },
}

pub struct ActiveTable {
    slots: Vec<Option<Slot>>,
    capacity: usize,
    current_cid: u32,
    cid_reuse: bool,
}

impl ActiveTable {
    pub fn new(capacity: usize, cid_reuse: bool) -> Self {
        Self {
            slots: vec![None; capacity],
            capacity,
            current_cid: 0,
            cid_reuse,
        }
    }

    fn idx(&self, cid: u32) -> usize {
        (cid as usize) % self.capacity
    }

    /// Reserves the next CID's slot. `expires_at` is the bundle's
    /// `creation_time + LIFETIME`. Returns the assigned CID and, if the
    /// window wrapped and reuse evicted the occupant, that occupant's CID
    /// (it is counted as lost by the caller).
    ///
    /// Fails only when the window is full and `CID_REUSE` is false.
    pub fn reserve(&mut self, expires_at: Instant) -> Result<(u32, Option<u32>), ()> {
        let cid = self.current_cid;
        let idx = self.idx(cid);
        let evicted = match self.slots[idx] {
            Some(_) if !self.cid_reuse => return Err(()),
            Some(occupant) => Some(occupant.cid),
            None => None,
        };
        self.slots[idx] = Some(Slot {
            cid,
            storage_id: None,
            retransmit_due: None,
            expires_at,
        });
        self.current_cid = self.current_cid.wrapping_add(1);
        Ok((cid, evicted))
    }

    /// Undoes a [`reserve`] that will never be enqueued (e.g. a later
    /// fragment in the same `store` failed to reserve). No-op if the slot
    /// has since been reused or released.
    pub fn release(&mut self, cid: u32) -> Option<StorageId> {
        let idx = self.idx(cid);
        match self.slots[idx] {
            Some(slot) if slot.cid == cid => {
                self.slots[idx] = None;
                slot.storage_id
            }
            _ => None,
        }
    }

    /// Records the storage id a bundle was actually enqueued under and
    /// starts its retransmit clock. Called once, on the first successful
    /// `load` that transmits this CID.
    pub fn attach_storage_id(&mut self, cid: u32, storage_id: StorageId, retransmit_due: Instant) {
        let idx = self.idx(cid);
        if let Some(slot) = &mut self.slots[idx] {
            if slot.cid == cid {
                slot.storage_id = Some(storage_id);
                slot.retransmit_due = Some(retransmit_due);
            }
        }
    }

    /// Scans every slot due for retransmission or expiry, refreshing
    /// retransmit-due slots' timers and clearing expired ones in place.
    pub fn scan_due(&mut self, now: Instant, retransmit_timeout: std::time::Duration) -> Vec<Due> {
        let mut due = Vec::new();
        for slot in self.slots.iter_mut() {
            let Some(s) = slot else { continue };
            if now >= s.expires_at {
                due.push(Due::Expired {
                    cid: s.cid,
                    storage_id: s.storage_id,
                });
                *slot = None;
                continue;
            }
            if let (Some(sid), Some(retransmit_due)) = (s.storage_id, s.retransmit_due) {
                if now >= retransmit_due {
                    due.push(Due::Retransmit { cid: s.cid, storage_id: sid });
                    s.retransmit_due = Some(now + retransmit_timeout);
                }
            }
        }
        due
    }

    pub fn len(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn set_cid_reuse(&mut self, v: bool) {
        self.cid_reuse = v;
    }

    /// Drains every live slot for `flush`, returning `(cid, storage_id)` —
    /// every entry is by definition unacknowledged (acknowledgement already
    /// removes its slot).
    pub fn drain(&mut self) -> Vec<(u32, Option<StorageId>)> {
        let mut out = Vec::new();
        for slot in self.slots.iter_mut() {
            if let Some(s) = slot.take() {
                out.push((s.cid, s.storage_id));
            }
        }
        out
    }
}
