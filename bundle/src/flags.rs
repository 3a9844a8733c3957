//! Primary block processing flags (spec.md §3 attributes that affect the
//! wire bitmask, plus the fragmentation marker).

use bitflags::bitflags;

bitflags! {
    /// Bits of the primary block's SDNV-encoded flags field.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct PrimaryFlags: u32 {
        /// The bundle is a fragment; `fragment_offset`/`total_adu_length` follow.
        const IS_FRAGMENT = 1 << 0;
        /// The bundle is an administrative record (a custody signal).
        const IS_ADMIN_RECORD = 1 << 1;
        /// Custody transfer has been requested for this bundle.
        const CUSTODY_REQUESTED = 1 << 2;
    }
}
