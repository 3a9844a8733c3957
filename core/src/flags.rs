//! §7 transient condition flags: OR-accumulated across calls by the caller,
//! never individually fatal to the call that raised them.

use bitflags::bitflags;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct Flags: u16 {
        /// An unrecognised canonical block carried the must-replicate bit.
        const NONCOMPLIANT = 1 << 0;
        /// A decode stopped short of a complete bundle.
        const INCOMPLETE = 1 << 1;
        /// The local clock cannot be trusted for lifetime/timeout arithmetic.
        const UNRELIABLETIME = 1 << 2;
        /// A DACS payload would have exceeded `MAX_LENGTH` even as a single pair.
        const FILLOVERFLOW = 1 << 3;
        /// A DACS had to be split across more bundles than expected.
        const TOOMANYFILLS = 1 << 4;
        /// An incoming CID was lower than one already seen (sequence regressed).
        const CIDWENTBACKWARDS = 1 << 5;
        /// A received bundle needs forwarding but no route is configured for it.
        const ROUTENEEDED = 1 << 6;
        /// A storage operation failed without aborting the whole call.
        const STOREFAILURE = 1 << 7;
        /// A DACS acknowledged a CID with no matching active-table entry.
        const UNKNOWNCID = 1 << 8;
        /// An SDNV's value exceeded its target integer width.
        const SDNVOVERFLOW = 1 << 9;
        /// An SDNV's continuation ran past the end of its buffer.
        const SDNVINCOMPLETE = 1 << 10;
        /// The active table was full when a new CID was requested.
        const ACTIVETABLEWRAP = 1 << 11;
        /// An insert into a range-set repeated an already-present value.
        const DUPLICATES = 1 << 12;
        /// The custody tree hit capacity and forced an out-of-cycle DACS.
        const RBTREEFULL = 1 << 13;
    }
}

impl From<dtnchan_bundle::DecodeFlags> for Flags {
    fn from(f: dtnchan_bundle::DecodeFlags) -> Self {
        let mut out = Flags::empty();
        if f.contains(dtnchan_bundle::DecodeFlags::NONCOMPLIANT) {
            out |= Flags::NONCOMPLIANT;
        }
        out
    }
}
