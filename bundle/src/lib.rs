//! RFC 5050-subset bundle wire codec.
//!
//! Covers the primary block, payload block, an optional previous-node
//! block, an optional CRC integrity block, and the custody-signal record
//! payload carried by administrative (DACS) bundles. Every variable-length
//! integer on the wire is an SDNV (see `dtnchan-sdnv`); EIDs are the
//! `ipn:<node>.<service>` pair, written inline rather than through a
//! byte-string dictionary.

mod block;
mod bundle;
mod custody_signal;
mod eid;
mod error;
mod flags;
mod integrity;
mod primary;

pub use bundle::{
    generate, receive, Bundle, CreationTimestamp, DecodeFlags, GenerateOptions, Received, Route,
};
pub use custody_signal::{CustodySignal, REASON_NO_ADDITIONAL_INFO, STATUS_SUCCEEDED};
pub use eid::{eid2ipn, ipn2eid, Eid};
pub use error::Error;
pub use flags::PrimaryFlags;
pub use integrity::CipherSuite;
pub use primary::{FragmentInfo, PrimaryBlock, BP_VERSION};
