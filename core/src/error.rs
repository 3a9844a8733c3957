//! §6/§7 return-code enum. Each fallible public operation returns one of
//! these; transient conditions that don't abort the call travel separately
//! as [`crate::Flags`].

use thiserror::Error as ThisError;

#[derive(ThisError, Debug)]
pub enum Error {
    /// A route, EID, or channel option was malformed.
    #[error("malformed parameter")]
    ParmErr,

    /// The channel has no live slot to act on (e.g. acking an unknown CID).
    #[error("channel has no matching active entry")]
    Inactive,

    /// The active table could not accept a new CID (window full, no reuse).
    #[error("active table is full")]
    StoreFailure,

    /// `config` was asked about an option name outside the ten recognised ones.
    #[error("unrecognised channel attribute")]
    UnknownAttr,

    #[error(transparent)]
    Bundle(#[from] dtnchan_bundle::Error),

    #[error(transparent)]
    Storage(#[from] dtnchan_storage::Error),

    #[error(transparent)]
    RangeSet(#[from] dtnchan_rangeset::Error),
}

impl Error {
    /// Whether this failure was a timed-out blocking storage call — per
    /// spec.md §5, the only return code a timeout can produce.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::Storage(dtnchan_storage::Error::Timeout))
    }
}
