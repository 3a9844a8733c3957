use thiserror::Error as ThisError;

#[derive(ThisError, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// An EID or option string was malformed.
    #[error("malformed parameter")]
    ParmErr,

    /// The primary block declared a version this codec doesn't understand.
    #[error("unsupported bundle version {0}")]
    WrongVersion(u8),

    /// A block's declared length didn't match the bytes actually consumed.
    #[error("invalid block descriptor")]
    InvalidDescriptor,

    /// The buffer ended before a block could be fully decoded.
    #[error("bundle truncated")]
    Incomplete,

    /// The encoded bundle exceeds `MAX_LENGTH` and fragmentation is disallowed.
    #[error("bundle exceeds the configured maximum length")]
    BundleTooLarge,

    /// The integrity block's CRC did not match the payload block.
    #[error("integrity check failed")]
    FailedIntegrityCheck,

    #[error(transparent)]
    Sdnv(#[from] dtnchan_sdnv::Error),

    #[error(transparent)]
    Crc(#[from] dtnchan_crc::Error),
}
