use thiserror::Error as ThisError;

#[derive(ThisError, Debug)]
pub enum Error {
    #[error("no such storage handle")]
    UnknownHandle,

    #[error("no such storage id")]
    UnknownId,

    #[error("storage operation timed out")]
    Timeout,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
