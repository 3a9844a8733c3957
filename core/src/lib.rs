//! Channel state machine: binds the bundle codec (`dtnchan-bundle`) and a
//! storage backend (`dtnchan-storage`) into the nine public operations a
//! DTN endpoint needs — `open`, `close`, `store`, `load`, `process`,
//! `accept`, `flush`, `config`/`set_config`, and `stats`.

mod active_table;
mod channel;
mod config;
mod custody;
mod error;
mod flags;
mod stats;

pub use channel::{Channel, ProcessOutcome};
pub use config::{Attrs, AttrsBuilder};
pub use error::Error;
pub use flags::Flags;
pub use stats::Stats;

pub use dtnchan_bundle::{Bundle, CipherSuite, Eid, Route};
pub use dtnchan_storage::{Storage, Timeout};
