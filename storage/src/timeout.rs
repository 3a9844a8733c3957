use std::time::Duration;

/// A caller-supplied wait budget for `enqueue`/`dequeue`, per spec.md §5:
/// zero means non-blocking, negative means indefinite.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Timeout {
    NonBlocking,
    Bounded(Duration),
    Indefinite,
}

impl Timeout {
    /// Maps a caller's `i64` seconds argument: `0` → non-blocking, `< 0` →
    /// indefinite, `> 0` → bounded.
    pub fn from_secs(secs: i64) -> Self {
        if secs == 0 {
            Timeout::NonBlocking
        } else if secs < 0 {
            Timeout::Indefinite
        } else {
            Timeout::Bounded(Duration::from_secs(secs as u64))
        }
    }
}
