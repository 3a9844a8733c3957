//! §3 statistics: monotonic counters, except `active` which tracks the
//! current live CID count.

/// Atomic snapshot returned by [`crate::Channel::stats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Stats {
    /// Active-table entries dropped without ever being acknowledged.
    pub lost: u64,
    /// Active-table entries dropped for exceeding their lifetime.
    pub expired: u64,
    /// CIDs released by an ingested DACS.
    pub acknowledged: u64,
    /// Bundles handed to the outbound storage queue via `load`.
    pub transmitted: u64,
    /// Bundles re-enqueued by the retransmit scan.
    pub retransmitted: u64,
    /// Bundles successfully decoded by `process`.
    pub received: u64,
    /// Bundles produced by `store` (after fragmentation).
    pub generated: u64,
    /// Payloads handed to the application via `accept`.
    pub delivered: u64,
    /// Locally destined, non-administrative bundles decoded by `process`.
    pub bundles: u64,
    /// Payloads enqueued onto the payload queue by `process`.
    pub payloads: u64,
    /// Non-DACS administrative records enqueued onto the record queue.
    pub records: u64,
    /// Current count of live active-table entries.
    pub active: u64,
}
