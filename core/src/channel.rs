//! §4.8 channel state machine: the public entry points composing the bundle
//! codec, the active table, the custody engine, and a storage backend.
//!
//! Per §5, the channel holds exactly one lock guarding all its mutable
//! state, and that lock is never held across a blocking storage call —
//! every method below drops its `MutexGuard` before touching `self.storage`.

use crate::active_table::{ActiveTable, Due};
use crate::config::Attrs;
use crate::custody::{self, CustodyEngine};
use crate::error::Error;
use crate::flags::Flags;
use crate::stats::Stats;
use dtnchan_bundle::{CreationTimestamp, CustodySignal, Eid, GenerateOptions, PrimaryFlags, Received, Route};
use dtnchan_storage::{Handle, Storage, Timeout};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// Outbound-queue frame tag: a data bundle, carrying the CID that names its
/// active-table slot. Unifies the bundle and DACS queues spec.md §9 Open
/// Question (c) leaves unspecified in the original.
const KIND_DATA: u8 = 0;
/// Outbound-queue frame tag: a DACS bundle, fire-and-forget — never tracked
/// in the active table, so carries no CID.
const KIND_DACS: u8 = 1;

enum Frame {
    Data { cid: u32, wire: Vec<u8> },
    Dacs { wire: Vec<u8> },
}

fn parse_frame(data: &[u8]) -> Option<Frame> {
    match *data.first()? {
        KIND_DATA => {
            let cid_bytes: [u8; 4] = data.get(1..5)?.try_into().ok()?;
            Some(Frame::Data {
                cid: u32::from_be_bytes(cid_bytes),
                wire: data[5..].to_vec(),
            })
        }
        KIND_DACS => Some(Frame::Dacs { wire: data[1..].to_vec() }),
        _ => None,
    }
}

fn now_secs() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default().as_secs()
}

fn received_bundle_creation_secs(received: &Received) -> u64 {
    match received {
        Received::Local { bundle, .. } | Received::Forward { bundle, .. } => bundle.primary.creation_seconds,
    }
}

struct Inner {
    attrs: Attrs,
    active_table: ActiveTable,
    custody: CustodyEngine,
    stats: Stats,
    creation_seq: u64,
}

/// Result of a successful [`Channel::process`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessOutcome {
    /// The bundle was consumed locally (queued for delivery, ingested as
    /// custody, or recorded as an administrative record).
    Delivered,
    /// The bundle is addressed elsewhere; no route is configured for it, so
    /// the caller gets the decoded bundle and its custodian back to forward
    /// or discard itself.
    Forward { bundle: dtnchan_bundle::Bundle, custodian: Eid },
}

/// A bound endpoint with a storage-backed outbound/inbound data path.
/// Created by [`Channel::open`], destroyed by [`Channel::close`].
pub struct Channel {
    route: Route,
    local: Eid,
    storage: Arc<dyn Storage>,
    h_bundle: Handle,
    h_payload: Handle,
    h_record: Handle,
    inner: Mutex<Inner>,
}

impl Channel {
    pub fn open(
        route: Route,
        local: Eid,
        attrs: Attrs,
        active_table_capacity: usize,
        storage: Arc<dyn Storage>,
    ) -> Result<Self, Error> {
        let h_bundle = storage.create()?;
        let h_payload = storage.create()?;
        let h_record = storage.create()?;
        Ok(Self {
            route,
            local,
            storage,
            h_bundle,
            h_payload,
            h_record,
            inner: Mutex::new(Inner {
                attrs,
                active_table: ActiveTable::new(active_table_capacity, attrs.cid_reuse),
                custody: CustodyEngine::new(active_table_capacity),
                stats: Stats::default(),
                creation_seq: 0,
            }),
        })
    }

    pub fn close(self) -> Result<(), Error> {
        self.storage.destroy(self.h_bundle)?;
        self.storage.destroy(self.h_payload)?;
        self.storage.destroy(self.h_record)?;
        Ok(())
    }

    /// Generates bundle(s) for `payload`, assigns each a CID/active-table
    /// slot, and enqueues them onto the outbound queue.
    #[tracing::instrument(skip(self, payload))]
    pub fn store(&self, payload: &[u8], timeout: Timeout) -> (Result<(), Error>, Flags) {
        let mut flags = Flags::empty();
        let mut guard = self.inner.lock().unwrap();

        let attrs = guard.attrs;
        let seq = guard.creation_seq;
        guard.creation_seq += 1;

        let opts = GenerateOptions {
            lifetime_secs: attrs.lifetime.as_secs() as u32,
            request_custody: attrs.request_custody,
            admin_record: attrs.admin_record,
            integrity_check: if attrs.integrity_check { Some(attrs.cipher_suite) } else { None },
            allow_fragmentation: attrs.allow_fragmentation,
            max_length: attrs.max_length,
        };
        let creation = CreationTimestamp::new(now_secs(), seq);

        let bundles = match dtnchan_bundle::generate(&self.route, self.local, &opts, payload, creation) {
            Ok(b) => b,
            Err(e) => {
                drop(guard);
                return (Err(Error::from(e)), flags);
            }
        };

        let expires_at = Instant::now() + attrs.lifetime;
        let mut reserved = Vec::with_capacity(bundles.len());
        for _ in &bundles {
            match guard.active_table.reserve(expires_at) {
                Ok((cid, evicted)) => {
                    if evicted.is_some() {
                        flags |= Flags::ACTIVETABLEWRAP;
                        guard.stats.lost += 1;
                    }
                    reserved.push(cid);
                }
                Err(()) => {
                    for cid in &reserved {
                        guard.active_table.release(*cid);
                    }
                    flags |= Flags::ACTIVETABLEWRAP;
                    drop(guard);
                    return (Err(Error::StoreFailure), flags);
                }
            }
        }
        drop(guard);

        for (bundle, cid) in bundles.into_iter().zip(reserved.iter()) {
            let wire = if attrs.request_custody {
                bundle.with_custody_id(*cid).encode()
            } else {
                bundle.encode()
            };
            let mut framed = Vec::with_capacity(wire.len() + 5);
            framed.push(KIND_DATA);
            framed.extend_from_slice(&cid.to_be_bytes());
            framed.extend_from_slice(&wire);

            if let Err(e) = self.storage.enqueue(self.h_bundle, &framed, &[], timeout) {
                // This fragment's active-table slot is now orphaned; the
                // side effect can't be rolled back, so flag it rather than
                // silently losing track of the reservation.
                let mut guard = self.inner.lock().unwrap();
                guard.active_table.release(*cid);
                flags |= Flags::STOREFAILURE;
                return (Err(Error::from(e)), flags);
            }
        }

        let mut guard = self.inner.lock().unwrap();
        guard.stats.generated += reserved.len() as u64;
        guard.stats.active = guard.active_table.len() as u64;
        (Ok(()), flags)
    }

    /// (a) scans for due retransmits/expiries, (b) emits a DACS if one is
    /// due, then (c) dequeues the next bundle to transmit.
    #[tracing::instrument(skip(self))]
    pub fn load(&self, timeout: Timeout) -> (Result<Vec<u8>, Error>, Flags) {
        let mut flags = Flags::empty();
        let now = Instant::now();

        // `getcount` also counts dequeued-but-not-yet-relinquished custody
        // bundles, so it can't gate this scan; run it unconditionally since
        // it only touches the active table, never storage.
        self.retransmit_scan(now);

        if self.dacs_due(now) {
            flags |= self.emit_dacs(now);
        }

        let (framed, storage_id) = match self.storage.dequeue(self.h_bundle, timeout) {
            Ok(v) => v,
            Err(e) => return (Err(Error::from(e)), flags),
        };

        let wire = match parse_frame(&framed) {
            Some(Frame::Data { cid, wire }) => {
                let request_custody = {
                    let mut guard = self.inner.lock().unwrap();
                    let request_custody = guard.attrs.request_custody;
                    let retransmit_due = now + guard.attrs.timeout;
                    if request_custody {
                        guard.active_table.attach_storage_id(cid, storage_id, retransmit_due);
                    } else {
                        guard.active_table.release(cid);
                    }
                    guard.stats.transmitted += 1;
                    guard.stats.active = guard.active_table.len() as u64;
                    request_custody
                };
                if !request_custody {
                    let _ = self.storage.relinquish(self.h_bundle, storage_id);
                }
                wire
            }
            Some(Frame::Dacs { wire }) => {
                {
                    let mut guard = self.inner.lock().unwrap();
                    guard.stats.transmitted += 1;
                }
                let _ = self.storage.relinquish(self.h_bundle, storage_id);
                wire
            }
            None => {
                let _ = self.storage.relinquish(self.h_bundle, storage_id);
                return (Err(Error::ParmErr), flags);
            }
        };

        (Ok(wire), flags)
    }

    fn retransmit_scan(&self, now: Instant) {
        let due = {
            let mut guard = self.inner.lock().unwrap();
            let timeout = guard.attrs.timeout;
            guard.active_table.scan_due(now, timeout)
        };

        let mut retransmitted = 0u64;
        let mut expired = 0u64;
        let mut lost = 0u64;
        for item in due {
            match item {
                Due::Retransmit { storage_id, .. } => {
                    if let Ok(framed) = self.storage.retrieve(self.h_bundle, storage_id) {
                        if self.storage.enqueue(self.h_bundle, &framed, &[], Timeout::NonBlocking).is_ok() {
                            let _ = self.storage.relinquish(self.h_bundle, storage_id);
                            retransmitted += 1;
                        }
                    }
                }
                Due::Expired { storage_id, .. } => {
                    if let Some(sid) = storage_id {
                        let _ = self.storage.relinquish(self.h_bundle, sid);
                        lost += 1;
                    }
                    expired += 1;
                }
            }
        }

        if retransmitted + expired > 0 {
            let mut guard = self.inner.lock().unwrap();
            guard.stats.retransmitted += retransmitted;
            guard.stats.expired += expired;
            guard.stats.lost += lost;
            guard.stats.active = guard.active_table.len() as u64;
        }
    }

    fn dacs_due(&self, now: Instant) -> bool {
        let guard = self.inner.lock().unwrap();
        guard.custody.due(now, guard.attrs.dacs_rate)
    }

    fn emit_dacs(&self, now: Instant) -> Flags {
        let (signals, custodian, flags, max_length) = {
            let mut guard = self.inner.lock().unwrap();
            let max_length = guard.attrs.max_length;
            let (signals, custodian, flags) = guard.custody.emit(now, max_length);
            (signals, custodian, flags, max_length)
        };
        let Some(custodian) = custodian else {
            return flags;
        };

        let route = Route {
            source: self.local,
            destination: custodian,
            report_to: self.local,
        };
        let opts = GenerateOptions {
            admin_record: true,
            max_length,
            ..Default::default()
        };

        for signal in signals {
            let mut payload = Vec::new();
            signal.encode(&mut payload);

            let seq = {
                let mut guard = self.inner.lock().unwrap();
                let seq = guard.creation_seq;
                guard.creation_seq += 1;
                seq
            };
            let creation = CreationTimestamp::new(now_secs(), seq);

            if let Ok(bundles) = dtnchan_bundle::generate(&route, self.local, &opts, &payload, creation) {
                for bundle in bundles {
                    let wire = bundle.encode();
                    let mut framed = Vec::with_capacity(wire.len() + 1);
                    framed.push(KIND_DACS);
                    framed.extend_from_slice(&wire);
                    let _ = self.storage.enqueue(self.h_bundle, &framed, &[], Timeout::NonBlocking);
                }
            }
        }
        flags
    }

    /// Decodes a received wire bundle and routes it to the payload queue,
    /// the custody engine, the record queue, or hands back the bundle and
    /// its custodian for forwarding.
    #[tracing::instrument(skip(self, data))]
    pub fn process(&self, data: &[u8], timeout: Timeout) -> (Result<ProcessOutcome, Error>, Flags) {
        let (received, decode_flags) = match dtnchan_bundle::receive(data, &self.local) {
            Ok(v) => v,
            Err(e) => return (Err(Error::from(e)), Flags::empty()),
        };
        let mut flags = Flags::from(decode_flags);

        if received_bundle_creation_secs(&received) > now_secs() {
            // A creation time ahead of our own clock means we can't trust
            // our clock for this bundle's lifetime/timeout arithmetic.
            flags |= Flags::UNRELIABLETIME;
        }

        let (bundle, is_admin_record) = match received {
            Received::Local { bundle, is_admin_record } => (bundle, is_admin_record),
            Received::Forward { bundle, custodian } => {
                return (Ok(ProcessOutcome::Forward { bundle, custodian }), flags | Flags::ROUTENEEDED);
            }
        };

        {
            let mut guard = self.inner.lock().unwrap();
            guard.stats.received += 1;
        }

        if is_admin_record {
            return match CustodySignal::decode(&bundle.payload) {
                Ok(signal) => {
                    let mut acked = 0u64;
                    for cid in custody::ranges_from_signal(&signal) {
                        let released = {
                            let mut guard = self.inner.lock().unwrap();
                            guard.active_table.release(cid)
                        };
                        match released {
                            Some(storage_id) => {
                                let _ = self.storage.relinquish(self.h_bundle, storage_id);
                                acked += 1;
                            }
                            None => flags |= Flags::UNKNOWNCID,
                        }
                    }
                    let mut guard = self.inner.lock().unwrap();
                    guard.stats.acknowledged += acked;
                    guard.stats.active = guard.active_table.len() as u64;
                    (Ok(ProcessOutcome::Delivered), flags)
                }
                Err(_) => match self.storage.enqueue(self.h_record, &bundle.payload, &[], timeout) {
                    Ok(()) => {
                        let mut guard = self.inner.lock().unwrap();
                        guard.stats.records += 1;
                        (Ok(ProcessOutcome::Delivered), flags)
                    }
                    Err(e) => (Err(Error::from(e)), flags),
                },
            };
        }

        if bundle.primary.flags.contains(PrimaryFlags::CUSTODY_REQUESTED) {
            if let Some(cid) = bundle.custody_id {
                let mut guard = self.inner.lock().unwrap();
                let custodian = bundle.primary.custodian;
                flags |= guard.custody.ingest(cid, custodian);
            }
        }

        match self.storage.enqueue(self.h_payload, &bundle.payload, &[], timeout) {
            Ok(()) => {
                let mut guard = self.inner.lock().unwrap();
                guard.stats.bundles += 1;
                guard.stats.payloads += 1;
                (Ok(ProcessOutcome::Delivered), flags)
            }
            Err(e) => (Err(Error::from(e)), flags),
        }
    }

    /// Dequeues the next delivered payload for the application.
    #[tracing::instrument(skip(self))]
    pub fn accept(&self, timeout: Timeout) -> (Result<Vec<u8>, Error>, Flags) {
        match self.storage.dequeue(self.h_payload, timeout) {
            Ok((data, storage_id)) => {
                let _ = self.storage.relinquish(self.h_payload, storage_id);
                let mut guard = self.inner.lock().unwrap();
                guard.stats.delivered += 1;
                (Ok(data), Flags::empty())
            }
            Err(e) => (Err(Error::from(e)), Flags::empty()),
        }
    }

    /// Relinquishes every live active-table entry, counting each as lost —
    /// by definition none of them have been acknowledged yet.
    pub fn flush(&self) {
        let drained = {
            let mut guard = self.inner.lock().unwrap();
            guard.active_table.drain()
        };
        let lost = drained.len() as u64;
        for (_, storage_id) in drained {
            if let Some(sid) = storage_id {
                let _ = self.storage.relinquish(self.h_bundle, sid);
            }
        }
        let mut guard = self.inner.lock().unwrap();
        guard.stats.lost += lost;
        guard.stats.active = 0;
    }

    pub fn config(&self) -> Attrs {
        self.inner.lock().unwrap().attrs
    }

    pub fn set_config(&self, attrs: Attrs) {
        let mut guard = self.inner.lock().unwrap();
        guard.active_table.set_cid_reuse(attrs.cid_reuse);
        guard.attrs = attrs;
    }

    pub fn stats(&self) -> Stats {
        self.inner.lock().unwrap().stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AttrsBuilder;
    use dtnchan_storage::RamStorage;

    fn route(a: Eid, b: Eid) -> Route {
        Route {
            source: a,
            destination: b,
            report_to: a,
        }
    }

    fn channel(local: Eid, peer: Eid, attrs: Attrs, capacity: usize, storage: Arc<dyn Storage>) -> Channel {
        Channel::open(route(local, peer), local, attrs, capacity, storage).unwrap()
    }

    #[test]
    fn single_bundle_round_trips_with_no_custody() {
        let storage: Arc<dyn Storage> = Arc::new(RamStorage::new());
        let a = channel(Eid::new(1, 2), Eid::new(3, 4), AttrsBuilder::new().build().unwrap(), 8, storage.clone());
        let b = channel(Eid::new(3, 4), Eid::new(1, 2), AttrsBuilder::new().build().unwrap(), 8, storage);

        let (res, _) = a.store(b"hello", Timeout::NonBlocking);
        res.unwrap();
        let (wire, _) = a.load(Timeout::NonBlocking);
        let wire = wire.unwrap();

        let (res, _) = b.process(&wire, Timeout::NonBlocking);
        res.unwrap();
        let (payload, _) = b.accept(Timeout::NonBlocking);
        assert_eq!(payload.unwrap(), b"hello");
    }

    #[test]
    fn dacs_accumulates_and_releases_active_table_slots() {
        let storage: Arc<dyn Storage> = Arc::new(RamStorage::new());
        let attrs_a = AttrsBuilder::new().request_custody(true).build().unwrap();
        let attrs_b = AttrsBuilder::new().dacs_rate(Duration::ZERO).build().unwrap();

        let a = channel(Eid::new(1, 2), Eid::new(3, 4), attrs_a, 16, storage.clone());
        let b_storage: Arc<dyn Storage> = Arc::new(RamStorage::new());
        let b = channel(Eid::new(3, 4), Eid::new(1, 2), attrs_b, 16, b_storage.clone());

        for i in 0..10 {
            a.store(format!("msg{i}").as_bytes(), Timeout::NonBlocking).0.unwrap();
        }
        for _ in 0..10 {
            let (wire, _) = a.load(Timeout::NonBlocking);
            let wire = wire.unwrap();
            b.process(&wire, Timeout::NonBlocking).0.unwrap();
        }

        let (dacs_wire, _) = b.load(Timeout::NonBlocking);
        let dacs_wire = dacs_wire.unwrap();

        let (res, _) = a.process(&dacs_wire, Timeout::NonBlocking);
        res.unwrap();

        let stats = a.stats();
        assert_eq!(stats.acknowledged, 10);
        assert_eq!(stats.active, 0);
    }

    #[test]
    fn retransmits_on_timeout() {
        let storage: Arc<dyn Storage> = Arc::new(RamStorage::new());
        let attrs = AttrsBuilder::new()
            .request_custody(true)
            .timeout(Duration::from_millis(50))
            .build()
            .unwrap();
        let a = channel(Eid::new(1, 2), Eid::new(3, 4), attrs, 8, storage);

        a.store(b"x", Timeout::NonBlocking).0.unwrap();
        let (first, _) = a.load(Timeout::NonBlocking);
        let first = first.unwrap();

        std::thread::sleep(Duration::from_millis(80));
        let (second, _) = a.load(Timeout::NonBlocking);
        let second = second.unwrap();

        assert_eq!(first, second);
        assert_eq!(a.stats().retransmitted, 1);
    }

    #[test]
    fn active_table_wrap_without_reuse_fails_the_fifth_store() {
        let storage: Arc<dyn Storage> = Arc::new(RamStorage::new());
        let attrs = AttrsBuilder::new().request_custody(true).build().unwrap();
        let a = channel(Eid::new(1, 2), Eid::new(3, 4), attrs, 4, storage);

        for _ in 0..4 {
            a.store(b"x", Timeout::NonBlocking).0.unwrap();
        }
        let (res, flags) = a.store(b"x", Timeout::NonBlocking);
        assert!(matches!(res, Err(Error::StoreFailure)));
        assert!(flags.contains(Flags::ACTIVETABLEWRAP));
    }

    #[test]
    fn active_table_wrap_with_reuse_evicts_the_oldest() {
        let storage: Arc<dyn Storage> = Arc::new(RamStorage::new());
        let attrs = AttrsBuilder::new().request_custody(true).cid_reuse(true).build().unwrap();
        let a = channel(Eid::new(1, 2), Eid::new(3, 4), attrs, 4, storage);

        for _ in 0..4 {
            a.store(b"x", Timeout::NonBlocking).0.unwrap();
        }
        let (res, flags) = a.store(b"x", Timeout::NonBlocking);
        res.unwrap();
        assert!(flags.contains(Flags::ACTIVETABLEWRAP));
        assert_eq!(a.stats().lost, 1);
    }

    #[test]
    fn corrupted_bundle_fails_integrity_check_and_payload_queue_stays_empty() {
        let storage: Arc<dyn Storage> = Arc::new(RamStorage::new());
        let attrs_a = AttrsBuilder::new().integrity_check(true).build().unwrap();
        let a = channel(Eid::new(1, 2), Eid::new(3, 4), attrs_a, 8, storage.clone());
        let b = channel(Eid::new(3, 4), Eid::new(1, 2), AttrsBuilder::new().build().unwrap(), 8, storage);

        a.store(b"hello", Timeout::NonBlocking).0.unwrap();
        let (wire, _) = a.load(Timeout::NonBlocking);
        let mut wire = wire.unwrap();
        let last = wire.len() - 1;
        wire[last] ^= 0xFF;

        let (res, _) = b.process(&wire, Timeout::NonBlocking);
        assert!(matches!(res, Err(Error::Bundle(dtnchan_bundle::Error::FailedIntegrityCheck))));
        assert!(matches!(b.accept(Timeout::NonBlocking).0, Err(Error::Storage(dtnchan_storage::Error::Timeout))));
    }

    #[test]
    fn process_hands_back_the_bundle_and_custodian_for_a_foreign_destination() {
        let storage: Arc<dyn Storage> = Arc::new(RamStorage::new());
        let a = channel(Eid::new(1, 2), Eid::new(3, 4), AttrsBuilder::new().build().unwrap(), 8, storage.clone());
        let c = channel(Eid::new(9, 9), Eid::new(1, 2), AttrsBuilder::new().build().unwrap(), 8, storage);

        a.store(b"hello", Timeout::NonBlocking).0.unwrap();
        let (wire, _) = a.load(Timeout::NonBlocking);
        let wire = wire.unwrap();

        let (res, flags) = c.process(&wire, Timeout::NonBlocking);
        assert!(flags.contains(Flags::ROUTENEEDED));
        match res.unwrap() {
            ProcessOutcome::Forward { bundle, custodian } => {
                assert_eq!(bundle.payload, b"hello");
                assert_eq!(custodian, Eid::new(1, 2));
            }
            ProcessOutcome::Delivered => panic!("expected a forward outcome"),
        }
    }

    #[test]
    fn process_flags_a_creation_time_ahead_of_the_local_clock() {
        let storage: Arc<dyn Storage> = Arc::new(RamStorage::new());
        let b = channel(Eid::new(3, 4), Eid::new(1, 2), AttrsBuilder::new().build().unwrap(), 8, storage);

        let route = route(Eid::new(1, 2), Eid::new(3, 4));
        let future = CreationTimestamp::new(now_secs() + 3600, 0);
        let bundles = dtnchan_bundle::generate(&route, Eid::new(1, 2), &GenerateOptions::default(), b"hello", future).unwrap();
        let wire = bundles.into_iter().next().unwrap().encode();

        let (res, flags) = b.process(&wire, Timeout::NonBlocking);
        res.unwrap();
        assert!(flags.contains(Flags::UNRELIABLETIME));
    }

    #[test]
    fn round_trips_over_a_file_backed_store() {
        use dtnchan_storage::FileStorage;

        let dir = tempfile::tempdir().unwrap();
        let storage: Arc<dyn Storage> = Arc::new(FileStorage::open(dir.path()).unwrap());
        let a = channel(Eid::new(1, 2), Eid::new(3, 4), AttrsBuilder::new().build().unwrap(), 8, storage.clone());
        let b = channel(Eid::new(3, 4), Eid::new(1, 2), AttrsBuilder::new().build().unwrap(), 8, storage);

        a.store(b"persisted", Timeout::NonBlocking).0.unwrap();
        let (wire, _) = a.load(Timeout::NonBlocking);
        let wire = wire.unwrap();

        b.process(&wire, Timeout::NonBlocking).0.unwrap();
        let (payload, _) = b.accept(Timeout::NonBlocking);
        assert_eq!(payload.unwrap(), b"persisted");
    }
}
