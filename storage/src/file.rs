//! Rotating length-prefixed-record file backend. Each handle owns one log
//! file; `relinquish` flips a tombstone byte in place rather than shrinking
//! the file, and compaction reclaims dead space once it crosses a
//! threshold.

use crate::{Error, Handle, Storage, StorageId, Timeout};
use std::collections::{HashMap, VecDeque};
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::time::Instant;

const LIVE: u8 = 0x01;
const DEAD: u8 = 0x00;

/// Header: 1 tombstone byte + 4-byte big-endian length.
const RECORD_HEADER_LEN: u64 = 5;

/// Compact once at least this fraction of the file is dead records.
const COMPACTION_DEAD_RATIO: f64 = 0.5;
/// ...and the file has grown past this many bytes, so small queues never pay
/// compaction overhead for a handful of stale records.
const COMPACTION_MIN_BYTES: u64 = 64 * 1024;

#[derive(Clone, Copy)]
struct RecordLoc {
    offset: u64,
    len: u32,
}

struct Inner {
    file: File,
    order: VecDeque<StorageId>,
    index: HashMap<StorageId, RecordLoc>,
    live_bytes: u64,
    dead_bytes: u64,
}

struct HandleState {
    path: PathBuf,
    inner: Mutex<Inner>,
    cv: Condvar,
}

/// File-backed [`Storage`]. Each handle gets its own log file under `dir`,
/// named by the handle's numeric value.
///
/// The map from `Handle` to its state is only ever touched to look up or
/// insert/remove an `Arc<HandleState>` — every operation clones the `Arc`
/// and drops the map lock before touching the handle's own mutex/condvar,
/// so a blocking `dequeue` on one handle never stalls operations on another.
pub struct FileStorage {
    dir: PathBuf,
    handles: Mutex<HashMap<Handle, Arc<HandleState>>>,
    next_handle: AtomicU64,
    next_id: AtomicU64,
}

impl FileStorage {
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, Error> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            handles: Mutex::new(HashMap::new()),
            next_handle: AtomicU64::new(0),
            next_id: AtomicU64::new(0),
        })
    }

    fn handle_path(&self, handle: Handle) -> PathBuf {
        self.dir.join(format!("{handle:016x}.log"))
    }

    /// Clones the handle's `Arc<HandleState>` out of the map and releases
    /// the map lock, so the caller's subsequent per-handle locking/waiting
    /// never blocks operations on other handles.
    fn handle_state(&self, handle: Handle) -> Result<Arc<HandleState>, Error> {
        self.handles.lock().unwrap().get(&handle).cloned().ok_or(Error::UnknownHandle)
    }

    fn write_record(file: &mut File, data: &[u8]) -> Result<u64, Error> {
        let offset = file.seek(SeekFrom::End(0))?;
        let mut header = [0u8; RECORD_HEADER_LEN as usize];
        header[0] = LIVE;
        header[1..5].copy_from_slice(&(data.len() as u32).to_be_bytes());
        file.write_all(&header)?;
        file.write_all(data)?;
        file.flush()?;
        Ok(offset)
    }

    fn read_record(file: &mut File, loc: RecordLoc) -> Result<Vec<u8>, Error> {
        file.seek(SeekFrom::Start(loc.offset + RECORD_HEADER_LEN))?;
        let mut buf = vec![0u8; loc.len as usize];
        file.read_exact(&mut buf)?;
        Ok(buf)
    }

    fn mark_dead(file: &mut File, offset: u64) -> Result<(), Error> {
        file.seek(SeekFrom::Start(offset))?;
        file.write_all(&[DEAD])?;
        file.flush()?;
        Ok(())
    }

    /// Rewrites the file keeping only live records, in their original
    /// chronological order. Caller holds the handle's lock.
    fn compact(path: &Path, inner: &mut Inner) -> Result<(), Error> {
        let tmp_path = path.with_extension("log.compact");
        let mut tmp = OpenOptions::new()
            .create(true)
            .truncate(true)
            .read(true)
            .write(true)
            .open(&tmp_path)?;

        let mut new_index = HashMap::with_capacity(inner.index.len());
        for id in inner.order.iter() {
            let loc = inner.index[id];
            let data = Self::read_record(&mut inner.file, loc)?;
            let new_offset = Self::write_record(&mut tmp, &data)?;
            new_index.insert(*id, RecordLoc { offset: new_offset, len: loc.len });
        }

        tmp.flush()?;
        fs::rename(&tmp_path, path)?;

        inner.file = tmp;
        inner.index = new_index;
        inner.dead_bytes = 0;
        inner.live_bytes = inner.index.values().map(|l| RECORD_HEADER_LEN + l.len as u64).sum();
        Ok(())
    }

    fn maybe_compact(path: &Path, inner: &mut Inner) -> Result<(), Error> {
        let total = inner.live_bytes + inner.dead_bytes;
        if total >= COMPACTION_MIN_BYTES && inner.dead_bytes as f64 >= total as f64 * COMPACTION_DEAD_RATIO {
            Self::compact(path, inner)?;
        }
        Ok(())
    }
}

impl Storage for FileStorage {
    #[tracing::instrument(skip(self))]
    fn create(&self) -> Result<Handle, Error> {
        let handle = self.next_handle.fetch_add(1, Ordering::Relaxed);
        let path = self.handle_path(handle);
        let file = OpenOptions::new()
            .create(true)
            .truncate(true)
            .read(true)
            .write(true)
            .open(&path)?;

        let state = Arc::new(HandleState {
            path,
            inner: Mutex::new(Inner {
                file,
                order: VecDeque::new(),
                index: HashMap::new(),
                live_bytes: 0,
                dead_bytes: 0,
            }),
            cv: Condvar::new(),
        });
        self.handles.lock().unwrap().insert(handle, state);
        Ok(handle)
    }

    fn destroy(&self, handle: Handle) -> Result<(), Error> {
        let state = self.handles.lock().unwrap().remove(&handle).ok_or(Error::UnknownHandle)?;
        let _ = fs::remove_file(&state.path);
        Ok(())
    }

    fn enqueue(&self, handle: Handle, data1: &[u8], data2: &[u8], _timeout: Timeout) -> Result<(), Error> {
        let state = self.handle_state(handle)?;

        let mut data = Vec::with_capacity(data1.len() + data2.len());
        data.extend_from_slice(data1);
        data.extend_from_slice(data2);

        let mut inner = state.inner.lock().unwrap();
        let offset = Self::write_record(&mut inner.file, &data)?;
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let loc = RecordLoc { offset, len: data.len() as u32 };
        inner.live_bytes += RECORD_HEADER_LEN + loc.len as u64;
        inner.index.insert(id, loc);
        inner.order.push_back(id);
        drop(inner);

        state.cv.notify_all();
        Ok(())
    }

    fn dequeue(&self, handle: Handle, timeout: Timeout) -> Result<(Vec<u8>, StorageId), Error> {
        let deadline = match timeout {
            Timeout::Bounded(d) => Some(Instant::now() + d),
            Timeout::NonBlocking | Timeout::Indefinite => None,
        };

        // Only the handle's own state is needed from here on; the map lock
        // is dropped before any wait so other handles stay unblocked.
        let state = self.handle_state(handle)?;

        let mut inner = state.inner.lock().unwrap();
        loop {
            if let Some(id) = inner.order.pop_front() {
                let loc = inner.index[&id];
                let data = Self::read_record(&mut inner.file, loc)?;
                return Ok((data, id));
            }

            match timeout {
                Timeout::NonBlocking => return Err(Error::Timeout),
                Timeout::Indefinite => {
                    inner = state.cv.wait(inner).unwrap();
                }
                Timeout::Bounded(_) => {
                    let remaining = deadline.unwrap().saturating_duration_since(Instant::now());
                    if remaining.is_zero() {
                        return Err(Error::Timeout);
                    }
                    let (guard, result) = state.cv.wait_timeout(inner, remaining).unwrap();
                    inner = guard;
                    if result.timed_out() && inner.order.is_empty() {
                        return Err(Error::Timeout);
                    }
                }
            }
        }
    }

    fn retrieve(&self, handle: Handle, id: StorageId) -> Result<Vec<u8>, Error> {
        let state = self.handle_state(handle)?;
        let mut inner = state.inner.lock().unwrap();
        let loc = *inner.index.get(&id).ok_or(Error::UnknownId)?;
        Self::read_record(&mut inner.file, loc)
    }

    fn release(&self, handle: Handle, id: StorageId) -> Result<(), Error> {
        let state = self.handle_state(handle)?;
        let inner = state.inner.lock().unwrap();
        if inner.index.contains_key(&id) {
            Ok(())
        } else {
            Err(Error::UnknownId)
        }
    }

    fn relinquish(&self, handle: Handle, id: StorageId) -> Result<(), Error> {
        let state = self.handle_state(handle)?;
        let mut inner = state.inner.lock().unwrap();
        let loc = inner.index.remove(&id).ok_or(Error::UnknownId)?;
        inner.order.retain(|&x| x != id);

        Self::mark_dead(&mut inner.file, loc.offset)?;
        inner.live_bytes -= RECORD_HEADER_LEN + loc.len as u64;
        inner.dead_bytes += RECORD_HEADER_LEN + loc.len as u64;

        Self::maybe_compact(&state.path, &mut inner)?;
        Ok(())
    }

    fn getcount(&self, handle: Handle) -> Result<usize, Error> {
        let state = self.handle_state(handle)?;
        Ok(state.inner.lock().unwrap().index.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enqueue_dequeue_relinquish_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let s = FileStorage::open(dir.path()).unwrap();
        let h = s.create().unwrap();

        s.enqueue(h, b"hello, ", b"world", Timeout::NonBlocking).unwrap();
        let (data, id) = s.dequeue(h, Timeout::NonBlocking).unwrap();
        assert_eq!(data, b"hello, world");
        assert_eq!(s.retrieve(h, id).unwrap(), b"hello, world");

        s.relinquish(h, id).unwrap();
        assert!(matches!(s.retrieve(h, id), Err(Error::UnknownId)));
        assert_eq!(s.getcount(h).unwrap(), 0);
    }

    #[test]
    fn fifo_ordering_across_many_records() {
        let dir = tempfile::tempdir().unwrap();
        let s = FileStorage::open(dir.path()).unwrap();
        let h = s.create().unwrap();

        for i in 0..10u8 {
            s.enqueue(h, &[i], b"", Timeout::NonBlocking).unwrap();
        }
        for i in 0..10u8 {
            let (data, _) = s.dequeue(h, Timeout::NonBlocking).unwrap();
            assert_eq!(data, vec![i]);
        }
    }

    #[test]
    fn compaction_preserves_live_data_and_order() {
        let dir = tempfile::tempdir().unwrap();
        let s = FileStorage::open(dir.path()).unwrap();
        let h = s.create().unwrap();

        // Push enough records, relinquish most of them, and force past the
        // byte threshold so the dead-ratio check alone decides compaction.
        let payload = vec![0xABu8; 4096];
        let mut ids = Vec::new();
        for _ in 0..40 {
            s.enqueue(h, &payload, b"", Timeout::NonBlocking).unwrap();
            let (_, id) = s.dequeue(h, Timeout::NonBlocking).unwrap();
            ids.push(id);
        }

        // Re-enqueue one marker record we expect to survive compaction.
        s.enqueue(h, b"survivor", b"", Timeout::NonBlocking).unwrap();

        for id in &ids[..39] {
            s.relinquish(h, *id).unwrap();
        }

        let (data, _) = s.dequeue(h, Timeout::NonBlocking).unwrap();
        assert_eq!(data, b"survivor");
    }

    #[test]
    fn destroy_removes_the_log_file() {
        let dir = tempfile::tempdir().unwrap();
        let s = FileStorage::open(dir.path()).unwrap();
        let h = s.create().unwrap();
        s.enqueue(h, b"x", b"", Timeout::NonBlocking).unwrap();
        s.destroy(h).unwrap();
        assert!(matches!(s.getcount(h), Err(Error::UnknownHandle)));
    }

    #[test]
    fn blocking_dequeue_wakes_on_enqueue() {
        use std::sync::Arc;
        use std::thread;
        use std::time::Duration;

        let dir = tempfile::tempdir().unwrap();
        let s = Arc::new(FileStorage::open(dir.path()).unwrap());
        let h = s.create().unwrap();

        let s2 = s.clone();
        let producer = thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            s2.enqueue(h, b"late", b"", Timeout::NonBlocking).unwrap();
        });

        let (data, _) = s.dequeue(h, Timeout::Bounded(Duration::from_secs(5))).unwrap();
        assert_eq!(data, b"late");
        producer.join().unwrap();
    }
}
