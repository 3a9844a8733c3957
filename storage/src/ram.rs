//! In-memory queue backend. Unbounded: `enqueue` never blocks; `dequeue`
//! blocks only when the queue is empty.

use crate::{Error, Handle, Storage, StorageId, Timeout};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Condvar, Mutex};
use std::time::Instant;

#[derive(Default)]
struct Queue {
    order: VecDeque<StorageId>,
    items: HashMap<StorageId, Vec<u8>>,
}

#[derive(Default)]
pub struct RamStorage {
    queues: Mutex<HashMap<Handle, Queue>>,
    cv: Condvar,
    next_handle: AtomicU64,
    next_id: AtomicU64,
}

impl RamStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Storage for RamStorage {
    #[tracing::instrument(skip(self))]
    fn create(&self) -> Result<Handle, Error> {
        let handle = self.next_handle.fetch_add(1, Ordering::Relaxed);
        self.queues.lock().unwrap().insert(handle, Queue::default());
        Ok(handle)
    }

    fn destroy(&self, handle: Handle) -> Result<(), Error> {
        self.queues
            .lock()
            .unwrap()
            .remove(&handle)
            .map(|_| ())
            .ok_or(Error::UnknownHandle)
    }

    fn enqueue(&self, handle: Handle, data1: &[u8], data2: &[u8], _timeout: Timeout) -> Result<(), Error> {
        let mut queues = self.queues.lock().unwrap();
        let queue = queues.get_mut(&handle).ok_or(Error::UnknownHandle)?;

        let mut data = Vec::with_capacity(data1.len() + data2.len());
        data.extend_from_slice(data1);
        data.extend_from_slice(data2);

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        queue.items.insert(id, data);
        queue.order.push_back(id);
        drop(queues);

        self.cv.notify_all();
        Ok(())
    }

    fn dequeue(&self, handle: Handle, timeout: Timeout) -> Result<(Vec<u8>, StorageId), Error> {
        let deadline = match timeout {
            Timeout::Bounded(d) => Some(Instant::now() + d),
            Timeout::NonBlocking | Timeout::Indefinite => None,
        };

        let mut queues = self.queues.lock().unwrap();
        loop {
            let queue = queues.get_mut(&handle).ok_or(Error::UnknownHandle)?;
            if let Some(id) = queue.order.pop_front() {
                let data = queue.items.get(&id).expect("dequeued id must be indexed").clone();
                return Ok((data, id));
            }

            match timeout {
                Timeout::NonBlocking => return Err(Error::Timeout),
                Timeout::Indefinite => {
                    queues = self.cv.wait(queues).unwrap();
                }
                Timeout::Bounded(_) => {
                    let remaining = deadline.unwrap().saturating_duration_since(Instant::now());
                    if remaining.is_zero() {
                        return Err(Error::Timeout);
                    }
                    let (guard, result) = self.cv.wait_timeout(queues, remaining).unwrap();
                    queues = guard;
                    if result.timed_out() {
                        // Loop once more: a notified waiter can still lose
                        // the race and see `timed_out`, but the item it was
                        // woken for may still be sitting in `order`.
                        if queues
                            .get(&handle)
                            .map(|q| q.order.is_empty())
                            .unwrap_or(true)
                        {
                            return Err(Error::Timeout);
                        }
                    }
                }
            }
        }
    }

    fn retrieve(&self, handle: Handle, id: StorageId) -> Result<Vec<u8>, Error> {
        let queues = self.queues.lock().unwrap();
        let queue = queues.get(&handle).ok_or(Error::UnknownHandle)?;
        queue.items.get(&id).cloned().ok_or(Error::UnknownId)
    }

    fn release(&self, handle: Handle, id: StorageId) -> Result<(), Error> {
        let queues = self.queues.lock().unwrap();
        let queue = queues.get(&handle).ok_or(Error::UnknownHandle)?;
        if queue.items.contains_key(&id) {
            Ok(())
        } else {
            Err(Error::UnknownId)
        }
    }

    fn relinquish(&self, handle: Handle, id: StorageId) -> Result<(), Error> {
        let mut queues = self.queues.lock().unwrap();
        let queue = queues.get_mut(&handle).ok_or(Error::UnknownHandle)?;
        if queue.items.remove(&id).is_none() {
            return Err(Error::UnknownId);
        }
        queue.order.retain(|&x| x != id);
        Ok(())
    }

    fn getcount(&self, handle: Handle) -> Result<usize, Error> {
        let queues = self.queues.lock().unwrap();
        queues.get(&handle).map(|q| q.items.len()).ok_or(Error::UnknownHandle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn enqueue_dequeue_is_fifo() {
        let s = RamStorage::new();
        let h = s.create().unwrap();
        s.enqueue(h, b"a", b"", Timeout::NonBlocking).unwrap();
        s.enqueue(h, b"b", b"", Timeout::NonBlocking).unwrap();
        let (d1, id1) = s.dequeue(h, Timeout::NonBlocking).unwrap();
        let (d2, id2) = s.dequeue(h, Timeout::NonBlocking).unwrap();
        assert_eq!(d1, b"a");
        assert_eq!(d2, b"b");
        assert_ne!(id1, id2);
    }

    #[test]
    fn enqueue_concatenates_both_parts() {
        let s = RamStorage::new();
        let h = s.create().unwrap();
        s.enqueue(h, b"hello, ", b"world", Timeout::NonBlocking).unwrap();
        let (data, _) = s.dequeue(h, Timeout::NonBlocking).unwrap();
        assert_eq!(data, b"hello, world");
    }

    #[test]
    fn dequeue_on_empty_queue_times_out_immediately_when_non_blocking() {
        let s = RamStorage::new();
        let h = s.create().unwrap();
        assert!(matches!(s.dequeue(h, Timeout::NonBlocking), Err(Error::Timeout)));
    }

    #[test]
    fn dequeued_item_remains_retrievable_until_relinquished() {
        let s = RamStorage::new();
        let h = s.create().unwrap();
        s.enqueue(h, b"x", b"", Timeout::NonBlocking).unwrap();
        let (_, id) = s.dequeue(h, Timeout::NonBlocking).unwrap();
        assert_eq!(s.retrieve(h, id).unwrap(), b"x");
        s.release(h, id).unwrap();
        assert_eq!(s.getcount(h).unwrap(), 1);
        s.relinquish(h, id).unwrap();
        assert!(matches!(s.retrieve(h, id), Err(Error::UnknownId)));
        assert_eq!(s.getcount(h).unwrap(), 0);
    }

    #[test]
    fn destroy_drops_everything() {
        let s = RamStorage::new();
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

        let s = Arc::new(RamStorage::new());
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
