// ABOUTME: Single-lock producer/consumer harness around a SampleQueue
// ABOUTME: Blocking producer pushes with a fill ceiling and flush cancellation

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::trace;
use parking_lot::{Condvar, Mutex};

use crate::buffer::queue::{QueueFetch, SampleQueue};
use crate::error::Error;

struct Inner {
    queue: Mutex<SampleQueue>,
    space: Condvar,
    flushing: AtomicBool,
}

/// Shared handle pairing a [`SampleQueue`] with the one lock both
/// sides use.
///
/// The producer may block in [`push_blocking`](Self::push_blocking)
/// until retrieval makes room; the retrieval side only ever takes the
/// mutex for a bounded critical section and never waits on the
/// condvar, so it is safe to call from a periodic real-time context.
/// [`begin_flush`](Self::begin_flush) cancels blocked producers — the
/// flushing flag is re-checked before and after every wait so teardown
/// can never leave a producer parked.
#[derive(Clone)]
pub struct SharedQueue {
    inner: Arc<Inner>,
}

impl SharedQueue {
    pub fn new(queue: SampleQueue) -> Self {
        Self {
            inner: Arc::new(Inner {
                queue: Mutex::new(queue),
                space: Condvar::new(),
                flushing: AtomicBool::new(false),
            }),
        }
    }

    /// Append sample data, waiting while the buffered duration is at
    /// or above `max_fill_us`. Returns [`Error::Flushing`] if a flush
    /// begins before room appears.
    pub fn push_blocking(
        &self,
        data: &[u8],
        pts: Option<i64>,
        max_fill_us: i64,
    ) -> Result<(), Error> {
        let mut queue = self.inner.queue.lock();
        loop {
            if self.inner.flushing.load(Ordering::Acquire) {
                return Err(Error::Flushing);
            }
            if queue.fill_level_us() < max_fill_us {
                break;
            }
            trace!("producer waiting for queue room");
            self.inner.space.wait(&mut queue);
        }
        queue.push(data, pts);
        Ok(())
    }

    /// Packet-mode counterpart of [`push_blocking`](Self::push_blocking).
    pub fn push_packet_blocking(
        &self,
        bytes: Vec<u8>,
        duration_us: i64,
        pts: Option<i64>,
        max_fill_us: i64,
    ) -> Result<(), Error> {
        let mut queue = self.inner.queue.lock();
        loop {
            if self.inner.flushing.load(Ordering::Acquire) {
                return Err(Error::Flushing);
            }
            if queue.fill_level_us() < max_fill_us {
                break;
            }
            self.inner.space.wait(&mut queue);
        }
        queue.push_packet(bytes, duration_us, pts);
        Ok(())
    }

    /// Retrieve under the shared lock and wake one blocked producer.
    /// Never waits; the critical section is the queue's bounded-time
    /// retrieval.
    pub fn retrieve(
        &self,
        min_frames: usize,
        ideal_frames: usize,
        retrieval_pts: i64,
        pts_shift: i64,
    ) -> QueueFetch {
        let fetch = self
            .inner
            .queue
            .lock()
            .retrieve(min_frames, ideal_frames, retrieval_pts, pts_shift);
        self.inner.space.notify_one();
        fetch
    }

    pub fn fill_level_us(&self) -> i64 {
        self.inner.queue.lock().fill_level_us()
    }

    /// Enter the flushing state: clears the queue, fails in-flight and
    /// future blocking pushes, and wakes every waiter.
    pub fn begin_flush(&self) {
        self.inner.flushing.store(true, Ordering::Release);
        self.inner.queue.lock().flush();
        self.inner.space.notify_all();
    }

    /// Leave the flushing state; blocking pushes work again.
    pub fn end_flush(&self) {
        self.inner.flushing.store(false, Ordering::Release);
    }

    pub fn is_flushing(&self) -> bool {
        self.inner.flushing.load(Ordering::Acquire)
    }

    /// Run `f` with the queue under the shared lock, e.g. for a format
    /// change between streams.
    pub fn with_queue<R>(&self, f: impl FnOnce(&mut SampleQueue) -> R) -> R {
        f(&mut self.inner.queue.lock())
    }
}
