use std::sync::atomic::AtomicU32;
use std::sync::atomic::Ordering::{AcqRel, Acquire, Release};
use std::sync::Arc;

use crossbeam_utils::CachePadded;
use parking_lot::Mutex;
use tracing::{trace, warn};

use super::buffer::IncomingBuffer;
use crate::Core::futex::{futex_wait, futex_wake_all};
use crate::Core::NetMetrics;
use crate::Net::collaborators::BufferPool;

struct ReceiveSlot {
    references: CachePadded<AtomicU32>,
    /// 1 once the previous buffer went back to the pool. Futex word.
    vacant: AtomicU32,
    buffer: Mutex<Option<Arc<IncomingBuffer>>>,
}

/// Reference-counted slots for raw receive buffers in flight.
///
/// The scanning thread holds `2 × handler threads` references while it walks a
/// buffer, and every message dispatched from it holds one more until its
/// handler finishes. The buffer goes back to its pool when the count hits zero.
pub struct BufferSlots {
    slots: Box<[ReceiveSlot]>,
    scan_references: u32,
    pool: Arc<dyn BufferPool>,
    metrics: Arc<NetMetrics>,
}

impl BufferSlots {
    pub fn new(
        count: usize,
        handler_threads: usize,
        pool: Arc<dyn BufferPool>,
        metrics: Arc<NetMetrics>,
    ) -> Self {
        let slots = (0..count)
            .map(|_| ReceiveSlot {
                references: CachePadded::new(AtomicU32::new(0)),
                vacant: AtomicU32::new(1),
                buffer: Mutex::new(None),
            })
            .collect();
        Self {
            slots,
            scan_references: 2 * handler_threads.max(1) as u32,
            pool,
            metrics,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn references(&self, index: usize) -> u32 {
        self.slots[index].references.load(Acquire)
    }

    pub fn is_vacant(&self, index: usize) -> bool {
        self.slots[index].vacant.load(Acquire) == 1
    }

    /// Install `buffer` in slot `index`, blocking until the slot's previous
    /// buffer has been returned.
    pub(crate) fn enter(&self, index: usize, buffer: Arc<IncomingBuffer>) {
        let slot = &self.slots[index];
        if slot.vacant.load(Acquire) == 0 {
            self.metrics.slot_wait();
            trace!(slot = index, "receive slot still in use, waiting for handlers");
            while slot.vacant.load(Acquire) == 0 {
                futex_wait(&slot.vacant, 0);
            }
        }
        *slot.buffer.lock() = Some(buffer);
        slot.references.store(self.scan_references, Release);
        slot.vacant.store(0, Release);
    }

    /// One more reference on slot `index`, dropped with the returned guard.
    pub(crate) fn retain(self: &Arc<Self>, index: usize) -> SlotRef {
        self.slots[index].references.fetch_add(1, AcqRel);
        SlotRef {
            slots: Arc::clone(self),
            index,
        }
    }

    /// Drop the scanning thread's references on slot `index`.
    pub(crate) fn leave(&self, index: usize) {
        self.release(index, self.scan_references);
    }

    fn release(&self, index: usize, count: u32) {
        let slot = &self.slots[index];
        let previous = slot.references.fetch_sub(count, AcqRel);
        debug_assert!(previous >= count, "receive slot {index} released too often");
        if previous != count {
            return;
        }

        let buffer = slot.buffer.lock().take();
        if let Some(buffer) = buffer {
            match Arc::try_unwrap(buffer) {
                Ok(buffer) => self.pool.return_buffer(buffer),
                Err(_) => warn!(
                    slot = index,
                    "receive buffer still referenced at release, dropping it"
                ),
            }
        }
        slot.vacant.store(1, Release);
        futex_wake_all(&slot.vacant);
    }
}

/// A handler's hold on a receive slot.
pub struct SlotRef {
    slots: Arc<BufferSlots>,
    index: usize,
}

impl SlotRef {
    pub fn index(&self) -> usize {
        self.index
    }
}

impl Drop for SlotRef {
    fn drop(&mut self) {
        self.slots.release(self.index, 1);
    }
}

impl std::fmt::Debug for BufferSlots {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        crate::Debug::StructDebug::debug_buffer_slots(self, f)
    }
}
