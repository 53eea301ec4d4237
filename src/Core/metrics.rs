use std::sync::atomic::{AtomicU64, Ordering::Relaxed};

use crossbeam_utils::CachePadded;

/// Transport counters, shared by handle between the outgoing and incoming side
/// of a connection (or across connections, if the owner wants totals).
#[derive(Default)]
pub struct NetMetrics {
    messages_pushed: CachePadded<AtomicU64>,
    bytes_posted: CachePadded<AtomicU64>,
    bytes_drained: CachePadded<AtomicU64>,
    full_buffer_waits: CachePadded<AtomicU64>,
    large_messages: CachePadded<AtomicU64>,
    buffers_received: CachePadded<AtomicU64>,
    bytes_received: CachePadded<AtomicU64>,
    messages_received: CachePadded<AtomicU64>,
    messages_discarded: CachePadded<AtomicU64>,
    slot_waits: CachePadded<AtomicU64>,
}

/// Point-in-time copy of [`NetMetrics`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub messages_pushed: u64,
    pub bytes_posted: u64,
    pub bytes_drained: u64,
    pub full_buffer_waits: u64,
    pub large_messages: u64,
    pub buffers_received: u64,
    pub bytes_received: u64,
    pub messages_received: u64,
    pub messages_discarded: u64,
    pub slot_waits: u64,
}

impl NetMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub(crate) fn message_pushed(&self, bytes: usize) {
        self.messages_pushed.fetch_add(1, Relaxed);
        self.bytes_posted.fetch_add(bytes as u64, Relaxed);
    }

    #[inline]
    pub(crate) fn bytes_drained(&self, bytes: usize) {
        self.bytes_drained.fetch_add(bytes as u64, Relaxed);
    }

    #[inline]
    pub(crate) fn full_buffer_wait(&self) {
        self.full_buffer_waits.fetch_add(1, Relaxed);
    }

    #[inline]
    pub(crate) fn large_message(&self) {
        self.large_messages.fetch_add(1, Relaxed);
    }

    #[inline]
    pub(crate) fn buffer_received(&self, bytes: usize) {
        self.buffers_received.fetch_add(1, Relaxed);
        self.bytes_received.fetch_add(bytes as u64, Relaxed);
    }

    #[inline]
    pub(crate) fn message_received(&self) {
        self.messages_received.fetch_add(1, Relaxed);
    }

    #[inline]
    pub(crate) fn message_discarded(&self) {
        self.messages_discarded.fetch_add(1, Relaxed);
    }

    #[inline]
    pub(crate) fn slot_wait(&self) {
        self.slot_waits.fetch_add(1, Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            messages_pushed: self.messages_pushed.load(Relaxed),
            bytes_posted: self.bytes_posted.load(Relaxed),
            bytes_drained: self.bytes_drained.load(Relaxed),
            full_buffer_waits: self.full_buffer_waits.load(Relaxed),
            large_messages: self.large_messages.load(Relaxed),
            buffers_received: self.buffers_received.load(Relaxed),
            bytes_received: self.bytes_received.load(Relaxed),
            messages_received: self.messages_received.load(Relaxed),
            messages_discarded: self.messages_discarded.load(Relaxed),
            slot_waits: self.slot_waits.load(Relaxed),
        }
    }
}

impl std::fmt::Debug for NetMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.snapshot().fmt(f)
    }
}
