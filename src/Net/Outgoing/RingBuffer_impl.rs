use std::io;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering::{AcqRel, Acquire, Relaxed, Release};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, error, trace};

use super::layout::{distance, Position, COMMITTING, POSITION_MASK};
use super::RingBuffer::OutgoingRingBuffer;
use crate::config::MAX_MESSAGE_SIZE;
use crate::error::{NetError, Overflow};
use crate::Core::futex::park_nanos;
use crate::Net::Cursor::{DirectExporter, Exporter, WrapExporter};
use crate::Net::Message::message::{export_message, measure_payload, size_mismatch};
use crate::Net::Message::Message;
use crate::Net::Structs::MessageHeader;

/// What a producer does when the ring has no room for its message.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Backpressure {
    Block,
    Fail,
    Deadline(Instant, Duration),
}

impl Backpressure {
    fn wait(self, park_ns: u64, needed: usize, free: usize) -> Result<(), NetError> {
        match self {
            Backpressure::Block => {
                park_nanos(park_ns);
                Ok(())
            }
            Backpressure::Fail => Err(NetError::BufferFull { needed, free }),
            Backpressure::Deadline(at, timeout) => {
                if Instant::now() >= at {
                    return Err(NetError::Timeout(timeout));
                }
                park_nanos(park_ns);
                Ok(())
            }
        }
    }
}

/// Committed bytes ready for the transport: `len` bytes at `offset`, never
/// crossing the physical end of the buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommittedRange {
    pub offset: usize,
    pub len: usize,
}

struct DrainGuard<'a>(&'a AtomicBool);

impl Drop for DrainGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Release);
    }
}

impl OutgoingRingBuffer {
    /// Serialize `message` behind `header`, parking while the ring is full.
    /// Returns once the bytes are written and handed to the commit protocol.
    pub fn push(&self, header: &MessageHeader, message: &dyn Message) -> Result<(), NetError> {
        self.push_with(header, message, Backpressure::Block)
    }

    /// Like [`push`](Self::push) but fails with `BufferFull` instead of waiting.
    ///
    /// A message larger than the ring never fits in one go and always fails.
    pub fn try_push(&self, header: &MessageHeader, message: &dyn Message) -> Result<(), NetError> {
        self.push_with(header, message, Backpressure::Fail)
    }

    /// Like [`push`](Self::push) but gives up with `Timeout` once `timeout` passed
    /// without finding room.
    ///
    /// For a message larger than the ring the deadline covers the wait for a
    /// fully drained ring. Once its first chunk is reserved the write cannot be
    /// abandoned and runs to completion.
    pub fn push_timeout(
        &self,
        header: &MessageHeader,
        message: &dyn Message,
        timeout: Duration,
    ) -> Result<(), NetError> {
        self.push_with(
            header,
            message,
            Backpressure::Deadline(Instant::now() + timeout, timeout),
        )
    }

    pub(crate) fn push_with(
        &self,
        header: &MessageHeader,
        message: &dyn Message,
        mode: Backpressure,
    ) -> Result<(), NetError> {
        let size = header.message_size();
        if size > MAX_MESSAGE_SIZE {
            return Err(NetError::MessageTooLarge {
                message_type: header.message_type,
                subtype: header.subtype,
                size,
                max: MAX_MESSAGE_SIZE,
            });
        }
        if size <= self.capacity() {
            self.push_small(header, message, size, mode)
        } else {
            self.push_large(header, message, size, mode)
        }
    }

    fn push_small(
        &self,
        header: &MessageHeader,
        message: &dyn Message,
        size: usize,
        mode: Backpressure,
    ) -> Result<(), NetError> {
        let size32 = size as u32;
        let mut waited = false;
        loop {
            let front = self.front_producer.load();
            let back = self.back.load(Acquire);
            let free = self.capacity.saturating_sub(distance(back, front.bytes));
            if size32 > free {
                if !waited {
                    waited = true;
                    self.metrics.full_buffer_wait();
                    trace!(size, free, "outgoing ring buffer full, waiting for drain");
                }
                mode.wait(self.park_ns, size, free as usize)?;
                continue;
            }

            let reserved = front.advance(size32);
            if self.front_producer.compare_exchange(front, reserved).is_err() {
                std::hint::spin_loop();
                continue;
            }

            // The range is ours; it has to be committed even if serialization fails.
            let result = self.serialize(header, message, front.bytes, size);
            self.leave_serialization_area(front, reserved, size32);
            self.metrics.message_pushed(size);
            self.flow.data_posted(size);
            return result;
        }
    }

    /// Mutable views of the `len` bytes starting at ring position `start`,
    /// split at the physical end. The second view is empty unless the range wraps.
    ///
    /// # Safety
    /// The range must be reserved by the caller and not yet committed.
    #[allow(clippy::mut_from_ref)]
    unsafe fn region_mut(&self, start: u32, len: usize) -> (&mut [u8], &mut [u8]) {
        let offset = self.offset(start);
        let first = len.min(self.capacity() - offset);
        (
            self.buffer.range_mut(offset, first),
            self.buffer.range_mut(0, len - first),
        )
    }

    fn serialize(
        &self,
        header: &MessageHeader,
        message: &dyn Message,
        start: u32,
        size: usize,
    ) -> Result<(), NetError> {
        let (first, second) = unsafe { self.region_mut(start, size) };
        let (complete, written) = if second.is_empty() {
            let mut exporter = DirectExporter::new(first);
            let complete = export_message(header, message, &mut exporter).is_ok();
            (complete, exporter.written())
        } else {
            let mut exporter = WrapExporter::new(first, second);
            let complete = export_message(header, message, &mut exporter).is_ok();
            (complete, exporter.written())
        };
        if complete && written == size {
            return Ok(());
        }

        // Zero the rest so the receiver sees a deterministic (corrupt) message.
        let rest = start.wrapping_add(written as u32) & POSITION_MASK;
        let (first, second) = unsafe { self.region_mut(rest, size - written) };
        first.fill(0);
        second.fill(0);
        let err = size_mismatch(header, message);
        error!(%header, error = %err, "message serialized to the wrong size");
        Err(err)
    }

    /// Commit `[start, end)` if every earlier slot is committed, otherwise
    /// record its size for whoever commits the slot before it.
    fn leave_serialization_area(&self, start: Position, end: Position, size: u32) {
        let slot = start.slot;
        let window = (self.uncommitted.len() - 1) as u32;
        while distance(self.back_array.load(Acquire), slot) >= window {
            thread::yield_now();
        }

        if self
            .front_consumer
            .compare_exchange(start, end.committing())
            .is_ok()
        {
            self.commit_messages(slot, end);
        } else {
            self.uncommitted.record(slot, size);
        }
    }

    /// Publish `front` for `slot`, then commit every directly following slot
    /// whose producer already recorded its size.
    ///
    /// Entered with `front_consumer == front.committing()`.
    fn commit_messages(&self, slot: u32, mut front: Position) {
        self.uncommitted.clear(slot);
        self.back_array.store(front.slot, Release);
        self.front_consumer.store(front);

        loop {
            let slot = front.slot;
            let mut size = self.uncommitted.get(slot);
            while size == 0 {
                // No following producer, or it committed itself.
                if self.front_producer.load() == front || self.front_consumer.load() != front {
                    return;
                }
                thread::yield_now();
                size = self.uncommitted.get(slot);
            }

            let next = front.advance(size);
            if self
                .front_consumer
                .compare_exchange(front, next.committing())
                .is_err()
            {
                return;
            }
            self.uncommitted.clear(slot);
            self.back_array.store(next.slot, Release);
            self.front_consumer.store(next);
            front = next;
        }
    }

    fn push_large(
        &self,
        header: &MessageHeader,
        message: &dyn Message,
        size: usize,
        mode: Backpressure,
    ) -> Result<(), NetError> {
        // Chunks are published as they are written, so the size has to be right
        // before anything is reserved.
        if measure_payload(message) != header.payload_size as usize {
            let err = size_mismatch(header, message);
            error!(%header, error = %err, "large message serialized to the wrong size");
            return Err(err);
        }

        if let Backpressure::Fail = mode {
            let front = self.front_producer.load();
            let free = self
                .capacity
                .saturating_sub(distance(self.back.load(Acquire), front.bytes));
            return Err(NetError::BufferFull {
                needed: size,
                free: free as usize,
            });
        }

        while self
            .large_message_active
            .compare_exchange(false, true, AcqRel, Relaxed)
            .is_err()
        {
            mode.wait(self.park_ns, size, 0)?;
        }

        let size32 = size as u32;
        let start = loop {
            let front = self.front_producer.load();
            if let Backpressure::Deadline(..) = mode {
                let pending = distance(self.back.load(Acquire), front.bytes);
                if pending > 0 {
                    let free = (self.capacity - pending) as usize;
                    if let Err(err) = mode.wait(self.park_ns, size, free) {
                        self.large_message_active.store(false, Release);
                        return Err(err);
                    }
                    continue;
                }
            }
            if self
                .front_producer
                .compare_exchange(front, front.advance(size32))
                .is_ok()
            {
                break front;
            }
            std::hint::spin_loop();
        };
        let end = start.advance(size32);

        debug!(%header, size, slot = start.slot, "writing large message in chunks");
        self.metrics.large_message();
        self.serialize_large(header, message, start, size);
        self.commit_messages(start.slot, end);
        self.large_message_active.store(false, Release);

        self.metrics.message_pushed(size);
        self.flow.data_posted(size);
        Ok(())
    }

    /// Write a message larger than the ring as a series of chunks, each as big
    /// as the free space, publishing every chunk through `front_consumer` and
    /// waiting for the drain in between.
    fn serialize_large(
        &self,
        header: &MessageHeader,
        message: &dyn Message,
        start: Position,
        size: usize,
    ) {
        // Everything reserved before us must be committed first.
        while self.front_consumer.load() != start {
            thread::yield_now();
        }

        let mut front = start.bytes;
        let mut written = 0usize;
        loop {
            let back = self.back.load(Acquire);
            let free = self.capacity.saturating_sub(distance(back, front)) as usize;
            if free > 0 {
                let chunk = free.min(size - written);
                let (first, second) = unsafe { self.region_mut(front, chunk) };
                let mut exporter = WrapExporter::with_skip(first, second, written);
                match export_message(header, message, &mut exporter) {
                    // Overflow just marks the end of this chunk.
                    Ok(()) | Err(Overflow) => {}
                }
                debug_assert_eq!(exporter.stored(), chunk);

                written += chunk;
                front = front.wrapping_add(chunk as u32) & POSITION_MASK;
                self.front_consumer.store(Position::new(COMMITTING, front));
                trace!(written, size, "published large message chunk");
                if written == size {
                    return;
                }
            }
            while self.back.load(Acquire) == back {
                park_nanos(self.park_ns);
            }
        }
    }

    /// Committed bytes ready to send, up to the physical end of the buffer.
    pub fn pop_back(&self) -> Option<CommittedRange> {
        let back = self.back.load(Acquire);
        let pending = distance(back, self.front_consumer.load().bytes) as usize;
        if pending == 0 {
            return None;
        }
        let offset = self.offset(back);
        Some(CommittedRange {
            offset,
            len: pending.min(self.capacity() - offset),
        })
    }

    /// Release `bytes` at the back after the transport took them.
    pub(crate) fn shift_back(&self, bytes: usize) {
        let back = self.back.load(Acquire);
        debug_assert!(bytes <= distance(back, self.front_consumer.load().bytes) as usize);
        self.back
            .store(back.wrapping_add(bytes as u32) & POSITION_MASK, Release);
        self.metrics.bytes_drained(bytes);
        self.flow.data_sent(bytes);
    }

    /// Pass the next committed range to `sink` and free as many bytes as it
    /// reports consumed.
    ///
    /// Only one drain runs at a time; a call made while another is in progress
    /// returns `Ok(0)` without calling `sink`.
    pub fn drain<F>(&self, sink: F) -> io::Result<usize>
    where
        F: FnOnce(&[u8]) -> io::Result<usize>,
    {
        if self
            .draining
            .compare_exchange(false, true, Acquire, Relaxed)
            .is_err()
        {
            return Ok(0);
        }
        let _guard = DrainGuard(&self.draining);

        let Some(range) = self.pop_back() else {
            return Ok(0);
        };
        // Committed bytes are not touched by producers until shift_back frees them.
        let bytes = unsafe { self.buffer.range(range.offset, range.len) };
        let consumed = sink(bytes)?.min(range.len);
        self.shift_back(consumed);
        Ok(consumed)
    }

    /// Append every committed byte to `out`. Returns the number of bytes moved.
    pub fn drain_to_vec(&self, out: &mut Vec<u8>) -> usize {
        let mut total = 0;
        // At most two ranges: up to the physical end, then from the start.
        for _ in 0..2 {
            let moved = self
                .drain(|bytes| {
                    out.extend_from_slice(bytes);
                    Ok(bytes.len())
                })
                .unwrap_or(0);
            if moved == 0 {
                break;
            }
            total += moved;
        }
        total
    }

    /// Committed bytes not yet drained.
    pub fn committed_len(&self) -> usize {
        distance(self.back.load(Acquire), self.front_consumer.load().bytes) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.committed_len() == 0
    }
}
