use std::fmt;

use crate::Core::NativeBuffer;
use crate::Net::Cursor::UnfinishedOperation;
use crate::Net::Incoming::{BufferSlots, PipeIn};
use crate::Net::Outgoing::OutgoingRingBuffer;

/// Debug function for NativeBuffer
///
/// Shows the region's address and size, never its contents
pub fn debug_native_buffer(buffer: &NativeBuffer, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("NativeBuffer")
        .field("region", &format_args!("{:p}", buffer.as_slice().as_ptr()))
        .field("size", &buffer.size())
        .finish()
}

/// Debug function for OutgoingRingBuffer
///
/// Shows:
/// - Capacity
/// - Back, producer front and consumer front
/// - Committed bytes waiting for the drain
pub fn debug_outgoing_ring_buffer(
    ring: &OutgoingRingBuffer,
    f: &mut fmt::Formatter<'_>,
) -> fmt::Result {
    f.debug_struct("OutgoingRingBuffer")
        .field("capacity", &ring.capacity())
        .field("back", &ring.back())
        .field("front_producer", &ring.front_producer())
        .field("front_consumer", &ring.front_consumer())
        .field("committed", &ring.committed_len())
        .finish_non_exhaustive()
}

pub fn debug_unfinished_operation(
    op: &UnfinishedOperation,
    f: &mut fmt::Formatter<'_>,
) -> fmt::Result {
    f.debug_struct("UnfinishedOperation")
        .field("state", &op.state())
        .field("header", &op.header())
        .field("message_created", &op.was_message_created())
        .field("discarding", &op.is_discarding())
        .field("bytes_copied", &op.bytes_copied())
        .field("resume_index", &op.progress().index())
        .field("partial_array", &op.progress().has_partial_array())
        .finish()
}

/// Debug function for BufferSlots
///
/// Lists the reference count of every occupied slot
pub fn debug_buffer_slots(slots: &BufferSlots, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let occupied: Vec<(usize, u32)> = (0..slots.len())
        .filter(|&i| !slots.is_vacant(i))
        .map(|i| (i, slots.references(i)))
        .collect();
    f.debug_struct("BufferSlots")
        .field("slots", &slots.len())
        .field("occupied", &occupied)
        .finish()
}

pub fn debug_pipe_in(pipe: &PipeIn, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("PipeIn")
        .field("connection_id", &pipe.connection_id())
        .field("connected", &pipe.is_connected())
        .field("corrupted", &pipe.is_corrupted())
        .field("unfinished", pipe.unfinished())
        .field("slots", pipe.slots())
        .finish_non_exhaustive()
}
