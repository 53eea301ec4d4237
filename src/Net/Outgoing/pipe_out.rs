use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use super::RingBuffer::OutgoingRingBuffer;
use super::RingBuffer_impl::Backpressure;
use crate::error::NetError;
use crate::Net::Message::{header_for, Message};

/// Outgoing side of one connection: assigns message ids and pushes messages
/// into the connection's ring buffer. Cheap to clone and share across threads.
#[derive(Clone)]
pub struct PipeOut {
    connection_id: u16,
    ring: Arc<OutgoingRingBuffer>,
    next_message_id: Arc<AtomicU32>,
}

impl PipeOut {
    pub fn new(connection_id: u16, ring: Arc<OutgoingRingBuffer>) -> Self {
        Self {
            connection_id,
            ring,
            next_message_id: Arc::new(AtomicU32::new(1)),
        }
    }

    pub fn connection_id(&self) -> u16 {
        self.connection_id
    }

    pub fn ring_buffer(&self) -> &Arc<OutgoingRingBuffer> {
        &self.ring
    }

    fn next_id(&self) -> u32 {
        self.next_message_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Send a message, waiting as long as the ring buffer is full.
    ///
    /// # Arguments
    /// * `message` - Message to serialize
    ///
    /// # Returns
    /// The id written into the header (the request id for responses)
    pub fn push(&self, message: &dyn Message) -> Result<u32, NetError> {
        self.push_with(message, Backpressure::Block)
    }

    /// Send a message if there is room right now, `NetError::BufferFull` otherwise.
    pub fn try_push(&self, message: &dyn Message) -> Result<u32, NetError> {
        self.push_with(message, Backpressure::Fail)
    }

    /// Send a message, giving up with `NetError::Timeout` if no room frees up in time.
    pub fn push_timeout(&self, message: &dyn Message, timeout: Duration) -> Result<u32, NetError> {
        self.push_with(
            message,
            Backpressure::Deadline(std::time::Instant::now() + timeout, timeout),
        )
    }

    fn push_with(&self, message: &dyn Message, mode: Backpressure) -> Result<u32, NetError> {
        // Responses carry the request id and draw none of their own.
        let id = match message.response_to() {
            Some(request_id) => request_id,
            None => self.next_id(),
        };
        let header = header_for(message, id)?;
        self.ring.push_with(&header, message, mode)?;
        Ok(header.message_id)
    }
}

impl std::fmt::Debug for PipeOut {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipeOut")
            .field("connection_id", &self.connection_id)
            .field("ring", &self.ring)
            .finish()
    }
}
