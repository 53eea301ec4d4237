use std::sync::atomic::{AtomicBool, AtomicU32};
use std::sync::Arc;

use crossbeam_utils::CachePadded;
use tracing::debug;

use super::layout::{AtomicPosition, Position, UncommittedSizes};
use crate::config::NetConfig;
use crate::error::NetError;
use crate::Core::{NativeBuffer, NetMetrics};
use crate::Net::collaborators::{FlowControl, NoFlowControl};

/// Lock-free multi-producer / single-consumer byte ring for outgoing messages.
///
/// Producers reserve byte ranges by CAS on `front_producer`, serialize into
/// them concurrently and commit them through `front_consumer` strictly in
/// reservation order. One drain side reads `[back, front_consumer)` and frees
/// it with `shift_back`.
pub struct OutgoingRingBuffer {
    pub(crate) buffer: NativeBuffer,
    pub(crate) capacity: u32,
    pub(crate) mask: u32,
    /// First byte not yet handed to the transport. Drain side only.
    pub(crate) back: CachePadded<AtomicU32>,
    pub(crate) front_producer: AtomicPosition,
    pub(crate) front_consumer: AtomicPosition,
    /// Next slot to be committed.
    pub(crate) back_array: CachePadded<AtomicU32>,
    pub(crate) uncommitted: UncommittedSizes,
    pub(crate) large_message_active: CachePadded<AtomicBool>,
    pub(crate) draining: AtomicBool,
    pub(crate) park_ns: u64,
    pub(crate) metrics: Arc<NetMetrics>,
    pub(crate) flow: Arc<dyn FlowControl>,
}

impl OutgoingRingBuffer {
    /// Create a ring buffer from a validated configuration.
    ///
    /// # Arguments
    /// * `config` - Connection configuration; `ring_buffer_size` must be a power of two
    /// * `metrics` - Counter handle shared with the rest of the connection
    ///
    /// # Returns
    /// The ring buffer, or `NetError::Config` for an invalid configuration
    pub fn new(config: &NetConfig, metrics: Arc<NetMetrics>) -> Result<Self, NetError> {
        Self::with_flow_control(config, metrics, Arc::new(NoFlowControl))
    }

    pub fn with_flow_control(
        config: &NetConfig,
        metrics: Arc<NetMetrics>,
        flow: Arc<dyn FlowControl>,
    ) -> Result<Self, NetError> {
        config.validate()?;
        let buffer = NativeBuffer::allocate_ring(config.ring_buffer_size)?;
        let capacity = config.ring_buffer_size as u32;
        debug!(
            capacity,
            table = config.max_concurrent_producers,
            "outgoing ring buffer created"
        );
        Ok(Self {
            buffer,
            capacity,
            mask: capacity - 1,
            back: CachePadded::new(AtomicU32::new(0)),
            front_producer: AtomicPosition::new(Position::ZERO),
            front_consumer: AtomicPosition::new(Position::ZERO),
            back_array: CachePadded::new(AtomicU32::new(0)),
            uncommitted: UncommittedSizes::new(config.max_concurrent_producers),
            large_message_active: CachePadded::new(AtomicBool::new(false)),
            draining: AtomicBool::new(false),
            park_ns: config.full_buffer_park_ns,
            metrics,
            flow,
        })
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity as usize
    }

    pub fn metrics(&self) -> &Arc<NetMetrics> {
        &self.metrics
    }

    /// Current producer front (next byte and slot to be reserved).
    pub fn front_producer(&self) -> Position {
        self.front_producer.load()
    }

    /// Current commit front. The slot reads `COMMITTING` while a commit or
    /// large-message write is in progress.
    pub fn front_consumer(&self) -> Position {
        self.front_consumer.load()
    }

    pub fn back(&self) -> u32 {
        self.back.load(std::sync::atomic::Ordering::Acquire)
    }

    #[inline]
    pub(crate) fn offset(&self, position: u32) -> usize {
        (position & self.mask) as usize
    }
}

impl std::fmt::Debug for OutgoingRingBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        crate::Debug::StructDebug::debug_outgoing_ring_buffer(self, f)
    }
}
