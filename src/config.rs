use serde::Deserialize;
use tracing::warn;

use crate::error::NetError;
use crate::Net::Outgoing::layout::MAX_UNCOMMITTED_SLOTS;

/// Largest ring buffer a connection may use. Positions are 31-bit, so the
/// distance between `back` and any front must stay below 2^31.
pub const MAX_RING_BUFFER_SIZE: usize = 1 << 30;

/// Largest single message, header included.
pub const MAX_MESSAGE_SIZE: usize = 1 << 30;

/// Tunables of one connection's transport core.
///
/// Every field has a default, so a TOML document only needs the keys it
/// changes:
///
/// ```toml
/// ring_buffer_size = 4194304
/// handler_threads = 4
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct NetConfig {
    /// Capacity of the outgoing ring buffer in bytes. Must be a power of two.
    pub ring_buffer_size: usize,
    /// Threads in the message handler pool.
    pub handler_threads: usize,
    /// Raw receive buffers a pipe may keep in flight.
    pub receive_slots: usize,
    /// Length of the uncommitted-size table, i.e. how many producers may be
    /// between reservation and commit at once. Rounded up to a power of two.
    pub max_concurrent_producers: usize,
    /// Park duration of a producer waiting for free space.
    pub full_buffer_park_ns: u64,
    /// Capacity of the handler job queue.
    pub handler_queue_depth: usize,
}

impl Default for NetConfig {
    fn default() -> Self {
        Self {
            ring_buffer_size: 2 * 1024 * 1024, // 2MB default
            handler_threads: 2,
            receive_slots: 8,
            max_concurrent_producers: 1000,
            full_buffer_park_ns: 100,
            handler_queue_depth: 4096,
        }
    }
}

impl NetConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse and validate a TOML document.
    pub fn from_toml_str(raw: &str) -> Result<Self, NetError> {
        let config: NetConfig = toml::from_str(raw)
            .map_err(|err| NetError::config(format!("failed to parse transport config: {err}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_ring_buffer_size(mut self, size: usize) -> Self {
        self.ring_buffer_size = size;
        self
    }

    pub fn with_handler_threads(mut self, threads: usize) -> Self {
        self.handler_threads = threads;
        self
    }

    pub fn with_receive_slots(mut self, slots: usize) -> Self {
        self.receive_slots = slots;
        self
    }

    pub fn with_max_concurrent_producers(mut self, producers: usize) -> Self {
        self.max_concurrent_producers = producers;
        self
    }

    pub fn with_full_buffer_park_ns(mut self, nanos: u64) -> Self {
        self.full_buffer_park_ns = nanos;
        self
    }

    pub fn with_handler_queue_depth(mut self, depth: usize) -> Self {
        self.handler_queue_depth = depth;
        self
    }

    pub fn validate(&self) -> Result<(), NetError> {
        if !self.ring_buffer_size.is_power_of_two() {
            return Err(NetError::config(format!(
                "ring buffer size {} is not a power of two",
                self.ring_buffer_size
            )));
        }
        if self.ring_buffer_size > MAX_RING_BUFFER_SIZE {
            return Err(NetError::config(format!(
                "ring buffer size {} exceeds the maximum of {} bytes",
                self.ring_buffer_size, MAX_RING_BUFFER_SIZE
            )));
        }
        if self.handler_threads == 0 {
            return Err(NetError::config("handler pool needs at least one thread"));
        }
        if self.receive_slots == 0 {
            return Err(NetError::config("at least one receive slot is required"));
        }
        if self.max_concurrent_producers < 2 {
            return Err(NetError::config(
                "uncommitted-size table must hold at least two entries",
            ));
        }
        if self.max_concurrent_producers > MAX_UNCOMMITTED_SLOTS {
            return Err(NetError::config(format!(
                "uncommitted-size table of {} entries exceeds the maximum of {}",
                self.max_concurrent_producers, MAX_UNCOMMITTED_SLOTS
            )));
        }
        if self.handler_queue_depth == 0 {
            return Err(NetError::config("handler queue depth must be positive"));
        }
        if self.ring_buffer_size < 1024 {
            warn!(
                size = self.ring_buffer_size,
                "very small ring buffer, most messages will take the large-message path"
            );
        }
        Ok(())
    }
}
