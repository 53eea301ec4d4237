//! Narrow interfaces to the systems around the transport core.

use std::any::Any;
use std::sync::Arc;

use crate::Net::Incoming::IncomingBuffer;
use crate::Net::Message::{Message, ReceivedMessage};

/// Registry of application message types.
pub trait MessageDirectory: Send + Sync {
    fn contains(&self, message_type: u8, subtype: u8) -> bool;

    /// Fresh, default-initialized instance to decode a payload into.
    fn instantiate(&self, message_type: u8, subtype: u8) -> Option<Box<dyn Message>>;
}

/// An outstanding request waiting for its response.
pub trait PendingRequest: Send + Sync {
    fn request_id(&self) -> u32;

    fn as_any(&self) -> &dyn Any;
}

/// Bookkeeping of outstanding requests, keyed by request id.
pub trait ResponseCorrelator: Send + Sync {
    fn lookup(&self, request_id: u32) -> Option<Arc<dyn PendingRequest>>;

    fn remove(&self, request_id: u32) -> Option<Arc<dyn PendingRequest>>;

    fn fulfill(&self, request: Arc<dyn PendingRequest>, response: ReceivedMessage);
}

/// Owner of raw receive buffers. Every buffer handed to
/// `PipeIn::process_buffer` comes back through here exactly once.
pub trait BufferPool: Send + Sync {
    fn return_buffer(&self, buffer: IncomingBuffer);
}

/// Byte-count notifications for a flow-control window.
pub trait FlowControl: Send + Sync {
    /// Bytes committed to the outgoing ring buffer.
    fn data_posted(&self, _bytes: usize) {}

    /// Bytes handed to the transport by a drain.
    fn data_sent(&self, _bytes: usize) {}

    /// Bytes of a raw buffer accepted by the incoming pipe.
    fn data_received(&self, _bytes: usize) {}
}

/// Flow control that ignores every notification.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoFlowControl;

impl FlowControl for NoFlowControl {}

/// Correlator for connections that never send requests. Every response is stale.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoCorrelator;

impl ResponseCorrelator for NoCorrelator {
    fn lookup(&self, _request_id: u32) -> Option<Arc<dyn PendingRequest>> {
        None
    }

    fn remove(&self, _request_id: u32) -> Option<Arc<dyn PendingRequest>> {
        None
    }

    fn fulfill(&self, _request: Arc<dyn PendingRequest>, _response: ReceivedMessage) {}
}

/// Pool that frees buffers instead of recycling them.
#[derive(Debug, Default, Clone, Copy)]
pub struct DropBufferPool;

impl BufferPool for DropBufferPool {
    fn return_buffer(&self, buffer: IncomingBuffer) {
        drop(buffer);
    }
}
