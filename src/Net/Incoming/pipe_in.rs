use std::fmt::Write as _;
use std::sync::Arc;

use tracing::{debug, error, trace, warn};

use super::buffer::IncomingBuffer;
use super::handlers::{HandlerJob, JobKind, MessageHandlers};
use super::slots::BufferSlots;
use crate::error::{ImportError, NetError};
use crate::Core::NetMetrics;
use crate::Net::collaborators::{BufferPool, FlowControl, MessageDirectory, ResponseCorrelator};
use crate::Net::Cursor::{
    DirectImporter, ImportProgress, Importer, PipeState, UnderflowImporter, UnfinishedOperation,
};
use crate::Net::Message::{Message, ReceivedMessage};
use crate::Net::Structs::MessageHeader;

/// Bytes shown after a bad header in corruption reports.
const EXCERPT_LEN: usize = 64;

/// Incoming side of one connection: turns raw buffers, fragmented at
/// arbitrary byte boundaries, back into messages.
///
/// Driven by a single scanning thread through [`process_buffer`](Self::process_buffer).
/// Decoding happens on that thread; receiver callbacks run on the
/// [`MessageHandlers`] pool.
pub struct PipeIn {
    connection_id: u16,
    directory: Arc<dyn MessageDirectory>,
    correlator: Arc<dyn ResponseCorrelator>,
    handlers: Arc<MessageHandlers>,
    pool: Arc<dyn BufferPool>,
    flow: Arc<dyn FlowControl>,
    metrics: Arc<NetMetrics>,
    slots: Arc<BufferSlots>,
    next_slot: usize,
    unfinished: UnfinishedOperation,
    connected: bool,
    corrupted: bool,
}

impl PipeIn {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        connection_id: u16,
        receive_slots: usize,
        directory: Arc<dyn MessageDirectory>,
        correlator: Arc<dyn ResponseCorrelator>,
        handlers: Arc<MessageHandlers>,
        pool: Arc<dyn BufferPool>,
        flow: Arc<dyn FlowControl>,
        metrics: Arc<NetMetrics>,
    ) -> Self {
        let slots = Arc::new(BufferSlots::new(
            receive_slots.max(1),
            handlers.thread_count(),
            Arc::clone(&pool),
            Arc::clone(&metrics),
        ));
        Self {
            connection_id,
            directory,
            correlator,
            handlers,
            pool,
            flow,
            metrics,
            slots,
            next_slot: 0,
            unfinished: UnfinishedOperation::new(),
            connected: true,
            corrupted: false,
        }
    }

    pub fn connection_id(&self) -> u16 {
        self.connection_id
    }

    pub fn state(&self) -> PipeState {
        self.unfinished.state()
    }

    pub fn unfinished(&self) -> &UnfinishedOperation {
        &self.unfinished
    }

    pub fn slots(&self) -> &Arc<BufferSlots> {
        &self.slots
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn set_connected(&mut self, connected: bool) {
        self.connected = connected;
    }

    pub fn is_corrupted(&self) -> bool {
        self.corrupted
    }

    /// Consume one raw buffer from the transport.
    ///
    /// Every complete message in it is decoded and dispatched; a header or
    /// payload cut off at the end is kept and continued by the next call.
    /// The buffer returns to its pool once all handlers of its messages are done.
    ///
    /// # Returns
    /// An error when the stream is corrupted. The pipe then refuses further
    /// buffers with `NetError::PipeCorrupted`.
    pub fn process_buffer(&mut self, buffer: IncomingBuffer) -> Result<(), NetError> {
        if self.corrupted {
            self.pool.return_buffer(buffer);
            return Err(NetError::PipeCorrupted(self.connection_id));
        }
        let len = buffer.len();
        if len == 0 {
            warn!(connection = self.connection_id, "discarding empty receive buffer");
            self.pool.return_buffer(buffer);
            return Ok(());
        }
        self.metrics.buffer_received(len);
        self.flow.data_received(len);

        let slot = self.next_slot;
        self.next_slot = (self.next_slot + 1) % self.slots.len();
        let buffer = Arc::new(buffer);
        self.slots.enter(slot, Arc::clone(&buffer));
        let result = self.scan(buffer.bytes(), slot);
        drop(buffer);
        self.slots.leave(slot);

        if let Err(err) = &result {
            self.corrupted = true;
            self.unfinished.reset();
            error!(
                connection = self.connection_id,
                error = %err,
                "incoming stream corrupted, closing pipe"
            );
        }
        result
    }

    fn scan(&mut self, bytes: &[u8], slot: usize) -> Result<(), NetError> {
        let mut position = 0;
        loop {
            if let Some((header, message, copied, progress)) = self.unfinished.take_payload() {
                let message = self.recheck_request(&header, message);
                let source = &bytes[position..];
                match self.read_payload(source, header, message, copied, progress, slot)? {
                    Some(consumed) => position += consumed,
                    None => return Ok(()),
                }
            }
            if position == bytes.len() {
                return Ok(());
            }

            let Some((header, consumed)) = self.read_header(&bytes[position..])? else {
                return Ok(());
            };
            position += consumed;
            self.check_header(&header, &bytes[position..])?;

            let message = self.create_message(&header)?;
            let progress = ImportProgress::default();
            match self.read_payload(&bytes[position..], header, message, 0, progress, slot)? {
                Some(consumed) => position += consumed,
                None => return Ok(()),
            }
        }
    }

    /// Read a header, continuing one cut off by the previous buffer.
    /// `None` means this buffer ended inside it.
    fn read_header(&mut self, source: &[u8]) -> Result<Option<(MessageHeader, usize)>, NetError> {
        let (mut header, copied, mut progress) = self.unfinished.take_header().unwrap_or_default();
        let (outcome, consumed) = if copied == 0 {
            let mut importer = DirectImporter::new(source, &mut progress);
            (header.import(&mut importer), importer.consumed())
        } else {
            let mut importer = UnderflowImporter::new(source, copied, &mut progress);
            (header.import(&mut importer), importer.consumed())
        };

        match outcome {
            Ok(()) => Ok(Some((header, consumed))),
            Err(ImportError::Underflow) => {
                trace!(copied = copied + consumed, "buffer ended inside a message header");
                self.unfinished.save_header(header, copied + consumed, progress);
                Ok(None)
            }
            Err(ImportError::Malformed(what)) => {
                Err(NetError::Corrupted(format!("{what} in message header")))
            }
        }
    }

    fn check_header(&self, header: &MessageHeader, following: &[u8]) -> Result<(), NetError> {
        if header.is_invalid() {
            return Err(NetError::Corrupted(format!(
                "invalid message header {header}, type 0/subtype 0 is never sent; next bytes: {}",
                hex_excerpt(following)
            )));
        }
        if header.is_keep_alive() || self.directory.contains(header.message_type, header.subtype) {
            return Ok(());
        }
        Err(self.unknown_type(header, following))
    }

    fn unknown_type(&self, header: &MessageHeader, following: &[u8]) -> NetError {
        NetError::UnknownMessageType {
            message_type: header.message_type,
            subtype: header.subtype,
            excerpt: hex_excerpt(following),
        }
    }

    /// Instance to decode the payload into, or `None` when the payload is to be
    /// skipped (keep-alive, aborted, or a response nobody waits for any more).
    fn create_message(&self, header: &MessageHeader) -> Result<Option<Box<dyn Message>>, NetError> {
        if header.is_keep_alive() || header.is_aborted() {
            return Ok(None);
        }
        let mut message = self
            .directory
            .instantiate(header.message_type, header.subtype)
            .ok_or_else(|| self.unknown_type(header, &[]))?;
        if header.is_response() {
            match self.correlator.lookup(header.message_id) {
                Some(request) => message.bind_request(&request),
                None => return Ok(None),
            }
        }
        Ok(Some(message))
    }

    /// A response split across buffers is dropped if its request went away meanwhile.
    fn recheck_request(
        &self,
        header: &MessageHeader,
        message: Option<Box<dyn Message>>,
    ) -> Option<Box<dyn Message>> {
        let message = message?;
        if header.is_response() && self.correlator.lookup(header.message_id).is_none() {
            return None;
        }
        Some(message)
    }

    /// Decode (or skip) a payload, continuing `copied` bytes in. Returns the
    /// bytes consumed from `source`, or `None` if it ended inside the payload.
    fn read_payload(
        &mut self,
        source: &[u8],
        header: MessageHeader,
        message: Option<Box<dyn Message>>,
        copied: usize,
        mut progress: ImportProgress,
        slot: usize,
    ) -> Result<Option<usize>, NetError> {
        let payload_size = header.payload_size as usize;
        let remaining = payload_size - copied;
        let available = remaining.min(source.len());

        let Some(mut message) = message else {
            if available < remaining {
                self.unfinished
                    .save_payload(header, None, copied + available, ImportProgress::default());
                return Ok(None);
            }
            self.skipped(&header);
            return Ok(Some(available));
        };

        let region = &source[..available];
        let (outcome, consumed) = if copied == 0 {
            let mut importer = DirectImporter::new(region, &mut progress);
            (message.read_payload(&mut importer), importer.consumed())
        } else {
            let mut importer = UnderflowImporter::new(region, copied, &mut progress);
            (message.read_payload(&mut importer), importer.consumed())
        };

        match outcome {
            Ok(()) => {
                let read = copied + consumed;
                let reported = message.payload_length();
                if read != payload_size || reported != payload_size {
                    return Err(NetError::PayloadSizeMismatch {
                        message_type: header.message_type,
                        subtype: header.subtype,
                        message_id: header.message_id,
                        declared: payload_size,
                        actual: if read != payload_size { read } else { reported },
                    });
                }
                self.dispatch(header, message, slot);
                Ok(Some(consumed))
            }
            Err(ImportError::Underflow) if available == remaining => Err(NetError::Corrupted(
                format!("message {header} reads past the end of its payload"),
            )),
            Err(ImportError::Underflow) => {
                trace!(%header, copied = copied + available, "buffer ended inside a payload");
                self.unfinished
                    .save_payload(header, Some(message), copied + available, progress);
                Ok(None)
            }
            Err(ImportError::Malformed(what)) => Err(NetError::Corrupted(format!(
                "{what} in payload of message {header}"
            ))),
        }
    }

    fn skipped(&self, header: &MessageHeader) {
        if header.is_keep_alive() {
            trace!(connection = self.connection_id, "keep-alive received");
            return;
        }
        self.metrics.message_discarded();
        if header.is_aborted() {
            debug!(%header, "skipped payload of aborted message");
        } else {
            debug!(%header, "no outstanding request for response, dropped");
        }
    }

    fn dispatch(&self, header: MessageHeader, message: Box<dyn Message>, slot: usize) {
        self.metrics.message_received();
        let kind = if header.is_response() {
            JobKind::Response(Arc::clone(&self.correlator))
        } else {
            JobKind::Deliver
        };
        let job = HandlerJob {
            received: ReceivedMessage {
                header,
                source: self.connection_id,
                message,
            },
            kind,
            slot: self.slots.retain(slot),
        };
        self.handlers.submit(job);
    }
}

fn hex_excerpt(bytes: &[u8]) -> String {
    let shown = &bytes[..bytes.len().min(EXCERPT_LEN)];
    let mut out = String::with_capacity(shown.len() * 3 + 3);
    for (i, byte) in shown.iter().enumerate() {
        if i > 0 {
            out.push(' ');
        }
        let _ = write!(out, "{byte:02x}");
    }
    if bytes.len() > EXCERPT_LEN {
        out.push_str(" ..");
    }
    if out.is_empty() {
        out.push_str("<none>");
    }
    out
}

impl std::fmt::Debug for PipeIn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        crate::Debug::StructDebug::debug_pipe_in(self, f)
    }
}
