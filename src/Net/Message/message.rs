use std::any::Any;
use std::sync::Arc;

use crate::config::MAX_MESSAGE_SIZE;
use crate::error::{ImportError, NetError, Overflow};
use crate::Net::collaborators::PendingRequest;
use crate::Net::Cursor::{DirectExporter, Exporter, Importer, SizeCounter};
use crate::Net::Structs::{MessageFlags, MessageHeader, DEFAULT_MESSAGES_TYPE, SUBTYPE_KEEP_ALIVE};

/// An application message: typed payload plus the header fields the transport
/// derives from it.
///
/// `write_payload` must export exactly `payload_length()` bytes. `read_payload`
/// must issue the same sequence of reads the writer issued writes, so that a
/// payload split across raw buffers can be resumed.
pub trait Message: Send + 'static {
    fn message_type(&self) -> u8;

    fn subtype(&self) -> u8;

    fn flags(&self) -> MessageFlags {
        MessageFlags::NONE
    }

    /// Id of the request this message answers, for responses.
    fn response_to(&self) -> Option<u32> {
        None
    }

    fn payload_length(&self) -> usize;

    fn write_payload(&self, exporter: &mut dyn Exporter) -> Result<(), Overflow>;

    fn read_payload(&mut self, importer: &mut dyn Importer) -> Result<(), ImportError>;

    /// Called on a response before its payload is decoded, with the request it answers.
    fn bind_request(&mut self, _request: &Arc<dyn PendingRequest>) {}

    fn as_any(&self) -> &dyn Any;
}

/// Build the wire header for `message`. Responses carry the id of their request,
/// everything else `message_id`.
pub fn header_for(message: &dyn Message, message_id: u32) -> Result<MessageHeader, NetError> {
    let payload_size = message.payload_length();
    if payload_size > MAX_MESSAGE_SIZE {
        return Err(NetError::MessageTooLarge {
            message_type: message.message_type(),
            subtype: message.subtype(),
            size: payload_size,
            max: MAX_MESSAGE_SIZE,
        });
    }
    let (flags, id) = match message.response_to() {
        Some(request_id) => (message.flags() | MessageFlags::RESPONSE, request_id),
        None => (message.flags(), message_id),
    };
    Ok(MessageHeader::new(
        message.message_type(),
        message.subtype(),
        flags,
        payload_size as u32,
        id,
    ))
}

/// Header and payload into one exporter.
pub(crate) fn export_message(
    header: &MessageHeader,
    message: &dyn Message,
    exporter: &mut dyn Exporter,
) -> Result<(), Overflow> {
    header.export(exporter)?;
    message.write_payload(exporter)
}

/// Serialize `message` into a fresh vector, exactly as it appears in the ring buffer.
pub fn encode_message(message: &dyn Message, message_id: u32) -> Result<Vec<u8>, NetError> {
    let header = header_for(message, message_id)?;
    let size = header.message_size();
    let mut bytes = vec![0u8; size];
    let mut exporter = DirectExporter::new(&mut bytes);
    let result = export_message(&header, message, &mut exporter);
    if result.is_err() || exporter.written() != size {
        return Err(size_mismatch(&header, message));
    }
    Ok(bytes)
}

/// Number of bytes `write_payload` actually produces.
pub(crate) fn measure_payload(message: &dyn Message) -> usize {
    let mut counter = SizeCounter::new();
    // a counter never overflows
    let _ = message.write_payload(&mut counter);
    counter.written()
}

pub(crate) fn size_mismatch(header: &MessageHeader, message: &dyn Message) -> NetError {
    NetError::SerializationSizeMismatch {
        message_type: header.message_type,
        subtype: header.subtype,
        expected: header.payload_size as usize,
        written: measure_payload(message),
    }
}

/// A fully decoded incoming message.
pub struct ReceivedMessage {
    pub header: MessageHeader,
    /// Connection the message arrived on.
    pub source: u16,
    pub message: Box<dyn Message>,
}

impl ReceivedMessage {
    pub fn downcast_ref<T: Message>(&self) -> Option<&T> {
        self.message.as_any().downcast_ref::<T>()
    }
}

impl std::fmt::Debug for ReceivedMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReceivedMessage")
            .field("header", &self.header)
            .field("source", &self.source)
            .finish_non_exhaustive()
    }
}

/// Empty keep-alive message. Receivers drop it without dispatching.
#[derive(Debug, Default, Clone, Copy)]
pub struct KeepAlive;

impl Message for KeepAlive {
    fn message_type(&self) -> u8 {
        DEFAULT_MESSAGES_TYPE
    }

    fn subtype(&self) -> u8 {
        SUBTYPE_KEEP_ALIVE
    }

    fn payload_length(&self) -> usize {
        0
    }

    fn write_payload(&self, _exporter: &mut dyn Exporter) -> Result<(), Overflow> {
        Ok(())
    }

    fn read_payload(&mut self, _importer: &mut dyn Importer) -> Result<(), ImportError> {
        Ok(())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}
