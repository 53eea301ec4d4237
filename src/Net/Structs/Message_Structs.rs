use crate::error::{ImportError, Overflow};
use crate::Net::Cursor::compact::compact_size;
use crate::Net::Cursor::{Exporter, Importer};

/// Message type reserved for transport-internal messages.
pub const DEFAULT_MESSAGES_TYPE: u8 = 0;
/// Subtype of the empty keep-alive message, dropped by the receiver.
pub const SUBTYPE_KEEP_ALIVE: u8 = 1;

/// Header bytes other than the compact payload length: type, subtype, flags, id.
pub const HEADER_FIXED_SIZE: usize = 7;

/// Per-message flag bits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct MessageFlags(pub u8);

impl MessageFlags {
    pub const NONE: MessageFlags = MessageFlags(0);
    /// The message answers a request; its id is the request's id.
    pub const RESPONSE: MessageFlags = MessageFlags(0x01);
    /// Exclusive / high priority delivery.
    pub const EXCLUSIVE: MessageFlags = MessageFlags(0x02);
    /// Sender gave up on the message; the receiver skips its payload.
    pub const ABORTED: MessageFlags = MessageFlags(0x04);

    #[inline]
    pub const fn contains(self, other: MessageFlags) -> bool {
        self.0 & other.0 == other.0
    }

    #[inline]
    pub const fn union(self, other: MessageFlags) -> MessageFlags {
        MessageFlags(self.0 | other.0)
    }

    #[inline]
    pub const fn bits(self) -> u8 {
        self.0
    }
}

impl std::ops::BitOr for MessageFlags {
    type Output = MessageFlags;

    fn bitor(self, rhs: MessageFlags) -> MessageFlags {
        self.union(rhs)
    }
}

/// Fixed-order header preceding every payload on the wire:
/// `type u8 | subtype u8 | flags u8 | payload_size compact | message_id u32 LE`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MessageHeader {
    pub message_type: u8,
    pub subtype: u8,
    pub flags: MessageFlags,
    pub payload_size: u32,
    pub message_id: u32,
}

impl MessageHeader {
    pub fn new(
        message_type: u8,
        subtype: u8,
        flags: MessageFlags,
        payload_size: u32,
        message_id: u32,
    ) -> Self {
        Self {
            message_type,
            subtype,
            flags,
            payload_size,
            message_id,
        }
    }

    /// Bytes the header occupies on the wire.
    #[inline]
    pub fn serialized_size(&self) -> usize {
        HEADER_FIXED_SIZE + compact_size(self.payload_size)
    }

    /// Header plus payload.
    #[inline]
    pub fn message_size(&self) -> usize {
        self.serialized_size() + self.payload_size as usize
    }

    #[inline]
    pub fn is_response(&self) -> bool {
        self.flags.contains(MessageFlags::RESPONSE)
    }

    #[inline]
    pub fn is_exclusive(&self) -> bool {
        self.flags.contains(MessageFlags::EXCLUSIVE)
    }

    #[inline]
    pub fn is_aborted(&self) -> bool {
        self.flags.contains(MessageFlags::ABORTED)
    }

    /// Type 0 / subtype 0 never goes on the wire; seeing it means the stream
    /// is out of step.
    #[inline]
    pub fn is_invalid(&self) -> bool {
        self.message_type == DEFAULT_MESSAGES_TYPE && self.subtype == 0
    }

    #[inline]
    pub fn is_keep_alive(&self) -> bool {
        self.message_type == DEFAULT_MESSAGES_TYPE && self.subtype == SUBTYPE_KEEP_ALIVE
    }

    pub fn export(&self, exporter: &mut dyn Exporter) -> Result<(), Overflow> {
        exporter.write_u8(self.message_type)?;
        exporter.write_u8(self.subtype)?;
        exporter.write_u8(self.flags.bits())?;
        exporter.write_compact_number(self.payload_size)?;
        exporter.write_u32(self.message_id)
    }

    /// Read (or resume reading) the header fields in wire order.
    pub fn import(&mut self, importer: &mut dyn Importer) -> Result<(), ImportError> {
        importer.read_u8(&mut self.message_type)?;
        importer.read_u8(&mut self.subtype)?;
        importer.read_u8(&mut self.flags.0)?;
        importer.read_compact(&mut self.payload_size)?;
        importer.read_u32(&mut self.message_id)
    }
}

impl std::fmt::Display for MessageHeader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "[type {}, subtype {}, flags {:#04x}, id {}, payload {} bytes]",
            self.message_type,
            self.subtype,
            self.flags.bits(),
            self.message_id,
            self.payload_size
        )
    }
}
