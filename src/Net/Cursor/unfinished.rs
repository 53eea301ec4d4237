use crate::Net::Message::Message;
use crate::Net::Structs::MessageHeader;

/// Where an interrupted import stopped.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ImportProgress {
    /// Unit-relative offset at which the interrupted value started.
    pub(crate) index: usize,
    /// Bits assembled so far of an interrupted primitive or compact number.
    pub(crate) primitive: u64,
    /// Array whose length prefix completed but whose elements did not.
    pub(crate) object: Option<PartialArray>,
}

impl ImportProgress {
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn has_partial_array(&self) -> bool {
        self.object.is_some()
    }
}

/// Raw little-endian bytes of an array being filled across raw buffers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct PartialArray {
    data: Vec<u8>,
    total: usize,
}

impl PartialArray {
    pub fn with_total(total: usize) -> Self {
        Self {
            data: Vec::with_capacity(total),
            total,
        }
    }

    #[inline]
    pub fn missing(&self) -> usize {
        self.total - self.data.len()
    }

    #[inline]
    pub fn extend(&mut self, bytes: &[u8]) {
        self.data.extend_from_slice(bytes);
    }

    #[inline]
    pub fn is_complete(&self) -> bool {
        self.data.len() == self.total
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }
}

/// Observable state of an incoming pipe between two raw buffers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipeState {
    Idle,
    AwaitingHeader,
    AwaitingPayload,
}

/// What an incoming pipe keeps of a header or payload that a raw buffer ended in.
///
/// Reset whenever a unit completes, populated when a buffer ends mid-value and
/// consumed by the next buffer.
#[derive(Default)]
pub struct UnfinishedOperation {
    header: Option<MessageHeader>,
    payload_pending: bool,
    message: Option<Box<dyn Message>>,
    discard: bool,
    bytes_copied: usize,
    progress: ImportProgress,
}

impl UnfinishedOperation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> PipeState {
        match (&self.header, self.payload_pending) {
            (None, _) => PipeState::Idle,
            (Some(_), false) => PipeState::AwaitingHeader,
            (Some(_), true) => PipeState::AwaitingPayload,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.header.is_none()
    }

    /// Bytes of the current unit consumed by earlier buffers.
    pub fn bytes_copied(&self) -> usize {
        self.bytes_copied
    }

    pub fn header(&self) -> Option<&MessageHeader> {
        self.header.as_ref()
    }

    pub fn progress(&self) -> &ImportProgress {
        &self.progress
    }

    pub fn is_discarding(&self) -> bool {
        self.discard
    }

    /// Whether a message instance exists for the pending payload.
    pub fn was_message_created(&self) -> bool {
        self.message.is_some()
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub(crate) fn save_header(
        &mut self,
        header: MessageHeader,
        bytes_copied: usize,
        progress: ImportProgress,
    ) {
        self.header = Some(header);
        self.payload_pending = false;
        self.message = None;
        self.discard = false;
        self.bytes_copied = bytes_copied;
        self.progress = progress;
    }

    pub(crate) fn save_payload(
        &mut self,
        header: MessageHeader,
        message: Option<Box<dyn Message>>,
        bytes_copied: usize,
        progress: ImportProgress,
    ) {
        self.discard = message.is_none();
        self.header = Some(header);
        self.payload_pending = true;
        self.message = message;
        self.bytes_copied = bytes_copied;
        self.progress = progress;
    }

    /// Take a partially read header, leaving the record empty.
    pub(crate) fn take_header(&mut self) -> Option<(MessageHeader, usize, ImportProgress)> {
        if self.payload_pending {
            return None;
        }
        let header = self.header.take()?;
        let taken = (header, self.bytes_copied, std::mem::take(&mut self.progress));
        self.reset();
        Some(taken)
    }

    /// Take a pending payload: header, message (`None` when discarding), bytes
    /// already consumed and saved progress.
    pub(crate) fn take_payload(
        &mut self,
    ) -> Option<(MessageHeader, Option<Box<dyn Message>>, usize, ImportProgress)> {
        if !self.payload_pending {
            return None;
        }
        let header = self.header.take()?;
        let taken = (
            header,
            self.message.take(),
            self.bytes_copied,
            std::mem::take(&mut self.progress),
        );
        self.reset();
        Some(taken)
    }
}

impl std::fmt::Debug for UnfinishedOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        crate::Debug::StructDebug::debug_unfinished_operation(self, f)
    }
}
