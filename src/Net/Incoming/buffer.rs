use crate::error::NetError;
use crate::Core::NativeBuffer;

/// A raw receive buffer as filled by the transport: a native region plus the
/// number of valid bytes in it.
pub struct IncomingBuffer {
    region: NativeBuffer,
    len: usize,
}

impl IncomingBuffer {
    pub fn allocate(capacity: usize) -> Result<Self, NetError> {
        Ok(Self {
            region: NativeBuffer::allocate(capacity)?,
            len: 0,
        })
    }

    /// Buffer holding a copy of `bytes`.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, NetError> {
        let mut buffer = Self::allocate(bytes.len().max(1))?;
        buffer.region.as_mut_slice()[..bytes.len()].copy_from_slice(bytes);
        buffer.len = bytes.len();
        Ok(buffer)
    }

    /// Whole region, for the transport to read into. Follow with [`set_len`](Self::set_len).
    pub fn spare_mut(&mut self) -> &mut [u8] {
        self.region.as_mut_slice()
    }

    pub fn set_len(&mut self, len: usize) {
        debug_assert!(len <= self.region.size());
        self.len = len.min(self.region.size());
    }

    pub fn clear(&mut self) {
        self.len = 0;
    }

    pub fn bytes(&self) -> &[u8] {
        &self.region.as_slice()[..self.len]
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn capacity(&self) -> usize {
        self.region.size()
    }
}

impl std::fmt::Debug for IncomingBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IncomingBuffer")
            .field("len", &self.len)
            .field("capacity", &self.region.size())
            .finish()
    }
}
