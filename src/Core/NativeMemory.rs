// Native byte region backing the outgoing ring buffer and receive buffers.
// Uses an anonymous private mmap on Linux, an aligned heap allocation elsewhere.

use std::ptr::NonNull;

use crate::error::NetError;

/// Alignment of every native region, one cache-line pair.
pub const NATIVE_ALIGNMENT: usize = 128;

/// Owned, fixed-size native byte region.
///
/// Access is offset based. Shared access from several threads goes through the
/// `unsafe` range accessors, whose callers guarantee that concurrently used
/// ranges are disjoint (the ring buffer's reservation protocol does exactly that).
pub struct NativeBuffer {
    ptr: NonNull<u8>,
    size: usize,
    mapped_len: usize,
}

unsafe impl Send for NativeBuffer {}
unsafe impl Sync for NativeBuffer {}

impl NativeBuffer {
    /// Allocate a zeroed region of `size` bytes.
    ///
    /// # Arguments
    /// * `size` - Length of the region in bytes, must be non-zero
    ///
    /// # Returns
    /// The region, or `NetError::Io` if the OS refused the mapping
    pub fn allocate(size: usize) -> Result<Self, NetError> {
        if size == 0 {
            return Err(NetError::config("native buffer size must be positive"));
        }
        let mapped_len = (size + NATIVE_ALIGNMENT - 1) & !(NATIVE_ALIGNMENT - 1);
        let ptr = Self::map(mapped_len)?;
        Ok(Self {
            ptr,
            size,
            mapped_len,
        })
    }

    /// Allocate a region whose length must be a power of two, as ring buffers require.
    pub fn allocate_ring(size: usize) -> Result<Self, NetError> {
        if !size.is_power_of_two() {
            return Err(NetError::config(format!(
                "ring buffer size {size} is not a power of two"
            )));
        }
        Self::allocate(size)
    }

    #[cfg(target_os = "linux")]
    fn map(len: usize) -> Result<NonNull<u8>, NetError> {
        let ptr = unsafe {
            libc::mmap(
                std::ptr::null_mut(),
                len,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
                -1,
                0,
            )
        };
        if ptr == libc::MAP_FAILED {
            return Err(std::io::Error::last_os_error().into());
        }
        NonNull::new(ptr as *mut u8)
            .ok_or_else(|| NetError::Io(std::io::Error::other("mmap returned a null mapping")))
    }

    #[cfg(not(target_os = "linux"))]
    fn map(len: usize) -> Result<NonNull<u8>, NetError> {
        let layout = std::alloc::Layout::from_size_align(len, NATIVE_ALIGNMENT)
            .map_err(|err| NetError::config(format!("invalid native buffer layout: {err}")))?;
        let ptr = unsafe { std::alloc::alloc_zeroed(layout) };
        NonNull::new(ptr).ok_or_else(|| {
            NetError::Io(std::io::Error::new(
                std::io::ErrorKind::OutOfMemory,
                "failed to allocate native buffer",
            ))
        })
    }

    #[inline]
    pub fn size(&self) -> usize {
        self.size
    }

    /// Whole region, for exclusive owners.
    pub fn as_slice(&self) -> &[u8] {
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr(), self.size) }
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        unsafe { std::slice::from_raw_parts_mut(self.ptr.as_ptr(), self.size) }
    }

    /// Mutable view of `[offset, offset + len)`.
    ///
    /// # Safety
    /// No other live reference may overlap the range for the lifetime of the
    /// returned slice.
    #[inline]
    #[allow(clippy::mut_from_ref)]
    pub unsafe fn range_mut(&self, offset: usize, len: usize) -> &mut [u8] {
        debug_assert!(
            offset + len <= self.size,
            "range {offset}+{len} outside native buffer of {} bytes",
            self.size
        );
        std::slice::from_raw_parts_mut(self.ptr.as_ptr().add(offset), len)
    }

    /// Shared view of `[offset, offset + len)`.
    ///
    /// # Safety
    /// No mutable reference may overlap the range for the lifetime of the
    /// returned slice.
    #[inline]
    pub unsafe fn range(&self, offset: usize, len: usize) -> &[u8] {
        debug_assert!(
            offset + len <= self.size,
            "range {offset}+{len} outside native buffer of {} bytes",
            self.size
        );
        std::slice::from_raw_parts(self.ptr.as_ptr().add(offset), len)
    }
}

impl Drop for NativeBuffer {
    #[cfg(target_os = "linux")]
    fn drop(&mut self) {
        unsafe {
            libc::munmap(self.ptr.as_ptr() as *mut libc::c_void, self.mapped_len);
        }
    }

    #[cfg(not(target_os = "linux"))]
    fn drop(&mut self) {
        if let Ok(layout) = std::alloc::Layout::from_size_align(self.mapped_len, NATIVE_ALIGNMENT) {
            unsafe { std::alloc::dealloc(self.ptr.as_ptr(), layout) };
        }
    }
}

impl std::fmt::Debug for NativeBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        crate::Debug::StructDebug::debug_native_buffer(self, f)
    }
}
