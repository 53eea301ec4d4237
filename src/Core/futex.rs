// Blocking primitives used by the transport: futex waits on a 32-bit word and
// the fixed-duration park producers use while the ring buffer is full.

use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

/// Block while `word` still holds `expected`. May return spuriously, callers re-check.
#[cfg(target_os = "linux")]
pub fn futex_wait(word: &AtomicU32, expected: u32) {
    // Skip the syscall when the word already moved on
    if word.load(Ordering::Acquire) != expected {
        return;
    }

    unsafe {
        libc::syscall(
            libc::SYS_futex,
            word as *const AtomicU32 as *const u32,
            libc::FUTEX_WAIT | libc::FUTEX_PRIVATE_FLAG,
            expected,
            std::ptr::null::<libc::timespec>(),
            std::ptr::null::<u32>(),
            0u32,
        );
    }
}

/// Wake every thread blocked in `futex_wait` on `word`.
#[cfg(target_os = "linux")]
pub fn futex_wake_all(word: &AtomicU32) {
    unsafe {
        libc::syscall(
            libc::SYS_futex,
            word as *const AtomicU32 as *const u32,
            libc::FUTEX_WAKE | libc::FUTEX_PRIVATE_FLAG,
            i32::MAX,
            std::ptr::null::<libc::timespec>(),
            std::ptr::null::<u32>(),
            0u32,
        );
    }
}

#[cfg(not(target_os = "linux"))]
pub fn futex_wait(word: &AtomicU32, expected: u32) {
    if word.load(Ordering::Acquire) == expected {
        std::thread::yield_now();
    }
}

#[cfg(not(target_os = "linux"))]
pub fn futex_wake_all(_word: &AtomicU32) {}

/// Park the calling thread for roughly `nanos` nanoseconds.
#[inline]
pub fn park_nanos(nanos: u64) {
    std::thread::park_timeout(Duration::from_nanos(nanos));
}
