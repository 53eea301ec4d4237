//! Compact (LEB128) encoding of unsigned 32-bit numbers: seven data bits per
//! byte, least significant group first, high bit set on every byte but the last.

/// Longest encoding of a `u32`.
pub const MAX_COMPACT_BYTES: usize = 5;

/// Number of bytes `value` occupies on the wire.
#[inline]
pub const fn compact_size(value: u32) -> usize {
    match value {
        0..=0x7F => 1,
        0x80..=0x3FFF => 2,
        0x4000..=0x1F_FFFF => 3,
        0x20_0000..=0x0FFF_FFFF => 4,
        _ => 5,
    }
}

/// Encode `value` into `out`, returning the used prefix.
#[inline]
pub fn encode_compact(mut value: u32, out: &mut [u8; MAX_COMPACT_BYTES]) -> &[u8] {
    let mut len = 0;
    loop {
        let byte = (value & 0x7F) as u8;
        value >>= 7;
        if value == 0 {
            out[len] = byte;
            len += 1;
            return &out[..len];
        }
        out[len] = byte | 0x80;
        len += 1;
    }
}

/// Incremental decoder state: accumulated bits and bytes consumed so far.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct CompactPartial {
    pub bits: u64,
    pub bytes: usize,
}

/// Result of feeding one byte into a [`CompactPartial`].
pub(crate) enum CompactStep {
    More,
    Done(u32),
    Malformed,
}

impl CompactPartial {
    pub fn new(bits: u64, bytes: usize) -> Self {
        Self { bits, bytes }
    }

    #[inline]
    pub fn push(&mut self, byte: u8) -> CompactStep {
        if self.bytes >= MAX_COMPACT_BYTES {
            return CompactStep::Malformed;
        }
        self.bits |= u64::from(byte & 0x7F) << (7 * self.bytes);
        self.bytes += 1;
        if byte & 0x80 != 0 {
            return CompactStep::More;
        }
        match u32::try_from(self.bits) {
            Ok(value) => CompactStep::Done(value),
            Err(_) => CompactStep::Malformed,
        }
    }
}
