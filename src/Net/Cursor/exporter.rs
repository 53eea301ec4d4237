use super::compact::{encode_compact, MAX_COMPACT_BYTES};
use crate::error::Overflow;

/// Write side of the message codec.
///
/// Implementors only provide [`Exporter::write_bytes`] and
/// [`Exporter::written`]; every typed write is encoded little-endian on top of
/// them, so all exporters produce identical bytes for identical calls.
pub trait Exporter {
    /// Append raw bytes. On `Overflow` the bytes that fit have been written.
    fn write_bytes(&mut self, bytes: &[u8]) -> Result<(), Overflow>;

    /// Bytes accounted for so far (skipped bytes included).
    fn written(&self) -> usize;

    fn write_bool(&mut self, value: bool) -> Result<(), Overflow> {
        self.write_bytes(&[value as u8])
    }

    fn write_u8(&mut self, value: u8) -> Result<(), Overflow> {
        self.write_bytes(&[value])
    }

    fn write_i8(&mut self, value: i8) -> Result<(), Overflow> {
        self.write_bytes(&value.to_le_bytes())
    }

    fn write_u16(&mut self, value: u16) -> Result<(), Overflow> {
        self.write_bytes(&value.to_le_bytes())
    }

    fn write_i16(&mut self, value: i16) -> Result<(), Overflow> {
        self.write_bytes(&value.to_le_bytes())
    }

    fn write_u32(&mut self, value: u32) -> Result<(), Overflow> {
        self.write_bytes(&value.to_le_bytes())
    }

    fn write_i32(&mut self, value: i32) -> Result<(), Overflow> {
        self.write_bytes(&value.to_le_bytes())
    }

    fn write_u64(&mut self, value: u64) -> Result<(), Overflow> {
        self.write_bytes(&value.to_le_bytes())
    }

    fn write_i64(&mut self, value: i64) -> Result<(), Overflow> {
        self.write_bytes(&value.to_le_bytes())
    }

    fn write_f32(&mut self, value: f32) -> Result<(), Overflow> {
        self.write_bytes(&value.to_bits().to_le_bytes())
    }

    fn write_f64(&mut self, value: f64) -> Result<(), Overflow> {
        self.write_bytes(&value.to_bits().to_le_bytes())
    }

    fn write_compact_number(&mut self, value: u32) -> Result<(), Overflow> {
        let mut scratch = [0u8; MAX_COMPACT_BYTES];
        self.write_bytes(encode_compact(value, &mut scratch))
    }

    /// Compact length prefix followed by the bytes.
    fn write_byte_array(&mut self, bytes: &[u8]) -> Result<(), Overflow> {
        self.write_compact_number(bytes.len() as u32)?;
        self.write_bytes(bytes)
    }

    /// UTF-8 bytes with a compact byte-count prefix.
    fn write_string(&mut self, value: &str) -> Result<(), Overflow> {
        self.write_byte_array(value.as_bytes())
    }

    fn write_i16_array(&mut self, values: &[i16]) -> Result<(), Overflow> {
        self.write_compact_number(values.len() as u32)?;
        values.iter().try_for_each(|v| self.write_i16(*v))
    }

    fn write_i32_array(&mut self, values: &[i32]) -> Result<(), Overflow> {
        self.write_compact_number(values.len() as u32)?;
        values.iter().try_for_each(|v| self.write_i32(*v))
    }

    fn write_i64_array(&mut self, values: &[i64]) -> Result<(), Overflow> {
        self.write_compact_number(values.len() as u32)?;
        values.iter().try_for_each(|v| self.write_i64(*v))
    }
}

/// Exporter over one contiguous region.
pub struct DirectExporter<'a> {
    target: &'a mut [u8],
    position: usize,
}

impl<'a> DirectExporter<'a> {
    pub fn new(target: &'a mut [u8]) -> Self {
        Self {
            target,
            position: 0,
        }
    }

    /// Bytes still available.
    #[inline]
    pub fn remaining(&self) -> usize {
        self.target.len() - self.position
    }
}

impl Exporter for DirectExporter<'_> {
    #[inline]
    fn write_bytes(&mut self, bytes: &[u8]) -> Result<(), Overflow> {
        let fit = bytes.len().min(self.remaining());
        self.target[self.position..self.position + fit].copy_from_slice(&bytes[..fit]);
        self.position += fit;
        if fit < bytes.len() {
            return Err(Overflow);
        }
        Ok(())
    }

    #[inline]
    fn written(&self) -> usize {
        self.position
    }
}

/// Exporter over two regions written back to back: the tail of a ring buffer
/// followed by its head.
///
/// With a non-zero skip count the first `skip` bytes of output are discarded.
/// The large-message path uses that to re-run a message's serialization and
/// only emit the part that did not fit in earlier chunks.
pub struct WrapExporter<'a> {
    first: &'a mut [u8],
    second: &'a mut [u8],
    skip: usize,
    skipped: usize,
    position: usize,
}

impl<'a> WrapExporter<'a> {
    pub fn new(first: &'a mut [u8], second: &'a mut [u8]) -> Self {
        Self::with_skip(first, second, 0)
    }

    pub fn with_skip(first: &'a mut [u8], second: &'a mut [u8], skip: usize) -> Self {
        Self {
            first,
            second,
            skip,
            skipped: 0,
            position: 0,
        }
    }

    /// Room left across both regions.
    #[inline]
    pub fn remaining(&self) -> usize {
        self.first.len() + self.second.len() - self.position
    }

    /// Bytes actually stored in the regions by this exporter.
    #[inline]
    pub fn stored(&self) -> usize {
        self.position
    }

    fn store(&mut self, mut bytes: &[u8]) -> Result<(), Overflow> {
        if self.position < self.first.len() {
            let fit = bytes.len().min(self.first.len() - self.position);
            self.first[self.position..self.position + fit].copy_from_slice(&bytes[..fit]);
            self.position += fit;
            bytes = &bytes[fit..];
        }
        if bytes.is_empty() {
            return Ok(());
        }
        let offset = self.position - self.first.len();
        let fit = bytes.len().min(self.second.len() - offset);
        self.second[offset..offset + fit].copy_from_slice(&bytes[..fit]);
        self.position += fit;
        if fit < bytes.len() {
            return Err(Overflow);
        }
        Ok(())
    }
}

impl Exporter for WrapExporter<'_> {
    fn write_bytes(&mut self, mut bytes: &[u8]) -> Result<(), Overflow> {
        if self.skipped < self.skip {
            let drop = bytes.len().min(self.skip - self.skipped);
            self.skipped += drop;
            bytes = &bytes[drop..];
            if bytes.is_empty() {
                return Ok(());
            }
        }
        self.store(bytes)
    }

    #[inline]
    fn written(&self) -> usize {
        self.skipped + self.position
    }
}

/// Exporter that only counts. Used to measure a message before reserving space for it.
#[derive(Debug, Default)]
pub struct SizeCounter {
    count: usize,
}

impl SizeCounter {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Exporter for SizeCounter {
    #[inline]
    fn write_bytes(&mut self, bytes: &[u8]) -> Result<(), Overflow> {
        self.count += bytes.len();
        Ok(())
    }

    #[inline]
    fn written(&self) -> usize {
        self.count
    }
}
