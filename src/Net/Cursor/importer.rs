use super::compact::{CompactPartial, CompactStep};
use super::unfinished::{ImportProgress, PartialArray};
use crate::config::MAX_MESSAGE_SIZE;
use crate::error::ImportError;

/// Read side of the message codec.
///
/// Every read takes the value currently held by the destination field. An
/// importer resuming a message that was split across raw buffers hands that
/// value back for reads that already completed in an earlier buffer, so
/// `read_payload` implementations are written once, as straight-line code.
pub trait Importer {
    /// Little-endian primitive of `width` bytes (1..=8).
    fn read_primitive(&mut self, width: usize, current: u64) -> Result<u64, ImportError>;

    fn read_compact_number(&mut self, current: u32) -> Result<u32, ImportError>;

    /// Length-prefixed array of `element_width`-byte elements.
    ///
    /// `current_len` is the element count the destination already holds.
    /// Returns `None` when the array was read completely in an earlier buffer,
    /// otherwise the raw little-endian bytes of all elements.
    fn read_array_bytes(
        &mut self,
        element_width: usize,
        current_len: usize,
    ) -> Result<Option<Vec<u8>>, ImportError>;

    /// Bytes taken from the current source so far.
    fn consumed(&self) -> usize;

    fn read_bool(&mut self, value: &mut bool) -> Result<(), ImportError> {
        *value = self.read_primitive(1, u64::from(*value))? != 0;
        Ok(())
    }

    fn read_u8(&mut self, value: &mut u8) -> Result<(), ImportError> {
        *value = self.read_primitive(1, u64::from(*value))? as u8;
        Ok(())
    }

    fn read_i8(&mut self, value: &mut i8) -> Result<(), ImportError> {
        *value = self.read_primitive(1, u64::from(*value as u8))? as u8 as i8;
        Ok(())
    }

    fn read_u16(&mut self, value: &mut u16) -> Result<(), ImportError> {
        *value = self.read_primitive(2, u64::from(*value))? as u16;
        Ok(())
    }

    fn read_i16(&mut self, value: &mut i16) -> Result<(), ImportError> {
        *value = self.read_primitive(2, u64::from(*value as u16))? as u16 as i16;
        Ok(())
    }

    fn read_u32(&mut self, value: &mut u32) -> Result<(), ImportError> {
        *value = self.read_primitive(4, u64::from(*value))? as u32;
        Ok(())
    }

    fn read_i32(&mut self, value: &mut i32) -> Result<(), ImportError> {
        *value = self.read_primitive(4, u64::from(*value as u32))? as u32 as i32;
        Ok(())
    }

    fn read_u64(&mut self, value: &mut u64) -> Result<(), ImportError> {
        *value = self.read_primitive(8, *value)?;
        Ok(())
    }

    fn read_i64(&mut self, value: &mut i64) -> Result<(), ImportError> {
        *value = self.read_primitive(8, *value as u64)? as i64;
        Ok(())
    }

    fn read_f32(&mut self, value: &mut f32) -> Result<(), ImportError> {
        *value = f32::from_bits(self.read_primitive(4, u64::from(value.to_bits()))? as u32);
        Ok(())
    }

    fn read_f64(&mut self, value: &mut f64) -> Result<(), ImportError> {
        *value = f64::from_bits(self.read_primitive(8, value.to_bits())?);
        Ok(())
    }

    fn read_compact(&mut self, value: &mut u32) -> Result<(), ImportError> {
        *value = self.read_compact_number(*value)?;
        Ok(())
    }

    fn read_byte_array(&mut self, value: &mut Vec<u8>) -> Result<(), ImportError> {
        if let Some(raw) = self.read_array_bytes(1, value.len())? {
            *value = raw;
        }
        Ok(())
    }

    fn read_string(&mut self, value: &mut String) -> Result<(), ImportError> {
        if let Some(raw) = self.read_array_bytes(1, value.len())? {
            *value = String::from_utf8(raw)
                .map_err(|_| ImportError::Malformed("string is not valid UTF-8"))?;
        }
        Ok(())
    }

    fn read_i16_array(&mut self, value: &mut Vec<i16>) -> Result<(), ImportError> {
        if let Some(raw) = self.read_array_bytes(2, value.len())? {
            *value = raw
                .chunks_exact(2)
                .map(|c| i16::from_le_bytes([c[0], c[1]]))
                .collect();
        }
        Ok(())
    }

    fn read_i32_array(&mut self, value: &mut Vec<i32>) -> Result<(), ImportError> {
        if let Some(raw) = self.read_array_bytes(4, value.len())? {
            *value = raw
                .chunks_exact(4)
                .map(|c| i32::from_le_bytes([c[0], c[1], c[2], c[3]]))
                .collect();
        }
        Ok(())
    }

    fn read_i64_array(&mut self, value: &mut Vec<i64>) -> Result<(), ImportError> {
        if let Some(raw) = self.read_array_bytes(8, value.len())? {
            *value = raw.chunks_exact(8).map(|c| le_bits(c) as i64).collect();
        }
        Ok(())
    }
}

/// Little-endian value of up to eight bytes.
#[inline]
pub(crate) fn le_bits(bytes: &[u8]) -> u64 {
    bytes
        .iter()
        .enumerate()
        .fold(0u64, |acc, (i, b)| acc | (u64::from(*b) << (8 * i)))
}

/// Importer over one contiguous source.
///
/// When the source runs out in the middle of a value the importer records, in
/// the caller's [`ImportProgress`], where that value started and what was
/// assembled of it, then fails with [`ImportError::Underflow`].
pub struct DirectImporter<'a, 'p> {
    source: &'a [u8],
    position: usize,
    // offset of source[0] within the unit (header or payload) being read
    base: usize,
    progress: &'p mut ImportProgress,
}

impl<'a, 'p> DirectImporter<'a, 'p> {
    pub fn new(source: &'a [u8], progress: &'p mut ImportProgress) -> Self {
        Self::with_base(source, 0, progress)
    }

    pub(crate) fn with_base(
        source: &'a [u8],
        base: usize,
        progress: &'p mut ImportProgress,
    ) -> Self {
        Self {
            source,
            position: 0,
            base,
            progress,
        }
    }

    #[inline]
    pub fn remaining(&self) -> usize {
        self.source.len() - self.position
    }

    #[inline]
    fn unit_offset(&self) -> usize {
        self.base + self.position
    }

    fn record(&mut self, start: usize, bits: u64, object: Option<PartialArray>) -> ImportError {
        self.position = self.source.len();
        self.progress.index = start;
        self.progress.primitive = bits;
        self.progress.object = object;
        ImportError::Underflow
    }

    /// Complete a primitive of which `done` bytes are already in `bits`.
    pub(crate) fn finish_primitive(
        &mut self,
        start: usize,
        mut bits: u64,
        done: usize,
        width: usize,
    ) -> Result<u64, ImportError> {
        debug_assert!(width <= 8 && done <= width);
        let need = width - done;
        let take = need.min(self.remaining());
        bits |= le_bits(&self.source[self.position..self.position + take]) << (8 * done);
        self.position += take;
        if take < need {
            return Err(self.record(start, bits, None));
        }
        Ok(bits)
    }

    pub(crate) fn finish_compact(
        &mut self,
        start: usize,
        mut partial: CompactPartial,
    ) -> Result<u32, ImportError> {
        while self.position < self.source.len() {
            let byte = self.source[self.position];
            self.position += 1;
            match partial.push(byte) {
                CompactStep::More => continue,
                CompactStep::Done(value) => return Ok(value),
                CompactStep::Malformed => {
                    return Err(ImportError::Malformed("compact number longer than 32 bits"))
                }
            }
        }
        Err(self.record(start, partial.bits, None))
    }

    /// Complete an array, starting from its saved partial state if there is one,
    /// otherwise from a (possibly partial) length prefix.
    pub(crate) fn finish_array(
        &mut self,
        start: usize,
        element_width: usize,
        saved: Option<PartialArray>,
        prefix: CompactPartial,
    ) -> Result<Vec<u8>, ImportError> {
        let mut array = match saved {
            Some(array) => array,
            None => {
                let count = self.finish_compact(start, prefix)? as usize;
                let total = count
                    .checked_mul(element_width)
                    .filter(|total| *total <= MAX_MESSAGE_SIZE)
                    .ok_or(ImportError::Malformed("array length exceeds the message size limit"))?;
                PartialArray::with_total(total)
            }
        };
        let take = array.missing().min(self.remaining());
        array.extend(&self.source[self.position..self.position + take]);
        self.position += take;
        if !array.is_complete() {
            return Err(self.record(start, 0, Some(array)));
        }
        Ok(array.into_bytes())
    }
}

impl Importer for DirectImporter<'_, '_> {
    #[inline]
    fn read_primitive(&mut self, width: usize, _current: u64) -> Result<u64, ImportError> {
        let start = self.unit_offset();
        self.finish_primitive(start, 0, 0, width)
    }

    fn read_compact_number(&mut self, _current: u32) -> Result<u32, ImportError> {
        let start = self.unit_offset();
        self.finish_compact(start, CompactPartial::default())
    }

    fn read_array_bytes(
        &mut self,
        element_width: usize,
        _current_len: usize,
    ) -> Result<Option<Vec<u8>>, ImportError> {
        let start = self.unit_offset();
        self.finish_array(start, element_width, None, CompactPartial::default())
            .map(Some)
    }

    #[inline]
    fn consumed(&self) -> usize {
        self.position
    }
}
