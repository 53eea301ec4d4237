use super::compact::{compact_size, CompactPartial};
use super::importer::{DirectImporter, Importer};
use super::unfinished::{ImportProgress, PartialArray};
use crate::error::ImportError;

/// Importer that resumes a unit (header or payload) interrupted at the end of
/// an earlier raw buffer.
///
/// It replays the codec's read sequence. Values that finished before the
/// interruption are skipped and keep the value already stored in their field,
/// the interrupted value is completed from its saved partial state, and
/// everything after it is read directly from the new source.
pub struct UnderflowImporter<'a, 'p> {
    inner: DirectImporter<'a, 'p>,
    skip_bytes: usize,
    skipped: usize,
    resume_index: usize,
    resume_bits: u64,
    resume_object: Option<PartialArray>,
}

impl<'a, 'p> UnderflowImporter<'a, 'p> {
    /// # Arguments
    /// * `source` - Bytes of the new raw buffer, starting at the resume point
    /// * `skip_bytes` - Bytes of the unit consumed by earlier buffers
    /// * `progress` - Progress saved by the interrupted import; overwritten if
    ///   this source runs out again
    pub fn new(source: &'a [u8], skip_bytes: usize, progress: &'p mut ImportProgress) -> Self {
        let saved = std::mem::take(progress);
        debug_assert!(saved.index <= skip_bytes);
        Self {
            inner: DirectImporter::with_base(source, skip_bytes, progress),
            skip_bytes,
            skipped: 0,
            resume_index: saved.index,
            resume_bits: saved.primitive,
            resume_object: saved.object,
        }
    }

    #[inline]
    fn before_interruption(&self) -> bool {
        self.skipped < self.resume_index
    }

    #[inline]
    fn at_interruption(&self) -> bool {
        self.skipped < self.skip_bytes
    }

    /// Bytes of the interrupted value that were consumed before the split.
    #[inline]
    fn done_bytes(&self) -> usize {
        self.skip_bytes - self.resume_index
    }
}

impl Importer for UnderflowImporter<'_, '_> {
    fn read_primitive(&mut self, width: usize, current: u64) -> Result<u64, ImportError> {
        if self.before_interruption() {
            self.skipped += width;
            return Ok(current);
        }
        if self.at_interruption() {
            let done = self.done_bytes();
            self.skipped = self.skip_bytes;
            return self
                .inner
                .finish_primitive(self.resume_index, self.resume_bits, done, width);
        }
        self.inner.read_primitive(width, current)
    }

    fn read_compact_number(&mut self, current: u32) -> Result<u32, ImportError> {
        if self.before_interruption() {
            self.skipped += compact_size(current);
            return Ok(current);
        }
        if self.at_interruption() {
            let partial = CompactPartial::new(self.resume_bits, self.done_bytes());
            self.skipped = self.skip_bytes;
            return self.inner.finish_compact(self.resume_index, partial);
        }
        self.inner.read_compact_number(current)
    }

    fn read_array_bytes(
        &mut self,
        element_width: usize,
        current_len: usize,
    ) -> Result<Option<Vec<u8>>, ImportError> {
        if self.before_interruption() {
            self.skipped += compact_size(current_len as u32) + current_len * element_width;
            return Ok(None);
        }
        if self.at_interruption() {
            let saved = self.resume_object.take();
            let prefix = match saved {
                Some(_) => CompactPartial::default(),
                None => CompactPartial::new(self.resume_bits, self.done_bytes()),
            };
            self.skipped = self.skip_bytes;
            return self
                .inner
                .finish_array(self.resume_index, element_width, saved, prefix)
                .map(Some);
        }
        self.inner.read_array_bytes(element_width, current_len)
    }

    #[inline]
    fn consumed(&self) -> usize {
        self.inner.consumed()
    }
}
