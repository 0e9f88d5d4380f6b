//! The heap of a binary table: variable-length array payloads addressed by
//! the descriptors in the fixed-length rows.
//!
//! Writers only ever append to the heap. Rewriting an array leaves its old
//! payload behind as unused bytes, which [`FitsFile::compact_heap`] reclaims.

use tracing::{debug, warn};

use crate::{
    config::FileConfig,
    descriptor::Descriptor,
    device::{Device, MemoryDevice},
    error::{to_usize, Error, Result},
    file::FitsFile,
    hdu::{ElementSize, HduKind},
    resize::InsertAt,
    block_ceil, BLOCK_BYTES,
};

/// Result of a heap integrity check.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct HeapReport {
    /// Heap length in bytes.
    pub size: u64,
    /// Heap bytes no descriptor points at.
    pub unused: u64,
    /// Heap bytes more than one descriptor points at.
    pub overlap: u64,
    /// Whether every descriptor lies inside the heap.
    pub valid: bool,
    /// Column and row of the first descriptor found outside the heap.
    pub first_invalid: Option<(usize, u64)>,
}

impl HeapReport {
    fn trivial(size: u64) -> Self {
        Self {
            size,
            valid: true,
            ..Self::default()
        }
    }

    /// Whether compaction would change anything.
    pub fn is_compact(&self) -> bool {
        self.unused == 0 && self.overlap == 0
    }
}

impl<D: Device, const SLOTS: usize> FitsFile<D, SLOTS> {
    /// Counts, for every heap byte, how many descriptors of the current unit
    /// cover it.
    pub fn check_heap(&mut self) -> Result<HeapReport> {
        self.guarded(|file| file.heap_report())
    }

    /// Rewrites the heap so every payload is stored once, in column then row
    /// order, with no gaps. Blocks left unused at the end of the unit are
    /// deleted.
    pub fn compact_heap(&mut self) -> Result<()> {
        self.guarded(|file| file.compact_heap_unguarded())
    }

    /// Appends the payload of an array of `length` elements at the end of the
    /// heap and points the descriptor of `column` in `row` at it.
    ///
    /// `bytes` must be exactly the payload size of `length` elements. Any
    /// previous payload of the cell stays in the heap as unused bytes.
    pub fn append_heap_payload(
        &mut self,
        column: usize,
        row: u64,
        bytes: &[u8],
        length: i64,
    ) -> Result<()> {
        self.guarded(|file| {
            file.ensure_writable()?;
            let element = file.var_element(column)?;
            let offset = heap_offset_value(file.layout.heap_size)?;
            let descriptor = Descriptor::new(length, offset);
            let expected = descriptor.payload_bytes(element).ok_or_else(|| {
                Error::InvalidArgument(format!("array length {length} is not valid"))
            })?;
            if expected != bytes.len() as u64 {
                return Err(Error::InvalidArgument(format!(
                    "{length} elements take {expected} bytes but {} were given",
                    bytes.len()
                )));
            }

            file.write_descriptor(column, row, descriptor)?;
            file.reserve_heap(expected)?;
            file.seek_to(file.layout.data_end(), false)?;
            file.write_at_cursor(bytes)?;
            file.layout.heap_size += expected;
            file.track_last_unit();
            Ok(())
        })
    }

    /// Reads the payload the descriptor of `column` in `row` points at.
    pub fn read_heap_payload(&mut self, column: usize, row: u64) -> Result<Vec<u8>> {
        self.guarded(|file| {
            let element = file.var_element(column)?;
            let descriptor = file.read_descriptor(column, row)?;
            let (start, len) = file
                .payload_range(descriptor, element)
                .ok_or(Error::BadHeap { column, row })?;
            let mut payload = vec![0u8; to_usize("payload length", len)?];
            if len > 0 {
                file.seek_to(file.layout.heap_offset() + start, true)?;
                file.read_at_cursor(&mut payload)?;
            }
            Ok(payload)
        })
    }

    /// Heap-relative start and length of a payload, `None` when any of it
    /// lies outside the heap.
    fn payload_range(&self, descriptor: Descriptor, element: ElementSize) -> Option<(u64, u64)> {
        let len = descriptor.payload_bytes(element)?;
        if len == 0 {
            return Some((0, 0));
        }
        let start = u64::try_from(descriptor.offset).ok()?;
        let end = start.checked_add(len)?;
        (end <= self.layout.heap_size).then_some((start, len))
    }

    fn heap_report(&mut self) -> Result<HeapReport> {
        let size = self.layout.heap_size;
        if self.layout.kind != HduKind::BinaryTable || size == 0 {
            return Ok(HeapReport::trivial(size));
        }

        let mut coverage = vec![0u32; to_usize("heap size", size)?];
        let mut report = HeapReport::trivial(size);
        let columns: Vec<usize> = self.layout.var_columns().collect();
        for column in columns {
            let element = self.var_element(column)?;
            for row in 0..self.layout.rows {
                let descriptor = self.read_descriptor(column, row)?;
                match self.payload_range(descriptor, element) {
                    Some((start, len)) => {
                        for count in &mut coverage[start as usize..(start + len) as usize] {
                            *count = count.saturating_add(1);
                        }
                    }
                    None => {
                        report.valid = false;
                        report.first_invalid.get_or_insert((column, row));
                    }
                }
            }
        }

        report.unused = coverage.iter().filter(|&&count| count == 0).count() as u64;
        report.overlap = coverage.iter().filter(|&&count| count > 1).count() as u64;
        if !report.valid {
            warn!(first_invalid = ?report.first_invalid, "heap has descriptors outside the heap");
        }
        Ok(report)
    }

    fn compact_heap_unguarded(&mut self) -> Result<()> {
        let report = self.heap_report()?;
        if let Some((column, row)) = report.first_invalid {
            return Err(Error::BadHeap { column, row });
        }
        if report.is_compact() {
            return Ok(());
        }
        self.ensure_writable()?;

        let heap_offset = self.layout.heap_offset();
        let mut scratch = self.scratch_copy()?;

        self.layout.heap_size = 0;
        let columns: Vec<usize> = self.layout.var_columns().collect();
        for column in columns {
            for row in 0..self.layout.rows {
                let descriptor = scratch.get_descriptor(column, row)?;
                let payload = scratch.read_heap_payload(column, row)?;
                if payload.is_empty() {
                    self.write_descriptor(column, row, Descriptor::new(descriptor.length, 0))?;
                    continue;
                }

                let offset = heap_offset_value(self.layout.heap_size)?;
                let len = payload.len() as u64;
                self.reserve_heap(len)?;
                self.seek_to(self.layout.data_end(), false)?;
                self.write_at_cursor(&payload)?;
                self.write_descriptor(column, row, Descriptor::new(descriptor.length, offset))?;
                self.layout.heap_size += len;
            }
        }

        let heap_size = self.layout.heap_size;
        let new_end = self.layout.data_end();
        if let Some(unit_end) = self.directory.end_of(self.current_hdu) {
            let spare = unit_end.saturating_sub(new_end) / BLOCK_BYTES;
            if spare > 0 {
                //  delete from the end of the unit, not the end of the new heap
                self.layout.heap_size = unit_end - heap_offset;
                self.shrink_blocks(spare)?;
                self.layout.heap_size = heap_size;
            }
        }
        self.repair_fill(new_end, block_ceil(new_end), self.layout.kind.data_fill())?;
        self.track_last_unit();
        debug!(before = report.size, after = heap_size, "compacted heap");
        Ok(())
    }

    /// In-memory copy of the current unit's rows and heap, laid out as a
    /// unit with no header at the start of its own file.
    fn scratch_copy(&mut self) -> Result<FitsFile<MemoryDevice>> {
        let data_start = self.layout.data_start;
        let mut unit = vec![0u8; to_usize("unit size", self.layout.data_end() - data_start)?];
        self.seek_to(data_start, true)?;
        self.read_at_cursor(&mut unit)?;

        let mut layout = self.layout.clone();
        layout.header_start = 0;
        layout.data_start = 0;
        let mut scratch = FitsFile::open(MemoryDevice::from_bytes(unit), FileConfig::read_only())?;
        scratch.select_hdu(0, layout)?;
        Ok(scratch)
    }

    /// Inserts blocks after the current unit's data when `len` more heap
    /// bytes would run into the following unit.
    fn reserve_heap(&mut self, len: u64) -> Result<()> {
        if self.directory.is_last(self.current_hdu) {
            return Ok(());
        }
        let Some(next) = self.directory.end_of(self.current_hdu) else {
            return Ok(());
        };
        let end = self.layout.data_end() + len;
        if end > next {
            let blocks = (end - 1 - next) / BLOCK_BYTES + 1;
            self.grow_blocks(blocks, InsertAt::DataEnd)?;
        }
        Ok(())
    }
}

fn heap_offset_value(heap_size: u64) -> Result<i64> {
    i64::try_from(heap_size).map_err(|_| Error::overflow("heap offset", heap_size))
}
