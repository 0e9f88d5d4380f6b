//! Structural units (HDUs) as seen by the buffer layer.
//!
//! Keyword parsing lives elsewhere. Higher layers describe the unit they are
//! working on with an [`HduLayout`] and keep the file's [`HduDirectory`] in
//! step with the headers they write; the resize operations update both.

use crate::{
    block::{BLANK_FILL, ZERO_FILL},
    descriptor::DescriptorFormat,
    error::{Error, Result},
    BLOCK_BYTES,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum HduKind {
    #[default]
    Image,
    AsciiTable,
    BinaryTable,
}

impl HduKind {
    /// Byte that pads the data region of this kind of unit.
    pub fn data_fill(self) -> u8 {
        match self {
            HduKind::AsciiTable => BLANK_FILL,
            HduKind::Image | HduKind::BinaryTable => ZERO_FILL,
        }
    }

    pub fn is_table(self) -> bool {
        self != HduKind::Image
    }
}

/// Size of one element of a variable-length array.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ElementSize {
    /// Bit arrays: `n` elements take `ceil(n / 8)` bytes.
    Bits,
    Bytes(u64),
}

impl ElementSize {
    /// Heap bytes taken by an array of `length` elements.
    pub fn payload_bytes(self, length: u64) -> Option<u64> {
        match self {
            ElementSize::Bits => Some(length.div_ceil(8)),
            ElementSize::Bytes(width) => length.checked_mul(width),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ColumnKind {
    Fixed {
        width: u64,
    },
    VarArray {
        format: DescriptorFormat,
        element: ElementSize,
    },
}

/// One table column: where it sits in the row and what it holds.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ColumnSpec {
    /// Byte offset of the column within a row.
    pub offset: u64,
    pub kind: ColumnKind,
}

impl ColumnSpec {
    pub fn fixed(offset: u64, width: u64) -> Self {
        Self {
            offset,
            kind: ColumnKind::Fixed { width },
        }
    }

    pub fn var_array(offset: u64, format: DescriptorFormat, element: ElementSize) -> Self {
        Self {
            offset,
            kind: ColumnKind::VarArray { format, element },
        }
    }

    pub fn width(&self) -> u64 {
        match self.kind {
            ColumnKind::Fixed { width } => width,
            ColumnKind::VarArray { format, .. } => format.width() as u64,
        }
    }

    pub(crate) fn var_array_parts(&self) -> Option<(DescriptorFormat, ElementSize)> {
        match self.kind {
            ColumnKind::VarArray { format, element } => Some((format, element)),
            ColumnKind::Fixed { .. } => None,
        }
    }
}

/// Geometry of the current unit.
///
/// `heap_start` is relative to `data_start`. For images the whole data region
/// counts as a single row and the heap is empty.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct HduLayout {
    pub kind: HduKind,
    pub header_start: u64,
    pub data_start: u64,
    pub row_length: u64,
    pub rows: u64,
    pub heap_start: u64,
    pub heap_size: u64,
    pub columns: Vec<ColumnSpec>,
}

impl HduLayout {
    pub fn image(header_start: u64, data_start: u64, data_bytes: u64) -> Self {
        Self {
            kind: HduKind::Image,
            header_start,
            data_start,
            row_length: data_bytes,
            rows: u64::from(data_bytes > 0),
            heap_start: data_bytes,
            heap_size: 0,
            columns: Vec::new(),
        }
    }

    pub fn binary_table(
        header_start: u64,
        data_start: u64,
        row_length: u64,
        rows: u64,
        columns: Vec<ColumnSpec>,
    ) -> Self {
        Self {
            kind: HduKind::BinaryTable,
            header_start,
            data_start,
            row_length,
            rows,
            heap_start: row_length.saturating_mul(rows),
            heap_size: 0,
            columns,
        }
    }

    pub fn ascii_table(
        header_start: u64,
        data_start: u64,
        row_length: u64,
        rows: u64,
        columns: Vec<ColumnSpec>,
    ) -> Self {
        Self {
            kind: HduKind::AsciiTable,
            ..Self::binary_table(header_start, data_start, row_length, rows, columns)
        }
    }

    /// Places the heap, for tables whose heap has already been written.
    pub fn with_heap(mut self, heap_start: u64, heap_size: u64) -> Self {
        self.heap_start = heap_start;
        self.heap_size = heap_size;
        self
    }

    /// Absolute offset of the end of the rows and heap.
    pub fn data_end(&self) -> u64 {
        self.data_start + self.heap_start + self.heap_size
    }

    /// Absolute offset of the first heap byte.
    pub fn heap_offset(&self) -> u64 {
        self.data_start + self.heap_start
    }

    /// Absolute offset of byte `byte` of row `row`.
    pub(crate) fn row_offset(&self, row: u64, byte: u64) -> Result<u64> {
        row.checked_mul(self.row_length)
            .and_then(|offset| offset.checked_add(self.data_start))
            .and_then(|offset| offset.checked_add(byte))
            .ok_or_else(|| Error::overflow("table position", row))
    }

    pub fn column(&self, column: usize) -> Result<&ColumnSpec> {
        self.columns.get(column).ok_or(Error::BadColumn(column))
    }

    /// Indices of the variable-length array columns.
    pub fn var_columns(&self) -> impl Iterator<Item = usize> + '_ {
        self.columns
            .iter()
            .enumerate()
            .filter(|(_, spec)| spec.var_array_parts().is_some())
            .map(|(index, _)| index)
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.header_start % BLOCK_BYTES != 0 || self.data_start % BLOCK_BYTES != 0 {
            return Err(Error::InvalidArgument(format!(
                "unit at {} with data at {} is not block aligned",
                self.header_start, self.data_start
            )));
        }
        if self.data_start < self.header_start {
            return Err(Error::InvalidArgument(format!(
                "data start {} precedes header start {}",
                self.data_start, self.header_start
            )));
        }
        self.row_length
            .checked_mul(self.rows)
            .ok_or_else(|| Error::overflow("table size", self.rows))?;
        self.data_start
            .checked_add(self.heap_start)
            .and_then(|end| end.checked_add(self.heap_size))
            .and_then(|end| end.checked_add(BLOCK_BYTES - 1))
            .ok_or_else(|| Error::overflow("data end", self.heap_size))?;
        for (index, spec) in self.columns.iter().enumerate() {
            if spec.offset.checked_add(spec.width()).map_or(true, |end| end > self.row_length) {
                return Err(Error::InvalidArgument(format!(
                    "column {index} ends past the row length {}",
                    self.row_length
                )));
            }
        }
        Ok(())
    }

    pub(crate) fn shift(&mut self, delta: u64) {
        self.header_start += delta;
        self.data_start += delta;
    }
}

/// Header start offsets of every unit in the file.
///
/// The final entry is the end of the last unit, so a file with `n` units has
/// `n + 1` entries. All entries are block aligned and non-decreasing.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HduDirectory {
    starts: Vec<u64>,
}

impl HduDirectory {
    pub fn new(starts: Vec<u64>) -> Result<Self> {
        if starts.len() < 2 {
            return Err(Error::InvalidArgument(
                "a directory needs a start and an end".to_string(),
            ));
        }
        if let Some(start) = starts.iter().find(|&&start| start % BLOCK_BYTES != 0) {
            return Err(Error::InvalidArgument(format!(
                "unit boundary {start} is not block aligned"
            )));
        }
        if starts.windows(2).any(|pair| pair[0] > pair[1]) {
            return Err(Error::InvalidArgument(
                "unit boundaries must not decrease".to_string(),
            ));
        }
        Ok(Self { starts })
    }

    /// A file holding a single unit that ends at `end`, rounded up to a block.
    pub fn single(end: u64) -> Self {
        Self {
            starts: vec![0, crate::block_ceil(end)],
        }
    }

    /// Number of units.
    pub fn len(&self) -> usize {
        self.starts.len() - 1
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn start(&self, unit: usize) -> Option<u64> {
        self.starts.get(unit).copied()
    }

    /// Offset just past `unit`, which is the start of the unit after it.
    pub fn end_of(&self, unit: usize) -> Option<u64> {
        self.starts.get(unit + 1).copied()
    }

    /// End of the last unit.
    pub fn end(&self) -> u64 {
        self.starts[self.starts.len() - 1]
    }

    pub fn is_last(&self, unit: usize) -> bool {
        unit + 1 >= self.len()
    }

    pub fn as_slice(&self) -> &[u64] {
        &self.starts
    }

    /// Moves every boundary after `unit` down the file by `bytes`.
    pub(crate) fn grow_after(&mut self, unit: usize, bytes: u64) {
        for start in &mut self.starts[unit + 1..] {
            *start += bytes;
        }
    }

    /// Moves every boundary after `unit` up the file by `bytes`.
    pub(crate) fn shrink_after(&mut self, unit: usize, bytes: u64) {
        for start in &mut self.starts[unit + 1..] {
            *start = start.saturating_sub(bytes);
        }
    }

    /// Registers a new unit of `bytes` at the start of the file.
    pub(crate) fn insert_leading(&mut self, bytes: u64) {
        for start in &mut self.starts {
            *start += bytes;
        }
        self.starts.insert(0, 0);
    }

    /// Extends the last unit so that it reaches at least `end`.
    pub(crate) fn extend_last(&mut self, end: u64) {
        let last = self.starts.len() - 1;
        self.starts[last] = self.starts[last].max(crate::block_ceil(end));
    }
}

impl Default for HduDirectory {
    fn default() -> Self {
        Self::single(0)
    }
}
