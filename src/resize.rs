//! Whole-block growth and shrinkage of the file.
//!
//! Inserting or deleting blocks moves every byte after the change point and
//! every unit boundary after the current unit. All moves go through the
//! buffer slots, so resident blocks stay coherent with the device.

use tracing::debug;

use crate::{
    block::{Block, BLANK_FILL, ZERO_FILL},
    device::Device,
    error::{to_position, Error, Result},
    file::FitsFile,
    block_ceil, BLOCK_BYTES,
};

/// Bytes moved per step by [`FitsFile::shift_bytes`].
const SHIFT_CHUNK: u64 = 100_000;

/// Where [`FitsFile::insert_blocks`] makes room.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum InsertAt {
    /// Between the header and the data of the current unit, filled with
    /// blanks. The data start moves down.
    HeaderEnd,
    /// At the very start of the file, filled with zeros. The new blocks form
    /// a new first unit and the current unit moves down with the rest.
    FileStart,
    /// After the rows and heap of the current unit, rounded up to a block,
    /// filled with the unit's data fill byte.
    DataEnd,
}

impl<D: Device, const SLOTS: usize> FitsFile<D, SLOTS> {
    /// Inserts `count` blocks at `at`, shifting everything after the
    /// insertion point down the file.
    pub fn insert_blocks(&mut self, count: u64, at: InsertAt) -> Result<()> {
        self.guarded(|file| file.grow_blocks(count, at))
    }

    /// Removes the `count` blocks that end at the block-aligned end of the
    /// current unit's rows and heap. Everything after them moves up, and the
    /// file is truncated when the device allows it.
    pub fn delete_blocks(&mut self, count: u64) -> Result<()> {
        self.guarded(|file| file.shrink_blocks(count))
    }

    /// Moves the `len` bytes at `first` by `shift` bytes, which may be
    /// negative, then overwrites the `shift` bytes left behind with the data
    /// fill byte.
    pub fn shift_bytes(&mut self, first: u64, len: u64, shift: i64) -> Result<()> {
        self.guarded(|file| file.shift_unguarded(first, len, shift))
    }

    /// Makes room for `count` blank rows so that the first of them becomes
    /// row `at` (zero-based). Rows from `at` on and the heap move down.
    pub fn insert_rows(&mut self, at: u64, count: u64) -> Result<()> {
        self.guarded(|file| file.insert_rows_unguarded(at, count))
    }

    // ========================================================================
    // Block moves
    // ========================================================================

    fn read_block_at(&mut self, pos: u64, block: &mut Block) -> Result<()> {
        self.seek_to(pos, true)?;
        self.read_at_cursor(&mut block[..])
    }

    fn write_block_at(&mut self, pos: u64, block: &Block) -> Result<()> {
        self.seek_to(pos, false)?;
        self.write_at_cursor(&block[..])
    }

    pub(crate) fn ensure_writable(&self) -> Result<()> {
        if self.mode.is_writable() {
            Ok(())
        } else {
            Err(Error::ReadOnly)
        }
    }

    pub(crate) fn grow_blocks(&mut self, count: u64, at: InsertAt) -> Result<()> {
        if count == 0 {
            return Ok(());
        }
        self.ensure_writable()?;
        let bytes = count
            .checked_mul(BLOCK_BYTES)
            .ok_or_else(|| Error::overflow("inserted bytes", count))?;
        self.track_last_unit();

        let (insert_pos, fill) = match at {
            InsertAt::HeaderEnd => (self.layout.data_start, BLANK_FILL),
            InsertAt::FileStart => (0, ZERO_FILL),
            InsertAt::DataEnd => (block_ceil(self.layout.data_end()), self.layout.kind.data_fill()),
        };

        if count == 1 {
            //  stream to the end of the file through two alternating blocks
            let mut incoming = Block::new();
            let mut outgoing = Block::filled(fill);
            let mut pos = insert_pos;
            loop {
                match self.read_block_at(pos, &mut incoming) {
                    Ok(()) => {}
                    Err(Error::EndOfFile { .. }) => break,
                    Err(err) => return Err(err),
                }
                self.write_block_at(pos, &outgoing)?;
                std::mem::swap(&mut incoming, &mut outgoing);
                pos += BLOCK_BYTES;
            }
            self.write_block_at(pos, &outgoing)?;
        } else {
            //  walk backwards from the last block so no block is overwritten
            //  before it has been moved
            let end = self.directory.end().max(block_ceil(self.logical_size));
            let shifted = end.saturating_sub(insert_pos) / BLOCK_BYTES;
            let mut block = Block::new();
            let mut pos = end;
            for _ in 0..shifted {
                pos -= BLOCK_BYTES;
                self.read_block_at(pos, &mut block)?;
                let target = pos
                    .checked_add(bytes)
                    .ok_or_else(|| Error::overflow("file position", pos))?;
                self.write_block_at(target, &block)?;
            }
            block.fill(fill);
            for index in 0..count {
                self.write_block_at(insert_pos + index * BLOCK_BYTES, &block)?;
            }
        }

        match at {
            InsertAt::HeaderEnd => {
                self.layout.data_start += bytes;
                self.directory.grow_after(self.current_hdu, bytes);
            }
            InsertAt::DataEnd => self.directory.grow_after(self.current_hdu, bytes),
            InsertAt::FileStart => {
                self.directory.insert_leading(bytes);
                self.current_hdu += 1;
                self.layout.shift(bytes);
            }
        }
        debug!(count, ?at, insert_pos, "inserted blocks");
        Ok(())
    }

    pub(crate) fn shrink_blocks(&mut self, count: u64) -> Result<()> {
        if count == 0 {
            return Ok(());
        }
        self.ensure_writable()?;
        let bytes = count
            .checked_mul(BLOCK_BYTES)
            .ok_or_else(|| Error::overflow("deleted bytes", count))?;

        let mut read_pos = block_ceil(self.layout.data_end());
        let mut write_pos = read_pos
            .checked_sub(bytes)
            .filter(|&pos| pos >= self.layout.data_start)
            .ok_or_else(|| {
                Error::InvalidArgument(format!(
                    "cannot delete {count} blocks from a data unit of {} bytes",
                    read_pos - self.layout.data_start
                ))
            })?;

        let mut block = Block::new();
        loop {
            match self.read_block_at(read_pos, &mut block) {
                Ok(()) => {}
                Err(Error::EndOfFile { .. }) => break,
                Err(err) => return Err(err),
            }
            self.write_block_at(write_pos, &block)?;
            read_pos += BLOCK_BYTES;
            write_pos += BLOCK_BYTES;
        }

        let new_end = write_pos;
        block.fill(ZERO_FILL);
        for _ in 0..count {
            self.write_block_at(write_pos, &block)?;
            write_pos += BLOCK_BYTES;
        }

        if self.device.supports_truncate() {
            self.flush_slots(false)?;
            self.file_size = new_end;
            self.logical_size = new_end;
            self.cursor = new_end;
            self.io_pos = None;
            self.invalidate_beyond_eof();
            self.device.truncate(new_end)?;
        }

        self.directory.shrink_after(self.current_hdu, bytes);
        debug!(count, new_end, "deleted blocks");
        Ok(())
    }

    // ========================================================================
    // Byte and row moves
    // ========================================================================

    pub(crate) fn shift_unguarded(&mut self, first: u64, len: u64, shift: i64) -> Result<()> {
        if shift == 0 {
            return Ok(());
        }
        self.ensure_writable()?;

        let mut buffer = vec![0u8; len.min(SHIFT_CHUNK) as usize];
        let mut todo = len;
        let mut pos = if shift > 0 { first + len } else { first };
        while todo > 0 {
            let step = todo.min(SHIFT_CHUNK);
            if shift > 0 {
                pos -= step;
            }
            let chunk = &mut buffer[..step as usize];
            self.seek_to(pos, true)?;
            self.read_at_cursor(chunk)?;
            let target = to_position(i128::from(pos) + i128::from(shift))?;
            self.seek_to(target, false)?;
            self.write_at_cursor(chunk)?;
            todo -= step;
            if shift < 0 {
                pos += step;
            }
        }

        let (fill_pos, mut todo) = if shift < 0 {
            let start = i128::from(first) + i128::from(len) + i128::from(shift);
            (to_position(start)?, shift.unsigned_abs())
        } else {
            (first, shift.unsigned_abs())
        };
        let fill = vec![self.layout.kind.data_fill(); todo.min(SHIFT_CHUNK) as usize];
        self.seek_to(fill_pos, false)?;
        while todo > 0 {
            let step = todo.min(SHIFT_CHUNK);
            self.write_at_cursor(&fill[..step as usize])?;
            todo -= step;
        }
        debug!(first, len, shift, "shifted bytes");
        Ok(())
    }

    pub(crate) fn insert_rows_unguarded(&mut self, at: u64, count: u64) -> Result<()> {
        if !self.layout.kind.is_table() {
            return Err(Error::InvalidArgument(
                "rows can only be inserted into a table".to_string(),
            ));
        }
        if count == 0 {
            return Ok(());
        }
        if at > self.layout.rows {
            return Err(Error::BadRow {
                row: at,
                rows: self.layout.rows,
            });
        }

        let row_length = self.layout.row_length;
        let data_size = self.layout.heap_start + self.layout.heap_size;
        let free = block_ceil(data_size) - data_size;
        let added = row_length
            .checked_mul(count)
            .ok_or_else(|| Error::overflow("inserted row bytes", count))?;
        if added > free {
            let blocks = (added - free).div_ceil(BLOCK_BYTES);
            self.grow_blocks(blocks, InsertAt::DataEnd)?;
        }

        let first = self.layout.row_offset(at, 0)?;
        let moved = data_size - row_length * at;
        let shift = i64::try_from(added).map_err(|_| Error::overflow("row shift", added))?;
        self.shift_unguarded(first, moved, shift)?;

        self.layout.heap_start += added;
        self.layout.rows += count;
        debug!(at, count, rows = self.layout.rows, "inserted rows");
        Ok(())
    }
}
