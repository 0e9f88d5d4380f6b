//! Byte transfers between callers and the buffer slots.
//!
//! Transfers smaller than the direct threshold are copied through the slots a
//! block at a time. Larger ones go straight to the device: reads write back
//! any dirty slot they overlap first, writes push the head of the range through
//! the current slot, drop every overlapping slot, write the whole middle
//! blocks, and leave the tail dirty in the current slot.

use tracing::trace;

use crate::{
    buffer_manager::block_start,
    device::Device,
    error::{offset_by, to_position, Error, Result},
    file::FitsFile,
    BLOCK_BYTES, BLOCK_SIZE,
};

impl<D: Device, const SLOTS: usize> FitsFile<D, SLOTS> {
    /// Moves the cursor to `pos`, making its block current.
    ///
    /// With `strict` a position in a block beyond the logical end of the
    /// file fails with [`Error::EndOfFile`] and the cursor stays where it was.
    pub fn position(&mut self, pos: u64, strict: bool) -> Result<()> {
        self.guarded(|file| file.seek_to(pos, strict))
    }

    /// Fills `buf` from the cursor and advances the cursor past it.
    pub fn read_bytes(&mut self, buf: &mut [u8]) -> Result<()> {
        self.guarded(|file| file.read_at_cursor(buf))
    }

    /// Writes `buf` at the cursor and advances the cursor past it.
    pub fn write_bytes(&mut self, buf: &[u8]) -> Result<()> {
        self.guarded(|file| file.write_at_cursor(buf))
    }

    /// Reads `count` elements of `size` bytes each into `buf`, starting at the
    /// cursor, skipping `gap` bytes after each element. A negative `gap` walks
    /// backwards through the file.
    pub fn read_strided(&mut self, size: usize, count: usize, gap: i64, buf: &mut [u8]) -> Result<()> {
        self.guarded(|file| file.read_strided_unguarded(size, count, gap, buf))
    }

    /// Writes `count` elements of `size` bytes each from `buf`, starting at
    /// the cursor, skipping `gap` bytes after each element.
    pub fn write_strided(&mut self, size: usize, count: usize, gap: i64, buf: &[u8]) -> Result<()> {
        self.guarded(|file| file.write_strided_unguarded(size, count, gap, buf))
    }

    // ========================================================================
    // Unguarded building blocks
    // ========================================================================

    pub(crate) fn seek_to(&mut self, pos: u64, strict: bool) -> Result<()> {
        self.slot_for(pos, strict)?;
        self.cursor = pos;
        Ok(())
    }

    pub(crate) fn read_at_cursor(&mut self, buf: &mut [u8]) -> Result<()> {
        if buf.is_empty() {
            return Ok(());
        }
        if buf.len() >= self.direct_threshold {
            return self.read_direct(buf);
        }
        self.cursor = self.read_through_slots(self.cursor, buf)?;
        Ok(())
    }

    pub(crate) fn write_at_cursor(&mut self, buf: &[u8]) -> Result<()> {
        if buf.is_empty() {
            return Ok(());
        }
        if buf.len() >= self.direct_threshold {
            return self.write_direct(buf);
        }
        self.cursor = self.write_through_slots(self.cursor, buf)?;
        Ok(())
    }

    pub(crate) fn read_strided_unguarded(
        &mut self,
        size: usize,
        count: usize,
        gap: i64,
        buf: &mut [u8],
    ) -> Result<()> {
        let positions = self.element_positions(size, count, gap, buf.len())?;
        for (pos, element) in positions.iter().zip(buf.chunks_exact_mut(size.max(1))) {
            self.read_through_slots(*pos, element)?;
        }
        self.finish_strided(size, count, gap)
    }

    pub(crate) fn write_strided_unguarded(
        &mut self,
        size: usize,
        count: usize,
        gap: i64,
        buf: &[u8],
    ) -> Result<()> {
        let positions = self.element_positions(size, count, gap, buf.len())?;
        for (pos, element) in positions.iter().zip(buf.chunks_exact(size.max(1))) {
            self.write_through_slots(*pos, element)?;
        }
        self.finish_strided(size, count, gap)
    }

    /// Copies out of the slots starting at `pos`, loading blocks strictly.
    /// Returns the position after the last byte read.
    fn read_through_slots(&mut self, mut pos: u64, buf: &mut [u8]) -> Result<u64> {
        let mut done = 0;
        while done < buf.len() {
            let slot = self.slot_for(pos, true)?;
            let offset = (pos % BLOCK_BYTES) as usize;
            let len = (BLOCK_SIZE - offset).min(buf.len() - done);
            buf[done..done + len].copy_from_slice(&self.pool.slots[slot].data[offset..offset + len]);
            done += len;
            pos += len as u64;
        }
        Ok(pos)
    }

    /// Copies into the slots starting at `pos`, synthesizing blocks past the
    /// end of the file. Every slot touched is left dirty.
    fn write_through_slots(&mut self, mut pos: u64, buf: &[u8]) -> Result<u64> {
        let mut done = 0;
        while done < buf.len() {
            let slot = self.slot_for(pos, false)?;
            let offset = (pos % BLOCK_BYTES) as usize;
            let len = (BLOCK_SIZE - offset).min(buf.len() - done);
            let target = &mut self.pool.slots[slot];
            target.data[offset..offset + len].copy_from_slice(&buf[done..done + len]);
            target.dirty = true;
            done += len;
            pos += len as u64;
        }
        Ok(pos)
    }

    fn read_direct(&mut self, buf: &mut [u8]) -> Result<()> {
        let start = self.cursor;
        let end = offset_by(start, buf.len() as u64)?;
        let first = start / BLOCK_BYTES;
        let last = (end - 1) / BLOCK_BYTES;
        if end > self.logical_size {
            return Err(Error::EndOfFile {
                block: self.logical_size / BLOCK_BYTES,
            });
        }

        for slot in 0..SLOTS {
            let overlaps = self.pool.slots[slot]
                .block
                .is_some_and(|block| (first..=last).contains(&block));
            if overlaps && self.pool.slots[slot].dirty {
                self.write_back(slot)?;
            }
        }

        trace!(start, len = buf.len(), "direct read");
        self.device_read(start, buf)?;
        self.cursor = end;
        Ok(())
    }

    fn write_direct(&mut self, buf: &[u8]) -> Result<()> {
        if !self.mode.is_writable() {
            return Err(Error::ReadOnly);
        }

        let start = self.cursor;
        let first = start / BLOCK_BYTES;
        let last = (offset_by(start, buf.len() as u64)? - 1) / BLOCK_BYTES;
        let last_end = offset_by(block_start(last)?, BLOCK_BYTES)?;
        let slot = self.slot_for(start, false)?;

        //  complete the current block with the head of the range
        let offset = (start % BLOCK_BYTES) as usize;
        let head = BLOCK_SIZE - offset;
        self.pool.slots[slot].data[offset..].copy_from_slice(&buf[..head]);
        self.pool.slots[slot].dirty = true;

        for index in 0..SLOTS {
            let overlaps = self.pool.slots[index]
                .block
                .is_some_and(|block| (first..=last).contains(&block));
            if overlaps {
                if self.pool.slots[index].dirty {
                    self.write_back(index)?;
                }
                self.pool.forget(index);
            }
        }

        let rest = &buf[head..];
        let middle = ((rest.len() - 1) / BLOCK_SIZE) * BLOCK_SIZE;
        let middle_start = start + head as u64;
        trace!(start = middle_start, len = middle, "direct write");
        if middle > 0 {
            self.device_write(middle_start, &rest[..middle])?;
        }
        let tail_start = middle_start + middle as u64;
        self.file_size = self.file_size.max(tail_start);

        //  the tail block keeps whatever the device holds after the range
        if tail_start >= self.file_size {
            let fill = self.layout.kind.data_fill();
            self.pool.slots[slot].data.fill(fill);
        } else {
            let available = (self.file_size - tail_start).min(BLOCK_BYTES) as usize;
            let mut existing = [0u8; BLOCK_SIZE];
            self.device_read(tail_start, &mut existing[..available])?;
            let data = &mut self.pool.slots[slot].data;
            data[..available].copy_from_slice(&existing[..available]);
            data[available..].fill(self.layout.kind.data_fill());
        }

        let tail = &rest[middle..];
        let target = &mut self.pool.slots[slot];
        target.data[..tail.len()].copy_from_slice(tail);
        target.dirty = true;
        target.block = Some(last);
        self.pool.make_current(slot);

        self.logical_size = self.logical_size.max(last_end);
        self.cursor = tail_start + tail.len() as u64;
        Ok(())
    }

    /// Absolute start of every element of a strided transfer.
    fn element_positions(&self, size: usize, count: usize, gap: i64, len: usize) -> Result<Vec<u64>> {
        if size.checked_mul(count) != Some(len) {
            return Err(Error::InvalidArgument(format!(
                "buffer of {len} bytes does not hold {count} elements of {size} bytes"
            )));
        }
        let stride = size as i128 + i128::from(gap);
        (0..count)
            .map(|index| to_position(i128::from(self.cursor) + index as i128 * stride))
            .collect()
    }

    fn finish_strided(&mut self, size: usize, count: usize, gap: i64) -> Result<()> {
        if count == 0 {
            return Ok(());
        }
        let end = i128::from(self.cursor)
            + count as i128 * size as i128
            + (count as i128 - 1) * i128::from(gap);
        self.cursor = to_position(end)?;
        Ok(())
    }
}
