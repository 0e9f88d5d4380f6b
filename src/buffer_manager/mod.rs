//! Buffer slot pool and record loader.
//!
//! Every byte access goes through [`FitsFile::load_block`], which makes the
//! requested block resident in one of the handle's slots. A miss evicts the
//! least recently used slot, writing it back first if it is dirty. Blocks at or
//! beyond the physical end of the file are synthesized from the fill byte of
//! the current unit instead of being read.
//!
//! # Shared Types
//!
//! - `Slot`: one block-sized buffer with its identity and dirty flag
//! - `BufferPool`: the slots, their age index and the current slot
//! - `BufferStats`: hit/miss and device traffic counters

mod flush;

use tracing::trace;

use crate::{
    block::Block,
    device::Device,
    error::{offset_by, Error, Result},
    file::FitsFile,
    replacement::AgeIndex,
    BLOCK_BYTES, BLOCK_SIZE,
};

// ============================================================================
// Slot
// ============================================================================

#[derive(Debug, Default)]
pub(crate) struct Slot {
    /// Zero-based index of the block held, or `None` when unassigned.
    pub(crate) block: Option<u64>,
    pub(crate) dirty: bool,
    pub(crate) data: Block,
}

impl Slot {
    fn forget(&mut self) {
        self.block = None;
        self.dirty = false;
    }
}

// ============================================================================
// BufferPool
// ============================================================================

#[derive(Debug)]
pub(crate) struct BufferPool<const N: usize> {
    pub(crate) slots: [Slot; N],
    ages: AgeIndex<N>,
    current: Option<usize>,
}

impl<const N: usize> BufferPool<N> {
    pub(crate) fn new() -> Self {
        Self {
            slots: std::array::from_fn(|_| Slot::default()),
            ages: AgeIndex::new(),
            current: None,
        }
    }

    /// Finds the slot holding `block`, searching from the most recently used.
    pub(crate) fn find(&self, block: u64) -> Option<usize> {
        self.ages
            .youngest_first()
            .find(|&slot| self.slots[slot].block == Some(block))
    }

    pub(crate) fn victim(&self) -> Result<usize> {
        self.ages.oldest().ok_or(Error::NoFreeSlot)
    }

    /// Makes `slot` the current slot and the youngest in the age index.
    pub(crate) fn make_current(&mut self, slot: usize) {
        self.current = Some(slot);
        self.ages.record_use(slot);
    }

    /// The current slot, if it holds `block`.
    pub(crate) fn current_for(&self, block: u64) -> Option<usize> {
        self.current
            .filter(|&slot| self.slots[slot].block == Some(block))
    }

    pub(crate) fn forget(&mut self, slot: usize) {
        self.slots[slot].forget();
        if self.current == Some(slot) {
            self.current = None;
        }
    }

    pub(crate) fn forget_all(&mut self) {
        for slot in &mut self.slots {
            slot.forget();
        }
        self.current = None;
    }

    /// Slot holding the lowest block in `first..below`, if any.
    pub(crate) fn lowest_between(&self, first: u64, below: u64) -> Option<(usize, u64)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(index, slot)| slot.block.map(|block| (index, block)))
            .filter(|&(_, block)| block >= first && block < below)
            .min_by_key(|&(_, block)| block)
    }

    pub(crate) fn is_resident(&self, block: u64) -> bool {
        self.slots.iter().any(|slot| slot.block == Some(block))
    }

    pub(crate) fn is_dirty(&self, block: u64) -> bool {
        self.slots
            .iter()
            .any(|slot| slot.block == Some(block) && slot.dirty)
    }
}

// ============================================================================
// BufferStats
// ============================================================================

/// Counters kept by every handle.
///
/// `device_reads` and `device_writes` count calls into the [`Device`], so a
/// direct transfer of many blocks counts once.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BufferStats {
    pub hits: u64,
    pub misses: u64,
    pub device_reads: u64,
    pub device_writes: u64,
}

impl BufferStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> (u64, u64) {
        (self.hits, self.misses)
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn hit_rate(&self) -> f64 {
        let (hits, misses) = self.get();
        let total = hits + misses;
        if total == 0 {
            0.0
        } else {
            (hits as f64 / total as f64) * 100.0
        }
    }
}

// ============================================================================
// Record loader and device plumbing
// ============================================================================

/// Byte offset of the first byte of `block`.
pub(crate) fn block_start(block: u64) -> Result<u64> {
    block
        .checked_mul(BLOCK_BYTES)
        .ok_or_else(|| Error::overflow("block index", block))
}

impl<D: Device, const SLOTS: usize> FitsFile<D, SLOTS> {
    /// Makes `block` resident and current, returning its slot.
    ///
    /// With `strict` a block starting at or beyond the logical end of the
    /// file is an error, otherwise it is synthesized from the fill byte.
    pub(crate) fn load_block(&mut self, block: u64, strict: bool) -> Result<usize> {
        if let Some(slot) = self.pool.find(block) {
            self.stats.hits += 1;
            self.pool.make_current(slot);
            return Ok(slot);
        }

        let start = block_start(block)?;
        let end = offset_by(start, BLOCK_BYTES)?;
        if strict && start >= self.logical_size {
            return Err(Error::EndOfFile { block });
        }

        let slot = self.pool.victim()?;
        if self.pool.slots[slot].dirty {
            self.write_back(slot)?;
        }
        self.pool.forget(slot);
        self.stats.misses += 1;

        if start >= self.file_size {
            let fill = self.layout.kind.data_fill();
            let target = &mut self.pool.slots[slot];
            target.data.fill(fill);
            target.dirty = true;
            self.logical_size = self.logical_size.max(end);
            trace!(block, slot, "synthesized block beyond end of file");
        } else {
            self.read_slot(slot, start)?;
            trace!(block, slot, "loaded block");
        }

        self.pool.slots[slot].block = Some(block);
        self.pool.make_current(slot);
        Ok(slot)
    }

    /// The slot holding the block that contains `pos`, loading it if needed.
    pub(crate) fn slot_for(&mut self, pos: u64, strict: bool) -> Result<usize> {
        let block = pos / BLOCK_BYTES;
        match self.pool.current_for(block) {
            Some(slot) => Ok(slot),
            None => self.load_block(block, strict),
        }
    }

    /// Forgets every slot whose block lies at or beyond the physical end.
    pub(crate) fn invalidate_beyond_eof(&mut self) {
        for slot in 0..SLOTS {
            let beyond = self.pool.slots[slot]
                .block
                .is_some_and(|block| block.saturating_mul(BLOCK_BYTES) >= self.file_size);
            if beyond {
                self.pool.forget(slot);
            }
        }
    }

    pub(crate) fn seek_device(&mut self, pos: u64) -> Result<()> {
        if self.io_pos != Some(pos) {
            self.io_pos = None;
            self.device.seek(pos)?;
            self.io_pos = Some(pos);
        }
        Ok(())
    }

    /// Reads a block from the device into `slot`. A short final block is
    /// completed with the fill byte of the current unit.
    fn read_slot(&mut self, slot: usize, start: u64) -> Result<()> {
        let available = (self.file_size - start).min(BLOCK_BYTES) as usize;
        self.seek_device(start)?;
        self.io_pos = None;
        self.stats.device_reads += 1;
        let data = &mut self.pool.slots[slot].data;
        self.device.read_exact(&mut data[..available])?;
        if available < BLOCK_SIZE {
            data[available..].fill(self.layout.kind.data_fill());
        }
        self.io_pos = Some(start + available as u64);
        Ok(())
    }

    /// Writes the contents of `slot` to the device at `pos`.
    pub(crate) fn write_slot(&mut self, slot: usize, pos: u64) -> Result<()> {
        self.seek_device(pos)?;
        self.io_pos = None;
        self.stats.device_writes += 1;
        self.device.write_all(&self.pool.slots[slot].data)?;
        self.io_pos = Some(pos + BLOCK_BYTES);
        Ok(())
    }

    pub(crate) fn device_read(&mut self, pos: u64, buf: &mut [u8]) -> Result<()> {
        self.seek_device(pos)?;
        self.io_pos = None;
        self.stats.device_reads += 1;
        self.device.read_exact(buf)?;
        self.io_pos = Some(pos + buf.len() as u64);
        Ok(())
    }

    pub(crate) fn device_write(&mut self, pos: u64, buf: &[u8]) -> Result<()> {
        self.seek_device(pos)?;
        self.io_pos = None;
        self.stats.device_writes += 1;
        self.device.write_all(buf)?;
        self.io_pos = Some(pos + buf.len() as u64);
        Ok(())
    }
}

#[cfg(test)]
mod buffer_manager_tests {
    use super::*;
    use crate::{FileConfig, MemoryDevice, ZERO_FILL};

    fn file_with_blocks<const N: usize>(blocks: u64) -> FitsFile<MemoryDevice, N> {
        let mut bytes = Vec::new();
        for block in 0..blocks {
            bytes.extend(std::iter::repeat(block as u8 + 1).take(BLOCK_SIZE));
        }
        FitsFile::open(MemoryDevice::from_bytes(bytes), FileConfig::default()).unwrap()
    }

    #[test]
    fn test_hit_does_not_touch_the_device() {
        let mut file = file_with_blocks::<4>(3);
        let slot = file.load_block(1, true).unwrap();
        assert_eq!(file.pool.slots[slot].data[0], 2);
        let reads = file.stats.device_reads;

        assert_eq!(file.load_block(1, true).unwrap(), slot);
        assert_eq!(file.stats.device_reads, reads);
        assert_eq!(file.stats.get(), (1, 1));
    }

    #[test]
    fn test_strict_load_past_logical_end_fails() {
        let mut file = file_with_blocks::<4>(2);
        assert!(matches!(
            file.load_block(2, true),
            Err(Error::EndOfFile { block: 2 })
        ));
        assert!(!file.pool.is_resident(2));
    }

    #[test]
    fn test_lenient_load_synthesizes_a_dirty_fill_block() {
        let mut file = file_with_blocks::<4>(1);
        let slot = file.load_block(3, false).unwrap();
        assert!(file.pool.slots[slot].data.is_filled_with(ZERO_FILL));
        assert!(file.pool.slots[slot].dirty);
        assert_eq!(file.logical_size, 4 * BLOCK_BYTES);
        assert_eq!(file.file_size, BLOCK_BYTES);

        //  now inside the logical extent, so a strict load of a lower block works
        assert!(file.load_block(2, true).is_ok());
    }

    #[test]
    fn test_oldest_slot_is_evicted() {
        let mut file = file_with_blocks::<2>(3);
        file.load_block(0, true).unwrap();
        file.load_block(1, true).unwrap();
        file.load_block(2, true).unwrap();

        assert!(!file.pool.is_resident(0));
        assert!(file.pool.is_resident(1));
        assert!(file.pool.is_resident(2));
    }

    #[test]
    fn test_partial_final_block_is_completed_with_fill() {
        let device = MemoryDevice::from_bytes(vec![7u8; 100]);
        let mut file: FitsFile<MemoryDevice, 2> =
            FitsFile::open(device, FileConfig::default()).unwrap();
        let slot = file.load_block(0, true).unwrap();
        let data = &file.pool.slots[slot].data;
        assert!(data[..100].iter().all(|&b| b == 7));
        assert!(data[100..].iter().all(|&b| b == ZERO_FILL));
    }

    #[test]
    fn test_invalidate_beyond_eof_drops_synthesized_blocks() {
        let mut file = file_with_blocks::<4>(1);
        file.load_block(0, true).unwrap();
        file.load_block(5, false).unwrap();
        file.invalidate_beyond_eof();
        assert!(file.pool.is_resident(0));
        assert!(!file.pool.is_resident(5));
        assert!(!file.pool.is_dirty(5));
    }

    #[test]
    fn test_hit_rate() {
        let mut stats = BufferStats::new();
        assert_eq!(stats.hit_rate(), 0.0);
        stats.hits = 3;
        stats.misses = 1;
        assert_eq!(stats.hit_rate(), 75.0);
        stats.reset();
        assert_eq!(stats, BufferStats::default());
    }
}
