//! Write-back of dirty slots.

use tracing::{debug, warn};

use crate::{
    device::Device,
    error::{Error, Result},
    file::FitsFile,
    BLOCK_BYTES, BLOCK_SIZE,
};

use super::block_start;

static ZEROS: [u8; BLOCK_SIZE] = [0; BLOCK_SIZE];

impl<D: Device, const SLOTS: usize> FitsFile<D, SLOTS> {
    /// Writes every dirty slot back to the device, in slot order, then syncs
    /// the device. With `clear` every slot is forgotten afterwards so the next
    /// access rereads the file.
    ///
    /// On a read-only file the dirty flags are dropped and
    /// [`Error::ReadOnly`] is returned.
    pub fn flush(&mut self, clear: bool) -> Result<()> {
        self.guarded(|file| file.flush_slots(clear))
    }

    pub(crate) fn flush_slots(&mut self, clear: bool) -> Result<()> {
        let mut read_only = false;
        for slot in 0..SLOTS {
            let pending = &self.pool.slots[slot];
            if pending.block.is_some() && pending.dirty {
                match self.write_back(slot) {
                    Ok(()) => {}
                    Err(Error::ReadOnly) => read_only = true,
                    Err(err) => return Err(err),
                }
            }
        }
        if clear {
            self.pool.forget_all();
        }
        if read_only {
            return Err(Error::ReadOnly);
        }
        self.device.sync()?;
        Ok(())
    }

    /// Writes one slot to the device.
    ///
    /// A block beyond the physical end cannot be written on its own: every
    /// resident block between the end and the target goes first, in
    /// ascending order, and zero blocks fill the gaps no slot covers.
    pub(crate) fn write_back(&mut self, slot: usize) -> Result<()> {
        let Some(block) = self.pool.slots[slot].block else {
            self.pool.slots[slot].dirty = false;
            return Ok(());
        };

        if !self.mode.is_writable() {
            self.pool.slots[slot].dirty = false;
            warn!(block, "discarding modified block of a read-only file");
            return Err(Error::ReadOnly);
        }

        let pos = block_start(block)?;
        if pos <= self.file_size {
            self.write_slot(slot, pos)?;
            self.file_size = self.file_size.max(pos + BLOCK_BYTES);
            self.pool.slots[slot].dirty = false;
            debug!(block, slot, "wrote back block");
            return Ok(());
        }

        loop {
            let first = self.file_size / BLOCK_BYTES;
            let (next_slot, next_block) = self
                .pool
                .lowest_between(first, block)
                .unwrap_or((slot, block));
            let next_pos = block_start(next_block)?;

            while self.file_size < next_pos {
                let gap = (next_pos - self.file_size).min(BLOCK_BYTES) as usize;
                self.device_write(self.file_size, &ZEROS[..gap])?;
                self.file_size += gap as u64;
            }

            self.write_slot(next_slot, next_pos)?;
            self.pool.slots[next_slot].dirty = false;
            self.file_size = next_pos + BLOCK_BYTES;
            debug!(block = next_block, slot = next_slot, "appended block");

            if next_slot == slot {
                return Ok(());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::{BufferStats, FileConfig, FitsFile, MemoryDevice, Mode, BLOCK_SIZE};

    fn new_file() -> FitsFile<MemoryDevice, 4> {
        FitsFile::create(MemoryDevice::new(), FileConfig::default()).unwrap()
    }

    #[test]
    fn test_second_flush_writes_nothing() {
        let mut file = new_file();
        file.position(10, false).unwrap();
        file.write_bytes(b"payload").unwrap();

        file.flush(false).unwrap();
        assert_eq!(file.stats().device_writes, 1);
        file.flush(false).unwrap();
        assert_eq!(file.stats().device_writes, 1);
        assert_eq!(&file.device().as_bytes()[10..17], b"payload");
    }

    #[test]
    fn test_write_back_beyond_end_keeps_file_contiguous() {
        let mut file = new_file();
        file.position(3 * BLOCK_SIZE as u64, false).unwrap();
        file.write_bytes(b"three").unwrap();
        file.position(BLOCK_SIZE as u64, false).unwrap();
        file.write_bytes(b"one").unwrap();

        file.flush(false).unwrap();
        let bytes = file.device().as_bytes();
        assert_eq!(bytes.len(), 4 * BLOCK_SIZE);
        assert!(bytes[..BLOCK_SIZE].iter().all(|&b| b == 0));
        assert_eq!(&bytes[BLOCK_SIZE..BLOCK_SIZE + 3], b"one");
        assert!(bytes[2 * BLOCK_SIZE..3 * BLOCK_SIZE].iter().all(|&b| b == 0));
        assert_eq!(&bytes[3 * BLOCK_SIZE..3 * BLOCK_SIZE + 5], b"three");
    }

    #[test]
    fn test_flush_with_clear_forgets_slots() {
        let mut file = new_file();
        file.position(0, false).unwrap();
        file.write_bytes(b"x").unwrap();
        file.flush(true).unwrap();
        assert!(!file.is_resident(0));

        let mut byte = [0u8; 1];
        file.position(0, true).unwrap();
        file.read_bytes(&mut byte).unwrap();
        assert_eq!(&byte, b"x");
        assert_eq!(file.stats().misses, 2);
    }

    #[test]
    fn test_read_only_flush_drops_dirty_blocks() {
        let device = MemoryDevice::from_bytes(vec![b'A'; BLOCK_SIZE]);
        let mut file: FitsFile<MemoryDevice, 4> =
            FitsFile::open(device, FileConfig::default().with_mode(Mode::ReadOnly)).unwrap();
        file.position(0, true).unwrap();
        file.write_bytes(b"B").unwrap();
        assert!(file.is_dirty(0));

        assert!(matches!(file.flush(false), Err(crate::Error::ReadOnly)));
        assert!(!file.is_dirty(0));
        file.clear_status();
        file.flush(false).unwrap();
        assert_eq!(file.device().as_bytes()[0], b'A');
        assert_eq!(file.stats().device_writes, BufferStats::default().device_writes);
    }
}
