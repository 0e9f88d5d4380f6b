use tracing::debug;

use crate::{
    buffer_manager::{BufferPool, BufferStats},
    config::{FileConfig, Mode},
    device::Device,
    error::{Error, Result, Status},
    hdu::{HduDirectory, HduLayout},
    DEFAULT_SLOTS,
};

/// An open FITS file: the device plus everything the buffer layer tracks
/// about it.
///
/// `SLOTS` is the number of 2880-byte buffer slots the handle owns. A handle
/// is used from one thread at a time; distinct handles share nothing.
///
/// Dropping a handle discards slots that were never flushed. Call
/// [`close`](Self::close) or [`flush`](Self::flush) first.
#[derive(Debug)]
pub struct FitsFile<D: Device, const SLOTS: usize = DEFAULT_SLOTS> {
    pub(crate) device: D,
    pub(crate) pool: BufferPool<SLOTS>,
    /// First byte the next transfer touches.
    pub(crate) cursor: u64,
    /// Where the device's own pointer is, when known.
    pub(crate) io_pos: Option<u64>,
    /// Bytes physically on the device.
    pub(crate) file_size: u64,
    /// Physical size plus blocks that exist only in slots.
    pub(crate) logical_size: u64,
    pub(crate) mode: Mode,
    pub(crate) direct_threshold: usize,
    pub(crate) directory: HduDirectory,
    pub(crate) current_hdu: usize,
    pub(crate) layout: HduLayout,
    status: Option<Status>,
    pub(crate) stats: BufferStats,
}

impl<D: Device, const SLOTS: usize> FitsFile<D, SLOTS> {
    /// Starts a new, empty file on `device`, discarding anything already on
    /// it.
    pub fn create(mut device: D, config: FileConfig) -> Result<Self> {
        config.validate()?;
        if !config.mode.is_writable() {
            return Err(Error::InvalidArgument(
                "a new file must be opened for writing".to_string(),
            ));
        }
        if device.size()? > 0 {
            device.truncate(0)?;
        }
        Ok(Self::with_size(device, config, 0))
    }

    /// Opens the existing contents of `device` as a single unit with no
    /// header. Call [`select_hdu`](Self::select_hdu) and
    /// [`set_directory`](Self::set_directory) to describe the real structure.
    pub fn open(mut device: D, config: FileConfig) -> Result<Self> {
        config.validate()?;
        let size = device.size()?;
        Ok(Self::with_size(device, config, size))
    }

    fn with_size(device: D, config: FileConfig, size: u64) -> Self {
        debug!(size, slots = SLOTS, mode = ?config.mode, "opened file");
        Self {
            device,
            pool: BufferPool::new(),
            cursor: 0,
            io_pos: None,
            file_size: size,
            logical_size: size,
            mode: config.mode,
            direct_threshold: config.direct_threshold,
            directory: HduDirectory::single(size),
            current_hdu: 0,
            layout: HduLayout::image(0, 0, size),
            status: None,
            stats: BufferStats::new(),
        }
    }

    /// Flushes every dirty slot and hands the device back.
    pub fn close(mut self) -> Result<D> {
        self.flush(false)?;
        debug!(size = self.file_size, "closed file");
        Ok(self.device)
    }

    // ========================================================================
    // Status
    // ========================================================================

    /// The failure recorded by the last operation that failed, if any.
    pub fn status(&self) -> Option<Status> {
        self.status
    }

    pub fn clear_status(&mut self) {
        self.status = None;
    }

    /// Runs `op` unless a failure is already recorded, and records the
    /// failure of `op` if it fails.
    pub(crate) fn guarded<T>(&mut self, op: impl FnOnce(&mut Self) -> Result<T>) -> Result<T> {
        if let Some(status) = self.status {
            return Err(Error::Failed(status));
        }
        match op(self) {
            Ok(value) => Ok(value),
            Err(err) => {
                self.status = Some(err.status());
                Err(err)
            }
        }
    }

    // ========================================================================
    // Structure
    // ========================================================================

    pub fn hdu_directory(&self) -> &HduDirectory {
        &self.directory
    }

    pub fn current_hdu(&self) -> usize {
        self.current_hdu
    }

    pub fn layout(&self) -> &HduLayout {
        &self.layout
    }

    /// Replaces the unit directory. The current unit must exist in it.
    pub fn set_directory(&mut self, directory: HduDirectory) -> Result<()> {
        self.guarded(|file| {
            if file.current_hdu >= directory.len() {
                return Err(Error::InvalidArgument(format!(
                    "directory has {} units but unit {} is current",
                    directory.len(),
                    file.current_hdu
                )));
            }
            file.directory = directory;
            Ok(())
        })
    }

    /// Makes unit `index` current, described by `layout`.
    pub fn select_hdu(&mut self, index: usize, layout: HduLayout) -> Result<()> {
        self.guarded(|file| {
            layout.validate()?;
            match file.directory.start(index) {
                Some(start) if index < file.directory.len() && start == layout.header_start => {}
                _ => {
                    return Err(Error::InvalidArgument(format!(
                        "unit {index} does not start at {}",
                        layout.header_start
                    )))
                }
            }
            file.current_hdu = index;
            file.layout = layout;
            file.track_last_unit();
            Ok(())
        })
    }

    /// Extends the directory when the current unit is the last one and its
    /// data has grown past the recorded end.
    pub(crate) fn track_last_unit(&mut self) {
        if self.directory.is_last(self.current_hdu) {
            self.directory.extend_last(self.layout.data_end());
        }
    }

    // ========================================================================
    // Inspection
    // ========================================================================

    pub fn device(&self) -> &D {
        &self.device
    }

    pub fn stats(&self) -> BufferStats {
        self.stats
    }

    pub fn reset_stats(&mut self) {
        self.stats.reset();
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Byte position of the cursor.
    pub fn cursor(&self) -> u64 {
        self.cursor
    }

    /// Bytes physically written to the device.
    pub fn file_size(&self) -> u64 {
        self.file_size
    }

    /// Size including blocks so far held only in buffer slots.
    pub fn logical_size(&self) -> u64 {
        self.logical_size
    }

    pub fn is_resident(&self, block: u64) -> bool {
        self.pool.is_resident(block)
    }

    pub fn is_dirty(&self, block: u64) -> bool {
        self.pool.is_dirty(block)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{MemoryDevice, BLOCK_SIZE};

    const B: u64 = BLOCK_SIZE as u64;

    #[test]
    fn create_discards_existing_bytes() {
        let device = MemoryDevice::from_bytes(vec![1; 100]);
        let file: FitsFile<MemoryDevice, 2> = FitsFile::create(device, FileConfig::default()).unwrap();
        assert_eq!(file.file_size(), 0);
        assert!(file.device().is_empty());
    }

    #[test]
    fn create_requires_write_access() {
        let result: Result<FitsFile<MemoryDevice, 2>> =
            FitsFile::create(MemoryDevice::new(), FileConfig::read_only());
        assert!(matches!(result, Err(Error::InvalidArgument(_))));
    }

    #[test]
    fn open_treats_contents_as_one_unit() {
        let device = MemoryDevice::from_bytes(vec![0; 2 * BLOCK_SIZE + 10]);
        let file: FitsFile<MemoryDevice, 2> = FitsFile::open(device, FileConfig::default()).unwrap();
        assert_eq!(file.hdu_directory().as_slice(), &[0, 3 * B]);
        assert_eq!(file.layout().data_end(), 2 * B + 10);
        assert_eq!(file.logical_size(), file.file_size());
    }

    #[test]
    fn failures_stick_until_cleared() {
        let mut file: FitsFile<MemoryDevice, 2> =
            FitsFile::open(MemoryDevice::new(), FileConfig::default()).unwrap();
        assert!(matches!(
            file.position(0, true),
            Err(Error::EndOfFile { block: 0 })
        ));
        assert_eq!(file.status(), Some(Status::EndOfFile));
        assert!(matches!(
            file.position(0, false),
            Err(Error::Failed(Status::EndOfFile))
        ));

        file.clear_status();
        file.position(0, false).unwrap();
        assert_eq!(file.status(), None);
    }

    #[test]
    fn select_hdu_checks_the_directory() {
        let mut file: FitsFile<MemoryDevice, 2> =
            FitsFile::create(MemoryDevice::new(), FileConfig::default()).unwrap();
        file.set_directory(HduDirectory::new(vec![0, B, 3 * B]).unwrap()).unwrap();
        assert!(file.select_hdu(1, HduLayout::image(B, 2 * B, 100)).is_ok());
        assert_eq!(file.current_hdu(), 1);

        assert!(file.select_hdu(1, HduLayout::image(0, B, 100)).is_err());
        file.clear_status();
        assert!(file.select_hdu(2, HduLayout::image(3 * B, 3 * B, 0)).is_err());
        file.clear_status();
        assert!(file
            .set_directory(HduDirectory::single(B))
            .is_err());
    }

    #[test]
    fn select_hdu_rejects_oversized_layouts() {
        let mut file: FitsFile<MemoryDevice, 2> =
            FitsFile::create(MemoryDevice::new(), FileConfig::default()).unwrap();
        assert!(matches!(
            file.select_hdu(0, HduLayout::binary_table(0, 0, u64::MAX, 2, Vec::new())),
            Err(Error::Overflow { .. })
        ));
        assert_eq!(file.layout(), &HduLayout::image(0, 0, 0));
    }

    #[test]
    fn select_hdu_extends_a_last_unit_to_its_data() {
        let mut file: FitsFile<MemoryDevice, 2> =
            FitsFile::create(MemoryDevice::new(), FileConfig::default()).unwrap();
        assert_eq!(file.hdu_directory().as_slice(), &[0, 0]);
        file.select_hdu(0, HduLayout::image(0, B, B + 1)).unwrap();
        assert_eq!(file.hdu_directory().as_slice(), &[0, 3 * B]);
    }

    #[test]
    fn close_flushes_and_returns_the_device() {
        let mut file: FitsFile<MemoryDevice, 2> =
            FitsFile::create(MemoryDevice::new(), FileConfig::default()).unwrap();
        file.position(5, false).unwrap();
        file.write_bytes(b"END").unwrap();
        let device = file.close().unwrap();
        assert_eq!(device.len(), BLOCK_SIZE);
        assert_eq!(&device.as_bytes()[5..8], b"END");
    }
}
