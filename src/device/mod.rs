//! Storage backends a [`FitsFile`](crate::FitsFile) reads and writes through.
//!
//! The buffer manager only ever talks to a [`Device`]: it seeks, moves whole
//! byte ranges, asks for the size, and truncates. Opening is backend specific
//! and lives on the concrete types.
//!
//! - [`FileDevice`]: a file on the local filesystem.
//! - [`MemoryDevice`]: a growable in-memory file, used for scratch copies of an
//!   HDU and in tests.

mod file;
mod memory;

use std::io;

pub use file::FileDevice;
pub use memory::MemoryDevice;

/// The operation set a storage backend supplies.
///
/// All calls block until complete. Positions are absolute byte offsets.
pub trait Device {
    /// Moves the device's I/O pointer.
    fn seek(&mut self, pos: u64) -> io::Result<()>;

    /// Fills `buf` from the I/O pointer, failing with
    /// [`io::ErrorKind::UnexpectedEof`] if the device ends first.
    fn read_exact(&mut self, buf: &mut [u8]) -> io::Result<()>;

    /// Writes all of `buf` at the I/O pointer, extending the device if needed.
    fn write_all(&mut self, buf: &[u8]) -> io::Result<()>;

    /// Current size of the device in bytes.
    fn size(&mut self) -> io::Result<u64>;

    /// Shrinks (or extends) the device to `len` bytes.
    fn truncate(&mut self, len: u64) -> io::Result<()>;

    fn supports_truncate(&self) -> bool {
        true
    }

    /// Pushes any backend-level buffering to stable storage.
    fn sync(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<D: Device + ?Sized> Device for Box<D> {
    fn seek(&mut self, pos: u64) -> io::Result<()> {
        (**self).seek(pos)
    }

    fn read_exact(&mut self, buf: &mut [u8]) -> io::Result<()> {
        (**self).read_exact(buf)
    }

    fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        (**self).write_all(buf)
    }

    fn size(&mut self) -> io::Result<u64> {
        (**self).size()
    }

    fn truncate(&mut self, len: u64) -> io::Result<()> {
        (**self).truncate(len)
    }

    fn supports_truncate(&self) -> bool {
        (**self).supports_truncate()
    }

    fn sync(&mut self) -> io::Result<()> {
        (**self).sync()
    }
}
