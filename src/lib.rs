//! Block buffer pool and variable-length heap manager for FITS files.
//!
//! Every byte that moves between a FITS file and its callers passes through a
//! [`FitsFile`] handle. The handle owns a small fixed set of 2880-byte buffer
//! slots with least-recently-used replacement, defers writes until a slot is
//! evicted or flushed, and bypasses the slots entirely for large transfers.
//!
//! On top of the byte layer the crate manages the structural pieces of the
//! format that require moving bytes around on disk:
//!
//! - the heap of a binary table, which stores variable-length arrays located
//!   through (length, offset) descriptors in the fixed-length rows,
//! - whole-block insertion and deletion, which shifts every following
//!   structural unit (HDU) and keeps the unit directory consistent,
//! - the fill bytes that pad header and data regions to a block boundary.
//!
//! Header keywords, column scaling and coordinate systems are left to higher
//! layers. They describe the current unit through an [`HduLayout`].
//!
//! # Example
//!
//! ```
//! use fitsbuf::{FileConfig, FitsFile, MemoryDevice};
//!
//! let mut file: FitsFile<MemoryDevice> =
//!     FitsFile::create(MemoryDevice::new(), FileConfig::default()).unwrap();
//! file.position(0, false).unwrap();
//! file.write_bytes(b"SIMPLE  =                    T").unwrap();
//! file.flush(false).unwrap();
//! assert_eq!(file.device().len(), fitsbuf::BLOCK_SIZE);
//! ```

mod block;
mod buffer_manager;
mod config;
mod descriptor;
mod device;
mod error;
mod file;
mod fill;
mod hdu;
mod heap;
mod replacement;
mod resize;
mod table;
mod transfer;
mod typed;

pub use block::{Block, BLANK_FILL, ZERO_FILL};
pub use buffer_manager::BufferStats;
pub use config::{FileConfig, Mode};
pub use descriptor::{Descriptor, DescriptorFormat};
pub use device::{Device, FileDevice, MemoryDevice};
pub use error::{Error, Result, Status};
pub use file::FitsFile;
pub use hdu::{ColumnKind, ColumnSpec, ElementSize, HduDirectory, HduKind, HduLayout};
pub use heap::HeapReport;
pub use resize::InsertAt;
pub use typed::BigEndian;

/// Size in bytes of a FITS logical record. Every header and data region is
/// padded to a multiple of this.
pub const BLOCK_SIZE: usize = 2880;

/// Number of buffer slots a handle owns unless another count is chosen
/// through the `SLOTS` parameter of [`FitsFile`].
pub const DEFAULT_SLOTS: usize = 40;

/// Smallest transfer, in bytes, that goes straight to the device instead of
/// through the buffer slots.
pub const MIN_DIRECT: usize = 3 * BLOCK_SIZE;

pub(crate) const BLOCK_BYTES: u64 = BLOCK_SIZE as u64;

/// Rounds a byte offset up to the next block boundary.
pub(crate) fn block_ceil(pos: u64) -> u64 {
    pos.div_ceil(BLOCK_BYTES) * BLOCK_BYTES
}
