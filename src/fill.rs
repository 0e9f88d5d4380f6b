//! Repair of the fill bytes that pad header and data regions to a block.

use tracing::debug;

use crate::{
    block::BLANK_FILL,
    device::Device,
    error::{Error, Result},
    file::FitsFile,
    block_ceil,
};

impl<D: Device, const SLOTS: usize> FitsFile<D, SLOTS> {
    /// Makes sure the bytes after the current unit's rows and heap, up to the
    /// next block boundary, hold the data fill byte. Returns whether anything
    /// had to be written.
    pub fn repair_data_fill(&mut self) -> Result<bool> {
        self.guarded(|file| {
            //  a unit without data has no fill
            if file.layout.heap_start == 0 {
                return Ok(false);
            }
            let data_end = file.layout.data_end();
            let repaired = file.repair_fill(data_end, block_ceil(data_end), file.layout.kind.data_fill())?;
            if repaired {
                file.track_last_unit();
            }
            Ok(repaired)
        })
    }

    /// Same as [`repair_data_fill`](Self::repair_data_fill) for the blanks
    /// between the end of the header cards at `header_end` and the start of
    /// the data.
    pub fn repair_header_fill(&mut self, header_end: u64) -> Result<bool> {
        self.guarded(|file| {
            let layout = &file.layout;
            if header_end < layout.header_start || header_end > layout.data_start {
                return Err(Error::InvalidArgument(format!(
                    "header end {header_end} is outside the header at {}..{}",
                    layout.header_start, layout.data_start
                )));
            }
            file.repair_fill(header_end, file.layout.data_start, BLANK_FILL)
        })
    }

    pub(crate) fn repair_fill(&mut self, start: u64, end: u64, fill: u8) -> Result<bool> {
        if start == end {
            //  no fill, but the last byte of the region must exist
            if start == 0 {
                return Ok(false);
            }
            return match self.seek_to(start - 1, true) {
                Ok(()) => Ok(false),
                Err(Error::EndOfFile { .. }) => {
                    self.seek_to(start - 1, false)?;
                    debug!(end, "extended file to the end of the region");
                    Ok(true)
                }
                Err(err) => Err(err),
            };
        }

        let mut existing = vec![0u8; (end - start) as usize];
        let current = self
            .seek_to(start, true)
            .and_then(|()| self.read_at_cursor(&mut existing));
        match current {
            Ok(()) if existing.iter().all(|&b| b == fill) => return Ok(false),
            Ok(()) | Err(Error::EndOfFile { .. }) => {}
            Err(err) => return Err(err),
        }

        existing.fill(fill);
        self.seek_to(start, false)?;
        self.write_at_cursor(&existing)?;
        debug!(start, end, fill, "rewrote fill bytes");
        Ok(true)
    }
}
