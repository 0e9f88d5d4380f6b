use crate::{
    device::Device,
    error::{Error, Result},
    file::FitsFile,
};

impl<D: Device, const SLOTS: usize> FitsFile<D, SLOTS> {
    /// Reads consecutive table bytes starting at byte `first_byte` of `row`
    /// (both zero-based). The range may run on into the following rows but
    /// not past the last one.
    pub fn read_table_bytes(&mut self, row: u64, first_byte: u64, buf: &mut [u8]) -> Result<()> {
        self.guarded(|file| {
            if buf.is_empty() {
                return Ok(());
            }
            let end_row = file.end_row(row, first_byte, buf.len())?;
            if end_row >= file.layout.rows {
                return Err(Error::BadRow {
                    row: end_row,
                    rows: file.layout.rows,
                });
            }
            let pos = file.layout.row_offset(row, first_byte)?;
            file.seek_to(pos, true)?;
            file.read_at_cursor(buf)
        })
    }

    /// Writes consecutive table bytes starting at byte `first_byte` of `row`.
    ///
    /// Writing past the last row adds rows. When the table has a heap or is
    /// followed by another unit the new rows are inserted, otherwise the table
    /// simply grows into the space after it.
    pub fn write_table_bytes(&mut self, row: u64, first_byte: u64, buf: &[u8]) -> Result<()> {
        self.guarded(|file| {
            if buf.is_empty() {
                return Ok(());
            }
            let end_row = file.end_row(row, first_byte, buf.len())?;
            let rows = file.layout.rows;
            if end_row >= rows {
                let added = end_row + 1 - rows;
                if !file.directory.is_last(file.current_hdu) || file.layout.heap_size > 0 {
                    file.insert_rows_unguarded(rows, added)?;
                } else {
                    let grown = added
                        .checked_mul(file.layout.row_length)
                        .and_then(|bytes| bytes.checked_add(file.layout.heap_start))
                        .ok_or_else(|| Error::overflow("table size", end_row))?;
                    file.layout.heap_start = grown;
                    file.layout.rows = end_row + 1;
                }
            }
            let pos = file.layout.row_offset(row, first_byte)?;
            file.seek_to(pos, false)?;
            file.write_at_cursor(buf)?;
            file.track_last_unit();
            Ok(())
        })
    }

    /// Zero-based row holding the last byte of the range.
    fn end_row(&self, row: u64, first_byte: u64, len: usize) -> Result<u64> {
        let row_length = self.layout.row_length;
        if row_length == 0 {
            return Err(Error::InvalidArgument(
                "the current unit has no rows".to_string(),
            ));
        }
        first_byte
            .checked_add(len as u64 - 1)
            .and_then(|last| row.checked_add(last / row_length))
            .ok_or_else(|| Error::overflow("row number", row))
    }
}
