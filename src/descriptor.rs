//! Heap descriptors stored in the fixed-length rows of a binary table.

use crate::{
    device::Device,
    error::{Error, Result},
    file::FitsFile,
    hdu::ElementSize,
};

/// Encoding of a variable-length array descriptor.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DescriptorFormat {
    /// Two 32-bit big-endian integers.
    P,
    /// Two 64-bit big-endian integers.
    Q,
}

impl DescriptorFormat {
    /// Bytes taken by one descriptor.
    pub fn width(self) -> usize {
        match self {
            DescriptorFormat::P => 8,
            DescriptorFormat::Q => 16,
        }
    }
}

/// Element count and heap byte offset of one variable-length array.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct Descriptor {
    pub length: i64,
    pub offset: i64,
}

impl Descriptor {
    pub fn new(length: i64, offset: i64) -> Self {
        Self { length, offset }
    }

    pub(crate) fn decode(format: DescriptorFormat, bytes: &[u8]) -> Self {
        match format {
            DescriptorFormat::P => {
                let mut length = [0u8; 4];
                let mut offset = [0u8; 4];
                length.copy_from_slice(&bytes[..4]);
                offset.copy_from_slice(&bytes[4..8]);
                Self {
                    length: i64::from(u32::from_be_bytes(length)),
                    offset: i64::from(u32::from_be_bytes(offset)),
                }
            }
            DescriptorFormat::Q => {
                let mut length = [0u8; 8];
                let mut offset = [0u8; 8];
                length.copy_from_slice(&bytes[..8]);
                offset.copy_from_slice(&bytes[8..16]);
                Self {
                    length: i64::from_be_bytes(length),
                    offset: i64::from_be_bytes(offset),
                }
            }
        }
    }

    /// Encodes into `out`, which must be `format.width()` bytes long.
    pub(crate) fn encode(&self, format: DescriptorFormat, out: &mut [u8]) -> Result<()> {
        match format {
            DescriptorFormat::P => {
                let length = u32::try_from(self.length)
                    .map_err(|_| Error::overflow("descriptor length", self.length))?;
                let offset = u32::try_from(self.offset)
                    .map_err(|_| Error::overflow("heap offset", self.offset))?;
                out[..4].copy_from_slice(&length.to_be_bytes());
                out[4..8].copy_from_slice(&offset.to_be_bytes());
            }
            DescriptorFormat::Q => {
                out[..8].copy_from_slice(&self.length.to_be_bytes());
                out[8..16].copy_from_slice(&self.offset.to_be_bytes());
            }
        }
        Ok(())
    }

    /// Heap bytes the array takes, `None` for negative or oversized lengths.
    pub(crate) fn payload_bytes(&self, element: ElementSize) -> Option<u64> {
        u64::try_from(self.length)
            .ok()
            .and_then(|length| element.payload_bytes(length))
    }
}

impl<D: Device, const SLOTS: usize> FitsFile<D, SLOTS> {
    /// Reads the descriptor of `column` in `row` (both zero-based).
    pub fn get_descriptor(&mut self, column: usize, row: u64) -> Result<Descriptor> {
        self.guarded(|file| file.read_descriptor(column, row))
    }

    /// Stores a descriptor. With the `P` format both values must fit in 32
    /// unsigned bits, otherwise [`Error::Overflow`] is returned and nothing is
    /// written.
    pub fn put_descriptor(&mut self, column: usize, row: u64, descriptor: Descriptor) -> Result<()> {
        self.guarded(|file| file.write_descriptor(column, row, descriptor))
    }

    /// Byte position of a descriptor and its format.
    fn descriptor_slot(&self, column: usize, row: u64) -> Result<(u64, DescriptorFormat, ElementSize)> {
        let spec = self.layout.column(column)?;
        let (format, element) = spec.var_array_parts().ok_or(Error::NotVarColumn(column))?;
        if row >= self.layout.rows {
            return Err(Error::BadRow {
                row,
                rows: self.layout.rows,
            });
        }
        let pos = self.layout.row_offset(row, spec.offset)?;
        Ok((pos, format, element))
    }

    pub(crate) fn var_element(&self, column: usize) -> Result<ElementSize> {
        let spec = self.layout.column(column)?;
        spec.var_array_parts()
            .map(|(_, element)| element)
            .ok_or(Error::NotVarColumn(column))
    }

    pub(crate) fn read_descriptor(&mut self, column: usize, row: u64) -> Result<Descriptor> {
        let (pos, format, _) = self.descriptor_slot(column, row)?;
        let mut raw = [0u8; 16];
        let raw = &mut raw[..format.width()];
        self.seek_to(pos, true)?;
        self.read_at_cursor(raw)?;
        Ok(Descriptor::decode(format, raw))
    }

    pub(crate) fn write_descriptor(
        &mut self,
        column: usize,
        row: u64,
        descriptor: Descriptor,
    ) -> Result<()> {
        let (pos, format, _) = self.descriptor_slot(column, row)?;
        let mut raw = [0u8; 16];
        let raw = &mut raw[..format.width()];
        descriptor.encode(format, raw)?;
        self.seek_to(pos, false)?;
        self.write_at_cursor(raw)
    }
}
