//! Big-endian numeric arrays on top of the byte transfer layer.

use crate::{
    device::Device,
    error::{Error, Result},
    file::FitsFile,
};

/// A numeric type stored big-endian in a FITS file.
pub trait BigEndian: Copy + Default {
    const WIDTH: usize;

    fn from_be_slice(bytes: &[u8]) -> Self;

    fn write_be(self, out: &mut [u8]);
}

macro_rules! impl_big_endian {
    ($($ty:ty),*) => {
        $(
            impl BigEndian for $ty {
                const WIDTH: usize = std::mem::size_of::<$ty>();

                fn from_be_slice(bytes: &[u8]) -> Self {
                    let mut raw = [0u8; std::mem::size_of::<$ty>()];
                    raw.copy_from_slice(bytes);
                    <$ty>::from_be_bytes(raw)
                }

                fn write_be(self, out: &mut [u8]) {
                    out.copy_from_slice(&self.to_be_bytes());
                }
            }
        )*
    };
}

impl_big_endian!(u8, i16, i32, i64, f32, f64);

impl<D: Device, const SLOTS: usize> FitsFile<D, SLOTS> {
    /// Reads `values.len()` values starting at byte `pos`, one every `incre`
    /// bytes. `incre` equal to the value width reads a contiguous array.
    pub fn read_values<T: BigEndian>(&mut self, pos: u64, incre: usize, values: &mut [T]) -> Result<()> {
        self.guarded(|file| {
            let gap = element_gap::<T>(incre)?;
            let mut raw = vec![0u8; values.len() * T::WIDTH];
            file.seek_to(pos, true)?;
            if gap == 0 {
                file.read_at_cursor(&mut raw)?;
            } else {
                file.read_strided_unguarded(T::WIDTH, values.len(), gap, &mut raw)?;
            }
            for (value, bytes) in values.iter_mut().zip(raw.chunks_exact(T::WIDTH)) {
                *value = T::from_be_slice(bytes);
            }
            Ok(())
        })
    }

    /// Writes `values` starting at byte `pos`, one every `incre` bytes.
    pub fn write_values<T: BigEndian>(&mut self, pos: u64, incre: usize, values: &[T]) -> Result<()> {
        self.guarded(|file| {
            let gap = element_gap::<T>(incre)?;
            let mut raw = vec![0u8; values.len() * T::WIDTH];
            for (value, bytes) in values.iter().zip(raw.chunks_exact_mut(T::WIDTH)) {
                value.write_be(bytes);
            }
            file.seek_to(pos, false)?;
            if gap == 0 {
                file.write_at_cursor(&raw)
            } else {
                file.write_strided_unguarded(T::WIDTH, values.len(), gap, &raw)
            }
        })
    }
}

fn element_gap<T: BigEndian>(incre: usize) -> Result<i64> {
    incre
        .checked_sub(T::WIDTH)
        .and_then(|gap| i64::try_from(gap).ok())
        .ok_or_else(|| {
            Error::InvalidArgument(format!(
                "increment of {incre} bytes is smaller than a {}-byte value",
                T::WIDTH
            ))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{FileConfig, MemoryDevice};

    fn new_file() -> FitsFile<MemoryDevice, 4> {
        FitsFile::create(MemoryDevice::new(), FileConfig::default()).unwrap()
    }

    #[test]
    fn contiguous_values_are_big_endian() {
        let mut file = new_file();
        file.write_values(10, 2, &[1i16, -2, 300]).unwrap();

        let mut raw = [0u8; 6];
        file.position(10, true).unwrap();
        file.read_bytes(&mut raw).unwrap();
        assert_eq!(raw, [0, 1, 0xff, 0xfe, 0x01, 0x2c]);

        let mut values = [0i16; 3];
        file.read_values(10, 2, &mut values).unwrap();
        assert_eq!(values, [1, -2, 300]);
    }

    #[test]
    fn strided_values_skip_the_gap() {
        let mut file = new_file();
        file.write_values(2870, 24, &[1.5f64, -2.25, 1e300]).unwrap();
        file.write_values(2878, 24, &[7i32, 8, 9]).unwrap();

        let mut floats = [0f64; 3];
        file.read_values(2870, 24, &mut floats).unwrap();
        assert_eq!(floats, [1.5, -2.25, 1e300]);

        let mut ints = [0i32; 3];
        file.read_values(2878, 24, &mut ints).unwrap();
        assert_eq!(ints, [7, 8, 9]);
    }

    #[test]
    fn increment_smaller_than_width_is_rejected() {
        let mut file = new_file();
        assert!(matches!(
            file.write_values(0, 4, &[1i64]),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn every_width_round_trips() {
        let mut file = new_file();
        file.write_values(0, 1, &[0xabu8]).unwrap();
        file.write_values(8, 4, &[f32::MIN_POSITIVE]).unwrap();
        file.write_values(16, 8, &[i64::MIN]).unwrap();

        let mut byte = [0u8];
        let mut float = [0f32];
        let mut long = [0i64];
        file.read_values(0, 1, &mut byte).unwrap();
        file.read_values(8, 4, &mut float).unwrap();
        file.read_values(16, 8, &mut long).unwrap();
        assert_eq!((byte[0], float[0], long[0]), (0xab, f32::MIN_POSITIVE, i64::MIN));
    }
}
