use std::io;

use super::Device;

/// A growable file held entirely in memory.
#[derive(Debug, Default, Clone)]
pub struct MemoryDevice {
    bytes: Vec<u8>,
    pos: usize,
}

impl MemoryDevice {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self { bytes, pos: 0 }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

fn out_of_range(pos: u64) -> io::Error {
    io::Error::new(
        io::ErrorKind::InvalidInput,
        format!("position {pos} is not addressable in memory"),
    )
}

impl Device for MemoryDevice {
    fn seek(&mut self, pos: u64) -> io::Result<()> {
        self.pos = usize::try_from(pos).map_err(|_| out_of_range(pos))?;
        Ok(())
    }

    fn read_exact(&mut self, buf: &mut [u8]) -> io::Result<()> {
        let end = self.pos + buf.len();
        if end > self.bytes.len() {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("read of {} bytes at {} passes the end", buf.len(), self.pos),
            ));
        }
        buf.copy_from_slice(&self.bytes[self.pos..end]);
        self.pos = end;
        Ok(())
    }

    fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        let end = self.pos + buf.len();
        if end > self.bytes.len() {
            //  a seek past the end leaves a zero-filled gap, like a sparse file
            self.bytes.resize(end, 0);
        }
        self.bytes[self.pos..end].copy_from_slice(buf);
        self.pos = end;
        Ok(())
    }

    fn size(&mut self) -> io::Result<u64> {
        Ok(self.bytes.len() as u64)
    }

    fn truncate(&mut self, len: u64) -> io::Result<()> {
        let len = usize::try_from(len).map_err(|_| out_of_range(len))?;
        self.bytes.resize(len, 0);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_past_the_end_grow_the_buffer() {
        let mut device = MemoryDevice::new();
        device.seek(4).unwrap();
        device.write_all(b"xy").unwrap();
        assert_eq!(device.as_bytes(), &[0, 0, 0, 0, b'x', b'y']);
    }

    #[test]
    fn short_read_is_unexpected_eof() {
        let mut device = MemoryDevice::from_bytes(vec![1, 2, 3]);
        let mut buf = [0u8; 4];
        let err = device.read_exact(&mut buf).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);

        device.seek(1).unwrap();
        let mut buf = [0u8; 2];
        device.read_exact(&mut buf).unwrap();
        assert_eq!(buf, [2, 3]);
    }

    #[test]
    fn truncate_resizes() {
        let mut device = MemoryDevice::from_bytes(vec![9; 10]);
        device.truncate(3).unwrap();
        assert_eq!(device.size().unwrap(), 3);
    }
}
