use std::{
    fs::{File, OpenOptions},
    io::{self, Read, Seek, SeekFrom, Write},
    path::{Path, PathBuf},
};

use crate::Mode;

use super::Device;

/// A FITS file on the local filesystem.
#[derive(Debug)]
pub struct FileDevice {
    path: PathBuf,
    file: File,
}

impl FileDevice {
    /// Opens an existing file.
    pub fn open<P: AsRef<Path>>(path: P, mode: Mode) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .read(true)
            .write(mode.is_writable())
            .open(&path)?;
        Ok(Self { path, file })
    }

    /// Creates a new empty file, replacing any file already at `path`.
    pub fn create<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(&path)?;
        Ok(Self { path, file })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Device for FileDevice {
    fn seek(&mut self, pos: u64) -> io::Result<()> {
        self.file.seek(SeekFrom::Start(pos)).map(|_| ())
    }

    fn read_exact(&mut self, buf: &mut [u8]) -> io::Result<()> {
        self.file.read_exact(buf)
    }

    fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        self.file.write_all(buf)
    }

    fn size(&mut self) -> io::Result<u64> {
        Ok(self.file.metadata()?.len())
    }

    fn truncate(&mut self, len: u64) -> io::Result<()> {
        self.file.set_len(len)
    }

    fn sync(&mut self) -> io::Result<()> {
        self.file.flush()?;
        self.file.sync_data()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_write_and_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("device.fits");

        let mut device = FileDevice::create(&path).unwrap();
        assert_eq!(device.size().unwrap(), 0);
        device.seek(10).unwrap();
        device.write_all(b"abc").unwrap();
        assert_eq!(device.size().unwrap(), 13);
        device.sync().unwrap();
        drop(device);

        let mut device = FileDevice::open(&path, Mode::ReadOnly).unwrap();
        let mut buf = [0u8; 3];
        device.seek(10).unwrap();
        device.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"abc");
        assert!(device.write_all(b"x").is_err());
    }

    #[test]
    fn truncate_shrinks_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut device = FileDevice::create(dir.path().join("t.fits")).unwrap();
        device.write_all(&[7u8; 100]).unwrap();
        device.truncate(40).unwrap();
        assert_eq!(device.size().unwrap(), 40);

        let mut buf = [0u8; 41];
        device.seek(0).unwrap();
        let err = device.read_exact(&mut buf).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }
}
