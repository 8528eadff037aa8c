use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// Byte-addressed backing image.
///
/// Reads past the end of the image fail; writes past the end grow it.
pub trait BlockDevice {
    /// Device name (for logging)
    fn name(&self) -> &str;

    /// Current image length in bytes
    fn len(&self) -> io::Result<u64>;

    fn is_empty(&self) -> io::Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Grows or shrinks the image; new bytes read as zero
    fn set_len(&mut self, len: u64) -> io::Result<()>;

    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> io::Result<()>;

    fn write_at(&mut self, offset: u64, buf: &[u8]) -> io::Result<()>;

    /// Pushes buffered writes down to the image
    fn flush(&mut self) -> io::Result<()>;
}

/// Image stored in a regular host file.
#[derive(Debug)]
pub struct FileBlockDevice {
    file: File,
    path: PathBuf,
    name: String,
}

impl FileBlockDevice {
    /// Opens `path` read-write, creating an empty file if it does not exist.
    pub fn open(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)?;

        Ok(Self {
            file,
            name: path.display().to_string(),
            path,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl BlockDevice for FileBlockDevice {
    fn name(&self) -> &str {
        &self.name
    }

    fn len(&self) -> io::Result<u64> {
        Ok(self.file.metadata()?.len())
    }

    fn set_len(&mut self, len: u64) -> io::Result<()> {
        self.file.set_len(len)
    }

    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> io::Result<()> {
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.read_exact(buf)
    }

    fn write_at(&mut self, offset: u64, buf: &[u8]) -> io::Result<()> {
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.write_all(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }
}

/// Image held in memory. Used by tests and for scratch volumes.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct MemoryBlockDevice {
    data: Vec<u8>,
}

impl MemoryBlockDevice {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_bytes(data: Vec<u8>) -> Self {
        Self { data }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.data
    }
}

impl BlockDevice for MemoryBlockDevice {
    fn name(&self) -> &str {
        "memory"
    }

    fn len(&self) -> io::Result<u64> {
        Ok(self.data.len() as u64)
    }

    fn set_len(&mut self, len: u64) -> io::Result<()> {
        let len = usize::try_from(len)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "image too large"))?;
        self.data.resize(len, 0);
        Ok(())
    }

    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> io::Result<()> {
        let start = offset as usize;
        let end = start
            .checked_add(buf.len())
            .filter(|&end| end <= self.data.len())
            .ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    format!("read of {} bytes at {} past end of image", buf.len(), offset),
                )
            })?;
        buf.copy_from_slice(&self.data[start..end]);
        Ok(())
    }

    fn write_at(&mut self, offset: u64, buf: &[u8]) -> io::Result<()> {
        let start = offset as usize;
        let end = start + buf.len();
        if end > self.data.len() {
            self.data.resize(end, 0);
        }
        self.data[start..end].copy_from_slice(buf);
        Ok(())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_device_grows_on_write() {
        let mut dev = MemoryBlockDevice::new();
        assert!(dev.is_empty().unwrap());
        dev.write_at(10, &[1, 2, 3]).unwrap();
        assert_eq!(dev.len().unwrap(), 13);

        let mut buf = [0u8; 4];
        dev.read_at(9, &mut buf).unwrap();
        assert_eq!(buf, [0, 1, 2, 3]);
    }

    #[test]
    fn memory_device_read_past_end_fails() {
        let mut dev = MemoryBlockDevice::from_bytes(vec![0; 8]);
        let mut buf = [0u8; 4];
        let err = dev.read_at(6, &mut buf).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }

    #[test]
    fn file_device_round_trip() {
        let path = std::env::temp_dir().join(format!("tinyfs-device-{}.img", std::process::id()));
        let _ = std::fs::remove_file(&path);
        {
            let mut dev = FileBlockDevice::open(&path).unwrap();
            assert!(dev.is_empty().unwrap());
            dev.set_len(4096).unwrap();
            dev.write_at(512, &[0x42; 512]).unwrap();
            dev.flush().unwrap();
        }
        {
            let mut dev = FileBlockDevice::open(&path).unwrap();
            assert_eq!(dev.len().unwrap(), 4096);
            let mut buf = [0u8; 512];
            dev.read_at(512, &mut buf).unwrap();
            assert_eq!(buf, [0x42; 512]);
            dev.read_at(0, &mut buf).unwrap();
            assert_eq!(buf, [0; 512]);
        }
        std::fs::remove_file(&path).unwrap();
    }
}
