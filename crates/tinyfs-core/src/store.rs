use crate::device::BlockDevice;
use crate::error::Result;
use log::trace;
use std::io;
use tinyfs_fs::Geometry;

/// Block-addressed view over a [`BlockDevice`].
///
/// Block `i` covers bytes `i * block_size .. (i + 1) * block_size` of the image.
/// Metadata regions are written as byte runs starting at a block boundary.
pub struct BlockStore<D> {
    device: D,
    geometry: Geometry,
}

impl<D: BlockDevice> BlockStore<D> {
    pub fn new(device: D, geometry: Geometry) -> Self {
        Self { device, geometry }
    }

    pub fn geometry(&self) -> Geometry {
        self.geometry
    }

    pub fn block_size(&self) -> usize {
        self.geometry.block_size as usize
    }

    pub fn read_block(&mut self, index: u32, buf: &mut [u8]) -> Result<()> {
        self.check_block(index, buf.len())?;
        trace!("read block {}", index);
        self.device.read_at(self.offset(index), buf)?;
        Ok(())
    }

    pub fn write_block(&mut self, index: u32, buf: &[u8]) -> Result<()> {
        self.check_block(index, buf.len())?;
        trace!("write block {}", index);
        self.device.write_at(self.offset(index), buf)?;
        Ok(())
    }

    /// Reads `buf.len()` bytes starting at the first byte of block `start`.
    pub fn read_region(&mut self, start: u32, buf: &mut [u8]) -> Result<()> {
        self.check_region(start, buf.len())?;
        trace!("read {} bytes at block {}", buf.len(), start);
        self.device.read_at(self.offset(start), buf)?;
        Ok(())
    }

    /// Writes `bytes` starting at the first byte of block `start`.
    pub fn write_region(&mut self, start: u32, bytes: &[u8]) -> Result<()> {
        self.check_region(start, bytes.len())?;
        trace!("write {} bytes at block {}", bytes.len(), start);
        self.device.write_at(self.offset(start), bytes)?;
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        self.device.flush()?;
        Ok(())
    }

    pub fn device(&self) -> &D {
        &self.device
    }

    pub fn into_device(self) -> D {
        self.device
    }

    fn offset(&self, index: u32) -> u64 {
        index as u64 * self.geometry.block_size as u64
    }

    fn check_block(&self, index: u32, len: usize) -> io::Result<()> {
        if len != self.block_size() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("buffer must be {} bytes, got {}", self.block_size(), len),
            ));
        }
        if index >= self.geometry.total_blocks {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!(
                    "block {} out of range (total {})",
                    index, self.geometry.total_blocks
                ),
            ));
        }
        Ok(())
    }

    fn check_region(&self, start: u32, len: usize) -> io::Result<()> {
        let end = self.offset(start) + len as u64;
        if end > self.geometry.image_len() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!(
                    "region of {} bytes at block {} runs past end of image",
                    len, start
                ),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::MemoryBlockDevice;
    use crate::error::FsError;

    fn store() -> BlockStore<MemoryBlockDevice> {
        let geometry = Geometry::new(512, 16);
        let device = MemoryBlockDevice::from_bytes(vec![0; geometry.image_len() as usize]);
        BlockStore::new(device, geometry)
    }

    #[test]
    fn read_write_block() {
        let mut store = store();
        let block = vec![0x42; 512];
        store.write_block(3, &block).unwrap();

        let mut read = vec![0; 512];
        store.read_block(3, &mut read).unwrap();
        assert_eq!(read, block);
        assert_eq!(&store.device().as_bytes()[3 * 512..4 * 512], &block[..]);
    }

    #[test]
    fn block_size_mismatch() {
        let mut store = store();
        let err = store.write_block(0, &[0; 100]).unwrap_err();
        assert!(matches!(err, FsError::Io(e) if e.kind() == io::ErrorKind::InvalidInput));
    }

    #[test]
    fn block_out_of_range() {
        let mut store = store();
        let mut buf = vec![0; 512];
        assert!(store.read_block(16, &mut buf).is_err());
        assert!(store.read_block(15, &mut buf).is_ok());
    }

    #[test]
    fn regions_span_blocks() {
        let mut store = store();
        let bytes: Vec<u8> = (0..700u32).map(|i| i as u8).collect();
        store.write_region(2, &bytes).unwrap();

        let mut read = vec![0; 700];
        store.read_region(2, &mut read).unwrap();
        assert_eq!(read, bytes);
        assert!(store.write_region(15, &bytes).is_err());
    }
}
