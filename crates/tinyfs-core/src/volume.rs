use crate::bitmap::Bitmap;
use crate::config::{check_geometry, check_superblock};
use crate::device::BlockDevice;
use crate::error::{FsError, Result};
use crate::inode::{now, FileName, Inode};
use crate::inode_table::{FileInfo, InodeId, InodeTable};
use crate::store::BlockStore;
use log::{debug, info};
use tinyfs_fs::{Geometry, SuperBlock, INODE_TABLE_SIZE, SUPERBLOCK_BLOCK, SUPERBLOCK_SIZE};

/// A formatted or mounted image.
///
/// Holds in-memory copies of the superblock, inode table and bitmap. Every
/// mutation is written back before the operation returns, one region at a
/// time; there is no atomic commit across regions.
pub struct Volume<D> {
    store: BlockStore<D>,
    superblock: SuperBlock,
    inodes: InodeTable,
    bitmap: Bitmap,
}

impl<D: BlockDevice> Volume<D> {
    /// Lays out a fresh image on `device`, discarding whatever it held.
    ///
    /// The image is resized to exactly `total_blocks * block_size` bytes, the
    /// data region is zero-filled, and the superblock, inode table and bitmap
    /// are flushed in that order.
    pub fn format(mut device: D, geometry: Geometry) -> Result<Self> {
        let layout = check_geometry(geometry)?;
        device.set_len(geometry.image_len())?;

        let mut store = BlockStore::new(device, geometry);
        let superblock = SuperBlock::new(geometry, layout);
        let inodes = InodeTable::new();
        let mut bitmap = Bitmap::new(geometry.total_blocks);
        bitmap.mark(SUPERBLOCK_BLOCK, true);

        let zero = vec![0u8; store.block_size()];
        for block in layout.data_start..geometry.total_blocks {
            store.write_block(block, &zero)?;
        }

        let mut volume = Self {
            store,
            superblock,
            inodes,
            bitmap,
        };
        volume.flush_superblock()?;
        volume.flush_inode_table()?;
        volume.flush_bitmap()?;

        info!(
            "Formatted {}: {} blocks of {} bytes, inode table at {}, bitmap at {}, data at {}",
            volume.store.device().name(),
            geometry.total_blocks,
            geometry.block_size,
            layout.inode_table_start,
            layout.bitmap_start,
            layout.data_start
        );

        Ok(volume)
    }

    /// Loads the metadata regions of an existing image verbatim.
    ///
    /// Region offsets come from the superblock as stored; there is no magic
    /// number or version to check, so an image written with a different record
    /// layout is misread rather than rejected.
    pub fn mount(mut device: D) -> Result<Self> {
        let mut buf = [0u8; SUPERBLOCK_SIZE];
        device.read_at(0, &mut buf)?;
        let superblock: SuperBlock = tinyfs_fs::decode(&buf)?;
        check_superblock(&superblock, device.len()?)?;

        let mut store = BlockStore::new(device, superblock.geometry());

        let mut table = vec![0u8; INODE_TABLE_SIZE];
        store.read_region(superblock.inode_table_start, &mut table)?;
        let inodes = InodeTable::decode(&table)?;

        let mut bits = vec![0u8; superblock.total_blocks as usize];
        store.read_region(superblock.bitmap_start, &mut bits)?;
        let bitmap = Bitmap::from_bytes(bits);

        info!(
            "Mounted {}: {} blocks, {} free, {} files",
            store.device().name(),
            superblock.total_blocks,
            superblock.free_blocks,
            inodes.len()
        );

        Ok(Self {
            store,
            superblock,
            inodes,
            bitmap,
        })
    }

    pub fn superblock(&self) -> &SuperBlock {
        &self.superblock
    }

    pub fn bitmap(&self) -> &Bitmap {
        &self.bitmap
    }

    pub fn inodes(&self) -> &InodeTable {
        &self.inodes
    }

    pub fn device(&self) -> &D {
        self.store.device()
    }

    pub fn into_device(self) -> D {
        self.store.into_device()
    }

    pub fn find_by_name(&self, name: &str) -> Option<InodeId> {
        self.inodes.find_by_name(name)
    }

    pub fn stat(&self, name: &str) -> Result<FileInfo> {
        self.lookup(name)
            .and_then(|id| self.inodes.info(id).ok_or_else(|| not_found(name)))
    }

    pub fn create(&mut self, name: &str) -> Result<InodeId> {
        let name = FileName::new(name)?;
        let id = self.inodes.create(name, now())?;
        self.flush_inode_table()?;

        debug!("Created {} with inode {}", self.inode_name(id), id);
        Ok(id)
    }

    /// Replaces the content of `name` with `data`.
    ///
    /// Positions that already have a block are overwritten in place; missing
    /// ones are allocated first-fit. Blocks attached before a `NoFreeBlock`
    /// failure stay attached and the size is left unchanged. Positions past
    /// the new length keep their blocks.
    pub fn write(&mut self, name: &str, data: &[u8]) -> Result<()> {
        let id = self.lookup(name)?;
        let max = self.superblock.geometry().max_file_size();
        if data.len() > max {
            return Err(FsError::TooLarge {
                len: data.len(),
                max,
            });
        }

        let block_size = self.store.block_size();
        let blocks_needed = data.len().div_ceil(block_size);

        for position in 0..blocks_needed {
            if self.inode_mut(id, name)?.blocks[position].is_some() {
                continue;
            }

            let block = match self.bitmap.allocate(self.superblock.data_start) {
                Ok(block) => block,
                Err(err) => {
                    // Keep on-disk attachments in step with memory before bailing.
                    self.flush_inode_table()?;
                    return Err(err);
                }
            };

            self.bitmap.mark(block, true);
            self.superblock.free_blocks = self.superblock.free_blocks.saturating_sub(1);
            self.inode_mut(id, name)?.blocks[position] = Some(block);
            debug!("Allocated block {} for {} at position {}", block, name, position);

            self.flush_bitmap()?;
            self.flush_superblock()?;
        }

        let blocks: Vec<u32> = self.inode_mut(id, name)?.blocks[..blocks_needed]
            .iter()
            .flatten()
            .copied()
            .collect();

        let mut buf = vec![0u8; block_size];
        for (chunk, block) in data.chunks(block_size).zip(blocks) {
            buf.fill(0);
            buf[..chunk.len()].copy_from_slice(chunk);
            self.store.write_block(block, &buf)?;
        }

        let inode = self.inode_mut(id, name)?;
        inode.size = data.len() as u32;
        inode.modified = now();
        self.flush_inode_table()?;

        debug!("Wrote {} bytes to {} ({} blocks)", data.len(), name, blocks_needed);
        Ok(())
    }

    /// Returns the first `size` bytes of `name`, stopping at the first
    /// position without a block.
    pub fn read(&mut self, name: &str) -> Result<Vec<u8>> {
        let id = self.lookup(name)?;
        let inode = self.inodes.get(id).ok_or_else(|| not_found(name))?;
        let size = inode.size as usize;
        let blocks: Vec<u32> = inode.attached().collect();

        let mut data = Vec::with_capacity(size);
        if size == 0 {
            return Ok(data);
        }

        let mut buf = vec![0u8; self.store.block_size()];
        for block in blocks {
            if data.len() >= size {
                break;
            }
            self.store.read_block(block, &mut buf)?;
            let take = (size - data.len()).min(buf.len());
            data.extend_from_slice(&buf[..take]);
        }

        Ok(data)
    }

    pub fn list(&self) -> Vec<FileInfo> {
        self.inodes.list()
    }

    fn lookup(&self, name: &str) -> Result<InodeId> {
        self.inodes.find_by_name(name).ok_or_else(|| not_found(name))
    }

    fn inode_mut(&mut self, id: InodeId, name: &str) -> Result<&mut Inode> {
        self.inodes.get_mut(id).ok_or_else(|| not_found(name))
    }

    fn inode_name(&self, id: InodeId) -> &str {
        self.inodes.get(id).map_or("", |inode| inode.name.as_str())
    }

    fn flush_superblock(&mut self) -> Result<()> {
        let mut buf = [0u8; SUPERBLOCK_SIZE];
        tinyfs_fs::encode(&self.superblock, &mut buf)?;
        self.store.write_region(SUPERBLOCK_BLOCK, &buf)?;
        self.store.flush()
    }

    fn flush_inode_table(&mut self) -> Result<()> {
        let bytes = self.inodes.encode()?;
        self.store
            .write_region(self.superblock.inode_table_start, &bytes)?;
        self.store.flush()
    }

    fn flush_bitmap(&mut self) -> Result<()> {
        self.store
            .write_region(self.superblock.bitmap_start, self.bitmap.as_bytes())?;
        self.store.flush()
    }
}

fn not_found(name: &str) -> FsError {
    FsError::NotFound(name.to_string())
}
