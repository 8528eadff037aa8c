use crate::error::{FsError, Result};
use std::path::PathBuf;
use tinyfs_fs::{Geometry, Layout, SuperBlock, INODE_TABLE_SIZE, SUPERBLOCK_SIZE};

pub const DEFAULT_IMAGE: &str = "filesystem.img";

/// Where the image lives and how to lay it out if it has to be formatted.
///
/// The geometry is only consulted by format; mounting takes every size from
/// the superblock already on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub image: PathBuf,
    pub geometry: Geometry,
}

impl Config {
    pub fn new(image: impl Into<PathBuf>) -> Self {
        Self {
            image: image.into(),
            geometry: Geometry::default(),
        }
    }

    pub fn with_geometry(mut self, geometry: Geometry) -> Self {
        self.geometry = geometry;
        self
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new(DEFAULT_IMAGE)
    }
}

/// Checks that `geometry` can hold every region plus at least one data block.
pub(crate) fn check_geometry(geometry: Geometry) -> Result<Layout> {
    if (geometry.block_size as usize) < SUPERBLOCK_SIZE {
        return Err(FsError::InvalidGeometry(format!(
            "block size {} is smaller than the {}-byte superblock",
            geometry.block_size, SUPERBLOCK_SIZE
        )));
    }

    // Block indices are stored as i32 in inode records.
    if geometry.total_blocks > i32::MAX as u32 {
        return Err(FsError::InvalidGeometry(format!(
            "{} blocks cannot be addressed",
            geometry.total_blocks
        )));
    }

    let layout = geometry.layout().ok_or_else(|| {
        FsError::InvalidGeometry(format!("block size {}", geometry.block_size))
    })?;

    if !layout.fits(geometry.total_blocks) || layout.data_start == geometry.total_blocks {
        return Err(FsError::InvalidGeometry(format!(
            "{} blocks leave no data region (data would start at block {})",
            geometry.total_blocks, layout.data_start
        )));
    }

    Ok(layout)
}

/// Bounds check for a superblock read back from an image of `image_len` bytes.
///
/// This only guards the region arithmetic; it does not compare the layout
/// against what format would compute today.
pub(crate) fn check_superblock(superblock: &SuperBlock, image_len: u64) -> Result<()> {
    let geometry = superblock.geometry();
    let layout = superblock.layout();
    let block_size = superblock.block_size as u64;

    if (superblock.block_size as usize) < SUPERBLOCK_SIZE || !layout.fits(superblock.total_blocks) {
        return Err(FsError::InvalidGeometry(format!(
            "superblock describes an unusable layout: {:?}",
            superblock
        )));
    }

    let inode_table_end = superblock.inode_table_offset() + INODE_TABLE_SIZE as u64;
    let bitmap_end = superblock.bitmap_offset() + superblock.total_blocks as u64;
    if inode_table_end > superblock.bitmap_offset() || bitmap_end > layout.data_start as u64 * block_size {
        return Err(FsError::InvalidGeometry(format!(
            "metadata regions overlap: {:?}",
            superblock
        )));
    }

    if image_len < geometry.image_len() {
        return Err(FsError::InvalidGeometry(format!(
            "image is {} bytes, superblock needs {}",
            image_len,
            geometry.image_len()
        )));
    }

    Ok(())
}
