#![no_std]

//! On-disk format of a TinyFS image.
//!
//! An image is a flat array of `total_blocks` blocks of `block_size` bytes:
//!
//! ```text
//! 0                      : Superblock
//! inode_table_start..    : Inode Table (MAX_INODES records)
//! bitmap_start..         : Bitmap (one byte per block)
//! data_start..total      : Data blocks
//! ```
//!
//! Every record is encoded with fixed-width little-endian integers so the byte
//! size of each region is known before anything is read back.

use bincode::error::{DecodeError, EncodeError};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

pub const BLOCK_SIZE: u32 = 4096;
pub const TOTAL_BLOCKS: u32 = 1024;
pub const MAX_INODES: usize = 128;
pub const MAX_FILENAME: usize = 32;
pub const INODE_DIRECT_POINTERS: usize = 10;

/// On-disk marker for a block position that has no block attached.
pub const UNUSED_BLOCK: i32 = -1;

/// Block permanently reserved for the superblock.
pub const SUPERBLOCK_BLOCK: u32 = 0;
pub const INODE_TABLE_START: u32 = 1;

// Encoded sizes (fixed-int encoding, no padding between fields)
pub const SUPERBLOCK_SIZE: usize = 6 * 4;
pub const INODE_SIZE: usize = MAX_FILENAME + 4 + INODE_DIRECT_POINTERS * 4 + 8 + 8;
pub const INODE_TABLE_SIZE: usize = MAX_INODES * INODE_SIZE;

/// Codec shared by every on-disk record.
pub fn codec() -> impl bincode::config::Config {
    bincode::config::standard().with_fixed_int_encoding()
}

/// Encodes `value` at the start of `dst`, returning the number of bytes written.
pub fn encode<T: Serialize>(value: &T, dst: &mut [u8]) -> Result<usize, EncodeError> {
    bincode::serde::encode_into_slice(value, dst, codec())
}

/// Decodes a `T` from the start of `src`; trailing bytes are ignored.
pub fn decode<T: DeserializeOwned>(src: &[u8]) -> Result<T, DecodeError> {
    bincode::serde::decode_from_slice(src, codec()).map(|(value, _)| value)
}

/// Size parameters chosen at format time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Geometry {
    pub block_size: u32,
    pub total_blocks: u32,
}

impl Geometry {
    pub const fn new(block_size: u32, total_blocks: u32) -> Self {
        Self {
            block_size,
            total_blocks,
        }
    }

    /// Exact length of an image with this geometry.
    pub fn image_len(&self) -> u64 {
        self.block_size as u64 * self.total_blocks as u64
    }

    pub fn max_file_size(&self) -> usize {
        self.block_size as usize * INODE_DIRECT_POINTERS
    }

    /// Computes the region layout, or `None` for a zero block size.
    pub fn layout(&self) -> Option<Layout> {
        Layout::compute(*self)
    }
}

impl Default for Geometry {
    fn default() -> Self {
        Self::new(BLOCK_SIZE, TOTAL_BLOCKS)
    }
}

/// Start block of each metadata region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Layout {
    pub inode_table_start: u32,
    pub bitmap_start: u32,
    pub data_start: u32,
}

impl Layout {
    pub fn compute(geometry: Geometry) -> Option<Self> {
        if geometry.block_size == 0 {
            return None;
        }

        let block_size = geometry.block_size as u64;
        let inode_table_blocks = (INODE_TABLE_SIZE as u64).div_ceil(block_size);
        let bitmap_blocks = (geometry.total_blocks as u64).div_ceil(block_size);

        let bitmap_start = INODE_TABLE_START as u64 + inode_table_blocks;
        let data_start = bitmap_start + bitmap_blocks;

        Some(Self {
            inode_table_start: INODE_TABLE_START,
            bitmap_start: u32::try_from(bitmap_start).ok()?,
            data_start: u32::try_from(data_start).ok()?,
        })
    }

    /// `inode_table_start < bitmap_start < data_start <= total_blocks`
    pub fn fits(&self, total_blocks: u32) -> bool {
        self.inode_table_start > SUPERBLOCK_BLOCK
            && self.inode_table_start < self.bitmap_start
            && self.bitmap_start < self.data_start
            && self.data_start <= total_blocks
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[repr(C)]
pub struct SuperBlock {
    pub total_blocks: u32,
    pub free_blocks: u32,
    pub block_size: u32,
    pub inode_table_start: u32,
    pub bitmap_start: u32,
    pub data_start: u32,
}

impl SuperBlock {
    /// A fresh superblock; every block except the superblock itself counts as free.
    pub fn new(geometry: Geometry, layout: Layout) -> Self {
        Self {
            total_blocks: geometry.total_blocks,
            free_blocks: geometry.total_blocks.saturating_sub(1),
            block_size: geometry.block_size,
            inode_table_start: layout.inode_table_start,
            bitmap_start: layout.bitmap_start,
            data_start: layout.data_start,
        }
    }

    pub fn geometry(&self) -> Geometry {
        Geometry::new(self.block_size, self.total_blocks)
    }

    pub fn layout(&self) -> Layout {
        Layout {
            inode_table_start: self.inode_table_start,
            bitmap_start: self.bitmap_start,
            data_start: self.data_start,
        }
    }

    pub fn inode_table_offset(&self) -> u64 {
        self.inode_table_start as u64 * self.block_size as u64
    }

    pub fn bitmap_offset(&self) -> u64 {
        self.bitmap_start as u64 * self.block_size as u64
    }
}

/// Fixed-size inode slot as stored in the Inode Table.
///
/// A slot whose first name byte is zero is free. Unused block positions hold
/// [`UNUSED_BLOCK`].
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[repr(C)]
pub struct InodeRecord {
    pub name: [u8; MAX_FILENAME],
    pub size: u32,
    pub blocks: [i32; INODE_DIRECT_POINTERS],
    pub created: i64,
    pub modified: i64,
}

impl InodeRecord {
    /// A zeroed slot, as written by format.
    pub const EMPTY: Self = Self {
        name: [0; MAX_FILENAME],
        size: 0,
        blocks: [0; INODE_DIRECT_POINTERS],
        created: 0,
        modified: 0,
    };

    pub fn is_free(&self) -> bool {
        self.name[0] == 0
    }

    /// Name bytes up to the first NUL.
    pub fn name_bytes(&self) -> &[u8] {
        let end = self
            .name
            .iter()
            .position(|&c| c == 0)
            .unwrap_or(MAX_FILENAME);
        &self.name[..end]
    }

    /// Copies `name` into a NUL-padded buffer. Bytes past `MAX_FILENAME - 1` are dropped.
    pub fn encode_name(name: &[u8]) -> [u8; MAX_FILENAME] {
        let mut buf = [0u8; MAX_FILENAME];
        let len = name.len().min(MAX_FILENAME - 1);
        buf[..len].copy_from_slice(&name[..len]);
        buf
    }
}

impl Default for InodeRecord {
    fn default() -> Self {
        Self::EMPTY
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_layout() {
        let layout = Geometry::default().layout().unwrap();
        // 128 * 92 bytes spans three 4 KiB blocks, the 1024-byte bitmap one.
        assert_eq!(layout.inode_table_start, 1);
        assert_eq!(layout.bitmap_start, 4);
        assert_eq!(layout.data_start, 5);
        assert!(layout.fits(TOTAL_BLOCKS));
    }

    #[test]
    fn layout_with_small_blocks() {
        let layout = Geometry::new(512, 2048).layout().unwrap();
        assert_eq!(layout.bitmap_start, 1 + 23);
        assert_eq!(layout.data_start, 24 + 4);
    }

    #[test]
    fn zero_block_size_has_no_layout() {
        assert_eq!(Geometry::new(0, 16).layout(), None);
    }

    #[test]
    fn layout_must_fit_total_blocks() {
        let layout = Geometry::new(4096, 4).layout().unwrap();
        assert!(!layout.fits(4));
        assert!(layout.fits(5));
    }

    #[test]
    fn encoded_sizes_match_constants() {
        let mut buf = [0u8; 128];
        let geometry = Geometry::default();
        let sb = SuperBlock::new(geometry, geometry.layout().unwrap());
        assert_eq!(encode(&sb, &mut buf).unwrap(), SUPERBLOCK_SIZE);
        assert_eq!(encode(&InodeRecord::EMPTY, &mut buf).unwrap(), INODE_SIZE);
    }

    #[test]
    fn superblock_field_order() {
        let sb = SuperBlock {
            total_blocks: 1,
            free_blocks: 2,
            block_size: 3,
            inode_table_start: 4,
            bitmap_start: 5,
            data_start: 6,
        };
        let mut buf = [0u8; SUPERBLOCK_SIZE];
        encode(&sb, &mut buf).unwrap();
        assert_eq!(&buf[0..4], &1u32.to_le_bytes());
        assert_eq!(&buf[8..12], &3u32.to_le_bytes());
        assert_eq!(&buf[20..24], &6u32.to_le_bytes());
        assert_eq!(decode::<SuperBlock>(&buf).unwrap(), sb);
    }

    #[test]
    fn unused_blocks_encode_as_minus_one() {
        let mut record = InodeRecord::EMPTY;
        record.blocks = [UNUSED_BLOCK; INODE_DIRECT_POINTERS];
        let mut buf = [0u8; INODE_SIZE];
        encode(&record, &mut buf).unwrap();
        assert_eq!(&buf[36..40], &[0xff; 4]);
    }

    #[test]
    fn short_buffer_fails_to_decode() {
        assert!(decode::<SuperBlock>(&[0u8; SUPERBLOCK_SIZE - 1]).is_err());
    }

    #[test]
    fn names_are_nul_terminated() {
        let name = InodeRecord::encode_name(b"a.txt");
        assert_eq!(&name[..6], b"a.txt\0");

        let mut record = InodeRecord::EMPTY;
        assert!(record.is_free());
        record.name = name;
        assert!(!record.is_free());
        assert_eq!(record.name_bytes(), b"a.txt");

        let long = InodeRecord::encode_name(&[b'x'; 40]);
        assert_eq!(long[MAX_FILENAME - 1], 0);
    }
}
