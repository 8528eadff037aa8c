//! Free-block bitmap: one byte per block, `0` free and `1` used.

use crate::error::{FsError, Result};
use log::warn;

const FREE: u8 = 0;
const USED: u8 = 1;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bitmap {
    bytes: Vec<u8>,
}

impl Bitmap {
    /// All `total_blocks` entries free.
    pub fn new(total_blocks: u32) -> Self {
        Self {
            bytes: vec![FREE; total_blocks as usize],
        }
    }

    /// Wraps a bitmap region read back from an image.
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// `None` for an index outside the bitmap. Any non-zero byte counts as used.
    pub fn get(&self, index: u32) -> Option<bool> {
        self.bytes.get(index as usize).map(|&b| b != FREE)
    }

    pub fn is_used(&self, index: u32) -> bool {
        self.get(index) == Some(true)
    }

    pub fn used_count(&self) -> usize {
        self.bytes.iter().filter(|&&b| b != FREE).count()
    }

    /// First free block at or after `data_start`.
    ///
    /// Does not mark the block; the caller does that once the block is attached.
    pub fn allocate(&self, data_start: u32) -> Result<u32> {
        self.bytes
            .iter()
            .enumerate()
            .skip(data_start as usize)
            .find(|(_, b)| **b == FREE)
            .map(|(index, _)| index as u32)
            .ok_or(FsError::NoFreeBlock)
    }

    /// Sets the entry for `index`. Out-of-range indices are ignored.
    pub fn mark(&mut self, index: u32, used: bool) {
        match self.bytes.get_mut(index as usize) {
            Some(entry) => *entry = if used { USED } else { FREE },
            None => warn!(
                "ignoring bitmap mark for block {} (bitmap covers {} blocks)",
                index,
                self.bytes.len()
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_fit_from_data_start() {
        let mut bitmap = Bitmap::new(16);
        bitmap.mark(0, true);
        assert_eq!(bitmap.allocate(5).unwrap(), 5);

        bitmap.mark(5, true);
        bitmap.mark(7, true);
        assert_eq!(bitmap.allocate(5).unwrap(), 6);

        bitmap.mark(6, true);
        assert_eq!(bitmap.allocate(5).unwrap(), 8);
    }

    #[test]
    fn allocate_does_not_mark() {
        let bitmap = Bitmap::new(8);
        assert_eq!(bitmap.allocate(2).unwrap(), 2);
        assert_eq!(bitmap.allocate(2).unwrap(), 2);
        assert!(!bitmap.is_used(2));
    }

    #[test]
    fn full_bitmap_has_no_free_block() {
        let mut bitmap = Bitmap::new(8);
        for i in 3..8 {
            bitmap.mark(i, true);
        }
        assert!(matches!(bitmap.allocate(3), Err(FsError::NoFreeBlock)));
        // Free metadata blocks below data_start are never handed out.
        assert!(!bitmap.is_used(1));
    }

    #[test]
    fn out_of_range_mark_is_ignored() {
        let mut bitmap = Bitmap::new(4);
        bitmap.mark(4, true);
        bitmap.mark(u32::MAX, true);
        assert_eq!(bitmap.as_bytes(), &[0, 0, 0, 0]);
        assert_eq!(bitmap.get(4), None);
    }

    #[test]
    fn mark_free_again() {
        let mut bitmap = Bitmap::new(4);
        bitmap.mark(2, true);
        assert_eq!(bitmap.used_count(), 1);
        bitmap.mark(2, false);
        assert_eq!(bitmap.used_count(), 0);
    }
}
