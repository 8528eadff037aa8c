use crate::error::{FsError, Result};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};
use tinyfs_fs::{InodeRecord, INODE_DIRECT_POINTERS, MAX_FILENAME, UNUSED_BLOCK};

/// Seconds since the Unix epoch, as stored in inode records.
pub type Timestamp = i64;

pub(crate) fn now() -> Timestamp {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as Timestamp)
        .unwrap_or(0)
}

/// A non-empty file name that fits the on-disk name buffer with its terminator.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FileName(String);

impl FileName {
    pub const MAX_LEN: usize = MAX_FILENAME - 1;

    pub fn new(name: &str) -> Result<Self> {
        let reason = if name.is_empty() {
            "name is empty"
        } else if name.len() > Self::MAX_LEN {
            "name is longer than 31 bytes"
        } else if name.contains('\0') {
            "name contains a NUL byte"
        } else {
            return Ok(Self(name.to_string()));
        };

        Err(FsError::InvalidName {
            name: name.to_string(),
            reason,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FileName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for FileName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl TryFrom<&str> for FileName {
    type Error = FsError;

    fn try_from(name: &str) -> Result<Self> {
        Self::new(name)
    }
}

/// Metadata of one file.
///
/// `blocks[i]` holds the block with bytes `i * block_size ..` of the file, or
/// `None` when nothing is attached at that position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Inode {
    pub name: FileName,
    pub size: u32,
    pub blocks: [Option<u32>; INODE_DIRECT_POINTERS],
    pub created: Timestamp,
    pub modified: Timestamp,
}

impl Inode {
    pub fn new(name: FileName, now: Timestamp) -> Self {
        Self {
            name,
            size: 0,
            blocks: [None; INODE_DIRECT_POINTERS],
            created: now,
            modified: now,
        }
    }

    /// Attached blocks in file order, up to the first empty position.
    pub fn attached(&self) -> impl Iterator<Item = u32> + '_ {
        self.blocks.iter().map_while(|b| *b)
    }

    pub fn block_count(&self) -> usize {
        self.attached().count()
    }

    pub(crate) fn to_record(&self) -> InodeRecord {
        let mut blocks = [UNUSED_BLOCK; INODE_DIRECT_POINTERS];
        for (slot, block) in blocks.iter_mut().zip(self.blocks) {
            if let Some(index) = block {
                *slot = index as i32;
            }
        }

        InodeRecord {
            name: InodeRecord::encode_name(self.name.as_str().as_bytes()),
            size: self.size,
            blocks,
            created: self.created,
            modified: self.modified,
        }
    }

    /// `None` for a free slot.
    pub(crate) fn from_record(record: &InodeRecord) -> Option<Self> {
        if record.is_free() {
            return None;
        }

        let mut blocks = [None; INODE_DIRECT_POINTERS];
        for (slot, &index) in blocks.iter_mut().zip(record.blocks.iter()) {
            *slot = u32::try_from(index).ok();
        }

        // Images are always written with UTF-8 names; anything else is shown lossily.
        let name = String::from_utf8_lossy(record.name_bytes()).into_owned();

        Some(Self {
            name: FileName(name),
            size: record.size,
            blocks,
            created: record.created,
            modified: record.modified,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_name_bounds() {
        assert!(FileName::new("a.txt").is_ok());
        assert!(FileName::new(&"x".repeat(31)).is_ok());
        assert!(matches!(
            FileName::new(&"x".repeat(32)),
            Err(FsError::InvalidName { .. })
        ));
        assert!(FileName::new("").is_err());
        assert!(FileName::new("a\0b").is_err());
    }

    #[test]
    fn new_inode_is_empty() {
        let inode = Inode::new(FileName::new("a").unwrap(), 7);
        assert_eq!(inode.size, 0);
        assert_eq!(inode.blocks, [None; INODE_DIRECT_POINTERS]);
        assert_eq!((inode.created, inode.modified), (7, 7));
        assert_eq!(inode.block_count(), 0);
    }

    #[test]
    fn record_uses_sentinel_for_empty_positions() {
        let mut inode = Inode::new(FileName::new("a.txt").unwrap(), 1);
        inode.blocks[0] = Some(5);
        inode.blocks[1] = Some(9);
        inode.size = 5000;

        let record = inode.to_record();
        assert_eq!(record.blocks[..3], [5, 9, UNUSED_BLOCK]);
        assert_eq!(record.name_bytes(), b"a.txt");
        assert_eq!(Inode::from_record(&record), Some(inode));
    }

    #[test]
    fn attached_stops_at_first_gap() {
        let mut inode = Inode::new(FileName::new("a").unwrap(), 0);
        inode.blocks[0] = Some(5);
        inode.blocks[2] = Some(6);
        assert_eq!(inode.attached().collect::<Vec<_>>(), vec![5]);
    }

    #[test]
    fn free_record_has_no_inode() {
        assert_eq!(Inode::from_record(&InodeRecord::EMPTY), None);
    }
}
