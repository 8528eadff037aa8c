use crate::error::{FsError, Result};
use crate::inode::{FileName, Inode, Timestamp};
use std::fmt;
use std::io;
use tinyfs_fs::{InodeRecord, INODE_SIZE, INODE_TABLE_SIZE, MAX_INODES};

/// Slot index in the inode table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InodeId(usize);

impl InodeId {
    pub fn index(&self) -> usize {
        self.0
    }
}

impl fmt::Display for InodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Snapshot of one file's metadata, as returned by `list` and `stat`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileInfo {
    pub id: InodeId,
    pub name: String,
    pub size: u32,
    pub created: Timestamp,
    pub modified: Timestamp,
    pub blocks: Vec<u32>,
}

impl FileInfo {
    fn new(id: InodeId, inode: &Inode) -> Self {
        Self {
            id,
            name: inode.name.to_string(),
            size: inode.size,
            created: inode.created,
            modified: inode.modified,
            blocks: inode.attached().collect(),
        }
    }
}

/// Fixed-capacity table of `MAX_INODES` slots; `None` marks a free slot.
///
/// The table is always encoded and persisted as a whole.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InodeTable {
    slots: Vec<Option<Inode>>,
}

impl InodeTable {
    pub fn new() -> Self {
        Self {
            slots: vec![None; MAX_INODES],
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Number of occupied slots.
    pub fn len(&self) -> usize {
        self.slots.iter().flatten().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn find_by_name(&self, name: &str) -> Option<InodeId> {
        self.slots
            .iter()
            .position(|slot| matches!(slot, Some(inode) if inode.name.as_str() == name))
            .map(InodeId)
    }

    pub fn get(&self, id: InodeId) -> Option<&Inode> {
        self.slots.get(id.0).and_then(Option::as_ref)
    }

    pub(crate) fn get_mut(&mut self, id: InodeId) -> Option<&mut Inode> {
        self.slots.get_mut(id.0).and_then(Option::as_mut)
    }

    /// Takes the first free slot for `name`. Persisting is left to the caller.
    pub fn create(&mut self, name: FileName, now: Timestamp) -> Result<InodeId> {
        if self.find_by_name(name.as_str()).is_some() {
            return Err(FsError::AlreadyExists(name.to_string()));
        }

        let index = self
            .slots
            .iter()
            .position(Option::is_none)
            .ok_or(FsError::NoFreeInode)?;
        self.slots[index] = Some(Inode::new(name, now));
        Ok(InodeId(index))
    }

    /// Occupied slots in table order.
    pub fn iter(&self) -> impl Iterator<Item = (InodeId, &Inode)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, slot)| slot.as_ref().map(|inode| (InodeId(i), inode)))
    }

    pub fn info(&self, id: InodeId) -> Option<FileInfo> {
        self.get(id).map(|inode| FileInfo::new(id, inode))
    }

    pub fn list(&self) -> Vec<FileInfo> {
        self.iter().map(|(id, inode)| FileInfo::new(id, inode)).collect()
    }

    /// Encodes the whole table region; free slots are written as zeroed records.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut bytes = vec![0u8; INODE_TABLE_SIZE];
        for (chunk, slot) in bytes.chunks_exact_mut(INODE_SIZE).zip(&self.slots) {
            let record = slot.as_ref().map(Inode::to_record).unwrap_or_default();
            tinyfs_fs::encode(&record, chunk)?;
        }
        Ok(bytes)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let slots = bytes
            .chunks_exact(INODE_SIZE)
            .take(MAX_INODES)
            .map(|chunk| -> Result<Option<Inode>> {
                let record: InodeRecord = tinyfs_fs::decode(chunk)?;
                Ok(Inode::from_record(&record))
            })
            .collect::<Result<Vec<_>>>()?;

        if slots.len() != MAX_INODES {
            return Err(FsError::Io(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!(
                    "inode table region is {} bytes, expected {}",
                    bytes.len(),
                    INODE_TABLE_SIZE
                ),
            )));
        }

        Ok(Self { slots })
    }
}

impl Default for InodeTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn name(s: &str) -> FileName {
        FileName::new(s).unwrap()
    }

    #[test]
    fn create_and_find() {
        let mut table = InodeTable::new();
        let a = table.create(name("a.txt"), 10).unwrap();
        let b = table.create(name("b.txt"), 11).unwrap();
        assert_eq!((a.index(), b.index()), (0, 1));
        assert_eq!(table.find_by_name("b.txt"), Some(b));
        assert_eq!(table.find_by_name("c.txt"), None);

        let inode = table.get(a).unwrap();
        assert_eq!(inode.size, 0);
        assert_eq!(inode.block_count(), 0);
    }

    #[test]
    fn duplicate_name_leaves_table_unchanged() {
        let mut table = InodeTable::new();
        table.create(name("a.txt"), 10).unwrap();
        let before = table.encode().unwrap();

        let err = table.create(name("a.txt"), 20).unwrap_err();
        assert!(matches!(err, FsError::AlreadyExists(n) if n == "a.txt"));
        assert_eq!(table.encode().unwrap(), before);
    }

    #[test]
    fn table_fills_up() {
        let mut table = InodeTable::new();
        for i in 0..MAX_INODES {
            table.create(name(&format!("f{}", i)), 0).unwrap();
        }
        assert_eq!(table.len(), MAX_INODES);
        assert!(matches!(
            table.create(name("one-more"), 0),
            Err(FsError::NoFreeInode)
        ));
    }

    #[test]
    fn list_in_table_order() {
        let mut table = InodeTable::new();
        table.create(name("z"), 1).unwrap();
        table.create(name("a"), 2).unwrap();
        let names: Vec<_> = table.list().into_iter().map(|f| f.name).collect();
        assert_eq!(names, vec!["z", "a"]);
    }

    #[test]
    fn encoded_table_decodes_to_same_slots() {
        let mut table = InodeTable::new();
        let id = table.create(name("a.txt"), 42).unwrap();
        {
            let inode = table.get_mut(id).unwrap();
            inode.blocks[0] = Some(5);
            inode.size = 11;
        }

        let bytes = table.encode().unwrap();
        assert_eq!(bytes.len(), INODE_TABLE_SIZE);
        assert_eq!(InodeTable::decode(&bytes).unwrap(), table);
        // Slot 1 onwards is zeroed.
        assert!(bytes[INODE_SIZE..].iter().all(|&b| b == 0));
    }

    #[test]
    fn zeroed_region_is_an_empty_table() {
        let table = InodeTable::decode(&vec![0u8; INODE_TABLE_SIZE]).unwrap();
        assert!(table.is_empty());
        assert_eq!(table.capacity(), MAX_INODES);
    }

    #[test]
    fn short_region_fails() {
        assert!(InodeTable::decode(&[0u8; INODE_SIZE]).is_err());
    }
}
