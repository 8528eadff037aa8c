//! A flat, single-directory file store inside one image file.
//!
//! [`Session`] is the entry point: open an image, mount or format it, then
//! create, write, read and list files by name. Every mutation is flushed to
//! the image before the call returns.

pub mod bitmap;
pub mod config;
pub mod device;
pub mod error;
pub mod inode;
pub mod inode_table;
pub mod session;
pub mod store;
pub mod volume;

pub use bitmap::Bitmap;
pub use config::{Config, DEFAULT_IMAGE};
pub use device::{BlockDevice, FileBlockDevice, MemoryBlockDevice};
pub use error::{FsError, Result};
pub use inode::{FileName, Inode, Timestamp};
pub use inode_table::{FileInfo, InodeId, InodeTable};
pub use session::{MountOutcome, Session, SessionState};
pub use volume::Volume;

pub use tinyfs_fs::{Geometry, Layout, SuperBlock, BLOCK_SIZE, MAX_INODES, TOTAL_BLOCKS};
