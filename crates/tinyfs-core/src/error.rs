use crate::session::SessionState;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FsError {
    #[error("file already exists: {0}")]
    AlreadyExists(String),

    #[error("file not found: {0}")]
    NotFound(String),

    #[error("no free inodes available")]
    NoFreeInode,

    #[error("no free blocks available")]
    NoFreeBlock,

    #[error("data too large: {len} bytes, max size is {max} bytes")]
    TooLarge { len: usize, max: usize },

    #[error("invalid file name {name:?}: {reason}")]
    InvalidName { name: String, reason: &'static str },

    #[error("invalid geometry: {0}")]
    InvalidGeometry(String),

    #[error("cannot {op} while the session is {state}")]
    InvalidState {
        op: &'static str,
        state: SessionState,
    },

    #[error("encode error: {0}")]
    Encode(#[from] bincode::error::EncodeError),

    #[error("decode error: {0}")]
    Decode(#[from] bincode::error::DecodeError),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = core::result::Result<T, FsError>;
