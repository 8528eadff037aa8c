use crate::bitmap::Bitmap;
use crate::config::Config;
use crate::device::{BlockDevice, FileBlockDevice};
use crate::error::{FsError, Result};
use crate::inode_table::{FileInfo, InodeId};
use crate::volume::Volume;
use log::info;
use std::fmt;
use std::mem;
use tinyfs_fs::{Geometry, SuperBlock};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Unopened,
    Mounted,
    Closed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SessionState::Unopened => "unopened",
            SessionState::Mounted => "mounted",
            SessionState::Closed => "closed",
        };
        f.write_str(s)
    }
}

/// Which path [`Session::mount_or_format`] took.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MountOutcome {
    Formatted,
    Mounted,
}

enum State<D> {
    Unopened(D),
    Mounted(Volume<D>),
    Closed,
}

impl<D> State<D> {
    fn kind(&self) -> SessionState {
        match self {
            State::Unopened(_) => SessionState::Unopened,
            State::Mounted(_) => SessionState::Mounted,
            State::Closed => SessionState::Closed,
        }
    }
}

/// Owns one backing image through its lifecycle:
/// `Unopened -> (format | mount) -> Mounted -> close -> Closed`.
///
/// File operations are only valid while mounted. A failed format or mount
/// releases the device and leaves the session closed. Not safe for shared
/// use; callers serialize access themselves.
pub struct Session<D = FileBlockDevice> {
    state: State<D>,
    geometry: Geometry,
}

impl Session<FileBlockDevice> {
    /// Opens (or creates) the image named by `config`. Nothing is read yet.
    pub fn open(config: &Config) -> Result<Self> {
        let device = FileBlockDevice::open(&config.image)?;
        Ok(Self::new(device, config.geometry))
    }
}

impl<D: BlockDevice> Session<D> {
    /// `geometry` is only used if the image ends up being formatted.
    pub fn new(device: D, geometry: Geometry) -> Self {
        Self {
            state: State::Unopened(device),
            geometry,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state.kind()
    }

    /// Mounts the image if it has any content, formats it otherwise.
    pub fn mount_or_format(&mut self) -> Result<MountOutcome> {
        let empty = match &self.state {
            State::Unopened(device) => device.is_empty()?,
            other => {
                return Err(FsError::InvalidState {
                    op: "mount",
                    state: other.kind(),
                })
            }
        };

        if empty {
            self.format()?;
            Ok(MountOutcome::Formatted)
        } else {
            self.mount()?;
            Ok(MountOutcome::Mounted)
        }
    }

    pub fn format(&mut self) -> Result<()> {
        let device = self.take_unopened("format")?;
        let volume = Volume::format(device, self.geometry)?;
        self.state = State::Mounted(volume);
        Ok(())
    }

    pub fn mount(&mut self) -> Result<()> {
        let device = self.take_unopened("mount")?;
        let volume = Volume::mount(device)?;
        self.state = State::Mounted(volume);
        Ok(())
    }

    /// Releases the backing device. Every mutation is already on disk.
    pub fn close(&mut self) -> Result<D> {
        match mem::replace(&mut self.state, State::Closed) {
            State::Mounted(volume) => {
                info!("Closed {}", volume.device().name());
                Ok(volume.into_device())
            }
            other => {
                let state = other.kind();
                self.state = other;
                Err(FsError::InvalidState { op: "close", state })
            }
        }
    }

    pub fn create(&mut self, name: &str) -> Result<InodeId> {
        self.volume_mut("create")?.create(name)
    }

    pub fn write(&mut self, name: &str, data: &[u8]) -> Result<()> {
        self.volume_mut("write")?.write(name, data)
    }

    pub fn read(&mut self, name: &str) -> Result<Vec<u8>> {
        self.volume_mut("read")?.read(name)
    }

    pub fn list(&self) -> Result<Vec<FileInfo>> {
        Ok(self.volume("list")?.list())
    }

    pub fn stat(&self, name: &str) -> Result<FileInfo> {
        self.volume("stat")?.stat(name)
    }

    pub fn superblock(&self) -> Result<&SuperBlock> {
        Ok(self.volume("inspect")?.superblock())
    }

    pub fn bitmap(&self) -> Result<&Bitmap> {
        Ok(self.volume("inspect")?.bitmap())
    }

    fn take_unopened(&mut self, op: &'static str) -> Result<D> {
        match mem::replace(&mut self.state, State::Closed) {
            State::Unopened(device) => Ok(device),
            other => {
                let state = other.kind();
                self.state = other;
                Err(FsError::InvalidState { op, state })
            }
        }
    }

    fn volume(&self, op: &'static str) -> Result<&Volume<D>> {
        match &self.state {
            State::Mounted(volume) => Ok(volume),
            other => Err(FsError::InvalidState {
                op,
                state: other.kind(),
            }),
        }
    }

    fn volume_mut(&mut self, op: &'static str) -> Result<&mut Volume<D>> {
        match &mut self.state {
            State::Mounted(volume) => Ok(volume),
            other => Err(FsError::InvalidState {
                op,
                state: other.kind(),
            }),
        }
    }
}
