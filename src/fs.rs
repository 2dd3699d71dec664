//! Filesystem facade handed to the mount adaptor.
//!
//! Path resolution, permission checks and open-handle reference counting
//! belong to the adaptor; this type only creates, opens and releases inodes
//! and stores directory listings as the content of directory inodes.

use alloc::sync::Arc;

use log::{debug, warn};
use spin::Once;

use crate::{
    block_store::{BlockId, BlockStore},
    error::{ExfsError, ExfsResult},
    extent::ExtentManager,
    handle::FileHandle,
    inode::{decode_directory, encode_directory, encode_inode, Directory, FileMode, Inode},
};

#[cfg(feature = "std")]
fn system_clock() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0)
}

#[cfg(not(feature = "std"))]
fn system_clock() -> u64 {
    0
}

pub struct Exfs {
    extents: ExtentManager,
    root: Once<BlockId>,
    /// Nanoseconds since the epoch
    clock: fn() -> u64,
}

impl Exfs {
    pub fn new(store: Arc<dyn BlockStore>) -> Self {
        Self {
            extents: ExtentManager::new(store),
            root: Once::new(),
            clock: system_clock,
        }
    }

    /// Replace the timestamp source.
    pub fn with_clock(mut self, clock: fn() -> u64) -> Self {
        self.clock = clock;
        self
    }

    pub fn now(&self) -> u64 {
        (self.clock)()
    }

    pub fn extents(&self) -> &ExtentManager {
        &self.extents
    }

    /// Allocate a block and persist a fresh, empty inode in it.
    pub fn create_inode(&self, mode: u32, uid: u32, gid: u32) -> ExfsResult<(BlockId, Inode)> {
        let store = self.extents.store();
        let blk_id = store.alloc()?;
        let inode = Inode::new(mode, uid, gid, self.now());
        let res = encode_inode(&inode).and_then(|bytes| store.set(blk_id, bytes));
        if let Err(e) = res {
            if let Err(re) = store.remove(blk_id) {
                warn!("leaking block {} of failed inode create: {}", blk_id, re);
            }
            return Err(e);
        }
        debug!("created inode {} mode {:o}", blk_id, mode);
        Ok((blk_id, inode))
    }

    pub fn load_inode(&self, blk_id: BlockId) -> ExfsResult<Inode> {
        self.extents.load_inode(blk_id)
    }

    pub fn open(&self, blk_id: BlockId) -> ExfsResult<FileHandle> {
        let inode = self.load_inode(blk_id)?;
        Ok(FileHandle::new(self.extents.clone(), blk_id, inode))
    }

    /// Free an inode and every block it owns. Called once the last directory
    /// entry is gone and no handle is open.
    pub fn release_inode(&self, blk_id: BlockId) -> ExfsResult<()> {
        let mut inode = self.load_inode(blk_id)?;
        self.extents.resize(blk_id, &mut inode, 0)?;
        self.extents.store().remove(blk_id)
    }

    /// Create the root directory. Later calls return the first root.
    pub fn create_root(&self, uid: u32, gid: u32) -> ExfsResult<BlockId> {
        if let Some(root) = self.root.get() {
            return Ok(*root);
        }
        let mode = FileMode::S_IFDIR | FileMode::from_bits_truncate(0o755);
        let (blk_id, inode) = self.create_inode(mode.bits(), uid, gid)?;
        let handle = FileHandle::new(self.extents.clone(), blk_id, inode);
        if let Err(e) = self.write_directory(&handle, &Directory::new()) {
            self.release_quietly(blk_id);
            return Err(e);
        }
        let root = *self.root.call_once(|| blk_id);
        if root != blk_id {
            // Lost a race with another create_root.
            self.release_quietly(blk_id);
        }
        Ok(root)
    }

    fn release_quietly(&self, blk_id: BlockId) {
        if let Err(e) = self.release_inode(blk_id) {
            warn!("leaking inode {}: {}", blk_id, e);
        }
    }

    /// Set access and modification times; ctime comes from the clock.
    pub fn set_times(&self, handle: &FileHandle, atime: u64, mtime: u64) -> ExfsResult<()> {
        handle.set_times(atime, mtime, self.now())
    }

    pub fn root(&self) -> Option<BlockId> {
        self.root.get().copied()
    }

    /// Listing stored in a directory inode. A directory that was never
    /// written is empty.
    pub fn read_directory(&self, handle: &FileHandle) -> ExfsResult<Directory> {
        let (inode, data) = handle.read_all()?;
        if !inode.is_dir() {
            return Err(ExfsError::InvalidArgument("not a directory"));
        }
        if data.is_empty() {
            return Ok(Directory::new());
        }
        decode_directory(&data)
    }

    /// Replace the content of a directory inode with `dir`.
    pub fn write_directory(&self, handle: &FileHandle, dir: &Directory) -> ExfsResult<()> {
        if !handle.attr()?.is_dir() {
            return Err(ExfsError::InvalidArgument("not a directory"));
        }
        handle.replace_content(&encode_directory(dir)?)
    }
}
