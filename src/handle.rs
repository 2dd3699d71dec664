//! Per-open-file handle.
//!
//! A handle owns the working copy of one inode. Reads share the lock, writes
//! and resizes take it exclusively, so no two mutators ever hold diverging
//! copies of the same inode through one handle. Other handles only see the
//! changes once they reload the inode from the store.

use alloc::vec::Vec;

use spin::RwLock;

use crate::{
    block_store::BlockId,
    error::{ExfsError, ExfsResult},
    extent::ExtentManager,
    inode::Inode,
};

struct HandleState {
    inode: Inode,
    opening: bool,
}

pub struct FileHandle {
    extents: ExtentManager,
    /// Block holding the persisted inode
    inode_blk: BlockId,
    state: RwLock<HandleState>,
}

fn offset(off: i64) -> ExfsResult<u64> {
    u64::try_from(off).map_err(|_| ExfsError::InvalidArgument("negative offset"))
}

impl FileHandle {
    pub fn new(extents: ExtentManager, inode_blk: BlockId, inode: Inode) -> Self {
        Self {
            extents,
            inode_blk,
            state: RwLock::new(HandleState {
                inode,
                opening: true,
            }),
        }
    }

    pub fn block_id(&self) -> BlockId {
        self.inode_blk
    }

    pub fn is_open(&self) -> bool {
        self.state.read().opening
    }

    /// Read up to `len` bytes at `off`; empty at or past end of file.
    pub fn read(&self, off: i64, len: usize) -> ExfsResult<Vec<u8>> {
        let state = self.state.read();
        if !state.opening {
            return Err(ExfsError::HandleClosed);
        }
        let off = offset(off)?;
        self.extents.read(self.inode_blk, &state.inode, off, len)
    }

    /// Inode snapshot and the whole file content, taken under one read guard.
    pub fn read_all(&self) -> ExfsResult<(Inode, Vec<u8>)> {
        let state = self.state.read();
        if !state.opening {
            return Err(ExfsError::HandleClosed);
        }
        let len = usize::try_from(state.inode.size)
            .map_err(|_| ExfsError::InvalidArgument("file too large to read whole"))?;
        let data = self.extents.read(self.inode_blk, &state.inode, 0, len)?;
        Ok((state.inode.clone(), data))
    }

    pub fn write(&self, off: i64, data: &[u8]) -> ExfsResult<usize> {
        let mut state = self.state.write();
        if !state.opening {
            return Err(ExfsError::HandleClosed);
        }
        let off = offset(off)?;
        self.extents.write(self.inode_blk, &mut state.inode, off, data)
    }

    /// Truncate or extend the file to `new_size` bytes.
    pub fn resize(&self, new_size: u64) -> ExfsResult<()> {
        let mut state = self.state.write();
        if !state.opening {
            return Err(ExfsError::HandleClosed);
        }
        self.extents.resize(self.inode_blk, &mut state.inode, new_size)
    }

    /// Make `data` the whole content of the file in one exclusive section.
    pub fn replace_content(&self, data: &[u8]) -> ExfsResult<()> {
        let mut state = self.state.write();
        if !state.opening {
            return Err(ExfsError::HandleClosed);
        }
        self.extents
            .resize(self.inode_blk, &mut state.inode, data.len() as u64)?;
        self.extents.write(self.inode_blk, &mut state.inode, 0, data)?;
        Ok(())
    }

    /// Snapshot of the working inode.
    pub fn attr(&self) -> ExfsResult<Inode> {
        let state = self.state.read();
        if !state.opening {
            return Err(ExfsError::HandleClosed);
        }
        Ok(state.inode.clone())
    }

    /// Persist new access and modification times with `now` as ctime.
    /// [`Exfs::set_times`](crate::fs::Exfs::set_times) passes its clock.
    pub fn set_times(&self, atime: u64, mtime: u64, now: u64) -> ExfsResult<()> {
        let mut state = self.state.write();
        if !state.opening {
            return Err(ExfsError::HandleClosed);
        }
        let mut next = state.inode.clone();
        next.atime = atime;
        next.mtime = mtime;
        next.ctime = now;
        self.extents.save_inode(self.inode_blk, &next)?;
        state.inode = next;
        Ok(())
    }

    /// Persist the working inode.
    pub fn sync(&self) -> ExfsResult<()> {
        let state = self.state.read();
        if !state.opening {
            return Err(ExfsError::HandleClosed);
        }
        self.extents.save_inode(self.inode_blk, &state.inode)
    }

    /// Waits for in-flight operations; later calls fail with `HandleClosed`.
    pub fn close(&self) {
        self.state.write().opening = false;
    }
}
