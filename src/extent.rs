//! Extent manager: maps a file's byte range onto the blocks of its inode.
//!
//! The manager keeps no state of its own. Callers pass the inode they own and
//! the id of the block the inode is persisted in; every durable change goes
//! through the [`BlockStore`].
//!
//! Resize follows a staged commit: new ids are allocated before the inode is
//! persisted, tail blocks are removed before a shorter block list is
//! persisted, and zero-fill happens last. On failure only the in-memory inode
//! is restored. A store that can crash between these steps needs a journal
//! underneath it to become atomic.

use alloc::{format, sync::Arc, vec, vec::Vec};
use core::{mem, ops::Range};

use log::{debug, error, warn};

use crate::{
    block_store::{blocks_needed, BlockId, BlockStore, SIZE_UNLIMITED},
    error::{ExfsError, ExfsResult},
    inode::{decode_inode, encode_inode, Inode},
};

/// Portion of one block touched by a byte range.
#[derive(Debug, PartialEq, Eq)]
struct Span {
    /// Index into the inode's block list
    index: u64,
    /// Byte range inside the block payload
    local: Range<usize>,
    /// Byte range inside the caller's buffer
    buf: Range<usize>,
}

/// Split `[off, end)` into per-block spans for block size `bs`. `end > off`.
fn spans(off: u64, end: u64, bs: u64) -> impl Iterator<Item = Span> {
    let first = off / bs;
    let last = (end - 1) / bs;
    (first..=last).map(move |index| {
        let base = index * bs;
        let lo = off.max(base);
        let hi = end.min(base + bs);
        Span {
            index,
            local: (lo - base) as usize..(hi - base) as usize,
            buf: (lo - off) as usize..(hi - off) as usize,
        }
    })
}

fn to_len(n: u64) -> ExfsResult<usize> {
    usize::try_from(n).map_err(|_| ExfsError::InvalidArgument("length exceeds address space"))
}

fn block_at(inode: &Inode, index: u64) -> ExfsResult<BlockId> {
    inode
        .blocks
        .get(index as usize)
        .copied()
        .ok_or_else(|| {
            ExfsError::Io(format!(
                "block index {} beyond block list of length {}",
                index,
                inode.blocks.len()
            ))
        })
}

fn short_block(id: BlockId, have: usize, need: usize) -> ExfsError {
    ExfsError::Io(format!("block {} holds {} bytes, need {}", id, have, need))
}

#[derive(Clone)]
pub struct ExtentManager {
    store: Arc<dyn BlockStore>,
}

impl ExtentManager {
    pub fn new(store: Arc<dyn BlockStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn BlockStore> {
        &self.store
    }

    pub fn block_size(&self) -> u64 {
        self.store.block_size()
    }

    pub fn load_inode(&self, ino_blk: BlockId) -> ExfsResult<Inode> {
        decode_inode(&self.store.get(ino_blk)?)
    }

    pub fn save_inode(&self, ino_blk: BlockId, inode: &Inode) -> ExfsResult<()> {
        self.store.set(ino_blk, encode_inode(inode)?)
    }

    fn fetch(&self, ino_blk: BlockId, id: BlockId) -> ExfsResult<Vec<u8>> {
        self.store.get(id).map_err(|e| {
            error!("Failed to read block {} for file {}: {}", id, ino_blk, e);
            e
        })
    }

    fn store_block(&self, ino_blk: BlockId, id: BlockId, data: Vec<u8>) -> ExfsResult<()> {
        self.store.set(id, data).map_err(|e| {
            error!("Failed to write block {} for file {}: {}", id, ino_blk, e);
            e
        })
    }

    /// Best-effort removal of blocks no persisted inode refers to.
    fn discard(&self, ino_blk: BlockId, ids: &[BlockId]) {
        for &id in ids {
            if let Err(e) = self.store.remove(id) {
                warn!("leaking block {} allocated for file {}: {}", id, ino_blk, e);
            }
        }
    }

    /// Read up to `len` bytes at `off`. Short at end of file, empty past it.
    ///
    /// Any block fetch failure fails the whole read.
    pub fn read(&self, ino_blk: BlockId, inode: &Inode, off: u64, len: usize) -> ExfsResult<Vec<u8>> {
        let end = off.saturating_add(len as u64).min(inode.size);
        if off >= inode.size || end <= off || inode.blocks.is_empty() {
            return Ok(Vec::new());
        }

        let bs = self.block_size();
        if bs == SIZE_UNLIMITED {
            let id = block_at(inode, 0)?;
            let blk = self.fetch(ino_blk, id)?;
            let range = to_len(off)?..to_len(end)?;
            return blk
                .get(range.clone())
                .map(<[u8]>::to_vec)
                .ok_or_else(|| short_block(id, blk.len(), range.end));
        }

        let mut res = Vec::with_capacity(to_len(end - off)?);
        for span in spans(off, end, bs) {
            let id = block_at(inode, span.index)?;
            let blk = self.fetch(ino_blk, id)?;
            let part = blk
                .get(span.local.clone())
                .ok_or_else(|| short_block(id, blk.len(), span.local.end))?;
            res.extend_from_slice(part);
        }
        Ok(res)
    }

    /// Write `data` at `off`, growing the file first when the write ends
    /// past the current size. Returns the number of bytes written.
    ///
    /// On a block failure the size has already been updated; blocks written
    /// before the failure keep their new content.
    pub fn write(&self, ino_blk: BlockId, inode: &mut Inode, off: u64, data: &[u8]) -> ExfsResult<usize> {
        if data.is_empty() {
            return Ok(0);
        }
        let end = off
            .checked_add(data.len() as u64)
            .ok_or(ExfsError::InvalidArgument("write ends past maximum file size"))?;

        if end > inode.size {
            self.resize(ino_blk, inode, end).map_err(|e| {
                error!("Failed to set size {} for file {}: {}", end, ino_blk, e);
                e
            })?;
        }

        let bs = self.block_size();
        if bs == SIZE_UNLIMITED {
            let id = block_at(inode, 0)?;
            let mut blk = self.fetch(ino_blk, id)?;
            let have = blk.len();
            let range = to_len(off)?..to_len(end)?;
            blk.get_mut(range.clone())
                .ok_or_else(|| short_block(id, have, range.end))?
                .copy_from_slice(data);
            self.store_block(ino_blk, id, blk)?;
            return Ok(data.len());
        }

        for span in spans(off, end, bs) {
            let id = block_at(inode, span.index)?;
            let payload = if span.local.start == 0 && span.local.end as u64 == bs {
                data[span.buf].to_vec()
            } else {
                let mut blk = self.fetch(ino_blk, id)?;
                let have = blk.len();
                blk.get_mut(span.local.clone())
                    .ok_or_else(|| short_block(id, have, span.local.end))?
                    .copy_from_slice(&data[span.buf]);
                blk
            };
            self.store_block(ino_blk, id, payload)?;
        }
        Ok(data.len())
    }

    /// Set the file size to `new_size`, allocating or removing blocks and
    /// zero-filling new space.
    ///
    /// On failure `inode` is restored to its size and block list from before
    /// the call. That restore matches the store only if the failure came
    /// before the inode was persisted.
    pub fn resize(&self, ino_blk: BlockId, inode: &mut Inode, new_size: u64) -> ExfsResult<()> {
        if new_size == inode.size {
            return Ok(());
        }
        let orig_size = inode.size;
        let orig_blocks = inode.blocks.clone();

        let res = self.resize_staged(ino_blk, inode, new_size);
        if let Err(ref e) = res {
            error!(
                "resize of file {} from {} to {} failed, restoring snapshot: {}",
                ino_blk, orig_size, new_size, e
            );
            inode.size = orig_size;
            inode.blocks = orig_blocks;
        }
        res
    }

    fn resize_staged(&self, ino_blk: BlockId, inode: &mut Inode, new_size: u64) -> ExfsResult<()> {
        let bs = self.block_size();
        debug!(
            "resize file {}: {} -> {} bytes, {} -> {} blocks",
            ino_blk,
            inode.size,
            new_size,
            inode.blocks.len(),
            blocks_needed(new_size, bs)
        );

        if new_size == 0 {
            let old = mem::take(&mut inode.blocks);
            inode.size = 0;
            self.save_inode(ino_blk, inode)?;
            // The inode already points at nothing, so a failed removal only leaks.
            for id in old {
                if let Err(e) = self.store.remove(id) {
                    warn!("leaking block {} freed from file {}: {}", id, ino_blk, e);
                }
            }
            return Ok(());
        }

        if bs == SIZE_UNLIMITED {
            self.resize_unlimited(ino_blk, inode, new_size)
        } else {
            self.resize_fixed(ino_blk, inode, new_size, bs)
        }
    }

    fn resize_unlimited(&self, ino_blk: BlockId, inode: &mut Inode, new_size: u64) -> ExfsResult<()> {
        let len = to_len(new_size)?;
        match inode.blocks.first().copied() {
            None => {
                let id = self.store.alloc()?;
                inode.blocks = vec![id];
                inode.size = new_size;
                if let Err(e) = self.save_inode(ino_blk, inode) {
                    self.discard(ino_blk, &[id]);
                    return Err(e);
                }
                self.store_block(ino_blk, id, vec![0; len])
            }
            Some(id) => {
                inode.size = new_size;
                self.save_inode(ino_blk, inode)?;
                let mut blk = self.fetch(ino_blk, id)?;
                blk.resize(len, 0);
                self.store_block(ino_blk, id, blk)
            }
        }
    }

    fn resize_fixed(&self, ino_blk: BlockId, inode: &mut Inode, new_size: u64, bs: u64) -> ExfsResult<()> {
        let needs = blocks_needed(new_size, bs);
        let cur = inode.blocks.len() as u64;
        let last_len = to_len(new_size - (needs - 1) * bs)?;
        let full = to_len(bs)?;

        if needs == cur {
            inode.size = new_size;
            self.save_inode(ino_blk, inode)?;
            let id = block_at(inode, needs - 1)?;
            let mut blk = self.fetch(ino_blk, id)?;
            blk.resize(last_len, 0);
            return self.store_block(ino_blk, id, blk);
        }

        if needs > cur {
            let mut fresh = Vec::with_capacity((needs - cur) as usize);
            for _ in cur..needs {
                match self.store.alloc() {
                    Ok(id) => fresh.push(id),
                    Err(e) => {
                        self.discard(ino_blk, &fresh);
                        return Err(e);
                    }
                }
            }
            inode.blocks.extend_from_slice(&fresh);
            inode.size = new_size;
            if let Err(e) = self.save_inode(ino_blk, inode) {
                self.discard(ino_blk, &fresh);
                return Err(e);
            }

            if cur > 0 {
                let old_last = block_at(inode, cur - 1)?;
                let mut blk = self.fetch(ino_blk, old_last)?;
                blk.resize(full, 0);
                self.store_block(ino_blk, old_last, blk)?;
            }
            for &id in &fresh[..fresh.len() - 1] {
                self.store_block(ino_blk, id, vec![0; full])?;
            }
            return self.store_block(ino_blk, block_at(inode, needs - 1)?, vec![0; last_len]);
        }

        // Shrink: drop the tail before the shorter list is persisted.
        for &id in inode.blocks[needs as usize..].iter().rev() {
            self.store.remove(id).map_err(|e| {
                error!("Failed to remove block {} for file {}: {}", id, ino_blk, e);
                e
            })?;
        }
        inode.blocks.truncate(needs as usize);
        let id = block_at(inode, needs - 1)?;
        let mut blk = self.fetch(ino_blk, id)?;
        blk.resize(last_len, 0);
        self.store_block(ino_blk, id, blk)?;
        inode.size = new_size;
        self.save_inode(ino_blk, inode)
    }
}
