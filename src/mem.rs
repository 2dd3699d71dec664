use alloc::{collections::BTreeMap, vec::Vec};
use core::sync::atomic::{AtomicU64, Ordering};

use spin::Mutex;

use crate::{
    block_store::{BlockId, BlockStore, SIZE_UNLIMITED},
    error::{ExfsError, ExfsResult},
};

/// Reference in-memory block store.
pub struct MemBlockStore {
    blocks: Mutex<BTreeMap<BlockId, Vec<u8>>>,
    /// Last id handed out
    current_id: AtomicU64,
    block_size: u64,
}

impl MemBlockStore {
    /// Size-unlimited store: each block holds a payload of any length.
    pub fn new() -> Self {
        Self::with_block_size(SIZE_UNLIMITED)
    }

    pub fn with_block_size(block_size: u64) -> Self {
        Self {
            blocks: Mutex::new(BTreeMap::new()),
            current_id: AtomicU64::new(0),
            block_size,
        }
    }

    /// Number of live (allocated and not removed) blocks.
    pub fn live_blocks(&self) -> usize {
        self.blocks.lock().len()
    }

    pub fn contains(&self, id: BlockId) -> bool {
        self.blocks.lock().contains_key(&id)
    }
}

impl Default for MemBlockStore {
    fn default() -> Self {
        Self::new()
    }
}

impl BlockStore for MemBlockStore {
    fn get(&self, id: BlockId) -> ExfsResult<Vec<u8>> {
        self.blocks
            .lock()
            .get(&id)
            .cloned()
            .ok_or(ExfsError::NotFound(id))
    }

    fn set(&self, id: BlockId, data: Vec<u8>) -> ExfsResult<()> {
        let mut blocks = self.blocks.lock();
        let slot = blocks.get_mut(&id).ok_or(ExfsError::NotFound(id))?;
        *slot = data;
        Ok(())
    }

    fn remove(&self, id: BlockId) -> ExfsResult<()> {
        self.blocks
            .lock()
            .remove(&id)
            .map(|_| ())
            .ok_or(ExfsError::NotFound(id))
    }

    fn alloc(&self) -> ExfsResult<BlockId> {
        let id = self.current_id.fetch_add(1, Ordering::SeqCst) + 1;
        self.blocks.lock().insert(id, Vec::new());
        Ok(id)
    }

    fn block_size(&self) -> u64 {
        self.block_size
    }
}
