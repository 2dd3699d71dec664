//! Block storage abstraction consumed by the extent manager.

use alloc::vec::Vec;

use crate::error::ExfsResult;

/// Identifier of one block within a store. `0` is never handed out.
pub type BlockId = u64;

pub const NULL_BLOCK: BlockId = 0;

/// `block_size()` of a store whose payloads grow and shrink freely.
pub const SIZE_UNLIMITED: u64 = 0;

/// CRUD over an unbounded id space.
///
/// Implementations make each per-id operation safe under concurrent callers;
/// nothing above this trait adds locking around a single block.
pub trait BlockStore: Send + Sync {
    /// Payload of `id`, or `NotFound` for unknown and removed ids.
    fn get(&self, id: BlockId) -> ExfsResult<Vec<u8>>;
    /// Replace the payload of an existing block. Never creates `id`.
    fn set(&self, id: BlockId, data: Vec<u8>) -> ExfsResult<()>;
    fn remove(&self, id: BlockId) -> ExfsResult<()>;
    /// Allocate a fresh id with an empty payload. Ids are not reused.
    fn alloc(&self) -> ExfsResult<BlockId>;
    /// [`SIZE_UNLIMITED`] or the fixed payload length of committed blocks.
    fn block_size(&self) -> u64;
}

/// Number of blocks needed to hold `size` bytes.
pub fn blocks_needed(size: u64, block_size: u64) -> u64 {
    if size == 0 {
        0
    } else if block_size == SIZE_UNLIMITED {
        1
    } else {
        (size - 1) / block_size + 1
    }
}
