//! Block store kept in a jammdb database file.
//!
//! Blocks live in the `blocks` bucket keyed by the big-endian id. The
//! `super_blk` bucket keeps the block size and the last id handed out, so ids
//! stay unique across reopen. Every operation is one jammdb transaction.

use alloc::{format, vec::Vec};
use core::ops::Deref;
use std::path::Path;

use jammdb::DB;
use log::{debug, info};

use crate::{
    block_store::{BlockId, BlockStore},
    error::{ExfsError, ExfsResult},
    SLICE_SIZE,
};

const SUPER_BUCKET: &str = "super_blk";
const BLOCK_BUCKET: &str = "blocks";
const BLK_SIZE_KEY: &str = "blk_size";
const CONTINUE_KEY: &str = "continue_number";

struct SafeDb(DB);

impl Deref for SafeDb {
    type Target = DB;
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

// jammdb serializes writers internally and readers work on snapshots.
unsafe impl Sync for SafeDb {}
unsafe impl Send for SafeDb {}

fn decode_u64(raw: &[u8]) -> ExfsResult<u64> {
    let bytes: [u8; 8] = raw
        .try_into()
        .map_err(|_| ExfsError::Io(format!("expected 8-byte integer, found {} bytes", raw.len())))?;
    Ok(u64::from_be_bytes(bytes))
}

pub struct JammdbBlockStore {
    db: SafeDb,
    block_size: u64,
}

impl JammdbBlockStore {
    /// Open with the crate's default slice size.
    pub fn open_default<P: AsRef<Path>>(path: P) -> ExfsResult<Self> {
        Self::open(path, SLICE_SIZE as u64)
    }

    /// Open or create a store. An existing store keeps the block size it was
    /// created with; asking for a different one fails.
    pub fn open<P: AsRef<Path>>(path: P, block_size: u64) -> ExfsResult<Self> {
        let db = DB::open(path)?;
        let stored = {
            let tx = db.tx(true)?;
            let stored = {
                let sb = tx.get_or_create_bucket(SUPER_BUCKET)?;
                let stored = match sb.get_kv(BLK_SIZE_KEY) {
                    Some(kv) => Some(decode_u64(kv.value())?),
                    None => None,
                };
                if stored.is_none() {
                    sb.put(BLK_SIZE_KEY, block_size.to_be_bytes())?;
                    sb.put(CONTINUE_KEY, 0u64.to_be_bytes())?;
                }
                tx.get_or_create_bucket(BLOCK_BUCKET)?;
                stored
            };
            tx.commit()?;
            stored
        };

        if let Some(stored) = stored {
            if stored != block_size {
                return Err(ExfsError::InvalidArgument("block size differs from existing store"));
            }
            info!("opened block store, block size {}", stored);
        } else {
            info!("created block store, block size {}", block_size);
        }

        Ok(Self {
            db: SafeDb(db),
            block_size,
        })
    }
}

impl BlockStore for JammdbBlockStore {
    fn get(&self, id: BlockId) -> ExfsResult<Vec<u8>> {
        let tx = self.db.tx(false)?;
        let bucket = tx.get_bucket(BLOCK_BUCKET)?;
        let data = bucket
            .get_kv(id.to_be_bytes())
            .map(|kv| kv.value().to_vec())
            .ok_or(ExfsError::NotFound(id));
        data
    }

    fn set(&self, id: BlockId, data: Vec<u8>) -> ExfsResult<()> {
        let tx = self.db.tx(true)?;
        {
            let bucket = tx.get_bucket(BLOCK_BUCKET)?;
            if bucket.get_kv(id.to_be_bytes()).is_none() {
                return Err(ExfsError::NotFound(id));
            }
            bucket.put(id.to_be_bytes(), data)?;
        }
        tx.commit()?;
        Ok(())
    }

    fn remove(&self, id: BlockId) -> ExfsResult<()> {
        let tx = self.db.tx(true)?;
        {
            let bucket = tx.get_bucket(BLOCK_BUCKET)?;
            if bucket.get_kv(id.to_be_bytes()).is_none() {
                return Err(ExfsError::NotFound(id));
            }
            bucket.delete(id.to_be_bytes())?;
        }
        tx.commit()?;
        Ok(())
    }

    fn alloc(&self) -> ExfsResult<BlockId> {
        let tx = self.db.tx(true)?;
        let id = {
            let sb = tx.get_bucket(SUPER_BUCKET)?;
            let last = match sb.get_kv(CONTINUE_KEY) {
                Some(kv) => decode_u64(kv.value())?,
                None => 0,
            };
            let id = last + 1;
            sb.put(CONTINUE_KEY, id.to_be_bytes())?;
            tx.get_bucket(BLOCK_BUCKET)?.put(id.to_be_bytes(), Vec::<u8>::new())?;
            id
        };
        tx.commit()?;
        debug!("allocated block {}", id);
        Ok(id)
    }

    fn block_size(&self) -> u64 {
        self.block_size
    }
}
