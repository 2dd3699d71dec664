#![cfg_attr(not(test), no_std)]
extern crate alloc;

#[cfg(all(feature = "std", not(test)))]
extern crate std;

pub mod block_store;
pub mod error;
pub mod extent;
pub mod fs;
pub mod handle;
pub mod inode;
pub mod mem;

#[cfg(feature = "jammdb")]
pub mod jammdb_store;

#[cfg(test)]
mod fs_test;

pub use block_store::{BlockId, BlockStore, NULL_BLOCK, SIZE_UNLIMITED};
pub use error::{ExfsError, ExfsResult};
pub use extent::ExtentManager;
pub use fs::Exfs;
pub use handle::FileHandle;
pub use inode::{DirEntry, Directory, FileMode, Inode};
#[cfg(feature = "jammdb")]
pub use jammdb_store::JammdbBlockStore;
pub use mem::MemBlockStore;

#[cfg(feature = "sli512")]
pub const SLICE_SIZE: usize = 512;

#[cfg(feature = "sli1k")]
pub const SLICE_SIZE: usize = 1024;

#[cfg(feature = "sli4k")]
pub const SLICE_SIZE: usize = 4096;

#[cfg(feature = "sli8k")]
pub const SLICE_SIZE: usize = 8192;

#[cfg(feature = "sli32k")]
pub const SLICE_SIZE: usize = 8192 * 2 * 2;

#[cfg(not(any(
    feature = "sli512",
    feature = "sli1k",
    feature = "sli4k",
    feature = "sli8k",
    feature = "sli32k"
)))]
pub const SLICE_SIZE: usize = 4096;
