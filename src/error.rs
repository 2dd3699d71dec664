//! Error type shared by the block stores, the extent manager and file handles.
//!
//! Every variant maps to one errno through [`ExfsError::errno`], which is what
//! the mount adaptor hands back to the kernel.

use alloc::string::String;

use crate::block_store::BlockId;

pub type ExfsResult<T> = Result<T, ExfsError>;

#[derive(Debug, Clone, PartialEq, Eq, onlyerror::Error)]
pub enum ExfsError {
    /// Unknown or removed block id.
    #[error("no such block: {0}")]
    NotFound(BlockId),
    /// Precondition violated before any storage access.
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),
    /// Store operation failed for a backend-specific reason.
    #[error("i/o failure: {0}")]
    Io(String),
    /// Block payload is not a well-formed record of the expected kind.
    #[error("malformed record: {0}")]
    Codec(String),
    #[error("handle closed")]
    HandleClosed,
}

pub const EIO: i32 = 5;
pub const EBADF: i32 = 9;
pub const EINVAL: i32 = 22;

impl ExfsError {
    /// Errno reported at the mount boundary.
    ///
    /// A missing block under a live inode is an I/O failure from the caller's
    /// point of view, so `NotFound` does not become `ENOENT` here.
    pub fn errno(&self) -> i32 {
        match self {
            ExfsError::NotFound(_) => EIO,
            ExfsError::InvalidArgument(_) => EINVAL,
            ExfsError::Io(_) => EIO,
            ExfsError::Codec(_) => EIO,
            ExfsError::HandleClosed => EBADF,
        }
    }
}

#[cfg(feature = "jammdb")]
impl From<jammdb::Error> for ExfsError {
    fn from(e: jammdb::Error) -> Self {
        ExfsError::Io(alloc::format!("{:?}", e))
    }
}

impl From<serde_json::Error> for ExfsError {
    fn from(e: serde_json::Error) -> Self {
        ExfsError::Codec(alloc::format!("{}", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn errno_mapping() {
        assert_eq!(ExfsError::NotFound(3).errno(), EIO);
        assert_eq!(ExfsError::InvalidArgument("negative offset").errno(), EINVAL);
        assert_eq!(ExfsError::HandleClosed.errno(), EBADF);
        assert_eq!(ExfsError::Codec("eof".into()).errno(), EIO);
        assert_eq!(ExfsError::Io("disk gone".into()).errno(), EIO);
    }

    #[test]
    fn display_names_block() {
        let msg = alloc::format!("{}", ExfsError::NotFound(42));
        assert_eq!(msg, "no such block: 42");
    }
}
