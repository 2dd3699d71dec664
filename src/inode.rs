//! Inode and directory records and their block payload encoding.

use alloc::{
    string::{String, ToString},
    vec::Vec,
};

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

use crate::{
    block_store::{blocks_needed, BlockId},
    error::{ExfsError, ExfsResult},
};

bitflags! {
    /// Type and permission bits stored in [`Inode::mode`].
    pub struct FileMode: u32 {
        const S_IFMT = 0o170000;
        const S_IFSOCK = 0o140000;
        const S_IFLNK = 0o120000;
        const S_IFREG = 0o100000;
        const S_IFBLK = 0o060000;
        const S_IFDIR = 0o040000;
        const S_IFCHR = 0o020000;
        const S_IFIFO = 0o010000;

        const S_ISUID = 0o4000;
        const S_ISGID = 0o2000;
        const S_ISVTX = 0o1000;

        const S_IRWXU = 0o700;
        const S_IRUSR = 0o400;
        const S_IWUSR = 0o200;
        const S_IXUSR = 0o100;

        const S_IRWXG = 0o070;
        const S_IRGRP = 0o040;
        const S_IWGRP = 0o020;
        const S_IXGRP = 0o010;

        const S_IRWXO = 0o007;
        const S_IROTH = 0o004;
        const S_IWOTH = 0o002;
        const S_IXOTH = 0o001;
    }
}

/// Metadata of one file plus its ordered block list.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Default)]
pub struct Inode {
    pub size: u64,
    /// Nanoseconds since the epoch
    pub atime: u64,
    pub mtime: u64,
    pub ctime: u64,
    pub mode: u32,
    pub uid: u32,
    pub gid: u32,
    /// Low-to-high offset order
    pub blocks: Vec<BlockId>,
}

impl Inode {
    pub fn new(mode: u32, uid: u32, gid: u32, now: u64) -> Self {
        Self {
            size: 0,
            atime: now,
            mtime: now,
            ctime: now,
            mode,
            uid,
            gid,
            blocks: Vec::new(),
        }
    }

    pub fn file_mode(&self) -> FileMode {
        FileMode::from_bits_truncate(self.mode)
    }

    pub fn is_dir(&self) -> bool {
        self.file_mode() & FileMode::S_IFMT == FileMode::S_IFDIR
    }

    /// Whether the block list has exactly the length `size` requires.
    pub fn is_consistent(&self, block_size: u64) -> bool {
        self.blocks.len() as u64 == blocks_needed(self.size, block_size)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub filename: String,
    pub inode_id: BlockId,
}

/// Ordered directory listing. Name uniqueness is left to the mount adaptor.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Default)]
pub struct Directory {
    pub entries: Vec<DirEntry>,
}

impl Directory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lookup(&self, name: &str) -> Option<BlockId> {
        self.entries
            .iter()
            .find(|e| e.filename == name)
            .map(|e| e.inode_id)
    }

    pub fn insert(&mut self, name: &str, inode_id: BlockId) {
        self.entries.push(DirEntry {
            filename: name.to_string(),
            inode_id,
        });
    }

    /// Remove the first entry called `name`, returning its inode id.
    pub fn remove(&mut self, name: &str) -> Option<BlockId> {
        let pos = self.entries.iter().position(|e| e.filename == name)?;
        Some(self.entries.remove(pos).inode_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &DirEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[derive(Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
enum RecordRef<'a> {
    Inode(&'a Inode),
    Directory(&'a Directory),
}

#[derive(Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
enum Record {
    Inode(Inode),
    Directory(Directory),
}

pub fn encode_inode(inode: &Inode) -> ExfsResult<Vec<u8>> {
    Ok(serde_json::to_vec(&RecordRef::Inode(inode))?)
}

pub fn decode_inode(data: &[u8]) -> ExfsResult<Inode> {
    match serde_json::from_slice(data)? {
        Record::Inode(inode) => Ok(inode),
        Record::Directory(_) => Err(ExfsError::Codec("expected inode, found directory".to_string())),
    }
}

pub fn encode_directory(dir: &Directory) -> ExfsResult<Vec<u8>> {
    Ok(serde_json::to_vec(&RecordRef::Directory(dir))?)
}

pub fn decode_directory(data: &[u8]) -> ExfsResult<Directory> {
    match serde_json::from_slice(data)? {
        Record::Directory(dir) => Ok(dir),
        Record::Inode(_) => Err(ExfsError::Codec("expected directory, found inode".to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;

    fn sample() -> Inode {
        Inode {
            size: 9,
            atime: 1_700_000_000_000_000_001,
            mtime: 2,
            ctime: 3,
            mode: (FileMode::S_IFREG | FileMode::S_IRUSR | FileMode::S_IWUSR).bits(),
            uid: 1000,
            gid: 100,
            blocks: vec![4, 9, 2],
        }
    }

    #[test]
    fn inode_round_trip() {
        let ino = sample();
        let bytes = encode_inode(&ino).unwrap();
        assert_eq!(decode_inode(&bytes).unwrap(), ino);
    }

    #[test]
    fn encoding_is_tagged_and_field_named() {
        let text = String::from_utf8(encode_inode(&sample()).unwrap()).unwrap();
        assert!(text.starts_with("{\"kind\":\"inode\""));
        for field in ["size", "atime", "mtime", "ctime", "mode", "uid", "gid", "blocks"] {
            assert!(text.contains(&alloc::format!("\"{}\":", field)), "{}", field);
        }
        assert_eq!(encode_inode(&sample()).unwrap(), encode_inode(&sample()).unwrap());
    }

    #[test]
    fn directory_round_trip() {
        let mut dir = Directory::new();
        dir.insert("a.txt", 3);
        dir.insert("b", 8);
        let bytes = encode_directory(&dir).unwrap();
        let back = decode_directory(&bytes).unwrap();
        assert_eq!(back, dir);
        assert_eq!(back.lookup("b"), Some(8));
        assert!(core::str::from_utf8(&bytes).unwrap().contains("\"inode_id\":3"));
    }

    #[test]
    fn wrong_kind_is_codec_error() {
        let bytes = encode_directory(&Directory::new()).unwrap();
        assert!(matches!(decode_inode(&bytes), Err(ExfsError::Codec(_))));
        assert!(matches!(decode_inode(b"not json"), Err(ExfsError::Codec(_))));
    }

    #[test]
    fn directory_remove_keeps_order() {
        let mut dir = Directory::new();
        dir.insert("x", 1);
        dir.insert("y", 2);
        dir.insert("z", 3);
        assert_eq!(dir.remove("y"), Some(2));
        assert_eq!(dir.remove("y"), None);
        let names: Vec<&str> = dir.iter().map(|e| e.filename.as_str()).collect();
        assert_eq!(names, ["x", "z"]);
    }

    #[test]
    fn mode_type_bits() {
        let dir = Inode::new((FileMode::S_IFDIR | FileMode::S_IRWXU).bits(), 0, 0, 5);
        assert!(dir.is_dir());
        assert!(!sample().is_dir());
        assert!(dir.is_consistent(4));
    }
}
