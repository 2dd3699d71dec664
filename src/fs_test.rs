#[cfg(test)]
mod tests {
    use crate::block_store::{BlockId, BlockStore, SIZE_UNLIMITED};
    use crate::error::{ExfsError, ExfsResult};
    use crate::fs::Exfs;
    use crate::inode::{Directory, FileMode};
    use crate::mem::MemBlockStore;
    use alloc::format;
    use alloc::string::ToString;
    use alloc::sync::Arc;
    use alloc::vec::Vec;

    const NOW: u64 = 1_700_000_000_000_000_000;

    fn fixed_clock() -> u64 {
        NOW
    }

    fn new_fs(block_size: u64) -> (Arc<MemBlockStore>, Exfs) {
        let _ = env_logger::builder().is_test(true).try_init();
        let store = Arc::new(MemBlockStore::with_block_size(block_size));
        let fs = Exfs::new(store.clone()).with_clock(fixed_clock);
        (store, fs)
    }

    /// Accepts allocations but refuses every write. With `pinned` set,
    /// removals fail too.
    struct ReadOnlyStore(MemBlockStore, bool);

    impl BlockStore for ReadOnlyStore {
        fn get(&self, id: BlockId) -> ExfsResult<Vec<u8>> {
            self.0.get(id)
        }
        fn set(&self, _id: BlockId, _data: Vec<u8>) -> ExfsResult<()> {
            Err(ExfsError::Io("read-only".to_string()))
        }
        fn remove(&self, id: BlockId) -> ExfsResult<()> {
            if self.1 {
                return Err(ExfsError::Io("pinned".to_string()));
            }
            self.0.remove(id)
        }
        fn alloc(&self) -> ExfsResult<BlockId> {
            self.0.alloc()
        }
        fn block_size(&self) -> u64 {
            self.0.block_size()
        }
    }

    #[test]
    fn create_inode_persists_fresh_inode() {
        let (_store, fs) = new_fs(16);
        let (blk, inode) = fs.create_inode(0o100640, 7, 8).unwrap();
        let loaded = fs.load_inode(blk).unwrap();
        assert_eq!(loaded, inode);
        assert_eq!(loaded.size, 0);
        assert!(loaded.blocks.is_empty());
        assert_eq!((loaded.atime, loaded.mtime, loaded.ctime), (NOW, NOW, NOW));
        assert_eq!((loaded.uid, loaded.gid), (7, 8));
        assert!(loaded.file_mode().contains(FileMode::S_IFREG));
        assert!(!loaded.is_dir());
    }

    #[test]
    fn create_inode_frees_block_on_write_failure() {
        let _ = env_logger::builder().is_test(true).try_init();
        let store = Arc::new(ReadOnlyStore(MemBlockStore::new(), false));
        let fs = Exfs::new(store.clone());
        assert!(matches!(fs.create_inode(0o100644, 0, 0), Err(ExfsError::Io(_))));
        assert_eq!(store.0.live_blocks(), 0);
    }

    #[test]
    fn create_inode_reports_write_error_when_cleanup_fails() {
        let _ = env_logger::builder().is_test(true).try_init();
        let store = Arc::new(ReadOnlyStore(MemBlockStore::new(), true));
        let fs = Exfs::new(store.clone());
        assert_eq!(
            fs.create_inode(0o100644, 0, 0).unwrap_err(),
            ExfsError::Io("read-only".to_string())
        );
        // the block leaks, the caller still sees the original failure
        assert_eq!(store.0.live_blocks(), 1);
    }

    #[test]
    fn load_missing_inode_fails() {
        let (_store, fs) = new_fs(16);
        assert_eq!(fs.load_inode(404).unwrap_err(), ExfsError::NotFound(404));
        assert!(fs.open(404).is_err());
    }

    #[test]
    fn written_data_visible_after_reopen() {
        for bs in [SIZE_UNLIMITED, 4, 512] {
            let (_store, fs) = new_fs(bs);
            let (blk, _) = fs.create_inode(0o100644, 0, 0).unwrap();
            let handle = fs.open(blk).unwrap();
            assert_eq!(handle.write(3, b"persisted").unwrap(), 9);
            handle.close();

            let again = fs.open(blk).unwrap();
            assert_eq!(again.attr().unwrap().size, 12);
            assert_eq!(again.read(0, 64).unwrap(), b"\0\0\0persisted");
        }
    }

    #[test]
    fn other_handles_see_changes_only_after_reopen() {
        let (_store, fs) = new_fs(8);
        let (blk, _) = fs.create_inode(0o100644, 0, 0).unwrap();
        let writer = fs.open(blk).unwrap();
        let stale = fs.open(blk).unwrap();
        writer.write(0, b"fresh").unwrap();
        assert!(stale.read(0, 5).unwrap().is_empty());
        assert_eq!(fs.open(blk).unwrap().read(0, 5).unwrap(), b"fresh");
    }

    #[test]
    fn root_is_created_once() {
        let (store, fs) = new_fs(32);
        assert_eq!(fs.root(), None);
        let root = fs.create_root(0, 0).unwrap();
        let live = store.live_blocks();
        assert_eq!(fs.create_root(5, 5).unwrap(), root);
        assert_eq!(fs.root(), Some(root));
        assert_eq!(store.live_blocks(), live);

        let handle = fs.open(root).unwrap();
        let inode = handle.attr().unwrap();
        assert!(inode.is_dir());
        assert_eq!(inode.mode & 0o777, 0o755);
        assert!(fs.read_directory(&handle).unwrap().is_empty());
    }

    #[test]
    fn fresh_directory_lists_empty() {
        for bs in [SIZE_UNLIMITED, 16] {
            let (_store, fs) = new_fs(bs);
            let mode = FileMode::S_IFDIR | FileMode::S_IRWXU;
            let (blk, inode) = fs.create_inode(mode.bits(), 0, 0).unwrap();
            assert_eq!(inode.size, 0);

            let handle = fs.open(blk).unwrap();
            let mut dir = fs.read_directory(&handle).unwrap();
            assert!(dir.is_empty());

            dir.insert("child", 9);
            fs.write_directory(&handle, &dir).unwrap();
            assert_eq!(fs.read_directory(&fs.open(blk).unwrap()).unwrap(), dir);
        }
    }

    #[test]
    fn set_times_takes_ctime_from_clock() {
        let (_store, fs) = new_fs(16);
        let (blk, _) = fs.create_inode(0o100644, 0, 0).unwrap();
        let handle = fs.open(blk).unwrap();
        fs.set_times(&handle, 11, 22).unwrap();
        let loaded = fs.load_inode(blk).unwrap();
        assert_eq!((loaded.atime, loaded.mtime, loaded.ctime), (11, 22, NOW));
        assert_eq!(handle.attr().unwrap(), loaded);
    }

    #[test]
    fn directory_round_trip() {
        for bs in [SIZE_UNLIMITED, 16] {
            let (_store, fs) = new_fs(bs);
            let root = fs.create_root(0, 0).unwrap();
            let handle = fs.open(root).unwrap();

            let mut dir = fs.read_directory(&handle).unwrap();
            for i in 0..20u64 {
                let (child, _) = fs.create_inode(0o100644, 0, 0).unwrap();
                dir.insert(&format!("file-{}", i), child);
            }
            fs.write_directory(&handle, &dir).unwrap();

            let reopened = fs.open(root).unwrap();
            let back = fs.read_directory(&reopened).unwrap();
            assert_eq!(back, dir);
            assert_eq!(back.len(), 20);
            assert_eq!(back.lookup("file-7"), Some(dir.entries[7].inode_id));

            // shrink the listing; stale tail bytes must not survive
            let mut small = Directory::new();
            small.insert("only", 1);
            fs.write_directory(&reopened, &small).unwrap();
            assert_eq!(fs.read_directory(&fs.open(root).unwrap()).unwrap(), small);
        }
    }

    #[test]
    fn directory_ops_reject_regular_files() {
        let (_store, fs) = new_fs(16);
        let (blk, _) = fs.create_inode(0o100644, 0, 0).unwrap();
        let handle = fs.open(blk).unwrap();
        assert!(matches!(fs.read_directory(&handle), Err(ExfsError::InvalidArgument(_))));
        assert!(matches!(
            fs.write_directory(&handle, &Directory::new()),
            Err(ExfsError::InvalidArgument(_))
        ));
        assert_eq!(handle.attr().unwrap().size, 0);
    }

    #[test]
    fn release_frees_all_blocks() {
        let (store, fs) = new_fs(4);
        let (blk, _) = fs.create_inode(0o100644, 0, 0).unwrap();
        let handle = fs.open(blk).unwrap();
        handle.write(0, &[7u8; 30]).unwrap();
        handle.close();
        assert_eq!(store.live_blocks(), 1 + 8);

        fs.release_inode(blk).unwrap();
        assert_eq!(store.live_blocks(), 0);
        assert!(fs.load_inode(blk).is_err());
    }

    #[cfg(feature = "jammdb")]
    #[test]
    fn jammdb_backed_file_survives_reopen() {
        use crate::jammdb_store::JammdbBlockStore;

        let path = std::env::temp_dir().join(format!("exfs-fs-{}.db", std::process::id()));
        let _ = std::fs::remove_file(&path);
        let root = {
            let fs = Exfs::new(Arc::new(JammdbBlockStore::open(&path, 8).unwrap()));
            let root = fs.create_root(0, 0).unwrap();
            let (child, _) = fs.create_inode(0o100644, 0, 0).unwrap();
            fs.open(child).unwrap().write(0, b"spans several blocks").unwrap();
            let handle = fs.open(root).unwrap();
            let mut dir = fs.read_directory(&handle).unwrap();
            dir.insert("note", child);
            fs.write_directory(&handle, &dir).unwrap();
            root
        };

        let fs = Exfs::new(Arc::new(JammdbBlockStore::open(&path, 8).unwrap()));
        let dir = fs.read_directory(&fs.open(root).unwrap()).unwrap();
        let child = dir.lookup("note").unwrap();
        assert_eq!(fs.open(child).unwrap().read(0, 64).unwrap(), b"spans several blocks");
        drop(fs);
        let _ = std::fs::remove_file(&path);
    }
}
