use crate::alloc;
use crate::buf::Handle;
use crate::error::Result;
use crate::node::{BtNode, KeyPair, MAX_KEY};
use crate::page::{BlockId, PAGE_SIZE};
use crate::pool::BufferPool;
use crate::superblock::{SuperblockView, SUPERBLOCK_PAGE};
use std::collections::HashSet;
use std::path::Path;
use tracing::{debug, info};

const DEFAULT_POOL_CAPACITY: usize = 64;

/// A point-in-time copy of the superblock's bookkeeping fields. Exposed
/// so external callers (the property tests in particular, per SPEC_FULL
/// §8's "no page leaks" invariant) can reconcile `tree_root` against the
/// free list and the bump watermark without reaching into the pool.
#[derive(Debug, Clone, Copy)]
pub struct SuperblockSnapshot {
    pub next_key: u64,
    pub total_pages: u64,
    pub allocated: u64,
    pub next_free: BlockId,
    pub highest_unallocated: BlockId,
    pub tree_root: BlockId,
}

/// The top-level driver: owns the buffer pool, wraps the tree and
/// allocator, and keeps the superblock's `tree_root` current. Every entry
/// point pins the superblock for its own duration and releases it on
/// return.
pub struct IndexFile {
    pool: BufferPool,
}

impl IndexFile {
    /// Formats a new backing file: zeroes the superblock, sets up its
    /// free list to start at `PAGE_SIZE` (page 0 is the superblock
    /// itself), and installs an empty root leaf.
    pub fn create_file_system(path: impl AsRef<Path>, total_pages: u64) -> Result<Self> {
        Self::create_file_system_with_capacity(path, total_pages, DEFAULT_POOL_CAPACITY)
    }

    pub fn create_file_system_with_capacity(
        path: impl AsRef<Path>,
        total_pages: u64,
        pool_capacity: usize,
    ) -> Result<Self> {
        let pool = BufferPool::open(path, pool_capacity)?;
        let sb = pool.load(SUPERBLOCK_PAGE)?;
        {
            let mut data = sb.data_mut();
            data.bytes_mut().fill(0);
            let mut view = SuperblockView::new(&mut data);
            view.set_next_key(1);
            view.set_total_pages(total_pages);
            view.set_allocated(0);
            view.set_next_free(0);
            view.set_highest_unallocated(PAGE_SIZE as u64);
            view.set_tree_root(0);
        }

        let root_handle = alloc::allocate(&pool, &sb)?;
        BtNode::empty_leaf().encode(&mut root_handle.data_mut())?;
        let root_id = root_handle.id();
        {
            let mut data = sb.data_mut();
            SuperblockView::new(&mut data).set_tree_root(root_id);
        }

        info!(total_pages, root = root_handle.id(), "created file system");
        Ok(Self { pool })
    }

    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with_capacity(path, DEFAULT_POOL_CAPACITY)
    }

    pub fn open_with_capacity(path: impl AsRef<Path>, pool_capacity: usize) -> Result<Self> {
        Ok(Self {
            pool: BufferPool::open(path, pool_capacity)?,
        })
    }

    /// Reads `tree_root` without marking the superblock dirty: lookups
    /// vastly outnumber mutations, and this is the only field on the hot
    /// read path.
    fn root(&self) -> Result<BlockId> {
        let sb = self.pool.load(SUPERBLOCK_PAGE)?;
        let data = sb.data();
        Ok(u64::from_le_bytes(data.bytes()[40..48].try_into().unwrap()))
    }

    pub fn lookup(&self, key: u64) -> Result<Option<BlockId>> {
        debug!(key, "lookup");
        crate::tree::search(&self.pool, self.root()?, key)
    }

    pub fn insert(&self, key: u64, value: BlockId) -> Result<Option<BlockId>> {
        debug!(key, value, "insert");
        let sb = self.pool.load(SUPERBLOCK_PAGE)?;
        let old_root = self.root()?;
        let mut freed = HashSet::new();

        let result = crate::tree::insert(&self.pool, &sb, &mut freed, old_root, KeyPair { key, value })?;

        let new_root = if result.is_split {
            let root_node = BtNode {
                is_leaf: false,
                pairs: vec![
                    KeyPair {
                        key: result.key,
                        value: result.left,
                    },
                    KeyPair {
                        key: MAX_KEY,
                        value: result.right,
                    },
                ],
            };
            let handle = alloc::allocate(&self.pool, &sb)?;
            root_node.encode(&mut handle.data_mut())?;
            handle.id()
        } else {
            result.update
        };

        freed.insert(old_root);
        alloc::free_many(&self.pool, &sb, &freed)?;
        {
            let mut data = sb.data_mut();
            SuperblockView::new(&mut data).set_tree_root(new_root);
        }

        Ok(if result.did_replace {
            Some(result.replaced)
        } else {
            None
        })
    }

    pub fn remove(&self, key: u64) -> Result<Option<BlockId>> {
        debug!(key, "remove");
        let sb = self.pool.load(SUPERBLOCK_PAGE)?;
        let old_root = self.root()?;
        let mut freed = HashSet::new();

        let result = crate::tree::delete(&self.pool, &sb, &mut freed, old_root, key)?;
        if !result.did_modify {
            return Ok(None);
        }

        let mut new_root_handle = result
            .new_child
            .expect("did_modify implies new_child is set");
        let new_root_node = BtNode::decode(&new_root_handle.data())?;

        // Root collapse: an internal root reduced to a single child
        // promotes that child in its place.
        if !new_root_node.is_leaf && new_root_node.pairs.len() == 1 {
            freed.insert(new_root_handle.id());
            let collapsed_child = new_root_node.pairs[0].value;
            new_root_handle = self.pool.load(collapsed_child)?;
        }

        let new_root = new_root_handle.id();
        alloc::free_many(&self.pool, &sb, &freed)?;
        {
            let mut data = sb.data_mut();
            SuperblockView::new(&mut data).set_tree_root(new_root);
        }

        Ok(Some(result.deleted_value))
    }

    pub fn allocate_page(&self) -> Result<Handle> {
        let sb = self.pool.load(SUPERBLOCK_PAGE)?;
        alloc::allocate(&self.pool, &sb)
    }

    pub fn free_page(&self, id: BlockId) -> Result<()> {
        let sb = self.pool.load(SUPERBLOCK_PAGE)?;
        alloc::free(&self.pool, &sb, id)
    }

    pub fn free_pages(&self, ids: &HashSet<BlockId>) -> Result<()> {
        let sb = self.pool.load(SUPERBLOCK_PAGE)?;
        alloc::free_many(&self.pool, &sb, ids)
    }

    /// Loads an arbitrary page by id, bypassing the tree. Used by the
    /// object layer, whose directory and file pages are addressed
    /// directly rather than walked to.
    pub fn load_page(&self, id: BlockId) -> Result<Handle> {
        self.pool.load(id)
    }

    /// Hands out the next opaque inode identity and advances the
    /// superblock's counter. Only meaningful to the object layer; the
    /// core tree treats `next_key` as opaque state.
    pub fn next_key(&self) -> Result<u64> {
        let sb = self.pool.load(SUPERBLOCK_PAGE)?;
        let mut data = sb.data_mut();
        let mut view = SuperblockView::new(&mut data);
        let k = view.get_next_key();
        view.set_next_key(k + 1);
        Ok(k)
    }

    pub fn pool_capacity(&self) -> usize {
        self.pool.capacity()
    }

    pub fn superblock_snapshot(&self) -> Result<SuperblockSnapshot> {
        let sb = self.pool.load(SUPERBLOCK_PAGE)?;
        let mut data = sb.data_mut();
        let view = SuperblockView::new(&mut data);
        Ok(SuperblockSnapshot {
            next_key: view.get_next_key(),
            total_pages: view.get_total_pages(),
            allocated: view.get_allocated(),
            next_free: view.get_next_free(),
            highest_unallocated: view.get_highest_unallocated(),
            tree_root: view.get_tree_root(),
        })
    }
}

const _: () = assert!(PAGE_SIZE >= 48, "superblock must fit in one page");
