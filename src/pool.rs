use crate::buf::Handle;
use crate::error::{Error, Result};
use crate::page::{BlockId, Page, PAGE_SIZE};
use crate::store::{FileStore, PageStore};
use std::cell::RefCell;
use std::collections::HashMap;
use std::path::Path;
use std::rc::Rc;
use tracing::{debug, error};

pub(crate) struct Slot {
    pub(crate) id: Option<BlockId>,
    pub(crate) pin_count: i64,
    pub(crate) dirty: bool,
    pub(crate) page: Page,
}

pub(crate) struct PoolInner {
    pub(crate) store: Box<dyn PageStore>,
    pub(crate) slots: Vec<Slot>,
    pub(crate) index: HashMap<BlockId, usize>,
    pub(crate) free_slots: Vec<usize>,
}

impl PoolInner {
    /// Flushes a dirty slot and returns its frame to the free list. Called
    /// from [`Handle`]'s `Drop` once the last pin on a frame is released.
    pub(crate) fn release(pool: &Rc<RefCell<PoolInner>>, slot_idx: usize) -> Result<()> {
        let (id, dirty, bytes) = {
            let inner = pool.borrow();
            let slot = &inner.slots[slot_idx];
            (
                slot.id.expect("release called on an unoccupied slot"),
                slot.dirty,
                *slot.page.bytes(),
            )
        };
        if dirty {
            pool.borrow_mut().store.write_page(id, &bytes).map_err(|e| {
                error!(page = id, error = %e, "failed to write page back to store");
                e
            })?;
        }
        let mut inner = pool.borrow_mut();
        inner.index.remove(&id);
        inner.slots[slot_idx].id = None;
        inner.slots[slot_idx].dirty = false;
        inner.free_slots.push(slot_idx);
        debug!(page = id, slot = slot_idx, "released frame");
        Ok(())
    }
}

/// Fixed-capacity page cache with reference-counted pins and write-back on
/// last unpin. Single-threaded: all interior mutability is `Rc<RefCell<_>>`,
/// never `Arc<Mutex<_>>`, since the engine this is built for has no
/// concurrency to synchronize against.
#[derive(Clone)]
pub struct BufferPool {
    pub(crate) inner: Rc<RefCell<PoolInner>>,
}

impl BufferPool {
    pub fn open(path: impl AsRef<Path>, capacity: usize) -> Result<Self> {
        Self::with_store(Box::new(FileStore::open(path)?), capacity)
    }

    pub fn with_store(store: Box<dyn PageStore>, capacity: usize) -> Result<Self> {
        let slots = (0..capacity)
            .map(|_| Slot {
                id: None,
                pin_count: 0,
                dirty: false,
                page: Page::zeroed(),
            })
            .collect();
        let free_slots = (0..capacity).rev().collect();
        Ok(Self {
            inner: Rc::new(RefCell::new(PoolInner {
                store,
                slots,
                index: HashMap::new(),
                free_slots,
            })),
        })
    }

    pub fn capacity(&self) -> usize {
        self.inner.borrow().slots.len()
    }

    /// Loads the page at `id`, pinning it for the lifetime of the returned
    /// handle. Resident pages are returned directly with an incremented
    /// pin; a miss consumes a free frame and reads through the store.
    pub fn load(&self, id: BlockId) -> Result<Handle> {
        {
            let mut inner = self.inner.borrow_mut();
            if let Some(&slot_idx) = inner.index.get(&id) {
                inner.slots[slot_idx].pin_count += 1;
                return Ok(Handle::new(self.inner.clone(), slot_idx));
            }
        }

        let slot_idx = {
            let mut inner = self.inner.borrow_mut();
            inner.free_slots.pop().ok_or_else(|| {
                error!(page = id, "no free frame available");
                Error::PoolExhausted
            })?
        };

        let mut page = Page::zeroed();
        {
            let mut inner = self.inner.borrow_mut();
            inner.store.read_page(id, page.bytes_mut()).map_err(|e| {
                error!(page = id, error = %e, "failed to read page from store");
                e
            })?;
        }

        let mut inner = self.inner.borrow_mut();
        inner.slots[slot_idx] = Slot {
            id: Some(id),
            pin_count: 1,
            dirty: false,
            page,
        };
        inner.index.insert(id, slot_idx);
        drop(inner);
        debug!(page = id, slot = slot_idx, "loaded frame");
        Ok(Handle::new(self.inner.clone(), slot_idx))
    }

    /// Writes a pinned frame back to the store if dirty, without waiting
    /// for its pin count to reach zero.
    pub fn flush(&self, handle: &Handle) -> Result<()> {
        let slot_idx = handle.slot();
        let (id, dirty, bytes) = {
            let inner = self.inner.borrow();
            let slot = &inner.slots[slot_idx];
            (
                slot.id.expect("flush called on an unoccupied slot"),
                slot.dirty,
                *slot.page.bytes(),
            )
        };
        debug!(page = id, slot = slot_idx, dirty, "flush");
        if dirty {
            self.inner.borrow_mut().store.write_page(id, &bytes).map_err(|e| {
                error!(page = id, error = %e, "failed to write page back to store");
                e
            })?;
            self.inner.borrow_mut().slots[slot_idx].dirty = false;
        }
        Ok(())
    }
}

const _: () = assert!(PAGE_SIZE > 0);
