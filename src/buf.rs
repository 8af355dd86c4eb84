use crate::page::{BlockId, Page};
use crate::pool::PoolInner;
use std::cell::{Ref, RefCell, RefMut};
use std::rc::Rc;
use tracing::error;

/// An RAII accessor for one pinned buffer-pool frame. Cloning a handle
/// increments the frame's pin count; dropping the last clone releases it,
/// flushing the frame if it is dirty. Every acquisition is released on
/// every exit path, including `?`-propagated errors, because the release
/// is structural: it lives in `Drop`, not in caller-written cleanup code.
pub struct Handle {
    pool: Rc<RefCell<PoolInner>>,
    slot: usize,
}

impl Handle {
    pub(crate) fn new(pool: Rc<RefCell<PoolInner>>, slot: usize) -> Self {
        Self { pool, slot }
    }

    pub(crate) fn slot(&self) -> usize {
        self.slot
    }

    pub fn id(&self) -> BlockId {
        self.pool.borrow().slots[self.slot]
            .id
            .expect("handle refers to an occupied slot")
    }

    pub fn data(&self) -> Ref<'_, Page> {
        Ref::map(self.pool.borrow(), |inner| &inner.slots[self.slot].page)
    }

    /// Borrows the page for writing and marks the frame dirty. Every
    /// mutation goes through this path, so there is no separate
    /// `set_dirty`-after-the-fact step to forget.
    pub fn data_mut(&self) -> RefMut<'_, Page> {
        self.pool.borrow_mut().slots[self.slot].dirty = true;
        RefMut::map(self.pool.borrow_mut(), |inner| {
            &mut inner.slots[self.slot].page
        })
    }

    pub fn set_dirty(&self) {
        self.pool.borrow_mut().slots[self.slot].dirty = true;
    }
}

impl Clone for Handle {
    fn clone(&self) -> Self {
        self.pool.borrow_mut().slots[self.slot].pin_count += 1;
        Handle {
            pool: Rc::clone(&self.pool),
            slot: self.slot,
        }
    }
}

impl Drop for Handle {
    fn drop(&mut self) {
        let should_release = {
            let mut inner = self.pool.borrow_mut();
            let slot = &mut inner.slots[self.slot];
            slot.pin_count -= 1;
            slot.pin_count == 0
        };
        if should_release {
            // Drop cannot propagate an error; a flush failure here is
            // logged and swallowed, matching the reference buffer
            // allocator's destructor, which cannot throw either.
            if let Err(e) = PoolInner::release(&self.pool, self.slot) {
                error!(slot = self.slot, error = %e, "failed to flush page on release");
            }
        }
    }
}
