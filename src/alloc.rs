use crate::buf::Handle;
use crate::error::{Error, Result};
use crate::page::{BlockId, PAGE_SIZE};
use crate::pool::BufferPool;
use crate::superblock::SuperblockView;
use std::collections::HashSet;
use tracing::{debug, error};

/// Returns a freshly zeroed page pinned for the caller, taken from the
/// on-disk free stack if non-empty, otherwise bumping the high-water
/// mark. `sb` must be a handle already pinning the superblock page.
pub fn allocate(pool: &BufferPool, sb: &Handle) -> Result<Handle> {
    let (id, from_free_list) = {
        let mut data = sb.data_mut();
        let mut view = SuperblockView::new(&mut data);
        if view.get_allocated() >= view.get_total_pages() {
            error!(total_pages = view.get_total_pages(), "page allocator out of space");
            return Err(Error::NoSpace);
        }
        if view.get_next_free() == 0 {
            let id = view.get_highest_unallocated();
            view.set_highest_unallocated(id + PAGE_SIZE as u64);
            (id, false)
        } else {
            (view.get_next_free(), true)
        }
    };

    let handle = pool.load(id)?;

    if from_free_list {
        let next = {
            let data = handle.data();
            u64::from_le_bytes(data.bytes()[0..8].try_into().unwrap())
        };
        let mut data = sb.data_mut();
        SuperblockView::new(&mut data).set_next_free(next);
    }

    handle.data_mut().bytes_mut().fill(0);
    debug!(page = id, from_free_list, "allocated page");
    Ok(handle)
}

/// Pushes `id` onto the head of the on-disk free stack.
pub fn free(pool: &BufferPool, sb: &Handle, id: BlockId) -> Result<()> {
    let handle = pool.load(id)?;
    let current_head = {
        let mut data = sb.data_mut();
        SuperblockView::new(&mut data).get_next_free()
    };
    handle.data_mut().bytes_mut()[0..8].copy_from_slice(&current_head.to_le_bytes());
    {
        let mut data = sb.data_mut();
        SuperblockView::new(&mut data).set_next_free(id);
    }
    debug!(page = id, "freed page");
    Ok(())
}

pub fn free_many(pool: &BufferPool, sb: &Handle, ids: &HashSet<BlockId>) -> Result<()> {
    for &id in ids {
        free(pool, sb, id)?;
    }
    Ok(())
}
