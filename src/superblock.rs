use crate::accessor::field_accessor;
use crate::page::{BlockId, Page};

/// The superblock always lives at page 0.
pub const SUPERBLOCK_PAGE: BlockId = 0;

/// A typed view over the superblock page:
/// `{ next_key: u64, free_list: FreeList, tree_root: u64 }` with
/// `FreeList = { total_pages, allocated, next_free, highest_unallocated }`,
/// all little-endian `u64`s, laid out back to back starting at offset 0.
///
/// Mirrors `MetaPage` from the buffer-pool layer this engine descends
/// from: a mutable borrow is taken even for reads, since every caller
/// reaches the superblock through an already-pinned, already-mutable
/// handle.
pub struct SuperblockView<'a> {
    page: &'a mut Page,
}

impl<'a> SuperblockView<'a> {
    pub fn new(page: &'a mut Page) -> Self {
        Self { page }
    }

    fn next_key_offset(&self) -> usize {
        0
    }
    fn total_pages_offset(&self) -> usize {
        8
    }
    fn allocated_offset(&self) -> usize {
        16
    }
    fn next_free_offset(&self) -> usize {
        24
    }
    fn highest_unallocated_offset(&self) -> usize {
        32
    }
    fn tree_root_offset(&self) -> usize {
        40
    }

    field_accessor!(next_key, u64);
    field_accessor!(total_pages, u64);
    field_accessor!(allocated, u64);
    field_accessor!(next_free, u64);
    field_accessor!(highest_unallocated, u64);
    field_accessor!(tree_root, u64);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_every_field() {
        let mut page = Page::zeroed();
        let mut view = SuperblockView::new(&mut page);
        view.set_next_key(7);
        view.set_total_pages(1024);
        view.set_allocated(3);
        view.set_next_free(4096);
        view.set_highest_unallocated(8192);
        view.set_tree_root(4096);

        assert_eq!(view.get_next_key(), 7);
        assert_eq!(view.get_total_pages(), 1024);
        assert_eq!(view.get_allocated(), 3);
        assert_eq!(view.get_next_free(), 4096);
        assert_eq!(view.get_highest_unallocated(), 8192);
        assert_eq!(view.get_tree_root(), 4096);
    }
}
