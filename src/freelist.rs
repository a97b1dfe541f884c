//! Segregated free-list index
//!
//! Sixteen doubly-linked lists, one per size class, threaded through the
//! headers of free blocks. Insertion is at the head, so each class is
//! ordered most-recently-freed first and placement degenerates to a
//! linear first-fit scan.

use crate::block::{Arena, BlockRef};
use crate::class::class_of;
use crate::config::NUM_CLASSES;

/// Heads of the per-class free lists
pub(crate) struct FreeLists {
    heads: [BlockRef; NUM_CLASSES],
}

impl FreeLists {
    /// Create an index with all classes empty
    pub(crate) const fn new() -> Self {
        Self {
            heads: [BlockRef::NULL; NUM_CLASSES],
        }
    }

    /// Head of one class's list (checker and test use)
    pub(crate) fn head(&self, class: usize) -> BlockRef {
        self.heads[class]
    }

    /// Insert a free block at the head of its class's list
    ///
    /// The block's tags must already record its final size and a set free
    /// bit.
    pub(crate) fn insert(&mut self, arena: &mut Arena, block: BlockRef) {
        let class = class_of(arena.size(block));
        let old_head = self.heads[class];

        arena.set_prev(block, BlockRef::NULL);
        arena.set_next(block, old_head);

        if !old_head.is_null() {
            arena.set_prev(old_head, block);
        }

        self.heads[class] = block;
    }

    /// Unlink a block from its class's list
    ///
    /// The class is recomputed from the block's current size, so callers
    /// must not resize the block between insertion and unlinking.
    pub(crate) fn unlink(&mut self, arena: &mut Arena, block: BlockRef) {
        let class = class_of(arena.size(block));
        let prev = arena.prev(block);
        let next = arena.next(block);

        arena.set_prev(block, BlockRef::NULL);
        arena.set_next(block, BlockRef::NULL);

        if prev.is_null() {
            self.heads[class] = next;
        } else {
            arena.set_next(prev, next);
        }

        if !next.is_null() {
            arena.set_prev(next, prev);
        }
    }

    /// First block in `class` with `size >= wanted`, scanning insertion order
    pub(crate) fn first_fit_in(
        &self,
        arena: &Arena,
        class: usize,
        wanted: usize,
    ) -> Option<BlockRef> {
        let mut cursor = self.heads[class];
        while !cursor.is_null() {
            if arena.size(cursor) >= wanted {
                return Some(cursor);
            }
            cursor = arena.next(cursor);
        }
        None
    }

    /// Number of blocks on one class's list
    #[cfg(test)]
    pub(crate) fn count(&self, arena: &Arena, class: usize) -> usize {
        let mut count = 0;
        let mut cursor = self.heads[class];
        while !cursor.is_null() {
            count += 1;
            cursor = arena.next(cursor);
        }
        count
    }

    /// Number of blocks across all lists
    #[cfg(test)]
    pub(crate) fn total(&self, arena: &Arena) -> usize {
        (0..NUM_CLASSES).map(|class| self.count(arena, class)).sum()
    }

    /// Check whether `block` is on the list its size maps to
    pub(crate) fn on_list(&self, arena: &Arena, block: BlockRef) -> bool {
        let mut cursor = self.heads[class_of(arena.size(block))];
        while !cursor.is_null() {
            if cursor == block {
                return true;
            }
            cursor = arena.next(cursor);
        }
        false
    }
}
