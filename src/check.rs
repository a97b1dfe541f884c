//! Heap consistency checker
//!
//! Walks the arena block by block and the free lists class by class, and
//! verifies the cross-cutting invariants: tiling, tag consistency,
//! free-list membership, class placement, coalescing and alignment.
//! Intended for debug builds and tests; it is linear in the heap size
//! with a nested scan per free block.

use log::error;

use crate::block::{Arena, BlockRef};
use crate::class::class_of;
use crate::config::{ALIGNMENT, MIN_BLOCK_SIZE, NUM_CLASSES};
use crate::error::CheckError;
use crate::freelist::FreeLists;

/// Verify every heap invariant, reporting the first violation
pub(crate) fn run(arena: &Arena, lists: &FreeLists) -> Result<(), CheckError> {
    let mut offset = 0;
    let mut prev_free = false;
    let mut walk_free = 0usize;
    let mut walk_blocks = 0usize;

    // Pass 1: tile the arena from the bottom.
    while offset < arena.mapped() {
        let block = BlockRef::from_offset(offset);

        if offset % ALIGNMENT != 0 {
            error!("block at offset {offset} is misaligned");
            return Err(CheckError::Misaligned);
        }

        // The size must be validated before anything derives a footer
        // location from it.
        let size = arena.size(block);
        if size < MIN_BLOCK_SIZE || size % ALIGNMENT != 0 || size > arena.mapped() - offset {
            error!("block at offset {offset} has illegal size {size}");
            return Err(CheckError::BadBlockSize);
        }

        let freed = arena.is_free(block);
        if arena.footer_size(block) != size || arena.footer_is_free(block) != freed {
            error!("block at offset {offset} has mismatched tags");
            return Err(CheckError::TagMismatch);
        }

        if freed {
            if prev_free {
                error!("free block at offset {offset} follows another free block");
                return Err(CheckError::Uncoalesced);
            }
            walk_free += 1;
            if !lists.on_list(arena, block) {
                error!("free block at offset {offset} is missing from its class list");
                return Err(CheckError::NotOnFreeList);
            }
        }

        prev_free = freed;
        walk_blocks += 1;
        offset += size;
    }
    // The per-block size bound makes the walk land exactly on the end.
    debug_assert_eq!(offset, arena.mapped());

    // Pass 2: every list entry must be a free block of the right class,
    // consistently linked.
    let mut listed = 0usize;
    for class in 0..NUM_CLASSES {
        let mut cursor = lists.head(class);
        while !cursor.is_null() {
            listed += 1;
            if listed > walk_blocks {
                error!("free list for class {class} does not terminate");
                return Err(CheckError::Cycle);
            }

            if !arena.is_free(cursor) {
                error!(
                    "allocated block at offset {} is on the class {class} list",
                    cursor.offset()
                );
                return Err(CheckError::AllocatedOnFreeList);
            }

            let wanted = class_of(arena.size(cursor));
            if wanted != class {
                error!(
                    "block at offset {} is on class {class} but belongs to class {wanted}",
                    cursor.offset()
                );
                return Err(CheckError::WrongClass);
            }

            let next = arena.next(cursor);
            if !next.is_null() && arena.prev(next) != cursor {
                error!(
                    "block at offset {} is not linked back by its successor",
                    cursor.offset()
                );
                return Err(CheckError::BrokenLinks);
            }

            cursor = next;
        }
    }

    if listed != walk_free {
        error!("{listed} blocks on the free lists but {walk_free} free blocks in the arena");
        return Err(CheckError::CountMismatch);
    }

    Ok(())
}
