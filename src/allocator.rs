//! Core allocator implementation
//!
//! Owns the arena, the segregated free-list index and the heap source,
//! and implements placement, splitting, coalescing and heap extension on
//! top of them.

use core::ptr;

use log::{debug, trace};

use crate::block::{Arena, BlockRef};
use crate::class::class_of;
use crate::config::{
    ALIGNMENT, BLOCK_OVERHEAD, CHUNK_SIZE, MAX_REQUEST, MIN_BLOCK_SIZE, NUM_CLASSES, align_up,
};
use crate::error::AllocError;
use crate::freelist::FreeLists;
use crate::traits::HeapSource;

#[cfg(feature = "stats")]
use crate::stats::AllocatorStats;

/// Total block size needed to host a payload of `size` bytes
fn block_size_for(size: usize) -> Option<usize> {
    let unaligned = size.checked_add(BLOCK_OVERHEAD)?;
    unaligned
        .checked_add(ALIGNMENT - 1)
        .map(|padded| padded & !(ALIGNMENT - 1))
}

/// Segregated-fit allocator over a growing arena
///
/// Single-threaded by contract. The classic four-operation interface maps
/// to [`Allocator::alloc`], [`Allocator::dealloc`], [`Allocator::realloc`]
/// and [`Allocator::alloc_zeroed`].
pub struct Allocator<H: HeapSource> {
    /// Where arena bytes come from
    source: H,
    /// The mapped heap range and its tag accessors
    arena: Arena,
    /// Per-class free lists
    lists: FreeLists,
    /// Operation counters (feature-gated)
    #[cfg(feature = "stats")]
    stats: AllocatorStats,
}

impl<H: HeapSource> Allocator<H> {
    /// Create an allocator and format its initial chunk
    ///
    /// Requests `align(CHUNK_SIZE + BLOCK_OVERHEAD)` bytes from the source
    /// and publishes them as a single free block.
    ///
    /// # Returns
    /// The allocator, or an error if the source failed or handed back a
    /// misaligned base.
    pub fn new(mut source: H) -> Result<Self, AllocError> {
        let initial = align_up(CHUNK_SIZE + BLOCK_OVERHEAD);
        let base = source
            .extend(initial)
            .map_err(|_| AllocError::OutOfMemory)?;

        let mut arena = Arena::from_base(base)?;
        let block = arena.grow(base, initial)?;
        arena.set_size(block, initial);
        arena.set_free(block, true);

        let mut lists = FreeLists::new();
        lists.insert(&mut arena, block);

        debug!("heap initialised with a {initial} byte arena");

        Ok(Self {
            source,
            arena,
            lists,
            #[cfg(feature = "stats")]
            stats: AllocatorStats::new(),
        })
    }

    /// The heap source backing this allocator
    pub fn source(&self) -> &H {
        &self.source
    }

    /// Snapshot of the operation counters
    #[cfg(feature = "stats")]
    pub fn stats(&self) -> AllocatorStats {
        self.stats.clone()
    }

    /// Allocate a block whose payload holds at least `size` bytes
    ///
    /// # Returns
    /// A 16-aligned payload pointer, or null if `size` is zero or the
    /// heap source is exhausted.
    pub fn alloc(&mut self, size: usize) -> *mut u8 {
        #[cfg(feature = "stats")]
        {
            self.stats.total_allocs += 1;
        }

        if size == 0 {
            return ptr::null_mut();
        }
        let Some(asize) = block_size_for(size) else {
            return ptr::null_mut();
        };

        if let Some(block) = self.find_fit(asize) {
            self.split(block, asize);
            return self.arena.payload(block);
        }

        // No fit anywhere. A free tail block only needs the shortfall,
        // since the extension coalesces with it.
        let extend_by = match self.arena.last_block() {
            Some(last) if self.arena.is_free(last) => {
                debug_assert!(self.arena.size(last) < asize);
                asize - self.arena.size(last)
            }
            _ => asize.max(CHUNK_SIZE),
        };

        match self.extend(extend_by) {
            Ok(block) => {
                self.split(block, asize);
                self.arena.payload(block)
            }
            Err(_) => ptr::null_mut(),
        }
    }

    /// Free an allocation
    ///
    /// A null `ptr` is a no-op.
    ///
    /// # Safety
    /// `ptr` must be null or a payload pointer returned by this allocator
    /// that has not been freed since.
    pub unsafe fn dealloc(&mut self, ptr: *mut u8) {
        if ptr.is_null() {
            return;
        }

        #[cfg(feature = "stats")]
        {
            self.stats.total_frees += 1;
        }

        debug_assert!(self.arena.contains(ptr));
        // SAFETY: the caller passes a live payload pointer of this arena
        let block = unsafe { self.arena.from_payload(ptr) };
        self.arena.set_free(block, true);
        self.coalesce(block);
    }

    /// Resize an allocation
    ///
    /// Degenerate inputs follow the C contract: a null `ptr` allocates, a
    /// zero `size` frees, and a size above [`MAX_REQUEST`] (a negative
    /// size in a signed interpretation) fails.
    ///
    /// # Safety
    /// `ptr` must be null or a payload pointer returned by this allocator
    /// that has not been freed since.
    pub unsafe fn realloc(&mut self, ptr: *mut u8, size: usize) -> *mut u8 {
        if size > MAX_REQUEST {
            return ptr::null_mut();
        }
        if size == 0 {
            // SAFETY: forwarded caller contract
            unsafe { self.dealloc(ptr) };
            return ptr::null_mut();
        }
        if ptr.is_null() {
            return self.alloc(size);
        }

        // SAFETY: the caller passes a live payload pointer of this arena
        let block = unsafe { self.arena.from_payload(ptr) };
        let old_size = self.arena.size(block);
        let Some(new_size) = block_size_for(size) else {
            return ptr::null_mut();
        };

        if new_size == old_size {
            return ptr;
        }

        let new_ptr = self.alloc(size);
        if new_ptr.is_null() {
            return ptr::null_mut();
        }

        // Copy whichever payload is smaller: a grown block keeps every old
        // byte, a shrunk one keeps the prefix.
        let copy = old_size.min(new_size) - BLOCK_OVERHEAD;
        // SAFETY: both payloads span at least `copy` bytes and belong to
        // distinct blocks
        unsafe {
            ptr::copy_nonoverlapping(ptr, new_ptr, copy);
            self.dealloc(ptr);
        }
        new_ptr
    }

    /// Allocate `count * size` bytes and zero the payload
    ///
    /// # Returns
    /// A zeroed payload pointer, or null on exhaustion or if the
    /// multiplication overflows.
    pub fn alloc_zeroed(&mut self, count: usize, size: usize) -> *mut u8 {
        let Some(total) = count.checked_mul(size) else {
            return ptr::null_mut();
        };

        let ptr = self.alloc(total);
        if !ptr.is_null() {
            // SAFETY: the payload spans at least `total` writable bytes
            unsafe { ptr::write_bytes(ptr, 0, total) };
        }
        ptr
    }

    /// Verify the heap invariants
    ///
    /// # Arguments
    /// * `line` - Call-site line, reported with any violation
    ///
    /// # Returns
    /// True if every invariant holds.
    pub fn check(&self, line: u32) -> bool {
        match crate::check::run(&self.arena, &self.lists) {
            Ok(()) => true,
            Err(violation) => {
                log::error!("heap check at line {line} failed: {violation}");
                false
            }
        }
    }

    /// First-fit search starting at the class `asize` maps to
    ///
    /// The mapped class may hold blocks smaller than `asize` (classes are
    /// size ranges, not lower bounds), so the scan continues through the
    /// higher classes.
    fn find_fit(&self, asize: usize) -> Option<BlockRef> {
        for class in class_of(asize)..NUM_CLASSES {
            if let Some(block) = self.lists.first_fit_in(&self.arena, class, asize) {
                return Some(block);
            }
        }
        None
    }

    /// Allocate `asize` bytes out of the free block `block`
    ///
    /// Splits off the tail as a new free block when it can carry its own
    /// tags; otherwise the whole block becomes the allocation.
    fn split(&mut self, block: BlockRef, asize: usize) {
        let old_size = self.arena.size(block);
        debug_assert!(asize <= old_size);
        let remainder = old_size - asize;

        self.lists.unlink(&mut self.arena, block);

        if remainder < MIN_BLOCK_SIZE {
            self.arena.set_free(block, false);
            return;
        }

        self.arena.set_size(block, asize);
        self.arena.set_free(block, false);

        let rest = BlockRef::from_offset(block.offset() + asize);
        self.arena.set_size(rest, remainder);
        self.arena.set_free(rest, true);
        self.lists.insert(&mut self.arena, rest);
    }

    /// Merge a freshly freed block with its free neighbours and insert
    /// the result into the class its merged size maps to
    ///
    /// `block` must carry set free tags and must not be on any list yet.
    fn coalesce(&mut self, block: BlockRef) -> BlockRef {
        let prev = self
            .arena
            .prev_block(block)
            .filter(|&p| self.arena.is_free(p));
        let next = self
            .arena
            .next_block(block)
            .filter(|&n| self.arena.is_free(n));

        let merged = match (prev, next) {
            (None, None) => block,
            (Some(prev), None) => {
                let merged_size = self.arena.size(prev) + self.arena.size(block);
                self.lists.unlink(&mut self.arena, prev);
                self.arena.set_size(prev, merged_size);
                self.arena.set_free(prev, true);
                prev
            }
            (None, Some(next)) => {
                let merged_size = self.arena.size(block) + self.arena.size(next);
                self.lists.unlink(&mut self.arena, next);
                self.arena.set_size(block, merged_size);
                self.arena.set_free(block, true);
                block
            }
            (Some(prev), Some(next)) => {
                let merged_size =
                    self.arena.size(prev) + self.arena.size(block) + self.arena.size(next);
                self.lists.unlink(&mut self.arena, next);
                self.lists.unlink(&mut self.arena, prev);
                self.arena.set_size(prev, merged_size);
                self.arena.set_free(prev, true);
                prev
            }
        };

        self.lists.insert(&mut self.arena, merged);
        merged
    }

    /// Grow the arena by `bytes` and hand the new region to the coalescer
    ///
    /// The new block merges with the old tail block whenever that block
    /// is free.
    fn extend(&mut self, bytes: usize) -> Result<BlockRef, AllocError> {
        debug_assert!(bytes % ALIGNMENT == 0);
        trace!("extending arena by {bytes} bytes");

        let at = self
            .source
            .extend(bytes)
            .map_err(|_| AllocError::OutOfMemory)?;
        let block = self.arena.grow(at, bytes)?;
        self.arena.set_size(block, bytes);
        self.arena.set_free(block, true);

        #[cfg(feature = "stats")]
        {
            self.stats.total_extends += 1;
            self.stats.extended_bytes += bytes;
        }

        Ok(self.coalesce(block))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::region::FixedRegion;
    use core::ptr::NonNull;

    const CAP: usize = 1 << 16;

    /// Initial arena size after `Allocator::new`
    const INITIAL: usize = align_up(CHUNK_SIZE + BLOCK_OVERHEAD);

    #[repr(align(16))]
    struct Backing([u8; CAP]);

    fn heap() -> Allocator<FixedRegion> {
        heap_with_capacity(CAP)
    }

    fn heap_with_capacity(capacity: usize) -> Allocator<FixedRegion> {
        assert!(capacity <= CAP);
        let buf = Box::leak(Box::new(Backing([0; CAP])));
        let base = NonNull::new(buf.0.as_mut_ptr()).unwrap();
        // SAFETY: leaked buffer, exclusive, 16-aligned
        let region = unsafe { FixedRegion::new(base, capacity) };
        Allocator::new(region).expect("initial extension fits")
    }

    unsafe fn fill(ptr: *mut u8, len: usize, seed: u8) {
        for i in 0..len {
            // SAFETY: caller provides a payload of at least `len` bytes
            unsafe { ptr.add(i).write(seed.wrapping_add(i as u8)) };
        }
    }

    unsafe fn holds(ptr: *const u8, len: usize, seed: u8) -> bool {
        // SAFETY: caller provides a payload of at least `len` bytes
        (0..len).all(|i| unsafe { ptr.add(i).read() } == seed.wrapping_add(i as u8))
    }

    #[test]
    fn test_initial_chunk_is_one_free_block() {
        let h = heap();
        assert_eq!(h.source().used(), INITIAL);
        assert_eq!(h.lists.total(&h.arena), 1);
        assert!(h.check(line!()));
    }

    #[test]
    fn test_alloc_zero_returns_null() {
        let mut h = heap();
        assert!(h.alloc(0).is_null());
        assert!(h.check(line!()));
    }

    #[test]
    fn test_payloads_are_aligned_and_disjoint() {
        let mut h = heap();
        let a = h.alloc(32);
        let b = h.alloc(32);
        assert!(!a.is_null() && !b.is_null());
        assert_eq!(a as usize % ALIGNMENT, 0);
        assert_eq!(b as usize % ALIGNMENT, 0);

        // SAFETY: both payloads hold at least 32 bytes
        unsafe {
            fill(a, 32, 0x11);
            fill(b, 32, 0x77);
            assert!(holds(a, 32, 0x11));
            assert!(holds(b, 32, 0x77));
        }
        assert!(h.check(line!()));
    }

    #[test]
    fn test_free_pair_coalesces_back_to_one_block() {
        let mut h = heap();
        let a = h.alloc(32);
        let b = h.alloc(32);

        // SAFETY: payloads of this heap, freed exactly once
        unsafe {
            h.dealloc(a);
            assert!(h.check(line!()));
            h.dealloc(b);
        }

        assert_eq!(h.lists.total(&h.arena), 1);
        assert_eq!(h.arena.size(BlockRef::from_offset(0)), INITIAL);
        assert!(h.check(line!()));
    }

    #[test]
    fn test_split_leaves_classified_remainder() {
        let mut h = heap();
        let p = h.alloc(16);
        assert!(!p.is_null());

        // 16 bytes round up to a 64 byte block; the remainder keeps the rest
        let rest = BlockRef::from_offset(64);
        assert_eq!(h.arena.size(rest), INITIAL - 64);
        assert!(h.arena.is_free(rest));
        assert_eq!(h.lists.head(class_of(INITIAL - 64)), rest);
        assert!(h.check(line!()));
    }

    #[test]
    fn test_free_middle_merges_both_neighbours() {
        let mut h = heap();
        let a = h.alloc(64);
        let b = h.alloc(64);
        let c = h.alloc(64);

        // SAFETY: payloads of this heap, freed exactly once
        unsafe {
            h.dealloc(a);
            assert!(h.check(line!()));
            h.dealloc(c);
            assert!(h.check(line!()));
            h.dealloc(b);
        }

        assert_eq!(h.lists.total(&h.arena), 1);
        assert_eq!(h.arena.size(BlockRef::from_offset(0)), INITIAL);
        assert!(h.check(line!()));
    }

    #[test]
    fn test_extension_requests_only_the_shortfall() {
        let mut h = heap();
        let before = h.source().used();

        // asize exceeds the free tail, so the source supplies the difference
        let p = h.alloc(4096);
        assert!(!p.is_null());

        let asize = align_up(4096 + BLOCK_OVERHEAD);
        assert_eq!(h.source().used() - before, asize - INITIAL);
        assert!(h.check(line!()));
    }

    #[test]
    fn test_extension_without_free_tail_requests_a_chunk() {
        let mut h = heap();
        // exact fit for the whole initial block leaves no free tail
        let p = h.alloc(INITIAL - BLOCK_OVERHEAD);
        assert!(!p.is_null());
        assert_eq!(h.lists.total(&h.arena), 0);

        let before = h.source().used();
        let q = h.alloc(16);
        assert!(!q.is_null());
        assert_eq!(h.source().used() - before, CHUNK_SIZE);

        // the chunk minus the 64 byte allocation stays free
        assert_eq!(h.lists.total(&h.arena), 1);
        assert!(h.check(line!()));
    }

    #[test]
    fn test_realloc_same_block_size_returns_same_pointer() {
        let mut h = heap();
        let p = h.alloc(100);

        // SAFETY: payload of this heap
        let q = unsafe { h.realloc(p, 100) };
        assert_eq!(p, q);
        assert!(h.check(line!()));
    }

    #[test]
    fn test_realloc_grow_preserves_payload() {
        let mut h = heap();
        let p = h.alloc(16);

        // SAFETY: payload holds 16 bytes; realloc contract respected
        unsafe {
            fill(p, 16, 0xA0);
            let q = h.realloc(p, 1024);
            assert!(!q.is_null());
            assert!(holds(q, 16, 0xA0));
        }
        assert!(h.check(line!()));
    }

    #[test]
    fn test_realloc_shrink_preserves_prefix() {
        let mut h = heap();
        let p = h.alloc(1024);

        // SAFETY: payload holds 1024 bytes; realloc contract respected
        unsafe {
            fill(p, 1024, 0x3C);
            let q = h.realloc(p, 16);
            assert!(!q.is_null());
            assert!(holds(q, 16, 0x3C));
        }
        assert!(h.check(line!()));
    }

    #[test]
    fn test_realloc_null_behaves_like_alloc() {
        let mut h = heap();
        // SAFETY: null pointer is explicitly allowed
        let p = unsafe { h.realloc(ptr::null_mut(), 64) };
        assert!(!p.is_null());
        assert!(h.check(line!()));
    }

    #[test]
    fn test_realloc_zero_frees() {
        let mut h = heap();
        let p = h.alloc(64);

        // SAFETY: payload of this heap, freed exactly once via realloc
        let q = unsafe { h.realloc(p, 0) };
        assert!(q.is_null());
        assert_eq!(h.lists.total(&h.arena), 1);
        assert_eq!(h.arena.size(BlockRef::from_offset(0)), INITIAL);
        assert!(h.check(line!()));
    }

    #[test]
    fn test_realloc_rejects_signed_negative_size() {
        let mut h = heap();
        let p = h.alloc(64);

        // SAFETY: payload of this heap; the oversized request never touches it
        let q = unsafe { h.realloc(p, usize::MAX) };
        assert!(q.is_null());

        // the original allocation is untouched
        // SAFETY: p is still live
        unsafe {
            fill(p, 64, 0x55);
            assert!(holds(p, 64, 0x55));
        }
        assert!(h.check(line!()));
    }

    #[test]
    fn test_free_null_is_a_noop() {
        let mut h = heap();
        // SAFETY: null pointer is explicitly allowed
        unsafe { h.dealloc(ptr::null_mut()) };
        assert!(h.check(line!()));
    }

    #[test]
    fn test_alloc_zeroed_zeroes_recycled_memory() {
        let mut h = heap();
        let p = h.alloc(64);

        // SAFETY: payload of this heap, freed exactly once
        unsafe {
            fill(p, 64, 0xFF);
            h.dealloc(p);
        }

        let q = h.alloc_zeroed(4, 16);
        assert!(!q.is_null());
        // SAFETY: payload holds 64 bytes
        assert!((0..64).all(|i| unsafe { q.add(i).read() } == 0));
        assert!(h.check(line!()));
    }

    #[test]
    fn test_alloc_zeroed_detects_multiply_overflow() {
        let mut h = heap();
        assert!(h.alloc_zeroed(usize::MAX, 2).is_null());
        assert!(h.check(line!()));
    }

    #[test]
    fn test_exhaustion_leaves_heap_consistent() {
        let mut h = heap_with_capacity(INITIAL);
        let a = h.alloc(512);
        assert!(!a.is_null());

        // nothing left to extend with
        let b = h.alloc(4096);
        assert!(b.is_null());
        assert!(h.check(line!()));

        // SAFETY: a is still a live payload
        unsafe {
            fill(a, 512, 0x42);
            assert!(holds(a, 512, 0x42));
        }
    }

    #[cfg(feature = "stats")]
    #[test]
    fn test_stats_count_operations() {
        let mut h = heap();
        let p = h.alloc(32);
        // SAFETY: payload of this heap, freed exactly once
        unsafe { h.dealloc(p) };

        let stats = h.stats();
        assert_eq!(stats.total_allocs, 1);
        assert_eq!(stats.total_frees, 1);
        assert_eq!(stats.total_extends, 0);
        assert_eq!(stats.extended_bytes, 0);
    }
}
