//! Boundary-tag segregated-fit heap allocator
//!
//! A single-threaded allocator over one contiguous, monotonically growing
//! arena obtained from an sbrk-style [`HeapSource`]. Blocks carry
//! header and footer tags for constant-time neighbour navigation; free
//! blocks are indexed by sixteen segregated size-class lists.
//!
//! # Features
//!
//! - **Segregated first fit**: placement scans the request's size class
//!   and the classes above it
//! - **Bidirectional coalescing**: freed blocks merge with both in-heap
//!   neighbours
//! - **Block splitting**: oversized fits return their tail to the index
//! - **Tail-aware extension**: growing the heap requests only the
//!   shortfall when the last block is free
//! - **Consistency checker**: a traversal-based verifier of the heap
//!   invariants, for debug builds and tests
//!
//! # Optional Features
//!
//! - `stats`: operation counters
//!
//! # Usage
//!
//! Owned allocator over a caller-provided region:
//!
//! ```ignore
//! use tagalloc::{Allocator, FixedRegion};
//!
//! // SAFETY: `base` points at an exclusive, 16-aligned region
//! let region = unsafe { FixedRegion::new(base, capacity) };
//! let mut heap = Allocator::new(region)?;
//!
//! let p = heap.alloc(100);
//! // SAFETY: p came from this allocator
//! unsafe { heap.dealloc(p) };
//! ```
//!
//! Process-wide instance over the program break (unix):
//!
//! ```ignore
//! // SAFETY: single-threaded process, called before any allocation
//! unsafe {
//!     tagalloc::init().expect("failed to initialise allocator");
//!     let p = tagalloc::malloc(100);
//!     tagalloc::free(p);
//! }
//! ```

#![cfg_attr(not(test), no_std)]
#![deny(unsafe_op_in_unsafe_fn)]

pub mod allocator;
pub mod config;
pub mod error;
pub mod region;
pub mod traits;

#[cfg(unix)]
pub mod brk;

#[cfg(feature = "stats")]
pub mod stats;

mod block;
mod check;
mod class;
mod freelist;

pub use allocator::Allocator;
pub use error::{AllocError, CheckError};
pub use region::FixedRegion;
pub use traits::HeapSource;

#[cfg(unix)]
pub use brk::SystemBreak;

#[cfg(feature = "stats")]
pub use stats::AllocatorStats;

#[cfg(unix)]
use core::cell::UnsafeCell;
#[cfg(unix)]
use core::ptr;
#[cfg(unix)]
use core::sync::atomic::{AtomicBool, Ordering};

/// Process-wide allocator storage
///
/// The crate's public contract is single-threaded use, so a flag plus an
/// unsynchronised cell is all the storage needs. The flag is only there
/// so calls before `init` get a defined failure instead of touching an
/// empty cell.
#[cfg(unix)]
struct GlobalHeap {
    /// Whether the allocator is initialised
    initialised: AtomicBool,
    /// The instance itself, present once `init` has run
    heap: UnsafeCell<Option<Allocator<SystemBreak>>>,
}

// SAFETY: all access is gated on the crate's single-threaded contract
#[cfg(unix)]
unsafe impl Sync for GlobalHeap {}

#[cfg(unix)]
static GLOBAL_HEAP: GlobalHeap = GlobalHeap {
    initialised: AtomicBool::new(false),
    heap: UnsafeCell::new(None),
};

/// Run `f` against the process-wide allocator, or return `default` if it
/// has not been initialised
///
/// # Safety
/// No other reference to the process-wide allocator may be live.
#[cfg(unix)]
unsafe fn with_heap<R>(default: R, f: impl FnOnce(&mut Allocator<SystemBreak>) -> R) -> R {
    if !GLOBAL_HEAP.initialised.load(Ordering::Acquire) {
        return default;
    }

    // SAFETY: initialised implies the cell holds Some; exclusivity is the
    // caller's single-threaded contract
    match unsafe { (*GLOBAL_HEAP.heap.get()).as_mut() } {
        Some(heap) => f(heap),
        None => default,
    }
}

/// Initialise (or reinitialise) the process-wide allocator
///
/// A fresh arena is formatted at the current program break. On
/// reinitialisation the previous arena is abandoned; break memory is
/// never returned to the OS.
///
/// # Returns
/// `Ok(())`, or the error if the program break could not be moved.
///
/// # Safety
/// The process must be single-threaded with respect to this crate, and no
/// payload pointer from a previous initialisation may be used afterwards.
#[cfg(unix)]
pub unsafe fn init() -> Result<(), AllocError> {
    let source = SystemBreak::new()?;
    let allocator = Allocator::new(source)?;

    // SAFETY: single-threaded contract; no allocator borrow is live
    unsafe { *GLOBAL_HEAP.heap.get() = Some(allocator) };
    GLOBAL_HEAP.initialised.store(true, Ordering::Release);
    Ok(())
}

/// Allocate `size` bytes from the process-wide allocator
///
/// # Returns
/// A 16-aligned payload pointer, or null if `size` is zero, the heap is
/// exhausted, or `init` has not run.
///
/// # Safety
/// The process must be single-threaded with respect to this crate.
#[cfg(unix)]
pub unsafe fn malloc(size: usize) -> *mut u8 {
    // SAFETY: forwarded single-threaded contract
    unsafe { with_heap(ptr::null_mut(), |heap| heap.alloc(size)) }
}

/// Free an allocation made by the process-wide allocator
///
/// # Safety
/// The process must be single-threaded with respect to this crate, and
/// `ptr` must be null or a live payload pointer from [`malloc`],
/// [`realloc`] or [`calloc`].
#[cfg(unix)]
pub unsafe fn free(ptr: *mut u8) {
    // SAFETY: forwarded single-threaded and pointer contracts
    unsafe { with_heap((), |heap| heap.dealloc(ptr)) }
}

/// Resize an allocation made by the process-wide allocator
///
/// # Safety
/// The process must be single-threaded with respect to this crate, and
/// `ptr` must be null or a live payload pointer from [`malloc`],
/// [`realloc`] or [`calloc`].
#[cfg(unix)]
pub unsafe fn realloc(ptr: *mut u8, size: usize) -> *mut u8 {
    // SAFETY: forwarded single-threaded and pointer contracts
    unsafe { with_heap(ptr::null_mut(), |heap| heap.realloc(ptr, size)) }
}

/// Allocate a zeroed array of `count` elements of `size` bytes
///
/// # Safety
/// The process must be single-threaded with respect to this crate.
#[cfg(unix)]
pub unsafe fn calloc(count: usize, size: usize) -> *mut u8 {
    // SAFETY: forwarded single-threaded contract
    unsafe { with_heap(ptr::null_mut(), |heap| heap.alloc_zeroed(count, size)) }
}

/// Verify the process-wide heap's invariants
///
/// # Arguments
/// * `line` - Call-site line, reported with any violation
///
/// # Returns
/// True if every invariant holds; false on a violation or before `init`.
///
/// # Safety
/// The process must be single-threaded with respect to this crate.
#[cfg(unix)]
pub unsafe fn check_heap(line: u32) -> bool {
    // SAFETY: forwarded single-threaded contract
    unsafe { with_heap(false, |heap| heap.check(line)) }
}
