//! Trait definition for the heap-extension backend
//!
//! The allocator is agnostic to where its arena bytes come from. The one
//! requirement is that every extension continues the arena contiguously,
//! so blocks can tile the whole range without gaps.

use core::fmt::Debug;
use core::ptr::NonNull;

/// Source of arena memory
///
/// Implementations hand out a single monotonically growing region. The
/// allocator never returns memory to the source.
pub trait HeapSource {
    /// Error type for extension failures
    type Error: Debug;

    /// Extend the arena by exactly `bytes` bytes
    ///
    /// # Arguments
    /// * `bytes` - Extension amount; always a multiple of the alignment
    ///
    /// # Returns
    /// The start of the new region on success. The returned address must
    /// equal the previous end of the arena.
    fn extend(&mut self, bytes: usize) -> Result<NonNull<u8>, Self::Error>;
}
