//! Size-class selection
//!
//! Maps a block size to one of the sixteen segregated free lists. Classes
//! are log2-sized ranges: class `c` holds blocks whose size has
//! floor(log2) equal to `c + CLASS_SHIFT`, and the topmost class absorbs
//! everything larger.

use crate::config::{CLASS_SHIFT, MIN_BLOCK_SIZE, NUM_CLASSES};

/// Map a block size to its free-list class
///
/// # Arguments
/// * `size` - Total block size in bytes; at least [`MIN_BLOCK_SIZE`]
///
/// # Returns
/// A class index in `0..NUM_CLASSES`.
pub(crate) fn class_of(size: usize) -> usize {
    debug_assert!(size >= MIN_BLOCK_SIZE);

    let log2 = (usize::BITS - 1 - size.leading_zeros()) as usize;
    log2.saturating_sub(CLASS_SHIFT).min(NUM_CLASSES - 1)
}
