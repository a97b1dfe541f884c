//! Error types for the allocator

use core::fmt;

/// Errors that can occur during allocation operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AllocError {
    /// The heap source rejected an extension request
    OutOfMemory,
    /// The source handed back a region that does not continue the arena
    Discontiguous,
    /// The arena base is not aligned to [`crate::config::ALIGNMENT`]
    BadAlignment,
}

impl fmt::Display for AllocError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OutOfMemory => write!(f, "heap source out of memory"),
            Self::Discontiguous => write!(f, "heap source returned a discontiguous region"),
            Self::BadAlignment => write!(f, "arena base is misaligned"),
        }
    }
}

/// Invariant violations reported by the heap checker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckError {
    /// A block start is not 16-aligned
    Misaligned,
    /// A block size is below the minimum, unaligned, or runs past the arena
    BadBlockSize,
    /// Header and footer disagree on size or free bit
    TagMismatch,
    /// Two adjacent blocks are both free
    Uncoalesced,
    /// A free block is missing from its class's free list
    NotOnFreeList,
    /// An allocated block appears on a free list
    AllocatedOnFreeList,
    /// A free block sits on the wrong class's list
    WrongClass,
    /// A list entry's neighbour does not link back to it
    BrokenLinks,
    /// The free lists hold a different number of blocks than the arena walk found
    CountMismatch,
    /// A free list does not terminate
    Cycle,
}

impl fmt::Display for CheckError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Misaligned => write!(f, "block start is misaligned"),
            Self::BadBlockSize => write!(f, "block size is illegal or overruns the arena"),
            Self::TagMismatch => write!(f, "header and footer tags disagree"),
            Self::Uncoalesced => write!(f, "adjacent free blocks were not coalesced"),
            Self::NotOnFreeList => write!(f, "free block is missing from its free list"),
            Self::AllocatedOnFreeList => write!(f, "allocated block found on a free list"),
            Self::WrongClass => write!(f, "free block is on the wrong class list"),
            Self::BrokenLinks => write!(f, "free-list links are inconsistent"),
            Self::CountMismatch => write!(f, "free-list population does not match the arena"),
            Self::Cycle => write!(f, "free list does not terminate"),
        }
    }
}
