//! Allocator configuration and layout constants

/// Alignment of every block start and every returned payload pointer
pub const ALIGNMENT: usize = 16;

/// Bytes occupied by a block header (size, free bit, list links)
pub const HEADER_SIZE: usize = 32;

/// Bytes occupied by a block footer (size, free bit)
pub const FOOTER_SIZE: usize = 16;

/// Per-block metadata overhead
pub const BLOCK_OVERHEAD: usize = HEADER_SIZE + FOOTER_SIZE;

/// Smallest legal block: header plus footer, already a multiple of the
/// alignment
pub const MIN_BLOCK_SIZE: usize = BLOCK_OVERHEAD;

/// Granularity of heap extension when the tail block cannot help
pub const CHUNK_SIZE: usize = 2048;

/// Number of segregated free-list classes
pub const NUM_CLASSES: usize = 16;

/// Subtracted from floor(log2(size)) when mapping a size to its class,
/// so the smallest legal block lands in class 0
pub const CLASS_SHIFT: usize = 5;

/// Largest request honoured by `realloc`; anything above this is a
/// negative size in a signed interpretation and is rejected
pub const MAX_REQUEST: usize = isize::MAX as usize;

/// Round `value` up to the next multiple of [`ALIGNMENT`]
pub const fn align_up(value: usize) -> usize {
    (value + ALIGNMENT - 1) & !(ALIGNMENT - 1)
}

const _: () = assert!(ALIGNMENT.is_power_of_two());
const _: () = assert!(HEADER_SIZE % ALIGNMENT == 0);
const _: () = assert!(FOOTER_SIZE % ALIGNMENT == 0);
const _: () = assert!(MIN_BLOCK_SIZE % ALIGNMENT == 0);
const _: () = assert!(CHUNK_SIZE % ALIGNMENT == 0);
