//! Statistics collection for the allocator
//!
//! Feature-gated under the `stats` feature. The counters are diagnostic
//! only and are not part of the allocation contract.

/// Allocator operation counters
#[derive(Debug, Clone, Default)]
pub struct AllocatorStats {
    /// Allocation requests since initialisation
    pub total_allocs: u64,
    /// Free requests since initialisation
    pub total_frees: u64,
    /// Heap extensions since initialisation
    pub total_extends: u64,
    /// Bytes obtained from the heap source
    pub extended_bytes: usize,
}

impl AllocatorStats {
    /// Create zeroed counters
    pub const fn new() -> Self {
        Self {
            total_allocs: 0,
            total_frees: 0,
            total_extends: 0,
            extended_bytes: 0,
        }
    }
}
