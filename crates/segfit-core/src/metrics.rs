//! Lifecycle counters for heap observability.
//!
//! Plain `u64` counters — the heap has a single mutator, so there is nothing
//! to synchronize. The counters are advisory: they never feed back into
//! allocation policy.

/// Operation counters accumulated over a heap's lifetime.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct HeapMetrics {
    /// Successful `allocate` calls (including those made for `reallocate`
    /// relocations and `zeroed_allocate`).
    pub allocations: u64,
    /// Allocation requests that failed because the region could not grow.
    pub failed_allocations: u64,
    /// Successful `zeroed_allocate` calls.
    pub zeroed_allocations: u64,
    /// Successful `release` calls.
    pub releases: u64,
    /// Releases absorbed because the pointer was outside the region or
    /// misaligned.
    pub foreign_releases: u64,
    /// Releases absorbed because the block was already free.
    pub double_releases: u64,
    /// Reallocations satisfied without moving the payload.
    pub reallocs_in_place: u64,
    /// Reallocations that relocated the payload.
    pub reallocs_moved: u64,
    /// Region extensions performed.
    pub extensions: u64,
    /// Total bytes added by region extensions.
    pub extension_bytes: u64,
    /// Free blocks split during placement or in-place reallocation.
    pub splits: u64,
    /// Coalesce operations that merged at least one neighbor.
    pub coalesces: u64,
}

impl HeapMetrics {
    /// Total `reallocate` calls that returned a payload.
    #[must_use]
    pub fn reallocs(&self) -> u64 {
        self.reallocs_in_place + self.reallocs_moved
    }

    /// Total user errors absorbed by `release`.
    #[must_use]
    pub fn absorbed_releases(&self) -> u64 {
        self.foreign_releases + self.double_releases
    }
}
