//! Process-wide heap instance.
//!
//! The heap is created lazily on first use with the environment-derived
//! configuration and lives for the rest of the process. A mutex serializes
//! access; the allocator itself is single-mutator by design, so the lock is
//! for exclusive ownership, not parallelism.

use std::sync::OnceLock;

use parking_lot::Mutex;

use crate::checker::{self, CheckError, HeapReport};
use crate::config::HeapConfig;
use crate::heap::Heap;
use crate::metrics::HeapMetrics;

static HEAP: OnceLock<Mutex<Heap>> = OnceLock::new();

fn heap() -> &'static Mutex<Heap> {
    HEAP.get_or_init(|| Mutex::new(Heap::with_config(HeapConfig::from_env())))
}

/// Allocates `size` bytes from the process-wide heap.
pub fn allocate(size: usize) -> Option<usize> {
    heap().lock().allocate(size)
}

/// Releases `ptr` back to the process-wide heap.
pub fn release(ptr: usize) {
    heap().lock().release(ptr);
}

/// Resizes `ptr` within the process-wide heap.
pub fn reallocate(ptr: usize, size: usize) -> Option<usize> {
    heap().lock().reallocate(ptr, size)
}

/// Allocates a zero-filled array from the process-wide heap.
pub fn zeroed_allocate(count: usize, size: usize) -> Option<usize> {
    heap().lock().zeroed_allocate(count, size)
}

/// Runs the invariant checker against the process-wide heap.
pub fn check() -> Result<HeapReport, CheckError> {
    checker::check_heap(&heap().lock())
}

/// Snapshot of the process-wide heap's lifecycle counters.
#[must_use]
pub fn metrics() -> HeapMetrics {
    *heap().lock().metrics()
}

/// Rebuilds the process-wide heap from scratch. Idempotent; initializes
/// the heap if it has not been touched yet.
pub fn reinitialize() {
    heap().lock().reset();
}

/// Runs `f` with exclusive access to the process-wide heap, for payload
/// access and introspection beyond the four operations.
pub fn with_heap<R>(f: impl FnOnce(&mut Heap) -> R) -> R {
    f(&mut heap().lock())
}

#[cfg(test)]
mod tests {
    use super::*;

    // One test exercises the whole surface: the process-wide heap is shared
    // state, and independent tests would race each other's expectations.
    #[test]
    fn test_global_heap_lifecycle() {
        reinitialize();
        let p = allocate(100).unwrap();
        with_heap(|heap| heap.payload_mut(p, 8).unwrap().copy_from_slice(b"abcdefgh"));

        let q = reallocate(p, 500).unwrap();
        with_heap(|heap| assert_eq!(heap.payload(q, 8).unwrap(), b"abcdefgh"));

        let z = zeroed_allocate(16, 4).unwrap();
        with_heap(|heap| assert_eq!(heap.payload(z, 64).unwrap(), &[0u8; 64][..]));

        release(q);
        release(z);
        release(0); // null is a no-op

        let report = check().unwrap();
        assert_eq!(report.allocated_blocks, 0);
        assert!(metrics().allocations >= 3);

        reinitialize();
        let report = check().unwrap();
        assert_eq!(report.block_count, 1);
        assert_eq!(metrics().allocations, 0);
    }
}
