//! Workload replay against a live heap.
//!
//! Applies a generated operation stream, fills every payload with a
//! slot-specific byte, verifies the preserved prefix across reallocations,
//! and runs the full invariant checker at a configurable cadence. The
//! summary carries enough to reproduce and to judge space utilization.

use serde::{Deserialize, Serialize};

use segfit_core::{Heap, HeapConfig, check_heap};

use crate::workload::{Op, WorkloadSpec, generate};

/// Outcome of replaying one workload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplaySummary {
    /// Operations applied before stopping.
    pub ops_applied: usize,
    /// Successful allocations (zeroed included).
    pub allocations: u64,
    /// Successful releases.
    pub releases: u64,
    /// Successful reallocations.
    pub reallocations: u64,
    /// Allocations refused by the region ceiling.
    pub failed_allocations: u64,
    /// High-water mark of live bytes, block overhead included.
    pub peak_allocated_bytes: usize,
    /// Region size when the replay finished.
    pub final_region_bytes: usize,
    /// Free blocks remaining when the replay finished.
    pub final_free_blocks: usize,
    /// Peak live bytes over final usable region bytes, in permille.
    pub utilization_permille: u16,
    /// Whether every checker pass succeeded.
    pub invariants_ok: bool,
    /// First checker violation or payload mismatch, if any.
    pub first_violation: Option<String>,
}

/// Replays `spec` against a fresh heap built from `heap_config`.
///
/// The checker runs every `check_every` operations (and once at the end);
/// the replay stops at the first violation.
#[must_use]
pub fn replay(spec: &WorkloadSpec, heap_config: HeapConfig, check_every: usize) -> ReplaySummary {
    let mut heap = Heap::with_config(heap_config);
    let cadence = check_every.max(1);

    let slots = spec.slots.max(1);
    let mut ptrs = vec![0usize; slots];
    let mut sizes = vec![0usize; slots];
    let mut violation: Option<String> = None;
    let mut ops_applied = 0;

    for (step, op) in generate(spec).iter().enumerate() {
        match *op {
            Op::Allocate { slot, size } => {
                if let Some(ptr) = heap.allocate(size) {
                    heap.payload_mut(ptr, size).unwrap().fill(fill_byte(slot));
                    ptrs[slot] = ptr;
                    sizes[slot] = size;
                } else {
                    ptrs[slot] = 0;
                    sizes[slot] = 0;
                }
            }
            Op::ZeroedAllocate { slot, count, size } => {
                if let Some(ptr) = heap.zeroed_allocate(count, size) {
                    let total = count * size;
                    if heap.payload(ptr, total).unwrap().iter().any(|&b| b != 0) {
                        violation = Some(format!("step {step}: zeroed payload not zero"));
                        break;
                    }
                    heap.payload_mut(ptr, total).unwrap().fill(fill_byte(slot));
                    ptrs[slot] = ptr;
                    sizes[slot] = total;
                } else {
                    ptrs[slot] = 0;
                    sizes[slot] = 0;
                }
            }
            Op::Reallocate { slot, size } => {
                if ptrs[slot] == 0 {
                    // The allocation this op targeted failed earlier; skip.
                } else if let Some(ptr) = heap.reallocate(ptrs[slot], size) {
                    let keep = size.min(sizes[slot]);
                    let expected = vec![fill_byte(slot); keep];
                    if heap.payload(ptr, keep).unwrap() != &expected[..] {
                        violation = Some(format!("step {step}: prefix lost in realloc"));
                        break;
                    }
                    heap.payload_mut(ptr, size).unwrap().fill(fill_byte(slot));
                    ptrs[slot] = ptr;
                    sizes[slot] = size;
                }
            }
            Op::Release { slot } => {
                heap.release(ptrs[slot]);
                ptrs[slot] = 0;
                sizes[slot] = 0;
            }
        }
        ops_applied = step + 1;

        if step % cadence == cadence - 1
            && let Err(e) = check_heap(&heap)
        {
            violation = Some(format!("step {step}: {e}"));
            break;
        }
    }

    let final_report = check_heap(&heap);
    if violation.is_none()
        && let Err(e) = &final_report
    {
        violation = Some(format!("final check: {e}"));
    }

    let metrics = *heap.metrics();
    let usable = heap.region_bytes().saturating_sub(16).max(1);
    ReplaySummary {
        ops_applied,
        allocations: metrics.allocations,
        releases: metrics.releases,
        reallocations: metrics.reallocs(),
        failed_allocations: metrics.failed_allocations,
        peak_allocated_bytes: heap.peak_allocated(),
        final_region_bytes: heap.region_bytes(),
        final_free_blocks: final_report.map(|r| r.free_blocks).unwrap_or(0),
        utilization_permille: (heap.peak_allocated() * 1000 / usable).min(1000) as u16,
        invariants_ok: violation.is_none(),
        first_violation: violation,
    }
}

fn fill_byte(slot: usize) -> u8 {
    (slot as u8).wrapping_mul(31) | 1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_replay_default_workload_holds_invariants() {
        let spec = WorkloadSpec {
            ops: 20_000,
            ..WorkloadSpec::default()
        };
        let summary = replay(&spec, HeapConfig::default(), 5_000);
        assert!(summary.invariants_ok, "{:?}", summary.first_violation);
        assert_eq!(summary.ops_applied, spec.ops);
        assert!(summary.allocations > 0);
        assert!(summary.utilization_permille <= 1000);
    }

    #[test]
    fn test_replay_survives_a_tight_ceiling() {
        let spec = WorkloadSpec {
            seed: 9,
            ops: 5_000,
            slots: 32,
            max_request: 4096,
        };
        let config = HeapConfig {
            chunk_bytes: 256,
            max_heap_bytes: 32 * 1024,
        };
        let summary = replay(&spec, config, 1_000);
        assert!(summary.invariants_ok, "{:?}", summary.first_violation);
        assert!(summary.failed_allocations > 0);
        assert!(summary.final_region_bytes <= 32 * 1024);
    }

    #[test]
    fn test_replay_is_deterministic() {
        let spec = WorkloadSpec {
            ops: 3_000,
            ..WorkloadSpec::default()
        };
        let a = replay(&spec, HeapConfig::default(), 1_000);
        let b = replay(&spec, HeapConfig::default(), 1_000);
        assert_eq!(a, b);
    }
}
