//! Seeded workload generation.
//!
//! Produces deterministic allocate/release/reallocate streams over a fixed
//! set of slots. The same spec always yields the same stream, so a failing
//! run can be replayed from its report alone.

use serde::{Deserialize, Serialize};

/// Deterministic generator (xorshift64*).
#[derive(Clone, Copy, Debug)]
pub struct XorShift64 {
    state: u64,
}

impl XorShift64 {
    /// Seeds the generator; a zero seed is mapped to a fixed non-zero one.
    #[must_use]
    pub fn new(seed: u64) -> Self {
        Self {
            state: if seed == 0 { 0x9E37_79B9_7F4A_7C15 } else { seed },
        }
    }

    /// Next raw value.
    pub fn next_u64(&mut self) -> u64 {
        let mut x = self.state;
        x ^= x >> 12;
        x ^= x << 25;
        x ^= x >> 27;
        self.state = x;
        x.wrapping_mul(0x2545_F491_4F6C_DD1D)
    }

    /// Uniform value in `[low, high_inclusive]`.
    pub fn gen_range_usize(&mut self, low: usize, high_inclusive: usize) -> usize {
        assert!(low <= high_inclusive);
        let span = high_inclusive - low + 1;
        low + (self.next_u64() as usize % span)
    }
}

/// Parameters describing a synthetic workload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkloadSpec {
    /// Generator seed.
    pub seed: u64,
    /// Number of operations to emit.
    pub ops: usize,
    /// Number of concurrently live allocation slots.
    pub slots: usize,
    /// Largest request size emitted.
    pub max_request: usize,
}

impl Default for WorkloadSpec {
    fn default() -> Self {
        Self {
            seed: 1,
            ops: 100_000,
            slots: 64,
            max_request: 2048,
        }
    }
}

/// One operation against a slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    /// Allocate into an empty slot.
    Allocate { slot: usize, size: usize },
    /// Zero-allocate `count * size` bytes into an empty slot.
    ZeroedAllocate { slot: usize, count: usize, size: usize },
    /// Resize a live slot.
    Reallocate { slot: usize, size: usize },
    /// Release a live slot.
    Release { slot: usize },
}

/// Expands a spec into its operation stream.
///
/// Slot liveness is tracked so every emitted operation is applicable:
/// allocations target empty slots, reallocations and releases target live
/// ones.
#[must_use]
pub fn generate(spec: &WorkloadSpec) -> Vec<Op> {
    let mut rng = XorShift64::new(spec.seed);
    let mut live = vec![false; spec.slots.max(1)];
    let mut ops = Vec::with_capacity(spec.ops);

    while ops.len() < spec.ops {
        let slot = rng.gen_range_usize(0, live.len() - 1);
        let op = if !live[slot] {
            live[slot] = true;
            if rng.next_u64() % 8 == 0 {
                let size = rng.gen_range_usize(1, 64);
                let count = rng.gen_range_usize(1, spec.max_request / 64 + 1);
                Op::ZeroedAllocate { slot, count, size }
            } else {
                Op::Allocate {
                    slot,
                    size: rng.gen_range_usize(1, spec.max_request),
                }
            }
        } else if rng.next_u64() % 3 == 0 {
            Op::Reallocate {
                slot,
                size: rng.gen_range_usize(1, spec.max_request),
            }
        } else {
            live[slot] = false;
            Op::Release { slot }
        };
        ops.push(op);
    }
    ops
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generation_is_deterministic() {
        let spec = WorkloadSpec::default();
        let a = generate(&spec);
        let b = generate(&spec);
        assert_eq!(a.len(), spec.ops);
        assert_eq!(a, b);
    }

    #[test]
    fn test_seeds_diverge() {
        let a = generate(&WorkloadSpec {
            seed: 1,
            ops: 100,
            ..WorkloadSpec::default()
        });
        let b = generate(&WorkloadSpec {
            seed: 2,
            ops: 100,
            ..WorkloadSpec::default()
        });
        assert_ne!(a, b);
    }

    #[test]
    fn test_ops_are_applicable() {
        let spec = WorkloadSpec {
            seed: 5,
            ops: 10_000,
            slots: 8,
            max_request: 512,
        };
        let mut live = [false; 8];
        for op in generate(&spec) {
            match op {
                Op::Allocate { slot, size } | Op::Reallocate { slot, size } => {
                    assert!(size >= 1 && size <= 512);
                    if matches!(op, Op::Allocate { .. }) {
                        assert!(!live[slot]);
                        live[slot] = true;
                    } else {
                        assert!(live[slot]);
                    }
                }
                Op::ZeroedAllocate { slot, count, size } => {
                    assert!(!live[slot]);
                    assert!(count * size > 0);
                    live[slot] = true;
                }
                Op::Release { slot } => {
                    assert!(live[slot]);
                    live[slot] = false;
                }
            }
        }
    }
}
