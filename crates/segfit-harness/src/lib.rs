//! # segfit-harness
//!
//! Deterministic workload tooling for the segfit allocator: seeded
//! operation streams, a replay runner that validates payload integrity and
//! heap invariants as it goes, and JSON/markdown reporting.

pub mod report;
pub mod runner;
pub mod workload;

pub use report::ReplayReport;
pub use runner::{ReplaySummary, replay};
pub use workload::{Op, WorkloadSpec, XorShift64, generate};
