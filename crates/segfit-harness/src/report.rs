//! Report rendering for replay results.

use serde::{Deserialize, Serialize};

use crate::runner::ReplaySummary;
use crate::workload::WorkloadSpec;

/// A replay report combining the workload parameters and the outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplayReport {
    /// Report title.
    pub title: String,
    /// Workload that was replayed.
    pub spec: WorkloadSpec,
    /// Chunk size the heap was configured with.
    pub chunk_bytes: usize,
    /// Ceiling the heap was configured with.
    pub max_heap_bytes: usize,
    /// Replay outcome.
    pub summary: ReplaySummary,
}

impl ReplayReport {
    /// Render the report as markdown.
    #[must_use]
    pub fn to_markdown(&self) -> String {
        let s = &self.summary;
        let mut out = String::new();
        out.push_str(&format!("# {}\n\n", self.title));
        out.push_str(&format!(
            "- Workload: seed={} ops={} slots={} max_request={}\n",
            self.spec.seed, self.spec.ops, self.spec.slots, self.spec.max_request
        ));
        out.push_str(&format!(
            "- Heap: chunk={} ceiling={}\n\n",
            self.chunk_bytes, self.max_heap_bytes
        ));
        out.push_str("| Metric | Value |\n");
        out.push_str("|--------|-------|\n");
        out.push_str(&format!("| Ops applied | {} |\n", s.ops_applied));
        out.push_str(&format!("| Allocations | {} |\n", s.allocations));
        out.push_str(&format!("| Releases | {} |\n", s.releases));
        out.push_str(&format!("| Reallocations | {} |\n", s.reallocations));
        out.push_str(&format!("| Failed allocations | {} |\n", s.failed_allocations));
        out.push_str(&format!("| Peak live bytes | {} |\n", s.peak_allocated_bytes));
        out.push_str(&format!("| Final region bytes | {} |\n", s.final_region_bytes));
        out.push_str(&format!("| Final free blocks | {} |\n", s.final_free_blocks));
        out.push_str(&format!("| Utilization | {}‰ |\n", s.utilization_permille));
        let status = if s.invariants_ok { "PASS" } else { "FAIL" };
        out.push_str(&format!("| Invariants | {status} |\n"));
        if let Some(v) = &s.first_violation {
            out.push_str(&format!("\nFirst violation: {v}\n"));
        }
        out
    }

    /// Render the report as JSON.
    #[must_use]
    pub fn to_json(&self) -> String {
        serde_json::to_string_pretty(self).unwrap_or_else(|e| format!("{{\"error\": \"{e}\"}}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::replay;
    use segfit_core::HeapConfig;

    fn sample_report() -> ReplayReport {
        let spec = WorkloadSpec {
            ops: 500,
            ..WorkloadSpec::default()
        };
        let config = HeapConfig::default();
        ReplayReport {
            title: "sample".to_string(),
            spec,
            chunk_bytes: config.chunk_bytes,
            max_heap_bytes: config.max_heap_bytes,
            summary: replay(&spec, config, 100),
        }
    }

    #[test]
    fn test_markdown_mentions_status() {
        let report = sample_report();
        let md = report.to_markdown();
        assert!(md.contains("# sample"));
        assert!(md.contains("| Invariants | PASS |"));
    }

    #[test]
    fn test_json_round_trips() {
        let report = sample_report();
        let json = report.to_json();
        let back: ReplayReport = serde_json::from_str(&json).unwrap();
        assert_eq!(back.spec, report.spec);
        assert_eq!(back.summary, report.summary);
    }
}
