//! CLI entrypoint for the segfit replay harness.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use segfit_core::HeapConfig;
use segfit_harness::{ReplayReport, WorkloadSpec, replay};

/// Replay tooling for the segfit allocator.
#[derive(Debug, Parser)]
#[command(name = "segfit-harness")]
#[command(about = "Workload replay and invariant validation for segfit")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Replay a synthetic workload and emit a report.
    Synth {
        /// Workload seed.
        #[arg(long, default_value_t = 1)]
        seed: u64,
        /// Number of operations.
        #[arg(long, default_value_t = 100_000)]
        ops: usize,
        /// Number of concurrently live slots.
        #[arg(long, default_value_t = 64)]
        slots: usize,
        /// Largest request size.
        #[arg(long, default_value_t = 2048)]
        max_request: usize,
        /// Heap chunk size in bytes.
        #[arg(long, default_value_t = 256)]
        chunk: usize,
        /// Heap ceiling in bytes.
        #[arg(long, default_value_t = 256 * 1024 * 1024)]
        ceiling: usize,
        /// Checker cadence in operations.
        #[arg(long, default_value_t = 10_000)]
        check_every: usize,
        /// Emit JSON instead of markdown.
        #[arg(long)]
        json: bool,
        /// Write the report to a file instead of stdout.
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Run a short canned workload; exit nonzero on any violation.
    Check {
        /// Workload seed.
        #[arg(long, default_value_t = 1)]
        seed: u64,
    },
}

fn main() {
    let cli = Cli::parse();
    match cli.command {
        Command::Synth {
            seed,
            ops,
            slots,
            max_request,
            chunk,
            ceiling,
            check_every,
            json,
            output,
        } => {
            let spec = WorkloadSpec {
                seed,
                ops,
                slots,
                max_request,
            };
            let config = HeapConfig {
                chunk_bytes: chunk,
                max_heap_bytes: ceiling,
            }
            .normalized();
            let summary = replay(&spec, config, check_every);
            let ok = summary.invariants_ok;
            let report = ReplayReport {
                title: format!("segfit replay (seed {seed})"),
                spec,
                chunk_bytes: config.chunk_bytes,
                max_heap_bytes: config.max_heap_bytes,
                summary,
            };
            let rendered = if json {
                report.to_json()
            } else {
                report.to_markdown()
            };
            match output {
                Some(path) => {
                    if let Err(e) = std::fs::write(&path, rendered) {
                        eprintln!("failed to write {}: {e}", path.display());
                        std::process::exit(2);
                    }
                }
                None => println!("{rendered}"),
            }
            if !ok {
                std::process::exit(1);
            }
        }
        Command::Check { seed } => {
            let spec = WorkloadSpec {
                seed,
                ops: 20_000,
                ..WorkloadSpec::default()
            };
            let summary = replay(&spec, HeapConfig::default(), 2_000);
            if summary.invariants_ok {
                println!("ok: {} ops, {} allocations", summary.ops_applied, summary.allocations);
            } else {
                eprintln!(
                    "violation: {}",
                    summary.first_violation.as_deref().unwrap_or("unknown")
                );
                std::process::exit(1);
            }
        }
    }
}
