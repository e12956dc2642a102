//! Merge per-shard BAM files into one coordinate-sorted, indexed output.
//!
//! Inputs are same-reference, coordinate-sorted BAMs (typically one per
//! processing shard of the same sample). The genome is partitioned into
//! load-balanced interval groups, each merged in parallel by a k-way merge
//! over indexed region reads, and the per-group outputs are concatenated in
//! genome order with unmapped reads appended last.

use anyhow::Result;
use bamstitch_lib::logging::OperationTimer;
use bamstitch_lib::merge::ShardMerger;
use bamstitch_lib::validation::{validate_file_exists, validate_positive};
use clap::Parser;
use log::info;
use std::path::PathBuf;

use crate::commands::command::Command;

/// Merge coordinate-sorted BAM shards.
#[derive(Debug, Parser)]
#[command(
    name = "merge",
    about = "\x1b[38;5;72m[ALIGNMENT]\x1b[0m      \x1b[36mMerge coordinate-sorted BAM shards into one indexed output\x1b[0m",
    long_about = r#"
Merge several coordinate-sorted BAM files into a single coordinate-sorted,
indexed output, in parallel.

All inputs must be aligned to the same reference and already sorted by
coordinate; this tool does not re-sort. The reference genome is partitioned
into interval groups of roughly equal base length (one per thread), each group
is k-way merged independently from indexed region reads, and the per-group
outputs are concatenated in genome order. Unmapped reads from all inputs are
collected unordered and placed last. Records at the same position are emitted
in input-list order.

Indexing and concatenation are delegated to an external toolkit (samtools by
default) via its `index` and `cat` subcommands; inputs lacking a .bai index
are indexed automatically before the merge starts.

EXAMPLES:

  # Merge three shards with 8 parallel workers
  bamstitch merge -i shard1.bam,shard2.bam,shard3.bam -o merged.bam \
    -r ref.fa -@ 8

  # Keep the per-group interim files for inspection
  bamstitch merge -i a.bam,b.bam -o merged.bam -r ref.fa --keep-interim

  # Use a specific samtools binary
  bamstitch merge -i a.bam,b.bam -o merged.bam -r ref.fa \
    --tool /opt/samtools/bin/samtools
"#
)]
pub struct Merge {
    /// Input BAM files (comma-delimited list).
    #[arg(short = 'i', long = "input", value_delimiter = ',', required = true, num_args = 1..)]
    pub input: Vec<PathBuf>,

    /// Output BAM file.
    #[arg(short = 'o', long = "output")]
    pub output: PathBuf,

    /// Reference FASTA (a .fai index must exist alongside it).
    #[arg(short = 'r', long = "reference")]
    pub reference: PathBuf,

    /// Number of parallel merge workers.
    ///
    /// Also the number of interval groups the genome is partitioned into.
    #[arg(short = '@', short_alias = 't', long = "threads", default_value = "4")]
    pub threads: usize,

    /// External toolkit binary used for `index` and `cat`.
    #[arg(long = "tool", default_value = "samtools")]
    pub tool: String,

    /// Keep the interim per-group and unmapped files after assembly.
    #[arg(long = "keep-interim", default_value = "false")]
    pub keep_interim: bool,
}

impl Command for Merge {
    fn execute(&self, command_line: &str) -> Result<()> {
        for input in &self.input {
            validate_file_exists(input, "Input BAM")?;
        }
        validate_file_exists(&self.reference, "Reference FASTA")?;
        validate_positive(self.threads, "threads")?;

        let timer = OperationTimer::new("Merging BAM shards");

        info!("Starting Merge");
        info!("Inputs: {}", self.input.len());
        for input in &self.input {
            info!("  {}", input.display());
        }
        info!("Output: {}", self.output.display());
        info!("Reference: {}", self.reference.display());
        info!("Threads: {}", self.threads);
        info!("Tool: {}", self.tool);
        if self.keep_interim {
            info!("Keep interim files: enabled");
        }

        let merger = ShardMerger::new(
            self.input.clone(),
            self.output.clone(),
            self.reference.clone(),
        )
        .threads(self.threads)
        .tool(self.tool.clone())
        .keep_interim(self.keep_interim)
        .pg_info(crate::version::VERSION.to_string(), command_line.to_string());

        let stats = merger.run()?;

        // Summary
        info!("=== Summary ===");
        info!("Interval groups planned: {}", stats.groups_planned);
        info!("Interval groups merged: {}", stats.groups_merged);
        if stats.groups_skipped > 0 {
            info!("Interval groups without data: {}", stats.groups_skipped);
        }
        info!("Mapped records: {}", stats.mapped_records);
        info!("Unmapped records: {}", stats.unmapped_records);
        if stats.reorders > 0 {
            info!("Reader reorders: {}", stats.reorders);
        }
        info!("Output: {}", self.output.display());

        timer.log_completion(stats.total_records());
        Ok(())
    }
}
