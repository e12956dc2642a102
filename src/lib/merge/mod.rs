//! Sharded BAM merge orchestration.
//!
//! [`ShardMerger`] drives the whole merge: it ensures every input has a BAI
//! index, plans interval groups over the reference dictionary, runs the merge
//! workers and the unmapped collector over a shared work queue, concatenates
//! the interim outputs in planning order with the external tool, indexes the
//! final file, and optionally deletes the interim files.
//!
//! Every step is fail-fast: the first error from any worker or tool invocation
//! aborts the run with no partial-result recovery. A silently incomplete merge
//! is worse than a hard failure.

pub mod group_reader;
pub mod tools;
pub mod worker;

use crate::bam_io::{create_bam_reader, create_bam_writer, find_index_path};
use crate::dict::SequenceDict;
use crate::errors::StitchError;
use crate::header::add_pg_record;
use crate::intervals::{IntervalGroup, plan_interval_groups};
use crate::logging::format_count;
use crate::merge::tools::{run_concat, run_index};
use crate::merge::worker::{WorkerStats, collect_unmapped, merge_worker};
use crate::progress::ProgressTracker;
use anyhow::{Context, Result, anyhow};
use crossbeam_queue::ArrayQueue;
use log::{info, warn};
use noodles::sam::Header;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;

/// Default external toolkit used for indexing and concatenation.
pub const DEFAULT_TOOL: &str = "samtools";

/// Counters from one completed merge run.
#[derive(Debug, Default, Clone, Copy)]
pub struct MergeStats {
    /// Interval groups produced by the planner.
    pub groups_planned: usize,
    /// Groups that produced an interim output file.
    pub groups_merged: u64,
    /// Groups with no qualifying records in any input.
    pub groups_skipped: u64,
    /// Mapped records written across all groups.
    pub mapped_records: u64,
    /// Unmapped records copied by the collector.
    pub unmapped_records: u64,
    /// Head re-insertions across all group merges.
    pub reorders: u64,
}

impl MergeStats {
    /// Total records in the final output.
    #[must_use]
    pub fn total_records(&self) -> u64 {
        self.mapped_records + self.unmapped_records
    }
}

/// Merges coordinate-sorted per-shard BAMs into one indexed output.
pub struct ShardMerger {
    /// Input BAM paths, all aligned to the same reference.
    inputs: Vec<PathBuf>,
    /// Final output BAM path.
    output: PathBuf,
    /// Reference FASTA (its FAI supplies the sequence dictionary).
    reference: PathBuf,
    /// Number of merge workers; also the planner's group count.
    threads: usize,
    /// External toolkit binary for `index` and `cat`.
    tool: String,
    /// Retain interim per-group and unmapped files after assembly.
    keep_interim: bool,
    /// Program record info (version, `command_line`) for the @PG header.
    pg_info: Option<(String, String)>,
}

impl ShardMerger {
    /// Create a merger with default settings (4 threads, samtools).
    #[must_use]
    pub fn new(inputs: Vec<PathBuf>, output: PathBuf, reference: PathBuf) -> Self {
        Self {
            inputs,
            output,
            reference,
            threads: 4,
            tool: DEFAULT_TOOL.to_string(),
            keep_interim: false,
            pg_info: None,
        }
    }

    /// Set the number of merge workers (and planner group count).
    #[must_use]
    pub fn threads(mut self, threads: usize) -> Self {
        self.threads = threads.max(1);
        self
    }

    /// Set the external toolkit binary.
    #[must_use]
    pub fn tool(mut self, tool: impl Into<String>) -> Self {
        self.tool = tool.into();
        self
    }

    /// Retain interim files after the final output is assembled.
    #[must_use]
    pub fn keep_interim(mut self, keep: bool) -> Self {
        self.keep_interim = keep;
        self
    }

    /// Add a @PG record with the given version and command line to the output
    /// header.
    #[must_use]
    pub fn pg_info(mut self, version: String, command_line: String) -> Self {
        self.pg_info = Some((version, command_line));
        self
    }

    /// Run the merge end to end.
    ///
    /// # Errors
    /// Fails on the first missing input, index-build failure, merge I/O error,
    /// concatenation failure, or final-index failure. Interim files from a
    /// failed run are left in place for diagnosis.
    pub fn run(&self) -> Result<MergeStats> {
        if self.inputs.is_empty() {
            return Err(StitchError::InvalidParameter {
                parameter: "inputs".to_string(),
                reason: "at least one input BAM is required".to_string(),
            }
            .into());
        }

        self.ensure_indexes()?;

        let dict = SequenceDict::from_reference(&self.reference)?;
        let header = self.build_output_header(&dict)?;

        let interim_dir = match self.output.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        let stem = self
            .output
            .file_stem()
            .map_or_else(|| "merged".to_string(), |s| s.to_string_lossy().into_owned());

        let groups = plan_interval_groups(&dict, self.threads, &interim_dir, &stem)?;
        info!(
            "Planned {} interval groups over {} reference bases",
            groups.len(),
            format_count(dict.total_length())
        );

        let unmapped_path = interim_dir.join(format!("{stem}.unmapped.bam"));
        let (worker_stats, unmapped_records) =
            self.run_workers(&groups, &header, &unmapped_path)?;

        let interim_files = self.assemble(&groups, &unmapped_path, &header)?;

        info!("Indexing {}", self.output.display());
        run_index(&self.tool, &self.output, self.threads)?;

        if self.keep_interim {
            info!("Retaining {} interim files", interim_files.len());
        } else {
            self.cleanup(&interim_files);
        }

        Ok(MergeStats {
            groups_planned: groups.len(),
            groups_merged: worker_stats.groups_merged,
            groups_skipped: worker_stats.groups_skipped,
            mapped_records: worker_stats.records_written,
            unmapped_records,
            reorders: worker_stats.reorders,
        })
    }

    /// Build a BAI index for every input that lacks one.
    fn ensure_indexes(&self) -> Result<()> {
        for input in &self.inputs {
            crate::validation::validate_file_exists(input, "Input BAM")?;
            if find_index_path(input).is_none() {
                info!("Indexing {}", input.display());
                run_index(&self.tool, input, self.threads)?;
            }
        }
        Ok(())
    }

    /// Read every input's header, check it against the dictionary, and derive
    /// the shared output header from the first input.
    fn build_output_header(&self, dict: &SequenceDict) -> Result<Header> {
        let mut shared: Option<Header> = None;

        for input in &self.inputs {
            let (_, header) = create_bam_reader(input, 1)?;
            dict.validate_header(input, &header)?;
            if shared.is_none() {
                shared = Some(header);
            }
        }

        let header = shared
            .ok_or_else(|| anyhow!("No input headers available"))?;

        match &self.pg_info {
            Some((version, command_line)) => add_pg_record(header, version, command_line),
            None => Ok(header),
        }
    }

    /// Load the shared queue and run the merge workers plus the unmapped
    /// collector to completion, aggregating the first error from any of them.
    fn run_workers(
        &self,
        groups: &[IntervalGroup],
        header: &Header,
        unmapped_path: &Path,
    ) -> Result<(WorkerStats, u64)> {
        let queue = Arc::new(ArrayQueue::new(groups.len().max(1)));
        for group in groups {
            queue.push(group.clone()).map_err(|_| anyhow!("Work queue unexpectedly full"))?;
        }

        let inputs = Arc::new(self.inputs.clone());
        let header = Arc::new(header.clone());
        let progress = Arc::new(ProgressTracker::new("Merged records"));

        info!("Starting {} merge workers and the unmapped collector", self.threads);

        let mut handles = Vec::with_capacity(self.threads);
        for _ in 0..self.threads {
            let queue = Arc::clone(&queue);
            let inputs = Arc::clone(&inputs);
            let header = Arc::clone(&header);
            let progress = Arc::clone(&progress);
            handles.push(thread::spawn(move || merge_worker(&queue, &inputs, &header, &progress)));
        }

        let unmapped_handle = {
            let inputs = Arc::clone(&inputs);
            let header = Arc::clone(&header);
            let progress = Arc::clone(&progress);
            let output = unmapped_path.to_path_buf();
            thread::spawn(move || collect_unmapped(&inputs, &output, &header, &progress))
        };

        let mut stats = WorkerStats::default();
        let mut first_error: Option<anyhow::Error> = None;

        for handle in handles {
            match handle.join() {
                Ok(Ok(worker_stats)) => stats.absorb(&worker_stats),
                Ok(Err(e)) => {
                    if first_error.is_none() {
                        first_error = Some(e);
                    }
                }
                Err(_) => {
                    if first_error.is_none() {
                        first_error = Some(anyhow!("A merge worker panicked"));
                    }
                }
            }
        }

        let mut unmapped_records = 0u64;
        match unmapped_handle.join() {
            Ok(Ok(count)) => unmapped_records = count,
            Ok(Err(e)) => {
                if first_error.is_none() {
                    first_error = Some(e);
                }
            }
            Err(_) => {
                if first_error.is_none() {
                    first_error = Some(anyhow!("The unmapped collector panicked"));
                }
            }
        }

        if let Some(error) = first_error {
            return Err(error);
        }

        progress.log_final();

        Ok((stats, unmapped_records))
    }

    /// Concatenate the interim files that exist, in planning order with the
    /// unmapped file last, into the final output.
    ///
    /// Returns the list of interim files used, for later cleanup.
    fn assemble(
        &self,
        groups: &[IntervalGroup],
        unmapped_path: &Path,
        header: &Header,
    ) -> Result<Vec<PathBuf>> {
        let mut parts: Vec<PathBuf> =
            groups.iter().filter(|g| g.output.exists()).map(|g| g.output.clone()).collect();
        if unmapped_path.exists() {
            parts.push(unmapped_path.to_path_buf());
        }

        if parts.is_empty() {
            // Nothing produced anything; emit a header-only output
            let writer = create_bam_writer(&self.output, header, 1)?;
            writer.into_inner().finish().with_context(|| {
                format!("Failed to finalize output BAM: {}", self.output.display())
            })?;
            return Ok(parts);
        }

        info!("Concatenating {} interim files into {}", parts.len(), self.output.display());
        let part_refs: Vec<&Path> = parts.iter().map(PathBuf::as_path).collect();
        run_concat(&self.tool, &self.output, &part_refs, self.threads)?;

        Ok(parts)
    }

    /// Delete interim files and their indexes. Failures are logged and
    /// swallowed; the final output is already complete.
    fn cleanup(&self, interim_files: &[PathBuf]) {
        for path in interim_files {
            if let Err(e) = std::fs::remove_file(path) {
                warn!("Failed to delete interim file {}: {e}", path.display());
            }
            if let Some(index_path) = find_index_path(path) {
                if let Err(e) = std::fs::remove_file(&index_path) {
                    warn!("Failed to delete interim index {}: {e}", index_path.display());
                }
            }
        }
    }
}
