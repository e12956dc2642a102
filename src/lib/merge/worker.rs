//! Merge workers: the k-way merge over one interval group, the queue-draining
//! worker loop, and the unmapped record collector.
//!
//! Each worker repeatedly pops an interval group from the shared queue and
//! merges every input's slice of that group into the group's output file by
//! repeated selection over an [`ActiveReaderSet`]. One additional collector
//! copies all unplaced unmapped records, unordered, into their own file.

use crate::bam_io::create_bam_writer;
use crate::intervals::IntervalGroup;
use crate::merge::group_reader::{GroupReader, SortKey};
use crate::progress::ProgressTracker;
use anyhow::{Context, Result};
use crossbeam_queue::ArrayQueue;
use log::debug;
use noodles::bam;
use noodles::sam::Header;
use std::path::{Path, PathBuf};

/// Total order over active readers: sort key first, then input index.
///
/// Using the input index as the tie-break makes equal-coordinate output
/// deterministic: ties are always emitted in input-list order.
type OrderKey = (SortKey, usize);

/// Counters from merging one interval group.
#[derive(Debug, Default, Clone, Copy)]
pub struct GroupMergeStats {
    /// Records written to the group's output file.
    pub records_written: u64,
    /// Times the head reader had to be re-inserted out of head position.
    pub reorders: u64,
}

/// Counters accumulated by one worker across all groups it merged.
#[derive(Debug, Default, Clone, Copy)]
pub struct WorkerStats {
    /// Groups that produced an output file.
    pub groups_merged: u64,
    /// Groups with no qualifying records (no output file created).
    pub groups_skipped: u64,
    /// Total records written across merged groups.
    pub records_written: u64,
    /// Total head re-insertions across merged groups.
    pub reorders: u64,
}

impl WorkerStats {
    /// Fold another worker's counters into this one.
    pub fn absorb(&mut self, other: &WorkerStats) {
        self.groups_merged += other.groups_merged;
        self.groups_skipped += other.groups_skipped;
        self.records_written += other.records_written;
        self.reorders += other.reorders;
    }
}

/// The readers for one interval group that still have unread records, kept in
/// ascending [`OrderKey`] order.
///
/// The first element always holds the globally smallest unread record. The set
/// is owned by exactly one worker; no locking is involved.
#[derive(Default)]
struct ActiveReaderSet {
    readers: Vec<GroupReader>,
    reorders: u64,
}

impl ActiveReaderSet {
    fn order_key(reader: &GroupReader) -> OrderKey {
        // Readers in the set always carry a key; an exhausted reader would
        // sort last if one ever slipped through.
        (reader.sort_key().unwrap_or((usize::MAX, u64::MAX)), reader.source_index())
    }

    /// Insert a reader at the position that preserves ascending order.
    fn insert(&mut self, reader: GroupReader) {
        let key = Self::order_key(&reader);
        let pos = self.readers.partition_point(|r| Self::order_key(r) <= key);
        self.readers.insert(pos, reader);
    }

    fn is_empty(&self) -> bool {
        self.readers.is_empty()
    }

    fn head_mut(&mut self) -> Option<&mut GroupReader> {
        self.readers.first_mut()
    }

    /// Order key of the reader immediately after the head, if any.
    fn second_key(&self) -> Option<OrderKey> {
        self.readers.get(1).map(Self::order_key)
    }

    fn remove_head(&mut self) -> Option<GroupReader> {
        if self.readers.is_empty() { None } else { Some(self.readers.remove(0)) }
    }

    /// Move the head reader to its in-order position and count the reorder.
    fn reinsert_head(&mut self) {
        if let Some(reader) = self.remove_head() {
            self.insert(reader);
            self.reorders += 1;
        }
    }
}

/// Merge every input's slice of `group` into the group's output file.
///
/// Returns `Ok(None)` when no input has a qualifying record in the group; no
/// output file is created in that case, which is a normal outcome for sparse
/// regions.
///
/// Output records are non-decreasing in (sequence rank, start); records with
/// equal keys appear in input-list order.
///
/// # Errors
/// Any read or write error aborts the merge; partial output is not salvaged.
pub fn merge_interval_group(
    group: &IntervalGroup,
    inputs: &[PathBuf],
    header: &Header,
    progress: &ProgressTracker,
) -> Result<Option<GroupMergeStats>> {
    let mut active = ActiveReaderSet::default();

    for (source_index, input) in inputs.iter().enumerate() {
        let reader = GroupReader::new(input, group, source_index)?;
        // Readers with nothing in this group go straight to the finished set
        if !reader.finished() {
            active.insert(reader);
        }
    }

    if active.is_empty() {
        return Ok(None);
    }

    let mut writer = create_bam_writer(&group.output, header, 1)?;
    let mut records_written = 0u64;

    while !active.is_empty() {
        let Some(head) = active.head_mut() else { break };

        if let Some(record) = head.current() {
            writer
                .write_record(header, record)
                .with_context(|| format!("Failed to write record to {}", group.output.display()))?;
            records_written += 1;
        }

        let advanced = head.advance()?;
        let source_index = head.source_index();

        match advanced {
            None => {
                active.remove_head();
            }
            Some(key) => {
                // Fast path: the head usually still holds the smallest key
                // because records interleave gently across files.
                let moved = (key, source_index);
                if active.second_key().is_some_and(|next| moved > next) {
                    active.reinsert_head();
                }
            }
        }

        progress.log_if_needed(1);
    }

    writer.into_inner().finish().with_context(|| {
        format!("Failed to finalize output BAM: {}", group.output.display())
    })?;

    Ok(Some(GroupMergeStats { records_written, reorders: active.reorders }))
}

/// Worker loop: drain the shared queue of interval groups until it is empty.
///
/// The pop is non-blocking and exclusive, so no group is merged twice and
/// workers never wait on each other.
///
/// # Errors
/// Returns the first error from any group merge; remaining queued groups are
/// left for other workers, which the orchestrator will tear down.
pub fn merge_worker(
    queue: &ArrayQueue<IntervalGroup>,
    inputs: &[PathBuf],
    header: &Header,
    progress: &ProgressTracker,
) -> Result<WorkerStats> {
    let mut stats = WorkerStats::default();

    while let Some(group) = queue.pop() {
        debug!(
            "Merging interval group {} ({} intervals, {} bases)",
            group.id,
            group.intervals.len(),
            group.total_length()
        );

        match merge_interval_group(&group, inputs, header, progress)? {
            Some(group_stats) => {
                stats.groups_merged += 1;
                stats.records_written += group_stats.records_written;
                stats.reorders += group_stats.reorders;
            }
            None => stats.groups_skipped += 1,
        }
    }

    Ok(stats)
}

/// Copy every unplaced unmapped record from every input into `output`.
///
/// Inputs are visited in list order; records are appended in whatever order
/// the source file yields them. No sort keys apply.
///
/// # Errors
/// Fails on any open, query, read, or write error.
pub fn collect_unmapped(
    inputs: &[PathBuf],
    output: &Path,
    header: &Header,
    progress: &ProgressTracker,
) -> Result<u64> {
    let mut writer = create_bam_writer(output, header, 1)?;
    let mut records_written = 0u64;

    for input in inputs {
        let mut reader = bam::io::indexed_reader::Builder::default()
            .build_from_path(input)
            .with_context(|| format!("Failed to open input BAM: {}", input.display()))?;
        reader
            .read_header()
            .with_context(|| format!("Failed to read header from: {}", input.display()))?;

        let query = reader
            .query_unmapped()
            .with_context(|| format!("Failed to query unmapped records: {}", input.display()))?;

        for result in query {
            let record = result?;
            writer
                .write_record(header, &record)
                .with_context(|| format!("Failed to write record to {}", output.display()))?;
            records_written += 1;
            progress.log_if_needed(1);
        }
    }

    writer
        .into_inner()
        .finish()
        .with_context(|| format!("Failed to finalize output BAM: {}", output.display()))?;

    Ok(records_written)
}
