//! Genome interval planning for parallel merging.
//!
//! The planner partitions the reference sequence dictionary into a fixed
//! number of contiguous, non-overlapping interval groups of approximately
//! equal total base length. Each group becomes one unit of merge work; the
//! groups cover the dictionary exactly once, in order, so concatenating the
//! per-group outputs in planning order yields a coordinate-sorted file.
//!
//! This is pure partitioning logic with no I/O.

use crate::dict::SequenceDict;
use crate::errors::{Result, StitchError};
use std::path::{Path, PathBuf};

/// A closed, 1-based range of positions on one reference sequence.
///
/// `sequence_rank` is the sequence's index in the dictionary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Interval {
    /// Index of the reference sequence in the dictionary.
    pub sequence_rank: usize,
    /// First position covered (1-based, inclusive).
    pub start: u64,
    /// Last position covered (1-based, inclusive).
    pub end: u64,
}

impl Interval {
    /// Number of bases covered by this interval.
    #[must_use]
    pub fn length(&self) -> u64 {
        self.end - self.start + 1
    }
}

/// An ordered bundle of intervals merged together by one worker.
///
/// Intervals are in ascending (`sequence_rank`, `start`) order. Across all
/// groups from one planning run, the intervals partition the dictionary with
/// no gaps and no overlaps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntervalGroup {
    /// Zero-based group number in planning order.
    pub id: usize,
    /// Path the merging worker writes this group's records to.
    pub output: PathBuf,
    /// The intervals this group covers, in ascending order.
    pub intervals: Vec<Interval>,
}

impl IntervalGroup {
    /// Total number of bases covered by this group.
    #[must_use]
    pub fn total_length(&self) -> u64 {
        self.intervals.iter().map(Interval::length).sum()
    }
}

/// Partition the sequence dictionary into at most `k` interval groups.
///
/// Walks the dictionary accumulating a running length counter, slicing off as
/// much of each sequence as fits in the current group's remaining budget of
/// `total_length / k` bases. A sequence may be split across groups and a group
/// may span multiple sequences. The final group absorbs any remainder, so the
/// actual group count may be below `k` for small dictionaries but never above.
///
/// Each group's output path is `<interim_dir>/<stem>.group-NNNN.bam`.
///
/// # Errors
/// Returns [`StitchError::InvalidParameter`] if `k` is zero.
pub fn plan_interval_groups(
    dict: &SequenceDict,
    k: usize,
    interim_dir: &Path,
    stem: &str,
) -> Result<Vec<IntervalGroup>> {
    if k == 0 {
        return Err(StitchError::InvalidParameter {
            parameter: "group count".to_string(),
            reason: "must be at least 1".to_string(),
        });
    }

    let total = dict.total_length();
    if total == 0 {
        return Ok(Vec::new());
    }

    let target = (total / k as u64).max(1);

    let mut groups: Vec<IntervalGroup> = Vec::new();
    let mut current: Vec<Interval> = Vec::new();
    let mut accumulated = 0u64;

    let output_path = |id: usize| interim_dir.join(format!("{stem}.group-{id:04}.bam"));

    for (rank, entry) in dict.entries().iter().enumerate() {
        let mut position = 1u64;
        let mut remaining = entry.length;

        while remaining > 0 {
            // Once k-1 groups are closed, the final group absorbs everything.
            let is_final_group = groups.len() + 1 >= k;
            let take =
                if is_final_group { remaining } else { remaining.min(target - accumulated) };

            current.push(Interval {
                sequence_rank: rank,
                start: position,
                end: position + take - 1,
            });
            position += take;
            remaining -= take;
            accumulated += take;

            if !is_final_group && accumulated == target {
                let id = groups.len();
                groups.push(IntervalGroup {
                    id,
                    output: output_path(id),
                    intervals: std::mem::take(&mut current),
                });
                accumulated = 0;
            }
        }
    }

    if !current.is_empty() {
        let id = groups.len();
        groups.push(IntervalGroup { id, output: output_path(id), intervals: current });
    }

    Ok(groups)
}
