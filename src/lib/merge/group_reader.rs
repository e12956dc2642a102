//! Indexed reading of one input BAM restricted to one interval group.
//!
//! A [`GroupReader`] walks the BAI chunks covering each interval of the group
//! in order, decoding records and exposing the current qualifying record plus
//! its coordinate sort key. Readers own their file handle, index, and decode
//! buffer outright, so a merge worker can hold many of them at once with no
//! shared state.
//!
//! # Record ownership across groups
//!
//! Index queries return every record *overlapping* an interval, including
//! records that start before it. A record is owned by the group whose interval
//! contains its alignment start, so on the group's first interval any record
//! starting strictly before the interval start is discarded (it belongs to the
//! previous group). Later intervals in a group always begin at position 1 of a
//! fresh sequence, so the check is only needed on the first interval.

use crate::bam_io::find_index_path;
use crate::intervals::{Interval, IntervalGroup};
use anyhow::{Context, Result, bail};
use noodles::bam;
use noodles::bam::bai;
use noodles::bgzf;
use noodles::core::Position;
use noodles::csi::BinningIndex;
use noodles::csi::binning_index::index::reference_sequence::bin::Chunk;
use std::fs::File;
use std::path::Path;

/// Coordinate sort key: (reference sequence rank, 1-based alignment start).
pub type SortKey = (usize, u64);

/// What the reader decided about the record just decoded.
enum Verdict {
    /// Record qualifies for this group; its sort key.
    Qualifies(SortKey),
    /// Record does not qualify here; keep scanning.
    Skip,
    /// Record starts past the current interval; the interval is done.
    PastInterval,
}

/// One input BAM restricted to one interval group.
pub struct GroupReader {
    reader: bam::io::Reader<bgzf::io::Reader<File>>,
    index: bai::Index,
    intervals: Vec<Interval>,
    /// Index of the next interval to load chunks for.
    next_interval: usize,
    /// The interval currently being scanned.
    interval: Option<Interval>,
    chunks: Vec<Chunk>,
    chunk_idx: usize,
    chunk_end: bgzf::VirtualPosition,
    in_chunk: bool,
    record: bam::Record,
    current_key: Option<SortKey>,
    source_index: usize,
}

impl std::fmt::Debug for GroupReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GroupReader")
            .field("intervals", &self.intervals)
            .field("next_interval", &self.next_interval)
            .field("interval", &self.interval)
            .field("chunk_idx", &self.chunk_idx)
            .field("chunk_end", &self.chunk_end)
            .field("in_chunk", &self.in_chunk)
            .field("current_key", &self.current_key)
            .field("source_index", &self.source_index)
            .finish_non_exhaustive()
    }
}

impl GroupReader {
    /// Open `input` restricted to `group` and advance to the first qualifying
    /// record. `source_index` is the input's position in the configured input
    /// list, used as the deterministic tie-break between equal sort keys.
    ///
    /// # Errors
    /// Fails if the file or its BAI index cannot be opened or read.
    pub fn new<P: AsRef<Path>>(
        input: P,
        group: &IntervalGroup,
        source_index: usize,
    ) -> Result<Self> {
        let input = input.as_ref();

        let file = File::open(input)
            .with_context(|| format!("Failed to open input BAM: {}", input.display()))?;
        let mut reader = bam::io::Reader::new(file);
        reader
            .read_header()
            .with_context(|| format!("Failed to read header from: {}", input.display()))?;

        let Some(index_path) = find_index_path(input) else {
            bail!("No BAI index found for input BAM: {}", input.display());
        };
        let index = bai::fs::read(&index_path)
            .with_context(|| format!("Failed to read BAI index: {}", index_path.display()))?;

        let mut group_reader = Self {
            reader,
            index,
            intervals: group.intervals.clone(),
            next_interval: 0,
            interval: None,
            chunks: Vec::new(),
            chunk_idx: 0,
            chunk_end: bgzf::VirtualPosition::MIN,
            in_chunk: false,
            record: bam::Record::default(),
            current_key: None,
            source_index,
        };
        group_reader.advance()?;

        Ok(group_reader)
    }

    /// The record at the cursor, or `None` once exhausted.
    #[must_use]
    pub fn current(&self) -> Option<&bam::Record> {
        self.current_key.map(|_| &self.record)
    }

    /// Sort key of the current record, or `None` once exhausted.
    #[must_use]
    pub fn sort_key(&self) -> Option<SortKey> {
        self.current_key
    }

    /// Position of this reader's input in the configured input list.
    #[must_use]
    pub fn source_index(&self) -> usize {
        self.source_index
    }

    /// True once the cursor has moved past the last qualifying record.
    #[must_use]
    pub fn finished(&self) -> bool {
        self.current_key.is_none()
    }

    /// Move the cursor to the next qualifying record.
    ///
    /// Returns the new current sort key, or `None` if the reader is exhausted.
    ///
    /// # Errors
    /// Fails on any read or seek error; the enclosing merge aborts.
    pub fn advance(&mut self) -> Result<Option<SortKey>> {
        self.current_key = None;

        loop {
            if !self.in_chunk {
                if self.chunk_idx < self.chunks.len() {
                    let chunk = self.chunks[self.chunk_idx];
                    self.chunk_idx += 1;
                    self.reader
                        .get_mut()
                        .seek(chunk.start())
                        .context("Failed to seek to index chunk")?;
                    self.chunk_end = chunk.end();
                    self.in_chunk = true;
                } else if !self.load_next_interval()? {
                    return Ok(None);
                }
                continue;
            }

            if self.reader.get_ref().virtual_position() >= self.chunk_end {
                self.in_chunk = false;
                continue;
            }

            let bytes_read =
                self.reader.read_record(&mut self.record).context("Failed to read BAM record")?;
            if bytes_read == 0 {
                // EOF inside a chunk: nothing further in the file
                self.finish_interval();
                continue;
            }

            match self.evaluate()? {
                Verdict::Qualifies(key) => {
                    self.current_key = Some(key);
                    return Ok(Some(key));
                }
                Verdict::Skip => {}
                Verdict::PastInterval => self.finish_interval(),
            }
        }
    }

    /// Load the BAI chunks for the next interval of the group, if any.
    fn load_next_interval(&mut self) -> Result<bool> {
        let Some(interval) = self.intervals.get(self.next_interval).copied() else {
            self.interval = None;
            return Ok(false);
        };
        self.next_interval += 1;

        let start = Position::try_from(usize::try_from(interval.start)?)?;
        let end = Position::try_from(usize::try_from(interval.end)?)?;
        self.chunks = self
            .index
            .query(interval.sequence_rank, (start..=end).into())
            .context("Failed to query BAI index")?;
        self.chunk_idx = 0;
        self.in_chunk = false;
        self.interval = Some(interval);

        Ok(true)
    }

    /// Abandon the remaining chunks of the current interval.
    fn finish_interval(&mut self) {
        self.chunks.clear();
        self.chunk_idx = 0;
        self.in_chunk = false;
    }

    /// Decide whether the decoded record belongs to the current interval.
    ///
    /// Records are coordinate-sorted within chunks, so a record starting past
    /// the interval end terminates the interval scan.
    fn evaluate(&self) -> Result<Verdict> {
        let Some(interval) = self.interval else {
            return Ok(Verdict::PastInterval);
        };

        let Some(rank) = self.record.reference_sequence_id().transpose()? else {
            // Unplaced records live at the end of the file; nothing mapped follows
            return Ok(Verdict::PastInterval);
        };

        if rank < interval.sequence_rank {
            return Ok(Verdict::Skip);
        }
        if rank > interval.sequence_rank {
            return Ok(Verdict::PastInterval);
        }

        let Some(start) = self.record.alignment_start().transpose()? else {
            return Ok(Verdict::Skip);
        };
        let start = usize::from(start) as u64;

        if start > interval.end {
            return Ok(Verdict::PastInterval);
        }

        // Boundary-skip rule: on the group's first interval, records starting
        // before the interval belong to the previous group.
        let on_first_interval = self.next_interval == 1;
        if on_first_interval && start < interval.start {
            return Ok(Verdict::Skip);
        }

        Ok(Verdict::Qualifies((rank, start)))
    }
}
