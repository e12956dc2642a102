//! Tests for indexed group-restricted reading, including the boundary-skip
//! rule at group edges.

use crate::helpers::{header_with_sequences, mapped_record, unmapped_record, write_indexed_bam};
use bamstitch_lib::intervals::{Interval, IntervalGroup};
use bamstitch_lib::merge::group_reader::GroupReader;
use tempfile::TempDir;

fn group(id: usize, dir: &TempDir, intervals: Vec<Interval>) -> IntervalGroup {
    IntervalGroup {
        id,
        output: dir.path().join(format!("out.group-{id:04}.bam")),
        intervals,
    }
}

#[test]
fn test_yields_records_in_interval() {
    let dir = TempDir::new().unwrap();
    let header = header_with_sequences(&[("chr1", 1000)]);
    let bam = dir.path().join("in.bam");
    write_indexed_bam(
        &bam,
        &header,
        &[
            mapped_record("r1", 0, 10, 10),
            mapped_record("r2", 0, 50, 10),
            mapped_record("r3", 0, 200, 10),
        ],
    )
    .unwrap();

    let g = group(0, &dir, vec![Interval { sequence_rank: 0, start: 1, end: 1000 }]);
    let mut reader = GroupReader::new(&bam, &g, 0).unwrap();

    let mut starts = Vec::new();
    while !reader.finished() {
        let (rank, start) = reader.sort_key().unwrap();
        assert_eq!(rank, 0);
        starts.push(start);
        assert!(reader.current().is_some());
        reader.advance().unwrap();
    }

    assert_eq!(starts, vec![10, 50, 200]);
    assert!(reader.current().is_none());
    // Advancing an exhausted reader stays exhausted
    assert_eq!(reader.advance().unwrap(), None);
}

#[test]
fn test_boundary_skip_on_first_interval() {
    let dir = TempDir::new().unwrap();
    let header = header_with_sequences(&[("chr1", 1000)]);
    let bam = dir.path().join("in.bam");
    // r1 starts at 95 and spans into [101, 200], so an index query for the
    // second group returns it; it must be emitted only by the first group.
    write_indexed_bam(
        &bam,
        &header,
        &[
            mapped_record("r1", 0, 95, 10),
            mapped_record("r2", 0, 100, 10),
            mapped_record("r3", 0, 150, 10),
        ],
    )
    .unwrap();

    let first = group(0, &dir, vec![Interval { sequence_rank: 0, start: 1, end: 100 }]);
    let mut reader = GroupReader::new(&bam, &first, 0).unwrap();
    let mut starts = Vec::new();
    while let Some((_, start)) = reader.sort_key() {
        starts.push(start);
        reader.advance().unwrap();
    }
    assert_eq!(starts, vec![95, 100]);

    let second = group(1, &dir, vec![Interval { sequence_rank: 0, start: 101, end: 200 }]);
    let mut reader = GroupReader::new(&bam, &second, 0).unwrap();
    let mut starts = Vec::new();
    while let Some((_, start)) = reader.sort_key() {
        starts.push(start);
        reader.advance().unwrap();
    }
    assert_eq!(starts, vec![150]);
}

#[test]
fn test_group_spanning_two_sequences() {
    let dir = TempDir::new().unwrap();
    let header = header_with_sequences(&[("chr1", 100), ("chr2", 100)]);
    let bam = dir.path().join("in.bam");
    // chr1@40 spans 40-59 and overlaps [51, 100] but starts before it
    write_indexed_bam(
        &bam,
        &header,
        &[
            mapped_record("r1", 0, 40, 20),
            mapped_record("r2", 0, 60, 10),
            mapped_record("r3", 1, 5, 10),
        ],
    )
    .unwrap();

    let g = group(
        1,
        &dir,
        vec![
            Interval { sequence_rank: 0, start: 51, end: 100 },
            Interval { sequence_rank: 1, start: 1, end: 100 },
        ],
    );
    let mut reader = GroupReader::new(&bam, &g, 0).unwrap();

    let mut keys = Vec::new();
    while let Some(key) = reader.sort_key() {
        keys.push(key);
        reader.advance().unwrap();
    }

    assert_eq!(keys, vec![(0, 60), (1, 5)]);
}

#[test]
fn test_empty_region_is_immediately_finished() {
    let dir = TempDir::new().unwrap();
    let header = header_with_sequences(&[("chr1", 1000)]);
    let bam = dir.path().join("in.bam");
    write_indexed_bam(&bam, &header, &[mapped_record("r1", 0, 10, 10)]).unwrap();

    let g = group(0, &dir, vec![Interval { sequence_rank: 0, start: 900, end: 1000 }]);
    let reader = GroupReader::new(&bam, &g, 3).unwrap();

    assert!(reader.finished());
    assert!(reader.current().is_none());
    assert_eq!(reader.source_index(), 3);
}

#[test]
fn test_unplaced_records_never_qualify() {
    let dir = TempDir::new().unwrap();
    let header = header_with_sequences(&[("chr1", 1000)]);
    let bam = dir.path().join("in.bam");
    write_indexed_bam(
        &bam,
        &header,
        &[mapped_record("r1", 0, 10, 10), unmapped_record("u1", 10)],
    )
    .unwrap();

    let g = group(0, &dir, vec![Interval { sequence_rank: 0, start: 1, end: 1000 }]);
    let mut reader = GroupReader::new(&bam, &g, 0).unwrap();

    assert_eq!(reader.sort_key(), Some((0, 10)));
    assert_eq!(reader.advance().unwrap(), None);
    assert!(reader.finished());
}

#[test]
fn test_missing_index_is_an_error() {
    let dir = TempDir::new().unwrap();
    let header = header_with_sequences(&[("chr1", 1000)]);
    let bam = dir.path().join("in.bam");
    write_indexed_bam(&bam, &header, &[mapped_record("r1", 0, 10, 10)]).unwrap();
    std::fs::remove_file(dir.path().join("in.bam.bai")).unwrap();

    let g = group(0, &dir, vec![Interval { sequence_rank: 0, start: 1, end: 1000 }]);
    let result = GroupReader::new(&bam, &g, 0);

    assert!(result.unwrap_err().to_string().contains("No BAI index"));
}
