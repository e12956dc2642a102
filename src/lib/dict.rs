//! Sequence dictionary loading.
//!
//! The merge plans its interval groups over the reference genome's sequence
//! dictionary: the ordered list of (name, length) pairs for every contig. The
//! dictionary is read from the reference's FAI index, which carries names and
//! lengths in canonical order without touching the sequence data itself.

use crate::errors::StitchError;
use anyhow::{Context, Result, bail};
use noodles::fasta::fai;
use noodles::sam::Header;
use std::path::{Path, PathBuf};

/// One reference sequence: its canonical name and total length in bases.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SequenceEntry {
    /// Sequence name (e.g., "chr1").
    pub name: String,
    /// Sequence length in bases.
    pub length: u64,
}

/// An ordered sequence dictionary describing every reference sequence.
#[derive(Debug, Clone, Default)]
pub struct SequenceDict {
    entries: Vec<SequenceEntry>,
}

impl SequenceDict {
    /// Build a dictionary from (name, length) pairs, preserving order.
    #[must_use]
    pub fn new(entries: Vec<SequenceEntry>) -> Self {
        Self { entries }
    }

    /// Load the dictionary from a reference FASTA's FAI index.
    ///
    /// # Errors
    /// Returns an error if no FAI index can be found next to the reference or
    /// if the index cannot be parsed.
    pub fn from_reference<P: AsRef<Path>>(reference: P) -> Result<Self> {
        let reference = reference.as_ref();
        let Some(fai_path) = find_fai_path(reference) else {
            bail!(
                "No FAI index found for reference: {} (expected {}.fai)",
                reference.display(),
                reference.display()
            );
        };

        let index = fai::fs::read(&fai_path)
            .with_context(|| format!("Failed to read FAI index: {}", fai_path.display()))?;
        let records: &[fai::Record] = index.as_ref();

        let entries = records
            .iter()
            .map(|record| SequenceEntry {
                name: String::from_utf8_lossy(record.name()).into_owned(),
                length: record.length(),
            })
            .collect();

        Ok(Self { entries })
    }

    /// The dictionary entries in canonical order.
    #[must_use]
    pub fn entries(&self) -> &[SequenceEntry] {
        &self.entries
    }

    /// Number of sequences in the dictionary.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if the dictionary has no sequences.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Total length of all sequences in bases.
    #[must_use]
    pub fn total_length(&self) -> u64 {
        self.entries.iter().map(|e| e.length).sum()
    }

    /// Check that a BAM header agrees with this dictionary on sequence count.
    ///
    /// Inputs aligned to a different reference produce an undetectable
    /// mis-merge, so this is fatal.
    ///
    /// # Errors
    /// Returns [`StitchError::HeaderMismatch`] on disagreement.
    pub fn validate_header(&self, path: &Path, header: &Header) -> Result<()> {
        let found = header.reference_sequences().len();
        if found != self.len() {
            return Err(StitchError::HeaderMismatch {
                path: PathBuf::from(path),
                expected: self.len(),
                found,
            }
            .into());
        }
        Ok(())
    }
}

/// Find FAI index path for a FASTA file.
fn find_fai_path(fasta_path: &Path) -> Option<PathBuf> {
    // Try appending .fai to full path
    let fai_path = PathBuf::from(format!("{}.fai", fasta_path.display()));
    if fai_path.exists() {
        return Some(fai_path);
    }

    // Try replacing the extension
    let fai_path = fasta_path.with_extension("fai");
    if fai_path.exists() {
        return Some(fai_path);
    }

    None
}
