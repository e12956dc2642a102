//! Custom error types for bamstitch operations.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for bamstitch operations
pub type Result<T> = std::result::Result<T, StitchError>;

/// Error type for bamstitch operations
#[derive(Error, Debug)]
pub enum StitchError {
    /// Invalid parameter value provided
    #[error("Invalid parameter '{parameter}': {reason}")]
    InvalidParameter {
        /// The parameter name
        parameter: String,
        /// Explanation of why it's invalid
        reason: String,
    },

    /// File format error
    #[error("Invalid {file_type} file '{path}': {reason}")]
    InvalidFileFormat {
        /// Type of file (e.g., "BAM", "reference")
        file_type: String,
        /// Path to the file
        path: String,
        /// Explanation of the problem
        reason: String,
    },

    /// Input BAM header disagrees with the sequence dictionary
    #[error(
        "Header of '{}' has {found} reference sequences, expected {expected} \
         (all inputs must be aligned to the same reference)",
        path.display()
    )]
    HeaderMismatch {
        /// Path to the offending BAM
        path: PathBuf,
        /// Number of dictionary entries expected
        expected: usize,
        /// Number of reference sequences found in the header
        found: usize,
    },

    /// An external tool invocation returned a non-zero exit status
    #[error("External tool failed: `{command}` exited with {status}: {stderr}")]
    ToolFailed {
        /// The rendered command line
        command: String,
        /// Exit status description
        status: String,
        /// Captured standard error output
        stderr: String,
    },
}
