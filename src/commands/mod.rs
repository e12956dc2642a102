//! CLI command implementations.

pub mod command;
pub mod merge;
