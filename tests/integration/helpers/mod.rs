//! Helper utilities for integration tests.


pub use bam_factory::*;
pub use stub_tool::*;
