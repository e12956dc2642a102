//! Invocations of the external alignment toolkit.
//!
//! Index building and final concatenation are delegated to an external tool
//! (samtools by default) via its `index` and `cat` subcommands. A non-zero
//! exit status is a fatal, structured error carrying the captured stderr.

use crate::errors::{Result, StitchError};
use log::debug;
use std::path::Path;
use std::process::Command;

/// Build a BAI index for `bam` by running `<tool> index -@ <threads> <bam>`.
///
/// # Errors
/// Returns [`StitchError::ToolFailed`] if the tool cannot be spawned or exits
/// non-zero.
pub fn run_index(tool: &str, bam: &Path, threads: usize) -> Result<()> {
    let mut command = Command::new(tool);
    command.arg("index").arg("-@").arg(threads.to_string()).arg(bam);
    run(command)
}

/// Concatenate same-header BAM files, in the given order, into `output` by
/// running `<tool> cat -@ <threads> -o <output> <inputs...>`.
///
/// The order of `inputs` determines the record order of the result.
///
/// # Errors
/// Returns [`StitchError::ToolFailed`] if the tool cannot be spawned or exits
/// non-zero.
pub fn run_concat(tool: &str, output: &Path, inputs: &[&Path], threads: usize) -> Result<()> {
    let mut command = Command::new(tool);
    command.arg("cat").arg("-@").arg(threads.to_string()).arg("-o").arg(output);
    for input in inputs {
        command.arg(input);
    }
    run(command)
}

fn run(mut command: Command) -> Result<()> {
    let rendered = render(&command);
    debug!("Running: {rendered}");

    let output = command.output().map_err(|e| StitchError::ToolFailed {
        command: rendered.clone(),
        status: "failed to spawn".to_string(),
        stderr: e.to_string(),
    })?;

    if !output.status.success() {
        return Err(StitchError::ToolFailed {
            command: rendered,
            status: output.status.to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }

    Ok(())
}

fn render(command: &Command) -> String {
    let mut parts = vec![command.get_program().to_string_lossy().into_owned()];
    parts.extend(command.get_args().map(|a| a.to_string_lossy().into_owned()));
    parts.join(" ")
}
