//! Parsers for Slurm CLI output
//!
//! - [`sacctmgr`] handles the pipe-separated `sacctmgr -s -P list ...` listings.
//! - [`scontrol`] handles the one-line `Key=Value` output of
//!   `scontrol show ... --detail --oneliner`, including `show config`.
//!
//! Both parsers log and drop malformed lines. A value that should be numeric
//! but is not fails the whole invocation.

pub mod sacctmgr;
pub mod scontrol;

pub use sacctmgr::{SacctMgrKind, SacctRecord, parse_sacctmgr_dump};
pub use scontrol::{ScontrolKind, ScontrolRecord, collapse_config, parse_scontrol_dump};

/// Lines that carry content, with trailing whitespace removed
fn content_lines(output: &str) -> impl Iterator<Item = &str> {
    output
        .lines()
        .map(str::trim_end)
        .filter(|line| !line.trim().is_empty())
}
