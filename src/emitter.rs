//! # Result Emitter
//!
//! The last step of every invocation: serialize the verdict as one JSON
//! document and map its status to the process exit code the monitoring
//! system expects (OK=0, WARNING=1, CRITICAL=2, UNKNOWN=3).

use anyhow::Result;
use std::io::Write;

use crate::common::messages::Verdict;

/// Write the verdict to `out` and return the exit code for its status.
///
/// The status was normalized into the four-valued set when the verdict was
/// built, so serialization cannot produce anything the monitoring system
/// would not understand.
pub fn emit<W: Write>(verdict: &Verdict, mut out: W) -> Result<i32> {
    let document = serde_json::to_string(verdict)?;
    writeln!(out, "{}", document)?;
    Ok(verdict.status.exit_code())
}
