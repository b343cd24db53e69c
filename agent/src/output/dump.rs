//! Plain-text stack dump attached next to a hang report

use anyhow::{Context, Result};
use anrwatch_shared::StackSample;
use std::fmt::Write as _;
use std::path::Path;

/// Conventional attachment name for the dump
pub const STACK_DUMP_FILE_NAME: &str = "stacktraces.txt";

/// One block per sample: a `Timestamp: <ms>` line, one line per frame
/// (innermost first), then a blank line.
pub fn render_stack_dump(samples: &[StackSample]) -> String {
    let mut out = String::new();
    for sample in samples {
        // Writing into a String cannot fail
        let _ = writeln!(out, "Timestamp: {}", sample.timestamp_ms);
        for frame in &sample.frames {
            let _ = writeln!(out, "{}", frame);
        }
        out.push('\n');
    }
    out
}

pub fn write_stack_dump(samples: &[StackSample], output_path: impl AsRef<Path>) -> Result<()> {
    let output_path = output_path.as_ref();
    std::fs::write(output_path, render_stack_dump(samples))
        .with_context(|| format!("Failed to write stack dump: {}", output_path.display()))
}
