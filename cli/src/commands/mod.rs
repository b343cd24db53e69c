//! Subcommand implementations

pub mod culprit;
pub mod demo;
pub mod inspect;
pub mod profile;

use anyhow::{Context, Result};
use anrwatch_agent::read_snapshot;
use anrwatch_shared::{decode_sample, StackSample};
use std::path::Path;

/// Samples of a profile file, oldest first. The file is never modified.
pub fn load_samples(path: &Path) -> Result<Vec<StackSample>> {
    let snapshot = read_snapshot(path)
        .with_context(|| format!("Failed to read profile file: {}", path.display()))?;
    Ok(snapshot
        .records
        .iter()
        .filter_map(|record| decode_sample(record))
        .collect())
}
