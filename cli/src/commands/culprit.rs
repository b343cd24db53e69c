//! Culprit command implementation

use super::load_samples;
use crate::output;
use anyhow::Result;
use anrwatch_agent::{CulpritIdentifier, WatchdogConfig};
use anrwatch_shared::AggregatedSignature;
use clap::Args;
use std::path::PathBuf;

#[derive(Args, Debug)]
pub struct CulpritArgs {
    /// Profile file (e.g. anr_profile.old)
    pub file: PathBuf,

    /// Number of signatures to show
    #[arg(short, long, default_value = "1")]
    pub top: usize,

    /// Print the result as JSON
    #[arg(long)]
    pub json: bool,
}

pub fn run(args: CulpritArgs, config: &WatchdogConfig) -> Result<()> {
    let samples = load_samples(&args.file)?;
    let identifier = CulpritIdentifier::from_config(config);

    let ranked: Vec<AggregatedSignature> = identifier
        .rank(&samples)
        .into_iter()
        .take(args.top)
        .collect();

    if args.json {
        println!("{}", serde_json::to_string_pretty(&ranked)?);
        return Ok(());
    }

    if ranked.is_empty() {
        output::info(&format!(
            "No culprit: none of the {} samples has at least two frames",
            samples.len()
        ));
        return Ok(());
    }

    output::success(&format!(
        "Folded {} samples from {}",
        samples.len(),
        args.file.display()
    ));
    for (rank, signature) in ranked.iter().enumerate() {
        print_signature(rank + 1, signature);
    }

    Ok(())
}

pub fn print_signature(rank: usize, signature: &AggregatedSignature) {
    println!();
    output::heading(&format!(
        "#{} score {:.2} ({} occurrences, quality {:.2}, depth {}, seen for {}ms)",
        rank,
        signature.score(),
        signature.occurrence_count,
        signature.quality_score,
        signature.depth(),
        signature.duration_ms()
    ));
    for frame in &signature.frames {
        println!("    at {}", frame);
    }
}
