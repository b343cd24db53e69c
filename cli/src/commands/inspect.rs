//! Inspect command implementation

use crate::output;
use anyhow::{Context, Result};
use anrwatch_agent::output::render_stack_dump;
use anrwatch_agent::read_snapshot;
use anrwatch_shared::decode_sample;
use clap::Args;
use std::path::PathBuf;

#[derive(Args, Debug)]
pub struct InspectArgs {
    /// Profile file (e.g. anr_profile or anr_profile.old)
    pub file: PathBuf,

    /// Print every sample's frames
    #[arg(short, long)]
    pub frames: bool,
}

pub fn run(args: InspectArgs) -> Result<()> {
    let snapshot = read_snapshot(&args.file)
        .with_context(|| format!("Failed to read profile file: {}", args.file.display()))?;

    let samples: Vec<_> = snapshot
        .records
        .iter()
        .filter_map(|record| decode_sample(record))
        .collect();

    output::heading(&format!("{}", args.file.display()));
    println!("  Capacity:        {}", snapshot.capacity);
    println!("  Records:         {}", snapshot.records.len());
    println!("  Decodable:       {}", samples.len());

    if snapshot.uncommitted_bytes > 0 {
        output::warning(&format!(
            "{} bytes of an interrupted write follow the last record",
            snapshot.uncommitted_bytes
        ));
    }
    if samples.len() < snapshot.records.len() {
        output::warning(&format!(
            "{} records could not be decoded",
            snapshot.records.len() - samples.len()
        ));
    }

    let (Some(first), Some(last)) = (samples.first(), samples.last()) else {
        output::info("No samples recorded");
        return Ok(());
    };

    let deepest = samples.iter().map(|s| s.depth()).max().unwrap_or(0);
    println!("  First sample:    {}", first.timestamp_ms);
    println!("  Last sample:     {}", last.timestamp_ms);
    println!(
        "  Span:            {}ms",
        last.timestamp_ms - first.timestamp_ms
    );
    println!("  Deepest stack:   {} frames", deepest);

    if args.frames {
        println!();
        print!("{}", render_stack_dump(&samples));
    }

    Ok(())
}
