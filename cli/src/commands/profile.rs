//! Profile command implementation

use super::load_samples;
use crate::output;
use anyhow::Result;
use anrwatch_agent::encode_profile;
use anrwatch_agent::output::{write_profile, write_stack_dump};
use anrwatch_agent::WatchdogConfig;
use clap::Args;
use std::path::PathBuf;

#[derive(Args, Debug)]
pub struct ProfileArgs {
    /// Profile file (e.g. anr_profile.old)
    pub file: PathBuf,

    /// Output file for the JSON profile
    #[arg(short, long, default_value = "profile.json")]
    pub output: PathBuf,

    /// Also write the plain-text stack dump
    #[arg(long)]
    pub dump: Option<PathBuf>,
}

pub fn run(args: ProfileArgs, config: &WatchdogConfig) -> Result<()> {
    let samples = load_samples(&args.file)?;
    let profile = encode_profile(&samples, &config.system_prefixes);

    write_profile(&profile, &args.output)?;
    output::success(&format!(
        "Wrote {} samples ({} unique stacks, {} unique frames, {:.3}s) to {}",
        profile.samples.len(),
        profile.stacks.len(),
        profile.frames.len(),
        profile.duration_secs(),
        args.output.display()
    ));

    if let Some(dump) = &args.dump {
        write_stack_dump(&samples, dump)?;
        output::success(&format!("Wrote stack dump to {}", dump.display()));
    }

    Ok(())
}
