//! CLI for anrwatch
//!
//! Offline tooling around hang profile files:
//! - inspect: summarize a persisted sample queue
//! - culprit: rank the stack signatures of a recorded hang
//! - profile: export a recorded hang as a JSON profile
//! - demo: hang a thread on purpose and watch it get caught

use anyhow::Result;
use anrwatch_agent::WatchdogConfig;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod commands;
mod output;

#[derive(Parser)]
#[command(name = "anrwatch")]
#[command(about = "anrwatch - hang watchdog and hang profiler", long_about = None)]
#[command(version)]
struct Cli {
    /// Watchdog configuration file (TOML)
    #[arg(short, long, global = true, env = "ANRWATCH_CONFIG")]
    config: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Summarize the samples stored in a profile file
    Inspect(commands::inspect::InspectArgs),

    /// Rank the stack signatures of a recorded hang
    Culprit(commands::culprit::CulpritArgs),

    /// Export a recorded hang as a JSON profile
    Profile(commands::profile::ProfileArgs),

    /// Simulate a hang on a watched tokio thread
    Demo(commands::demo::DemoArgs),
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = load_config(cli.config)?;

    let result = match cli.command {
        Commands::Inspect(args) => commands::inspect::run(args),
        Commands::Culprit(args) => commands::culprit::run(args, &config),
        Commands::Profile(args) => commands::profile::run(args, &config),
        Commands::Demo(args) => commands::demo::run(args, config),
    };

    if let Err(e) = result {
        output::error(&format!("{:#}", e));
        std::process::exit(1);
    }
    Ok(())
}

fn load_config(path: Option<PathBuf>) -> Result<WatchdogConfig> {
    match path {
        Some(path) => WatchdogConfig::load(path),
        None => Ok(WatchdogConfig::default()),
    }
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug"))
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();
}
