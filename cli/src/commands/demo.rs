//! Demo command implementation
//!
//! Runs a tokio `current_thread` runtime on a dedicated "watched" thread,
//! blocks it on purpose and lets the watchdog catch it. The profile file is
//! rotated on every run, so a second run also reports the hang recorded by the
//! first one, the same way an application reports the previous session.

use super::culprit::print_signature;
use super::load_samples;
use crate::output;
use anyhow::{Context, Result};
use anrwatch_agent::output::{write_profile, write_stack_dump, STACK_DUMP_FILE_NAME};
use anrwatch_agent::{
    encode_profile, CulpritIdentifier, ProfileManager, RotationCoordinator, TokioScheduler,
    Watchdog, WatchdogConfig,
};
use anrwatch_shared::utils::parse_duration;
use anrwatch_shared::{Frame, StackSample};
use clap::Args;
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::Duration;
use tokio::sync::oneshot;

#[derive(Args, Debug)]
pub struct DemoArgs {
    /// Directory holding the profile files
    #[arg(short, long)]
    pub dir: Option<PathBuf>,

    /// How long the watched thread blocks (e.g., "5s", "800ms")
    #[arg(long, default_value = "5s")]
    pub hang: String,

    /// Write profile.json and stacktraces.txt next to the profile files
    #[arg(long)]
    pub export: bool,
}

/// Stack the watched thread publishes for the capture callback
type SharedStack = Arc<Mutex<Vec<Frame>>>;

pub fn run(args: DemoArgs, config: WatchdogConfig) -> Result<()> {
    let hang = parse_duration(&args.hang).context("Failed to parse hang duration")?;
    let dir = args
        .dir
        .unwrap_or_else(|| std::env::temp_dir().join("anrwatch-demo"));
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("Failed to create {}", dir.display()))?;

    let rotation = RotationCoordinator::new();
    rotation.rotate();
    report_previous_session(&rotation, &dir, &config);

    let stack: SharedStack = Arc::new(Mutex::new(Vec::new()));
    let (handle_tx, handle_rx) = mpsc::channel();
    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
    let (hung_tx, hung_rx) = mpsc::channel();

    let watched_stack = Arc::clone(&stack);
    let watched = thread::Builder::new()
        .name("watched".to_string())
        .spawn(move || -> Result<()> {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .context("Failed to build the watched runtime")?;
            let _ = handle_tx.send(runtime.handle().clone());

            runtime.block_on(async move {
                tokio::time::sleep(Duration::from_millis(300)).await;
                block_watched_thread(&watched_stack, hang);
                let _ = hung_tx.send(());
                let _ = shutdown_rx.await;
            });
            Ok(())
        })
        .context("Failed to spawn the watched thread")?;

    let handle = handle_rx
        .recv()
        .context("Watched thread exited before starting its runtime")?;

    let store = ProfileManager::open(rotation.file_for_recording(&dir), config.queue_capacity);
    let capture_stack = Arc::clone(&stack);
    let watchdog = Watchdog::builder(
        config.clone(),
        store,
        move || -> Result<Vec<Frame>> {
            Ok(capture_stack
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone())
        },
        TokioScheduler::new(handle),
    )
    .on_hang(|event| {
        output::warning(&format!(
            "Hang confirmed after {}ms ({} samples so far)",
            event.idle_ms, event.samples
        ))
    })
    .build()?;

    output::info(&format!(
        "Watching thread 'watched', blocking it for {}ms",
        hang.as_millis()
    ));
    watchdog.on_foreground();

    hung_rx
        .recv()
        .context("Watched thread exited before finishing its hang")?;
    // Let the watchdog see the thread respond again
    thread::sleep(config.poll_interval() * 3);
    let state = watchdog.state();
    let samples = watchdog.samples();
    watchdog.close();

    let _ = shutdown_tx.send(());
    match watched.join() {
        Ok(result) => result?,
        Err(_) => anyhow::bail!("Watched thread panicked"),
    }

    output::success(&format!(
        "Recorded {} samples (watchdog state after recovery: {:?})",
        samples.len(),
        state
    ));

    match CulpritIdentifier::from_config(&config).identify(&samples) {
        Some(culprit) => print_signature(1, &culprit),
        None => output::info("Hang too short to sample, no culprit"),
    }

    if args.export {
        export(&dir, &samples, &config)?;
    }

    Ok(())
}

/// Publish a believable stack, then block the runtime thread
fn block_watched_thread(stack: &SharedStack, hang: Duration) {
    let frames = vec![
        Frame::new("std::thread", "sleep", "thread/mod.rs", 879),
        Frame::new("demo_app::settings", "load", "settings.rs", 41),
        Frame::new("demo_app::startup", "on_start", "startup.rs", 12),
        Frame::new("tokio::runtime::runtime", "block_on", "runtime.rs", 349),
    ];
    *stack.lock().unwrap_or_else(PoisonError::into_inner) = frames;

    thread::sleep(hang);

    stack.lock().unwrap_or_else(PoisonError::into_inner).clear();
}

fn report_previous_session(rotation: &RotationCoordinator, dir: &Path, config: &WatchdogConfig) {
    let last = rotation.last_file(dir);
    if !last.exists() {
        return;
    }

    let samples = previous_samples(&last);
    if let Some(culprit) = CulpritIdentifier::from_config(config).identify(&samples) {
        output::info(&format!(
            "Previous run left {} samples in {}",
            samples.len(),
            last.display()
        ));
        print_signature(1, &culprit);
        println!();
    }
    rotation.delete_last_file(dir);
}

/// Samples of the previous run. The file is left exactly as it was found.
fn previous_samples(path: &Path) -> Vec<StackSample> {
    match load_samples(path) {
        Ok(samples) => samples,
        Err(e) => {
            output::warning(&format!("Ignoring previous run: {:#}", e));
            Vec::new()
        }
    }
}

fn export(dir: &Path, samples: &[StackSample], config: &WatchdogConfig) -> Result<()> {
    let profile = encode_profile(samples, &config.system_prefixes);
    let json = dir.join("profile.json");
    write_profile(&profile, &json)?;

    let dump = dir.join(STACK_DUMP_FILE_NAME);
    write_stack_dump(samples, &dump)?;

    output::success(&format!(
        "Exported {} and {}",
        json.display(),
        dump.display()
    ));
    Ok(())
}
