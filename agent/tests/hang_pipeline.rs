//! Integration test: full hang pipeline (watch → persist → rotate → analyze)
//!
//! A first session records a hang into the active file. The next session
//! rotates it away, reads the previous session's samples back and reduces them
//! to a culprit, a profile and a stack dump, without any real thread hanging.

use anrwatch_agent::output::{render_stack_dump, write_profile};
use anrwatch_agent::{
    encode_profile, CulpritIdentifier, ManualClock, ManualScheduler, ProfileManager,
    RotationCoordinator, WatchState, Watchdog, WatchdogConfig,
};
use anrwatch_shared::{Frame, Profile};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

fn config() -> WatchdogConfig {
    WatchdogConfig {
        poll_interval_ms: 60_000,
        suspicion_threshold_ms: 1000,
        anr_threshold_ms: 4000,
        max_samples: 40,
        queue_capacity: 40,
        system_prefixes: vec!["std::".to_string(), "tokio::".to_string()],
    }
}

/// The watched thread alternates between two places inside the same query
fn capture(calls: Arc<AtomicUsize>) -> impl Fn() -> anyhow::Result<Vec<Frame>> + Send + Sync {
    move || {
        let n = calls.fetch_add(1, Ordering::SeqCst);
        let innermost = if n % 3 == 0 {
            Frame::new("std::io", "read", "io.rs", 10)
        } else {
            Frame::new("app::db", "decode_row", "db.rs", 88)
        };
        Ok(vec![
            innermost,
            Frame::new("app::db", "query", "db.rs", 42),
            Frame::new("app::ui", "on_click", "ui.rs", 7),
            Frame::new("tokio::runtime", "block_on", "runtime.rs", 300),
        ])
    }
}

#[test]
fn test_hang_survives_restart_and_is_analyzed() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let rotation = Arc::new(RotationCoordinator::new());
    let calls = Arc::new(AtomicUsize::new(0));

    // Session 1: the watched thread hangs and the process dies
    {
        let path = rotation.file_for_recording(dir.path());
        let store = ProfileManager::open(&path, config().queue_capacity);
        let clock = Arc::new(ManualClock::new(0));
        let scheduler = Arc::new(ManualScheduler::new());
        let watchdog = Watchdog::builder(config(), store, capture(Arc::clone(&calls)), scheduler)
            .clock(Arc::clone(&clock))
            .build()?;

        for _ in 0..60 {
            clock.advance(99);
            watchdog.poll_once();
        }
        assert_eq!(watchdog.state(), WatchState::Confirmed);
        assert!(watchdog.sample_count() > 10);
    }

    // Session 2: rotate first, then read what the last session left behind
    rotation.rotate();
    let active = rotation.file_for_recording(dir.path());
    assert!(!active.exists());

    let last = rotation.last_file(dir.path());
    let mut previous = ProfileManager::open(&last, config().queue_capacity);
    let samples = previous.load();
    assert_eq!(samples.len(), calls.load(Ordering::SeqCst));
    assert!(samples.windows(2).all(|w| w[0].timestamp_ms <= w[1].timestamp_ms));

    let identifier = CulpritIdentifier::from_config(&config());
    let culprit = identifier.identify(&samples).expect("culprit");
    assert_eq!(culprit.frames[0], Frame::new("app::db", "query", "db.rs", 42));
    assert_eq!(culprit.occurrence_count as usize, samples.len());
    assert!(culprit.quality_score > 0.5);

    let profile = encode_profile(&samples, &config().system_prefixes);
    assert_eq!(profile.samples.len(), samples.len());
    assert_eq!(profile.stacks.len(), 2);
    assert_eq!(profile.frames.len(), 5);

    let json_path = dir.path().join("profile.json");
    write_profile(&profile, &json_path)?;
    let parsed: Profile = serde_json::from_str(&std::fs::read_to_string(&json_path)?)?;
    assert_eq!(parsed, profile);

    let dump = render_stack_dump(&samples);
    assert_eq!(dump.matches("Timestamp: ").count(), samples.len());
    assert!(dump.contains("app::db.query(db.rs:42)"));

    previous.close();
    assert!(rotation.delete_last_file(dir.path()));
    Ok(())
}

#[test]
fn test_two_detectors_share_one_rotation() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    std::fs::write(dir.path().join("anr_profile"), b"")?;

    let rotation = Arc::new(RotationCoordinator::new());
    rotation.rotate();

    let first = Arc::clone(&rotation);
    let second = Arc::clone(&rotation);
    let dir_path = dir.path().to_path_buf();
    let a = std::thread::spawn({
        let dir = dir_path.clone();
        move || first.file_for_recording(&dir)
    });
    let b = std::thread::spawn(move || second.last_file(&dir_path));

    let active = a.join().unwrap();
    let last = b.join().unwrap();
    assert!(last.exists());
    assert!(!active.exists());
    assert!(!rotation.is_rotation_pending());
    Ok(())
}
