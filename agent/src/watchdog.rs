//! Heartbeat watchdog for the watched thread.
//!
//! A background thread periodically posts a trivial acknowledgement task onto
//! the watched thread's scheduler and measures how long ago the last one ran.
//! Once the gap crosses the suspicion threshold the thread's stack is sampled
//! into the [`ProfileManager`] on every poll, and once it crosses the ANR
//! threshold the hang is confirmed.
//!
//! ```text
//!            gap > suspicion            gap > anr
//!   Idle ───────────────────▶ Suspicious ────────▶ Confirmed
//!    ▲                            │                    │
//!    └────────── gap < suspicion ─┴────────────────────┘
//! ```

use crate::collector::{Clock, HeartbeatScheduler, MonotonicClock, StackCapture};
use crate::config::WatchdogConfig;
use crate::manager::ProfileManager;
use anrwatch_shared::{Frame, StackSample};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle, ThreadId};
use tracing::{debug, info, warn};

/// Name of the polling thread
pub const WATCHDOG_THREAD_NAME: &str = "anrwatch-watchdog";

/// Responsiveness of the watched thread as last observed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum WatchState {
    Idle = 0,
    Suspicious = 1,
    Confirmed = 2,
}

impl WatchState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => WatchState::Suspicious,
            2 => WatchState::Confirmed,
            _ => WatchState::Idle,
        }
    }
}

/// Passed to the hang listener when a hang is confirmed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HangEvent {
    /// Heartbeat gap at confirmation, capture time excluded
    pub idle_ms: u64,

    /// Samples persisted so far in this episode
    pub samples: usize,
}

type HangListener = Box<dyn Fn(&HangEvent) + Send + Sync>;

enum Signal {
    Wake,
    Stop,
}

/// Written by the acknowledgement tasks on the watched thread
struct Heartbeat {
    /// Only ever moves forward, so a late task cannot rewind it
    last_ack_ms: AtomicU64,
}

struct Sampler {
    state: WatchState,
    sample_count: usize,
    /// `None` once the watchdog is closed
    store: Option<ProfileManager>,
    last_seen_ack: u64,
    capture_overhead_ms: u64,
}

struct Shared {
    config: WatchdogConfig,
    clock: Arc<dyn Clock>,
    capture: Arc<dyn StackCapture>,
    scheduler: Arc<dyn HeartbeatScheduler>,
    heartbeat: Arc<Heartbeat>,
    sampler: Mutex<Sampler>,
    state: AtomicU8,
    listener: Option<HangListener>,
}

struct Worker {
    handle: JoinHandle<()>,
    signals: Sender<Signal>,
}

#[derive(Default)]
struct Lifecycle {
    closed: bool,
    worker: Option<Worker>,
    /// Workers told to stop but not joined yet
    retired: Vec<JoinHandle<()>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Builds a [`Watchdog`]
pub struct WatchdogBuilder {
    config: WatchdogConfig,
    store: ProfileManager,
    capture: Arc<dyn StackCapture>,
    scheduler: Arc<dyn HeartbeatScheduler>,
    clock: Arc<dyn Clock>,
    listener: Option<HangListener>,
}

impl WatchdogBuilder {
    /// Replace the monotonic process clock
    pub fn clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    /// Called on the watchdog thread once per confirmed hang
    pub fn on_hang(mut self, listener: impl Fn(&HangEvent) + Send + Sync + 'static) -> Self {
        self.listener = Some(Box::new(listener));
        self
    }

    pub fn build(self) -> anyhow::Result<Watchdog> {
        self.config.validate()?;

        let now = self.clock.now_ms();
        let shared = Shared {
            config: self.config,
            clock: self.clock,
            capture: self.capture,
            scheduler: self.scheduler,
            heartbeat: Arc::new(Heartbeat {
                last_ack_ms: AtomicU64::new(now),
            }),
            sampler: Mutex::new(Sampler {
                state: WatchState::Idle,
                sample_count: 0,
                store: Some(self.store),
                last_seen_ack: now,
                capture_overhead_ms: 0,
            }),
            state: AtomicU8::new(WatchState::Idle as u8),
            listener: self.listener,
        };

        Ok(Watchdog {
            shared: Arc::new(shared),
            lifecycle: Mutex::new(Lifecycle::default()),
        })
    }
}

/// Hang watchdog for one watched thread
pub struct Watchdog {
    shared: Arc<Shared>,
    lifecycle: Mutex<Lifecycle>,
}

impl Watchdog {
    pub fn builder(
        config: WatchdogConfig,
        store: ProfileManager,
        capture: impl StackCapture + 'static,
        scheduler: impl HeartbeatScheduler + 'static,
    ) -> WatchdogBuilder {
        WatchdogBuilder {
            config,
            store,
            capture: Arc::new(capture),
            scheduler: Arc::new(scheduler),
            clock: Arc::new(MonotonicClock),
            listener: None,
        }
    }

    /// Start watching. A running watchdog is woken up for an immediate poll
    /// instead of being restarted.
    pub fn on_foreground(&self) {
        let mut lifecycle = lock(&self.lifecycle);
        if lifecycle.closed {
            return;
        }
        lifecycle.retired.retain(|handle| !handle.is_finished());

        if let Some(worker) = &lifecycle.worker {
            if !worker.handle.is_finished() && worker.signals.send(Signal::Wake).is_ok() {
                return;
            }
        }

        // Time spent in the background is not a hang
        self.shared.reset();

        let (signals, receiver) = mpsc::channel();
        let shared = Arc::clone(&self.shared);
        let spawned = thread::Builder::new()
            .name(WATCHDOG_THREAD_NAME.to_string())
            .spawn(move || shared.run(receiver));

        match spawned {
            Ok(handle) => {
                info!(
                    "Hang watchdog started (poll every {}ms, ANR after {}ms)",
                    self.shared.config.poll_interval_ms, self.shared.config.anr_threshold_ms
                );
                lifecycle.worker = Some(Worker { handle, signals });
            }
            Err(e) => {
                warn!("Failed to spawn hang watchdog thread: {}", e);
                lifecycle.worker = None;
            }
        }
    }

    /// Stop watching without waiting for the polling thread to exit
    pub fn on_background(&self) {
        let mut lifecycle = lock(&self.lifecycle);
        if lifecycle.closed {
            return;
        }
        if let Some(worker) = lifecycle.worker.take() {
            let _ = worker.signals.send(Signal::Stop);
            lifecycle.retired.push(worker.handle);
            debug!("Hang watchdog stopping");
        }
    }

    /// Stop the polling thread, wait for it, and release the sample store.
    /// Every lifecycle call afterwards is a no-op.
    pub fn close(&self) {
        let handles = {
            let mut lifecycle = lock(&self.lifecycle);
            if lifecycle.closed {
                return;
            }
            lifecycle.closed = true;

            let mut handles = std::mem::take(&mut lifecycle.retired);
            if let Some(worker) = lifecycle.worker.take() {
                let _ = worker.signals.send(Signal::Stop);
                handles.push(worker.handle);
            }
            handles
        };

        let current = thread::current().id();
        for handle in handles {
            // A listener closing the watchdog runs on the watchdog thread
            if handle.thread().id() == current {
                continue;
            }
            if handle.join().is_err() {
                warn!("Hang watchdog thread panicked");
            }
        }

        if let Some(mut store) = lock(&self.shared.sampler).store.take() {
            store.close();
        }
        info!("Hang watchdog closed");
    }

    /// Run a single poll on the calling thread
    pub fn poll_once(&self) {
        self.shared.poll();
    }

    pub fn state(&self) -> WatchState {
        WatchState::from_u8(self.shared.state.load(Ordering::Acquire))
    }

    /// Samples captured in the current episode
    pub fn sample_count(&self) -> usize {
        lock(&self.shared.sampler).sample_count
    }

    /// Samples currently persisted, oldest first
    pub fn samples(&self) -> Vec<StackSample> {
        match lock(&self.shared.sampler).store.as_mut() {
            Some(store) => store.load(),
            None => Vec::new(),
        }
    }

    pub fn is_running(&self) -> bool {
        lock(&self.lifecycle)
            .worker
            .as_ref()
            .is_some_and(|worker| !worker.handle.is_finished())
    }

    pub fn is_closed(&self) -> bool {
        lock(&self.lifecycle).closed
    }

    /// Id of the live polling thread, if any
    pub fn worker_thread_id(&self) -> Option<ThreadId> {
        lock(&self.lifecycle)
            .worker
            .as_ref()
            .map(|worker| worker.handle.thread().id())
    }

    pub fn config(&self) -> &WatchdogConfig {
        &self.shared.config
    }
}

impl Drop for Watchdog {
    fn drop(&mut self) {
        self.close();
    }
}

impl Shared {
    fn run(&self, signals: Receiver<Signal>) {
        debug!("Hang watchdog thread running");
        loop {
            match signals.recv_timeout(self.config.poll_interval()) {
                Ok(Signal::Wake) | Err(RecvTimeoutError::Timeout) => self.poll(),
                Ok(Signal::Stop) | Err(RecvTimeoutError::Disconnected) => break,
            }
        }
        debug!("Hang watchdog thread exited");
    }

    fn reset(&self) {
        let now = self.clock.now_ms();
        self.heartbeat.last_ack_ms.store(now, Ordering::Release);

        let mut sampler = lock(&self.sampler);
        sampler.last_seen_ack = now;
        sampler.capture_overhead_ms = 0;
        self.set_state(&mut sampler, WatchState::Idle);
    }

    fn set_state(&self, sampler: &mut Sampler, state: WatchState) {
        sampler.state = state;
        self.state.store(state as u8, Ordering::Release);
    }

    fn poll(&self) {
        let confirmed = {
            let mut sampler = lock(&self.sampler);
            if sampler.store.is_none() {
                return;
            }
            self.check(&mut sampler)
        };

        if let (Some(event), Some(listener)) = (confirmed, &self.listener) {
            listener(&event);
        }

        self.post_heartbeat();
    }

    /// One state machine step. Returns the event to report when the hang was
    /// confirmed by this step.
    fn check(&self, sampler: &mut Sampler) -> Option<HangEvent> {
        let last_ack = self.heartbeat.last_ack_ms.load(Ordering::Acquire);
        if last_ack != sampler.last_seen_ack {
            sampler.last_seen_ack = last_ack;
            sampler.capture_overhead_ms = 0;
        }

        let idle_ms = self
            .clock
            .now_ms()
            .saturating_sub(last_ack)
            .saturating_sub(sampler.capture_overhead_ms);

        if idle_ms < self.config.suspicion_threshold_ms {
            if sampler.state != WatchState::Idle {
                info!("Watched thread responsive again after {} samples", sampler.sample_count);
            }
            self.set_state(sampler, WatchState::Idle);
        }

        if sampler.state == WatchState::Idle && idle_ms > self.config.suspicion_threshold_ms {
            info!("Watched thread unresponsive for {}ms, sampling", idle_ms);
            self.set_state(sampler, WatchState::Suspicious);
            if let Some(store) = sampler.store.as_mut() {
                store.clear();
            }
            sampler.sample_count = 0;
        }

        if sampler.state != WatchState::Idle && sampler.sample_count < self.config.max_samples {
            self.sample(sampler);
        }

        if sampler.state == WatchState::Suspicious && idle_ms > self.config.anr_threshold_ms {
            info!(
                "Hang confirmed: watched thread unresponsive for {}ms ({} samples)",
                idle_ms, sampler.sample_count
            );
            self.set_state(sampler, WatchState::Confirmed);
            return Some(HangEvent {
                idle_ms,
                samples: sampler.sample_count,
            });
        }

        None
    }

    fn sample(&self, sampler: &mut Sampler) {
        let started = self.clock.now_ms();
        let frames = self.capture_frames();
        sampler.capture_overhead_ms += self.clock.now_ms().saturating_sub(started);

        let Some(frames) = frames else {
            return;
        };
        let sample = StackSample::new(self.clock.wall_ms(), frames);
        debug!(
            "Captured watched thread stack ({} frames) in {}ms",
            sample.depth(),
            self.clock.now_ms().saturating_sub(started)
        );

        if let Some(store) = sampler.store.as_mut() {
            store.add(&sample);
            sampler.sample_count += 1;
        }
    }

    fn capture_frames(&self) -> Option<Vec<Frame>> {
        match panic::catch_unwind(AssertUnwindSafe(|| self.capture.capture())) {
            Ok(Ok(frames)) if frames.is_empty() => {
                debug!("Stack capture returned no frames, sample dropped");
                None
            }
            Ok(Ok(frames)) => Some(frames),
            Ok(Err(e)) => {
                debug!("Stack capture failed, sample dropped: {:#}", e);
                None
            }
            Err(_) => {
                debug!("Stack capture panicked, sample dropped");
                None
            }
        }
    }

    /// Post a fresh acknowledgement on every poll. Tasks queued earlier may
    /// still run; each of them is an equally valid sign of life.
    fn post_heartbeat(&self) {
        let heartbeat = Arc::clone(&self.heartbeat);
        let clock = Arc::clone(&self.clock);
        self.scheduler.post(Box::new(move || {
            heartbeat.last_ack_ms.fetch_max(clock.now_ms(), Ordering::AcqRel);
        }));
    }
}
