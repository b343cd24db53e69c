//! Hang watchdog and hang profiler
//!
//! A [`Watchdog`] watches one thread through heartbeats, samples its stack
//! while it is unresponsive and persists the samples through a
//! [`ProfileManager`]. A later session reads them back (see
//! [`RotationCoordinator`]) and reduces them to a culprit signature with
//! [`CulpritIdentifier`] or to a sampled profile with [`encode_profile`].

pub mod collector;
pub mod config;
pub mod culprit;
pub mod encoder;
pub mod manager;
pub mod output;
pub mod queue;
pub mod rotation;
pub mod watchdog;

pub use collector::{
    Clock, HeartbeatScheduler, ManualClock, ManualScheduler, MonotonicClock, StackCapture,
    TokioScheduler,
};
pub use config::WatchdogConfig;
pub use culprit::{identify_culprit, CulpritIdentifier};
pub use encoder::encode_profile;
pub use manager::ProfileManager;
pub use queue::{read_snapshot, QueueError, QueueFile, QueueSnapshot};
pub use rotation::RotationCoordinator;
pub use watchdog::{HangEvent, WatchState, Watchdog, WatchdogBuilder};
