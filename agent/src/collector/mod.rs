//! Host collaborators the watchdog consumes
//!
//! The watchdog never touches the watched thread directly. It reads frames
//! through a [`StackCapture`], proves liveness through a
//! [`HeartbeatScheduler`] and measures time through a [`Clock`].

pub mod capture;
pub mod clock;
pub mod scheduler;

pub use capture::StackCapture;
pub use clock::{Clock, ManualClock, MonotonicClock};
pub use scheduler::{HeartbeatScheduler, ManualScheduler, Task, TokioScheduler};
