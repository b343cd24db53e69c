//! Stack capture of the watched thread

use anrwatch_shared::Frame;

/// Captures the watched thread's current call stack, innermost frame first.
///
/// Implementations may be slow; the watchdog does not count time spent in
/// `capture` against the watched thread.
pub trait StackCapture: Send + Sync {
    fn capture(&self) -> anyhow::Result<Vec<Frame>>;
}

impl<F> StackCapture for F
where
    F: Fn() -> anyhow::Result<Vec<Frame>> + Send + Sync,
{
    fn capture(&self) -> anyhow::Result<Vec<Frame>> {
        self()
    }
}
