//! Frame and stack sample types
//!
//! A [`StackSample`] is one snapshot of the watched thread's call stack taken
//! while the thread is unresponsive.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Timestamp in milliseconds (wall clock for samples)
pub type TimestampMs = i64;

/// A single frame of the watched thread's call stack
#[derive(Debug, Clone, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct Frame {
    /// Module, class or crate path the function belongs to
    pub module: String,

    /// Function name
    pub function: String,

    /// Source file name. `None` and `Some("")` are different values.
    pub file: Option<String>,

    /// Line number, negative when unknown
    pub line: i32,
}

impl Frame {
    /// Create a frame with a known source file
    pub fn new(
        module: impl Into<String>,
        function: impl Into<String>,
        file: impl Into<String>,
        line: i32,
    ) -> Self {
        Self {
            module: module.into(),
            function: function.into(),
            file: Some(file.into()),
            line,
        }
    }

    /// Create a frame whose source file is not known
    pub fn without_file(module: impl Into<String>, function: impl Into<String>, line: i32) -> Self {
        Self {
            module: module.into(),
            function: function.into(),
            file: None,
            line,
        }
    }

    /// Check whether the frame's module starts with any of the given prefixes
    pub fn matches_any_prefix<S: AsRef<str>>(&self, prefixes: &[S]) -> bool {
        prefixes
            .iter()
            .any(|prefix| self.module.starts_with(prefix.as_ref()))
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{}({}:{})",
            self.module,
            self.function,
            self.file.as_deref().unwrap_or("Unknown Source"),
            self.line
        )
    }
}

/// A timestamped snapshot of the watched thread's call stack
#[derive(Debug, Clone, Eq, PartialEq, Serialize, Deserialize)]
pub struct StackSample {
    /// When the sample was captured
    pub timestamp_ms: TimestampMs,

    /// Frames from innermost (index 0) to outermost
    pub frames: Vec<Frame>,
}

impl StackSample {
    /// Create a new sample
    pub fn new(timestamp_ms: TimestampMs, frames: Vec<Frame>) -> Self {
        Self {
            timestamp_ms,
            frames,
        }
    }

    /// Number of frames in the sample
    pub fn depth(&self) -> usize {
        self.frames.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_display() {
        let frame = Frame::new("app::ui", "render", "ui.rs", 42);
        assert_eq!(frame.to_string(), "app::ui.render(ui.rs:42)");

        let frame = Frame::without_file("app::ui", "render", -1);
        assert_eq!(frame.to_string(), "app::ui.render(Unknown Source:-1)");
    }

    #[test]
    fn test_absent_and_empty_file_differ() {
        let absent = Frame::without_file("m", "f", 1);
        let empty = Frame::new("m", "f", "", 1);
        assert_ne!(absent, empty);
    }

    #[test]
    fn test_matches_any_prefix() {
        let frame = Frame::new("std::thread", "sleep", "thread.rs", 10);
        assert!(frame.matches_any_prefix(&["core::", "std::"]));
        assert!(!frame.matches_any_prefix(&["app::"]));
        assert!(!frame.matches_any_prefix::<&str>(&[]));
    }

    #[test]
    fn test_sample_serialization() {
        let sample = StackSample::new(1234, vec![Frame::new("app", "main", "main.rs", 3)]);
        let json = serde_json::to_string(&sample).unwrap();
        let back: StackSample = serde_json::from_str(&json).unwrap();
        assert_eq!(sample, back);
        assert_eq!(back.depth(), 1);
    }
}
