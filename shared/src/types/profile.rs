//! Profile data structures
//!
//! A [`Profile`] is the deduplicated, indexed form of a list of stack samples,
//! suitable for attaching to a hang event.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::sample::Frame;

/// Synthetic id of the single watched thread
pub const WATCHED_THREAD_ID: &str = "0";

/// Name reported for the watched thread
pub const WATCHED_THREAD_NAME: &str = "main";

/// Scheduling priority reported for the watched thread
pub const WATCHED_THREAD_PRIORITY: i32 = 5;

/// A deduplicated frame entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileFrame {
    #[serde(flatten)]
    pub frame: Frame,

    /// Whether the frame belongs to application code
    pub in_app: bool,
}

/// One sample record pointing into the stack table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileSample {
    /// Capture time in seconds
    pub timestamp: f64,

    /// Index into [`Profile::stacks`]
    pub stack_id: usize,

    /// Thread the sample was taken on
    pub thread_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThreadMetadata {
    pub name: String,
    pub priority: i32,
}

/// Sampled profile of the watched thread
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    /// Unique frames, in first-seen order
    pub frames: Vec<ProfileFrame>,

    /// Unique stacks as frame indices, innermost first
    pub stacks: Vec<Vec<usize>>,

    /// Samples in input order
    pub samples: Vec<ProfileSample>,

    /// Metadata keyed by thread id
    pub thread_metadata: BTreeMap<String, ThreadMetadata>,
}

impl Profile {
    /// Create an empty profile carrying the watched thread's metadata
    pub fn new() -> Self {
        let mut thread_metadata = BTreeMap::new();
        thread_metadata.insert(
            WATCHED_THREAD_ID.to_string(),
            ThreadMetadata {
                name: WATCHED_THREAD_NAME.to_string(),
                priority: WATCHED_THREAD_PRIORITY,
            },
        );
        Self {
            frames: Vec::new(),
            stacks: Vec::new(),
            samples: Vec::new(),
            thread_metadata,
        }
    }

    /// Time covered by the samples in seconds
    pub fn duration_secs(&self) -> f64 {
        let first = self.samples.first().map(|s| s.timestamp);
        let last = self.samples.last().map(|s| s.timestamp);
        match (first, last) {
            (Some(first), Some(last)) if last > first => last - first,
            _ => 0.0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

impl Default for Profile {
    fn default() -> Self {
        Self::new()
    }
}
