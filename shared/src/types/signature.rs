//! Culprit signature produced by folding hang samples

use serde::{Deserialize, Serialize};

use super::sample::{Frame, TimestampMs};

/// A stack suffix shared by one or more samples, with its folding statistics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregatedSignature {
    /// Frames of the suffix, innermost first
    pub frames: Vec<Frame>,

    /// Number of samples containing this suffix
    pub occurrence_count: u32,

    /// Fraction of application frames in the suffix, in `[0, 1]`
    pub quality_score: f64,

    pub first_seen_ms: TimestampMs,
    pub last_seen_ms: TimestampMs,
}

impl AggregatedSignature {
    /// Start a signature from its first occurrence
    pub fn new(frames: Vec<Frame>, quality_score: f64, timestamp_ms: TimestampMs) -> Self {
        Self {
            frames,
            occurrence_count: 1,
            quality_score,
            first_seen_ms: timestamp_ms,
            last_seen_ms: timestamp_ms,
        }
    }

    /// Record another occurrence. The quality score is left untouched.
    pub fn record(&mut self, timestamp_ms: TimestampMs) {
        self.occurrence_count += 1;
        self.first_seen_ms = self.first_seen_ms.min(timestamp_ms);
        self.last_seen_ms = self.last_seen_ms.max(timestamp_ms);
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    /// Ranking score: `count * quality * depth`
    pub fn score(&self) -> f64 {
        self.occurrence_count as f64 * self.quality_score * self.depth() as f64
    }

    /// How long the signature was observed, in milliseconds
    pub fn duration_ms(&self) -> i64 {
        self.last_seen_ms - self.first_seen_ms
    }
}
