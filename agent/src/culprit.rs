//! Culprit identification by stack folding.
//!
//! Every eligible sample contributes all of its outer suffixes. A suffix that
//! recurs across samples is code the watched thread kept returning to while
//! hung; the winner balances how often it recurs, how much of it is
//! application code and how specific (deep) it is.

use crate::config::WatchdogConfig;
use anrwatch_shared::{AggregatedSignature, Frame, StackSample};
use std::collections::HashMap;

/// Samples shallower than this carry no useful signature
pub const MIN_FRAMES: usize = 2;

/// Folds hang samples into scored stack signatures
#[derive(Debug, Clone)]
pub struct CulpritIdentifier {
    system_prefixes: Vec<String>,
}

impl CulpritIdentifier {
    pub fn new(system_prefixes: Vec<String>) -> Self {
        Self { system_prefixes }
    }

    pub fn from_config(config: &WatchdogConfig) -> Self {
        Self::new(config.system_prefixes.clone())
    }

    /// The signature with the highest `count * quality * depth`. Ties go to
    /// the signature folded first.
    pub fn identify(&self, samples: &[StackSample]) -> Option<AggregatedSignature> {
        let mut best: Option<AggregatedSignature> = None;
        for signature in self.fold(samples) {
            let better = match &best {
                Some(current) => signature.score() > current.score(),
                None => true,
            };
            if better {
                best = Some(signature);
            }
        }
        best
    }

    /// All signatures, best first
    pub fn rank(&self, samples: &[StackSample]) -> Vec<AggregatedSignature> {
        let mut signatures = self.fold(samples);
        signatures.sort_by(|a, b| b.score().total_cmp(&a.score()));
        signatures
    }

    /// All signatures in the order they were first seen
    pub fn fold(&self, samples: &[StackSample]) -> Vec<AggregatedSignature> {
        let mut ordered: Vec<&StackSample> = samples
            .iter()
            .filter(|sample| sample.depth() >= MIN_FRAMES)
            .collect();
        ordered.sort_by_key(|sample| sample.timestamp_ms);

        let mut index: HashMap<&[Frame], usize> = HashMap::new();
        let mut signatures: Vec<AggregatedSignature> = Vec::new();

        for sample in ordered {
            let frames = sample.frames.as_slice();
            let depth = frames.len();
            let mut app_frames = 0usize;

            // Outermost first, so the running count covers exactly the suffix
            for i in (0..depth).rev() {
                if !self.is_system(&frames[i]) {
                    app_frames += 1;
                }

                let suffix = &frames[i..];
                match index.get(suffix) {
                    Some(&pos) => signatures[pos].record(sample.timestamp_ms),
                    None => {
                        let quality = app_frames as f64 / (depth - i) as f64;
                        index.insert(suffix, signatures.len());
                        signatures.push(AggregatedSignature::new(
                            suffix.to_vec(),
                            quality,
                            sample.timestamp_ms,
                        ));
                    }
                }
            }
        }

        signatures
    }

    fn is_system(&self, frame: &Frame) -> bool {
        frame.matches_any_prefix(&self.system_prefixes)
    }
}

/// Pick the most likely culprit of a hang
pub fn identify_culprit<S: AsRef<str>>(
    samples: &[StackSample],
    system_prefixes: &[S],
) -> Option<AggregatedSignature> {
    let prefixes = system_prefixes
        .iter()
        .map(|p| p.as_ref().to_string())
        .collect();
    CulpritIdentifier::new(prefixes).identify(samples)
}
