//! Encoding hang samples as a sampled profile

use anrwatch_shared::{
    Frame, Profile, ProfileFrame, ProfileSample, StackSample, WATCHED_THREAD_ID,
};
use std::collections::HashMap;

/// Deduplicate frames and stacks of `samples` into a [`Profile`].
///
/// Samples keep their input order and none are dropped. Frames whose module
/// matches one of `system_prefixes` are marked as not in-app.
pub fn encode_profile<S: AsRef<str>>(samples: &[StackSample], system_prefixes: &[S]) -> Profile {
    let mut profile = Profile::new();
    let mut frame_ids: HashMap<&Frame, usize> = HashMap::new();
    let mut stack_ids: HashMap<Vec<usize>, usize> = HashMap::new();

    for sample in samples {
        let stack: Vec<usize> = sample
            .frames
            .iter()
            .map(|frame| {
                *frame_ids.entry(frame).or_insert_with(|| {
                    profile.frames.push(ProfileFrame {
                        frame: frame.clone(),
                        in_app: !frame.matches_any_prefix(system_prefixes),
                    });
                    profile.frames.len() - 1
                })
            })
            .collect();

        let stack_id = match stack_ids.get(&stack) {
            Some(&id) => id,
            None => {
                let id = profile.stacks.len();
                profile.stacks.push(stack.clone());
                stack_ids.insert(stack, id);
                id
            }
        };

        profile.samples.push(ProfileSample {
            timestamp: sample.timestamp_ms as f64 / 1000.0,
            stack_id,
            thread_id: WATCHED_THREAD_ID.to_string(),
        });
    }

    profile
}
