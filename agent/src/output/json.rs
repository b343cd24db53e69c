//! JSON output
//!
//! Exports an encoded hang profile for attaching to an event

use anyhow::{Context, Result};
use anrwatch_shared::Profile;
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;
use tracing::info;

/// Write `profile` as pretty-printed JSON
pub fn write_profile(profile: &Profile, output_path: impl AsRef<Path>) -> Result<()> {
    let output_path = output_path.as_ref();
    info!("Generating JSON profile: {}", output_path.display());

    let file = File::create(output_path)
        .with_context(|| format!("Failed to create output file: {}", output_path.display()))?;

    let writer = BufWriter::new(file);

    serde_json::to_writer_pretty(writer, profile)
        .context("Failed to serialize profile to JSON")?;

    info!(
        "JSON profile with {} samples written to {}",
        profile.samples.len(),
        output_path.display()
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::encoder::encode_profile;
    use anrwatch_shared::{Frame, StackSample};

    #[test]
    fn test_write_profile() {
        let samples = vec![
            StackSample::new(1500, vec![Frame::without_file("app", "spin", 3)]),
            StackSample::new(1600, vec![Frame::new("app", "spin", "", 3)]),
        ];
        let profile = encode_profile(&samples, &["std::"]);

        let temp_dir = tempfile::tempdir().unwrap();
        let output_path = temp_dir.path().join("profile.json");

        let result = write_profile(&profile, &output_path);
        assert!(result.is_ok());
        assert!(output_path.exists());

        let contents = std::fs::read_to_string(&output_path).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&contents).unwrap();
        assert_eq!(parsed["samples"][0]["timestamp"], 1.5);
        assert_eq!(parsed["thread_metadata"]["0"]["name"], "main");
        assert!(parsed["frames"][0]["file"].is_null());
        assert_eq!(parsed["frames"][1]["file"], "");
        assert_eq!(parsed["frames"][0]["in_app"], true);

        let back: Profile = serde_json::from_str(&contents).unwrap();
        assert_eq!(back, profile);
    }

    #[test]
    fn test_write_profile_bad_path() {
        let temp_dir = tempfile::tempdir().unwrap();
        let output_path = temp_dir.path().join("missing").join("profile.json");
        assert!(write_profile(&Profile::new(), &output_path).is_err());
    }
}
