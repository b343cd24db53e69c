//! Utility functions and helpers

pub mod time;

use anyhow::Result;
use std::time::Duration;

/// Parse a duration string (e.g., "250ms", "30s", "5m")
pub fn parse_duration(s: &str) -> Result<Duration> {
    let s = s.trim();

    if let Some(num_str) = s.strip_suffix("ms") {
        let millis: u64 = num_str.parse()?;
        Ok(Duration::from_millis(millis))
    } else if let Some(num_str) = s.strip_suffix('s') {
        let secs: u64 = num_str.parse()?;
        Ok(Duration::from_secs(secs))
    } else if let Some(num_str) = s.strip_suffix('m') {
        let mins: u64 = num_str.parse()?;
        Ok(Duration::from_secs(mins * 60))
    } else {
        // Default to milliseconds if no suffix
        let millis: u64 = s.parse()?;
        Ok(Duration::from_millis(millis))
    }
}
