//! Shared types and utilities for anrwatch
//!
//! This crate contains the value types (frames, stack samples, profiles and
//! culprit signatures) and the binary record codec used by the watchdog agent
//! and the command-line tooling.

pub mod protocol;
pub mod types;
pub mod utils;

// Re-export commonly used types
pub use protocol::record::{decode_sample, encode_sample, CodecError, RECORD_VERSION};
pub use types::{profile::*, sample::*, signature::*};
