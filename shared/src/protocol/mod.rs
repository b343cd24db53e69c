//! On-disk record formats
//!
//! Stack samples are persisted as self-contained binary records so a sample
//! written just before the process was killed can still be read back.

pub mod record;
