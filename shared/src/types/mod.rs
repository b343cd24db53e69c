//! Data model for watched-thread samples and the artifacts derived from them

pub mod profile;
pub mod sample;
pub mod signature;
