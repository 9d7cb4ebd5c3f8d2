//! Secret fetcher implementations

pub mod memory;

#[cfg(feature = "file")]
pub mod file;

#[cfg(feature = "gcp")]
pub mod gcp;
