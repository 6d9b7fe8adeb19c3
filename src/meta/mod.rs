//! # Metadata Helpers
//!
//! Pure functions that read and write well-known annotations and finalizers on
//! managed resources. Nothing in here talks to the API server.

pub mod annotations;

pub use annotations::*;
