//! # Configuration
//!
//! Settings for the reconciler and the runtime around it.

pub mod reconciler;

pub use reconciler::ReconcilerConfig;
