//! # Controller
//!
//! - `backoff`: per-resource exponential backoff for requeues and errors
//! - `reconciler`: the managed resource state machine

pub mod backoff;
pub mod reconciler;
