//! # Reconciler
//!
//! Generic reconciliation of managed resources against an external system.
//!
//! The reconciler:
//! - Fetches the managed resource and evaluates pause and management policy state
//! - Runs initializers and resolves references
//! - Connects to the external system through an [`ExternalConnector`](crate::external::ExternalConnector)
//! - Creates, updates or deletes the external resource as observed state requires
//! - Publishes connection details and manages the finalizer
//! - Updates Ready and Synced conditions and decides when to reconcile next
//!
//! See [`reconcile`] for the full sequence.

pub mod reconcile;
pub mod status;
pub mod types;

pub use status::jittered;
pub use types::{
    PollIntervalHook, ReconcileError, ReconcileOutcome, Reconciler, ReconcilerBuilder, StageError,
};
