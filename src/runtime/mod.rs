//! # Runtime
//!
//! Wires a [`Reconciler`](crate::controller::reconciler::Reconciler) into the
//! kube-rs controller runtime.

pub mod error_policy;
pub mod initialization;
pub mod watch_loop;

pub use initialization::{install_crypto_provider, kube_reconciler, run};
pub use watch_loop::{run_controller, Context};
