//! # Error Policy
//!
//! Requeue policy for reconciles that returned an error. Backoff state is
//! tracked per resource so one failing resource can't slow down another.

use crate::controller::reconciler::ReconcileError;
use crate::crd::Managed;
use crate::runtime::watch_loop::Context;
use crate::store::ObjectKey;
use kube_runtime::controller::Action;
use std::sync::Arc;
use tracing::error;

pub fn handle_reconciliation_error<T: Managed>(
    obj: Arc<T>,
    error: &ReconcileError,
    ctx: Arc<Context<T>>,
) -> Action {
    let key = ObjectKey::from_resource(obj.as_ref());
    let (delay, attempts) = ctx.backoff.next_backoff(&key);

    error!(
        "Reconciliation error for {}: {} (retrying in {:?}, error count: {})",
        key, error, delay, attempts
    );

    Action::requeue(delay)
}
