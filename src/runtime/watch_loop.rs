//! # Watch Loop
//!
//! Runs a [`Reconciler`] under a `kube_runtime::Controller`, translating
//! reconcile outcomes into controller actions.
//!
//! - `Done` waits for the next change and resets the resource's backoff
//! - `RequeueAfter(d)` requeues after `d` and resets the backoff
//! - `Requeue` requeues after the resource's next exponential backoff

use crate::controller::backoff::BackoffStates;
use crate::controller::reconciler::{ReconcileError, ReconcileOutcome, Reconciler};
use crate::crd::Managed;
use crate::runtime::error_policy::handle_reconciliation_error;
use crate::store::ObjectKey;
use futures::StreamExt;
use kube::api::Api;
use kube_runtime::controller::{Action, Config as ControllerConfig};
use kube_runtime::{watcher, Controller};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Shared state handed to every reconcile
pub struct Context<T> {
    pub reconciler: Arc<Reconciler<T>>,
    pub backoff: BackoffStates,
}

impl<T> std::fmt::Debug for Context<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("backoff", &self.backoff)
            .finish_non_exhaustive()
    }
}

impl<T: Managed> Context<T> {
    pub fn new(reconciler: Reconciler<T>) -> Self {
        let config = reconciler.config();
        let backoff = BackoffStates::new(
            config.backoff_start_duration(),
            config.backoff_max_duration(),
        );
        Self {
            reconciler: Arc::new(reconciler),
            backoff,
        }
    }

    /// Map a reconcile outcome to a controller action, updating backoff state
    pub fn action_for(&self, key: &ObjectKey, outcome: ReconcileOutcome) -> Action {
        match outcome {
            ReconcileOutcome::Done => {
                self.backoff.reset(key);
                Action::await_change()
            }
            ReconcileOutcome::RequeueAfter(after) => {
                self.backoff.reset(key);
                Action::requeue(after)
            }
            ReconcileOutcome::Requeue => {
                let (delay, attempts) = self.backoff.next_backoff(key);
                debug!(
                    "Requeueing {} in {:?} (attempt {})",
                    key, delay, attempts
                );
                Action::requeue(delay)
            }
        }
    }
}

async fn reconcile_object<T: Managed>(
    obj: Arc<T>,
    ctx: Arc<Context<T>>,
) -> Result<Action, ReconcileError> {
    let key = ObjectKey::from_resource(obj.as_ref());
    let outcome = ctx.reconciler.reconcile(&key).await?;
    Ok(ctx.action_for(&key, outcome))
}

/// Watch every object served by `api` and reconcile it until a shutdown
/// signal is received
///
/// # Errors
///
/// Currently never fails; watch errors are logged and the watch is retried.
pub async fn run_controller<T: Managed>(
    api: Api<T>,
    reconciler: Reconciler<T>,
) -> Result<(), anyhow::Error> {
    let concurrency = reconciler.config().max_concurrent_reconciles;
    let ctx = Arc::new(Context::new(reconciler));

    info!("Starting controller watch loop for {}...", T::kind(&()));

    Controller::new(api, watcher::Config::default().any_semantic())
        .with_config(ControllerConfig::default().concurrency(concurrency))
        .shutdown_on_signal()
        .run(reconcile_object::<T>, handle_reconciliation_error::<T>, ctx)
        .for_each(|result| async move {
            match result {
                Ok((obj, _)) => debug!("watch.event.success: {}", obj.name),
                Err(e) => warn!("Controller event failed: {}", e),
            }
        })
        .await;

    info!("Controller stopped gracefully");
    Ok(())
}
