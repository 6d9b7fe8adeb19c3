//! # Status
//!
//! Status persistence, poll interval computation and the best-effort write of
//! the create result annotations.

use super::types::{ReconcileError, ReconcileOutcome, Reconciler};
use crate::constants::{
    ANNOTATION_EXTERNAL_CREATE_FAILED, ANNOTATION_EXTERNAL_CREATE_PENDING,
    ANNOTATION_EXTERNAL_CREATE_SUCCEEDED, ANNOTATION_EXTERNAL_NAME, CREATE_ANNOTATION_ATTEMPTS,
    ERR_UPDATE_MANAGED_STATUS,
};
use crate::crd::Managed;
use crate::store::{ObjectKey, StoreError};
use kube::ResourceExt;
use std::time::Duration;
use tracing::debug;

/// Annotations that must never be lost once the external create has run
const CRITICAL_ANNOTATIONS: [&str; 4] = [
    ANNOTATION_EXTERNAL_NAME,
    ANNOTATION_EXTERNAL_CREATE_PENDING,
    ANNOTATION_EXTERNAL_CREATE_SUCCEEDED,
    ANNOTATION_EXTERNAL_CREATE_FAILED,
];

/// Randomly shift `interval` by up to `jitter` in either direction, never below zero
pub fn jittered(interval: Duration, jitter: Duration) -> Duration {
    if jitter.is_zero() {
        return interval;
    }
    let offset = (rand::random::<f64>() * 2.0 - 1.0) * jitter.as_secs_f64();
    Duration::try_from_secs_f64((interval.as_secs_f64() + offset).max(0.0)).unwrap_or(interval)
}

impl<T: Managed> Reconciler<T> {
    /// Write the status subresource and return `outcome`.
    ///
    /// A failed write replaces the outcome with an error.
    pub(crate) async fn persist_status(
        &self,
        managed: &mut T,
        outcome: ReconcileOutcome,
    ) -> Result<ReconcileOutcome, ReconcileError> {
        match self.store.update_status(managed).await {
            Ok(updated) => {
                *managed = updated;
                Ok(outcome)
            }
            Err(source) => Err(ReconcileError::Status {
                stage: ERR_UPDATE_MANAGED_STATUS,
                source,
            }),
        }
    }

    /// Poll interval for an up to date resource: hooks, then jitter
    pub fn poll_interval(&self, managed: &T) -> Duration {
        let base = self.config.poll_interval;
        let interval = self
            .poll_interval_hooks
            .iter()
            .fold(base, |_, hook| hook(managed, base));
        jittered(interval, self.config.poll_jitter)
    }

    /// Persist the external name and create annotations.
    ///
    /// On conflict the latest object is read, the annotations are applied to it
    /// and the write is retried. `managed` keeps its in-memory spec and status
    /// and picks up the stored metadata.
    pub(crate) async fn update_critical_annotations(
        &self,
        managed: &mut T,
    ) -> Result<(), StoreError> {
        let key = ObjectKey::from_resource(managed);
        let wanted: Vec<(String, String)> = CRITICAL_ANNOTATIONS
            .iter()
            .filter_map(|k| {
                managed
                    .annotations()
                    .get(*k)
                    .map(|v| ((*k).to_string(), v.clone()))
            })
            .collect();

        let mut candidate = managed.clone();
        let mut last_err = StoreError::Conflict(key.to_string());
        for attempt in 1..=CREATE_ANNOTATION_ATTEMPTS {
            match self.store.update(&candidate).await {
                Ok(updated) => {
                    *managed.meta_mut() = updated.meta().clone();
                    return Ok(());
                }
                Err(e) if e.is_conflict() => {
                    debug!(
                        "Conflict recording create annotations for {} (attempt {}/{})",
                        key, attempt, CREATE_ANNOTATION_ATTEMPTS
                    );
                    last_err = e;
                    if attempt < CREATE_ANNOTATION_ATTEMPTS {
                        candidate = self.store.get(&key).await?;
                        candidate.annotations_mut().extend(wanted.iter().cloned());
                    }
                }
                Err(e) => return Err(e),
            }
        }
        Err(last_err)
    }
}
