//! # Reconciliation Logic
//!
//! The managed resource state machine. Each call re-derives what to do from
//! the stored object alone:
//!
//! 1. Fetch the object; a missing object needs no work
//! 2. Orphan: deleted and not allowed to delete, so release the object without
//!    touching the external resource
//! 3. Reject invalid management policies (terminal, needs user action)
//! 4. Stop if paused
//! 5. Refuse to continue while a previous create has no recorded result
//! 6. Initialize, then resolve references (skipped while deleting)
//! 7. Connect and observe
//! 8. Delete, create, late-initialize, update or nothing
//! 9. Persist status and disconnect
//!
//! Transient failures set `Synced=False` and ask for an immediate requeue so
//! the runtime's backoff decides the retry cadence. Up to date resources are
//! polled after the poll interval.

use super::types::{ReconcileError, ReconcileOutcome, Reconciler, StageError};
use crate::connection::ConnectionDetails;
use crate::constants::{
    ERR_ADD_FINALIZER, ERR_CREATE_INCOMPLETE, ERR_INITIALIZE, ERR_MANAGEMENT_POLICY,
    ERR_PUBLISH_CONNECTION, ERR_RECONCILE_CONNECT, ERR_RECONCILE_CREATE, ERR_RECONCILE_DELETE,
    ERR_RECONCILE_OBSERVE, ERR_RECONCILE_UPDATE, ERR_RECORD_CREATE_RESULT, ERR_REMOVE_FINALIZER,
    ERR_RESOLVE_REFERENCES, ERR_UNPUBLISH_CONNECTION, ERR_UPDATE_MANAGED,
};
use crate::crd::{self, Condition, Managed};
use crate::external::{ExternalClient, ExternalObservation};
use crate::meta;
use crate::observability::changelog::{ChangeLogEntry, ChangeOperation};
use crate::observability::events::{
    ManagedEvent, REASON_CANNOT_ADD_FINALIZER, REASON_CANNOT_CONNECT, REASON_CANNOT_CREATE,
    REASON_CANNOT_DELETE, REASON_CANNOT_INITIALIZE, REASON_CANNOT_OBSERVE, REASON_CANNOT_PUBLISH,
    REASON_CANNOT_RECORD_CREATE, REASON_CANNOT_REMOVE_FINALIZER, REASON_CANNOT_RESOLVE_REFS,
    REASON_CANNOT_UNPUBLISH, REASON_CANNOT_UPDATE, REASON_CANNOT_UPDATE_MANAGED, REASON_CREATED,
    REASON_DELETED, REASON_INVALID_POLICY, REASON_PAUSED, REASON_UPDATED,
};
use crate::policy::ManagementPoliciesResolver;
use crate::store::ObjectKey;
use anyhow::anyhow;
use chrono::Utc;
use k8s_openapi::api::core::v1::ObjectReference;
use kube::{Resource, ResourceExt};
use std::future::Future;
use std::time::Duration;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, info, warn, Instrument};

use ReconcileOutcome::{Done, Requeue, RequeueAfter};

impl<T: Managed> Reconciler<T> {
    /// Reconcile the managed resource identified by `key`.
    ///
    /// Calls through the external client must finish within `config.timeout`
    /// of entry; the whole call gets a further grace period on top.
    ///
    /// # Errors
    ///
    /// - [`ReconcileError::Get`] if the object can't be read (other than not found)
    /// - [`ReconcileError::Status`] if the status write fails
    /// - [`ReconcileError::Timeout`] if the call overruns its deadline
    pub async fn reconcile(&self, key: &ObjectKey) -> Result<ReconcileOutcome, ReconcileError> {
        let start = Instant::now();
        let kind = T::kind(&());
        let span = tracing::info_span!(
            "reconcile",
            resource.name = %key.name,
            resource.namespace = key.namespace.as_deref().unwrap_or(""),
            resource.kind = %kind,
        );

        let limit = self.config.reconcile_timeout();
        let external_deadline = deadline_after(start, self.config.timeout);
        let result = match timeout_at(
            deadline_after(start, limit),
            self.reconcile_managed(key, external_deadline)
                .instrument(span.clone()),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(ReconcileError::Timeout(limit)),
        };

        let elapsed = start.elapsed();
        span.in_scope(|| match &result {
            Ok(outcome) => debug!(
                outcome = outcome.as_str(),
                "Reconcile finished in {:.3}s",
                elapsed.as_secs_f64()
            ),
            Err(e) => warn!("❌ Reconcile failed after {:.3}s: {}", elapsed.as_secs_f64(), e),
        });
        let label = result.as_ref().map_or("error", ReconcileOutcome::as_str);
        self.metrics.record_reconcile(label, elapsed);

        result
    }

    async fn reconcile_managed(
        &self,
        key: &ObjectKey,
        external_deadline: Instant,
    ) -> Result<ReconcileOutcome, ReconcileError> {
        let mut managed = match self.store.get(key).await {
            Ok(managed) => managed,
            Err(e) if e.is_not_found() => {
                debug!("Managed resource no longer exists, nothing to do");
                return Ok(Done);
            }
            Err(e) => return Err(ReconcileError::Get(e)),
        };
        debug!("🔄 Reconciling {}", key);

        let reference = managed.object_ref(&());
        let policy = self.policy_resolver(&managed);

        if meta::was_deleted(&managed) && !policy.should_delete() {
            return self.orphan(&mut managed, &reference).await;
        }

        // Configuration error; retrying can't help until the user edits the object
        if let Err(e) = policy.validate() {
            let err = StageError::new(ERR_MANAGEMENT_POLICY, e);
            return self
                .report_error(&mut managed, &reference, REASON_INVALID_POLICY, &err, None, Done)
                .await;
        }

        if policy.is_paused() || meta::is_paused(&managed) {
            debug!("Reconciliation is paused");
            self.recorder
                .record(
                    &reference,
                    ManagedEvent::normal(
                        REASON_PAUSED,
                        "Reconciliation is paused via the pause annotation or empty management policies",
                    ),
                )
                .await;
            managed.set_conditions([crd::reconcile_paused()]);
            return self.persist_status(&mut managed, Done).await;
        }

        // The external create may or may not have happened; creating again
        // could leak a resource
        if meta::external_create_incomplete(&managed) {
            let err = StageError::new(
                ERR_CREATE_INCOMPLETE,
                anyhow!("external-create-pending is newer than any recorded create result"),
            );
            return self
                .report_error(
                    &mut managed,
                    &reference,
                    REASON_CANNOT_INITIALIZE,
                    &err,
                    Some(crd::creating()),
                    RequeueAfter(self.config.short_wait),
                )
                .await;
        }

        if let Err(e) = self.initializer.initialize(&mut managed).await {
            let err = StageError::new(ERR_INITIALIZE, e);
            return self
                .report_error(&mut managed, &reference, REASON_CANNOT_INITIALIZE, &err, None, Requeue)
                .await;
        }

        if !meta::was_deleted(&managed) {
            if let Err(e) = self.resolver.resolve_references(&mut managed).await {
                let blocked = e.is_blocked();
                let err = StageError::new(ERR_RESOLVE_REFERENCES, e);
                warn!("{}", err);
                self.recorder
                    .record(&reference, ManagedEvent::warning(REASON_CANNOT_RESOLVE_REFS, &err))
                    .await;
                let synced = if blocked {
                    crd::reference_resolution_blocked(&err)
                } else {
                    crd::reconcile_error(&err)
                };
                managed.set_conditions([synced]);
                return self.persist_status(&mut managed, Requeue).await;
            }
        }

        let client = match self
            .call_external("connect", external_deadline, self.connector.connect(&managed))
            .await
        {
            Ok(client) => client,
            Err(e) => {
                let err = StageError::new(ERR_RECONCILE_CONNECT, e);
                return self
                    .report_error(&mut managed, &reference, REASON_CANNOT_CONNECT, &err, None, Requeue)
                    .await;
            }
        };

        let result = self
            .reconcile_external(
                &mut managed,
                &reference,
                &policy,
                client.as_ref(),
                external_deadline,
            )
            .await;

        if let Err(e) = client.disconnect().await {
            warn!("Cannot disconnect from provider: {:#}", e);
        }

        result
    }

    async fn reconcile_external(
        &self,
        managed: &mut T,
        reference: &ObjectReference,
        policy: &ManagementPoliciesResolver,
        client: &dyn ExternalClient<T>,
        deadline: Instant,
    ) -> Result<ReconcileOutcome, ReconcileError> {
        let was_ready = is_ready(managed);

        let observation = match self
            .call_external("observe", deadline, client.observe(managed))
            .await
        {
            Ok(observation) => observation,
            Err(e) => {
                let err = StageError::new(ERR_RECONCILE_OBSERVE, e);
                return self
                    .report_error(managed, reference, REASON_CANNOT_OBSERVE, &err, None, Requeue)
                    .await;
            }
        };

        if observation.resource_exists && !observation.resource_up_to_date {
            self.metrics.record_drift();
            debug!(
                diff = observation.diff.as_deref().unwrap_or_default(),
                "External resource is out of date"
            );
        }
        if !was_ready && is_ready(managed) {
            self.metrics.record_first_time_ready();
        }

        if meta::was_deleted(managed) {
            return self
                .reconcile_deletion(managed, reference, client, &observation, deadline)
                .await;
        }

        if let Err(e) = self
            .publisher
            .publish_connection(managed, &observation.connection_details)
            .await
        {
            let err = StageError::new(ERR_PUBLISH_CONNECTION, e);
            return self
                .report_error(managed, reference, REASON_CANNOT_PUBLISH, &err, None, Requeue)
                .await;
        }

        // Before any create, so a crash mid-create still leaves a way to clean up
        if let Err(e) = self.finalizer.add_finalizer(managed).await {
            let err = StageError::new(ERR_ADD_FINALIZER, e);
            return self
                .report_error(managed, reference, REASON_CANNOT_ADD_FINALIZER, &err, None, Requeue)
                .await;
        }

        if !observation.resource_exists {
            if !policy.should_create() {
                let err = StageError::new(
                    ERR_RECONCILE_OBSERVE,
                    anyhow!("external resource does not exist and management policies do not allow creating it"),
                );
                return self
                    .report_error(managed, reference, REASON_CANNOT_OBSERVE, &err, None, Requeue)
                    .await;
            }
            return self.create_external(managed, reference, client, deadline).await;
        }

        // May drop status written by observe; the next reconcile observes again
        if observation.resource_late_initialized && policy.should_late_initialize() {
            match self.store.update(managed).await {
                Ok(updated) => *managed = updated,
                Err(e) => {
                    let err = StageError::new(ERR_UPDATE_MANAGED, e);
                    return self
                        .report_error(
                            managed,
                            reference,
                            REASON_CANNOT_UPDATE_MANAGED,
                            &err,
                            None,
                            Requeue,
                        )
                        .await;
                }
            }
        }

        if observation.resource_up_to_date || !policy.should_update() {
            if !observation.resource_up_to_date {
                debug!("Skipping update; management policies do not allow it");
            }
            managed.set_conditions([crd::reconcile_success()]);
            let after = self.poll_interval(managed);
            return self.persist_status(managed, RequeueAfter(after)).await;
        }

        let update = match self
            .call_external("update", deadline, client.update(managed))
            .await
        {
            Ok(update) => update,
            Err(e) => {
                self.log_change(managed, ChangeOperation::Update, Some(&e)).await;
                let err = StageError::new(ERR_RECONCILE_UPDATE, e);
                return self
                    .report_error(managed, reference, REASON_CANNOT_UPDATE, &err, None, Requeue)
                    .await;
            }
        };
        self.log_change(managed, ChangeOperation::Update, None).await;
        info!("✅ Updated external resource");
        self.recorder
            .record(
                reference,
                ManagedEvent::normal(REASON_UPDATED, update_message(observation.diff.as_deref())),
            )
            .await;

        if let Err(e) = self
            .publisher
            .publish_connection(managed, &update.connection_details)
            .await
        {
            let err = StageError::new(ERR_PUBLISH_CONNECTION, e);
            return self
                .report_error(managed, reference, REASON_CANNOT_PUBLISH, &err, None, Requeue)
                .await;
        }

        managed.set_conditions([crd::reconcile_success()]);
        let after = self.poll_interval(managed);
        self.persist_status(managed, RequeueAfter(after)).await
    }

    async fn create_external(
        &self,
        managed: &mut T,
        reference: &ObjectReference,
        client: &dyn ExternalClient<T>,
        deadline: Instant,
    ) -> Result<ReconcileOutcome, ReconcileError> {
        // Some APIs take a while to report a resource they just created
        if meta::external_create_succeeded_during(
            managed,
            Utc::now(),
            self.config.creation_grace_period,
        ) {
            debug!("External resource was created recently and is not observable yet");
            return Ok(Requeue);
        }

        // Recorded before calling create so a crash in between is detectable
        meta::set_external_create_pending(managed, Utc::now());
        match self.store.update(managed).await {
            Ok(updated) => *managed = updated,
            Err(e) => {
                let err = StageError::new(ERR_UPDATE_MANAGED, e);
                return self
                    .report_error(
                        managed,
                        reference,
                        REASON_CANNOT_UPDATE_MANAGED,
                        &err,
                        Some(crd::creating()),
                        Requeue,
                    )
                    .await;
            }
        }

        let creation = match self
            .call_external("create", deadline, client.create(managed))
            .await
        {
            Ok(creation) => creation,
            Err(e) => {
                meta::set_external_create_failed(managed, Utc::now());
                self.log_change(managed, ChangeOperation::Create, Some(&e)).await;
                let err = StageError::new(ERR_RECONCILE_CREATE, e);
                warn!("{}", err);
                self.recorder
                    .record(reference, ManagedEvent::warning(REASON_CANNOT_CREATE, &err))
                    .await;
                self.record_create_result(managed, reference).await;
                managed.set_conditions([crd::creating(), crd::reconcile_error(&err)]);
                return self.persist_status(managed, Requeue).await;
            }
        };

        meta::set_external_create_succeeded(managed, Utc::now());
        self.record_create_result(managed, reference).await;
        self.log_change(managed, ChangeOperation::Create, None).await;
        info!(
            "✅ Created external resource {}",
            meta::external_name(managed).unwrap_or_default()
        );
        self.recorder
            .record(
                reference,
                ManagedEvent::normal(REASON_CREATED, "Successfully requested creation of external resource"),
            )
            .await;

        if let Err(e) = self
            .publisher
            .publish_connection(managed, &creation.connection_details)
            .await
        {
            let err = StageError::new(ERR_PUBLISH_CONNECTION, e);
            return self
                .report_error(
                    managed,
                    reference,
                    REASON_CANNOT_PUBLISH,
                    &err,
                    Some(crd::creating()),
                    Requeue,
                )
                .await;
        }

        // Observe again to confirm the resource exists
        managed.set_conditions([crd::creating(), crd::reconcile_success()]);
        self.persist_status(managed, Requeue).await
    }

    async fn reconcile_deletion(
        &self,
        managed: &mut T,
        reference: &ObjectReference,
        client: &dyn ExternalClient<T>,
        observation: &ExternalObservation,
        deadline: Instant,
    ) -> Result<ReconcileOutcome, ReconcileError> {
        if observation.resource_exists {
            if let Err(e) = self
                .call_external("delete", deadline, client.delete(managed))
                .await
            {
                self.log_change(managed, ChangeOperation::Delete, Some(&e)).await;
                let err = StageError::new(ERR_RECONCILE_DELETE, e);
                return self
                    .report_error(
                        managed,
                        reference,
                        REASON_CANNOT_DELETE,
                        &err,
                        Some(crd::deleting()),
                        Requeue,
                    )
                    .await;
            }
            self.log_change(managed, ChangeOperation::Delete, None).await;
            info!("🗑️ Requested deletion of external resource");
            self.recorder
                .record(
                    reference,
                    ManagedEvent::normal(REASON_DELETED, "Successfully requested deletion of external resource"),
                )
                .await;
            // Deletion isn't assumed to be synchronous; observe again to confirm
            managed.set_conditions([crd::deleting(), crd::reconcile_success()]);
            return self.persist_status(managed, Requeue).await;
        }

        if let Err(e) = self
            .publisher
            .unpublish_connection(managed, &observation.connection_details)
            .await
        {
            let err = StageError::new(ERR_UNPUBLISH_CONNECTION, e);
            return self
                .report_error(
                    managed,
                    reference,
                    REASON_CANNOT_UNPUBLISH,
                    &err,
                    Some(crd::deleting()),
                    Requeue,
                )
                .await;
        }
        if let Err(e) = self.finalizer.remove_finalizer(managed).await {
            let err = StageError::new(ERR_REMOVE_FINALIZER, e);
            return self
                .report_error(
                    managed,
                    reference,
                    REASON_CANNOT_REMOVE_FINALIZER,
                    &err,
                    Some(crd::deleting()),
                    Requeue,
                )
                .await;
        }

        // The object is presumably gone now; no status to write
        info!("✅ External resource deleted and finalizer removed");
        Ok(Done)
    }

    /// Release a deleted object while leaving its external resource in place
    async fn orphan(
        &self,
        managed: &mut T,
        reference: &ObjectReference,
    ) -> Result<ReconcileOutcome, ReconcileError> {
        debug!("Orphaning external resource");
        let short_wait = RequeueAfter(self.config.short_wait);

        if let Err(e) = self
            .publisher
            .unpublish_connection(managed, &ConnectionDetails::new())
            .await
        {
            let err = StageError::new(ERR_UNPUBLISH_CONNECTION, e);
            return self
                .report_error(
                    managed,
                    reference,
                    REASON_CANNOT_UNPUBLISH,
                    &err,
                    Some(crd::deleting()),
                    short_wait,
                )
                .await;
        }
        if let Err(e) = self.finalizer.remove_finalizer(managed).await {
            let err = StageError::new(ERR_REMOVE_FINALIZER, e);
            return self
                .report_error(
                    managed,
                    reference,
                    REASON_CANNOT_REMOVE_FINALIZER,
                    &err,
                    Some(crd::deleting()),
                    short_wait,
                )
                .await;
        }

        info!("✅ Orphaned external resource and removed finalizer");
        Ok(Done)
    }

    fn policy_resolver(&self, managed: &T) -> ManagementPoliciesResolver {
        let spec = managed.resource_spec();
        let resolver = ManagementPoliciesResolver::new(
            self.config.management_policies_enabled,
            spec.management_policy_set(),
            spec.deletion_policy,
        );
        if self.config.supported_management_policies.is_empty() {
            resolver
        } else {
            resolver.with_supported(self.config.supported_management_policies.clone())
        }
    }

    /// Log, emit a warning event, set `Synced=False` (plus an optional Ready
    /// condition) and persist status
    async fn report_error(
        &self,
        managed: &mut T,
        reference: &ObjectReference,
        reason: &str,
        err: &StageError,
        ready: Option<Condition>,
        outcome: ReconcileOutcome,
    ) -> Result<ReconcileOutcome, ReconcileError> {
        warn!("{}", err);
        self.recorder
            .record(reference, ManagedEvent::warning(reason, err))
            .await;
        managed.set_conditions(ready.into_iter().chain([crd::reconcile_error(err)]));
        self.persist_status(managed, outcome).await
    }

    /// Best effort: a failure here is reported but never fails the reconcile
    async fn record_create_result(&self, managed: &mut T, reference: &ObjectReference) {
        if let Err(e) = self.update_critical_annotations(managed).await {
            let err = StageError::new(ERR_RECORD_CREATE_RESULT, e);
            warn!("{}", err);
            self.recorder
                .record(reference, ManagedEvent::warning(REASON_CANNOT_RECORD_CREATE, &err))
                .await;
        }
    }

    async fn call_external<R>(
        &self,
        operation: &'static str,
        deadline: Instant,
        call: impl Future<Output = anyhow::Result<R>>,
    ) -> anyhow::Result<R> {
        let result = match timeout_at(deadline, call).await {
            Ok(result) => result,
            Err(_) => Err(anyhow!("{} did not finish before the external call deadline", operation)),
        };
        self.metrics.record_external_operation(operation, result.is_ok());
        result
    }

    async fn log_change(
        &self,
        managed: &T,
        operation: ChangeOperation,
        error: Option<&anyhow::Error>,
    ) {
        let entry = ChangeLogEntry {
            timestamp: Utc::now(),
            kind: T::kind(&()).into_owned(),
            namespace: managed.namespace(),
            name: managed.name_any(),
            external_name: meta::external_name(managed).map(str::to_string),
            operation,
            error: error.map(|e| format!("{e:#}")),
        };
        if let Err(e) = self.changelog.log(&entry).await {
            warn!("Cannot write change log entry: {:#}", e);
        }
    }
}

fn update_message(diff: Option<&str>) -> String {
    match diff {
        Some(diff) if !diff.is_empty() => {
            format!("Successfully requested update of external resource: {diff}")
        }
        _ => "Successfully requested update of external resource".to_string(),
    }
}

fn is_ready<T: Managed>(managed: &T) -> bool {
    managed
        .get_condition(crd::TYPE_READY)
        .is_some_and(Condition::is_true)
}

/// Roughly 30 years; stands in for deadlines past the end of the clock
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

/// `start + limit`, clamped instead of overflowing for huge configured limits
fn deadline_after(start: Instant, limit: Duration) -> Instant {
    start
        .checked_add(limit)
        .or_else(|| start.checked_add(FAR_FUTURE))
        .unwrap_or(start)
}
