//! Common test utilities for reconciler tests
//!
//! Provides a `Bucket` managed resource and in-memory stand-ins for the
//! object store, the external system, the Secret API and the side channels.
//! No cluster is needed.

#![allow(dead_code, reason = "each test binary uses a different subset")]

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{ObjectReference, Secret};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use kube::{CustomResource, Resource, ResourceExt};
use managed_resource_runtime::config::ReconcilerConfig;
use managed_resource_runtime::connection::{
    ConnectionDetails, ConnectionPublisher, PublishError, SecretClient,
};
use managed_resource_runtime::controller::reconciler::{Reconciler, ReconcilerBuilder};
use managed_resource_runtime::constants::DEFAULT_FINALIZER;
use managed_resource_runtime::crd::{self, Managed, ResourceSpec, ResourceStatus};
use managed_resource_runtime::external::{
    ExternalClient, ExternalConnector, ExternalCreation, ExternalDelete, ExternalObservation,
    ExternalUpdate,
};
use managed_resource_runtime::meta;
use managed_resource_runtime::observability::changelog::{ChangeLogEntry, ChangeLogger};
use managed_resource_runtime::observability::events::{EventRecorder, ManagedEvent};
use managed_resource_runtime::observability::metrics::MetricRecorder;
use managed_resource_runtime::store::{ObjectKey, ObjectStore, StoreError};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const NAMESPACE: &str = "default";
pub const NAME: &str = "bucket";
pub const UID: &str = "0b6a4c2e-1111-2222-3333-444455556666";

#[derive(CustomResource, Debug, Clone, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "storage.example.org",
    version = "v1alpha1",
    kind = "Bucket",
    namespaced,
    status = "BucketStatus"
)]
#[serde(rename_all = "camelCase")]
pub struct BucketSpec {
    #[serde(flatten)]
    pub resource: ResourceSpec,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
pub struct BucketStatus {
    #[serde(flatten)]
    pub resource: ResourceStatus,
}

impl Managed for Bucket {
    fn resource_spec(&self) -> &ResourceSpec {
        &self.spec.resource
    }

    fn resource_status(&self) -> Option<&ResourceStatus> {
        self.status.as_ref().map(|s| &s.resource)
    }

    fn resource_status_mut(&mut self) -> &mut ResourceStatus {
        &mut self.status.get_or_insert_with(BucketStatus::default).resource
    }
}

pub fn key() -> ObjectKey {
    ObjectKey::new(Some(NAMESPACE), NAME)
}

/// A stored-looking bucket: namespace, UID, generation and resourceVersion set
pub fn bucket() -> Bucket {
    let mut b = Bucket::new(NAME, BucketSpec::default());
    b.meta_mut().namespace = Some(NAMESPACE.to_string());
    b.meta_mut().uid = Some(UID.to_string());
    b.meta_mut().generation = Some(1);
    b.meta_mut().resource_version = Some("1".to_string());
    b
}

/// A bucket that has been reconciled before: external name and finalizer set
pub fn adopted_bucket() -> Bucket {
    let mut b = bucket();
    meta::set_external_name(&mut b, NAME);
    meta::add_finalizer(&mut b, DEFAULT_FINALIZER);
    b
}

/// Mark a bucket as being deleted
pub fn mark_deleted(b: &mut Bucket) {
    let now = serde_json::Value::String(chrono::Utc::now().to_rfc3339());
    b.meta_mut().deletion_timestamp =
        Some(serde_json::from_value::<Time>(now).expect("valid RFC 3339 timestamp"));
}

/// Failure injected into the next matching store call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fault {
    NotFound,
    Conflict,
}

impl Fault {
    fn into_error(self, key: &ObjectKey) -> StoreError {
        match self {
            Fault::NotFound => StoreError::NotFound(key.to_string()),
            Fault::Conflict => StoreError::Conflict(key.to_string()),
        }
    }
}

/// In-memory object store with API server-like semantics:
/// resourceVersion preconditions, status only written through `update_status`,
/// and deleted objects vanishing once their last finalizer is removed
#[derive(Debug, Default)]
pub struct InMemoryStore {
    objects: Mutex<HashMap<ObjectKey, Bucket>>,
    get_faults: Mutex<VecDeque<Fault>>,
    /// Keyed by 1-based update call number
    update_faults: Mutex<HashMap<usize, Fault>>,
    status_faults: Mutex<VecDeque<Fault>>,
    pub get_calls: AtomicUsize,
    pub update_calls: AtomicUsize,
    pub status_calls: AtomicUsize,
}

impl InMemoryStore {
    pub fn with(obj: Bucket) -> Self {
        let store = Self::default();
        store.put(obj);
        store
    }

    pub fn put(&self, obj: Bucket) {
        self.objects
            .lock()
            .unwrap()
            .insert(ObjectKey::from_resource(&obj), obj);
    }

    pub fn current(&self) -> Option<Bucket> {
        self.objects.lock().unwrap().get(&key()).cloned()
    }

    pub fn fail_get(&self, fault: Fault) {
        self.get_faults.lock().unwrap().push_back(fault);
    }

    /// Fail the `n`th update call from now on (1-based)
    pub fn fail_update(&self, n: usize, fault: Fault) {
        let at = self.updates() + n;
        self.update_faults.lock().unwrap().insert(at, fault);
    }

    pub fn fail_status(&self, fault: Fault) {
        self.status_faults.lock().unwrap().push_back(fault);
    }

    pub fn updates(&self) -> usize {
        self.update_calls.load(Ordering::SeqCst)
    }

    pub fn status_updates(&self) -> usize {
        self.status_calls.load(Ordering::SeqCst)
    }

    fn bump(obj: &mut Bucket) {
        let rv: u64 = obj
            .resource_version()
            .and_then(|v| v.parse().ok())
            .unwrap_or(0);
        obj.meta_mut().resource_version = Some((rv + 1).to_string());
    }

    fn check_version(stored: &Bucket, obj: &Bucket, key: &ObjectKey) -> Result<(), StoreError> {
        if stored.resource_version() != obj.resource_version() {
            return Err(StoreError::Conflict(key.to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl ObjectStore<Bucket> for InMemoryStore {
    async fn get(&self, key: &ObjectKey) -> Result<Bucket, StoreError> {
        self.get_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(fault) = self.get_faults.lock().unwrap().pop_front() {
            return Err(fault.into_error(key));
        }
        self.objects
            .lock()
            .unwrap()
            .get(key)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(key.to_string()))
    }

    async fn update(&self, obj: &Bucket) -> Result<Bucket, StoreError> {
        let call = self.update_calls.fetch_add(1, Ordering::SeqCst) + 1;
        let key = ObjectKey::from_resource(obj);
        if let Some(fault) = self.update_faults.lock().unwrap().remove(&call) {
            return Err(fault.into_error(&key));
        }

        let mut objects = self.objects.lock().unwrap();
        let stored = objects
            .get(&key)
            .ok_or_else(|| StoreError::NotFound(key.to_string()))?;
        Self::check_version(stored, obj, &key)?;

        let mut next = obj.clone();
        next.status = stored.status.clone();
        Self::bump(&mut next);

        if next.meta().deletion_timestamp.is_some() && next.finalizers().is_empty() {
            objects.remove(&key);
        } else {
            objects.insert(key, next.clone());
        }
        Ok(next)
    }

    async fn update_status(&self, obj: &Bucket) -> Result<Bucket, StoreError> {
        self.status_calls.fetch_add(1, Ordering::SeqCst);
        let key = ObjectKey::from_resource(obj);
        if let Some(fault) = self.status_faults.lock().unwrap().pop_front() {
            return Err(fault.into_error(&key));
        }

        let mut objects = self.objects.lock().unwrap();
        let stored = objects
            .get_mut(&key)
            .ok_or_else(|| StoreError::NotFound(key.to_string()))?;
        Self::check_version(stored, obj, &key)?;

        stored.status = obj.status.clone();
        Self::bump(stored);
        Ok(stored.clone())
    }
}

/// Scripted external system shared by the connector and its clients
#[derive(Debug, Default)]
pub struct FakeExternal {
    pub observation: Mutex<ExternalObservation>,
    pub connect_error: Mutex<Option<String>>,
    pub observe_error: Mutex<Option<String>>,
    pub create_error: Mutex<Option<String>>,
    pub update_error: Mutex<Option<String>>,
    pub delete_error: Mutex<Option<String>>,
    pub disconnect_error: Mutex<Option<String>>,
    /// Region filled in by observe when the observation reports late initialization
    pub late_init_region: Mutex<Option<String>>,
    pub observe_delay: Mutex<Option<Duration>>,
    pub create_details: Mutex<ConnectionDetails>,
    pub connect_calls: AtomicUsize,
    pub observe_calls: AtomicUsize,
    pub create_calls: AtomicUsize,
    pub update_calls: AtomicUsize,
    pub delete_calls: AtomicUsize,
    pub disconnect_calls: AtomicUsize,
}

impl FakeExternal {
    pub fn observe(&self, observation: ExternalObservation) {
        *self.observation.lock().unwrap() = observation;
    }

    pub fn exists_up_to_date(&self) {
        self.observe(ExternalObservation {
            resource_exists: true,
            resource_up_to_date: true,
            ..Default::default()
        });
    }

    pub fn creates(&self) -> usize {
        self.create_calls.load(Ordering::SeqCst)
    }

    pub fn updates(&self) -> usize {
        self.update_calls.load(Ordering::SeqCst)
    }

    pub fn deletes(&self) -> usize {
        self.delete_calls.load(Ordering::SeqCst)
    }

    pub fn observes(&self) -> usize {
        self.observe_calls.load(Ordering::SeqCst)
    }

    pub fn connects(&self) -> usize {
        self.connect_calls.load(Ordering::SeqCst)
    }

    pub fn disconnects(&self) -> usize {
        self.disconnect_calls.load(Ordering::SeqCst)
    }
}

fn scripted(err: &Mutex<Option<String>>) -> anyhow::Result<()> {
    match err.lock().unwrap().clone() {
        Some(msg) => Err(anyhow::anyhow!(msg)),
        None => Ok(()),
    }
}

#[derive(Debug, Clone)]
pub struct FakeConnector(pub Arc<FakeExternal>);

#[async_trait]
impl ExternalConnector<Bucket> for FakeConnector {
    async fn connect(&self, _obj: &Bucket) -> anyhow::Result<Box<dyn ExternalClient<Bucket>>> {
        self.0.connect_calls.fetch_add(1, Ordering::SeqCst);
        scripted(&self.0.connect_error)?;
        Ok(Box::new(FakeClient(Arc::clone(&self.0))))
    }
}

#[derive(Debug)]
pub struct FakeClient(Arc<FakeExternal>);

#[async_trait]
impl ExternalClient<Bucket> for FakeClient {
    async fn observe(&self, obj: &mut Bucket) -> anyhow::Result<ExternalObservation> {
        self.0.observe_calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.0.observe_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        scripted(&self.0.observe_error)?;

        let observation = self.0.observation.lock().unwrap().clone();
        if observation.resource_late_initialized {
            obj.spec.region = self.0.late_init_region.lock().unwrap().clone();
        }
        if observation.resource_exists && observation.resource_up_to_date {
            obj.set_conditions([crd::available()]);
        }
        Ok(observation)
    }

    async fn create(&self, _obj: &mut Bucket) -> anyhow::Result<ExternalCreation> {
        self.0.create_calls.fetch_add(1, Ordering::SeqCst);
        scripted(&self.0.create_error)?;
        Ok(ExternalCreation {
            connection_details: self.0.create_details.lock().unwrap().clone(),
        })
    }

    async fn update(&self, _obj: &mut Bucket) -> anyhow::Result<ExternalUpdate> {
        self.0.update_calls.fetch_add(1, Ordering::SeqCst);
        scripted(&self.0.update_error)?;
        Ok(ExternalUpdate::default())
    }

    async fn delete(&self, _obj: &mut Bucket) -> anyhow::Result<ExternalDelete> {
        self.0.delete_calls.fetch_add(1, Ordering::SeqCst);
        scripted(&self.0.delete_error)?;
        Ok(ExternalDelete)
    }

    async fn disconnect(&self) -> anyhow::Result<()> {
        self.0.disconnect_calls.fetch_add(1, Ordering::SeqCst);
        scripted(&self.0.disconnect_error)
    }
}

/// Secret API kept in a map keyed by namespace and name
#[derive(Debug, Default)]
pub struct InMemorySecrets {
    pub secrets: Mutex<HashMap<(String, String), Secret>>,
    pub writes: AtomicUsize,
}

impl InMemorySecrets {
    pub fn get_data(&self, namespace: &str, name: &str) -> Option<HashMap<String, Vec<u8>>> {
        self.secrets
            .lock()
            .unwrap()
            .get(&(namespace.to_string(), name.to_string()))
            .map(|s| {
                s.data
                    .clone()
                    .unwrap_or_default()
                    .into_iter()
                    .map(|(k, v)| (k, v.0))
                    .collect()
            })
    }

    fn key_of(secret: &Secret) -> (String, String) {
        (secret.namespace().unwrap_or_default(), secret.name_any())
    }
}

#[async_trait]
impl SecretClient for InMemorySecrets {
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<Secret>, kube::Error> {
        Ok(self
            .secrets
            .lock()
            .unwrap()
            .get(&(namespace.to_string(), name.to_string()))
            .cloned())
    }

    async fn create(&self, secret: &Secret) -> Result<Secret, kube::Error> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.secrets
            .lock()
            .unwrap()
            .insert(Self::key_of(secret), secret.clone());
        Ok(secret.clone())
    }

    async fn replace(&self, secret: &Secret) -> Result<Secret, kube::Error> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.secrets
            .lock()
            .unwrap()
            .insert(Self::key_of(secret), secret.clone());
        Ok(secret.clone())
    }
}

#[derive(Debug, Default)]
pub struct RecordingEvents {
    pub events: Mutex<Vec<ManagedEvent>>,
}

impl RecordingEvents {
    pub fn reasons(&self) -> Vec<String> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .map(|e| e.reason.clone())
            .collect()
    }
}

#[async_trait]
impl EventRecorder for RecordingEvents {
    async fn record(&self, _reference: &ObjectReference, event: ManagedEvent) {
        self.events.lock().unwrap().push(event);
    }
}

/// Publisher that remembers what it was asked to publish and unpublish
#[derive(Debug, Default)]
pub struct RecordingPublisher {
    pub published: Mutex<Vec<ConnectionDetails>>,
    pub unpublished: Mutex<Vec<ConnectionDetails>>,
}

#[async_trait]
impl ConnectionPublisher<Bucket> for RecordingPublisher {
    async fn publish_connection(
        &self,
        _owner: &Bucket,
        details: &ConnectionDetails,
    ) -> Result<bool, PublishError> {
        self.published.lock().unwrap().push(details.clone());
        Ok(!details.is_empty())
    }

    async fn unpublish_connection(
        &self,
        _owner: &Bucket,
        details: &ConnectionDetails,
    ) -> Result<(), PublishError> {
        self.unpublished.lock().unwrap().push(details.clone());
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct RecordingChangeLog {
    pub entries: Mutex<Vec<ChangeLogEntry>>,
}

#[async_trait]
impl ChangeLogger for RecordingChangeLog {
    async fn log(&self, entry: &ChangeLogEntry) -> anyhow::Result<()> {
        self.entries.lock().unwrap().push(entry.clone());
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct RecordingMetrics {
    pub outcomes: Mutex<Vec<String>>,
    pub first_time_ready: AtomicUsize,
    pub drift: AtomicUsize,
}

impl MetricRecorder for RecordingMetrics {
    fn record_reconcile(&self, outcome: &str, _duration: Duration) {
        self.outcomes.lock().unwrap().push(outcome.to_string());
    }

    fn record_external_operation(&self, _operation: &str, _ok: bool) {}

    fn record_first_time_ready(&self) {
        self.first_time_ready.fetch_add(1, Ordering::SeqCst);
    }

    fn record_drift(&self) {
        self.drift.fetch_add(1, Ordering::SeqCst);
    }
}

/// A reconciler wired to in-memory collaborators
pub struct Harness {
    pub store: Arc<InMemoryStore>,
    pub external: Arc<FakeExternal>,
    pub events: Arc<RecordingEvents>,
    pub changes: Arc<RecordingChangeLog>,
    pub metrics: Arc<RecordingMetrics>,
    pub reconciler: Reconciler<Bucket>,
}

impl Harness {
    pub fn new(obj: Bucket) -> Self {
        Self::with(obj, ReconcilerConfig::default(), |b| b)
    }

    pub fn with(
        obj: Bucket,
        config: ReconcilerConfig,
        customize: impl FnOnce(ReconcilerBuilder<Bucket>) -> ReconcilerBuilder<Bucket>,
    ) -> Self {
        let store = Arc::new(InMemoryStore::with(obj));
        let external = Arc::new(FakeExternal::default());
        let events = Arc::new(RecordingEvents::default());
        let changes = Arc::new(RecordingChangeLog::default());
        let metrics = Arc::new(RecordingMetrics::default());

        let builder = Reconciler::builder(
            Arc::clone(&store) as Arc<dyn ObjectStore<Bucket>>,
            Arc::new(FakeConnector(Arc::clone(&external))),
        )
        .config(config)
        .event_recorder(Arc::clone(&events) as Arc<dyn EventRecorder>)
        .change_logger(Arc::clone(&changes) as Arc<dyn ChangeLogger>)
        .metrics(Arc::clone(&metrics) as Arc<dyn MetricRecorder>);

        Self {
            reconciler: customize(builder).build(),
            store,
            external,
            events,
            changes,
            metrics,
        }
    }

    pub fn stored(&self) -> Bucket {
        self.store.current().expect("bucket should still be stored")
    }

    pub fn condition(&self, kind: &str) -> Option<crd::Condition> {
        self.stored().get_condition(kind).cloned()
    }

    pub fn synced_reason(&self) -> Option<String> {
        self.condition(crd::TYPE_SYNCED).and_then(|c| c.reason)
    }

    pub fn ready_reason(&self) -> Option<String> {
        self.condition(crd::TYPE_READY).and_then(|c| c.reason)
    }
}
