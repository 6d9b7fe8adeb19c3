//! # Events
//!
//! Kubernetes events emitted on reconcile transitions. Publishing failures are
//! logged and dropped.

use crate::constants::CONTROLLER_NAME;
use async_trait::async_trait;
use k8s_openapi::api::core::v1::ObjectReference;
use kube::runtime::events::{Event, EventType, Recorder, Reporter};
use kube::Client;
use tracing::warn;

pub const REASON_CANNOT_CONNECT: &str = "CannotConnectToProvider";
pub const REASON_CANNOT_OBSERVE: &str = "CannotObserveExternalResource";
pub const REASON_CANNOT_CREATE: &str = "CannotCreateExternalResource";
pub const REASON_CANNOT_UPDATE: &str = "CannotUpdateExternalResource";
pub const REASON_CANNOT_DELETE: &str = "CannotDeleteExternalResource";
pub const REASON_CANNOT_PUBLISH: &str = "CannotPublishConnectionDetails";
pub const REASON_CANNOT_UNPUBLISH: &str = "CannotUnpublishConnectionDetails";
pub const REASON_CANNOT_INITIALIZE: &str = "CannotInitializeManagedResource";
pub const REASON_CANNOT_RESOLVE_REFS: &str = "CannotResolveResourceReferences";
pub const REASON_CANNOT_ADD_FINALIZER: &str = "CannotAddFinalizer";
pub const REASON_CANNOT_REMOVE_FINALIZER: &str = "CannotRemoveFinalizer";
pub const REASON_CANNOT_RECORD_CREATE: &str = "CannotRecordCreateResult";
pub const REASON_CANNOT_UPDATE_MANAGED: &str = "CannotUpdateManagedResource";
pub const REASON_INVALID_POLICY: &str = "InvalidManagementPolicy";
pub const REASON_CREATED: &str = "CreatedExternalResource";
pub const REASON_UPDATED: &str = "UpdatedExternalResource";
pub const REASON_DELETED: &str = "DeletedExternalResource";
pub const REASON_PAUSED: &str = "ReconciliationPaused";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Normal,
    Warning,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManagedEvent {
    pub kind: EventKind,
    pub reason: String,
    pub message: String,
}

impl ManagedEvent {
    pub fn normal(reason: &str, message: impl Into<String>) -> Self {
        Self {
            kind: EventKind::Normal,
            reason: reason.to_string(),
            message: message.into(),
        }
    }

    pub fn warning(reason: &str, err: &dyn std::fmt::Display) -> Self {
        Self {
            kind: EventKind::Warning,
            reason: reason.to_string(),
            message: err.to_string(),
        }
    }
}

#[async_trait]
pub trait EventRecorder: Send + Sync {
    async fn record(&self, reference: &ObjectReference, event: ManagedEvent);
}

/// [`EventRecorder`] publishing `events.k8s.io/v1` events
#[derive(Clone)]
pub struct KubeEventRecorder {
    recorder: Recorder,
}

impl std::fmt::Debug for KubeEventRecorder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeEventRecorder").finish_non_exhaustive()
    }
}

impl KubeEventRecorder {
    pub fn new(client: Client) -> Self {
        let reporter = Reporter {
            controller: CONTROLLER_NAME.to_string(),
            instance: std::env::var("POD_NAME").ok(),
        };
        Self {
            recorder: Recorder::new(client, reporter),
        }
    }
}

#[async_trait]
impl EventRecorder for KubeEventRecorder {
    async fn record(&self, reference: &ObjectReference, event: ManagedEvent) {
        let type_ = match event.kind {
            EventKind::Normal => EventType::Normal,
            EventKind::Warning => EventType::Warning,
        };
        let ev = Event {
            type_,
            reason: event.reason.clone(),
            note: Some(event.message),
            action: "Reconcile".to_string(),
            secondary: None,
        };
        if let Err(e) = self.recorder.publish(&ev, reference).await {
            warn!("Failed to publish event {}: {}", event.reason, e);
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NopEventRecorder;

#[async_trait]
impl EventRecorder for NopEventRecorder {
    async fn record(&self, _reference: &ObjectReference, _event: ManagedEvent) {}
}
