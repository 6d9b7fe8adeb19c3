//! # Types
//!
//! Core types for the reconciler.

use crate::config::ReconcilerConfig;
use crate::connection::{ConnectionPublisher, NopPublisher};
use crate::constants::ERR_GET_MANAGED;
use crate::crd::Managed;
use crate::external::ExternalConnector;
use crate::finalizer::{ApiFinalizer, Finalizer};
use crate::initializer::{Initializer, InitializerChain, NameAsExternalName};
use crate::observability::changelog::{ChangeLogger, NopChangeLogger};
use crate::observability::events::{EventRecorder, NopEventRecorder};
use crate::observability::metrics::{MetricRecorder, NopMetrics};
use crate::reference::{NopReferenceResolver, ReferenceResolver};
use crate::store::{ObjectStore, StoreError};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Adjusts the poll interval for one resource.
///
/// Receives the configured poll interval. When several hooks are registered
/// the last one's output is used.
pub type PollIntervalHook<T> = Arc<dyn Fn(&T, Duration) -> Duration + Send + Sync>;

/// What the runtime should do after a reconcile
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// Nothing to do until the resource changes
    Done,
    /// Reconcile again, governed by the runtime's backoff
    Requeue,
    /// Reconcile again after the given duration
    RequeueAfter(Duration),
}

impl ReconcileOutcome {
    /// Label used for the reconcile metrics
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            ReconcileOutcome::Done => "done",
            ReconcileOutcome::Requeue => "requeue",
            ReconcileOutcome::RequeueAfter(_) => "requeue_after",
        }
    }
}

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("{prefix}: {0}", prefix = ERR_GET_MANAGED)]
    Get(#[source] StoreError),

    #[error("{stage}: {source}")]
    Status {
        stage: &'static str,
        #[source]
        source: StoreError,
    },

    #[error("reconcile did not finish within {0:?}")]
    Timeout(Duration),
}

/// An operational error tagged with the stage it happened in.
///
/// Used for Synced condition messages, events and logs.
#[derive(Debug, Error)]
#[error("{stage}: {error:#}")]
pub struct StageError {
    pub stage: &'static str,
    pub error: anyhow::Error,
}

impl StageError {
    pub fn new(stage: &'static str, error: impl Into<anyhow::Error>) -> Self {
        Self {
            stage,
            error: error.into(),
        }
    }
}

/// Drives one kind of managed resource towards its desired state.
///
/// Stateless between calls; everything that must survive a restart lives in
/// the object's annotations and conditions.
pub struct Reconciler<T> {
    pub(crate) store: Arc<dyn ObjectStore<T>>,
    pub(crate) connector: Arc<dyn ExternalConnector<T>>,
    pub(crate) publisher: Arc<dyn ConnectionPublisher<T>>,
    pub(crate) finalizer: Arc<dyn Finalizer<T>>,
    pub(crate) initializer: Arc<dyn Initializer<T>>,
    pub(crate) resolver: Arc<dyn ReferenceResolver<T>>,
    pub(crate) recorder: Arc<dyn EventRecorder>,
    pub(crate) metrics: Arc<dyn MetricRecorder>,
    pub(crate) changelog: Arc<dyn ChangeLogger>,
    pub(crate) poll_interval_hooks: Vec<PollIntervalHook<T>>,
    pub(crate) config: ReconcilerConfig,
}

impl<T> std::fmt::Debug for Reconciler<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reconciler")
            .field("config", &self.config)
            .field("poll_interval_hooks", &self.poll_interval_hooks.len())
            .finish_non_exhaustive()
    }
}

impl<T: Managed> Reconciler<T> {
    pub fn builder(
        store: Arc<dyn ObjectStore<T>>,
        connector: Arc<dyn ExternalConnector<T>>,
    ) -> ReconcilerBuilder<T> {
        ReconcilerBuilder::new(store, connector)
    }

    pub fn config(&self) -> &ReconcilerConfig {
        &self.config
    }
}

/// Builds a [`Reconciler`].
///
/// Unset collaborators default to:
/// - finalizer: [`ApiFinalizer`] with `config.finalizer_name`
/// - initializer: [`NameAsExternalName`]
/// - publisher, reference resolver, events, metrics, change log: no-ops
pub struct ReconcilerBuilder<T> {
    store: Arc<dyn ObjectStore<T>>,
    connector: Arc<dyn ExternalConnector<T>>,
    publisher: Option<Arc<dyn ConnectionPublisher<T>>>,
    finalizer: Option<Arc<dyn Finalizer<T>>>,
    initializer: Option<Arc<dyn Initializer<T>>>,
    resolver: Option<Arc<dyn ReferenceResolver<T>>>,
    recorder: Option<Arc<dyn EventRecorder>>,
    metrics: Option<Arc<dyn MetricRecorder>>,
    changelog: Option<Arc<dyn ChangeLogger>>,
    poll_interval_hooks: Vec<PollIntervalHook<T>>,
    config: ReconcilerConfig,
}

impl<T> std::fmt::Debug for ReconcilerBuilder<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReconcilerBuilder")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl<T: Managed> ReconcilerBuilder<T> {
    pub fn new(store: Arc<dyn ObjectStore<T>>, connector: Arc<dyn ExternalConnector<T>>) -> Self {
        Self {
            store,
            connector,
            publisher: None,
            finalizer: None,
            initializer: None,
            resolver: None,
            recorder: None,
            metrics: None,
            changelog: None,
            poll_interval_hooks: Vec::new(),
            config: ReconcilerConfig::default(),
        }
    }

    #[must_use]
    pub fn config(mut self, config: ReconcilerConfig) -> Self {
        self.config = config;
        self
    }

    #[must_use]
    pub fn connection_publisher(mut self, publisher: Arc<dyn ConnectionPublisher<T>>) -> Self {
        self.publisher = Some(publisher);
        self
    }

    #[must_use]
    pub fn finalizer(mut self, finalizer: Arc<dyn Finalizer<T>>) -> Self {
        self.finalizer = Some(finalizer);
        self
    }

    /// Replace the default initializers. Use an [`InitializerChain`] to run several.
    #[must_use]
    pub fn initializer(mut self, initializer: Arc<dyn Initializer<T>>) -> Self {
        self.initializer = Some(initializer);
        self
    }

    #[must_use]
    pub fn reference_resolver(mut self, resolver: Arc<dyn ReferenceResolver<T>>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    #[must_use]
    pub fn event_recorder(mut self, recorder: Arc<dyn EventRecorder>) -> Self {
        self.recorder = Some(recorder);
        self
    }

    #[must_use]
    pub fn metrics(mut self, metrics: Arc<dyn MetricRecorder>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    #[must_use]
    pub fn change_logger(mut self, changelog: Arc<dyn ChangeLogger>) -> Self {
        self.changelog = Some(changelog);
        self
    }

    /// Register a poll interval hook. Later hooks take precedence.
    #[must_use]
    pub fn poll_interval_hook(
        mut self,
        hook: impl Fn(&T, Duration) -> Duration + Send + Sync + 'static,
    ) -> Self {
        self.poll_interval_hooks.push(Arc::new(hook));
        self
    }

    pub fn build(self) -> Reconciler<T> {
        let finalizer: Arc<dyn Finalizer<T>> = match self.finalizer {
            Some(f) => f,
            None => Arc::new(ApiFinalizer::new(
                Arc::clone(&self.store),
                self.config.finalizer_name.clone(),
            )),
        };
        let initializer: Arc<dyn Initializer<T>> = match self.initializer {
            Some(i) => i,
            None => {
                let external_name: Arc<dyn Initializer<T>> =
                    Arc::new(NameAsExternalName::new(Arc::clone(&self.store)));
                Arc::new(InitializerChain::new(vec![external_name]))
            }
        };
        let publisher: Arc<dyn ConnectionPublisher<T>> = match self.publisher {
            Some(p) => p,
            None => Arc::new(NopPublisher),
        };
        let resolver: Arc<dyn ReferenceResolver<T>> = match self.resolver {
            Some(r) => r,
            None => Arc::new(NopReferenceResolver),
        };
        let recorder: Arc<dyn EventRecorder> = match self.recorder {
            Some(r) => r,
            None => Arc::new(NopEventRecorder),
        };
        let metrics: Arc<dyn MetricRecorder> = match self.metrics {
            Some(m) => m,
            None => Arc::new(NopMetrics),
        };
        let changelog: Arc<dyn ChangeLogger> = match self.changelog {
            Some(c) => c,
            None => Arc::new(NopChangeLogger),
        };

        Reconciler {
            store: self.store,
            connector: self.connector,
            publisher,
            finalizer,
            initializer,
            resolver,
            recorder,
            metrics,
            changelog,
            poll_interval_hooks: self.poll_interval_hooks,
            config: self.config,
        }
    }
}
