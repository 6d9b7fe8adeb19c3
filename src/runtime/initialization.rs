//! # Initialization
//!
//! Process bootstrap for a controller built on this crate: rustls setup,
//! tracing, metrics, the probes server and the Kubernetes client.

use crate::config::ReconcilerConfig;
use crate::connection::{ConnectionPublisher, KubeSecretClient, SecretClient, SecretPublisher};
use crate::controller::reconciler::{Reconciler, ReconcilerBuilder};
use crate::crd::Managed;
use crate::external::ExternalConnector;
use crate::gate::Gate;
use crate::observability::events::KubeEventRecorder;
use crate::observability::server::{start_server, ServerState};
use crate::observability::{self, PrometheusMetrics, TracingChangeLogger};
use crate::runtime::watch_loop::run_controller;
use crate::store::{KubeStore, ObjectStore};
use anyhow::{Context, Result};
use kube::{Api, Client};
use std::sync::Arc;
use tracing::{debug, error, info};

const READY_METRICS: &str = "metrics";
const READY_CLIENT: &str = "kube-client";

/// Install ring as the rustls crypto provider.
///
/// Required for rustls 0.23+ when no default provider is selected via
/// features. Must run before any TLS connection is made.
pub fn install_crypto_provider() {
    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        debug!("rustls crypto provider already installed");
    }
}

/// A reconciler builder wired to the Kubernetes API: object store,
/// connection Secrets, events, Prometheus metrics and a tracing change log
pub fn kube_reconciler<T: Managed>(
    client: Client,
    connector: Arc<dyn ExternalConnector<T>>,
    config: ReconcilerConfig,
) -> ReconcilerBuilder<T> {
    let store: Arc<dyn ObjectStore<T>> = Arc::new(KubeStore::new(client.clone()));
    let secrets: Arc<dyn SecretClient> = Arc::new(KubeSecretClient::new(client.clone()));
    let publisher: Arc<dyn ConnectionPublisher<T>> = Arc::new(SecretPublisher::new(secrets));

    Reconciler::builder(store, connector)
        .config(config)
        .connection_publisher(publisher)
        .event_recorder(Arc::new(KubeEventRecorder::new(client)))
        .metrics(Arc::new(PrometheusMetrics))
        .change_logger(Arc::new(TracingChangeLogger))
}

/// Run a controller for `T` until a shutdown signal is received.
///
/// `customize` can add poll interval hooks, a reference resolver or replace
/// any default collaborator before the reconciler is built.
///
/// # Errors
///
/// Returns an error if tracing, metrics or the Kubernetes client can't be
/// initialized.
pub async fn run<T: Managed>(
    connector: Arc<dyn ExternalConnector<T>>,
    config: ReconcilerConfig,
    customize: impl FnOnce(ReconcilerBuilder<T>) -> ReconcilerBuilder<T>,
) -> Result<()> {
    install_crypto_provider();
    observability::logging::init_tracing(&config)?;

    info!("Starting managed resource controller for {}", T::kind(&()));

    let server_state = Arc::new(ServerState::default());
    let gate = Gate::new();
    {
        let state = Arc::clone(&server_state);
        gate.register([READY_METRICS, READY_CLIENT], move || {
            state.set_ready(true);
            info!("✅ Controller ready");
        });
    }

    observability::metrics::register_metrics()?;
    gate.set(READY_METRICS, true);

    let port = config.metrics_port;
    let state = Arc::clone(&server_state);
    tokio::spawn(async move {
        if let Err(e) = start_server(port, state).await {
            error!("HTTP server failed: {}", e);
        }
    });

    let client = Client::try_default()
        .await
        .context("Failed to create Kubernetes client")?;
    gate.set(READY_CLIENT, true);

    // Stop reporting ready as soon as shutdown starts
    let shutdown_state = Arc::clone(&server_state);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received shutdown signal, waiting for in-flight reconciles to complete...");
            shutdown_state.set_ready(false);
        }
    });

    let reconciler = customize(kube_reconciler(client.clone(), connector, config)).build();
    run_controller(Api::<T>::all(client), reconciler).await
}
