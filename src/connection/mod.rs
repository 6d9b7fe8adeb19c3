//! # Connection Details
//!
//! Publishes connection details (credentials, endpoints) produced by the
//! external client to a durable store.
//!
//! - [`ConnectionPublisher`]: the trait the reconciler calls
//! - [`PublisherChain`]: runs publishers in order, stopping at the first error
//! - [`SecretPublisher`]: writes a Kubernetes `Secret` owned by the managed resource

pub mod secret;

pub use secret::{KubeSecretClient, SecretClient, SecretPublisher};

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;

/// Credential/endpoint bytes keyed by name
pub type ConnectionDetails = BTreeMap<String, Vec<u8>>;

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("secret {0} exists and is not controlled by {1}")]
    NotControlled(String, String),

    #[error("managed resource has no UID; cannot set owner reference")]
    MissingUid,

    #[error("secret namespace {secret} differs from owner namespace {owner}")]
    CrossNamespace { secret: String, owner: String },

    #[error("Kubernetes API error: {0}")]
    Api(#[from] kube::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

#[async_trait]
pub trait ConnectionPublisher<T>: Send + Sync {
    /// Publish details; returns true if anything was written
    async fn publish_connection(
        &self,
        owner: &T,
        details: &ConnectionDetails,
    ) -> Result<bool, PublishError>;

    /// Best-effort removal of previously published details
    async fn unpublish_connection(
        &self,
        owner: &T,
        details: &ConnectionDetails,
    ) -> Result<(), PublishError>;
}

/// Publisher that does nothing
#[derive(Debug, Clone, Copy, Default)]
pub struct NopPublisher;

#[async_trait]
impl<T: Send + Sync> ConnectionPublisher<T> for NopPublisher {
    async fn publish_connection(
        &self,
        _owner: &T,
        _details: &ConnectionDetails,
    ) -> Result<bool, PublishError> {
        Ok(false)
    }

    async fn unpublish_connection(
        &self,
        _owner: &T,
        _details: &ConnectionDetails,
    ) -> Result<(), PublishError> {
        Ok(())
    }
}

/// Ordered list of publishers.
///
/// A failure part way through leaves earlier publishers applied; the next
/// reconcile publishes again, and publishing is idempotent.
pub struct PublisherChain<T> {
    publishers: Vec<Arc<dyn ConnectionPublisher<T>>>,
}

impl<T> std::fmt::Debug for PublisherChain<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PublisherChain")
            .field("publishers", &self.publishers.len())
            .finish()
    }
}

impl<T> PublisherChain<T> {
    pub fn new(publishers: Vec<Arc<dyn ConnectionPublisher<T>>>) -> Self {
        Self { publishers }
    }
}

#[async_trait]
impl<T: Send + Sync> ConnectionPublisher<T> for PublisherChain<T> {
    async fn publish_connection(
        &self,
        owner: &T,
        details: &ConnectionDetails,
    ) -> Result<bool, PublishError> {
        let mut published = false;
        for p in &self.publishers {
            published |= p.publish_connection(owner, details).await?;
        }
        Ok(published)
    }

    async fn unpublish_connection(
        &self,
        owner: &T,
        details: &ConnectionDetails,
    ) -> Result<(), PublishError> {
        for p in &self.publishers {
            p.unpublish_connection(owner, details).await?;
        }
        Ok(())
    }
}
