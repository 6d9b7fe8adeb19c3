//! # Reference Resolution
//!
//! Fills in fields of a managed resource that are derived from other objects,
//! e.g. a subnet ID read from a referenced `Subnet` resource.
//!
//! The runtime does not discover references itself. Each concrete resource
//! type supplies a [`Referencer`] that knows its reference-bearing fields, and
//! [`ApiReferenceResolver`] persists the result only when something changed.

use crate::crd::Managed;
use crate::store::{ObjectStore, StoreError};
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum ResolveError {
    /// A referenced object can't be read (yet); the resource is blocked on it
    #[error("referenced resources are not accessible: {0}")]
    NotAccessible(String),

    #[error(transparent)]
    Failed(#[from] anyhow::Error),

    #[error("cannot persist resolved references: {0}")]
    Store(#[from] StoreError),
}

impl ResolveError {
    #[must_use]
    pub fn is_blocked(&self) -> bool {
        matches!(self, ResolveError::NotAccessible(_))
    }
}

/// Resolves the references of one concrete resource type in place
#[async_trait]
pub trait Referencer<T>: Send + Sync {
    async fn resolve(&self, obj: &mut T) -> Result<(), ResolveError>;
}

#[async_trait]
pub trait ReferenceResolver<T>: Send + Sync {
    async fn resolve_references(&self, obj: &mut T) -> Result<(), ResolveError>;
}

/// Resolves references and persists the object if resolution changed it
pub struct ApiReferenceResolver<T> {
    store: Arc<dyn ObjectStore<T>>,
    referencer: Arc<dyn Referencer<T>>,
}

impl<T> std::fmt::Debug for ApiReferenceResolver<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiReferenceResolver").finish_non_exhaustive()
    }
}

impl<T> ApiReferenceResolver<T> {
    pub fn new(store: Arc<dyn ObjectStore<T>>, referencer: Arc<dyn Referencer<T>>) -> Self {
        Self { store, referencer }
    }
}

#[async_trait]
impl<T: Managed> ReferenceResolver<T> for ApiReferenceResolver<T> {
    async fn resolve_references(&self, obj: &mut T) -> Result<(), ResolveError> {
        let before = serde_json::to_value(&*obj).map_err(anyhow::Error::from)?;

        self.referencer.resolve(obj).await?;

        let after = serde_json::to_value(&*obj).map_err(anyhow::Error::from)?;
        if before == after {
            return Ok(());
        }

        *obj = self.store.update(obj).await?;
        debug!("Persisted resolved references");
        Ok(())
    }
}

/// Resolver for resource types without references
#[derive(Debug, Clone, Copy, Default)]
pub struct NopReferenceResolver;

#[async_trait]
impl<T: Send + Sync> ReferenceResolver<T> for NopReferenceResolver {
    async fn resolve_references(&self, _obj: &mut T) -> Result<(), ResolveError> {
        Ok(())
    }
}
