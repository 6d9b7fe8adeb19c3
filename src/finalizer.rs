//! # Finalizer
//!
//! Keeps a managed resource in the API server until its external resource has
//! been cleaned up.

use crate::crd::Managed;
use crate::meta;
use crate::store::{ObjectStore, StoreError};
use async_trait::async_trait;
use std::sync::Arc;

#[async_trait]
pub trait Finalizer<T>: Send + Sync {
    async fn add_finalizer(&self, obj: &mut T) -> Result<(), StoreError>;

    async fn remove_finalizer(&self, obj: &mut T) -> Result<(), StoreError>;
}

/// Adds and removes a finalizer through the object store.
///
/// Both calls only write when the finalizer list actually changes, and
/// removal succeeds when the object is already gone.
pub struct ApiFinalizer<T> {
    store: Arc<dyn ObjectStore<T>>,
    finalizer: String,
}

impl<T> std::fmt::Debug for ApiFinalizer<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiFinalizer")
            .field("finalizer", &self.finalizer)
            .finish_non_exhaustive()
    }
}

impl<T> ApiFinalizer<T> {
    pub fn new(store: Arc<dyn ObjectStore<T>>, finalizer: impl Into<String>) -> Self {
        Self {
            store,
            finalizer: finalizer.into(),
        }
    }
}

#[async_trait]
impl<T: Managed> Finalizer<T> for ApiFinalizer<T> {
    async fn add_finalizer(&self, obj: &mut T) -> Result<(), StoreError> {
        if !meta::add_finalizer(obj, &self.finalizer) {
            return Ok(());
        }
        *obj = self.store.update(obj).await?;
        Ok(())
    }

    async fn remove_finalizer(&self, obj: &mut T) -> Result<(), StoreError> {
        if !meta::remove_finalizer(obj, &self.finalizer) {
            return Ok(());
        }
        match self.store.update(obj).await {
            Ok(updated) => {
                *obj = updated;
                Ok(())
            }
            Err(e) if e.is_not_found() => Ok(()),
            Err(e) => Err(e),
        }
    }
}

/// Finalizer that does nothing
#[derive(Debug, Clone, Copy, Default)]
pub struct NopFinalizer;

#[async_trait]
impl<T: Send + Sync> Finalizer<T> for NopFinalizer {
    async fn add_finalizer(&self, _obj: &mut T) -> Result<(), StoreError> {
        Ok(())
    }

    async fn remove_finalizer(&self, _obj: &mut T) -> Result<(), StoreError> {
        Ok(())
    }
}
