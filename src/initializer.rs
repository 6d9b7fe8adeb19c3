//! # Initializers
//!
//! Pre-flight steps run against the managed resource before the external
//! system is touched. They run in order and the first failure aborts the chain.

use crate::crd::Managed;
use crate::meta;
use crate::store::ObjectStore;
use anyhow::{Context, Result};
use async_trait::async_trait;
use kube::ResourceExt;
use std::sync::Arc;
use tracing::debug;

#[async_trait]
pub trait Initializer<T>: Send + Sync {
    async fn initialize(&self, obj: &mut T) -> Result<()>;
}

/// Runs initializers serially
pub struct InitializerChain<T> {
    initializers: Vec<Arc<dyn Initializer<T>>>,
}

impl<T> std::fmt::Debug for InitializerChain<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InitializerChain")
            .field("initializers", &self.initializers.len())
            .finish()
    }
}

impl<T> InitializerChain<T> {
    pub fn new(initializers: Vec<Arc<dyn Initializer<T>>>) -> Self {
        Self { initializers }
    }
}

#[async_trait]
impl<T: Send + Sync> Initializer<T> for InitializerChain<T> {
    async fn initialize(&self, obj: &mut T) -> Result<()> {
        for i in &self.initializers {
            i.initialize(obj).await?;
        }
        Ok(())
    }
}

/// Defaults the external name annotation to the object's name.
///
/// Gives the external resource a stable identifier before it is created.
pub struct NameAsExternalName<T> {
    store: Arc<dyn ObjectStore<T>>,
}

impl<T> std::fmt::Debug for NameAsExternalName<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NameAsExternalName").finish_non_exhaustive()
    }
}

impl<T> NameAsExternalName<T> {
    pub fn new(store: Arc<dyn ObjectStore<T>>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl<T: Managed> Initializer<T> for NameAsExternalName<T> {
    async fn initialize(&self, obj: &mut T) -> Result<()> {
        if meta::external_name(obj).is_some() {
            return Ok(());
        }
        let name = obj.name_any();
        meta::set_external_name(obj, &name);
        *obj = self
            .store
            .update(obj)
            .await
            .context("cannot persist external name")?;
        debug!("Defaulted external name to {}", name);
        Ok(())
    }
}
