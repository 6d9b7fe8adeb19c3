//! # Object Store
//!
//! The cluster object store the reconciler reads and writes managed resources
//! through. [`KubeStore`] is backed by `kube::Api`; tests supply in-memory
//! implementations.
//!
//! Writes are optimistic: the object's `resourceVersion` is sent with every
//! update and a stale version surfaces as [`StoreError::Conflict`].

use crate::constants::CONTROLLER_NAME;
use async_trait::async_trait;
use kube::api::{Patch, PatchParams, PostParams};
use kube::{Api, Client, Resource, ResourceExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt::{self, Debug};
use std::marker::PhantomData;
use thiserror::Error;

/// Namespace and name of a managed resource
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectKey {
    pub namespace: Option<String>,
    pub name: String,
}

impl ObjectKey {
    pub fn new(namespace: Option<&str>, name: &str) -> Self {
        Self {
            namespace: namespace.map(str::to_string),
            name: name.to_string(),
        }
    }

    pub fn from_resource<K: Resource>(obj: &K) -> Self {
        Self {
            namespace: obj.namespace(),
            name: obj.name_any(),
        }
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.namespace {
            Some(ns) => write!(f, "{}/{}", ns, self.name),
            None => f.write_str(&self.name),
        }
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("object not found: {0}")]
    NotFound(String),

    #[error("conflict writing {0}: object has been modified")]
    Conflict(String),

    #[error("Kubernetes API error: {0}")]
    Api(#[from] kube::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound(_))
    }

    #[must_use]
    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict(_))
    }

    fn from_kube(err: kube::Error, key: &str) -> Self {
        match &err {
            kube::Error::Api(resp) if resp.code == 404 => StoreError::NotFound(key.to_string()),
            kube::Error::Api(resp) if resp.code == 409 => StoreError::Conflict(key.to_string()),
            _ => StoreError::Api(err),
        }
    }
}

/// Get, update and status-update for objects of one kind
#[async_trait]
pub trait ObjectStore<K>: Send + Sync {
    async fn get(&self, key: &ObjectKey) -> Result<K, StoreError>;

    /// Replace the object (metadata and spec). Returns the stored object.
    async fn update(&self, obj: &K) -> Result<K, StoreError>;

    /// Write the status subresource. Returns the stored object.
    async fn update_status(&self, obj: &K) -> Result<K, StoreError>;
}

/// [`ObjectStore`] backed by the Kubernetes API
pub struct KubeStore<K> {
    client: Client,
    _kind: PhantomData<fn() -> K>,
}

impl<K> Debug for KubeStore<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KubeStore").finish_non_exhaustive()
    }
}

impl<K> Clone for KubeStore<K> {
    fn clone(&self) -> Self {
        Self {
            client: self.client.clone(),
            _kind: PhantomData,
        }
    }
}

impl<K> KubeStore<K>
where
    K: Resource<DynamicType = ()>,
{
    pub fn new(client: Client) -> Self {
        Self {
            client,
            _kind: PhantomData,
        }
    }

    fn api(&self, namespace: Option<&str>) -> Api<K> {
        match namespace {
            Some(ns) => Api::namespaced_with(self.client.clone(), ns, &()),
            None => Api::all_with(self.client.clone(), &()),
        }
    }
}

#[async_trait]
impl<K> ObjectStore<K> for KubeStore<K>
where
    K: Resource<DynamicType = ()> + Clone + Debug + Serialize + DeserializeOwned + Send + Sync + 'static,
{
    async fn get(&self, key: &ObjectKey) -> Result<K, StoreError> {
        self.api(key.namespace.as_deref())
            .get(&key.name)
            .await
            .map_err(|e| StoreError::from_kube(e, &key.to_string()))
    }

    async fn update(&self, obj: &K) -> Result<K, StoreError> {
        let key = ObjectKey::from_resource(obj);
        self.api(key.namespace.as_deref())
            .replace(&key.name, &PostParams::default(), obj)
            .await
            .map_err(|e| StoreError::from_kube(e, &key.to_string()))
    }

    async fn update_status(&self, obj: &K) -> Result<K, StoreError> {
        let key = ObjectKey::from_resource(obj);
        let value = serde_json::to_value(obj)?;

        // resourceVersion in a merge patch acts as a precondition
        let patch = serde_json::json!({
            "metadata": { "resourceVersion": obj.resource_version() },
            "status": value.get("status").cloned().unwrap_or(serde_json::Value::Null),
        });

        self.api(key.namespace.as_deref())
            .patch_status(
                &key.name,
                &PatchParams::apply(CONTROLLER_NAME),
                &Patch::Merge(patch),
            )
            .await
            .map_err(|e| StoreError::from_kube(e, &key.to_string()))
    }
}
