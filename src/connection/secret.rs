//! # Secret Publisher
//!
//! Writes connection details into a `Secret` controlled by the managed
//! resource. Publishing merges into the existing data so that details
//! published by earlier calls survive later partial publishes.
//!
//! Unpublishing is a no-op: the Secret carries a controller owner reference
//! and is garbage collected together with the managed resource. Owner
//! references cannot cross namespaces, so a namespaced owner may only publish
//! into its own namespace.

use super::{ConnectionDetails, ConnectionPublisher, PublishError};
use crate::crd::Managed;
use async_trait::async_trait;
use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::ByteString;
use kube::api::{ObjectMeta, PostParams};
use kube::{Api, Client, Resource, ResourceExt};
use std::sync::Arc;
use tracing::debug;

/// Secret type used for published connection details
pub const CONNECTION_SECRET_TYPE: &str = "connection.crossplane.io/v1alpha1";

/// The subset of the Secret API the publisher needs
#[async_trait]
pub trait SecretClient: Send + Sync {
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<Secret>, kube::Error>;

    async fn create(&self, secret: &Secret) -> Result<Secret, kube::Error>;

    async fn replace(&self, secret: &Secret) -> Result<Secret, kube::Error>;
}

/// [`SecretClient`] backed by the Kubernetes API
#[derive(Clone)]
pub struct KubeSecretClient {
    client: Client,
}

impl std::fmt::Debug for KubeSecretClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeSecretClient").finish_non_exhaustive()
    }
}

impl KubeSecretClient {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl SecretClient for KubeSecretClient {
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<Secret>, kube::Error> {
        Api::<Secret>::namespaced(self.client.clone(), namespace)
            .get_opt(name)
            .await
    }

    async fn create(&self, secret: &Secret) -> Result<Secret, kube::Error> {
        let namespace = secret.namespace().unwrap_or_default();
        Api::<Secret>::namespaced(self.client.clone(), &namespace)
            .create(&PostParams::default(), secret)
            .await
    }

    async fn replace(&self, secret: &Secret) -> Result<Secret, kube::Error> {
        let namespace = secret.namespace().unwrap_or_default();
        Api::<Secret>::namespaced(self.client.clone(), &namespace)
            .replace(&secret.name_any(), &PostParams::default(), secret)
            .await
    }
}

/// Publishes connection details to the Secret named by
/// `spec.writeConnectionSecretToRef`
pub struct SecretPublisher {
    secrets: Arc<dyn SecretClient>,
}

impl std::fmt::Debug for SecretPublisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecretPublisher").finish_non_exhaustive()
    }
}

impl SecretPublisher {
    pub fn new(secrets: Arc<dyn SecretClient>) -> Self {
        Self { secrets }
    }
}

fn controlled_by(secret: &Secret, uid: &str) -> bool {
    secret
        .owner_references()
        .iter()
        .any(|r| r.controller == Some(true) && r.uid == uid)
}

/// Namespace the Secret lives in. Cluster-scoped owners may name any
/// namespace; namespaced owners are pinned to their own.
fn secret_namespace(owner: Option<String>, requested: Option<&str>) -> Result<String, PublishError> {
    match (owner, requested) {
        (Some(owner), Some(requested)) if owner != requested => Err(PublishError::CrossNamespace {
            secret: requested.to_string(),
            owner,
        }),
        (Some(owner), _) => Ok(owner),
        (None, Some(requested)) => Ok(requested.to_string()),
        (None, None) => Ok("default".to_string()),
    }
}

#[async_trait]
impl<T: Managed> ConnectionPublisher<T> for SecretPublisher {
    async fn publish_connection(
        &self,
        owner: &T,
        details: &ConnectionDetails,
    ) -> Result<bool, PublishError> {
        let Some(secret_ref) = owner.resource_spec().write_connection_secret_to_ref.as_ref()
        else {
            return Ok(false);
        };
        let namespace = secret_namespace(owner.namespace(), secret_ref.namespace.as_deref())?;
        let owner_ref = owner
            .controller_owner_ref(&())
            .ok_or(PublishError::MissingUid)?;

        let Some(mut existing) = self.secrets.get(&namespace, &secret_ref.name).await? else {
            let secret = Secret {
                metadata: ObjectMeta {
                    name: Some(secret_ref.name.clone()),
                    namespace: Some(namespace.clone()),
                    owner_references: Some(vec![owner_ref]),
                    ..Default::default()
                },
                data: Some(
                    details
                        .iter()
                        .map(|(k, v)| (k.clone(), ByteString(v.clone())))
                        .collect(),
                ),
                type_: Some(CONNECTION_SECRET_TYPE.to_string()),
                ..Default::default()
            };
            self.secrets.create(&secret).await?;
            debug!(
                "Created connection secret {}/{} with {} keys",
                namespace,
                secret_ref.name,
                details.len()
            );
            return Ok(true);
        };

        if !controlled_by(&existing, &owner_ref.uid) {
            return Err(PublishError::NotControlled(
                format!("{}/{}", namespace, secret_ref.name),
                owner.name_any(),
            ));
        }

        let current = existing.data.take().unwrap_or_default();
        let mut merged = current.clone();
        for (k, v) in details {
            merged.insert(k.clone(), ByteString(v.clone()));
        }
        if merged == current {
            existing.data = Some(current);
            return Ok(false);
        }

        existing.data = Some(merged);
        self.secrets.replace(&existing).await?;
        debug!(
            "Updated connection secret {}/{}",
            namespace, secret_ref.name
        );
        Ok(true)
    }

    async fn unpublish_connection(
        &self,
        _owner: &T,
        _details: &ConnectionDetails,
    ) -> Result<(), PublishError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_secret_namespace() {
        let test_cases = vec![
            (Some("team-a"), None, Some("team-a")),
            (Some("team-a"), Some("team-a"), Some("team-a")),
            (Some("team-a"), Some("team-b"), None),
            (None, Some("crossplane-system"), Some("crossplane-system")),
            (None, None, Some("default")),
        ];

        for (owner, requested, expected) in test_cases {
            let result = secret_namespace(owner.map(str::to_string), requested);
            assert_eq!(
                result.ok().as_deref(),
                expected,
                "owner {owner:?}, requested {requested:?}"
            );
        }
    }
}
