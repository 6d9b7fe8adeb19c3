//! # Managed Resource Types
//!
//! Shared spec and status fragments embedded by every managed resource, and the
//! [`Managed`] trait the reconciler is generic over.
//!
//! Concrete operators embed [`ResourceSpec`] into their CRD spec and
//! [`ResourceStatus`] into their status (both with `#[serde(flatten)]`), then
//! implement [`Managed`] to expose them.

pub mod conditions;

pub use conditions::*;

use kube::Resource;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// An action the reconciler may take against the external resource
///
/// Unknown strings deserialize into [`ManagementAction::Unrecognized`] so that
/// policy validation (not the decoder) reports them with a useful message.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ManagementAction {
    Observe,
    Create,
    Update,
    Delete,
    LateInitialize,
    /// `*`, every action
    All,
    Unrecognized(String),
}

impl From<String> for ManagementAction {
    fn from(value: String) -> Self {
        match value.as_str() {
            "Observe" => Self::Observe,
            "Create" => Self::Create,
            "Update" => Self::Update,
            "Delete" => Self::Delete,
            "LateInitialize" => Self::LateInitialize,
            "*" => Self::All,
            _ => Self::Unrecognized(value),
        }
    }
}

impl From<&str> for ManagementAction {
    fn from(value: &str) -> Self {
        Self::from(value.to_string())
    }
}

impl From<ManagementAction> for String {
    fn from(value: ManagementAction) -> Self {
        value.to_string()
    }
}

impl fmt::Display for ManagementAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Observe => f.write_str("Observe"),
            Self::Create => f.write_str("Create"),
            Self::Update => f.write_str("Update"),
            Self::Delete => f.write_str("Delete"),
            Self::LateInitialize => f.write_str("LateInitialize"),
            Self::All => f.write_str("*"),
            Self::Unrecognized(s) => f.write_str(s),
        }
    }
}

/// What happens to the external resource when the managed resource is deleted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, schemars::JsonSchema)]
pub enum DeletionPolicy {
    /// Delete the external resource
    #[default]
    Delete,
    /// Leave the external resource in place
    Orphan,
}

/// Reference to the Secret connection details are written to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SecretReference {
    pub name: String,
    /// Defaults to the namespace of the managed resource
    #[serde(default)]
    pub namespace: Option<String>,
}

fn default_management_policies() -> Vec<ManagementAction> {
    vec![ManagementAction::All]
}

/// Fields common to every managed resource spec
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ResourceSpec {
    /// Where connection details for the external resource are written
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub write_connection_secret_to_ref: Option<SecretReference>,
    /// Actions the reconciler may take; `["*"]` allows everything, `[]` pauses
    #[serde(default = "default_management_policies")]
    #[schemars(with = "Vec<String>")]
    pub management_policies: Vec<ManagementAction>,
    #[serde(default)]
    pub deletion_policy: DeletionPolicy,
}

impl Default for ResourceSpec {
    fn default() -> Self {
        Self {
            write_connection_secret_to_ref: None,
            management_policies: default_management_policies(),
            deletion_policy: DeletionPolicy::default(),
        }
    }
}

impl ResourceSpec {
    /// Declared management policies as a set
    #[must_use]
    pub fn management_policy_set(&self) -> BTreeSet<ManagementAction> {
        self.management_policies.iter().cloned().collect()
    }
}

/// Fields common to every managed resource status
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ResourceStatus {
    #[serde(default)]
    pub conditions: Vec<Condition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
}

impl ResourceStatus {
    /// Get the condition of the given type, if any
    #[must_use]
    pub fn get_condition(&self, kind: &str) -> Option<&Condition> {
        self.conditions.iter().find(|c| c.r#type == kind)
    }

    /// Set conditions, replacing any existing condition of the same type.
    ///
    /// A condition equal to the existing one (ignoring transition time) is left
    /// untouched so its `lastTransitionTime` keeps pointing at the real transition.
    pub fn set_conditions(&mut self, conditions: impl IntoIterator<Item = Condition>) {
        for new in conditions {
            match self.conditions.iter_mut().find(|c| c.r#type == new.r#type) {
                Some(existing) if existing.equal(&new) => {}
                Some(existing) => *existing = new,
                None => self.conditions.push(new),
            }
        }
    }
}

/// A Kubernetes resource that represents a resource in an external system
///
/// Implementors expose the embedded [`ResourceSpec`] and [`ResourceStatus`];
/// everything else (annotations, finalizers, deletion timestamp) is read from
/// `metadata` through [`kube::ResourceExt`].
pub trait Managed:
    Resource<DynamicType = ()> + Clone + fmt::Debug + Serialize + DeserializeOwned + Send + Sync + 'static
{
    fn resource_spec(&self) -> &ResourceSpec;

    fn resource_status(&self) -> Option<&ResourceStatus>;

    /// Mutable status, created with defaults if absent
    fn resource_status_mut(&mut self) -> &mut ResourceStatus;

    fn get_condition(&self, kind: &str) -> Option<&Condition> {
        self.resource_status().and_then(|s| s.get_condition(kind))
    }

    /// Set conditions stamped with the current `metadata.generation`
    fn set_conditions(&mut self, conditions: impl IntoIterator<Item = Condition>) {
        let generation = self.meta().generation;
        let status = self.resource_status_mut();
        status.set_conditions(
            conditions
                .into_iter()
                .map(|c| c.with_observed_generation(generation)),
        );
        status.observed_generation = generation;
    }
}
