//! # Management Policies
//!
//! Decides which actions a single reconcile may take against the external
//! resource, from the management policies declared on the object, its
//! deletion policy and whether the management policies feature is enabled.
//!
//! With the feature disabled the reconciler behaves as it always has: every
//! action is allowed and deletion follows the deletion policy. With it
//! enabled, the declared set is authoritative; an empty set pauses the
//! resource and an explicit `Delete` overrides an `Orphan` deletion policy.

use crate::crd::{DeletionPolicy, ManagementAction};
use std::collections::BTreeSet;
use thiserror::Error;

pub type PolicySet = BTreeSet<ManagementAction>;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PolicyError {
    #[error("management policies {0} are set but the management policies feature is not enabled")]
    Disabled(String),

    #[error("management policies {0} are not supported by this controller")]
    Unsupported(String),

    #[error("unrecognized management policy action {0:?}")]
    Unrecognized(String),
}

fn set_of<const N: usize>(actions: [ManagementAction; N]) -> PolicySet {
    actions.into_iter().collect()
}

fn describe(set: &PolicySet) -> String {
    let actions: Vec<String> = set.iter().map(ToString::to_string).collect();
    format!("[{}]", actions.join(", "))
}

/// Policy combinations that a controller supports unless it says otherwise
#[must_use]
pub fn default_supported_management_policies() -> Vec<PolicySet> {
    use ManagementAction::{All, Create, Delete, LateInitialize, Observe, Update};
    vec![
        // Everything
        set_of([All]),
        set_of([Observe, Create, Update, Delete, LateInitialize]),
        // Observe only, e.g. importing existing resources
        set_of([Observe]),
        // Paused
        PolicySet::new(),
        // Without late initialization
        set_of([Observe, Create, Update, Delete]),
        // Without delete (orphan)
        set_of([Observe, Create, Update, LateInitialize]),
        set_of([Observe, Create, Update]),
        // Import and delete
        set_of([Observe, Delete]),
        // Import and update
        set_of([Observe, Update]),
        set_of([Observe, Update, LateInitialize]),
        set_of([Observe, Update, Delete]),
        set_of([Observe, Update, Delete, LateInitialize]),
        // Import and late initialize
        set_of([Observe, LateInitialize]),
        set_of([Observe, Delete, LateInitialize]),
        // Create but never touch again
        set_of([Observe, Create]),
        set_of([Observe, Create, Delete]),
    ]
}

/// Answers "may this reconcile do X?" for one object
#[derive(Debug, Clone)]
pub struct ManagementPoliciesResolver {
    enabled: bool,
    policies: PolicySet,
    deletion_policy: DeletionPolicy,
    supported: Option<Vec<PolicySet>>,
}

impl ManagementPoliciesResolver {
    pub fn new(
        enabled: bool,
        policies: impl IntoIterator<Item = ManagementAction>,
        deletion_policy: DeletionPolicy,
    ) -> Self {
        Self {
            enabled,
            policies: policies.into_iter().collect(),
            deletion_policy,
            supported: None,
        }
    }

    /// Restrict the declared set to one of the given combinations
    #[must_use]
    pub fn with_supported(mut self, supported: Vec<PolicySet>) -> Self {
        self.supported = Some(supported);
        self
    }

    fn has(&self, action: &ManagementAction) -> bool {
        self.policies.contains(&ManagementAction::All) || self.policies.contains(action)
    }

    /// Check that the declared policies are usable.
    ///
    /// # Errors
    ///
    /// - [`PolicyError::Disabled`] if the feature is off and anything other than `["*"]` is declared
    /// - [`PolicyError::Unsupported`] if the declared set is not one of the supported sets
    /// - [`PolicyError::Unrecognized`] if no supported sets are given and an action is unknown
    pub fn validate(&self) -> Result<(), PolicyError> {
        if !self.enabled {
            if self.policies != set_of([ManagementAction::All]) {
                return Err(PolicyError::Disabled(describe(&self.policies)));
            }
            return Ok(());
        }

        match &self.supported {
            Some(supported) => {
                if supported.iter().any(|s| *s == self.policies) {
                    Ok(())
                } else {
                    Err(PolicyError::Unsupported(describe(&self.policies)))
                }
            }
            None => match self
                .policies
                .iter()
                .find(|a| matches!(a, ManagementAction::Unrecognized(_)))
            {
                Some(action) => Err(PolicyError::Unrecognized(action.to_string())),
                None => Ok(()),
            },
        }
    }

    /// An empty policy set pauses the resource when the feature is enabled
    #[must_use]
    pub fn is_paused(&self) -> bool {
        self.enabled && self.policies.is_empty()
    }

    #[must_use]
    pub fn should_only_observe(&self) -> bool {
        self.enabled && self.policies == set_of([ManagementAction::Observe])
    }

    #[must_use]
    pub fn should_create(&self) -> bool {
        !self.enabled || self.has(&ManagementAction::Create)
    }

    #[must_use]
    pub fn should_update(&self) -> bool {
        !self.enabled || self.has(&ManagementAction::Update)
    }

    #[must_use]
    pub fn should_late_initialize(&self) -> bool {
        !self.enabled || self.has(&ManagementAction::LateInitialize)
    }

    /// With the feature enabled the declared set wins over the deletion policy
    #[must_use]
    pub fn should_delete(&self) -> bool {
        if !self.enabled {
            return self.deletion_policy == DeletionPolicy::Delete;
        }
        self.has(&ManagementAction::Delete)
    }
}
