//! # Conditions
//!
//! Ready and Synced conditions written by the reconciler.
//!
//! - `Ready` tracks the external resource: `Available`, `Unavailable`, `Creating`, `Deleting`
//! - `Synced` tracks the last reconcile: `ReconcileSuccess`, `ReconcileError`,
//!   `ReconcilePaused`, `ReferenceResolutionBlocked`

use serde::{Deserialize, Serialize};

pub const TYPE_READY: &str = "Ready";
pub const TYPE_SYNCED: &str = "Synced";

pub const STATUS_TRUE: &str = "True";
pub const STATUS_FALSE: &str = "False";

pub const REASON_AVAILABLE: &str = "Available";
pub const REASON_UNAVAILABLE: &str = "Unavailable";
pub const REASON_CREATING: &str = "Creating";
pub const REASON_DELETING: &str = "Deleting";
pub const REASON_RECONCILE_SUCCESS: &str = "ReconcileSuccess";
pub const REASON_RECONCILE_ERROR: &str = "ReconcileError";
pub const REASON_RECONCILE_PAUSED: &str = "ReconcilePaused";
pub const REASON_REFERENCE_RESOLUTION_BLOCKED: &str = "ReferenceResolutionBlocked";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    pub r#type: String,
    pub status: String,
    #[serde(default)]
    pub last_transition_time: Option<String>,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
}

impl Condition {
    fn new(kind: &str, status: &str, reason: &str) -> Self {
        Self {
            r#type: kind.to_string(),
            status: status.to_string(),
            last_transition_time: Some(chrono::Utc::now().to_rfc3339()),
            reason: Some(reason.to_string()),
            message: None,
            observed_generation: None,
        }
    }

    #[must_use]
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    #[must_use]
    pub fn with_observed_generation(mut self, generation: Option<i64>) -> Self {
        self.observed_generation = generation;
        self
    }

    /// Equal in everything but transition time
    #[must_use]
    pub fn equal(&self, other: &Condition) -> bool {
        self.r#type == other.r#type
            && self.status == other.status
            && self.reason == other.reason
            && self.message == other.message
            && self.observed_generation == other.observed_generation
    }

    #[must_use]
    pub fn is_true(&self) -> bool {
        self.status == STATUS_TRUE
    }

    #[must_use]
    pub fn reason(&self) -> Option<&str> {
        self.reason.as_deref()
    }
}

/// The external resource is available for use.
#[must_use]
pub fn available() -> Condition {
    Condition::new(TYPE_READY, STATUS_TRUE, REASON_AVAILABLE)
}

/// The external resource is not available for use.
#[must_use]
pub fn unavailable() -> Condition {
    Condition::new(TYPE_READY, STATUS_FALSE, REASON_UNAVAILABLE)
}

/// The external resource is being created.
#[must_use]
pub fn creating() -> Condition {
    Condition::new(TYPE_READY, STATUS_FALSE, REASON_CREATING)
}

/// The external resource is being deleted.
#[must_use]
pub fn deleting() -> Condition {
    Condition::new(TYPE_READY, STATUS_FALSE, REASON_DELETING)
}

#[must_use]
pub fn reconcile_success() -> Condition {
    Condition::new(TYPE_SYNCED, STATUS_TRUE, REASON_RECONCILE_SUCCESS)
}

#[must_use]
pub fn reconcile_error(err: &dyn std::fmt::Display) -> Condition {
    Condition::new(TYPE_SYNCED, STATUS_FALSE, REASON_RECONCILE_ERROR).with_message(err.to_string())
}

#[must_use]
pub fn reconcile_paused() -> Condition {
    Condition::new(TYPE_SYNCED, STATUS_FALSE, REASON_RECONCILE_PAUSED)
        .with_message("Reconciliation is paused")
}

/// References could not be read; the resource waits on them rather than failing.
#[must_use]
pub fn reference_resolution_blocked(err: &dyn std::fmt::Display) -> Condition {
    Condition::new(TYPE_SYNCED, STATUS_FALSE, REASON_REFERENCE_RESOLUTION_BLOCKED)
        .with_message(err.to_string())
}
