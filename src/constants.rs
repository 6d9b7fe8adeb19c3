//! # Constants
//!
//! Shared constants used throughout the runtime.
//!
//! These values represent reasonable defaults and can be overridden via
//! [`ReconcilerConfig`](crate::config::ReconcilerConfig) or environment variables where applicable.

/// Annotation holding the name of the external resource
pub const ANNOTATION_EXTERNAL_NAME: &str = "crossplane.io/external-name";

/// Annotation set immediately before the external create call is made
pub const ANNOTATION_EXTERNAL_CREATE_PENDING: &str = "crossplane.io/external-create-pending";

/// Annotation set once the external create call returned successfully
pub const ANNOTATION_EXTERNAL_CREATE_SUCCEEDED: &str = "crossplane.io/external-create-succeeded";

/// Annotation set once the external create call returned an error
pub const ANNOTATION_EXTERNAL_CREATE_FAILED: &str = "crossplane.io/external-create-failed";

/// Annotation that pauses reconciliation when set to `"true"`
pub const ANNOTATION_PAUSED: &str = "crossplane.io/paused";

/// Default finalizer added to every managed resource before any external create
pub const DEFAULT_FINALIZER: &str = "finalizer.managedresource.crossplane.io";

/// Field manager / event reporter name
pub const CONTROLLER_NAME: &str = "managed-resource-runtime";

/// Default poll interval for up-to-date resources (seconds)
pub const DEFAULT_POLL_INTERVAL_SECS: u64 = 60;

/// Default wait used for errors that should not hit the exponential backoff (seconds)
pub const DEFAULT_SHORT_WAIT_SECS: u64 = 30;

/// Default timeout for calls made through the external client (seconds)
pub const DEFAULT_RECONCILE_TIMEOUT_SECS: u64 = 60;

/// Extra time the whole reconcile gets on top of the external client timeout (seconds)
pub const RECONCILE_GRACE_PERIOD_SECS: u64 = 30;

/// Default window after a successful create during which a missing resource is not recreated (seconds)
pub const DEFAULT_CREATION_GRACE_PERIOD_SECS: u64 = 30;

/// Default exponential backoff starting value (milliseconds)
pub const DEFAULT_BACKOFF_START_MS: u64 = 1000;

/// Default exponential backoff maximum value (milliseconds)
pub const DEFAULT_BACKOFF_MAX_MS: u64 = 60_000;

/// Default HTTP server port for metrics and health probes
pub const DEFAULT_METRICS_PORT: u16 = 8080;

/// Attempts made when recording the create result annotation
pub const CREATE_ANNOTATION_ATTEMPTS: u32 = 3;

// Error stages. Every wrapped operational error carries one of these so
// failure causes stay distinguishable in logs, events and conditions.
pub const ERR_GET_MANAGED: &str = "cannot get managed resource";
pub const ERR_UPDATE_MANAGED_STATUS: &str = "cannot update managed resource status";
pub const ERR_UPDATE_MANAGED: &str = "cannot update managed resource";
pub const ERR_RECONCILE_CONNECT: &str = "connect failed";
pub const ERR_RECONCILE_OBSERVE: &str = "observe failed";
pub const ERR_RECONCILE_CREATE: &str = "create failed";
pub const ERR_RECONCILE_UPDATE: &str = "update failed";
pub const ERR_RECONCILE_DELETE: &str = "delete failed";
pub const ERR_PUBLISH_CONNECTION: &str = "cannot publish connection details";
pub const ERR_UNPUBLISH_CONNECTION: &str = "cannot unpublish connection details";
pub const ERR_ADD_FINALIZER: &str = "cannot add finalizer";
pub const ERR_REMOVE_FINALIZER: &str = "cannot remove finalizer";
pub const ERR_INITIALIZE: &str = "cannot initialize managed resource";
pub const ERR_RESOLVE_REFERENCES: &str = "cannot resolve references";
pub const ERR_MANAGEMENT_POLICY: &str = "invalid management policy";
pub const ERR_CREATE_INCOMPLETE: &str = "cannot determine creation result - remove the external-create-pending annotation if it is safe to proceed";
pub const ERR_RECORD_CREATE_RESULT: &str =
    "cannot update managed resource annotations; this may have leaked an external resource";
