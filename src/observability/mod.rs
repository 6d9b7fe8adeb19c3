//! # Observability
//!
//! Side channels the reconciler reports to, and the process-level plumbing
//! that exposes them.
//!
//! - `metrics`: Prometheus metrics collection
//! - `events`: Kubernetes events
//! - `changelog`: audit log of external mutations
//! - `logging`: tracing subscriber setup
//! - `server`: HTTP server for metrics and health probes

pub mod changelog;
pub mod events;
pub mod logging;
pub mod metrics;
pub mod server;

pub use changelog::{ChangeLogEntry, ChangeLogger, ChangeOperation, NopChangeLogger, TracingChangeLogger};
pub use events::{EventRecorder, KubeEventRecorder, ManagedEvent, NopEventRecorder};
pub use metrics::{MetricRecorder, NopMetrics, PrometheusMetrics};
