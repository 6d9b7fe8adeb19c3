//! Managed Resource Runtime
//!
//! Reconciliation machinery for Kubernetes controllers that create, update
//! and delete resources in an external system to match a custom resource.
//!
//! An operator supplies a CRD type implementing [`crd::Managed`] and an
//! [`external::ExternalConnector`]; the [`controller::reconciler::Reconciler`]
//! handles finalizers, connection secrets, management and deletion policies,
//! crash-safe creation and requeue scheduling.

pub mod config;
pub mod connection;
pub mod constants;
pub mod controller;
pub mod crd;
pub mod external;
pub mod finalizer;
pub mod gate;
pub mod initializer;
pub mod meta;
pub mod observability;
pub mod policy;
pub mod prelude;
pub mod reference;
pub mod runtime;
pub mod store;
