//! Common imports for operators built on this crate.

pub use crate::config::ReconcilerConfig;
pub use crate::connection::{
    ConnectionDetails, ConnectionPublisher, PublisherChain, SecretPublisher,
};
pub use crate::controller::reconciler::{
    ReconcileError, ReconcileOutcome, Reconciler, ReconcilerBuilder,
};
pub use crate::crd::{
    Condition, DeletionPolicy, Managed, ManagementAction, ResourceSpec, ResourceStatus,
    SecretReference,
};
pub use crate::external::{
    ExternalClient, ExternalConnector, ExternalCreation, ExternalDelete, ExternalObservation,
    ExternalUpdate,
};
pub use crate::initializer::{Initializer, InitializerChain};
pub use crate::reference::{ApiReferenceResolver, Referencer, ResolveError};
pub use crate::store::{KubeStore, ObjectKey, ObjectStore, StoreError};
