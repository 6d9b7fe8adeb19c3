//! # External System
//!
//! The boundary between the reconciler and the system that actually holds the
//! resource (a cloud API, a database, ...). Each operator supplies its own
//! [`ExternalConnector`]; the runtime only relies on this contract:
//!
//! - `observe` never mutates the external resource. It may late-initialize
//!   fields of the in-memory managed resource.
//! - `create` and `update` may be retried after an ambiguous failure.
//! - `delete` succeeds if the resource is already gone or being deleted.
//! - `disconnect` failures are logged and otherwise ignored.

use crate::connection::ConnectionDetails;
use anyhow::Result;
use async_trait::async_trait;

/// What `observe` found
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExternalObservation {
    pub resource_exists: bool,
    pub resource_up_to_date: bool,
    /// `observe` filled in unset spec fields that should be persisted
    pub resource_late_initialized: bool,
    pub connection_details: ConnectionDetails,
    /// Human readable description of the drift, used in logs and events
    pub diff: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExternalCreation {
    pub connection_details: ConnectionDetails,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExternalUpdate {
    pub connection_details: ConnectionDetails,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExternalDelete;

/// Produces an [`ExternalClient`] for one managed resource, e.g. by reading
/// provider credentials it references
#[async_trait]
pub trait ExternalConnector<T>: Send + Sync {
    async fn connect(&self, obj: &T) -> Result<Box<dyn ExternalClient<T>>>;
}

#[async_trait]
pub trait ExternalClient<T>: Send + Sync {
    async fn observe(&self, obj: &mut T) -> Result<ExternalObservation>;

    async fn create(&self, obj: &mut T) -> Result<ExternalCreation>;

    async fn update(&self, obj: &mut T) -> Result<ExternalUpdate>;

    async fn delete(&self, obj: &mut T) -> Result<ExternalDelete>;

    /// Release any session held by the client
    async fn disconnect(&self) -> Result<()> {
        Ok(())
    }
}

/// Connector whose client reports every resource as existing and up to date
#[derive(Debug, Clone, Copy, Default)]
pub struct NopConnector;

#[async_trait]
impl<T: Send + Sync + 'static> ExternalConnector<T> for NopConnector {
    async fn connect(&self, _obj: &T) -> Result<Box<dyn ExternalClient<T>>> {
        Ok(Box::new(NopClient))
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NopClient;

#[async_trait]
impl<T: Send + Sync> ExternalClient<T> for NopClient {
    async fn observe(&self, _obj: &mut T) -> Result<ExternalObservation> {
        Ok(ExternalObservation {
            resource_exists: true,
            resource_up_to_date: true,
            ..Default::default()
        })
    }

    async fn create(&self, _obj: &mut T) -> Result<ExternalCreation> {
        Ok(ExternalCreation::default())
    }

    async fn update(&self, _obj: &mut T) -> Result<ExternalUpdate> {
        Ok(ExternalUpdate::default())
    }

    async fn delete(&self, _obj: &mut T) -> Result<ExternalDelete> {
        Ok(ExternalDelete)
    }
}
