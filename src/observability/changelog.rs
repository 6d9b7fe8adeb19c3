//! # Change Log
//!
//! Audit trail of every mutation the reconciler attempts against an external
//! resource. The reconciler logs a sink failure and carries on.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ChangeOperation {
    Create,
    Update,
    Delete,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeLogEntry {
    pub timestamp: DateTime<Utc>,
    pub kind: String,
    pub namespace: Option<String>,
    pub name: String,
    pub external_name: Option<String>,
    pub operation: ChangeOperation,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[async_trait]
pub trait ChangeLogger: Send + Sync {
    async fn log(&self, entry: &ChangeLogEntry) -> Result<()>;
}

/// Writes each entry as a structured `info` record on the `changelog` target
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingChangeLogger;

#[async_trait]
impl ChangeLogger for TracingChangeLogger {
    async fn log(&self, entry: &ChangeLogEntry) -> Result<()> {
        let json = serde_json::to_string(entry)?;
        info!(
            target: "changelog",
            operation = ?entry.operation,
            resource.kind = %entry.kind,
            resource.name = %entry.name,
            success = entry.error.is_none(),
            entry = %json,
            "external resource change"
        );
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NopChangeLogger;

#[async_trait]
impl ChangeLogger for NopChangeLogger {
    async fn log(&self, _entry: &ChangeLogEntry) -> Result<()> {
        Ok(())
    }
}
