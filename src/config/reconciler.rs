//! # Reconciler Configuration
//!
//! Reconciler and runtime settings loaded from environment variables.

use crate::constants::{
    DEFAULT_BACKOFF_MAX_MS, DEFAULT_BACKOFF_START_MS, DEFAULT_CREATION_GRACE_PERIOD_SECS,
    DEFAULT_FINALIZER, DEFAULT_METRICS_PORT, DEFAULT_POLL_INTERVAL_SECS,
    DEFAULT_RECONCILE_TIMEOUT_SECS, DEFAULT_SHORT_WAIT_SECS, RECONCILE_GRACE_PERIOD_SECS,
};
use crate::policy::{default_supported_management_policies, PolicySet};
use std::time::Duration;

/// Reconciler configuration
///
/// All settings have sensible defaults and can be overridden via environment variables.
/// `finalizer_name` and `supported_management_policies` are code-only.
#[derive(Debug, Clone)]
pub struct ReconcilerConfig {
    /// Requeue interval for resources that are up to date
    pub poll_interval: Duration,
    /// Poll interval is randomly adjusted by up to this much in either direction
    pub poll_jitter: Duration,
    /// Requeue interval for errors that should not hit the exponential backoff
    pub short_wait: Duration,
    /// Deadline for calls made through the external client.
    /// The whole reconcile gets this plus a fixed grace period.
    pub timeout: Duration,
    /// A resource not observed within this long after a successful create is
    /// assumed to still be propagating, not missing
    pub creation_grace_period: Duration,
    /// Honour `spec.managementPolicies`
    pub management_policies_enabled: bool,
    /// Policy combinations accepted when management policies are enabled
    pub supported_management_policies: Vec<PolicySet>,
    /// Finalizer added before any external create
    pub finalizer_name: String,
    /// Exponential backoff starting value (milliseconds)
    pub backoff_start_ms: u64,
    /// Exponential backoff maximum value (milliseconds)
    pub backoff_max_ms: u64,
    /// Maximum concurrent reconciles; 0 means unbounded
    pub max_concurrent_reconciles: u16,
    /// Port of the metrics and probes server
    pub metrics_port: u16,
    /// Global log level (ERROR, WARN, INFO, DEBUG, TRACE)
    pub log_level: String,
    /// Log format (json, text)
    pub log_format: String,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(DEFAULT_POLL_INTERVAL_SECS),
            poll_jitter: Duration::ZERO,
            short_wait: Duration::from_secs(DEFAULT_SHORT_WAIT_SECS),
            timeout: Duration::from_secs(DEFAULT_RECONCILE_TIMEOUT_SECS),
            creation_grace_period: Duration::from_secs(DEFAULT_CREATION_GRACE_PERIOD_SECS),
            management_policies_enabled: false,
            supported_management_policies: default_supported_management_policies(),
            finalizer_name: DEFAULT_FINALIZER.to_string(),
            backoff_start_ms: DEFAULT_BACKOFF_START_MS,
            backoff_max_ms: DEFAULT_BACKOFF_MAX_MS,
            max_concurrent_reconciles: 10,
            metrics_port: DEFAULT_METRICS_PORT,
            log_level: "INFO".to_string(),
            log_format: "json".to_string(),
        }
    }
}

impl ReconcilerConfig {
    /// Load configuration from environment variables with defaults
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary key lookup with defaults
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            poll_interval: Duration::from_secs(var_or_default(
                &lookup,
                "POLL_INTERVAL_SECS",
                DEFAULT_POLL_INTERVAL_SECS,
            )),
            poll_jitter: Duration::from_secs(var_or_default(&lookup, "POLL_JITTER_SECS", 0)),
            short_wait: Duration::from_secs(var_or_default(
                &lookup,
                "SHORT_WAIT_SECS",
                DEFAULT_SHORT_WAIT_SECS,
            )),
            timeout: Duration::from_secs(var_or_default(
                &lookup,
                "RECONCILE_TIMEOUT_SECS",
                DEFAULT_RECONCILE_TIMEOUT_SECS,
            )),
            creation_grace_period: Duration::from_secs(var_or_default(
                &lookup,
                "CREATION_GRACE_PERIOD_SECS",
                DEFAULT_CREATION_GRACE_PERIOD_SECS,
            )),
            management_policies_enabled: var_or_default_bool(
                &lookup,
                "ENABLE_MANAGEMENT_POLICIES",
                false,
            ),
            supported_management_policies: defaults.supported_management_policies,
            finalizer_name: defaults.finalizer_name,
            backoff_start_ms: var_or_default(&lookup, "BACKOFF_START_MS", DEFAULT_BACKOFF_START_MS),
            backoff_max_ms: var_or_default(&lookup, "BACKOFF_MAX_MS", DEFAULT_BACKOFF_MAX_MS),
            max_concurrent_reconciles: var_or_default(&lookup, "MAX_CONCURRENT_RECONCILES", 10),
            metrics_port: var_or_default(&lookup, "METRICS_PORT", DEFAULT_METRICS_PORT),
            log_level: var_or_default_str(&lookup, "LOG_LEVEL", "INFO"),
            log_format: var_or_default_str(&lookup, "LOG_FORMAT", "json"),
        }
    }

    /// Deadline for the whole reconcile, measured from entry
    pub fn reconcile_timeout(&self) -> Duration {
        self.timeout
            .saturating_add(Duration::from_secs(RECONCILE_GRACE_PERIOD_SECS))
    }

    /// Get backoff start duration
    pub fn backoff_start_duration(&self) -> Duration {
        Duration::from_millis(self.backoff_start_ms)
    }

    /// Get backoff max duration
    pub fn backoff_max_duration(&self) -> Duration {
        Duration::from_millis(self.backoff_max_ms)
    }
}

/// Read a variable or return the default value
fn var_or_default<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> T {
    lookup(key)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

/// Read a variable as boolean or return default
fn var_or_default_bool(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: bool) -> bool {
    lookup(key)
        .map(|v| {
            let v_lower = v.to_lowercase();
            v_lower == "true" || v_lower == "1" || v_lower == "yes" || v_lower == "on"
        })
        .unwrap_or(default)
}

/// Read a variable as string or return default
fn var_or_default_str(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: &str) -> String {
    lookup(key).unwrap_or_else(|| default.to_string())
}
