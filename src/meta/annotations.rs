//! # Annotation Management
//!
//! Handles annotation-based state: external name, pause flag, and the
//! create pending/succeeded/failed timestamps that make external creation
//! crash-safe.
//!
//! Timestamps are RFC3339 with second precision in UTC. A create is
//! considered incomplete only while the pending timestamp is strictly newer
//! than both the succeeded and failed timestamps, so a create that resolved in
//! the same second it started counts as complete.

use crate::constants::{
    ANNOTATION_EXTERNAL_CREATE_FAILED, ANNOTATION_EXTERNAL_CREATE_PENDING,
    ANNOTATION_EXTERNAL_CREATE_SUCCEEDED, ANNOTATION_EXTERNAL_NAME, ANNOTATION_PAUSED,
};
use chrono::{DateTime, SecondsFormat, Utc};
use kube::{Resource, ResourceExt};
use std::time::Duration;

/// Get the external name annotation, if set and non-empty
pub fn external_name<K: Resource>(obj: &K) -> Option<&str> {
    obj.annotations()
        .get(ANNOTATION_EXTERNAL_NAME)
        .map(String::as_str)
        .filter(|s| !s.is_empty())
}

pub fn set_external_name<K: Resource>(obj: &mut K, name: &str) {
    obj.annotations_mut()
        .insert(ANNOTATION_EXTERNAL_NAME.to_string(), name.to_string());
}

/// True if the pause annotation is exactly `"true"`
pub fn is_paused<K: Resource>(obj: &K) -> bool {
    obj.annotations().get(ANNOTATION_PAUSED).map(String::as_str) == Some("true")
}

fn set_timestamp<K: Resource>(obj: &mut K, key: &str, t: DateTime<Utc>) {
    obj.annotations_mut().insert(
        key.to_string(),
        t.to_rfc3339_opts(SecondsFormat::Secs, true),
    );
}

fn get_timestamp<K: Resource>(obj: &K, key: &str) -> Option<DateTime<Utc>> {
    obj.annotations()
        .get(key)
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|t| t.with_timezone(&Utc))
}

pub fn set_external_create_pending<K: Resource>(obj: &mut K, t: DateTime<Utc>) {
    set_timestamp(obj, ANNOTATION_EXTERNAL_CREATE_PENDING, t);
}

pub fn set_external_create_succeeded<K: Resource>(obj: &mut K, t: DateTime<Utc>) {
    set_timestamp(obj, ANNOTATION_EXTERNAL_CREATE_SUCCEEDED, t);
}

pub fn set_external_create_failed<K: Resource>(obj: &mut K, t: DateTime<Utc>) {
    set_timestamp(obj, ANNOTATION_EXTERNAL_CREATE_FAILED, t);
}

pub fn external_create_pending<K: Resource>(obj: &K) -> Option<DateTime<Utc>> {
    get_timestamp(obj, ANNOTATION_EXTERNAL_CREATE_PENDING)
}

pub fn external_create_succeeded<K: Resource>(obj: &K) -> Option<DateTime<Utc>> {
    get_timestamp(obj, ANNOTATION_EXTERNAL_CREATE_SUCCEEDED)
}

pub fn external_create_failed<K: Resource>(obj: &K) -> Option<DateTime<Utc>> {
    get_timestamp(obj, ANNOTATION_EXTERNAL_CREATE_FAILED)
}

/// True if a create was started but its result was never recorded.
///
/// This happens when the process died (or the annotation update failed)
/// between calling the external create and recording the outcome. The
/// external resource may or may not exist, so another create is unsafe.
pub fn external_create_incomplete<K: Resource>(obj: &K) -> bool {
    let Some(pending) = external_create_pending(obj) else {
        return false;
    };
    let latest = match (external_create_succeeded(obj), external_create_failed(obj)) {
        (Some(s), Some(f)) => Some(s.max(f)),
        (s, f) => s.or(f),
    };
    match latest {
        None => true,
        Some(latest) => pending > latest,
    }
}

/// True if the last successful create happened less than `grace` before `now`.
///
/// Wall clock, exclusive boundary: at exactly `grace` after the create this
/// returns false. Some external APIs are eventually consistent and won't
/// report a freshly created resource straight away.
pub fn external_create_succeeded_during<K: Resource>(
    obj: &K,
    now: DateTime<Utc>,
    grace: Duration,
) -> bool {
    let Some(succeeded) = external_create_succeeded(obj) else {
        return false;
    };
    let Ok(grace) = chrono::Duration::from_std(grace) else {
        return false;
    };
    now.signed_duration_since(succeeded) < grace
}

pub fn has_finalizer<K: Resource>(obj: &K, finalizer: &str) -> bool {
    obj.finalizers().iter().any(|f| f == finalizer)
}

/// Add a finalizer; returns false if it was already present
pub fn add_finalizer<K: Resource>(obj: &mut K, finalizer: &str) -> bool {
    if has_finalizer(obj, finalizer) {
        return false;
    }
    obj.finalizers_mut().push(finalizer.to_string());
    true
}

/// Remove every copy of a finalizer; returns false if it was absent
pub fn remove_finalizer<K: Resource>(obj: &mut K, finalizer: &str) -> bool {
    if !has_finalizer(obj, finalizer) {
        return false;
    }
    obj.finalizers_mut().retain(|f| f != finalizer);
    true
}

pub fn was_deleted<K: Resource>(obj: &K) -> bool {
    obj.meta().deletion_timestamp.is_some()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use k8s_openapi::api::core::v1::ConfigMap;
    use kube::api::ObjectMeta;

    fn obj() -> ConfigMap {
        ConfigMap {
            metadata: ObjectMeta {
                name: Some("test".to_string()),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap()
    }

    #[test]
    fn test_external_name_empty_is_unset() {
        let mut o = obj();
        assert_eq!(external_name(&o), None);
        set_external_name(&mut o, "");
        assert_eq!(external_name(&o), None);
        set_external_name(&mut o, "bucket-1");
        assert_eq!(external_name(&o), Some("bucket-1"));
    }

    #[test]
    fn test_is_paused_requires_true() {
        let mut o = obj();
        assert!(!is_paused(&o));
        o.annotations_mut()
            .insert(ANNOTATION_PAUSED.to_string(), "false".to_string());
        assert!(!is_paused(&o));
        o.annotations_mut()
            .insert(ANNOTATION_PAUSED.to_string(), "true".to_string());
        assert!(is_paused(&o));
    }

    #[test]
    fn test_create_incomplete_without_pending() {
        let mut o = obj();
        assert!(!external_create_incomplete(&o));
        set_external_create_succeeded(&mut o, at(0));
        assert!(!external_create_incomplete(&o));
    }

    #[test]
    fn test_create_incomplete_pending_only() {
        let mut o = obj();
        set_external_create_pending(&mut o, at(0));
        assert!(external_create_incomplete(&o));
    }

    #[test]
    fn test_create_incomplete_resolved_by_success_or_failure() {
        let mut o = obj();
        set_external_create_pending(&mut o, at(10));
        set_external_create_succeeded(&mut o, at(11));
        assert!(!external_create_incomplete(&o));

        let mut o = obj();
        set_external_create_pending(&mut o, at(10));
        set_external_create_failed(&mut o, at(12));
        assert!(!external_create_incomplete(&o));
    }

    #[test]
    fn test_create_incomplete_same_second_is_complete() {
        let mut o = obj();
        set_external_create_pending(&mut o, at(10));
        set_external_create_succeeded(&mut o, at(10));
        assert!(!external_create_incomplete(&o));
    }

    #[test]
    fn test_create_incomplete_newer_pending() {
        let mut o = obj();
        set_external_create_failed(&mut o, at(5));
        set_external_create_succeeded(&mut o, at(3));
        set_external_create_pending(&mut o, at(20));
        assert!(external_create_incomplete(&o));
    }

    #[test]
    fn test_succeeded_during_exclusive_boundary() {
        let mut o = obj();
        let grace = Duration::from_secs(30);
        assert!(!external_create_succeeded_during(&o, at(0), grace));

        set_external_create_succeeded(&mut o, at(0));
        assert!(external_create_succeeded_during(&o, at(29), grace));
        assert!(!external_create_succeeded_during(&o, at(30), grace));
        assert!(!external_create_succeeded_during(&o, at(31), grace));
    }

    #[test]
    fn test_finalizer_helpers_idempotent() {
        let mut o = obj();
        assert!(add_finalizer(&mut o, "f"));
        assert!(!add_finalizer(&mut o, "f"));
        assert_eq!(o.finalizers().len(), 1);
        assert!(remove_finalizer(&mut o, "f"));
        assert!(!remove_finalizer(&mut o, "f"));
        assert!(o.finalizers().is_empty());
    }
}
