//! # Management Policy Tests
//!
//! The full decision table of the management policies resolver.

use managed_resource_runtime::crd::{DeletionPolicy, ManagementAction};
use managed_resource_runtime::policy::{
    default_supported_management_policies, ManagementPoliciesResolver, PolicyError,
};
use ManagementAction::{All, Create, Delete, LateInitialize, Observe, Update};

/// (create, update, late_initialize, delete)
type Decisions = (bool, bool, bool, bool);

fn decisions(r: &ManagementPoliciesResolver) -> Decisions {
    (
        r.should_create(),
        r.should_update(),
        r.should_late_initialize(),
        r.should_delete(),
    )
}

#[test]
fn test_disabled_follows_deletion_policy() {
    let test_cases = vec![
        (DeletionPolicy::Delete, (true, true, true, true)),
        (DeletionPolicy::Orphan, (true, true, true, false)),
    ];

    for (deletion_policy, expected) in test_cases {
        let r = ManagementPoliciesResolver::new(false, [All], deletion_policy);
        assert_eq!(
            decisions(&r),
            expected,
            "disabled with deletion policy {deletion_policy:?}"
        );
        assert!(!r.is_paused(), "disabled is never paused");
        assert!(!r.should_only_observe(), "disabled is never observe-only");
        assert_eq!(r.validate(), Ok(()));
    }
}

#[test]
fn test_enabled_decision_table() {
    let test_cases: Vec<(Vec<ManagementAction>, DeletionPolicy, Decisions, bool, bool)> = vec![
        // policies, deletion policy, (create, update, late init, delete), paused, observe only
        (vec![All], DeletionPolicy::Delete, (true, true, true, true), false, false),
        (vec![All], DeletionPolicy::Orphan, (true, true, true, true), false, false),
        (vec![], DeletionPolicy::Delete, (false, false, false, false), true, false),
        (vec![Observe], DeletionPolicy::Delete, (false, false, false, false), false, true),
        (
            vec![Observe, Create, Update, Delete, LateInitialize],
            DeletionPolicy::Orphan,
            (true, true, true, true),
            false,
            false,
        ),
        (
            vec![Observe, Create, Update, LateInitialize],
            DeletionPolicy::Delete,
            (true, true, true, false),
            false,
            false,
        ),
        (
            vec![Observe, Create, Update, Delete],
            DeletionPolicy::Delete,
            (true, true, false, true),
            false,
            false,
        ),
        (vec![Observe, Delete], DeletionPolicy::Orphan, (false, false, false, true), false, false),
        (vec![Observe, Update], DeletionPolicy::Delete, (false, true, false, false), false, false),
        (
            vec![Observe, LateInitialize],
            DeletionPolicy::Delete,
            (false, false, true, false),
            false,
            false,
        ),
        (vec![Observe, Create], DeletionPolicy::Delete, (true, false, false, false), false, false),
    ];

    for (policies, deletion_policy, expected, paused, observe_only) in test_cases {
        let r = ManagementPoliciesResolver::new(true, policies.clone(), deletion_policy)
            .with_supported(default_supported_management_policies());
        assert_eq!(r.validate(), Ok(()), "{policies:?} should be supported");
        assert_eq!(
            decisions(&r),
            expected,
            "policies {policies:?} with deletion policy {deletion_policy:?}"
        );
        assert_eq!(r.is_paused(), paused, "paused for {policies:?}");
        assert_eq!(
            r.should_only_observe(),
            observe_only,
            "observe only for {policies:?}"
        );
    }
}

#[test]
fn test_validation_errors() {
    let supported = default_supported_management_policies();
    let test_cases = vec![
        ("disabled with observe", false, vec![Observe], None, "Disabled"),
        ("disabled with empty set", false, vec![], None, "Disabled"),
        (
            "create without observe",
            true,
            vec![Create],
            Some(supported.clone()),
            "Unsupported",
        ),
        (
            "delete without observe",
            true,
            vec![Delete],
            Some(supported.clone()),
            "Unsupported",
        ),
        (
            "unknown action",
            true,
            vec![Observe, ManagementAction::from("Replace")],
            None,
            "Unrecognized",
        ),
    ];

    for (name, enabled, policies, supported, expected) in test_cases {
        let mut r = ManagementPoliciesResolver::new(enabled, policies, DeletionPolicy::Delete);
        if let Some(supported) = supported {
            r = r.with_supported(supported);
        }
        let kind = match r.validate() {
            Err(PolicyError::Disabled(_)) => "Disabled",
            Err(PolicyError::Unsupported(_)) => "Unsupported",
            Err(PolicyError::Unrecognized(_)) => "Unrecognized",
            Ok(()) => "Ok",
        };
        assert_eq!(kind, expected, "{name}");
    }
}

#[test]
fn test_duplicates_collapse() {
    let r = ManagementPoliciesResolver::new(
        true,
        [Observe, Observe, Create],
        DeletionPolicy::Delete,
    )
    .with_supported(default_supported_management_policies());
    assert_eq!(r.validate(), Ok(()));
    assert!(r.should_create());
}

#[test]
fn test_policies_deserialize_from_strings() {
    let actions: Vec<ManagementAction> =
        serde_json::from_str(r#"["Observe", "LateInitialize", "*", "Bogus"]"#).unwrap();
    assert_eq!(
        actions,
        vec![
            Observe,
            LateInitialize,
            All,
            ManagementAction::Unrecognized("Bogus".to_string())
        ]
    );
    assert_eq!(
        serde_json::to_string(&actions).unwrap(),
        r#"["Observe","LateInitialize","*","Bogus"]"#
    );
}
