//! Integration tests for the batch engine against the in-memory provider
//!
//! These tests verify that:
//! - every organization is counted exactly once, whatever the strategy
//! - a second run over the same organizations creates nothing new
//! - missing organizations are warnings, not errors
//! - an unknown permission stops the run before any organization is touched

use std::sync::Arc;
use std::time::Duration;

use custom_roles::api::{ApiError, MockCall, MockRoleProvider};
use custom_roles::batch::{
    BatchRunner, Classification, ExecutionStrategy, RecordingProgress, Summary,
};
use custom_roles::error::{ConfigError, Error};
use custom_roles::roles::{prepare_role, BaseRole, RoleDefinition};

// ─── Helpers ──────────────────────────────────────────────────────────────────

fn auditor() -> RoleDefinition {
    RoleDefinition::new(
        "Security Auditor",
        Some("Reads code and alerts"),
        BaseRole::Read,
        vec!["read_code".to_string()],
    )
    .unwrap()
}

fn orgs(names: &[&str]) -> Vec<String> {
    names.iter().map(|n| (*n).to_string()).collect()
}

/// Twenty organizations with a mix of every outcome
fn mixed_provider() -> MockRoleProvider {
    let mut mock = MockRoleProvider::new().with_latency(Duration::from_millis(2));
    for i in 0..20 {
        let org = format!("org-{i:02}");
        mock = match i % 5 {
            0 => mock.with_org_roles(&org, &["security auditor"]),
            1 => mock.with_lookup_failure(&org, ApiError::http("mock", 500, "boom")),
            2 => mock
                .with_org(&org)
                .with_create_failure(&org, ApiError::rate_limited("mock", Some(60))),
            3 => mock, // unknown organization
            _ => mock.with_org(&org),
        };
    }
    mock
}

fn mixed_targets() -> Vec<String> {
    (0..20).map(|i| format!("org-{i:02}")).collect()
}

// ─── Scenarios ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_created_and_not_found_is_success() {
    let provider = Arc::new(MockRoleProvider::new().with_org("orga"));
    let runner = BatchRunner::new(provider, auditor(), ExecutionStrategy::default());
    let progress = RecordingProgress::new();

    let summary = runner.run(&orgs(&["orga", "orgb"]), &progress).await;

    assert_eq!(
        summary,
        Summary {
            success: 1,
            warning: 1,
            error: 0
        }
    );
    assert!(summary.is_success());
    assert_eq!(
        progress.lines(),
        vec![
            (
                Classification::Success,
                "Created role Security Auditor in orga".to_string()
            ),
            (
                Classification::Warning,
                "Organization orgb not found. Skipping.".to_string()
            ),
        ]
    );
}

#[tokio::test]
async fn test_second_run_skips_existing_roles() {
    let provider = Arc::new(MockRoleProvider::new().with_org("acme").with_org("globex"));
    let targets = orgs(&["acme", "globex"]);
    let runner = BatchRunner::new(provider.clone(), auditor(), ExecutionStrategy::Concurrency(2));

    let first = runner.run(&targets, &RecordingProgress::new()).await;
    let second = runner.run(&targets, &RecordingProgress::new()).await;

    assert_eq!(first.success, 2);
    assert_eq!(
        second,
        Summary {
            success: 0,
            warning: 2,
            error: 0
        }
    );
    assert_eq!(provider.create_calls(), 2);
    assert_eq!(provider.roles_in("acme"), vec!["Security Auditor"]);
}

#[tokio::test]
async fn test_counts_do_not_depend_on_strategy() {
    let strategies = [
        ExecutionStrategy::Concurrency(1),
        ExecutionStrategy::Delay(Duration::from_millis(1)),
        ExecutionStrategy::Concurrency(4),
        ExecutionStrategy::Concurrency(20),
    ];

    for strategy in strategies {
        let provider = Arc::new(mixed_provider());
        let runner = BatchRunner::new(provider, auditor(), strategy);
        let progress = RecordingProgress::new();

        let summary = runner.run(&mixed_targets(), &progress).await;

        assert_eq!(
            summary,
            Summary {
                success: 4,
                warning: 8,
                error: 8
            },
            "strategy {strategy}"
        );
        assert_eq!(summary.total(), 20);
        assert_eq!(progress.ticks(), 20);
        assert_eq!(progress.lines().len(), 20);
        assert!(!summary.is_success());
    }
}

#[tokio::test]
async fn test_every_target_processed_exactly_once_in_parallel() {
    let provider = Arc::new(mixed_provider());
    let runner = BatchRunner::new(provider.clone(), auditor(), ExecutionStrategy::Concurrency(7));

    runner.run(&mixed_targets(), &RecordingProgress::new()).await;

    let mut looked_up: Vec<String> = provider
        .calls()
        .into_iter()
        .filter_map(|call| match call {
            MockCall::ListRoles { org } => Some(org),
            _ => None,
        })
        .collect();
    looked_up.sort();
    assert_eq!(looked_up, mixed_targets());
    assert!(provider.max_in_flight() <= 7);
}

#[tokio::test]
async fn test_unknown_permission_fails_before_any_target() {
    let provider = Arc::new(
        MockRoleProvider::new()
            .with_org("acme")
            .with_org("globex")
            .with_permissions(&["read_code", "write_code"]),
    );

    let err = prepare_role(
        provider.as_ref(),
        "acme",
        "Security Auditor",
        None,
        BaseRole::Read,
        "read_code,bogus_permission",
    )
    .await
    .unwrap_err();

    assert!(matches!(
        err,
        Error::Config(ConfigError::UnknownPermission(ref p)) if p == "bogus_permission"
    ));
    assert_eq!(
        provider.calls(),
        vec![MockCall::ListPermissions {
            org: "acme".to_string()
        }]
    );
}
