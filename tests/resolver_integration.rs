//! Integration tests for target resolution
//!
//! Covers CSV files on disk and enterprise discovery through the in-memory
//! provider.

use std::io::Write;
use std::sync::Arc;

use tempfile::NamedTempFile;

use custom_roles::api::MockRoleProvider;
use custom_roles::error::{ConfigError, Error};
use custom_roles::targets::{CsvFileLoader, DirectoryLister, TargetResolver, TargetSelection};

fn resolver(provider: MockRoleProvider) -> TargetResolver {
    TargetResolver::new(DirectoryLister::new(Arc::new(provider)), Box::new(CsvFileLoader))
}

fn page(prefix: &str, count: usize) -> Vec<String> {
    (0..count).map(|i| format!("{prefix}-{i}")).collect()
}

#[tokio::test]
async fn test_csv_with_duplicates_and_mixed_case() {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "OrgA").unwrap();
    writeln!(file, "orga, OrgB").unwrap();

    let orgs = resolver(MockRoleProvider::new())
        .resolve(&TargetSelection::Csv(file.path().to_path_buf()), |_| {})
        .await
        .unwrap();

    assert_eq!(orgs, vec!["orga", "orgb"]);
}

#[tokio::test]
async fn test_missing_csv_is_fatal() {
    let err = resolver(MockRoleProvider::new())
        .resolve(&TargetSelection::Csv("/nonexistent/orgs.csv".into()), |_| {})
        .await
        .unwrap_err();

    assert!(matches!(err, Error::ListLoad { .. }));
}

#[tokio::test]
async fn test_blank_csv_is_empty_target_list() {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, " , ").unwrap();

    let err = resolver(MockRoleProvider::new())
        .resolve(&TargetSelection::Csv(file.path().to_path_buf()), |_| {})
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Config(ConfigError::EmptyTargetList)));
}

#[tokio::test]
async fn test_enterprise_discovery_across_pages() {
    let provider = MockRoleProvider::new().with_directory(
        "acme-ent",
        vec![page("a", 100), page("b", 100), page("c", 37)],
    );

    let mut seen = Vec::new();
    let orgs = resolver(provider)
        .resolve(
            &TargetSelection::AllOrgs {
                enterprise: "acme-ent".into(),
            },
            |n| seen.push(n),
        )
        .await
        .unwrap();

    assert_eq!(orgs.len(), 237);
    assert_eq!(seen, vec![100, 200, 237]);
}
