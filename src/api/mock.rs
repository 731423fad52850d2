//! In-memory [`RoleProvider`] for tests.
//!
//! Organizations, their roles and the enterprise directory live in memory.
//! Roles created through the mock persist, so a second run against the same
//! instance sees them. Every call is recorded in a command log.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;

use super::{ApiError, FineGrainedPermission, OrgPage, RoleProvider, ServerMeta};
use crate::roles::RoleDefinition;

const PROVIDER_NAME: &str = "mock";

/// A call received by the mock, in arrival order
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockCall {
    ListPermissions {
        org: String,
    },
    ListRoles {
        org: String,
    },
    CreateRole {
        org: String,
        name: String,
    },
    ListOrganizations {
        enterprise: String,
        cursor: Option<String>,
        page_size: usize,
    },
    FetchMeta,
}

/// Mock implementation for testing
#[derive(Default)]
pub struct MockRoleProvider {
    /// Existing organizations and the custom role names defined in each
    orgs: Arc<Mutex<HashMap<String, Vec<String>>>>,
    permissions: Vec<FineGrainedPermission>,
    lookup_failures: HashMap<String, ApiError>,
    create_failures: HashMap<String, ApiError>,
    panics_on: HashSet<String>,
    directory: HashMap<String, Vec<OrgPage>>,
    directory_failures: HashMap<String, (usize, ApiError)>,
    meta: ServerMeta,
    latency: Option<Duration>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    /// Log of calls received
    pub command_log: Arc<Mutex<Vec<MockCall>>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl MockRoleProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an existing organization with no custom roles
    pub fn with_org(self, org: &str) -> Self {
        self.with_org_roles(org, &[])
    }

    /// Register an existing organization with the given custom roles
    pub fn with_org_roles(self, org: &str, roles: &[&str]) -> Self {
        lock(&self.orgs).insert(
            org.to_string(),
            roles.iter().map(|r| (*r).to_string()).collect(),
        );
        self
    }

    /// Set the permission catalog returned for every organization
    pub fn with_permissions(mut self, names: &[&str]) -> Self {
        self.permissions = names
            .iter()
            .map(|name| FineGrainedPermission {
                name: (*name).to_string(),
                description: String::new(),
            })
            .collect();
        self
    }

    /// Make the role lookup for `org` fail with `error`
    pub fn with_lookup_failure(mut self, org: &str, error: ApiError) -> Self {
        self.lookup_failures.insert(org.to_string(), error);
        self
    }

    /// Make role creation in `org` fail with `error`
    pub fn with_create_failure(mut self, org: &str, error: ApiError) -> Self {
        self.create_failures.insert(org.to_string(), error);
        self
    }

    /// Panic inside the role lookup for `org`
    pub fn with_panic(mut self, org: &str) -> Self {
        self.panics_on.insert(org.to_string());
        self
    }

    /// Serve `pages` of organization logins for `enterprise`
    pub fn with_directory(mut self, enterprise: &str, pages: Vec<Vec<String>>) -> Self {
        let last = pages.len().saturating_sub(1);
        let pages = pages
            .into_iter()
            .enumerate()
            .map(|(index, names)| OrgPage {
                names,
                has_next_page: index < last,
                end_cursor: (index < last).then(|| format!("cursor-{}", index + 1)),
            })
            .collect();
        self.directory.insert(enterprise.to_string(), pages);
        self
    }

    /// Fail the directory request for page `page_index` of `enterprise`
    pub fn with_directory_failure(
        mut self,
        enterprise: &str,
        page_index: usize,
        error: ApiError,
    ) -> Self {
        self.directory_failures
            .insert(enterprise.to_string(), (page_index, error));
        self
    }

    /// Set the server metadata
    pub fn with_meta(mut self, meta: ServerMeta) -> Self {
        self.meta = meta;
        self
    }

    /// Delay every role lookup and creation by `latency`
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Get all recorded calls
    pub fn calls(&self) -> Vec<MockCall> {
        lock(&self.command_log).clone()
    }

    /// Number of create calls received
    pub fn create_calls(&self) -> usize {
        self.calls()
            .iter()
            .filter(|call| matches!(call, MockCall::CreateRole { .. }))
            .count()
    }

    /// Custom role names currently defined in `org`
    pub fn roles_in(&self, org: &str) -> Vec<String> {
        lock(&self.orgs).get(org).cloned().unwrap_or_default()
    }

    /// Highest number of role calls observed in flight at once
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn log(&self, call: MockCall) {
        lock(&self.command_log).push(call);
    }

    async fn simulate_latency(&self) {
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }

    fn org_not_found(org: &str) -> ApiError {
        ApiError::not_found(PROVIDER_NAME, format!("orgs/{org}"))
    }
}

#[async_trait]
impl RoleProvider for MockRoleProvider {
    async fn list_fine_grained_permissions(
        &self,
        org: &str,
    ) -> Result<Vec<FineGrainedPermission>, ApiError> {
        self.log(MockCall::ListPermissions {
            org: org.to_string(),
        });
        if !lock(&self.orgs).contains_key(org) {
            return Err(Self::org_not_found(org));
        }
        Ok(self.permissions.clone())
    }

    async fn list_custom_role_names(&self, org: &str) -> Result<Vec<String>, ApiError> {
        self.log(MockCall::ListRoles {
            org: org.to_string(),
        });
        if self.panics_on.contains(org) {
            panic!("mock role lookup panicked for {org}");
        }
        self.simulate_latency().await;

        if let Some(err) = self.lookup_failures.get(org) {
            return Err(err.clone());
        }
        lock(&self.orgs)
            .get(org)
            .cloned()
            .ok_or_else(|| Self::org_not_found(org))
    }

    async fn create_custom_role(&self, org: &str, role: &RoleDefinition) -> Result<(), ApiError> {
        self.log(MockCall::CreateRole {
            org: org.to_string(),
            name: role.name.clone(),
        });
        self.simulate_latency().await;

        if let Some(err) = self.create_failures.get(org) {
            return Err(err.clone());
        }
        let mut orgs = lock(&self.orgs);
        let roles = orgs.get_mut(org).ok_or_else(|| Self::org_not_found(org))?;
        if roles.iter().any(|r| r.eq_ignore_ascii_case(&role.name)) {
            return Err(ApiError::http(
                PROVIDER_NAME,
                422,
                format!("role {} already exists", role.name),
            ));
        }
        roles.push(role.name.clone());
        Ok(())
    }

    async fn list_enterprise_organizations(
        &self,
        enterprise: &str,
        cursor: Option<&str>,
        page_size: usize,
    ) -> Result<OrgPage, ApiError> {
        self.log(MockCall::ListOrganizations {
            enterprise: enterprise.to_string(),
            cursor: cursor.map(str::to_string),
            page_size,
        });

        let index = match cursor {
            None => 0,
            Some(c) => c
                .strip_prefix("cursor-")
                .and_then(|n| n.parse::<usize>().ok())
                .ok_or_else(|| {
                    ApiError::invalid_response(PROVIDER_NAME, format!("bad cursor {c}"))
                })?,
        };

        if let Some((failing, err)) = self.directory_failures.get(enterprise) {
            if *failing == index {
                return Err(err.clone());
            }
        }

        let pages = self
            .directory
            .get(enterprise)
            .ok_or_else(|| ApiError::not_found(PROVIDER_NAME, format!("enterprise {enterprise}")))?;
        let mut page = pages.get(index).cloned().unwrap_or_default();
        page.names.truncate(page_size);
        Ok(page)
    }

    async fn fetch_meta(&self) -> Result<ServerMeta, ApiError> {
        self.log(MockCall::FetchMeta);
        Ok(self.meta.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::roles::BaseRole;

    fn role(name: &str) -> RoleDefinition {
        RoleDefinition::new(name, None, BaseRole::Read, vec!["read_code".into()]).unwrap()
    }

    #[tokio::test]
    async fn test_mock_create_persists() {
        let mock = MockRoleProvider::new().with_org("acme");
        mock.create_custom_role("acme", &role("Auditor")).await.unwrap();

        assert_eq!(mock.roles_in("acme"), vec!["Auditor"]);
        assert_eq!(mock.create_calls(), 1);
        assert_eq!(
            mock.list_custom_role_names("acme").await.unwrap(),
            vec!["Auditor"]
        );
    }

    #[tokio::test]
    async fn test_mock_unknown_org_is_not_found() {
        let mock = MockRoleProvider::new();
        let err = mock.create_custom_role("ghost", &role("Auditor")).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_mock_directory_pages() {
        let mock = MockRoleProvider::new().with_directory(
            "acme",
            vec![vec!["a".into(), "b".into()], vec!["c".into()]],
        );

        let first = mock.list_enterprise_organizations("acme", None, 100).await.unwrap();
        assert_eq!(first.names, vec!["a", "b"]);
        assert!(first.has_next_page);
        assert_eq!(first.end_cursor.as_deref(), Some("cursor-1"));

        let second = mock
            .list_enterprise_organizations("acme", Some("cursor-1"), 100)
            .await
            .unwrap();
        assert_eq!(second.names, vec!["c"]);
        assert!(!second.has_next_page);
        assert_eq!(second.end_cursor, None);
    }
}
