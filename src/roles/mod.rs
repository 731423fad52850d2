//! Custom repository role definitions.
//!
//! A [`RoleDefinition`] is built once per run, after the permission names
//! have been checked against the live catalog, and is read-only afterwards.

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::api::{ApiError, FineGrainedPermission, RoleProvider};
use crate::error::{ConfigError, Error};

/// Predefined permission tier a custom role extends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BaseRole {
    Read,
    Triage,
    Write,
    Maintain,
}

impl BaseRole {
    /// All base roles in escalating order
    pub fn all() -> &'static [BaseRole] {
        &[
            BaseRole::Read,
            BaseRole::Triage,
            BaseRole::Write,
            BaseRole::Maintain,
        ]
    }

    /// API value for this base role
    pub fn as_str(&self) -> &'static str {
        match self {
            BaseRole::Read => "read",
            BaseRole::Triage => "triage",
            BaseRole::Write => "write",
            BaseRole::Maintain => "maintain",
        }
    }
}

impl fmt::Display for BaseRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BaseRole {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase();
        BaseRole::all()
            .iter()
            .copied()
            .find(|role| role.as_str() == normalized)
            .ok_or(ConfigError::InvalidBaseRole(normalized))
    }
}

/// Fully specified custom role, ready to be created in any organization
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RoleDefinition {
    pub name: String,
    pub description: Option<String>,
    pub base_role: BaseRole,
    pub permissions: Vec<String>,
}

impl RoleDefinition {
    /// Build a role definition.
    ///
    /// The name is trimmed and must not be blank. A blank description is
    /// dropped. Permissions must already be validated; duplicates are removed
    /// keeping the first occurrence.
    pub fn new(
        name: &str,
        description: Option<&str>,
        base_role: BaseRole,
        permissions: Vec<String>,
    ) -> Result<Self, ConfigError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(ConfigError::EmptyRoleName);
        }

        let permissions = unique_strings(permissions);
        if permissions.is_empty() {
            return Err(ConfigError::PermissionsRequired);
        }

        let description = description
            .filter(|d| !d.trim().is_empty())
            .map(str::to_string);

        Ok(Self {
            name: name.to_string(),
            description,
            base_role,
            permissions,
        })
    }
}

/// Validate a comma-separated permission list against the catalog.
///
/// Blank items are ignored; the result keeps selection order with duplicates
/// removed.
pub fn resolve_permissions(
    requested: &str,
    catalog: &[FineGrainedPermission],
    org: &str,
) -> Result<Vec<String>, ConfigError> {
    if catalog.is_empty() {
        return Err(ConfigError::NoPermissionsAvailable(org.to_string()));
    }

    let known: HashSet<&str> = catalog.iter().map(|p| p.name.as_str()).collect();

    let mut selected = Vec::new();
    for item in requested.split(',') {
        let name = item.trim();
        if name.is_empty() {
            continue;
        }
        if !known.contains(name) {
            return Err(ConfigError::UnknownPermission(name.to_string()));
        }
        selected.push(name.to_string());
    }

    if selected.is_empty() {
        return Err(ConfigError::PermissionsRequired);
    }
    Ok(unique_strings(selected))
}

/// Build the run's role definition, validating `requested_permissions`
/// against the catalog of `org`.
///
/// The name is checked before any remote call. A failing catalog request is
/// fatal.
pub async fn prepare_role(
    provider: &dyn RoleProvider,
    org: &str,
    name: &str,
    description: Option<&str>,
    base_role: BaseRole,
    requested_permissions: &str,
) -> crate::error::Result<RoleDefinition> {
    if name.trim().is_empty() {
        return Err(ConfigError::EmptyRoleName.into());
    }
    if requested_permissions.split(',').all(|p| p.trim().is_empty()) {
        return Err(ConfigError::PermissionsRequired.into());
    }

    let catalog = provider
        .list_fine_grained_permissions(org)
        .await
        .map_err(|source| Error::PermissionCatalog {
            org: org.to_string(),
            source,
        })?;
    let permissions = resolve_permissions(requested_permissions, &catalog, org)?;
    Ok(RoleDefinition::new(name, description, base_role, permissions)?)
}

/// Check whether `org` already has a custom role called `role_name`.
///
/// Names are compared trimmed and case-insensitively; partial matches don't
/// count. A missing organization surfaces as an error for which
/// [`ApiError::is_not_found`] holds.
pub async fn role_exists(
    provider: &dyn RoleProvider,
    org: &str,
    role_name: &str,
) -> Result<bool, ApiError> {
    let wanted = role_name.trim().to_lowercase();
    let existing = provider.list_custom_role_names(org).await?;
    Ok(existing
        .iter()
        .any(|name| name.trim().to_lowercase() == wanted))
}

fn unique_strings(values: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    values
        .into_iter()
        .filter(|v| !v.is_empty() && seen.insert(v.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::MockRoleProvider;

    fn catalog() -> Vec<FineGrainedPermission> {
        ["read_code", "write_code", "add_label", "remove_label"]
            .iter()
            .map(|name| FineGrainedPermission {
                name: (*name).to_string(),
                description: format!("Allows {name}"),
            })
            .collect()
    }

    #[test]
    fn test_base_role_parse() {
        assert_eq!("read".parse::<BaseRole>().unwrap(), BaseRole::Read);
        assert_eq!("  Maintain ".parse::<BaseRole>().unwrap(), BaseRole::Maintain);
        assert_eq!(
            "admin".parse::<BaseRole>(),
            Err(ConfigError::InvalidBaseRole("admin".to_string()))
        );
        assert_eq!(BaseRole::Triage.to_string(), "triage");
    }

    #[test]
    fn test_role_definition_rejects_blank_name() {
        let err = RoleDefinition::new("   ", None, BaseRole::Read, vec!["read_code".into()]);
        assert_eq!(err, Err(ConfigError::EmptyRoleName));
    }

    #[test]
    fn test_role_definition_drops_blank_description() {
        let role = RoleDefinition::new(
            " Security ",
            Some("  "),
            BaseRole::Write,
            vec!["add_label".into(), "add_label".into(), "read_code".into()],
        )
        .unwrap();
        assert_eq!(role.name, "Security");
        assert_eq!(role.description, None);
        assert_eq!(role.permissions, vec!["add_label", "read_code"]);
    }

    #[test]
    fn test_resolve_permissions_keeps_selection_order() {
        let selected =
            resolve_permissions(" write_code, read_code,,write_code ", &catalog(), "acme").unwrap();
        assert_eq!(selected, vec!["write_code", "read_code"]);
    }

    #[test]
    fn test_resolve_permissions_unknown_fails_fast() {
        let err = resolve_permissions("read_code,bogus_permission", &catalog(), "acme");
        assert_eq!(
            err,
            Err(ConfigError::UnknownPermission("bogus_permission".to_string()))
        );
    }

    #[test]
    fn test_resolve_permissions_empty_inputs() {
        assert_eq!(
            resolve_permissions(" , ", &catalog(), "acme"),
            Err(ConfigError::PermissionsRequired)
        );
        assert_eq!(
            resolve_permissions("read_code", &[], "acme"),
            Err(ConfigError::NoPermissionsAvailable("acme".to_string()))
        );
    }

    #[tokio::test]
    async fn test_role_exists_is_case_insensitive() {
        let provider = MockRoleProvider::new().with_org_roles("acme", &["Security Auditor"]);

        assert!(role_exists(&provider, "acme", "security auditor").await.unwrap());
        assert!(role_exists(&provider, "acme", "  SECURITY AUDITOR ").await.unwrap());
        assert!(!role_exists(&provider, "acme", "Security").await.unwrap());
    }

    #[tokio::test]
    async fn test_prepare_role_checks_catalog_of_first_org() {
        let provider = MockRoleProvider::new()
            .with_org("acme")
            .with_permissions(&["read_code", "write_code"]);

        let role = prepare_role(&provider, "acme", "Auditor", Some(""), BaseRole::Read, "read_code")
            .await
            .unwrap();
        assert_eq!(role.permissions, vec!["read_code"]);
        assert_eq!(role.description, None);

        let err = prepare_role(
            &provider,
            "acme",
            "Auditor",
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
    }

    #[tokio::test]
    async fn test_prepare_role_validates_before_remote_calls() {
        let provider = MockRoleProvider::new().with_org("acme");

        let err = prepare_role(&provider, "acme", " ", None, BaseRole::Read, "read_code")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Config(ConfigError::EmptyRoleName)));

        let err = prepare_role(&provider, "acme", "Auditor", None, BaseRole::Read, " ")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Config(ConfigError::PermissionsRequired)));
        assert!(provider.calls().is_empty());
    }

    #[tokio::test]
    async fn test_prepare_role_catalog_failure_is_fatal() {
        let provider = MockRoleProvider::new();
        let err = prepare_role(&provider, "ghost", "Auditor", None, BaseRole::Read, "read_code")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::PermissionCatalog { ref org, .. } if org == "ghost"));
    }

    #[tokio::test]
    async fn test_role_exists_missing_org() {
        let provider = MockRoleProvider::new();
        let err = role_exists(&provider, "ghost", "Security").await.unwrap_err();
        assert!(err.is_not_found());
    }
}
