//! GitHub API access for custom role management
//!
//! This module provides:
//! - The [`RoleProvider`] trait, the only seam the resolver and batch engine
//!   talk to
//! - [`GitHubClient`], the REST + GraphQL implementation
//! - [`MockRoleProvider`], an in-memory implementation for tests
//! - Error handling with not-found detection

pub mod error;
mod gh_cli;
mod github;
mod mock;

pub use error::ApiError;
pub use gh_cli::GhCli;
pub use github::{api_base_urls, GitHubClient};
pub use mock::{MockCall, MockRoleProvider};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::roles::RoleDefinition;

/// One grantable capability from an organization's permission catalog
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FineGrainedPermission {
    pub name: String,
    #[serde(default)]
    pub description: String,
}

/// One page of enterprise organizations
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrgPage {
    /// Organization logins as returned by the API (not normalized)
    pub names: Vec<String>,
    /// Whether another page follows this one
    pub has_next_page: bool,
    /// Opaque cursor for the next page
    pub end_cursor: Option<String>,
}

/// Server metadata used for environment checks
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServerMeta {
    /// GHES version; `None` on github.com
    pub installed_version: Option<String>,
    /// Scopes from `X-OAuth-Scopes`; `None` when the header is absent
    pub oauth_scopes: Option<Vec<String>>,
}

/// Remote operations needed to create custom roles across organizations
#[async_trait]
pub trait RoleProvider: Send + Sync {
    /// List the fine-grained permissions available to custom roles in `org`
    async fn list_fine_grained_permissions(
        &self,
        org: &str,
    ) -> Result<Vec<FineGrainedPermission>, ApiError>;

    /// List the names of the custom repository roles defined in `org`
    async fn list_custom_role_names(&self, org: &str) -> Result<Vec<String>, ApiError>;

    /// Create a custom repository role in `org`. Does not check for an
    /// existing role first.
    async fn create_custom_role(&self, org: &str, role: &RoleDefinition) -> Result<(), ApiError>;

    /// Fetch one page of organizations belonging to `enterprise`
    async fn list_enterprise_organizations(
        &self,
        enterprise: &str,
        cursor: Option<&str>,
        page_size: usize,
    ) -> Result<OrgPage, ApiError>;

    /// Fetch server version and token scope information
    async fn fetch_meta(&self) -> Result<ServerMeta, ApiError>;
}
