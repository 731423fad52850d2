//! GitHub API provider implementation (REST for roles, GraphQL for enterprise
//! organizations)

use async_trait::async_trait;
use reqwest::header::HeaderMap;
use reqwest::{Method, RequestBuilder, Response, Url};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use super::{ApiError, FineGrainedPermission, GhCli, OrgPage, RoleProvider, ServerMeta};
use crate::config::GitHubConfig;
use crate::error::Error;
use crate::preflight::parse_oauth_scopes;
use crate::roles::RoleDefinition;

const PROVIDER_NAME: &str = "github";
const DEFAULT_HOSTNAME: &str = "github.com";

/// Environment variables checked for a token, in order
const TOKEN_ENV_VARS: &[&str] = &["CUSTOM_ROLES_GITHUB_TOKEN", "GH_TOKEN", "GITHUB_TOKEN"];
const ENTERPRISE_TOKEN_ENV_VAR: &str = "GH_ENTERPRISE_TOKEN";

const ORGANIZATIONS_QUERY: &str = r"query($slug: String!, $first: Int!, $after: String) {
  enterprise(slug: $slug) {
    organizations(first: $first, after: $after) {
      nodes { login }
      pageInfo { hasNextPage endCursor }
    }
  }
}";

/// REST and GraphQL base URLs for a GitHub hostname.
///
/// - `github.com` uses `api.github.com`
/// - `*.ghe.com` (data residency) uses `api.<host>`
/// - anything else is treated as GitHub Enterprise Server
pub fn api_base_urls(hostname: &str) -> (String, String) {
    let host = hostname
        .trim()
        .trim_start_matches("https://")
        .trim_start_matches("http://")
        .trim_end_matches('/')
        .to_lowercase();

    if host.is_empty() || host == DEFAULT_HOSTNAME || host == "api.github.com" {
        (
            "https://api.github.com".to_string(),
            "https://api.github.com/graphql".to_string(),
        )
    } else if host.ends_with(".ghe.com") {
        let api = if host.starts_with("api.") {
            host
        } else {
            format!("api.{host}")
        };
        (format!("https://{api}"), format!("https://{api}/graphql"))
    } else {
        (
            format!("https://{host}/api/v3"),
            format!("https://{host}/api/graphql"),
        )
    }
}

/// Pick a token from the environment for `hostname`
fn token_from_env(hostname: &str, lookup: impl Fn(&str) -> Option<String>) -> Option<String> {
    let mut names: Vec<&str> = vec![TOKEN_ENV_VARS[0]];
    if !hostname.eq_ignore_ascii_case(DEFAULT_HOSTNAME) {
        names.push(ENTERPRISE_TOKEN_ENV_VAR);
    }
    names.extend_from_slice(&TOKEN_ENV_VARS[1..]);

    names
        .into_iter()
        .filter_map(|name| lookup(name))
        .map(|token| token.trim().to_string())
        .find(|token| !token.is_empty())
}

/// GitHub API client
pub struct GitHubClient {
    token: String,
    client: reqwest::Client,
    rest_base: String,
    graphql_url: String,
    api_version: String,
}

// Response types for API deserialization
#[derive(Debug, Deserialize)]
struct CustomRolesResponse {
    #[serde(default)]
    custom_roles: Vec<CustomRoleResponse>,
}

#[derive(Debug, Deserialize)]
struct CustomRoleResponse {
    name: String,
}

#[derive(Debug, Deserialize)]
struct MetaResponse {
    installed_version: Option<String>,
}

#[derive(Debug, Serialize)]
struct CreateRoleRequest<'a> {
    name: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<&'a str>,
    base_role: &'a str,
    permissions: &'a [String],
}

impl<'a> From<&'a RoleDefinition> for CreateRoleRequest<'a> {
    fn from(role: &'a RoleDefinition) -> Self {
        Self {
            name: &role.name,
            description: role
                .description
                .as_deref()
                .filter(|d| !d.trim().is_empty()),
            base_role: role.base_role.as_str(),
            permissions: &role.permissions,
        }
    }
}

#[derive(Serialize)]
struct GraphQLRequest<'a> {
    query: &'a str,
    variables: serde_json::Value,
}

#[derive(Deserialize)]
struct GraphQLResponse<T> {
    data: Option<T>,
    errors: Option<Vec<GraphQLError>>,
}

#[derive(Deserialize)]
struct GraphQLError {
    message: String,
    #[serde(rename = "type")]
    kind: Option<String>,
}

#[derive(Debug, Deserialize)]
struct EnterpriseData {
    enterprise: Option<EnterpriseNode>,
}

#[derive(Debug, Deserialize)]
struct EnterpriseNode {
    organizations: OrganizationConnection,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OrganizationConnection {
    #[serde(default)]
    nodes: Vec<Option<OrganizationNode>>,
    page_info: PageInfo,
}

#[derive(Debug, Deserialize)]
struct OrganizationNode {
    login: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PageInfo {
    has_next_page: bool,
    end_cursor: Option<String>,
}

impl GitHubClient {
    /// Create a new GitHub client for the configured hostname
    pub fn new(token: impl Into<String>, settings: &GitHubConfig) -> Result<Self, ApiError> {
        let client = reqwest::Client::builder()
            .user_agent(settings.user_agent.clone())
            .build()
            .map_err(|e| ApiError::network(PROVIDER_NAME, e.to_string()))?;

        let (rest_base, graphql_url) = api_base_urls(&settings.hostname);

        Ok(Self {
            token: token.into(),
            client,
            rest_base,
            graphql_url,
            api_version: settings.api_version.clone(),
        })
    }

    /// Create a client using a token from the environment, falling back to the
    /// credentials stored by `gh auth login`
    pub async fn from_env(settings: &GitHubConfig) -> Result<Self, Error> {
        let hostname = settings.hostname.as_str();
        let token = match token_from_env(hostname, |name| std::env::var(name).ok()) {
            Some(token) => token,
            None => GhCli::auth_token(hostname)
                .await
                .map_err(|e| Error::Auth {
                    hostname: hostname.to_string(),
                    message: format!(
                        "{e}. Set CUSTOM_ROLES_GITHUB_TOKEN or GH_TOKEN, or run: gh auth login -h {hostname}"
                    ),
                })?,
        };

        Self::new(token, settings).map_err(|e| Error::Auth {
            hostname: hostname.to_string(),
            message: e.to_string(),
        })
    }

    /// Create a client against explicit base URLs (for testing)
    #[cfg(test)]
    pub fn new_with_base_urls(
        token: impl Into<String>,
        rest_base: impl Into<String>,
        graphql_url: impl Into<String>,
    ) -> Result<Self, ApiError> {
        let mut client = Self::new(token, &GitHubConfig::default())?;
        client.rest_base = rest_base.into();
        client.graphql_url = graphql_url.into();
        Ok(client)
    }

    fn request(&self, method: Method, url: &str) -> RequestBuilder {
        self.client
            .request(method, url)
            .header("Accept", "application/vnd.github+json")
            .header("Authorization", format!("Bearer {}", self.token))
            .header("X-GitHub-Api-Version", &self.api_version)
    }

    /// Map a non-success response to an [`ApiError`]
    async fn check_status(response: Response, resource: &str) -> Result<Response, ApiError> {
        let status = response.status().as_u16();
        if (200..=299).contains(&status) {
            return Ok(response);
        }
        let headers = response.headers().clone();
        let body = response.text().await.unwrap_or_default();
        Err(status_error(status, &headers, &body, resource))
    }

    /// REST URL for `orgs/{org}/{resource}`, with the login always one
    /// percent-encoded path segment
    fn org_url(&self, org: &str, resource: &str) -> Result<Url, ApiError> {
        let invalid_base =
            || ApiError::invalid_response(PROVIDER_NAME, format!("bad API base URL {}", self.rest_base));

        let mut url = Url::parse(&self.rest_base).map_err(|_| invalid_base())?;
        url.path_segments_mut()
            .map_err(|()| invalid_base())?
            .pop_if_empty()
            .push("orgs")
            .push(org)
            .push(resource);
        Ok(url)
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url, path: &str) -> Result<T, ApiError> {
        let response = self
            .request(Method::GET, url.as_str())
            .send()
            .await
            .map_err(|e| ApiError::network(PROVIDER_NAME, e.to_string()))?;

        Self::check_status(response, path)
            .await?
            .json()
            .await
            .map_err(|e| ApiError::invalid_response(PROVIDER_NAME, e.to_string()))
    }

    /// Execute a GraphQL query
    async fn graphql<T: DeserializeOwned>(
        &self,
        query: &str,
        variables: serde_json::Value,
        resource: &str,
    ) -> Result<T, ApiError> {
        debug!(resource, "GitHub GraphQL query");

        let response = self
            .request(Method::POST, &self.graphql_url)
            .json(&GraphQLRequest { query, variables })
            .send()
            .await
            .map_err(|e| ApiError::network(PROVIDER_NAME, e.to_string()))?;

        let gql_response: GraphQLResponse<T> = Self::check_status(response, resource)
            .await?
            .json()
            .await
            .map_err(|e| ApiError::invalid_response(PROVIDER_NAME, format!("Parse error: {e}")))?;

        graphql_data(gql_response, resource)
    }
}

/// Translate an HTTP status into an [`ApiError`]
fn status_error(status: u16, headers: &HeaderMap, body: &str, resource: &str) -> ApiError {
    let retry_after = headers
        .get("retry-after")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok());
    let rate_limit_exhausted = headers
        .get("x-ratelimit-remaining")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.trim() == "0");

    match status {
        401 => ApiError::unauthorized(PROVIDER_NAME),
        403 if rate_limit_exhausted => ApiError::rate_limited(PROVIDER_NAME, retry_after),
        403 => ApiError::forbidden(PROVIDER_NAME, error_message(body)),
        404 => ApiError::not_found(PROVIDER_NAME, resource),
        429 => ApiError::rate_limited(PROVIDER_NAME, retry_after),
        status => ApiError::http(PROVIDER_NAME, status, error_message(body)),
    }
}

/// Pull the `message` field out of a GitHub error body, or fall back to the
/// raw text
fn error_message(body: &str) -> String {
    #[derive(Deserialize)]
    struct ErrorBody {
        message: String,
    }

    serde_json::from_str::<ErrorBody>(body)
        .map(|b| b.message)
        .unwrap_or_else(|_| body.trim().to_string())
}

fn graphql_data<T>(response: GraphQLResponse<T>, resource: &str) -> Result<T, ApiError> {
    if let Some(errors) = response.errors.filter(|e| !e.is_empty()) {
        let messages: Vec<String> = errors.iter().map(|e| e.message.clone()).collect();
        let joined = messages.join("; ");
        if errors
            .iter()
            .any(|e| e.kind.as_deref() == Some("NOT_FOUND"))
        {
            return Err(ApiError::not_found(
                PROVIDER_NAME,
                format!("{resource}: {joined}"),
            ));
        }
        return Err(ApiError::invalid_response(PROVIDER_NAME, joined));
    }

    response
        .data
        .ok_or_else(|| ApiError::invalid_response(PROVIDER_NAME, "No data in response"))
}

fn org_page(data: EnterpriseData, enterprise: &str) -> Result<OrgPage, ApiError> {
    let enterprise_node = data
        .enterprise
        .ok_or_else(|| ApiError::not_found(PROVIDER_NAME, format!("enterprise {enterprise}")))?;
    let connection = enterprise_node.organizations;

    Ok(OrgPage {
        names: connection
            .nodes
            .into_iter()
            .flatten()
            .map(|node| node.login)
            .collect(),
        has_next_page: connection.page_info.has_next_page,
        end_cursor: connection.page_info.end_cursor,
    })
}

#[async_trait]
impl RoleProvider for GitHubClient {
    #[instrument(skip(self))]
    async fn list_fine_grained_permissions(
        &self,
        org: &str,
    ) -> Result<Vec<FineGrainedPermission>, ApiError> {
        let resource = "repository-fine-grained-permissions";
        let url = self.org_url(org, resource)?;
        self.get_json(url, &format!("orgs/{org}/{resource}")).await
    }

    #[instrument(skip(self))]
    async fn list_custom_role_names(&self, org: &str) -> Result<Vec<String>, ApiError> {
        let response: CustomRolesResponse = self
            .get_json(
                self.org_url(org, "custom-repository-roles")?,
                &format!("orgs/{org}/custom-repository-roles"),
            )
            .await?;
        Ok(response.custom_roles.into_iter().map(|r| r.name).collect())
    }

    #[instrument(skip(self, role), fields(role = %role.name))]
    async fn create_custom_role(&self, org: &str, role: &RoleDefinition) -> Result<(), ApiError> {
        let path = format!("orgs/{org}/custom-repository-roles");
        let url = self.org_url(org, "custom-repository-roles")?;

        let response = self
            .request(Method::POST, url.as_str())
            .json(&CreateRoleRequest::from(role))
            .send()
            .await
            .map_err(|e| ApiError::network(PROVIDER_NAME, e.to_string()))?;

        Self::check_status(response, &path).await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn list_enterprise_organizations(
        &self,
        enterprise: &str,
        cursor: Option<&str>,
        page_size: usize,
    ) -> Result<OrgPage, ApiError> {
        let variables = serde_json::json!({
            "slug": enterprise,
            "first": page_size,
            "after": cursor,
        });
        let resource = format!("enterprise {enterprise}");
        let data: EnterpriseData = self
            .graphql(ORGANIZATIONS_QUERY, variables, &resource)
            .await?;
        org_page(data, enterprise)
    }

    #[instrument(skip(self))]
    async fn fetch_meta(&self) -> Result<ServerMeta, ApiError> {
        let url = format!("{}/meta", self.rest_base);
        let response = self
            .request(Method::GET, &url)
            .send()
            .await
            .map_err(|e| ApiError::network(PROVIDER_NAME, e.to_string()))?;
        let response = Self::check_status(response, "meta").await?;

        let oauth_scopes = response
            .headers()
            .get("x-oauth-scopes")
            .and_then(|v| v.to_str().ok())
            .map(parse_oauth_scopes);

        let meta: MetaResponse = response
            .json()
            .await
            .map_err(|e| ApiError::invalid_response(PROVIDER_NAME, e.to_string()))?;

        Ok(ServerMeta {
            installed_version: meta
                .installed_version
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty()),
            oauth_scopes,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::roles::BaseRole;
    use reqwest::header::HeaderValue;

    #[test]
    fn test_api_base_urls() {
        assert_eq!(
            api_base_urls("github.com"),
            (
                "https://api.github.com".to_string(),
                "https://api.github.com/graphql".to_string()
            )
        );
        assert_eq!(
            api_base_urls("GHES.example.com/"),
            (
                "https://ghes.example.com/api/v3".to_string(),
                "https://ghes.example.com/api/graphql".to_string()
            )
        );
        assert_eq!(
            api_base_urls("octo.ghe.com").0,
            "https://api.octo.ghe.com".to_string()
        );
    }

    #[test]
    fn test_token_from_env_order() {
        let lookup = |name: &str| match name {
            "GH_TOKEN" => Some("gh-token".to_string()),
            "GH_ENTERPRISE_TOKEN" => Some("enterprise-token".to_string()),
            "CUSTOM_ROLES_GITHUB_TOKEN" => Some("   ".to_string()),
            _ => None,
        };
        assert_eq!(token_from_env("github.com", lookup).as_deref(), Some("gh-token"));
        assert_eq!(
            token_from_env("ghes.example.com", lookup).as_deref(),
            Some("enterprise-token")
        );
        assert_eq!(token_from_env("github.com", |_| None), None);
    }

    #[test]
    fn test_create_request_omits_blank_description() {
        let role = RoleDefinition::new(
            "Auditor",
            None,
            BaseRole::Triage,
            vec!["read_code".into(), "add_label".into()],
        )
        .unwrap();
        let json = serde_json::to_value(CreateRoleRequest::from(&role)).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "name": "Auditor",
                "base_role": "triage",
                "permissions": ["read_code", "add_label"],
            })
        );

        let described = RoleDefinition {
            description: Some("Reads code".to_string()),
            ..role
        };
        let json = serde_json::to_value(CreateRoleRequest::from(&described)).unwrap();
        assert_eq!(json["description"], "Reads code");
    }

    #[test]
    fn test_status_error_mapping() {
        let empty = HeaderMap::new();
        assert!(status_error(404, &empty, "", "orgs/acme/custom-repository-roles").is_not_found());
        assert_eq!(
            status_error(401, &empty, "", "meta"),
            ApiError::unauthorized(PROVIDER_NAME)
        );
        assert_eq!(
            status_error(422, &empty, r#"{"message":"Validation Failed"}"#, "x"),
            ApiError::http(PROVIDER_NAME, 422, "Validation Failed")
        );

        let mut limited = HeaderMap::new();
        limited.insert("x-ratelimit-remaining", HeaderValue::from_static("0"));
        limited.insert("retry-after", HeaderValue::from_static("60"));
        assert_eq!(
            status_error(403, &limited, "", "x"),
            ApiError::rate_limited(PROVIDER_NAME, Some(60))
        );
        assert_eq!(
            status_error(403, &empty, r#"{"message":"Must have admin rights"}"#, "x"),
            ApiError::forbidden(PROVIDER_NAME, "Must have admin rights")
        );
    }

    #[test]
    fn test_org_page_parsing() {
        let body = r#"{
            "data": {
                "enterprise": {
                    "organizations": {
                        "nodes": [{"login": "Acme-One"}, null, {"login": "acme-two"}],
                        "pageInfo": {"hasNextPage": true, "endCursor": "Y3Vyc29y"}
                    }
                }
            }
        }"#;
        let response: GraphQLResponse<EnterpriseData> = serde_json::from_str(body).unwrap();
        let page = org_page(graphql_data(response, "enterprise acme").unwrap(), "acme").unwrap();

        assert_eq!(page.names, vec!["Acme-One", "acme-two"]);
        assert!(page.has_next_page);
        assert_eq!(page.end_cursor.as_deref(), Some("Y3Vyc29y"));
    }

    #[test]
    fn test_graphql_not_found() {
        let body = r#"{
            "data": {"enterprise": null},
            "errors": [{"type": "NOT_FOUND", "message": "Could not resolve to an Enterprise with the slug 'nope'."}]
        }"#;
        let response: GraphQLResponse<EnterpriseData> = serde_json::from_str(body).unwrap();
        let err = graphql_data(response, "enterprise nope").unwrap_err();
        assert!(err.is_not_found());

        let data = EnterpriseData { enterprise: None };
        assert!(org_page(data, "nope").unwrap_err().is_not_found());
    }

    #[test]
    fn test_custom_roles_response() {
        let body = r#"{"total_count": 2, "custom_roles": [{"id": 1, "name": "Auditor"}, {"id": 2, "name": "Triager"}]}"#;
        let response: CustomRolesResponse = serde_json::from_str(body).unwrap();
        let names: Vec<String> = response.custom_roles.into_iter().map(|r| r.name).collect();
        assert_eq!(names, vec!["Auditor", "Triager"]);

        let empty: CustomRolesResponse = serde_json::from_str(r#"{"total_count": 0}"#).unwrap();
        assert!(empty.custom_roles.is_empty());
    }

    #[test]
    fn test_client_construction() {
        let client =
            GitHubClient::new_with_base_urls("token", "http://localhost:1", "http://localhost:1/graphql")
                .unwrap();
        assert_eq!(client.rest_base, "http://localhost:1");
    }

    #[test]
    fn test_org_url_keeps_login_in_one_segment() {
        let client = GitHubClient::new_with_base_urls(
            "token",
            "https://ghes.example.com/api/v3",
            "https://ghes.example.com/api/graphql",
        )
        .unwrap();

        let url = client.org_url("acme", "custom-repository-roles").unwrap();
        assert_eq!(
            url.as_str(),
            "https://ghes.example.com/api/v3/orgs/acme/custom-repository-roles"
        );

        let url = client.org_url("x/../../../user", "custom-repository-roles").unwrap();
        assert_eq!(url.path_segments().unwrap().count(), 5);
        assert!(url.path().starts_with("/api/v3/orgs/x%2F..%2F"));
        assert!(url.path().ends_with("/custom-repository-roles"));

        let url = client.org_url("victim#typo", "custom-repository-roles").unwrap();
        assert_eq!(url.fragment(), None);
        assert_eq!(
            url.path(),
            "/api/v3/orgs/victim%23typo/custom-repository-roles"
        );
    }

    #[test]
    fn test_org_url_on_bare_host() {
        let client =
            GitHubClient::new_with_base_urls("token", "https://api.github.com", "https://api.github.com/graphql")
                .unwrap();
        let url = client
            .org_url("acme", "repository-fine-grained-permissions")
            .unwrap();
        assert_eq!(
            url.as_str(),
            "https://api.github.com/orgs/acme/repository-fine-grained-permissions"
        );
    }
}
