//! Environment checks run before any organization is touched.
//!
//! Old GitHub Enterprise Server versions only produce a warning; a token
//! without the scopes the run needs is fatal.

use tracing::debug;

use crate::api::ServerMeta;
use crate::error::ConfigError;

/// First GHES release with the custom repository roles API we rely on
pub const MIN_GHES_VERSION: &str = "3.15.0";

const ADMIN_ORG_SCOPE: &str = "admin:org";
const READ_ENTERPRISE_SCOPE: &str = "read:enterprise";

/// Validate server metadata for a run.
///
/// Returns warnings to show the user; fails when a required OAuth scope is
/// missing. Scope checks are skipped when the server did not report scopes
/// (fine-grained tokens and GitHub Apps have none).
pub fn check_environment(
    meta: &ServerMeta,
    hostname: &str,
    targeting_all_orgs: bool,
) -> Result<Vec<String>, ConfigError> {
    let mut warnings = Vec::new();

    if let Some(version) = meta.installed_version.as_deref() {
        if is_version_below(version, MIN_GHES_VERSION) {
            warnings.push(format!(
                "GitHub Enterprise Server version {version} is below {MIN_GHES_VERSION}. Some features may not be supported."
            ));
        }
    }

    let Some(scopes) = meta.oauth_scopes.as_deref() else {
        debug!(hostname, "No OAuth scopes reported, skipping scope checks");
        return Ok(warnings);
    };

    let mut required = vec![ADMIN_ORG_SCOPE];
    if targeting_all_orgs {
        required.push(READ_ENTERPRISE_SCOPE);
    }
    for scope in required {
        if !has_scope(scopes, scope) {
            return Err(ConfigError::MissingScope {
                scope: scope.to_string(),
                hostname: hostname.to_string(),
            });
        }
    }

    Ok(warnings)
}

/// Split an `X-OAuth-Scopes` header value into scopes
pub fn parse_oauth_scopes(header: &str) -> Vec<String> {
    header
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn has_scope(scopes: &[String], wanted: &str) -> bool {
    scopes.iter().any(|s| s == wanted)
}

/// Compare two dotted versions on major, minor and patch
pub fn is_version_below(version: &str, minimum: &str) -> bool {
    parse_version(version) < parse_version(minimum)
}

/// Parse "3.15.0" into `[3, 15, 0]`.
///
/// Only the numeric prefix of each component counts, so "3.15.0-beta" is
/// 3.15.0. Missing or unparsable components are 0.
fn parse_version(version: &str) -> [u32; 3] {
    let mut parts = [0; 3];
    for (slot, component) in parts.iter_mut().zip(version.trim().split('.')) {
        let digits: String = component
            .chars()
            .take_while(char::is_ascii_digit)
            .collect();
        *slot = digits.parse().unwrap_or(0);
    }
    parts
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(version: Option<&str>, scopes: Option<&str>) -> ServerMeta {
        ServerMeta {
            installed_version: version.map(str::to_string),
            oauth_scopes: scopes.map(parse_oauth_scopes),
        }
    }

    #[test]
    fn test_parse_version() {
        assert_eq!(parse_version("3.15.0"), [3, 15, 0]);
        assert_eq!(parse_version("3.15.0-beta"), [3, 15, 0]);
        assert_eq!(parse_version("3.9"), [3, 9, 0]);
        assert_eq!(parse_version("garbage"), [0, 0, 0]);
    }

    #[test]
    fn test_is_version_below() {
        assert!(is_version_below("3.14.9", "3.15.0"));
        assert!(is_version_below("3.9.0", "3.15.0"));
        assert!(!is_version_below("3.15.0", "3.15.0"));
        assert!(!is_version_below("3.16.1", "3.15.0"));
        assert!(!is_version_below("4.0", "3.15.0"));
    }

    #[test]
    fn test_parse_oauth_scopes() {
        assert_eq!(
            parse_oauth_scopes("admin:org, repo,, read:enterprise "),
            vec!["admin:org", "repo", "read:enterprise"]
        );
        assert!(parse_oauth_scopes("").is_empty());
    }

    #[test]
    fn test_old_ghes_warns() {
        let warnings =
            check_environment(&meta(Some("3.14.2"), Some("admin:org")), "ghes.local", false)
                .unwrap();
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("3.14.2"));

        let warnings = check_environment(&meta(None, Some("admin:org")), "github.com", false).unwrap();
        assert!(warnings.is_empty());
    }

    #[test]
    fn test_missing_admin_org_scope() {
        let err = check_environment(&meta(None, Some("repo")), "github.com", false).unwrap_err();
        assert_eq!(
            err,
            ConfigError::MissingScope {
                scope: "admin:org".to_string(),
                hostname: "github.com".to_string()
            }
        );
    }

    #[test]
    fn test_all_orgs_needs_read_enterprise() {
        let scopes = Some("admin:org, repo");
        assert!(check_environment(&meta(None, scopes), "github.com", false).is_ok());
        let err = check_environment(&meta(None, scopes), "github.com", true).unwrap_err();
        assert!(matches!(err, ConfigError::MissingScope { scope, .. } if scope == "read:enterprise"));
    }

    #[test]
    fn test_scopes_absent_skips_checks() {
        assert!(check_environment(&meta(None, None), "github.com", true).is_ok());
    }
}
