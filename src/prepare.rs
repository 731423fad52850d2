//! Everything that happens before the first organization is touched.
//!
//! Order matters: server checks run before discovery, and the role is only
//! built once the targets are known, against the catalog of the first one.
//! Any failure here aborts the run.

use std::sync::Arc;

use tracing::info;

use crate::api::RoleProvider;
use crate::error::{ConfigError, Error, Result};
use crate::preflight;
use crate::roles::{prepare_role, BaseRole, RoleDefinition};
use crate::targets::{DirectoryLister, FlatListLoader, TargetResolver, TargetSelection};

/// Validated command line input for one run
#[derive(Debug, Clone)]
pub struct RunRequest {
    pub hostname: String,
    pub selection: TargetSelection,
    pub role_name: String,
    pub role_description: Option<String>,
    pub base_role: BaseRole,
    /// Comma-separated permission names, checked against the live catalog
    pub permissions: String,
    pub page_size: usize,
    pub max_orgs: Option<usize>,
}

/// Result of the pre-batch steps
#[derive(Debug)]
pub struct PreparedRun {
    /// Non-fatal preflight findings for the user
    pub warnings: Vec<String>,
    pub targets: Vec<String>,
    pub role: RoleDefinition,
}

/// Run preflight, resolve targets and build the role definition.
///
/// `on_progress` receives discovery progress in all-orgs mode.
pub async fn prepare_run(
    provider: Arc<dyn RoleProvider>,
    loader: Box<dyn FlatListLoader>,
    request: &RunRequest,
    on_progress: impl FnMut(usize),
) -> Result<PreparedRun> {
    let meta = provider.fetch_meta().await.map_err(Error::Preflight)?;
    let warnings = preflight::check_environment(
        &meta,
        &request.hostname,
        request.selection.is_all_orgs(),
    )?;

    let lister = DirectoryLister::new(Arc::clone(&provider))
        .with_page_size(request.page_size)
        .with_max_count(request.max_orgs);
    let targets = TargetResolver::new(lister, loader)
        .resolve(&request.selection, on_progress)
        .await?;
    info!(count = targets.len(), "Resolved target organizations");

    let first_org = targets.first().ok_or(ConfigError::EmptyTargetList)?;
    let role = prepare_role(
        provider.as_ref(),
        first_org,
        &request.role_name,
        request.role_description.as_deref(),
        request.base_role,
        &request.permissions,
    )
    .await?;

    Ok(PreparedRun {
        warnings,
        targets,
        role,
    })
}
