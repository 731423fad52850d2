//! Fatal error taxonomy.
//!
//! Everything here aborts a run before the batch starts. Per-organization
//! failures never become an [`Error`]; the batch engine turns them into
//! outcomes instead.

use std::path::PathBuf;

use thiserror::Error;

use crate::api::ApiError;

/// Invalid or incomplete run configuration. Always detected before the first
/// mutating remote call.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("no organization target specified (use --org, --all-orgs or --orgs-csv)")]
    NoTargetSpecified,

    #[error("--org, --all-orgs and --orgs-csv are mutually exclusive")]
    ConflictingTargets,

    #[error("--enterprise is required when targeting all organizations")]
    MissingQualifier,

    #[error("no organizations provided")]
    EmptyTargetList,

    #[error("invalid organization name: {0:?}")]
    InvalidOrgName(String),

    #[error("role name is required")]
    EmptyRoleName,

    #[error("invalid base role: {0} (expected read, triage, write or maintain)")]
    InvalidBaseRole(String),

    #[error("unknown permission: {0}")]
    UnknownPermission(String),

    #[error("permissions are required")]
    PermissionsRequired,

    #[error("no permissions available for organization {0}")]
    NoPermissionsAvailable(String),

    #[error("concurrency must be between {min} and {max} (got {got})")]
    ConcurrencyOutOfRange { got: i64, min: usize, max: usize },

    #[error("delay must be non-negative (got {0})")]
    NegativeDelay(i64),

    #[error("--delay and --concurrency cannot be combined (delay {delay}s, concurrency {concurrency})")]
    DelayWithConcurrency { delay: u64, concurrency: usize },

    #[error("missing required OAuth scope '{scope}'. Please run: gh auth refresh -h {hostname} -s {scope}")]
    MissingScope { scope: String, hostname: String },
}

/// Errors that abort a run
#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("failed to fetch organizations for enterprise '{enterprise}': {source}")]
    Discovery {
        enterprise: String,
        #[source]
        source: ApiError,
    },

    #[error("failed to read organization list {path:?}: {source}")]
    ListLoad {
        path: PathBuf,
        #[source]
        source: csv::Error,
    },

    #[error("permissions lookup failed for {org}: {source}")]
    PermissionCatalog {
        org: String,
        #[source]
        source: ApiError,
    },

    #[error("failed to fetch GitHub meta endpoint: {0}")]
    Preflight(#[source] ApiError),

    #[error("GitHub authentication unavailable for {hostname}: {message}")]
    Auth { hostname: String, message: String },
}

pub type Result<T> = std::result::Result<T, Error>;
