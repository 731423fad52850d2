//! Target organization resolution.
//!
//! Turns one target selection into the ordered, deduplicated list of
//! normalized organization logins the batch runs against.

mod csv_loader;
mod directory;

pub use csv_loader::{CsvFileLoader, FlatListLoader};
pub use directory::{DirectoryLister, DEFAULT_PAGE_SIZE};

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use tracing::info;

use crate::error::{ConfigError, Error, Result};

/// Which organizations a run targets
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetSelection {
    /// A single named organization
    Org(String),
    /// Every organization of an enterprise
    AllOrgs { enterprise: String },
    /// Every value in a CSV file
    Csv(PathBuf),
}

impl TargetSelection {
    /// Build a selection from the individual command line options.
    ///
    /// Exactly one of `org`, `all_orgs` and `csv_path` must be given, and
    /// `all_orgs` needs a non-blank enterprise.
    pub fn from_flags(
        org: Option<&str>,
        all_orgs: bool,
        enterprise: Option<&str>,
        csv_path: Option<&Path>,
    ) -> std::result::Result<Self, ConfigError> {
        let selected = usize::from(org.is_some()) + usize::from(all_orgs) + usize::from(csv_path.is_some());
        match selected {
            0 => return Err(ConfigError::NoTargetSpecified),
            1 => {}
            _ => return Err(ConfigError::ConflictingTargets),
        }

        if let Some(org) = org {
            return Ok(TargetSelection::Org(org.to_string()));
        }
        if let Some(path) = csv_path {
            return Ok(TargetSelection::Csv(path.to_path_buf()));
        }

        let enterprise = enterprise.map(str::trim).unwrap_or_default();
        if enterprise.is_empty() {
            return Err(ConfigError::MissingQualifier);
        }
        Ok(TargetSelection::AllOrgs {
            enterprise: enterprise.to_string(),
        })
    }

    pub fn is_all_orgs(&self) -> bool {
        matches!(self, TargetSelection::AllOrgs { .. })
    }
}

/// Normalize an organization login (trimmed, lower-cased)
pub fn normalize_org(org: &str) -> String {
    org.trim().to_lowercase()
}

/// Whether `org` can address exactly one organization: ASCII letters,
/// digits, `-`, `_` and `.`, without `..`
pub fn is_valid_org(org: &str) -> bool {
    !org.is_empty()
        && !org.contains("..")
        && org
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
}

/// Normalize and deduplicate, keeping first-seen order and dropping blanks
pub fn dedup_orgs<I, S>(values: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut seen = HashSet::new();
    values
        .into_iter()
        .map(|v| normalize_org(v.as_ref()))
        .filter(|org| !org.is_empty() && seen.insert(org.clone()))
        .collect()
}

/// Resolves a [`TargetSelection`] to organization logins
pub struct TargetResolver {
    lister: DirectoryLister,
    loader: Box<dyn FlatListLoader>,
}

impl TargetResolver {
    pub fn new(lister: DirectoryLister, loader: Box<dyn FlatListLoader>) -> Self {
        Self { lister, loader }
    }

    /// Resolve `selection`.
    ///
    /// Discovery and file errors are fatal; no partial list is returned. An
    /// empty result is [`ConfigError::EmptyTargetList`]. `on_progress` is
    /// forwarded to the directory lister in all-orgs mode.
    pub async fn resolve(
        &self,
        selection: &TargetSelection,
        on_progress: impl FnMut(usize),
    ) -> Result<Vec<String>> {
        let orgs = match selection {
            TargetSelection::Org(org) => dedup_orgs([org]),
            TargetSelection::Csv(path) => {
                let values = self
                    .loader
                    .load_flat_list(path)
                    .map_err(|source| Error::ListLoad {
                        path: path.clone(),
                        source,
                    })?;
                dedup_orgs(values)
            }
            TargetSelection::AllOrgs { enterprise } => {
                let enterprise = enterprise.trim();
                if enterprise.is_empty() {
                    return Err(ConfigError::MissingQualifier.into());
                }
                info!(enterprise, "Fetching organizations for enterprise");
                self.lister
                    .list(enterprise, on_progress)
                    .await
                    .map_err(|source| Error::Discovery {
                        enterprise: enterprise.to_string(),
                        source,
                    })?
            }
        };

        if orgs.is_empty() {
            return Err(ConfigError::EmptyTargetList.into());
        }
        if let Some(bad) = orgs.iter().find(|org| !is_valid_org(org)) {
            return Err(ConfigError::InvalidOrgName(bad.clone()).into());
        }
        Ok(orgs)
    }
}
