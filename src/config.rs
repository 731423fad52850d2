use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::targets::DEFAULT_PAGE_SIZE;

/// Prefix for `CUSTOM_ROLES__SECTION__KEY` environment overrides
const ENV_PREFIX: &str = "CUSTOM_ROLES";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub github: GitHubConfig,
    #[serde(default)]
    pub discovery: DiscoveryConfig,
    #[serde(default)]
    pub batch: BatchConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitHubConfig {
    /// `github.com`, a `*.ghe.com` tenant, or a GitHub Enterprise Server host
    #[serde(default = "default_hostname")]
    pub hostname: String,
    /// Value of the `X-GitHub-Api-Version` header
    #[serde(default = "default_api_version")]
    pub api_version: String,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

fn default_hostname() -> String {
    "github.com".to_string()
}

fn default_api_version() -> String {
    "2022-11-28".to_string()
}

fn default_user_agent() -> String {
    format!("custom-roles/{}", env!("CARGO_PKG_VERSION"))
}

impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            hostname: default_hostname(),
            api_version: default_api_version(),
            user_agent: default_user_agent(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveryConfig {
    /// Organizations requested per GraphQL page; values above GitHub's cap
    /// of 100 are clamped
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    /// Stop discovery after this many organizations; 0 means no limit
    #[serde(default)]
    pub max_orgs: usize,
}

fn default_page_size() -> usize {
    DEFAULT_PAGE_SIZE
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
            max_orgs: 0,
        }
    }
}

impl DiscoveryConfig {
    pub fn max_count(&self) -> Option<usize> {
        (self.max_orgs > 0).then_some(self.max_orgs)
    }
}

/// Defaults for `--delay` and `--concurrency`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchConfig {
    #[serde(default)]
    pub delay_secs: i64,
    #[serde(default = "default_concurrency")]
    pub concurrency: i64,
}

fn default_concurrency() -> i64 {
    1
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            delay_secs: 0,
            concurrency: default_concurrency(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
    /// Write logs to a file instead of stderr
    #[serde(default)]
    pub to_file: bool,
    /// Log file directory; empty uses the platform state directory
    #[serde(default)]
    pub directory: String,
}

fn default_log_level() -> String {
    "warn".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            to_file: false,
            directory: String::new(),
        }
    }
}

impl Config {
    /// Path to the per-user config file, if the platform has a config dir
    pub fn user_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("custom-roles").join("config.toml"))
    }

    /// Load layered configuration: embedded defaults, the user config file,
    /// an explicit `--config` file, then `CUSTOM_ROLES__*` environment
    /// variables.
    pub fn load(config_path: Option<&Path>) -> Result<Self> {
        Self::load_from(Self::user_config_path().as_deref(), config_path)
    }

    fn load_from(user_config: Option<&Path>, config_path: Option<&Path>) -> Result<Self> {
        // Start with embedded defaults so the tool works without config files
        let defaults = Config::default();
        let defaults_json =
            serde_json::to_string(&defaults).context("Failed to serialize default config")?;

        let mut builder = config::Config::builder().add_source(config::File::from_str(
            &defaults_json,
            config::FileFormat::Json,
        ));

        if let Some(user_config) = user_config {
            if user_config.exists() {
                builder = builder.add_source(config::File::from(user_config));
            }
        }

        // Explicit config file must exist
        if let Some(path) = config_path {
            builder = builder.add_source(config::File::from(path).required(true));
        }

        builder = builder.add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build().context("Failed to load configuration")?;
        config
            .try_deserialize()
            .context("Failed to deserialize configuration")
    }

    /// Directory for log files
    pub fn logs_path(&self) -> PathBuf {
        if !self.logging.directory.is_empty() {
            return PathBuf::from(&self.logging.directory);
        }
        dirs::state_dir()
            .or_else(dirs::data_local_dir)
            .unwrap_or_else(std::env::temp_dir)
            .join("custom-roles")
            .join("logs")
    }
}
