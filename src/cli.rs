//! Command line definition

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::error::ConfigError;
use crate::targets::TargetSelection;

#[derive(Parser, Debug)]
#[command(name = "custom-roles")]
#[command(about = "Create custom repository roles across GitHub organizations")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Config file path
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long, global = true)]
    pub debug: bool,
}

/// Where to run: host, enterprise and exactly one target source
#[derive(Args, Debug, Clone)]
pub struct TargetArgs {
    /// GitHub hostname (github.com, <tenant>.ghe.com or a GHES host)
    #[arg(short = 'u', long)]
    pub hostname: Option<String>,

    /// Enterprise slug, required with --all-orgs
    #[arg(short, long)]
    pub enterprise: Option<String>,

    /// Target a single organization
    #[arg(short, long, group = "target")]
    pub org: Option<String>,

    /// Target every organization of the enterprise
    #[arg(short, long, group = "target")]
    pub all_orgs: bool,

    /// Target the organizations listed in a CSV file
    #[arg(short = 'c', long, group = "target")]
    pub orgs_csv: Option<PathBuf>,
}

impl TargetArgs {
    /// The target selection named on the command line
    pub fn selection(&self) -> Result<TargetSelection, ConfigError> {
        TargetSelection::from_flags(
            self.org.as_deref(),
            self.all_orgs,
            self.enterprise.as_deref(),
            self.orgs_csv.as_deref(),
        )
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create a custom repository role in every target organization
    Create(CreateArgs),
}

#[derive(Args, Debug, Clone)]
pub struct CreateArgs {
    #[command(flatten)]
    pub targets: TargetArgs,

    /// Name of the custom role
    #[arg(short = 'n', long)]
    pub role_name: Option<String>,

    /// Description of the custom role
    #[arg(short = 'd', long)]
    pub role_description: Option<String>,

    /// Base role the custom role extends (read, triage, write, maintain)
    #[arg(short, long, default_value = "read")]
    pub base_role: String,

    /// Comma-separated fine-grained permissions
    #[arg(short, long)]
    pub permissions: Option<String>,

    /// Seconds to wait between organizations (sequential only)
    #[arg(long, allow_negative_numbers = true)]
    pub delay: Option<i64>,

    /// Organizations processed at once (1-20)
    #[arg(long, allow_negative_numbers = true)]
    pub concurrency: Option<i64>,

    /// Skip confirmation prompt
    #[arg(short = 'y', long)]
    pub yes: bool,
}
