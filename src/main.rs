use anyhow::{anyhow, Result};
use clap::Parser;
use std::io::{self, Write};
use std::sync::Arc;

use custom_roles::api::{GitHubClient, RoleProvider};
use custom_roles::batch::{BatchRunner, ConsoleProgress, ExecutionStrategy, Summary};
use custom_roles::cli::{Cli, Commands, CreateArgs};
use custom_roles::config::Config;
use custom_roles::error::ConfigError;
use custom_roles::logging;
use custom_roles::prepare::{prepare_run, PreparedRun, RunRequest};
use custom_roles::replication::build_replication_command;
use custom_roles::roles::{BaseRole, RoleDefinition};
use custom_roles::targets::{CsvFileLoader, TargetSelection};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Load configuration first (needed for logging setup)
    let config = Config::load(cli.config.as_deref())?;

    let logging_handle = logging::init_logging(&config, cli.debug)?;
    if let Some(path) = &logging_handle.log_file_path {
        tracing::info!(path = %path.display(), "Logging to file");
    }

    match cli.command {
        Commands::Create(args) => cmd_create(config, args).await?,
    }

    Ok(())
}

/// Inputs validated before any remote call
struct RunPlan {
    selection: TargetSelection,
    strategy: ExecutionStrategy,
    base_role: BaseRole,
    role_name: String,
    permissions: String,
}

fn plan(config: &Config, args: &CreateArgs) -> Result<RunPlan, ConfigError> {
    let selection = args.targets.selection()?;
    let strategy = ExecutionStrategy::from_flags(
        args.delay.unwrap_or(config.batch.delay_secs),
        args.concurrency.unwrap_or(config.batch.concurrency),
    )?;
    let base_role = args.base_role.parse::<BaseRole>()?;

    let role_name = args.role_name.as_deref().unwrap_or_default().trim().to_string();
    if role_name.is_empty() {
        return Err(ConfigError::EmptyRoleName);
    }
    let permissions = args.permissions.clone().unwrap_or_default();
    if permissions.split(',').all(|p| p.trim().is_empty()) {
        return Err(ConfigError::PermissionsRequired);
    }

    Ok(RunPlan {
        selection,
        strategy,
        base_role,
        role_name,
        permissions,
    })
}

async fn cmd_create(mut config: Config, args: CreateArgs) -> Result<()> {
    if let Some(hostname) = &args.targets.hostname {
        config.github.hostname = hostname.trim().to_string();
    }
    let hostname = config.github.hostname.clone();
    let plan = plan(&config, &args)?;

    let client: Arc<dyn RoleProvider> = Arc::new(GitHubClient::from_env(&config.github).await?);

    let request = RunRequest {
        hostname: hostname.clone(),
        selection: plan.selection.clone(),
        role_name: plan.role_name,
        role_description: args.role_description.clone(),
        base_role: plan.base_role,
        permissions: plan.permissions,
        page_size: config.discovery.page_size,
        max_orgs: config.discovery.max_count(),
    };
    let PreparedRun {
        warnings,
        targets,
        role,
    } = prepare_run(Arc::clone(&client), Box::new(CsvFileLoader), &request, |n| {
        eprintln!("Fetched {n} organizations");
    })
    .await?;
    for warning in warnings {
        eprintln!("Warning: {warning}");
    }

    if !args.yes && !confirm(&role, &targets, plan.strategy)? {
        println!("Cancelled");
        return Ok(());
    }

    let runner = BatchRunner::new(Arc::clone(&client), role, plan.strategy);
    let progress = ConsoleProgress::new(targets.len());
    let summary = runner.run(&targets, &progress).await;

    print_summary(&summary);
    println!();
    println!("To replicate this run:");
    println!(
        "  {}",
        build_replication_command(&hostname, &plan.selection, runner.role(), plan.strategy)
    );

    if summary.is_success() {
        Ok(())
    } else {
        Err(anyhow!("completed with {} errors", summary.error))
    }
}

fn confirm(role: &RoleDefinition, targets: &[String], strategy: ExecutionStrategy) -> Result<bool> {
    println!("Create custom repository role?");
    println!();
    println!("  Name:          {}", role.name);
    if let Some(description) = &role.description {
        println!("  Description:   {description}");
    }
    println!("  Base role:     {}", role.base_role);
    println!("  Permissions:   {}", role.permissions.join(", "));
    println!("  Organizations: {}", targets.len());
    println!("  Execution:     {strategy}");
    println!();
    print!("Confirm? [y/N] ");
    io::stdout().flush()?;

    let mut input = String::new();
    io::stdin().read_line(&mut input)?;
    Ok(input.trim().eq_ignore_ascii_case("y"))
}

fn print_summary(summary: &Summary) {
    println!();
    println!("Summary:");
    println!("  ✓ Created:  {}", summary.success);
    println!("  ⚠ Skipped:  {}", summary.warning);
    println!("  ✗ Failed:   {}", summary.error);
}
