//! GitHub CLI (`gh`) wrapper for token discovery.
//!
//! When no token is exported in the environment, the credentials stored by
//! `gh auth login` are borrowed via `gh auth token`.

use std::process::Stdio;

use anyhow::{anyhow, Context, Result};
use tokio::process::Command;
use tracing::{debug, instrument};

/// GitHub CLI wrapper
pub struct GhCli;

impl GhCli {
    /// Execute a gh command and return stdout
    async fn run_gh(args: &[&str]) -> Result<String> {
        debug!(?args, "Running gh command");

        let output = Command::new("gh")
            .args(args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .context("Failed to execute gh command")?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(anyhow!(
                "gh {} failed: {}",
                args.first().unwrap_or(&""),
                stderr.trim()
            ));
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    /// Check if gh CLI is installed
    async fn is_installed() -> bool {
        Command::new("gh")
            .arg("--version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map(|s| s.success())
            .unwrap_or(false)
    }

    /// Get the token gh holds for `hostname`
    #[instrument]
    pub async fn auth_token(hostname: &str) -> Result<String> {
        if !Self::is_installed().await {
            return Err(anyhow!("gh CLI is not installed"));
        }
        let token = Self::run_gh(&["auth", "token", "--hostname", hostname]).await?;
        if token.is_empty() {
            return Err(anyhow!(
                "gh is not logged in to {hostname}. Please run: gh auth login -h {hostname}"
            ));
        }
        Ok(token)
    }
}
