//! Batch execution engine.
//!
//! Ensures one custom role exists in every target organization. Each
//! organization runs through the same pipeline:
//!
//! 1. look up existing roles (missing org → warning, other failure → error,
//!    role present → warning)
//! 2. create the role (missing org → warning, other failure → error, else
//!    success)
//!
//! Organizations run either one at a time with a fixed pause between them, or
//! in parallel behind an admission gate. Either way each organization is
//! counted exactly once, and its counter update, progress tick and status
//! line are applied together by a single aggregator.

mod progress;

pub use progress::{ConsoleProgress, ProgressSink, RecordingProgress};

use std::any::Any;
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures_util::FutureExt;
use serde::Serialize;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, error, info, instrument};

use crate::api::RoleProvider;
use crate::error::ConfigError;
use crate::roles::{role_exists, RoleDefinition};

/// Lowest accepted `--concurrency`
pub const MIN_CONCURRENCY: usize = 1;
/// Highest accepted `--concurrency`
pub const MAX_CONCURRENCY: usize = 20;

/// How organizations are scheduled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionStrategy {
    /// One organization at a time, pausing between organizations
    Delay(Duration),
    /// Up to `n` organizations in flight at once
    Concurrency(usize),
}

impl Default for ExecutionStrategy {
    fn default() -> Self {
        ExecutionStrategy::Concurrency(MIN_CONCURRENCY)
    }
}

impl ExecutionStrategy {
    /// Validate the `--delay` / `--concurrency` pair.
    ///
    /// A positive delay rules out concurrency above one. A zero delay means
    /// concurrency mode, where `1` is strictly sequential without pauses.
    pub fn from_flags(delay_secs: i64, concurrency: i64) -> Result<Self, ConfigError> {
        let concurrency = usize::try_from(concurrency)
            .ok()
            .filter(|n| (MIN_CONCURRENCY..=MAX_CONCURRENCY).contains(n))
            .ok_or(ConfigError::ConcurrencyOutOfRange {
                got: concurrency,
                min: MIN_CONCURRENCY,
                max: MAX_CONCURRENCY,
            })?;
        let delay = u64::try_from(delay_secs).map_err(|_| ConfigError::NegativeDelay(delay_secs))?;

        match (delay, concurrency) {
            (0, n) => Ok(ExecutionStrategy::Concurrency(n)),
            (delay, 1) => Ok(ExecutionStrategy::Delay(Duration::from_secs(delay))),
            (delay, concurrency) => Err(ConfigError::DelayWithConcurrency { delay, concurrency }),
        }
    }

    /// Pause between organizations in whole seconds (0 in concurrency mode)
    pub fn delay_secs(&self) -> u64 {
        match self {
            ExecutionStrategy::Delay(d) => d.as_secs(),
            ExecutionStrategy::Concurrency(_) => 0,
        }
    }

    /// Organizations in flight at once (1 in delay mode)
    pub fn concurrency(&self) -> usize {
        match self {
            ExecutionStrategy::Delay(_) => 1,
            ExecutionStrategy::Concurrency(n) => (*n).max(MIN_CONCURRENCY),
        }
    }
}

impl fmt::Display for ExecutionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExecutionStrategy::Delay(d) => write!(f, "sequential, {}s delay", d.as_secs()),
            ExecutionStrategy::Concurrency(1) => write!(f, "sequential"),
            ExecutionStrategy::Concurrency(n) => write!(f, "{n} concurrent"),
        }
    }
}

/// Severity of a per-organization outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Classification {
    Success,
    Warning,
    Error,
}

impl Classification {
    pub fn glyph(&self) -> &'static str {
        match self {
            Classification::Success => "✓",
            Classification::Warning => "⚠",
            Classification::Error => "✗",
        }
    }
}

/// Pipeline step an organization failed in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Lookup,
    Create,
    /// The pipeline itself broke down (a panic)
    Internal,
}

/// Terminal state of one organization
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Created,
    SkippedAlreadyExists,
    SkippedNotFound,
    Failed { stage: Stage, reason: String },
}

impl Outcome {
    pub fn classification(&self) -> Classification {
        match self {
            Outcome::Created => Classification::Success,
            Outcome::SkippedAlreadyExists | Outcome::SkippedNotFound => Classification::Warning,
            Outcome::Failed { .. } => Classification::Error,
        }
    }

    /// Human-readable status line
    pub fn message(&self, org: &str, role_name: &str) -> String {
        match self {
            Outcome::Created => format!("Created role {role_name} in {org}"),
            Outcome::SkippedAlreadyExists => {
                format!("Organization {org} already has a role named {role_name}. Skipping.")
            }
            Outcome::SkippedNotFound => format!("Organization {org} not found. Skipping."),
            Outcome::Failed {
                stage: Stage::Lookup,
                reason,
            } => format!("Failed to check existing roles for {org}: {reason}"),
            Outcome::Failed {
                stage: Stage::Create,
                reason,
            } => format!("Failed to create role in {org}: {reason}"),
            Outcome::Failed {
                stage: Stage::Internal,
                reason,
            } => format!("Unexpected failure while processing {org}: {reason}"),
        }
    }
}

/// Outcome counts of a run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Summary {
    pub success: usize,
    pub warning: usize,
    pub error: usize,
}

impl Summary {
    pub fn total(&self) -> usize {
        self.success + self.warning + self.error
    }

    /// A run succeeds when no organization ended in an error, whatever the
    /// warnings
    pub fn is_success(&self) -> bool {
        self.error == 0
    }

    fn count(&mut self, classification: Classification) {
        match classification {
            Classification::Success => self.success += 1,
            Classification::Warning => self.warning += 1,
            Classification::Error => self.error += 1,
        }
    }
}

/// Run the existence check and, when the role is absent, the create call for
/// one organization
pub async fn ensure_role(provider: &dyn RoleProvider, org: &str, role: &RoleDefinition) -> Outcome {
    match role_exists(provider, org, &role.name).await {
        Err(e) if e.is_not_found() => Outcome::SkippedNotFound,
        Err(e) => Outcome::Failed {
            stage: Stage::Lookup,
            reason: e.to_string(),
        },
        Ok(true) => Outcome::SkippedAlreadyExists,
        Ok(false) => match provider.create_custom_role(org, role).await {
            Err(e) if e.is_not_found() => Outcome::SkippedNotFound,
            Err(e) => Outcome::Failed {
                stage: Stage::Create,
                reason: e.to_string(),
            },
            Ok(()) => Outcome::Created,
        },
    }
}

/// [`ensure_role`] with panics turned into a failed outcome
async fn guarded_ensure_role(
    provider: &dyn RoleProvider,
    org: &str,
    role: &RoleDefinition,
) -> Outcome {
    AssertUnwindSafe(ensure_role(provider, org, role))
        .catch_unwind()
        .await
        .unwrap_or_else(|panic| Outcome::Failed {
            stage: Stage::Internal,
            reason: panic_message(panic.as_ref()),
        })
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "pipeline panicked".to_string()
    }
}

/// Owns the counters and the sink; the only place outcomes are applied
struct Tally<'a> {
    summary: Summary,
    sink: &'a dyn ProgressSink,
    role_name: &'a str,
}

impl Tally<'_> {
    fn record(&mut self, org: &str, outcome: &Outcome) {
        let classification = outcome.classification();
        self.summary.count(classification);
        self.sink.on_tick();
        self.sink
            .on_line(classification, &outcome.message(org, self.role_name));
        debug!(org, ?outcome, "Organization finished");
    }
}

/// Drives the per-organization pipeline across a target list
pub struct BatchRunner {
    provider: Arc<dyn RoleProvider>,
    role: Arc<RoleDefinition>,
    strategy: ExecutionStrategy,
}

impl BatchRunner {
    pub fn new(
        provider: Arc<dyn RoleProvider>,
        role: RoleDefinition,
        strategy: ExecutionStrategy,
    ) -> Self {
        Self {
            provider,
            role: Arc::new(role),
            strategy,
        }
    }

    pub fn role(&self) -> &RoleDefinition {
        &self.role
    }

    /// Process every organization in `targets` exactly once and return the
    /// counts.
    ///
    /// Per-organization failures are reported through `sink` and counted; they
    /// never stop the batch. Returns only after every organization finished.
    #[instrument(skip_all, fields(targets = targets.len(), strategy = %self.strategy))]
    pub async fn run(&self, targets: &[String], sink: &dyn ProgressSink) -> Summary {
        let mut tally = Tally {
            summary: Summary::default(),
            sink,
            role_name: &self.role.name,
        };

        match self.strategy {
            ExecutionStrategy::Delay(pause) => self.run_sequential(targets, pause, &mut tally).await,
            ExecutionStrategy::Concurrency(n) if n <= 1 => {
                self.run_sequential(targets, Duration::ZERO, &mut tally).await;
            }
            ExecutionStrategy::Concurrency(n) => self.run_parallel(targets, n, &mut tally).await,
        }

        info!(
            success = tally.summary.success,
            warning = tally.summary.warning,
            error = tally.summary.error,
            "Batch finished"
        );
        tally.summary
    }

    async fn run_sequential(&self, targets: &[String], pause: Duration, tally: &mut Tally<'_>) {
        for (index, org) in targets.iter().enumerate() {
            let outcome = guarded_ensure_role(self.provider.as_ref(), org, &self.role).await;
            tally.record(org, &outcome);

            if !pause.is_zero() && index + 1 < targets.len() {
                tokio::time::sleep(pause).await;
            }
        }
    }

    async fn run_parallel(&self, targets: &[String], concurrency: usize, tally: &mut Tally<'_>) {
        let gate = Arc::new(Semaphore::new(concurrency));
        let (tx, mut rx) = mpsc::unbounded_channel::<(String, Outcome)>();
        let mut workers = JoinSet::new();

        // Admission and aggregation run side by side: outcomes are reported
        // while later organizations still wait for a permit.
        let admit = async {
            for org in targets {
                let permit = match Arc::clone(&gate).acquire_owned().await {
                    Ok(permit) => permit,
                    Err(e) => {
                        let outcome = Outcome::Failed {
                            stage: Stage::Internal,
                            reason: e.to_string(),
                        };
                        let _ = tx.send((org.clone(), outcome));
                        continue;
                    }
                };

                let provider = Arc::clone(&self.provider);
                let role = Arc::clone(&self.role);
                let tx = tx.clone();
                let org = org.clone();
                workers.spawn(async move {
                    let outcome = guarded_ensure_role(provider.as_ref(), &org, &role).await;
                    // The aggregator outlives every sender
                    let _ = tx.send((org, outcome));
                    drop(permit);
                });
            }
            drop(tx);
        };

        let aggregate = async {
            while let Some((org, outcome)) = rx.recv().await {
                tally.record(&org, &outcome);
            }
        };

        tokio::join!(admit, aggregate);

        while let Some(result) = workers.join_next().await {
            if let Err(e) = result {
                error!(error = %e, "Batch worker did not complete");
            }
        }
    }
}
