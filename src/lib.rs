//! custom-roles - Bulk creation of custom repository roles across GitHub
//! organizations
//!
//! The library holds everything the `custom-roles` binary runs: target
//! resolution, the batch engine, the GitHub client and its in-memory mock.

pub mod api;
pub mod batch;
pub mod cli;
pub mod config;
pub mod error;
pub mod logging;
pub mod preflight;
pub mod prepare;
pub mod replication;
pub mod roles;
pub mod targets;

pub use error::{ConfigError, Error, Result};
