//! Failover agent installer.
//!
//! Installs a release of the router failover agent and carries its shell
//! configuration across upgrades and firmware reflashes: user values are
//! merged into each new template, candidates are validated before they go
//! live, and every change is preceded by a checksummed backup.
//!
//! The crate is organised in layers:
//!
//! - **[`config`]**: settings, variable extraction, merging and validation
//! - **[`backup`]** and **[`store`]**: the versioned backup ring
//! - **[`resources`]**: idempotent `check + apply` primitives (links, crontab, scripts)
//! - **[`tasks`]**: dependency-ordered install steps wired to resources
//! - **[`recovery`]**: the boot-time recovery state machine and shutdown hook
//! - **[`commands`]**: top-level subcommand handlers
#![deny(clippy::or_fun_call)]
#![deny(clippy::bool_to_int_with_if)]

pub mod backup;
pub mod cli;
pub mod commands;
pub mod config;
pub mod download;
pub mod error;
pub mod exec;
pub mod logging;
pub mod recovery;
pub mod resources;
pub mod store;
pub mod tasks;
