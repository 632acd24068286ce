//! Reconciliation engine for Slurm accounting state
//!
//! Compares a desired-state snapshot (VO and project membership, external
//! license pools) against the observed state parsed from `sacctmgr` and
//! `scontrol` output, and produces an ordered plan of Slurm CLI invocations
//! that converges the two.
//!
//! The reconcilers in [`reconcile`] and the [`plan`] assembler are pure: all
//! I/O goes through the [`runner`] and [`license_probe`] seams.

pub mod commands;
pub mod config;
pub mod desired;
pub mod errors;
pub mod license_probe;
pub mod models;
pub mod parser;
pub mod plan;
pub mod reconcile;
pub mod runner;

pub use commands::SlurmCommand;
pub use config::{AccountSyncConfig, ConfigPaths, LicenseSyncConfig, SyncConfig};
pub use desired::{DesiredState, Project, Vo};
pub use errors::{Anomaly, Severity, SyncError};
pub use plan::{LicensePlan, Plan, PlanBuilder, SafetyPolicy, Stage};
pub use reconcile::Changes;
