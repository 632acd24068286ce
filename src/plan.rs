//! Plan assembly
//!
//! Reconciler output is merged in a fixed order. Creations and updates run
//! first, by [`Stage`]: QOS before the accounts that use them, accounts before
//! the associations that point at them. Job cancellations come next, and
//! removals run last in reverse stage order.
//!
//! Cancellations and removals only make it into the executed command list
//! after the [`SafetyPolicy`] has accepted them.

use std::collections::{BTreeMap, BTreeSet};

use log::{info, warn};
use serde::Serialize;

use crate::commands::SlurmCommand;
use crate::errors::{Anomaly, SyncError};
use crate::reconcile::{CancelScope, Changes, JobCancel};

/// Dependency order of account entities
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Qos,
    Accounts,
    Associations,
}

/// Guard against mass job cancellation, e.g. after the identity service
/// returned an incomplete membership list
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SafetyPolicy {
    /// Most cancellation targets in one run: distinct users plus distinct
    /// `(cluster, account)` pairs whose jobs are all cancelled
    pub max_cancel_targets: usize,
    /// Operator override
    pub force: bool,
}

impl Default for SafetyPolicy {
    fn default() -> Self {
        Self {
            max_cancel_targets: 20,
            force: false,
        }
    }
}

impl SafetyPolicy {
    pub fn check(&self, plan: &Plan) -> Result<(), SyncError> {
        let targets = plan.cancel_targets();
        if targets <= self.max_cancel_targets {
            return Ok(());
        }
        if self.force {
            warn!(
                "Cancelling jobs for {} users and accounts, above the limit of {}, because of --force",
                targets, self.max_cancel_targets
            );
            return Ok(());
        }
        Err(SyncError::CircuitBreaker {
            targets,
            limit: self.max_cancel_targets,
        })
    }
}

/// Collects reconciler output per stage
#[derive(Debug, Default)]
pub struct PlanBuilder {
    stages: BTreeMap<Stage, Changes>,
}

impl PlanBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(mut self, stage: Stage, changes: Changes) -> Self {
        self.stages.entry(stage).or_default().extend(changes);
        self
    }

    pub fn build(self) -> Plan {
        let mut plan = Plan::default();

        for changes in self.stages.values() {
            plan.commands.extend(changes.commands.iter().cloned());
            plan.anomalies.extend(changes.anomalies.iter().cloned());
        }
        for changes in self.stages.values().rev() {
            plan.job_cancels.extend(changes.job_cancels.iter().cloned());
            plan.removals.extend(changes.removals.iter().cloned());
        }

        plan
    }
}

/// An ordered set of commands for the account pipeline
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Plan {
    pub commands: Vec<SlurmCommand>,
    pub job_cancels: Vec<JobCancel>,
    pub removals: Vec<SlurmCommand>,
    pub anomalies: Vec<Anomaly>,
}

impl Plan {
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty() && self.job_cancels.is_empty() && self.removals.is_empty()
    }

    /// Distinct users whose jobs get cancelled
    pub fn cancelled_users(&self) -> BTreeSet<&str> {
        self.job_cancels.iter().filter_map(JobCancel::user).collect()
    }

    /// Distinct users plus distinct accounts whose jobs get cancelled
    pub fn cancel_targets(&self) -> usize {
        let accounts: BTreeSet<(&str, &str)> = self
            .job_cancels
            .iter()
            .filter_map(|cancel| match &cancel.scope {
                CancelScope::Account(account) => Some((cancel.cluster.as_str(), account.as_str())),
                CancelScope::User { .. } => None,
            })
            .collect();
        self.cancelled_users().len() + accounts.len()
    }

    /// Every command in execution order, without any safety check
    pub fn ordered_commands(&self) -> Vec<SlurmCommand> {
        self.commands
            .iter()
            .chain(self.job_cancels.iter().flat_map(|c| c.commands.iter()))
            .chain(self.removals.iter())
            .cloned()
            .collect()
    }

    /// The commands to execute, once `policy` accepts the cancellations
    pub fn approved_commands(&self, policy: &SafetyPolicy) -> Result<Vec<SlurmCommand>, SyncError> {
        policy.check(self)?;
        info!(
            "Plan: {} updates, {} job cancellations, {} removals",
            self.commands.len(),
            self.job_cancels.len(),
            self.removals.len()
        );
        Ok(self.ordered_commands())
    }
}

/// Commands for the license pipeline
///
/// Resources are created before the reservations that use them and removed
/// after the reservations are gone.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LicensePlan {
    pub resources: Changes,
    pub reservations: Changes,
}

impl LicensePlan {
    pub fn new(resources: Changes, reservations: Changes) -> Self {
        Self {
            resources,
            reservations,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty() && self.reservations.is_empty()
    }

    pub fn anomalies(&self) -> Vec<Anomaly> {
        self.resources
            .anomalies
            .iter()
            .chain(self.reservations.anomalies.iter())
            .cloned()
            .collect()
    }

    pub fn ordered_commands(&self) -> Vec<SlurmCommand> {
        self.resources
            .commands
            .iter()
            .chain(self.reservations.commands.iter())
            .chain(self.reservations.removals.iter())
            .chain(self.resources.removals.iter())
            .cloned()
            .collect()
    }
}
