//! Entity reconcilers
//!
//! Each reconciler compares desired records against observed records for a
//! set of clusters and returns the [`Changes`] that converge them. They are
//! pure functions of their inputs: configuration tables are passed in, and
//! every set difference is walked in sorted order so the same input always
//! produces the same commands.

pub mod accounts;
pub mod licenses;
pub mod projects;
pub mod users;

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use crate::commands::SlurmCommand;
use crate::errors::Anomaly;
use crate::models::{SlurmAccount, SlurmUser};

/// Whose jobs a cancellation targets
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CancelScope {
    /// One user, on the whole cluster or under one account
    User {
        user: String,
        account: Option<String>,
    },
    /// Every job under an account
    Account(String),
}

/// Job cancellations that must run before a removal
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobCancel {
    pub cluster: String,
    pub scope: CancelScope,
    pub commands: Vec<SlurmCommand>,
}

impl JobCancel {
    pub fn user(&self) -> Option<&str> {
        match &self.scope {
            CancelScope::User { user, .. } => Some(user),
            CancelScope::Account(_) => None,
        }
    }
}

/// Output of a reconciler
///
/// `commands` create or update entities. `job_cancels` and `removals` are kept
/// apart so the plan can put a safety check in front of them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Changes {
    pub commands: Vec<SlurmCommand>,
    pub job_cancels: Vec<JobCancel>,
    pub removals: Vec<SlurmCommand>,
    pub anomalies: Vec<Anomaly>,
}

impl Changes {
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty() && self.job_cancels.is_empty() && self.removals.is_empty()
    }

    pub fn extend(&mut self, other: Changes) {
        self.commands.extend(other.commands);
        self.job_cancels.extend(other.job_cancels);
        self.removals.extend(other.removals);
        self.anomalies.extend(other.anomalies);
    }

    /// All commands in execution order: updates, cancellations, removals
    pub fn all_commands(&self) -> Vec<SlurmCommand> {
        self.commands
            .iter()
            .chain(self.job_cancels.iter().flat_map(|cancel| cancel.commands.iter()))
            .chain(self.removals.iter())
            .cloned()
            .collect()
    }
}

/// Accounts on `cluster`, keyed by name
pub fn cluster_accounts<'a>(
    accounts: &'a [SlurmAccount],
    cluster: &str,
) -> BTreeMap<&'a str, &'a SlurmAccount> {
    accounts
        .iter()
        .filter(|account| account.cluster == cluster)
        .map(|account| (account.account.as_str(), account))
        .collect()
}

/// `(user, account)` associations on `cluster`
pub fn cluster_associations<'a>(
    users: &'a [SlurmUser],
    cluster: &str,
) -> BTreeSet<(&'a str, &'a str)> {
    users
        .iter()
        .filter(|user| user.cluster == cluster)
        .map(|user| (user.user.as_str(), user.account.as_str()))
        .collect()
}
