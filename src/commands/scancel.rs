//! `scancel` commands
//!
//! Pending and suspended jobs are cancelled with two separate invocations,
//! one per job state.

use log::debug;

use super::{SLURM_SCANCEL, SlurmCommand};

/// Job states cancelled before an association or account goes away
pub const CANCELLED_STATES: [&str; 2] = ["PENDING", "SUSPENDED"];

/// Cancel pending and suspended jobs on `cluster`, optionally limited to a
/// user and/or an account.
pub fn cancel_jobs(cluster: &str, user: Option<&str>, account: Option<&str>) -> Vec<SlurmCommand> {
    debug!(
        "Adding commands to cancel jobs on cluster {} for user {:?} account {:?}",
        cluster, user, account
    );

    CANCELLED_STATES
        .iter()
        .map(|state| {
            let mut args = vec![format!("--cluster={}", cluster)];
            if let Some(user) = user {
                args.push(format!("--user={}", user));
            }
            if let Some(account) = account {
                args.push(format!("--account={}", account));
            }
            args.push(format!("--state={}", state));
            SlurmCommand::new(SLURM_SCANCEL, args)
        })
        .collect()
}

/// Cancel the jobs of a user, optionally only those under one account
pub fn cancel_user_jobs(user: &str, cluster: &str, account: Option<&str>) -> Vec<SlurmCommand> {
    cancel_jobs(cluster, Some(user), account)
}

/// Cancel the jobs of every user in an account
pub fn cancel_account_jobs(account: &str, cluster: &str) -> Vec<SlurmCommand> {
    cancel_jobs(cluster, None, Some(account))
}
