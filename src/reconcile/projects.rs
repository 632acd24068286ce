//! Compute projects: their QOS, their accounts and their members
//!
//! Each project gets a QOS `<cluster>-<project>` carrying its CPU and GPU
//! budget, and an account under the project parent that uses that QOS.

use std::collections::{BTreeMap, BTreeSet};

use log::{debug, info, warn};

use super::{CancelScope, Changes, JobCancel, cluster_accounts};
use crate::commands::sacctmgr::{self, NewAccount};
use crate::commands::scancel;
use crate::config::AccountSyncConfig;
use crate::desired::Project;
use crate::errors::SyncError;
use crate::models::{SlurmAccount, SlurmQos, SlurmUser};

/// CPU-equivalent minutes charged per GPU minute
pub const GPU_TO_CPU_RATE: u64 = 12;

pub fn project_qos_name(cluster: &str, project: &str) -> String {
    format!("{}-{}", cluster, project)
}

/// `GRPTRESMins` value for a project budget
pub fn qos_budget(cpu_hours: u64, gpu_hours: u64) -> String {
    let cpu_minutes = 60 * cpu_hours + GPU_TO_CPU_RATE * 60 * gpu_hours;
    let gpu_minutes = (60 * gpu_hours).max(1);
    format!(
        "billing={cpu},cpu={cpu},gres/gpu={gpu}",
        cpu = cpu_minutes,
        gpu = gpu_minutes
    )
}

fn sorted_projects(projects: &[Project]) -> Vec<&Project> {
    let mut sorted: Vec<&Project> = projects.iter().collect();
    sorted.sort_by(|a, b| a.name.cmp(&b.name));
    sorted
}

/// Create missing project QOS and (re)apply every project budget.
///
/// The budget is written on every run. With `qos_cleanup`, QOS of this
/// cluster that belong to no project are removed.
pub fn project_qos(
    projects: &[Project],
    qos: &[SlurmQos],
    clusters: &[String],
    config: &AccountSyncConfig,
) -> Changes {
    let mut changes = Changes::default();

    for cluster in clusters {
        let prefix = format!("{}-", cluster);
        let existing: BTreeSet<&str> = qos
            .iter()
            .map(|q| q.name.as_str())
            .filter(|name| name.starts_with(&prefix))
            .filter(|name| !config.protected_qos.iter().any(|p| p == name))
            .collect();
        let mut desired = BTreeSet::new();

        for project in sorted_projects(projects) {
            let name = project_qos_name(cluster, &project.name);
            if !existing.contains(name.as_str()) {
                changes.commands.push(sacctmgr::add_qos(&name));
            }
            let settings = BTreeMap::from([(
                "GRPTRESMins".to_string(),
                qos_budget(project.cpu_hours, project.gpu_hours),
            )]);
            changes.commands.push(sacctmgr::modify_qos(&name, &settings));
            desired.insert(name);
        }

        // Keeping an obsolete QOS keeps its usage, should the project come back
        let obsolete: Vec<&str> = existing
            .iter()
            .filter(|name| !desired.contains(**name))
            .copied()
            .collect();
        if config.qos_cleanup {
            changes
                .removals
                .extend(obsolete.iter().map(|name| sacctmgr::remove_qos(name)));
        } else if !obsolete.is_empty() {
            debug!("Keeping QOS without project on {}: {}", cluster, obsolete.join(", "));
        }
    }

    changes
}

/// Create accounts for new projects and remove those of ended projects.
///
/// Only accounts under the project parent are considered for removal; their
/// pending and suspended jobs are cancelled first.
pub fn project_accounts(
    projects: &[Project],
    accounts: &[SlurmAccount],
    clusters: &[String],
    config: &AccountSyncConfig,
) -> Result<Changes, SyncError> {
    let mut changes = Changes::default();
    let desired: BTreeSet<&str> = projects.iter().map(|p| p.name.as_str()).collect();

    for cluster in clusters {
        let existing = cluster_accounts(accounts, cluster);

        if !existing.contains_key(config.project_parent.as_str()) {
            changes.commands.push(sacctmgr::add_account(
                &NewAccount {
                    name: &config.project_parent,
                    parent: None,
                    organisation: &config.host_institute,
                    cluster,
                    fairshare: None,
                    qos: &[],
                },
                &config.organisations,
            )?);
        }

        for project in sorted_projects(projects) {
            if existing.contains_key(project.name.as_str()) {
                continue;
            }
            let qos: Vec<String> = std::iter::once(project_qos_name(cluster, &project.name))
                .chain(config.general_qos.iter().cloned())
                .collect();
            changes.commands.push(sacctmgr::add_account(
                &NewAccount {
                    name: &project.name,
                    parent: Some(&config.project_parent),
                    organisation: &config.host_institute,
                    cluster,
                    fairshare: None,
                    qos: &qos,
                },
                &config.organisations,
            )?);
        }

        for (name, _) in existing.iter().filter(|(name, account)| {
            account.parent() == config.project_parent
                && !desired.contains(**name)
                && !config.protected_accounts.iter().any(|p| p == *name)
        }) {
            info!("Removing account {} of ended project on {}", name, cluster);
            changes.job_cancels.push(JobCancel {
                cluster: cluster.clone(),
                scope: CancelScope::Account(name.to_string()),
                commands: scancel::cancel_account_jobs(name, cluster),
            });
            changes.removals.push(sacctmgr::remove_account(name, cluster));
        }
    }

    Ok(changes)
}

/// Reconcile project associations.
///
/// Every new project member is first associated with the shared
/// `default_account`, then with the project. Users who left a project lose
/// that association; users left in no project after this run also lose their
/// default-account association, unless they have an association with a
/// protected account.
pub fn project_users(
    projects: &[Project],
    active_accounts: &BTreeSet<String>,
    users: &[SlurmUser],
    clusters: &[String],
    default_account: &str,
    protected_accounts: &[String],
) -> Changes {
    let mut changes = Changes::default();

    for cluster in clusters {
        let associations: Vec<(&str, &str)> = users
            .iter()
            .filter(|user| user.cluster == *cluster)
            .map(|user| (user.user.as_str(), user.account.as_str()))
            .collect();

        let protected_users: BTreeSet<&str> = associations
            .iter()
            .filter(|(_, account)| protected_accounts.iter().any(|p| p == account))
            .map(|(user, _)| *user)
            .collect();
        let with_default_account: BTreeSet<&str> = associations
            .iter()
            .filter(|(_, account)| *account == default_account)
            .map(|(user, _)| *user)
            .collect();

        let mut new_users: BTreeSet<(&str, &str)> = BTreeSet::new();
        let mut removed: BTreeSet<(&str, &str)> = BTreeSet::new();
        let mut all_project_users: BTreeSet<&str> = BTreeSet::new();
        // Users with at least one project association once this plan is applied
        let mut remaining: BTreeSet<&str> = BTreeSet::new();

        for project in sorted_projects(projects) {
            let name = project.name.as_str();
            let project_users: BTreeSet<&str> = associations
                .iter()
                .filter(|(_, account)| *account == name)
                .map(|(user, _)| *user)
                .collect();
            all_project_users.extend(&project_users);

            new_users.extend(
                project
                    .members
                    .intersection(active_accounts)
                    .map(String::as_str)
                    .filter(|user| !project_users.contains(user))
                    .map(|user| (user, name)),
            );
            removed.extend(
                project_users
                    .iter()
                    .filter(|user| !project.members.contains(**user))
                    .map(|user| (*user, name)),
            );
            remaining.extend(
                project_users
                    .iter()
                    .filter(|user| project.members.contains(**user)),
            );
        }
        remaining.extend(new_users.iter().map(|(user, _)| *user));

        info!("{}: {} new project users", cluster, new_users.len());
        info!("{}: {} removed project users", cluster, removed.len());

        let unaffiliated: Vec<&str> = associations
            .iter()
            .map(|(user, _)| *user)
            .filter(|user| !protected_users.contains(user) && !all_project_users.contains(user))
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        if !unaffiliated.is_empty() {
            warn!(
                "Number of Slurm users on {} not in any project: {}: {}",
                cluster,
                unaffiliated.len(),
                unaffiliated.join(", ")
            );
        }

        let needs_default: BTreeSet<&str> = new_users
            .iter()
            .map(|(user, _)| *user)
            .filter(|user| !with_default_account.contains(user))
            .collect();
        changes.commands.extend(
            needs_default
                .iter()
                .map(|user| sacctmgr::add_user(user, default_account, cluster, true)),
        );
        changes.commands.extend(
            new_users
                .iter()
                .map(|(user, project)| sacctmgr::add_user(user, project, cluster, false)),
        );

        changes.removals.extend(
            removed
                .iter()
                .map(|(user, project)| sacctmgr::remove_user_account(user, project, cluster)),
        );
        changes.removals.extend(
            with_default_account
                .iter()
                .filter(|user| !remaining.contains(*user) && !protected_users.contains(*user))
                .map(|user| sacctmgr::remove_user_account(user, default_account, cluster)),
        );
    }

    changes
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_qos_budget() {
        assert_eq!(qos_budget(2, 3), "billing=2280,cpu=2280,gres/gpu=180");
        assert_eq!(qos_budget(5, 0), "billing=300,cpu=300,gres/gpu=1");
        assert_eq!(qos_budget(0, 0), "billing=0,cpu=0,gres/gpu=1");
    }

    #[test]
    fn test_project_qos_name() {
        assert_eq!(
            project_qos_name("mycluster", "gpr_compute_project1"),
            "mycluster-gpr_compute_project1"
        );
    }
}
