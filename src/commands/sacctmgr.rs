//! `sacctmgr` commands for accounts, users, QOS and license resources
//!
//! All commands run with `-i`, so sacctmgr applies them immediately instead of
//! asking for confirmation.

use std::collections::BTreeMap;

use log::debug;

use super::{SlurmCommand, settings_args};
use crate::errors::SyncError;

/// Flags set on every QOS we manage: no decay of usage, and deny jobs once
/// the limit is hit.
pub const QOS_GUARD_FLAGS: &str = "flags=NoDecay,DenyOnLimit";

/// An account to create
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewAccount<'a> {
    pub name: &'a str,
    /// `None` puts the account directly under `root`
    pub parent: Option<&'a str>,
    /// Organisation name, translated to its Slurm code
    pub organisation: &'a str,
    pub cluster: &'a str,
    pub fairshare: Option<u64>,
    pub qos: &'a [String],
}

/// Slurm organisation code for an organisation
pub fn organisation_code<'a>(
    organisations: &'a BTreeMap<String, String>,
    organisation: &str,
) -> Result<&'a str, SyncError> {
    organisations
        .get(organisation)
        .map(String::as_str)
        .ok_or_else(|| SyncError::UnknownOrganisation(organisation.to_string()))
}

/// `add account`; fails when the organisation has no Slurm code
pub fn add_account(
    account: &NewAccount<'_>,
    organisations: &BTreeMap<String, String>,
) -> Result<SlurmCommand, SyncError> {
    let code = organisation_code(organisations, account.organisation)?;

    let mut args = vec![
        "account".to_string(),
        account.name.to_string(),
        format!("Parent={}", account.parent.unwrap_or("root")),
        format!("Organization={}", code),
        format!("Cluster={}", account.cluster),
    ];
    if let Some(fairshare) = account.fairshare {
        args.push(format!("Fairshare={}", fairshare));
    }
    if !account.qos.is_empty() {
        args.push(format!("Qos={}", account.qos.join(",")));
    }

    debug!(
        "Adding command to add account {} with Parent={} Cluster={} Organization={}",
        account.name,
        account.parent.unwrap_or("root"),
        account.cluster,
        code
    );
    Ok(SlurmCommand::sacctmgr("add", args))
}

pub fn set_default_account(user: &str, account: &str, cluster: &str) -> SlurmCommand {
    debug!(
        "Creating command to set default account to {} for {} on cluster {}",
        account, user, cluster
    );
    SlurmCommand::sacctmgr(
        "modify",
        [
            "user".to_string(),
            format!("Name={}", user),
            format!("Cluster={}", cluster),
            "set".to_string(),
            format!("DefaultAccount={}", account),
        ],
    )
}

pub fn change_account_fairshare(account: &str, cluster: &str, fairshare: u64) -> SlurmCommand {
    debug!(
        "Adding command to change fairshare for account {} on cluster {} to {}",
        account, cluster, fairshare
    );
    SlurmCommand::sacctmgr(
        "modify",
        [
            "account".to_string(),
            format!("name={}", account),
            format!("cluster={}", cluster),
            "set".to_string(),
            format!("fairshare={}", fairshare),
        ],
    )
}

/// `add user`, making `account` the default account when `default` is set
pub fn add_user(user: &str, account: &str, cluster: &str, default: bool) -> SlurmCommand {
    let mut args = vec![
        "user".to_string(),
        user.to_string(),
        format!("Account={}", account),
        format!("Cluster={}", cluster),
    ];
    if default {
        args.push(format!("DefaultAccount={}", account));
    }

    debug!(
        "Adding command to add user {} with Account={} Cluster={}",
        user, account, cluster
    );
    SlurmCommand::sacctmgr("add", args)
}

/// Remove every association of a user on a cluster
pub fn remove_user(user: &str, cluster: &str) -> SlurmCommand {
    debug!("Adding command to remove user {} from Cluster={}", user, cluster);
    SlurmCommand::sacctmgr(
        "remove",
        [
            "user".to_string(),
            format!("Name={}", user),
            format!("Cluster={}", cluster),
        ],
    )
}

/// Remove a single user association
pub fn remove_user_account(user: &str, account: &str, cluster: &str) -> SlurmCommand {
    debug!(
        "Adding command to remove user {} with account {} from Cluster={}",
        user, account, cluster
    );
    SlurmCommand::sacctmgr(
        "remove",
        [
            "user".to_string(),
            format!("Name={}", user),
            format!("Account={}", account),
            format!("Cluster={}", cluster),
        ],
    )
}

pub fn remove_account(account: &str, cluster: &str) -> SlurmCommand {
    debug!("Adding command to remove account {} from cluster {}", account, cluster);
    SlurmCommand::sacctmgr(
        "remove",
        [
            "account".to_string(),
            format!("Name={}", account),
            format!("Cluster={}", cluster),
        ],
    )
}

pub fn add_qos(name: &str) -> SlurmCommand {
    debug!("Adding command to add QOS {}", name);
    SlurmCommand::sacctmgr("add", ["qos".to_string(), format!("Name={}", name)])
}

pub fn remove_qos(name: &str) -> SlurmCommand {
    debug!("Adding command to remove QOS {}", name);
    SlurmCommand::sacctmgr(
        "remove",
        ["qos".to_string(), "where".to_string(), format!("Name={}", name)],
    )
}

/// `modify qos <name> set`, always with [`QOS_GUARD_FLAGS`]; settings are sorted by key
pub fn modify_qos(name: &str, settings: &BTreeMap<String, String>) -> SlurmCommand {
    let mut args = vec![
        "qos".to_string(),
        name.to_string(),
        "set".to_string(),
        QOS_GUARD_FLAGS.to_string(),
    ];
    args.extend(settings_args(
        settings.iter().map(|(k, v)| (k.as_str(), v.clone())),
    ));

    debug!("Adding command to modify QOS {}", name);
    SlurmCommand::sacctmgr("modify", args)
}

/// A license pool as sacctmgr knows it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LicenseResource<'a> {
    pub name: &'a str,
    pub server: &'a str,
    pub server_type: &'a str,
}

pub fn add_license_resource(
    resource: &LicenseResource<'_>,
    clusters: &[String],
    count: u64,
) -> SlurmCommand {
    debug!(
        "Adding command to add license {}@{} with count {}",
        resource.name, resource.server, count
    );
    SlurmCommand::sacctmgr(
        "add",
        [
            "resource".to_string(),
            "Type=license".to_string(),
            format!("Name={}", resource.name),
            format!("Server={}", resource.server),
            format!("ServerType={}", resource.server_type),
            format!("Cluster={}", clusters.join(",")),
            format!("Count={}", count),
            "PercentAllowed=100".to_string(),
        ],
    )
}

pub fn modify_license_resource(resource: &LicenseResource<'_>, count: u64) -> SlurmCommand {
    debug!(
        "Adding command to set count of license {}@{} to {}",
        resource.name, resource.server, count
    );
    SlurmCommand::sacctmgr(
        "modify",
        [
            "resource".to_string(),
            "where".to_string(),
            format!("Name={}", resource.name),
            format!("Server={}", resource.server),
            format!("ServerType={}", resource.server_type),
            "set".to_string(),
            format!("Count={}", count),
        ],
    )
}

pub fn remove_license_resource(resource: &LicenseResource<'_>) -> SlurmCommand {
    debug!(
        "Adding command to remove license {}@{}",
        resource.name, resource.server
    );
    SlurmCommand::sacctmgr(
        "remove",
        [
            "resource".to_string(),
            "where".to_string(),
            "Type=license".to_string(),
            format!("Name={}", resource.name),
            format!("Server={}", resource.server),
            format!("ServerType={}", resource.server_type),
        ],
    )
}
