//! VO membership of users
//!
//! Every active VO member has an association with its VO account, which is
//! also its default account. Users who switched VO are moved, and users who
//! are no longer active in any VO lose all their associations on the cluster.

use std::collections::{BTreeMap, BTreeSet};

use log::{debug, warn};

use super::{CancelScope, Changes, JobCancel, cluster_associations};
use crate::commands::{sacctmgr, scancel};
use crate::errors::Anomaly;
use crate::models::SlurmUser;

/// Maps each VO member to its VO; with multiple VOs the first by id wins
fn reverse_vo_map(vo_members: &BTreeMap<String, BTreeSet<String>>) -> BTreeMap<&str, &str> {
    let mut reverse = BTreeMap::new();
    for (vo, members) in vo_members {
        for member in members {
            reverse.entry(member.as_str()).or_insert(vo.as_str());
        }
    }
    reverse
}

/// Reconcile user associations with VO membership.
///
/// `vo_members` maps VO id to its members, for all VOs including the
/// institute defaults.
pub fn vo_users(
    vo_members: &BTreeMap<String, BTreeSet<String>>,
    active_accounts: &BTreeSet<String>,
    users: &[SlurmUser],
    clusters: &[String],
) -> Changes {
    let mut changes = Changes::default();

    let reverse = reverse_vo_map(vo_members);
    let active_vo_members: BTreeSet<&str> = vo_members
        .values()
        .flat_map(|members| members.intersection(active_accounts))
        .map(String::as_str)
        .collect();

    for cluster in clusters {
        let default_accounts: BTreeMap<&str, &str> = users
            .iter()
            .filter(|user| user.cluster == *cluster)
            .map(|user| (user.user.as_str(), user.def_acct.as_deref().unwrap_or("")))
            .collect();
        let associations = cluster_associations(users, cluster);
        let cluster_users: BTreeSet<&str> = default_accounts.keys().copied().collect();

        // New users go to the VO the reverse map picks for them
        let new_users: BTreeSet<&str> = active_vo_members
            .difference(&cluster_users)
            .copied()
            .collect();

        // Users with a VO account as default that they are no longer a member of
        let mut moved: BTreeMap<&str, &str> = BTreeMap::new();
        for (vo, members) in vo_members {
            for (user, _) in default_accounts
                .iter()
                .filter(|(user, default)| **default == vo.as_str() && !members.contains(**user))
                .filter(|(user, _)| active_accounts.contains(**user))
            {
                moved.entry(*user).or_insert(vo.as_str());
            }
        }

        let removed: BTreeSet<&str> = cluster_users
            .difference(&active_vo_members)
            .copied()
            .collect();

        debug!(
            "{}: {} new users, {} removed users, {} moved users",
            cluster,
            new_users.len(),
            removed.len(),
            moved.len()
        );

        for user in &new_users {
            if let Some(vo) = reverse.get(user) {
                changes
                    .commands
                    .push(sacctmgr::add_user(user, vo, cluster, true));
            }
        }

        for user in &removed {
            changes.job_cancels.push(JobCancel {
                cluster: cluster.clone(),
                scope: CancelScope::User {
                    user: user.to_string(),
                    account: None,
                },
                commands: scancel::cancel_user_jobs(user, cluster, None),
            });
            changes.removals.push(sacctmgr::remove_user(user, cluster));
        }

        for (user, old_vo) in &moved {
            let Some(new_vo) = reverse.get(user) else {
                warn!(
                    "User {} left {} on {} but is not in any VO, skipping",
                    user, old_vo, cluster
                );
                changes.anomalies.push(Anomaly::UnknownMovedUser {
                    user: user.to_string(),
                    account: old_vo.to_string(),
                    cluster: cluster.clone(),
                });
                continue;
            };

            debug!(
                "Moving user {} on {} from {} to {}",
                user, cluster, old_vo, new_vo
            );
            if !associations.contains(&(*user, *new_vo)) {
                changes
                    .commands
                    .push(sacctmgr::add_user(user, new_vo, cluster, false));
            }
            changes
                .commands
                .push(sacctmgr::set_default_account(user, new_vo, cluster));
            changes.job_cancels.push(JobCancel {
                cluster: cluster.clone(),
                scope: CancelScope::User {
                    user: user.to_string(),
                    account: Some(old_vo.to_string()),
                },
                commands: scancel::cancel_user_jobs(user, cluster, Some(*old_vo)),
            });
            changes
                .removals
                .push(sacctmgr::remove_user_account(user, old_vo, cluster));
        }
    }

    changes
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_reverse_map_first_vo_wins() {
        let vo_members: BTreeMap<String, BTreeSet<String>> = [
            ("vo2".to_string(), set(&["user1", "user2"])),
            ("vo1".to_string(), set(&["user1"])),
        ]
        .into_iter()
        .collect();
        let reverse = reverse_vo_map(&vo_members);
        assert_eq!(reverse["user1"], "vo1");
        assert_eq!(reverse["user2"], "vo2");
    }
}
