//! Institute and VO accounts

use std::collections::BTreeSet;

use log::{debug, info};

use super::{Changes, cluster_accounts};
use crate::commands::sacctmgr::{self, NewAccount};
use crate::config::AccountSyncConfig;
use crate::desired::Vo;
use crate::errors::SyncError;
use crate::models::SlurmAccount;

/// Make sure every configured institute and its default VO exist on each
/// cluster. Institute accounts are never removed.
///
/// The default VO takes its fairshare from `vos`; a default VO that has to be
/// created but is missing from `vos` is a configuration error.
pub fn institute_accounts(
    vos: &[Vo],
    accounts: &[SlurmAccount],
    clusters: &[String],
    config: &AccountSyncConfig,
) -> Result<Changes, SyncError> {
    let mut changes = Changes::default();

    let mut institutes: Vec<_> = config.institutes.iter().collect();
    institutes.sort_by(|a, b| a.name.cmp(&b.name));

    for cluster in clusters {
        let existing = cluster_accounts(accounts, cluster);

        for institute in &institutes {
            if !existing.contains_key(institute.name.as_str()) {
                changes.commands.push(sacctmgr::add_account(
                    &NewAccount {
                        name: &institute.name,
                        parent: None,
                        organisation: &institute.name,
                        cluster,
                        fairshare: Some(institute.fairshare),
                        qos: &[],
                    },
                    &config.organisations,
                )?);
            }

            if !existing.contains_key(institute.default_vo.as_str()) {
                let vo = vos
                    .iter()
                    .find(|vo| vo.vsc_id == institute.default_vo)
                    .ok_or_else(|| {
                        SyncError::Config(format!(
                            "default VO {} of institute {} is not in the desired state",
                            institute.default_vo, institute.name
                        ))
                    })?;
                changes.commands.push(sacctmgr::add_account(
                    &NewAccount {
                        name: &institute.default_vo,
                        parent: Some(&institute.name),
                        organisation: &institute.name,
                        cluster,
                        fairshare: Some(vo.fairshare),
                        qos: &[],
                    },
                    &config.organisations,
                )?);
            }
        }
    }

    Ok(changes)
}

/// Create accounts for new VOs and update the fairshare of existing ones.
///
/// The institute default VOs are handled by [`institute_accounts`]. VOs that
/// disappeared from the desired state are reported but keep their account.
pub fn vo_accounts(
    vos: &[Vo],
    accounts: &[SlurmAccount],
    clusters: &[String],
    config: &AccountSyncConfig,
) -> Result<Changes, SyncError> {
    let mut changes = Changes::default();
    let default_vos = config.default_vos();

    let mut sorted: Vec<&Vo> = vos
        .iter()
        .filter(|vo| !default_vos.contains(&vo.vsc_id.as_str()))
        .collect();
    sorted.sort_by(|a, b| a.vsc_id.cmp(&b.vsc_id));

    let institutes: BTreeSet<&str> = config
        .institutes
        .iter()
        .map(|institute| institute.name.as_str())
        .collect();
    let desired: BTreeSet<&str> = vos.iter().map(|vo| vo.vsc_id.as_str()).collect();

    for cluster in clusters {
        let existing = cluster_accounts(accounts, cluster);

        for vo in &sorted {
            match existing.get(vo.vsc_id.as_str()) {
                None => changes.commands.push(sacctmgr::add_account(
                    &NewAccount {
                        name: &vo.vsc_id,
                        parent: Some(&vo.institute),
                        organisation: &vo.institute,
                        cluster,
                        fairshare: Some(vo.fairshare),
                        qos: &[],
                    },
                    &config.organisations,
                )?),
                Some(account) if account.fairshare() != Some(vo.fairshare) => {
                    debug!(
                        "Fairshare of {} on {} changes from {:?} to {}",
                        vo.vsc_id,
                        cluster,
                        account.share,
                        vo.fairshare
                    );
                    changes.commands.push(sacctmgr::change_account_fairshare(
                        &vo.vsc_id,
                        cluster,
                        vo.fairshare,
                    ));
                }
                Some(_) => {}
            }
        }

        let vanished: Vec<&str> = existing
            .iter()
            .filter(|(name, account)| {
                institutes.contains(account.parent())
                    && !desired.contains(*name)
                    && !config.protected_accounts.iter().any(|p| p == *name)
            })
            .map(|(name, _)| *name)
            .collect();
        if !vanished.is_empty() {
            info!(
                "VO accounts on {} without a VO, not removing: {}",
                cluster,
                vanished.join(", ")
            );
        }
    }

    Ok(changes)
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::*;

    fn vo(vsc_id: &str, institute: &str, fairshare: u64) -> Vo {
        Vo {
            vsc_id: vsc_id.to_string(),
            institute: institute.to_string(),
            fairshare,
            members: BTreeSet::new(),
            moderators: BTreeSet::new(),
        }
    }

    #[test]
    fn test_institute_default_vo_missing_from_desired() {
        let config = AccountSyncConfig::default();
        let err = institute_accounts(&[], &[], &["mycluster".to_string()], &config).unwrap_err();
        assert!(matches!(err, SyncError::Config(_)));
    }

    #[test]
    fn test_vo_unknown_institute() {
        let config = AccountSyncConfig::default();
        let vos = vec![vo("xvo00001", "mars", 10)];
        let err = vo_accounts(&vos, &[], &["mycluster".to_string()], &config).unwrap_err();
        assert!(matches!(err, SyncError::UnknownOrganisation(_)));
    }
}
