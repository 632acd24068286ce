//! External license resources and their reservations
//!
//! Slurm learns about an external license pool through a `License` resource
//! (`name@server`, with the pool size as count). Licenses checked out outside
//! of Slurm are blocked with a license-only reservation named
//! `external_license_<name>@<server>`.
//!
//! Licenses marked `skip` could not be confirmed by their license server.
//! They are neither created, updated nor removed.

use std::collections::{BTreeMap, BTreeSet};

use log::{debug, info, warn};

use super::Changes;
use crate::commands::sacctmgr::{self, LicenseResource};
use crate::commands::scontrol;
use crate::desired::LicenseSpec;
use crate::errors::{Anomaly, SyncError};
use crate::models::{SlurmConfig, SlurmLicense, SlurmPartition, SlurmReservation, SlurmResource};

/// Observed Slurm state the reservations are reconciled against
#[derive(Debug, Clone)]
pub struct ReservationSnapshot {
    pub config: SlurmConfig,
    pub partitions: Vec<SlurmPartition>,
    pub licenses: Vec<SlurmLicense>,
    pub reservations: Vec<SlurmReservation>,
}

fn is_ignored(ignore: &[String], names: &[&str]) -> bool {
    ignore.iter().any(|i| names.contains(&i.as_str()))
}

/// Reconcile the license resources on `clusters`.
///
/// A resource is updated when its count differs, or always with `force_update`.
pub fn license_resources(
    licenses: &BTreeMap<String, LicenseSpec>,
    resources: &[SlurmResource],
    clusters: &[String],
    ignore_resources: &[String],
    force_update: bool,
) -> Changes {
    let mut changes = Changes::default();

    let observed: BTreeMap<String, &SlurmResource> = resources
        .iter()
        .filter(|r| r.is_license())
        .filter(|r| !is_ignored(ignore_resources, &[r.name.as_str(), r.key().as_str()]))
        .map(|r| (r.key(), r))
        .collect();
    debug!("{} license resources found", observed.len());

    for (key, license) in licenses {
        if license.skip {
            warn!("License {} was not confirmed by its server, leaving it alone", key);
            changes.anomalies.push(Anomaly::LicenseSkipped {
                license: key.clone(),
            });
            continue;
        }

        let resource = LicenseResource {
            name: &license.name,
            server: &license.server,
            server_type: &license.license_type,
        };
        match observed.get(key) {
            None => changes.commands.push(sacctmgr::add_license_resource(
                &resource,
                clusters,
                license.count,
            )),
            // Only the count is updated, clusters are set when the resource is created
            Some(current) if force_update || current.count != license.count => changes
                .commands
                .push(sacctmgr::modify_license_resource(&resource, license.count)),
            Some(_) => {}
        }
    }

    for (key, current) in &observed {
        if licenses.contains_key(key) {
            continue;
        }
        info!("Removing license resource {}", key);
        changes
            .removals
            .push(sacctmgr::remove_license_resource(&LicenseResource {
                name: &current.name,
                server: &current.server,
                server_type: current.server_type.as_deref().unwrap_or_default(),
            }));
    }

    changes
}

/// Number of licenses to reserve for an existing reservation.
///
/// Licenses Slurm hands out to jobs also show up as in use on the license
/// server, so only the difference is reserved. When Slurm counts more than the
/// server, nothing is reserved.
pub fn reserved_quantity(license: &str, in_use: u64, used: u64) -> (u64, Option<Anomaly>) {
    if used > in_use {
        warn!(
            "License {}: Slurm uses {} but the server reports {} in use, reserving 0",
            license, used, in_use
        );
        let anomaly = Anomaly::ReservationClamped {
            license: license.to_string(),
            in_use,
            used,
        };
        (0, Some(anomaly))
    } else {
        (in_use - used, None)
    }
}

/// Reconcile the license reservations on the reservation cluster.
///
/// Fails when `cluster` is not the cluster Slurm reports, or when `partition`
/// does not exist on it.
pub fn license_reservations(
    licenses: &BTreeMap<String, LicenseSpec>,
    snapshot: &ReservationSnapshot,
    cluster: &str,
    partition: &str,
    ignore_reservations: &[String],
    force_update: bool,
) -> Result<Changes, SyncError> {
    if snapshot.config.cluster_name != cluster {
        return Err(SyncError::IdentityMismatch {
            what: "cluster",
            expected: cluster.to_string(),
            actual: snapshot.config.cluster_name.clone(),
        });
    }
    if !snapshot.partitions.iter().any(|p| p.name == partition) {
        let known: Vec<&str> = snapshot.partitions.iter().map(|p| p.name.as_str()).collect();
        return Err(SyncError::IdentityMismatch {
            what: "partition",
            expected: partition.to_string(),
            actual: known.join(","),
        });
    }

    let mut changes = Changes::default();

    let used: BTreeMap<&str, u64> = snapshot
        .licenses
        .iter()
        .map(|l| (l.name.as_str(), l.used))
        .collect();
    let observed: BTreeMap<&str, &SlurmReservation> = snapshot
        .reservations
        .iter()
        .filter_map(|r| scontrol::reservation_license(&r.name).map(|license| (license, r)))
        .filter(|(license, r)| !is_ignored(ignore_reservations, &[*license, r.name.as_str()]))
        .collect();
    debug!("{} license reservations found", observed.len());

    for (key, license) in licenses.iter().filter(|(_, l)| !l.skip) {
        match observed.get(key.as_str()) {
            None => changes.commands.push(scontrol::create_license_reservation(
                key,
                license.in_use,
                partition,
            )),
            Some(reservation) => {
                let slurm_used = used.get(key.as_str()).copied().unwrap_or(0);
                let (quantity, anomaly) = reserved_quantity(key, license.in_use, slurm_used);
                changes.anomalies.extend(anomaly);

                let current = reservation.license_count(key);
                if force_update || current != Some(quantity) {
                    debug!(
                        "Reservation {} holds {:?}, needs {}",
                        reservation.name, current, quantity
                    );
                    changes
                        .commands
                        .push(scontrol::update_license_reservation(key, quantity));
                }
            }
        }
    }

    let desired: BTreeSet<&str> = licenses.keys().map(String::as_str).collect();
    for (license, reservation) in &observed {
        if !desired.contains(license) {
            info!("Removing reservation {}", reservation.name);
            changes
                .removals
                .push(scontrol::delete_reservation(&reservation.name));
        }
    }

    Ok(changes)
}
