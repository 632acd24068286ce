//! `scontrol` commands for license reservations

use log::debug;

use super::{SlurmCommand, settings_args};

pub const LICENSE_RESERVATION_PREFIX: &str = "external_license_";

/// Slurm rejects unlimited durations, so a license reservation lasts 20 years
pub const LICENSE_RESERVATION_DAYS: u64 = 20 * 365;

pub fn license_reservation_name(license: &str) -> String {
    format!("{}{}", LICENSE_RESERVATION_PREFIX, license)
}

/// The license key a reservation was created for, if it is one of ours
pub fn reservation_license(reservation: &str) -> Option<&str> {
    reservation.strip_prefix(LICENSE_RESERVATION_PREFIX)
}

fn reservation_args(reservation: &str, settings: Vec<(&str, String)>) -> Vec<String> {
    let mut args = vec![
        "reservation".to_string(),
        format!("ReservationName={}", reservation),
    ];
    args.extend(settings_args(settings));
    args
}

/// Reserve `count` licenses for use outside of Slurm.
///
/// The reservation holds no nodes and only lets `root` in.
pub fn create_license_reservation(license: &str, count: u64, partition: &str) -> SlurmCommand {
    let name = license_reservation_name(license);
    debug!(
        "Adding command to create reservation {} for {} licenses in partition {}",
        name, count, partition
    );

    let settings = vec![
        ("Licenses", format!("{}:{}", license, count)),
        ("Partition", partition.to_string()),
        ("Start", "now".to_string()),
        ("Duration", format!("{}-0:0:0", LICENSE_RESERVATION_DAYS)),
        ("User", "root".to_string()),
        ("Flags", "LICENSE_ONLY".to_string()),
        // without it, all nodes end up in the reservation
        ("NodeCnt", "0".to_string()),
    ];
    SlurmCommand::scontrol("create", reservation_args(&name, settings))
}

pub fn update_license_reservation(license: &str, count: u64) -> SlurmCommand {
    let name = license_reservation_name(license);
    debug!("Adding command to set reservation {} to {} licenses", name, count);

    let settings = vec![("Licenses", format!("{}:{}", license, count))];
    SlurmCommand::scontrol("update", reservation_args(&name, settings))
}

/// Delete a reservation by its full name
pub fn delete_reservation(reservation: &str) -> SlurmCommand {
    debug!("Adding command to delete reservation {}", reservation);
    SlurmCommand::scontrol("delete", reservation_args(reservation, Vec::new()))
}
