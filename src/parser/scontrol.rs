//! Parsing of `scontrol show <kind> --detail --oneliner` output
//!
//! Every line is one entity, written as shell-quoted `Key=Value` tokens.
//! `(null)` values are read as absent. `scontrol show config` prints one
//! `Key = Value` pair per line instead; [`collapse_config`] rewrites that into
//! a single one-line entity first.

use std::collections::HashMap;
use std::fmt;

use log::{debug, warn};
use regex::Regex;

use super::content_lines;
use crate::errors::SyncError;
use crate::models::{SlurmConfig, SlurmLicense, SlurmPartition, SlurmReservation};

/// The `scontrol show` entity kinds we read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScontrolKind {
    Reservation,
    License,
    Config,
    Partition,
}

impl ScontrolKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScontrolKind::Reservation => "reservation",
            ScontrolKind::License => "license",
            ScontrolKind::Config => "config",
            ScontrolKind::Partition => "partition",
        }
    }
}

impl fmt::Display for ScontrolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "scontrol show {}", self.as_str())
    }
}

/// Why a single line could not be turned into a record
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldError {
    /// A required key is absent or `(null)`; the line is skipped
    Missing(&'static str),
    /// A numeric key holds something else; the whole output is rejected
    Invalid { field: &'static str, value: String },
}

/// The `Key=Value` pairs of one line
#[derive(Debug, Default)]
pub struct Fields {
    values: HashMap<String, Option<String>>,
}

impl Fields {
    /// Tokenize one line. Returns `None` when the quoting is unbalanced.
    pub fn from_line(line: &str) -> Option<Self> {
        let tokens = shlex::split(line)?;
        let values = tokens
            .into_iter()
            .map(|token| match token.split_once('=') {
                Some((key, "(null)")) => (key.to_string(), None),
                Some((key, value)) => (key.to_string(), Some(value.to_string())),
                None => (token, None),
            })
            .collect();
        Some(Self { values })
    }

    pub fn contains(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// Optional string value; empty values count as absent
    pub fn take(&mut self, key: &str) -> Option<String> {
        self.values
            .remove(key)
            .flatten()
            .filter(|value| !value.is_empty())
    }

    pub fn required(&mut self, key: &'static str) -> Result<String, FieldError> {
        self.take(key).ok_or(FieldError::Missing(key))
    }

    pub fn count(&mut self, key: &'static str) -> Result<u64, FieldError> {
        let value = self.required(key)?;
        value
            .parse()
            .map_err(|_| FieldError::Invalid { field: key, value })
    }

    /// Optional count where `UNLIMITED` means no value
    pub fn optional_count(&mut self, key: &'static str) -> Result<Option<u64>, FieldError> {
        match self.take(key) {
            None => Ok(None),
            Some(value) if value.eq_ignore_ascii_case("unlimited") => Ok(None),
            Some(value) => value
                .parse()
                .map(Some)
                .map_err(|_| FieldError::Invalid { field: key, value }),
        }
    }
}

/// A record type that can be read from `scontrol show` output
pub trait ScontrolRecord: Sized {
    const KIND: ScontrolKind;

    /// The key naming the entity on each line, if the kind has one
    const NAME_FIELD: Option<&'static str>;

    fn from_fields(fields: &mut Fields) -> Result<Self, FieldError>;
}

impl ScontrolRecord for SlurmReservation {
    const KIND: ScontrolKind = ScontrolKind::Reservation;
    const NAME_FIELD: Option<&'static str> = Some("ReservationName");

    fn from_fields(fields: &mut Fields) -> Result<Self, FieldError> {
        Ok(SlurmReservation {
            name: fields.required("ReservationName")?,
            start_time: fields.take("StartTime"),
            end_time: fields.take("EndTime"),
            duration: fields.take("Duration"),
            nodes: fields.take("Nodes"),
            node_cnt: fields.take("NodeCnt"),
            core_cnt: fields.take("CoreCnt"),
            features: fields.take("Features"),
            partition_name: fields.take("PartitionName"),
            flags: fields.take("Flags"),
            tres: fields.take("TRES"),
            users: fields.take("Users"),
            groups: fields.take("Groups"),
            accounts: fields.take("Accounts"),
            licenses: fields.take("Licenses"),
            state: fields.take("State"),
            burst_buffer: fields.take("BurstBuffer"),
            watts: fields.take("Watts"),
            max_start_delay: fields.take("MaxStartDelay"),
        })
    }
}

impl ScontrolRecord for SlurmLicense {
    const KIND: ScontrolKind = ScontrolKind::License;
    const NAME_FIELD: Option<&'static str> = Some("LicenseName");

    fn from_fields(fields: &mut Fields) -> Result<Self, FieldError> {
        Ok(SlurmLicense {
            name: fields.required("LicenseName")?,
            total: fields.count("Total")?,
            used: fields.count("Used")?,
            free: fields.count("Free")?,
            reserved: fields.count("Reserved")?,
            remote: fields.take("Remote"),
        })
    }
}

impl ScontrolRecord for SlurmConfig {
    const KIND: ScontrolKind = ScontrolKind::Config;
    const NAME_FIELD: Option<&'static str> = None;

    fn from_fields(fields: &mut Fields) -> Result<Self, FieldError> {
        Ok(SlurmConfig {
            cluster_name: fields.required("ClusterName")?,
            accounting_storage_host: fields.take("AccountingStorageHost"),
            slurm_conf: fields.take("SLURM_CONF"),
            slurm_version: fields.take("SLURM_VERSION"),
        })
    }
}

impl ScontrolRecord for SlurmPartition {
    const KIND: ScontrolKind = ScontrolKind::Partition;
    const NAME_FIELD: Option<&'static str> = Some("PartitionName");

    fn from_fields(fields: &mut Fields) -> Result<Self, FieldError> {
        Ok(SlurmPartition {
            name: fields.required("PartitionName")?,
            allow_groups: fields.take("AllowGroups"),
            allow_accounts: fields.take("AllowAccounts"),
            allow_qos: fields.take("AllowQos"),
            alloc_nodes: fields.take("AllocNodes"),
            default: fields.take("Default"),
            qos: fields.take("QoS"),
            default_time: fields.take("DefaultTime"),
            disable_root_jobs: fields.take("DisableRootJobs"),
            exclusive_user: fields.take("ExclusiveUser"),
            grace_time: fields.take("GraceTime"),
            hidden: fields.take("Hidden"),
            max_nodes: fields.take("MaxNodes"),
            max_time: fields.take("MaxTime"),
            min_nodes: fields.take("MinNodes"),
            lln: fields.take("LLN"),
            max_cpus_per_node: fields.take("MaxCPUsPerNode"),
            nodes: fields.take("Nodes"),
            priority_job_factor: fields.take("PriorityJobFactor"),
            priority_tier: fields.take("PriorityTier"),
            root_only: fields.take("RootOnly"),
            req_resv: fields.take("ReqResv"),
            over_subscribe: fields.take("OverSubscribe"),
            over_time_limit: fields.take("OverTimeLimit"),
            preempt_mode: fields.take("PreemptMode"),
            state: fields.take("State"),
            total_cpus: fields.count("TotalCPUs")?,
            total_nodes: fields.count("TotalNodes")?,
            select_type_parameters: fields.take("SelectTypeParameters"),
            job_defaults: fields.take("JobDefaults"),
            def_mem_per_cpu: fields.optional_count("DefMemPerCPU")?,
            max_mem_per_node: fields.optional_count("MaxMemPerNode")?,
            tres_billing_weights: fields.take("TRESBillingWeights"),
        })
    }
}

/// Rewrite multi-line `scontrol show config` output into one `Key="Value"` line.
///
/// Lines that are not `Key = Value` (the banner, section titles) are dropped.
pub fn collapse_config(output: &str) -> Result<String, SyncError> {
    let config_line = Regex::new(r"^(.*\S)\s+=\s+(\S.*)$")
        .map_err(|e| SyncError::parse(ScontrolKind::Config, e.to_string()))?;

    Ok(output
        .lines()
        .filter_map(|line| {
            config_line.captures(line.trim_end()).map(|caps| {
                format!("{}=\"{}\"", &caps[1], caps[2].replace('"', "\\\""))
            })
        })
        .collect::<Vec<_>>()
        .join(" "))
}

/// Parse `scontrol show --detail --oneliner` output into records of type `T`.
///
/// A lone `No ... in the system` line yields no records. Lines that cannot be
/// tokenized, belong to another kind, or miss a required key are logged and
/// skipped. A non-numeric count rejects the whole output.
pub fn parse_scontrol_dump<T: ScontrolRecord>(output: &str) -> Result<Vec<T>, SyncError> {
    let lines: Vec<&str> = content_lines(output).collect();
    if let [line] = lines.as_slice()
        && line.starts_with("No ")
    {
        warn!("Output indicates there was no result for {}: '{}'", T::KIND, line);
        return Ok(Vec::new());
    }

    let mut records = Vec::new();
    for line in lines {
        debug!("line {}", line);
        let Some(mut fields) = Fields::from_line(line) else {
            warn!("Could not tokenize {} line: {}", T::KIND, line);
            continue;
        };
        if let Some(name_field) = T::NAME_FIELD
            && !fields.contains(name_field)
        {
            debug!("Ignoring line without {}: {}", name_field, line);
            continue;
        }

        match T::from_fields(&mut fields) {
            Ok(record) => records.push(record),
            Err(FieldError::Missing(field)) => {
                warn!("Skipping {} line without {}: {}", T::KIND, field, line);
            }
            Err(FieldError::Invalid { field, value }) => {
                return Err(SyncError::parse(
                    T::KIND,
                    format!("{} is not a number ('{}') in line: {}", field, value, line),
                ));
            }
        }
    }

    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fields_null_and_quoting() {
        let mut fields =
            Fields::from_line("ReservationName=maint Users=(null) Features=\"a b\" Flags=").unwrap();
        assert_eq!(fields.take("ReservationName").as_deref(), Some("maint"));
        assert_eq!(fields.take("Users"), None);
        assert_eq!(fields.take("Features").as_deref(), Some("a b"));
        assert_eq!(fields.take("Flags"), None);
        assert_eq!(fields.take("Nope"), None);
    }

    #[test]
    fn test_unbalanced_quotes() {
        assert!(Fields::from_line("ReservationName=\"oops").is_none());
    }

    #[test]
    fn test_optional_count() {
        let mut fields = Fields::from_line("A=UNLIMITED B=1024 C=lots").unwrap();
        assert_eq!(fields.optional_count("A"), Ok(None));
        assert_eq!(fields.optional_count("B"), Ok(Some(1024)));
        assert_eq!(fields.optional_count("D"), Ok(None));
        assert_eq!(
            fields.optional_count("C"),
            Err(FieldError::Invalid {
                field: "C",
                value: "lots".to_string()
            })
        );
    }

    #[test]
    fn test_collapse_config() {
        let output = "Configuration data as of 2023-05-05T12:00:00\n\
                      AccountingStorageHost   = slurmdb.example.org\n\
                      ClusterName             = thecluster\n\
                      SLURM_VERSION           = 22.05.8\n\
                      \n\
                      Cgroup Support Configuration:\n";
        assert_eq!(
            collapse_config(output).unwrap(),
            "AccountingStorageHost=\"slurmdb.example.org\" ClusterName=\"thecluster\" \
             SLURM_VERSION=\"22.05.8\""
        );
    }

    #[test]
    fn test_no_result_sentinel() {
        let reservations: Vec<SlurmReservation> =
            parse_scontrol_dump("No reservations in the system\n").unwrap();
        assert!(reservations.is_empty());
    }
}
