//! Observed-state records parsed from the Slurm command line tools
//!
//! The `sacctmgr` records deserialize straight from the pipe-separated
//! listings (`sacctmgr -s -P list ...`), with serde renames matching the
//! normalized column headers. The `scontrol` records are built from one-line
//! `Key=Value` output by [`crate::parser::scontrol`].
//!
//! Column sets follow Slurm 21.08 and later. When Slurm renames or adds
//! columns, update the records here rather than the reconcilers.

use serde::{Deserialize, Serialize};

/// Account row from `sacctmgr -s -P list accounts`.
///
/// Rows that carry a `User` are associations, not accounts; the parser drops them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlurmAccount {
    #[serde(rename = "Account")]
    pub account: String,
    #[serde(rename = "Descr")]
    pub descr: Option<String>,
    #[serde(rename = "Org")]
    pub org: Option<String>,
    #[serde(rename = "Cluster")]
    pub cluster: String,
    /// Older Slurm versions label this column `Par Name`
    #[serde(rename = "ParentName", alias = "Par_Name")]
    pub parent_name: Option<String>,
    #[serde(rename = "User")]
    pub user: Option<String>,
    /// Raw share value, which may also be `parent`
    #[serde(rename = "Share")]
    pub share: Option<String>,
    #[serde(rename = "GrpJobs")]
    pub grp_jobs: Option<String>,
    #[serde(rename = "GrpNodes")]
    pub grp_nodes: Option<String>,
    #[serde(rename = "GrpCPUs")]
    pub grp_cpus: Option<String>,
    #[serde(rename = "GrpMem")]
    pub grp_mem: Option<String>,
    #[serde(rename = "GrpSubmit")]
    pub grp_submit: Option<String>,
    #[serde(rename = "GrpWall")]
    pub grp_wall: Option<String>,
    #[serde(rename = "GrpCPUMins")]
    pub grp_cpu_mins: Option<String>,
    #[serde(rename = "MaxJobs")]
    pub max_jobs: Option<String>,
    #[serde(rename = "MaxNodes")]
    pub max_nodes: Option<String>,
    #[serde(rename = "MaxCPUs")]
    pub max_cpus: Option<String>,
    #[serde(rename = "MaxSubmit")]
    pub max_submit: Option<String>,
    #[serde(rename = "MaxWall")]
    pub max_wall: Option<String>,
    #[serde(rename = "MaxCPUMins")]
    pub max_cpu_mins: Option<String>,
    #[serde(rename = "QOS")]
    pub qos: Option<String>,
    #[serde(rename = "Def_QOS")]
    pub def_qos: Option<String>,
}

impl SlurmAccount {
    /// Numeric fairshare, `None` when unset or inherited from the parent
    pub fn fairshare(&self) -> Option<u64> {
        self.share.as_deref().and_then(|s| s.parse().ok())
    }

    pub fn parent(&self) -> &str {
        self.parent_name.as_deref().unwrap_or("root")
    }
}

/// User association row from `sacctmgr -s -P list users`.
///
/// A user has one row per account it is associated with on each cluster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlurmUser {
    #[serde(rename = "User")]
    pub user: String,
    #[serde(rename = "Def_Acct")]
    pub def_acct: Option<String>,
    #[serde(rename = "Admin")]
    pub admin: Option<String>,
    #[serde(rename = "Cluster")]
    pub cluster: String,
    #[serde(rename = "Account")]
    pub account: String,
    #[serde(rename = "Partition")]
    pub partition: Option<String>,
    #[serde(rename = "Share")]
    pub share: Option<String>,
    #[serde(rename = "MaxJobs")]
    pub max_jobs: Option<String>,
    #[serde(rename = "MaxNodes")]
    pub max_nodes: Option<String>,
    #[serde(rename = "MaxCPUs")]
    pub max_cpus: Option<String>,
    #[serde(rename = "MaxSubmit")]
    pub max_submit: Option<String>,
    #[serde(rename = "MaxWall")]
    pub max_wall: Option<String>,
    #[serde(rename = "MaxCPUMins")]
    pub max_cpu_mins: Option<String>,
    #[serde(rename = "QOS")]
    pub qos: Option<String>,
    #[serde(rename = "Def_QOS")]
    pub def_qos: Option<String>,
}

/// QOS row from `sacctmgr -s -P list qos`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlurmQos {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Priority")]
    pub priority: Option<String>,
    #[serde(rename = "GraceTime")]
    pub grace_time: Option<String>,
    #[serde(rename = "Preempt")]
    pub preempt: Option<String>,
    #[serde(rename = "PreemptExemptTime")]
    pub preempt_exempt_time: Option<String>,
    #[serde(rename = "PreemptMode")]
    pub preempt_mode: Option<String>,
    #[serde(rename = "Flags")]
    pub flags: Option<String>,
    #[serde(rename = "UsageThres")]
    pub usage_thres: Option<String>,
    #[serde(rename = "UsageFactor")]
    pub usage_factor: Option<String>,
    #[serde(rename = "GrpTRES")]
    pub grp_tres: Option<String>,
    #[serde(rename = "GrpTRESMins")]
    pub grp_tres_mins: Option<String>,
    #[serde(rename = "GrpTRESRunMins")]
    pub grp_tres_run_mins: Option<String>,
    #[serde(rename = "GrpJobs")]
    pub grp_jobs: Option<String>,
    #[serde(rename = "GrpSubmit")]
    pub grp_submit: Option<String>,
    #[serde(rename = "GrpWall")]
    pub grp_wall: Option<String>,
    #[serde(rename = "MaxTRES")]
    pub max_tres: Option<String>,
    #[serde(rename = "MaxTRESPerNode")]
    pub max_tres_per_node: Option<String>,
    #[serde(rename = "MaxTRESMins")]
    pub max_tres_mins: Option<String>,
    #[serde(rename = "MaxWall")]
    pub max_wall: Option<String>,
    #[serde(rename = "MaxTRESPU")]
    pub max_tres_pu: Option<String>,
    #[serde(rename = "MaxJobsPU")]
    pub max_jobs_pu: Option<String>,
    #[serde(rename = "MaxSubmitPU")]
    pub max_submit_pu: Option<String>,
    #[serde(rename = "MaxTRESPA")]
    pub max_tres_pa: Option<String>,
    #[serde(rename = "MaxJobsPA")]
    pub max_jobs_pa: Option<String>,
    #[serde(rename = "MaxSubmitPA")]
    pub max_submit_pa: Option<String>,
    #[serde(rename = "MinTRES")]
    pub min_tres: Option<String>,
}

/// Resource row from `sacctmgr -s -P list resource`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlurmResource {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "Server")]
    pub server: String,
    #[serde(rename = "Type")]
    pub resource_type: String,
    /// Total number of licenses in the pool
    #[serde(rename = "Count")]
    pub count: u64,
    /// The `% Allocated` column
    #[serde(rename = "PCT__Allocated")]
    pub pct_allocated: Option<String>,
    #[serde(rename = "ServerType")]
    pub server_type: Option<String>,
}

impl SlurmResource {
    pub fn is_license(&self) -> bool {
        self.resource_type.eq_ignore_ascii_case("license")
    }

    /// Key used to match against configured licenses: `name@server`
    pub fn key(&self) -> String {
        format!("{}@{}", self.name, self.server)
    }
}

/// Reservation from `scontrol show reservation --detail --oneliner`
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SlurmReservation {
    pub name: String,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    pub duration: Option<String>,
    pub nodes: Option<String>,
    pub node_cnt: Option<String>,
    pub core_cnt: Option<String>,
    pub features: Option<String>,
    pub partition_name: Option<String>,
    pub flags: Option<String>,
    pub tres: Option<String>,
    pub users: Option<String>,
    pub groups: Option<String>,
    pub accounts: Option<String>,
    pub licenses: Option<String>,
    pub state: Option<String>,
    pub burst_buffer: Option<String>,
    pub watts: Option<String>,
    pub max_start_delay: Option<String>,
}

impl SlurmReservation {
    /// Licenses held by the reservation, from `name:count[,name:count...]`.
    ///
    /// A license listed without a count holds one license, as in Slurm.
    pub fn licenses(&self) -> Vec<(String, u64)> {
        let Some(licenses) = self.licenses.as_deref() else {
            return Vec::new();
        };

        licenses
            .split(',')
            .map(str::trim)
            .filter(|entry| !entry.is_empty())
            .filter_map(|entry| match entry.rsplit_once(':') {
                Some((name, count)) => count.parse().ok().map(|c| (name.to_string(), c)),
                None => Some((entry.to_string(), 1)),
            })
            .collect()
    }

    /// Number of licenses of `license` held by this reservation
    pub fn license_count(&self, license: &str) -> Option<u64> {
        self.licenses()
            .into_iter()
            .find(|(name, _)| name == license)
            .map(|(_, count)| count)
    }
}

/// License from `scontrol show license --detail --oneliner`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlurmLicense {
    /// `name@server` for remote licenses
    pub name: String,
    pub total: u64,
    pub used: u64,
    pub free: u64,
    pub reserved: u64,
    pub remote: Option<String>,
}

/// The few `scontrol show config` settings the engine checks
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlurmConfig {
    pub cluster_name: String,
    pub accounting_storage_host: Option<String>,
    pub slurm_conf: Option<String>,
    pub slurm_version: Option<String>,
}

/// Partition from `scontrol show partition --detail --oneliner`
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SlurmPartition {
    pub name: String,
    pub allow_groups: Option<String>,
    pub allow_accounts: Option<String>,
    pub allow_qos: Option<String>,
    pub alloc_nodes: Option<String>,
    pub default: Option<String>,
    pub qos: Option<String>,
    pub default_time: Option<String>,
    pub disable_root_jobs: Option<String>,
    pub exclusive_user: Option<String>,
    pub grace_time: Option<String>,
    pub hidden: Option<String>,
    pub max_nodes: Option<String>,
    pub max_time: Option<String>,
    pub min_nodes: Option<String>,
    pub lln: Option<String>,
    pub max_cpus_per_node: Option<String>,
    pub nodes: Option<String>,
    pub priority_job_factor: Option<String>,
    pub priority_tier: Option<String>,
    pub root_only: Option<String>,
    pub req_resv: Option<String>,
    pub over_subscribe: Option<String>,
    pub over_time_limit: Option<String>,
    pub preempt_mode: Option<String>,
    pub state: Option<String>,
    pub total_cpus: u64,
    pub total_nodes: u64,
    pub select_type_parameters: Option<String>,
    pub job_defaults: Option<String>,
    /// `None` when unset or `UNLIMITED`
    pub def_mem_per_cpu: Option<u64>,
    /// `None` when unset or `UNLIMITED`
    pub max_mem_per_node: Option<u64>,
    pub tres_billing_weights: Option<String>,
}
