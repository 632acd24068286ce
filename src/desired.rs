//! Desired state as exported from the identity service
//!
//! A run reads one JSON snapshot:
//!
//! ```json
//! {
//!   "active_accounts": ["vsc10001", "vsc10002"],
//!   "vos": [{"vsc_id": "gvo00002", "institute": "gent", "fairshare": 20,
//!            "members": ["vsc10001"], "moderators": []}],
//!   "projects": [{"name": "gpr_compute_project1", "members": ["vsc10002"],
//!                 "moderators": [], "cpu_hours": 1000, "gpu_hours": 0,
//!                 "end_date": "2026-12-31"}]
//! }
//! ```

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;

use chrono::NaiveDate;
use log::debug;
use serde::{Deserialize, Serialize};

use crate::errors::SyncError;

/// A virtual organisation: a VO account and its members
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vo {
    pub vsc_id: String,
    pub institute: String,
    pub fairshare: u64,
    #[serde(default)]
    pub members: BTreeSet<String>,
    #[serde(default)]
    pub moderators: BTreeSet<String>,
}

/// A compute project with its budget
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    pub name: String,
    #[serde(default)]
    pub members: BTreeSet<String>,
    #[serde(default)]
    pub moderators: BTreeSet<String>,
    #[serde(default)]
    pub cpu_hours: u64,
    #[serde(default)]
    pub gpu_hours: u64,
    /// Last day of the project; open-ended when absent
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
}

impl Project {
    pub fn is_active(&self, today: NaiveDate) -> bool {
        self.end_date.is_none_or(|end| end >= today)
    }
}

/// An external license pool and what its license server reports
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LicenseSpec {
    /// Name users request in their jobs
    pub name: String,
    /// License server id, the `Server` of the Slurm resource
    pub server: String,
    /// Server type, e.g. `flexlm`
    pub license_type: String,
    /// Licenses made available to Slurm
    pub count: u64,
    /// Licenses in use according to the license server
    #[serde(default)]
    pub in_use: u64,
    /// Licenses issued by the license server
    #[serde(default)]
    pub total: u64,
    /// The license server did not confirm this license; leave it alone
    #[serde(default)]
    pub skip: bool,
}

impl LicenseSpec {
    /// `name@server`, as Slurm names remote licenses
    pub fn key(&self) -> String {
        format!("{}@{}", self.name, self.server)
    }
}

/// Snapshot of the desired state
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DesiredState {
    /// Users whose account is active
    #[serde(default)]
    pub active_accounts: BTreeSet<String>,
    #[serde(default)]
    pub vos: Vec<Vo>,
    #[serde(default)]
    pub projects: Vec<Project>,
}

impl DesiredState {
    pub fn from_json(content: &str) -> Result<Self, SyncError> {
        Ok(serde_json::from_str(content)?)
    }

    pub fn load(path: &Path) -> Result<Self, SyncError> {
        debug!("Loading desired state from {}", path.display());
        Self::from_json(&fs::read_to_string(path)?)
    }

    /// VO members keyed by VO id
    pub fn vo_members(&self) -> BTreeMap<String, BTreeSet<String>> {
        self.vos
            .iter()
            .map(|vo| (vo.vsc_id.clone(), vo.members.clone()))
            .collect()
    }

    /// Projects that have not ended before `today`
    pub fn active_projects(&self, today: NaiveDate) -> Vec<Project> {
        self.projects
            .iter()
            .filter(|project| {
                let active = project.is_active(today);
                if !active {
                    debug!("Project {} ended on {:?}", project.name, project.end_date);
                }
                active
            })
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SNAPSHOT: &str = r#"{
        "active_accounts": ["vsc10001", "vsc10002"],
        "vos": [
            {"vsc_id": "gvo00002", "institute": "gent", "fairshare": 20,
             "members": ["vsc10001"], "moderators": ["vsc10001"]}
        ],
        "projects": [
            {"name": "gpr_compute_p1", "members": ["vsc10002"], "cpu_hours": 100},
            {"name": "gpr_compute_p2", "members": [], "end_date": "2026-01-31"}
        ]
    }"#;

    #[test]
    fn test_parse_snapshot() {
        let desired = DesiredState::from_json(SNAPSHOT).unwrap();
        assert_eq!(desired.active_accounts.len(), 2);
        assert_eq!(desired.vos[0].vsc_id, "gvo00002");
        assert_eq!(desired.vos[0].fairshare, 20);
        assert_eq!(desired.projects[0].gpu_hours, 0);
        assert_eq!(
            desired.vo_members()["gvo00002"],
            BTreeSet::from(["vsc10001".to_string()])
        );
    }

    #[test]
    fn test_active_projects() {
        let desired = DesiredState::from_json(SNAPSHOT).unwrap();
        let on_end_date = NaiveDate::from_ymd_opt(2026, 1, 31).unwrap();
        assert_eq!(desired.active_projects(on_end_date).len(), 2);

        let after = NaiveDate::from_ymd_opt(2026, 2, 1).unwrap();
        let active = desired.active_projects(after);
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].name, "gpr_compute_p1");
    }

    #[test]
    fn test_invalid_snapshot() {
        let err = DesiredState::from_json("{\"vos\": 3}").unwrap_err();
        assert!(matches!(err, SyncError::Json(_)));
    }
}
