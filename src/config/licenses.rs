//! Configuration of the license resource and reservation reconciliation

use serde::{Deserialize, Serialize};

/// Settings for the `licenses` run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LicenseSyncConfig {
    /// Clusters the license resources are made available on
    pub resource_clusters: Vec<String>,

    /// Cluster holding the license reservations
    pub reservation_cluster: String,

    /// Partition the license reservations are created in
    pub reservation_partition: String,

    /// License resources (`name@server`) left alone
    pub ignore_resources: Vec<String>,

    /// Reservations left alone
    pub ignore_reservations: Vec<String>,

    /// `lmutil` binary used when a license server does not name its own tool
    pub default_tool: String,
}

impl Default for LicenseSyncConfig {
    fn default() -> Self {
        Self {
            resource_clusters: Vec::new(),
            reservation_cluster: String::new(),
            reservation_partition: String::new(),
            ignore_resources: Vec::new(),
            ignore_reservations: Vec::new(),
            default_tool: "/usr/bin/lmutil".to_string(),
        }
    }
}

impl LicenseSyncConfig {
    pub(crate) fn validate(&self, errors: &mut Vec<String>) {
        if !self.reservation_cluster.is_empty()
            && !self.resource_clusters.contains(&self.reservation_cluster)
        {
            errors.push(format!(
                "licenses.reservation_cluster '{}' must be one of licenses.resource_clusters",
                self.reservation_cluster
            ));
        }
        if self.default_tool.is_empty() {
            errors.push("licenses.default_tool must not be empty".to_string());
        }
    }
}
