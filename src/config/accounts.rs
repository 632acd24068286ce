//! Configuration of the account, user and project reconciliation

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A permanent institute account and its default VO
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstituteConfig {
    /// Institute name, also the Slurm account name
    pub name: String,

    /// VO every institute member without another VO ends up in
    pub default_vo: String,

    /// Fairshare of the institute account
    pub fairshare: u64,
}

impl InstituteConfig {
    pub fn new(name: &str, default_vo: &str, fairshare: u64) -> Self {
        Self {
            name: name.to_string(),
            default_vo: default_vo.to_string(),
            fairshare,
        }
    }
}

/// Settings for the `accounts` and `projects` runs
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AccountSyncConfig {
    /// Institute operating the clusters; project accounts belong to it
    pub host_institute: String,

    /// Parent account of all project accounts
    pub project_parent: String,

    /// Account every project member is also associated with
    pub project_default_account: Option<String>,

    /// Accounts that are never removed. Users associated with one of them keep
    /// their default-account association.
    pub protected_accounts: Vec<String>,

    /// QOS that are never removed
    pub protected_qos: Vec<String>,

    /// QOS attached to every project account next to its own
    pub general_qos: Vec<String>,

    /// Remove project QOS whose project is gone
    pub qos_cleanup: bool,

    /// Organisation name to Slurm `Organization` code
    pub organisations: BTreeMap<String, String>,

    /// Permanent institute accounts
    pub institutes: Vec<InstituteConfig>,
}

impl Default for AccountSyncConfig {
    fn default() -> Self {
        Self {
            host_institute: "gent".to_string(),
            project_parent: "projects".to_string(),
            project_default_account: None,
            protected_accounts: Vec::new(),
            protected_qos: Vec::new(),
            general_qos: Vec::new(),
            qos_cleanup: false,
            organisations: [
                ("antwerpen", "uantwerpen"),
                ("brussel", "vub"),
                ("gent", "ugent"),
                ("leuven", "kuleuven"),
            ]
            .into_iter()
            .map(|(name, code)| (name.to_string(), code.to_string()))
            .collect(),
            institutes: vec![
                InstituteConfig::new("antwerpen", "gvo00017", 500),
                InstituteConfig::new("brussel", "gvo00016", 500),
                InstituteConfig::new("gent", "gvo00012", 8500),
                InstituteConfig::new("leuven", "gvo00018", 500),
            ],
        }
    }
}

impl AccountSyncConfig {
    /// Names of the institute default VOs
    pub fn default_vos(&self) -> Vec<&str> {
        self.institutes
            .iter()
            .map(|institute| institute.default_vo.as_str())
            .collect()
    }

    pub(crate) fn validate(&self, errors: &mut Vec<String>) {
        if !self.organisations.contains_key(&self.host_institute) {
            errors.push(format!(
                "accounts.host_institute '{}' has no entry in accounts.organisations",
                self.host_institute
            ));
        }
        if self.project_parent.is_empty() {
            errors.push("accounts.project_parent must not be empty".to_string());
        }

        let mut seen = Vec::new();
        for institute in &self.institutes {
            if seen.contains(&institute.name.as_str()) {
                errors.push(format!(
                    "accounts.institutes lists '{}' more than once",
                    institute.name
                ));
            }
            seen.push(institute.name.as_str());

            if !self.organisations.contains_key(&institute.name) {
                errors.push(format!(
                    "accounts.institutes: '{}' has no entry in accounts.organisations",
                    institute.name
                ));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_account_config_defaults() {
        let config = AccountSyncConfig::default();
        assert_eq!(config.host_institute, "gent");
        assert_eq!(config.project_parent, "projects");
        assert_eq!(config.organisations["brussel"], "vub");
        assert_eq!(
            config.default_vos(),
            vec!["gvo00017", "gvo00016", "gvo00012", "gvo00018"]
        );
        let gent = config.institutes.iter().find(|i| i.name == "gent").unwrap();
        assert_eq!(gent.fairshare, 8500);
    }

    #[test]
    fn test_duplicate_institute() {
        let mut config = AccountSyncConfig::default();
        config
            .institutes
            .push(InstituteConfig::new("gent", "gvo99999", 1));
        let mut errors = Vec::new();
        config.validate(&mut errors);
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("more than once"));
    }
}
