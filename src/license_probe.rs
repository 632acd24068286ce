//! External license servers
//!
//! The license servers are described in a JSON file keyed by server id:
//!
//! ```json
//! {
//!   "ano-comp2": {
//!     "server": "ghi.jkl", "port": 5678,
//!     "software": {"mysoft": {"name": "an-4", "count": 200}}
//!   }
//! }
//! ```
//!
//! Each software entry is keyed by the feature name the license server
//! reports, and `name` is what users request in their jobs. Every server is
//! asked how many licenses are in use; software the server does not report on
//! is marked `skip` so that nothing gets removed because of a probe hiccup.

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::Path;

use log::{debug, error, warn};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::desired::LicenseSpec;
use crate::errors::SyncError;
use crate::runner::CommandRunner;

pub const FLEXLM: &str = "flexlm";

fn default_license_type() -> String {
    FLEXLM.to_string()
}

/// A software feature served by a license server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SoftwareEntry {
    pub name: String,
    pub count: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LicenseServer {
    pub server: String,
    pub port: u16,
    #[serde(default = "default_license_type")]
    pub license_type: String,
    /// Query tool, e.g. the path to `lmutil`; the configured default when absent
    #[serde(default)]
    pub tool: Option<String>,
    #[serde(default)]
    pub software: BTreeMap<String, SoftwareEntry>,
}

/// Load the license server description
pub fn load_license_servers(path: &Path) -> Result<BTreeMap<String, LicenseServer>, SyncError> {
    debug!("Loading license servers from {}", path.display());
    Ok(serde_json::from_str(&fs::read_to_string(path)?)?)
}

/// Usage of one feature as reported by a license server
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LicenseUsage {
    pub total: u64,
    pub in_use: u64,
}

pub trait LicenseProbe {
    /// Usage per feature name, or `None` when this probe cannot query the
    /// server's license type
    fn probe(
        &self,
        server: &LicenseServer,
        tool: &str,
    ) -> Result<Option<BTreeMap<String, LicenseUsage>>, SyncError>;
}

/// Extract the per-feature usage from `lmutil lmstat -a` output
pub fn parse_lmstat(output: &str) -> Result<Vec<(String, LicenseUsage)>, SyncError> {
    let re = Regex::new(
        r"Users\s+of\s+(\w+):\s+\(Total\s+of\s+(\d+)\s+licenses?\s+issued;\s+Total\s+of\s+(\d+)\s+licenses?\s+in\s+use\)",
    )
    .map_err(|e| SyncError::parse("lmstat", e.to_string()))?;

    let mut usage = Vec::new();
    for caps in re.captures_iter(output) {
        let number = |i: usize| {
            caps[i]
                .parse::<u64>()
                .map_err(|e| SyncError::parse("lmstat", format!("{}: {}", &caps[0], e)))
        };
        usage.push((
            caps[1].to_string(),
            LicenseUsage {
                total: number(2)?,
                in_use: number(3)?,
            },
        ));
    }
    Ok(usage)
}

/// Queries FlexLM servers with `lmutil lmstat`
pub struct FlexlmProbe<'a, R: CommandRunner + ?Sized> {
    runner: &'a R,
}

impl<'a, R: CommandRunner + ?Sized> FlexlmProbe<'a, R> {
    pub fn new(runner: &'a R) -> Self {
        Self { runner }
    }
}

impl<R: CommandRunner + ?Sized> LicenseProbe for FlexlmProbe<'_, R> {
    fn probe(
        &self,
        server: &LicenseServer,
        tool: &str,
    ) -> Result<Option<BTreeMap<String, LicenseUsage>>, SyncError> {
        if server.license_type != FLEXLM {
            error!(
                "Unsupported license type {} for server {}",
                server.license_type, server.server
            );
            return Ok(None);
        }

        // lmstat wants a license file; the MAC address is never checked
        let mut license_file = tempfile::Builder::new()
            .suffix(".flexlm_fake_lic")
            .tempfile()?;
        writeln!(
            license_file,
            "SERVER {} AABBCCDDEEFF {}",
            server.server, server.port
        )?;
        license_file.flush()?;

        let args = vec![
            "lmstat".to_string(),
            "-a".to_string(),
            "-c".to_string(),
            license_file.path().display().to_string(),
        ];
        let output = self.runner.run(tool, &args)?;
        if !output.success() {
            return Err(SyncError::CommandFailed {
                command: format!("{} {}", tool, args.join(" ")),
                code: output.code,
                stderr: output.stderr.trim().to_string(),
            });
        }

        let usage: BTreeMap<String, LicenseUsage> = parse_lmstat(&output.stdout)?.into_iter().collect();
        debug!(
            "Server {} port {} reports {} features",
            server.server,
            server.port,
            usage.len()
        );
        Ok(Some(usage))
    }
}

/// Build the desired licenses, keyed `name@server-id`
///
/// A server that cannot be queried marks all of its software `skip`.
pub fn collect_licenses<P: LicenseProbe + ?Sized>(
    servers: &BTreeMap<String, LicenseServer>,
    default_tool: &str,
    probe: &P,
) -> BTreeMap<String, LicenseSpec> {
    let mut licenses = BTreeMap::new();

    for (server_id, server) in servers {
        let tool = server.tool.as_deref().unwrap_or(default_tool);
        let usage = match probe.probe(server, tool) {
            Ok(Some(usage)) => usage,
            Ok(None) => BTreeMap::new(),
            Err(e) => {
                warn!("Could not query license server {}: {}", server_id, e);
                BTreeMap::new()
            }
        };

        let missing: Vec<&str> = server
            .software
            .keys()
            .filter(|feature| !usage.contains_key(*feature))
            .map(String::as_str)
            .collect();
        if !missing.is_empty() {
            error!(
                "Licenses of {} not reported by the server: {}",
                server_id,
                missing.join(", ")
            );
        }

        for (feature, entry) in &server.software {
            let reported = usage.get(feature);
            let spec = LicenseSpec {
                name: entry.name.clone(),
                server: server_id.clone(),
                license_type: server.license_type.clone(),
                count: entry.count,
                in_use: reported.map(|u| u.in_use).unwrap_or_default(),
                total: reported.map(|u| u.total).unwrap_or_default(),
                skip: reported.is_none(),
            };
            licenses.insert(spec.key(), spec);
        }
    }

    licenses
}
