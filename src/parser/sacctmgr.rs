//! Parsing of `sacctmgr -s -P list <kind>` output
//!
//! The first line is the header. Column names are normalized before they are
//! matched against the serde names of the records in [`crate::models`]:
//! spaces become `_` and `%` becomes `PCT_`, so `% Allocated` turns into
//! `PCT__Allocated` and `Def Acct` into `Def_Acct`.

use std::fmt;

use csv::{DeserializeErrorKind, ErrorKind, ReaderBuilder, StringRecord};
use log::{debug, warn};
use serde::de::DeserializeOwned;

use super::content_lines;
use crate::errors::SyncError;
use crate::models::{SlurmAccount, SlurmQos, SlurmResource, SlurmUser};

/// Users that are never reported
pub const IGNORE_USERS: &[&str] = &["root"];
/// Accounts that are never reported
pub const IGNORE_ACCOUNTS: &[&str] = &["root"];

/// The `sacctmgr list` entity kinds we read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SacctMgrKind {
    Accounts,
    Users,
    Qos,
    Resource,
}

impl SacctMgrKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SacctMgrKind::Accounts => "accounts",
            SacctMgrKind::Users => "users",
            SacctMgrKind::Qos => "qos",
            SacctMgrKind::Resource => "resource",
        }
    }
}

impl fmt::Display for SacctMgrKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sacctmgr {}", self.as_str())
    }
}

/// A record type that can be read from a `sacctmgr` listing
pub trait SacctRecord: DeserializeOwned {
    const KIND: SacctMgrKind;

    /// Whether a parsed row belongs in the result set
    fn keep(&self) -> bool {
        true
    }
}

impl SacctRecord for SlurmAccount {
    const KIND: SacctMgrKind = SacctMgrKind::Accounts;

    fn keep(&self) -> bool {
        // With -s, user associations are listed alongside the accounts
        let is_association = self.user.as_deref().is_some_and(|u| !u.is_empty());
        !is_association && !IGNORE_ACCOUNTS.contains(&self.account.as_str())
    }
}

impl SacctRecord for SlurmUser {
    const KIND: SacctMgrKind = SacctMgrKind::Users;

    fn keep(&self) -> bool {
        !IGNORE_USERS.contains(&self.user.as_str())
    }
}

impl SacctRecord for SlurmQos {
    const KIND: SacctMgrKind = SacctMgrKind::Qos;
}

impl SacctRecord for SlurmResource {
    const KIND: SacctMgrKind = SacctMgrKind::Resource;
}

/// Normalize a `sacctmgr` header line into field names
pub fn normalize_header(line: &str) -> StringRecord {
    line.trim_end()
        .split('|')
        .map(|name| name.replace(' ', "_").replace('%', "PCT_"))
        .collect()
}

/// Parse a complete `sacctmgr -s -P list` output into records of type `T`.
///
/// Lines with a different number of columns than the header, and lines that
/// miss a required column, are logged and skipped. A non-numeric value in a
/// numeric column is an error for the whole listing.
pub fn parse_sacctmgr_dump<T: SacctRecord>(output: &str) -> Result<Vec<T>, SyncError> {
    let mut lines = content_lines(output);
    let Some(header_line) = lines.next() else {
        debug!("Empty {} output", T::KIND);
        return Ok(Vec::new());
    };
    let header = normalize_header(header_line);
    let body = lines.collect::<Vec<_>>().join("\n");

    let mut reader = ReaderBuilder::new()
        .delimiter(b'|')
        .quoting(false)
        .flexible(true)
        .has_headers(false)
        .from_reader(body.as_bytes());

    let mut records = Vec::new();
    for row in reader.records() {
        let row = row.map_err(|e| SyncError::parse(T::KIND, e.to_string()))?;
        let line = row.iter().collect::<Vec<_>>().join("|");
        if row.len() != header.len() {
            warn!(
                "Skipping {} line with {} fields, header has {}: {}",
                T::KIND,
                row.len(),
                header.len(),
                line
            );
            continue;
        }

        match row.deserialize::<T>(Some(&header)) {
            Ok(record) if record.keep() => records.push(record),
            Ok(_) => debug!("Ignoring {} line: {}", T::KIND, line),
            Err(e) if is_numeric_error(&e) => {
                return Err(SyncError::parse(
                    T::KIND,
                    format!("invalid number in line '{}': {}", line, e),
                ));
            }
            Err(e) => warn!("Could not process {} line '{}': {}", T::KIND, line, e),
        }
    }

    Ok(records)
}

fn is_numeric_error(err: &csv::Error) -> bool {
    match err.kind() {
        ErrorKind::Deserialize { err, .. } => matches!(
            err.kind(),
            DeserializeErrorKind::ParseInt(_) | DeserializeErrorKind::ParseFloat(_)
        ),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_header() {
        let header = normalize_header("Name|Server|Type|Count|% Allocated|ServerType");
        assert_eq!(
            header.iter().collect::<Vec<_>>(),
            vec!["Name", "Server", "Type", "Count", "PCT__Allocated", "ServerType"]
        );
        let header = normalize_header("User|Def Acct|Def QOS\n");
        assert_eq!(
            header.iter().collect::<Vec<_>>(),
            vec!["User", "Def_Acct", "Def_QOS"]
        );
    }

    #[test]
    fn test_empty_output() {
        let resources: Vec<SlurmResource> = parse_sacctmgr_dump("").unwrap();
        assert!(resources.is_empty());
        let resources: Vec<SlurmResource> = parse_sacctmgr_dump("\n\n").unwrap();
        assert!(resources.is_empty());
    }

    #[test]
    fn test_header_only() {
        let qos: Vec<SlurmQos> = parse_sacctmgr_dump("Name|Priority|Flags\n").unwrap();
        assert!(qos.is_empty());
    }

    #[test]
    fn test_bad_count_is_fatal() {
        let output = "Name|Server|Type|Count|% Allocated|ServerType\n\
                      comsol|bogus|License|many|0|flexlm\n";
        let err = parse_sacctmgr_dump::<SlurmResource>(output).unwrap_err();
        assert!(matches!(err, SyncError::Parse { .. }));
        assert!(err.to_string().contains("comsol|bogus|License|many|0|flexlm"));
    }

    #[test]
    fn test_missing_column_skips_lines() {
        // No Server column: every row lacks a required field
        let output = "Name|Type|Count\ncomsol|License|2\n";
        let resources: Vec<SlurmResource> = parse_sacctmgr_dump(output).unwrap();
        assert!(resources.is_empty());
    }
}
