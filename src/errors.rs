//! Error and anomaly types for the reconciliation engine
//!
//! Failures are split by severity so callers can branch on what happened
//! without matching on message text:
//!
//! - [`SyncError`] aborts the run (or, for [`SyncError::CircuitBreaker`], refuses
//!   to apply the destructive part of a plan until an operator overrides it).
//! - [`Anomaly`] is recorded next to the generated commands; the run continues.

use std::fmt;

use serde::Serialize;

/// Closed set of severities used across the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Abort the run before any command is executed.
    Fatal,
    /// The affected desired-state entity is left alone for this run.
    Skip,
    /// Logged; processing continues with a best-effort value.
    Warning,
    /// Too many destructive changes at once; needs an explicit override.
    CircuitBreaker,
}

/// Errors that stop a run.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    /// Missing or inconsistent configuration (cluster selection, institute table, ...)
    #[error("configuration error: {0}")]
    Config(String),

    /// Organisation without a Slurm organisation code
    #[error("unknown organisation '{0}': no Slurm organisation code configured")]
    UnknownOrganisation(String),

    /// The live Slurm configuration does not match what we were asked to manage
    #[error("{what} mismatch: configured '{expected}', Slurm reports '{actual}'")]
    IdentityMismatch {
        what: &'static str,
        expected: String,
        actual: String,
    },

    /// Unparseable CLI output for a whole invocation
    #[error("cannot parse {kind} output: {message}")]
    Parse { kind: String, message: String },

    /// A Slurm CLI invocation exited with a non-zero code
    #[error("command '{command}' failed with exit code {code}: {stderr}")]
    CommandFailed {
        command: String,
        code: i32,
        stderr: String,
    },

    /// The job cancellation safety check tripped
    #[error(
        "refusing to cancel jobs for {targets} users and accounts (limit is {limit}); \
         this usually means the desired state is incomplete, use --force to override"
    )]
    CircuitBreaker { targets: usize, limit: usize },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid TOML: {0}")]
    Toml(#[from] toml::de::Error),
}

impl SyncError {
    pub fn parse(kind: impl fmt::Display, message: impl Into<String>) -> Self {
        SyncError::Parse {
            kind: kind.to_string(),
            message: message.into(),
        }
    }

    pub fn severity(&self) -> Severity {
        match self {
            SyncError::CircuitBreaker { .. } => Severity::CircuitBreaker,
            _ => Severity::Fatal,
        }
    }
}

/// Something unexpected that does not abort the run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "anomaly", rename_all = "snake_case")]
pub enum Anomaly {
    /// A user left their VO account but is not a member of any other VO.
    UnknownMovedUser {
        user: String,
        account: String,
        cluster: String,
    },
    /// Slurm counts more licenses in use than the license server reports.
    ReservationClamped {
        license: String,
        in_use: u64,
        used: u64,
    },
    /// The license probe could not confirm this license.
    LicenseSkipped { license: String },
}

impl Anomaly {
    pub fn severity(&self) -> Severity {
        match self {
            Anomaly::LicenseSkipped { .. } => Severity::Skip,
            Anomaly::UnknownMovedUser { .. } | Anomaly::ReservationClamped { .. } => {
                Severity::Warning
            }
        }
    }
}

impl fmt::Display for Anomaly {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Anomaly::UnknownMovedUser {
                user,
                account,
                cluster,
            } => write!(
                f,
                "user {} left account {} on {} but belongs to no other VO",
                user, account, cluster
            ),
            Anomaly::ReservationClamped {
                license,
                in_use,
                used,
            } => write!(
                f,
                "license {}: Slurm uses {} but the server reports only {} in use, reserving 0",
                license, used, in_use
            ),
            Anomaly::LicenseSkipped { license } => {
                write!(f, "license {} could not be verified, leaving it untouched", license)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_circuit_breaker_severity() {
        let err = SyncError::CircuitBreaker { targets: 30, limit: 20 };
        assert_eq!(err.severity(), Severity::CircuitBreaker);
        assert!(err.to_string().contains("30 users and accounts"));
    }

    #[test]
    fn test_config_errors_are_fatal() {
        assert_eq!(
            SyncError::UnknownOrganisation("mars".to_string()).severity(),
            Severity::Fatal
        );
        assert_eq!(
            SyncError::Config("no clusters".to_string()).severity(),
            Severity::Fatal
        );
    }

    #[test]
    fn test_anomaly_severity() {
        let skipped = Anomaly::LicenseSkipped {
            license: "an-5@ano-comp2".to_string(),
        };
        assert_eq!(skipped.severity(), Severity::Skip);

        let clamped = Anomaly::ReservationClamped {
            license: "comsol@srv".to_string(),
            in_use: 3,
            used: 5,
        };
        assert_eq!(clamped.severity(), Severity::Warning);
        assert!(clamped.to_string().contains("reserving 0"));
    }
}
