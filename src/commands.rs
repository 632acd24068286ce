//! Command builders for the Slurm administration tools
//!
//! Every builder is a pure function from entity attributes to one
//! [`SlurmCommand`]. Builders never look at observed state and never depend on
//! another command having run; ordering is the plan's concern.

pub mod sacctmgr;
pub mod scancel;
pub mod scontrol;

use std::fmt;

use serde::Serialize;

pub const SLURM_SACCTMGR: &str = "/usr/bin/sacctmgr";
pub const SLURM_SCONTROL: &str = "/usr/bin/scontrol";
pub const SLURM_SCANCEL: &str = "/usr/bin/scancel";

/// One CLI invocation: the program and its arguments
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct SlurmCommand {
    pub program: String,
    pub args: Vec<String>,
}

impl SlurmCommand {
    pub fn new<I, S>(program: &str, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.to_string(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    /// `sacctmgr -i <verb> <args...>`; `-i` commits without asking for confirmation
    pub fn sacctmgr<I, S>(verb: &str, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut command = Self::new(SLURM_SACCTMGR, ["-i", verb]);
        command.args.extend(args.into_iter().map(Into::into));
        command
    }

    /// `scontrol <verb> <args...>`
    pub fn scontrol<I, S>(verb: &str, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut command = Self::new(SLURM_SCONTROL, [verb]);
        command.args.extend(args.into_iter().map(Into::into));
        command
    }

    /// The full argument vector, program first
    pub fn argv(&self) -> Vec<String> {
        std::iter::once(self.program.clone())
            .chain(self.args.iter().cloned())
            .collect()
    }
}

impl fmt::Display for SlurmCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

/// `key=value` arguments sorted by key
pub(crate) fn settings_args<'a, I>(settings: I) -> Vec<String>
where
    I: IntoIterator<Item = (&'a str, String)>,
{
    let mut pairs: Vec<(&str, String)> = settings.into_iter().collect();
    pairs.sort_by(|a, b| a.0.cmp(b.0));
    pairs
        .into_iter()
        .map(|(key, value)| format!("{}={}", key, value))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sacctmgr_prefix() {
        let command = SlurmCommand::sacctmgr("add", ["qos", "Name=q"]);
        assert_eq!(command.to_string(), "/usr/bin/sacctmgr -i add qos Name=q");
        assert_eq!(
            command.argv(),
            vec!["/usr/bin/sacctmgr", "-i", "add", "qos", "Name=q"]
        );
    }

    #[test]
    fn test_settings_args_sorted() {
        let args = settings_args([
            ("User", "root".to_string()),
            ("Duration", "1-0:0:0".to_string()),
            ("Licenses", "x:1".to_string()),
        ]);
        assert_eq!(args, vec!["Duration=1-0:0:0", "Licenses=x:1", "User=root"]);
    }
}
