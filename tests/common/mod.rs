#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::BTreeSet;

use slurmsync::SlurmCommand;
use slurmsync::errors::SyncError;
use slurmsync::models::{SlurmAccount, SlurmUser};
use slurmsync::parser::parse_sacctmgr_dump;
use slurmsync::runner::{CommandOutput, CommandRunner};

/// Stands in for the Slurm CLI tools.
///
/// Responses are matched on the start of the space-joined command line; the
/// first match wins. Unmatched commands succeed with empty output. Every
/// invocation is recorded.
#[derive(Default)]
pub struct FakeRunner {
    responses: Vec<(String, CommandOutput)>,
    calls: RefCell<Vec<Vec<String>>>,
}

impl FakeRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(mut self, prefix: &str, stdout: &str) -> Self {
        self.responses.push((
            prefix.to_string(),
            CommandOutput {
                code: 0,
                stdout: stdout.to_string(),
                stderr: String::new(),
            },
        ));
        self
    }

    pub fn fail(mut self, prefix: &str, code: i32, stderr: &str) -> Self {
        self.responses.push((
            prefix.to_string(),
            CommandOutput {
                code,
                stdout: String::new(),
                stderr: stderr.to_string(),
            },
        ));
        self
    }

    pub fn calls(&self) -> Vec<Vec<String>> {
        self.calls.borrow().clone()
    }
}

impl CommandRunner for FakeRunner {
    fn run(&self, program: &str, args: &[String]) -> Result<CommandOutput, SyncError> {
        let argv: Vec<String> = std::iter::once(program.to_string())
            .chain(args.iter().cloned())
            .collect();
        let line = argv.join(" ");
        self.calls.borrow_mut().push(argv);

        Ok(self
            .responses
            .iter()
            .find(|(prefix, _)| line.starts_with(prefix.as_str()))
            .map(|(_, output)| output.clone())
            .unwrap_or_default())
    }
}

/// Split a command line the way a shell would
pub fn cmd(line: &str) -> Vec<String> {
    shlex::split(line).expect("balanced quotes")
}

pub fn argvs(commands: &[SlurmCommand]) -> Vec<Vec<String>> {
    commands.iter().map(SlurmCommand::argv).collect()
}

pub fn argv_set(commands: &[SlurmCommand]) -> BTreeSet<Vec<String>> {
    commands.iter().map(SlurmCommand::argv).collect()
}

pub fn cmd_set(lines: &[&str]) -> BTreeSet<Vec<String>> {
    lines.iter().map(|line| cmd(line)).collect()
}

pub fn strings(items: &[&str]) -> BTreeSet<String> {
    items.iter().map(|s| s.to_string()).collect()
}

pub fn clusters(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| s.to_string()).collect()
}

pub const ACCOUNT_HEADER: &str = "Account|Descr|Org|Cluster|ParentName|User|Share|GrpJobs|GrpNodes|GrpCPUs|GrpMem|GrpSubmit|GrpWall|GrpCPUMins|MaxJobs|MaxNodes|MaxCPUs|MaxSubmit|MaxWall|MaxCPUMins|QOS|Def QOS";

/// `sacctmgr -s -P list accounts` output for `(account, cluster, parent, share)` rows
pub fn accounts_dump(rows: &[(&str, &str, &str, &str)]) -> String {
    let mut lines = vec![ACCOUNT_HEADER.to_string()];
    for (account, cluster, parent, share) in rows {
        lines.push(format!(
            "{account}|{account}|ugent|{cluster}|{parent}||{share}{empty}normal|",
            empty = "|".repeat(14)
        ));
    }
    lines.join("\n")
}

pub fn accounts(rows: &[(&str, &str, &str, &str)]) -> Vec<SlurmAccount> {
    parse_sacctmgr_dump(&accounts_dump(rows)).expect("valid account listing")
}

/// A user association row as `sacctmgr list users` would report it
pub fn association(user: &str, default_account: &str, cluster: &str, account: &str) -> SlurmUser {
    SlurmUser {
        user: user.to_string(),
        def_acct: Some(default_account.to_string()),
        admin: Some("None".to_string()),
        cluster: cluster.to_string(),
        account: account.to_string(),
        partition: None,
        share: Some("1".to_string()),
        max_jobs: None,
        max_nodes: None,
        max_cpus: None,
        max_submit: None,
        max_wall: None,
        max_cpu_mins: None,
        qos: Some("normal".to_string()),
        def_qos: None,
    }
}
