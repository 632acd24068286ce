//! Running the Slurm CLI tools
//!
//! [`CommandRunner`] is the only place where processes get spawned. The probes
//! read observed state through it and [`execute_commands`] applies a plan with
//! it; tests substitute a fake.

use std::process::Command;

use log::{debug, error, info};
use serde::Serialize;

use crate::commands::{SLURM_SACCTMGR, SLURM_SCONTROL, SlurmCommand};
use crate::errors::SyncError;
use crate::models::{SlurmConfig, SlurmLicense, SlurmPartition, SlurmReservation};
use crate::parser::{
    ScontrolKind, ScontrolRecord, SacctRecord, collapse_config, parse_sacctmgr_dump,
    parse_scontrol_dump,
};
use crate::reconcile::licenses::ReservationSnapshot;

/// Exit code and captured output of one invocation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.code == 0
    }
}

pub trait CommandRunner {
    fn run(&self, program: &str, args: &[String]) -> Result<CommandOutput, SyncError>;
}

/// Runs commands as child processes
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn run(&self, program: &str, args: &[String]) -> Result<CommandOutput, SyncError> {
        debug!("Running command: {} {:?}", program, args);
        let output = Command::new(program).args(args).output()?;

        Ok(CommandOutput {
            code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        })
    }
}

fn run_checked<R: CommandRunner + ?Sized>(
    runner: &R,
    program: &str,
    args: &[String],
) -> Result<String, SyncError> {
    let output = runner.run(program, args)?;
    if !output.success() {
        return Err(SyncError::CommandFailed {
            command: std::iter::once(program)
                .chain(args.iter().map(String::as_str))
                .collect::<Vec<_>>()
                .join(" "),
            code: output.code,
            stderr: output.stderr.trim().to_string(),
        });
    }
    Ok(output.stdout)
}

/// `sacctmgr -s -P list <kind>`
pub fn sacctmgr_list<T: SacctRecord, R: CommandRunner + ?Sized>(
    runner: &R,
) -> Result<Vec<T>, SyncError> {
    let args: Vec<String> = ["-s", "-P", "list", T::KIND.as_str()]
        .iter()
        .map(|s| s.to_string())
        .collect();
    let stdout = run_checked(runner, SLURM_SACCTMGR, &args)?;
    let records = parse_sacctmgr_dump(&stdout)?;
    debug!("{} {} records", records.len(), T::KIND);
    Ok(records)
}

/// `scontrol show <kind> --detail --oneliner`
pub fn scontrol_show<T: ScontrolRecord, R: CommandRunner + ?Sized>(
    runner: &R,
) -> Result<Vec<T>, SyncError> {
    let args: Vec<String> = ["show", T::KIND.as_str(), "--detail", "--oneliner"]
        .iter()
        .map(|s| s.to_string())
        .collect();
    let stdout = run_checked(runner, SLURM_SCONTROL, &args)?;
    let stdout = if T::KIND == ScontrolKind::Config {
        collapse_config(&stdout)?
    } else {
        stdout
    };
    let records = parse_scontrol_dump(&stdout)?;
    debug!("{} {} records", records.len(), T::KIND);
    Ok(records)
}

/// The running Slurm configuration
pub fn scontrol_config<R: CommandRunner + ?Sized>(runner: &R) -> Result<SlurmConfig, SyncError> {
    scontrol_show::<SlurmConfig, R>(runner)?
        .pop()
        .ok_or_else(|| SyncError::parse(ScontrolKind::Config, "no ClusterName in output"))
}

/// Everything the reservation reconciler looks at
pub fn reservation_snapshot<R: CommandRunner + ?Sized>(
    runner: &R,
) -> Result<ReservationSnapshot, SyncError> {
    Ok(ReservationSnapshot {
        config: scontrol_config(runner)?,
        partitions: scontrol_show::<SlurmPartition, R>(runner)?,
        licenses: scontrol_show::<SlurmLicense, R>(runner)?,
        reservations: scontrol_show::<SlurmReservation, R>(runner)?,
    })
}

/// Run `commands` in order, stopping at the first failure
pub fn execute_commands<R: CommandRunner + ?Sized>(
    runner: &R,
    commands: &[SlurmCommand],
) -> Result<(), SyncError> {
    info!("Executing {} commands", commands.len());
    for command in commands {
        info!("Running command: {}", command);
        if let Err(e) = run_checked(runner, &command.program, &command.args) {
            error!("Command failed, not running the remaining commands: {}", e);
            return Err(e);
        }
    }
    Ok(())
}

/// How a dry run prints its plan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// One command per line
    #[default]
    Text,
    /// JSON array of argument vectors
    Json,
}

pub fn render_commands(commands: &[SlurmCommand], format: OutputFormat) -> Result<String, SyncError> {
    match format {
        OutputFormat::Text => Ok(commands
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("\n")),
        OutputFormat::Json => {
            let argvs: Vec<Vec<String>> = commands.iter().map(SlurmCommand::argv).collect();
            Ok(serde_json::to_string_pretty(&argvs)?)
        }
    }
}
