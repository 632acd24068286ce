use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::{Context, Result, bail};
use chrono::Local;
use clap::{Args, Parser, Subcommand, builder::styling};
use env_logger::Builder;
use log::{LevelFilter, debug, error, info, warn};

use slurmsync::license_probe::{self, FlexlmProbe};
use slurmsync::models::{SlurmAccount, SlurmQos, SlurmResource, SlurmUser};
use slurmsync::reconcile::{accounts, licenses, projects, users};
use slurmsync::runner::{self, CommandRunner, OutputFormat, SystemRunner};
use slurmsync::{
    Anomaly, DesiredState, LicensePlan, PlanBuilder, SafetyPolicy, Severity, SlurmCommand, Stage,
    SyncConfig, SyncError,
};

const STYLES: styling::Styles = styling::Styles::styled()
    .header(styling::AnsiColor::Green.on_default().bold())
    .usage(styling::AnsiColor::Green.on_default().bold())
    .literal(styling::AnsiColor::Cyan.on_default().bold())
    .placeholder(styling::AnsiColor::Cyan.on_default());

#[derive(Parser, Debug)]
#[command(name = "slurmsync")]
#[command(about = "Synchronise Slurm accounting with VO, project and license data", long_about = None)]
#[command(styles = STYLES)]
struct Cli {
    #[command(flatten)]
    options: GlobalOptions,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Debug)]
struct GlobalOptions {
    /// Configuration file, loaded after the system and local files
    #[arg(short, long, global = true, env = "SLURMSYNC_CONFIG")]
    config: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace); overrides the configuration
    #[arg(short, long, global = true)]
    log_level: Option<String>,

    /// Clusters to manage; overrides the configuration
    #[arg(long, global = true, value_delimiter = ',')]
    clusters: Vec<String>,

    /// Print the commands instead of running them
    #[arg(long, global = true)]
    dry_run: bool,

    /// Output format of a dry run
    #[arg(long, global = true, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,

    /// Cancel jobs even when more users and accounts are affected than max_cancel_targets
    #[arg(long, global = true)]
    force: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Institute and VO accounts and VO memberships
    Accounts {
        /// Desired state snapshot (JSON)
        #[arg(long)]
        desired: PathBuf,
    },
    /// Project QOS, project accounts and project memberships
    Projects {
        /// Desired state snapshot (JSON)
        #[arg(long)]
        desired: PathBuf,
    },
    /// External license resources and their reservations
    Licenses {
        /// License server description (JSON)
        #[arg(long)]
        licenses: PathBuf,

        /// Update resources and reservations even when the counts match
        #[arg(long)]
        force_update: bool,
    },
    /// Inspect the configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Print the merged configuration
    Show,
    /// Print a configuration file with all defaults
    Generate,
    /// Check the merged configuration
    Validate,
}

fn init_logging(cli_level: Option<&str>, config_level: &str) {
    let level = cli_level.unwrap_or(config_level);
    let filter = LevelFilter::from_str(level).unwrap_or_else(|_| {
        eprintln!("Invalid log level '{}', using info", level);
        LevelFilter::Info
    });
    Builder::from_default_env().filter_level(filter).init();
}

fn exit_code(err: &anyhow::Error) -> i32 {
    match err.downcast_ref::<SyncError>().map(SyncError::severity) {
        Some(Severity::CircuitBreaker) => 2,
        _ => 1,
    }
}

fn main() {
    let cli = Cli::parse();

    if let Commands::Config {
        action: ConfigAction::Generate,
    } = cli.command
    {
        print!("{}", SyncConfig::generate_default_config());
        return;
    }

    let mut config = match SyncConfig::load(cli.options.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error loading configuration: {}", e);
            std::process::exit(1);
        }
    };
    init_logging(cli.options.log_level.as_deref(), &config.log_level);

    if !cli.options.clusters.is_empty() {
        config.clusters = cli.options.clusters.clone();
    }

    if let Err(e) = run(&cli, &config) {
        error!("{:#}", e);
        std::process::exit(exit_code(&e));
    }
}

fn run(cli: &Cli, config: &SyncConfig) -> Result<()> {
    if let Err(errors) = config.validate() {
        for problem in &errors {
            error!("Configuration: {}", problem);
        }
        bail!(SyncError::Config(format!(
            "{} problems in the configuration",
            errors.len()
        )));
    }

    let runner = SystemRunner;
    let policy = SafetyPolicy {
        max_cancel_targets: config.max_cancel_targets,
        force: cli.options.force,
    };

    let commands = match &cli.command {
        Commands::Accounts { desired } => {
            let desired = load_desired(desired)?;
            plan_accounts(&runner, config, &desired, &policy)?
        }
        Commands::Projects { desired } => {
            let desired = load_desired(desired)?;
            plan_projects(&runner, config, &desired, &policy)?
        }
        Commands::Licenses {
            licenses,
            force_update,
        } => plan_licenses(&runner, config, licenses, *force_update)?,
        Commands::Config { action } => {
            match action {
                ConfigAction::Show => print!("{}", config.to_toml()?),
                ConfigAction::Validate => println!("Configuration is valid"),
                ConfigAction::Generate => print!("{}", SyncConfig::generate_default_config()),
            }
            return Ok(());
        }
    };

    if commands.is_empty() {
        info!("Nothing to do");
        return Ok(());
    }

    if cli.options.dry_run {
        println!("{}", runner::render_commands(&commands, cli.options.format)?);
        return Ok(());
    }

    runner::execute_commands(&runner, &commands)?;
    info!("Ran {} commands", commands.len());
    Ok(())
}

fn load_desired(path: &Path) -> Result<DesiredState> {
    DesiredState::load(path)
        .with_context(|| format!("Failed to load desired state from {}", path.display()))
}

fn report_anomalies(anomalies: &[Anomaly]) {
    for anomaly in anomalies {
        warn!("{:?}: {}", anomaly.severity(), anomaly);
    }
}

fn plan_accounts<R: CommandRunner>(
    runner: &R,
    config: &SyncConfig,
    desired: &DesiredState,
    policy: &SafetyPolicy,
) -> Result<Vec<SlurmCommand>> {
    let clusters = config.require_clusters()?;
    let slurm_accounts: Vec<SlurmAccount> = runner::sacctmgr_list(runner)?;
    let slurm_users: Vec<SlurmUser> = runner::sacctmgr_list(runner)?;

    let mut account_changes =
        accounts::institute_accounts(&desired.vos, &slurm_accounts, clusters, &config.accounts)?;
    account_changes.extend(accounts::vo_accounts(
        &desired.vos,
        &slurm_accounts,
        clusters,
        &config.accounts,
    )?);
    let user_changes = users::vo_users(
        &desired.vo_members(),
        &desired.active_accounts,
        &slurm_users,
        clusters,
    );

    let plan = PlanBuilder::new()
        .add(Stage::Accounts, account_changes)
        .add(Stage::Associations, user_changes)
        .build();
    report_anomalies(&plan.anomalies);
    Ok(plan.approved_commands(policy)?)
}

fn plan_projects<R: CommandRunner>(
    runner: &R,
    config: &SyncConfig,
    desired: &DesiredState,
    policy: &SafetyPolicy,
) -> Result<Vec<SlurmCommand>> {
    let clusters = config.require_clusters()?;
    let default_account = config
        .accounts
        .project_default_account
        .as_deref()
        .ok_or_else(|| SyncError::Config("accounts.project_default_account is not set".to_string()))?;

    let today = Local::now().date_naive();
    let active = desired.active_projects(today);
    debug!("{} of {} projects are active on {}", active.len(), desired.projects.len(), today);

    let slurm_qos: Vec<SlurmQos> = runner::sacctmgr_list(runner)?;
    let slurm_accounts: Vec<SlurmAccount> = runner::sacctmgr_list(runner)?;
    let slurm_users: Vec<SlurmUser> = runner::sacctmgr_list(runner)?;

    let plan = PlanBuilder::new()
        .add(
            Stage::Qos,
            projects::project_qos(&active, &slurm_qos, clusters, &config.accounts),
        )
        .add(
            Stage::Accounts,
            projects::project_accounts(&active, &slurm_accounts, clusters, &config.accounts)?,
        )
        .add(
            Stage::Associations,
            projects::project_users(
                &active,
                &desired.active_accounts,
                &slurm_users,
                clusters,
                default_account,
                &config.accounts.protected_accounts,
            ),
        )
        .build();
    report_anomalies(&plan.anomalies);
    Ok(plan.approved_commands(policy)?)
}

fn plan_licenses<R: CommandRunner>(
    runner: &R,
    config: &SyncConfig,
    licenses_file: &Path,
    force_update: bool,
) -> Result<Vec<SlurmCommand>> {
    let settings = &config.licenses;
    if settings.reservation_cluster.is_empty() || settings.reservation_partition.is_empty() {
        return Err(SyncError::Config(
            "licenses.reservation_cluster and licenses.reservation_partition must be set".to_string(),
        )
        .into());
    }

    let servers = license_probe::load_license_servers(licenses_file).with_context(|| {
        format!("Failed to load license servers from {}", licenses_file.display())
    })?;
    let probe = FlexlmProbe::new(runner);
    let desired: BTreeMap<_, _> =
        license_probe::collect_licenses(&servers, &settings.default_tool, &probe);
    info!("{} licenses configured", desired.len());

    let resources: Vec<SlurmResource> = runner::sacctmgr_list(runner)?;
    let snapshot = runner::reservation_snapshot(runner)?;

    let plan = LicensePlan::new(
        licenses::license_resources(
            &desired,
            &resources,
            &settings.resource_clusters,
            &settings.ignore_resources,
            force_update,
        ),
        licenses::license_reservations(
            &desired,
            &snapshot,
            &settings.reservation_cluster,
            &settings.reservation_partition,
            &settings.ignore_reservations,
            force_update,
        )?,
    );
    report_anomalies(&plan.anomalies());
    Ok(plan.ordered_commands())
}
