mod cli;
mod config;
mod confirm;
mod engine;
mod hooks;
mod monitoring;
mod preprocessor;
mod reaper;
mod report;
mod retention;
mod scheduler;
mod secrets;
mod snapshot;
mod system_actions;
mod targets;
mod vss;

use std::time::Duration;

use clap::Parser;
use colored::Colorize;
use sevenzip_client::SevenZipInvoker;
use tracing::{error, info, Level};

use crate::cli::{BackupSubCommand, PoshBackupCli, SubCommand};
use crate::config::resolver::{CliOverrides, EffectiveConfigResolver};
use crate::engine::JobEngine;
use crate::monitoring::MonitoringHub;
use crate::snapshot::hypervisor::HypervisorSnapshotProvider;
use crate::targets::RemoteTarget;
use crate::vss::{ChildDiskshadowRunner, VssCoordinator};

#[cfg(windows)]
use crate::vss::WmiShadowCopyQuerier;

/// A `ShadowCopyQuerier` that never finds anything. Used as a stand-in on
/// platforms where `Win32_ShadowCopy` doesn't exist; a job with
/// `EnableVSS=true` run through it always times out its polling wait,
/// the same outcome as running on a host with no VSS writers configured.
#[cfg(not(windows))]
struct NullShadowCopyQuerier;

#[cfg(not(windows))]
impl crate::vss::ShadowCopyQuerier for NullShadowCopyQuerier {
    fn query_device_path(&self, _volume: &str) -> Option<String> {
        None
    }
}

#[cfg(windows)]
fn shadow_copy_querier() -> Option<WmiShadowCopyQuerier> {
    match WmiShadowCopyQuerier::new() {
        Ok(querier) => Some(querier),
        Err(e) => {
            error!(error = %e, "failed to initialize WMI shadow copy querier, VSS jobs will fail");
            None
        }
    }
}

#[cfg(not(windows))]
fn shadow_copy_querier() -> Option<NullShadowCopyQuerier> {
    Some(NullShadowCopyQuerier)
}

const BANNER: &str = r#"
 ____        ____  _     ____             _
|  _ \ ___  / ___|| |__ | __ )  __ _  ___| | ___   _ _ __
| |_) / _ \ \___ \| '_ \|  _ \ / _` |/ __| |/ / | | | '_ \
|  __/ (_) | ___) | | | | |_) | (_| | (__|   <| |_| | |_) |
|_|   \___/ |____/|_| |_|____/ \__,_|\___|_|\_\\__,_| .__/
                                                     |_|
"#;

/// Process exit codes the daemon itself (not a single 7-Zip invocation)
/// returns to its caller.
mod exit_codes {
    pub const SUCCESS: i32 = 0;
    pub const JOB_FAILURE: i32 = 1;
    pub const CONFIG_ERROR: i32 = 2;
    pub const CONFIRMATION_DECLINED: i32 = 3;
}

fn main() -> eyre::Result<()> {
    color_eyre::install()?;
    println!("{}", BANNER.cyan());

    let cli = PoshBackupCli::parse();

    let global = match config::load(&cli.config) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("{} {e}", "configuration error:".red());
            std::process::exit(exit_codes::CONFIG_ERROR);
        }
    };

    init_tracing(&global.general.log_level);
    info!("Starting PoSh-Backup job execution engine");

    let exit_code = match cli.subcmd.unwrap_or(SubCommand::Backup(BackupSubCommand {
        job: None,
        set: None,
        simulate: false,
        test_archive: false,
        non_interactive: false,
    })) {
        SubCommand::List(list) => run_list(&global, list),
        SubCommand::Backup(backup) => run_backup(&global, backup),
        SubCommand::Daemon(_) => run_daemon(&global),
    };

    std::process::exit(exit_code);
}

fn init_tracing(log_level: &str) {
    let level = match log_level {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };
    let subscriber = tracing_subscriber::fmt::Subscriber::builder()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_max_level(level)
        .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);
}

fn run_list(global: &config::GlobalConfig, list: cli::ListSubCommand) -> i32 {
    if list.jobs || (!list.jobs && !list.sets && !list.targets) {
        for name in global.backup_locations.keys() {
            println!("job: {name}");
        }
    }
    if list.sets {
        for name in global.backup_sets.keys() {
            println!("set: {name}");
        }
    }
    if list.targets {
        for name in global.backup_targets.keys() {
            println!("target: {name}");
        }
    }
    exit_codes::SUCCESS
}

fn run_backup(global: &config::GlobalConfig, backup: BackupSubCommand) -> i32 {
    let resolver = EffectiveConfigResolver::new(global);

    let mut job_names: Vec<String> = backup.job.clone().unwrap_or_default();
    for set_name in backup.set.clone().unwrap_or_default() {
        match resolver.expand_set(&set_name) {
            Ok(expanded) => job_names.extend(expanded),
            Err(e) => {
                error!(set_name, error = %e, "failed to expand backup set");
                return exit_codes::CONFIG_ERROR;
            }
        }
    }
    if job_names.is_empty() {
        job_names.extend(global.backup_locations.keys().cloned());
    }

    let cli_overrides = CliOverrides {
        simulate: Some(backup.simulate),
        test_archive: if backup.test_archive { Some(true) } else { None },
        compression_level: None,
        enable_vss: None,
        pause_before_exit: None,
    };

    let invoker = SevenZipInvoker::new();
    let monitoring = MonitoringHub::new(Vec::new());
    let targets: Vec<Box<dyn RemoteTarget>> = Vec::new();
    let snapshot_provider = HypervisorSnapshotProvider::new("xe", global.report_dir.clone());

    let vss_coordinator = shadow_copy_querier().map(|querier| {
        VssCoordinator::new(
            querier,
            ChildDiskshadowRunner,
            "diskshadow.exe",
            global.vss_metadata_cache_path.clone(),
            global.vss_polling_timeout_seconds,
            global.vss_polling_interval_seconds,
        )
    });

    let engine = JobEngine::new(
        &invoker,
        global.seven_zip_path.clone(),
        Some(&snapshot_provider),
        vss_coordinator.as_ref(),
        &targets,
        &monitoring,
        global.general.hostname.clone(),
        !backup.non_interactive,
    );

    let mut overall_exit = exit_codes::SUCCESS;
    for job_name in &job_names {
        let effective = match resolver.resolve(job_name, None, &cli_overrides) {
            Ok(effective) => effective,
            Err(e) => {
                error!(job_name, error = %e, "failed to resolve job configuration");
                overall_exit = exit_codes::CONFIG_ERROR;
                continue;
            }
        };

        let outcome = engine.run_job(&effective);
        match outcome.report.status {
            report::JobStatus::ConfirmationDeclined => {
                if overall_exit == exit_codes::SUCCESS {
                    overall_exit = exit_codes::CONFIRMATION_DECLINED;
                }
            }
            report::JobStatus::Failure => {
                overall_exit = exit_codes::JOB_FAILURE;
            }
            _ => {}
        }
        if let Some(decision) = outcome.post_run_decision {
            info!(job_name, ?decision, "post-run action decided, not executed by this process");
        }
    }

    overall_exit
}

fn run_daemon(global: &config::GlobalConfig) -> i32 {
    let mut sched = scheduler::PoshBackupScheduler::new(Duration::from_secs(30));

    for (job_name, job_spec) in &global.backup_locations {
        if let Some(schedule) = &job_spec.schedule {
            if schedule.enabled.unwrap_or(false) {
                if let Some(time) = &schedule.time {
                    if let Err(e) = sched.add_job(job_name, time) {
                        error!(job_name, error = %e, "failed to register scheduled job, skipping");
                    }
                }
            }
        }
    }

    info!("daemon loop starting");
    sched.run_forever(|job_name| {
        info!(job_name, "running scheduled job");
        run_backup(
            global,
            BackupSubCommand {
                job: Some(vec![job_name.to_string()]),
                set: None,
                simulate: false,
                test_archive: false,
                non_interactive: true,
            },
        );
    });
}
