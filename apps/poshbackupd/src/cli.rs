use clap::Parser;

#[derive(Parser)]
#[command(name = "poshbackupd", version, about = "PoSh-Backup job execution engine", long_about = None)]
pub struct PoshBackupCli {
    /// Path to the TOML configuration file.
    #[clap(short, long, default_value = "config.toml")]
    pub config: String,

    #[clap(subcommand)]
    pub subcmd: Option<SubCommand>,
}

#[derive(Parser)]
pub enum SubCommand {
    #[clap(name = "backup", about = "Runs one or more jobs or sets once")]
    Backup(BackupSubCommand),
    #[clap(name = "list", about = "Lists configured jobs, sets, and targets")]
    List(ListSubCommand),
    #[clap(name = "daemon", about = "Starts the cron-driven scheduler loop")]
    Daemon(DaemonSubCommand),
}

#[derive(Parser)]
pub struct BackupSubCommand {
    /// Job names to run.
    #[clap(short, long)]
    pub job: Option<Vec<String>>,
    /// Backup set names to run.
    #[clap(short, long)]
    pub set: Option<Vec<String>>,
    /// Build the argument list and log what would run, without invoking 7-Zip.
    #[clap(long)]
    pub simulate: bool,
    /// Force archive verification regardless of the job's configured setting.
    #[clap(long)]
    pub test_archive: bool,
    /// Answer any confirmation prompts automatically.
    #[clap(long)]
    pub non_interactive: bool,
}

#[derive(Parser)]
pub struct ListSubCommand {
    #[clap(long)]
    pub jobs: bool,
    #[clap(long)]
    pub sets: bool,
    #[clap(long)]
    pub targets: bool,
}

#[derive(Parser)]
pub struct DaemonSubCommand {}
