mod commands;
mod logging;
mod work;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::{ArgGroup, Parser, Subcommand};
use droidsync_core::{config::default_config_path, SyncConfig};
use tracing::error;

use crate::commands::list::ListKind;
use crate::commands::run::RunTarget;

// ============================================================================
// CLI Types
// ============================================================================

/// Droidsync - scheduled backups from an Android device to cloud storage
#[derive(Parser, Debug)]
#[command(name = "droidsync", version, about, long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true, default_value_os_t = default_config_path())]
    config: PathBuf,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run a schedule, a single profile, or every profile
    #[command(group(
        ArgGroup::new("target")
            .required(true)
            .args(["schedule", "profile", "all"])
    ))]
    Run {
        /// Schedule to run (records its state)
        #[arg(value_name = "SCHEDULE")]
        schedule: Option<String>,

        /// Run a single profile instead of a schedule
        #[arg(short, long)]
        profile: Option<String>,

        /// Run every configured profile
        #[arg(short, long)]
        all: bool,

        /// Log what would be run without running it or touching state
        #[arg(short = 'n', long)]
        dry_run: bool,
    },

    /// Launch the most overdue schedule, if any (called periodically)
    Check,

    /// Show the state of every schedule
    Status,

    /// Reset a schedule to pending and recompute its next run
    Reset {
        /// Schedule to reset
        schedule: String,
    },

    /// List configured profiles or schedules
    List {
        #[arg(value_enum)]
        what: ListKind,
    },

    /// Create the state directory and register the periodic check
    Setup,
}

impl Commands {
    /// Commands that run unattended and keep a log file of their own.
    fn writes_log_file(&self) -> bool {
        matches!(self, Commands::Run { .. } | Commands::Check)
    }
}

// ============================================================================
// Entry Point
// ============================================================================

fn main() -> ExitCode {
    let cli = Cli::parse();
    let config = SyncConfig::load(&cli.config);

    let log_file = match &config {
        Ok(config) if cli.command.writes_log_file() => Some(logging::LogFile::from_config(config)),
        _ => None,
    };
    logging::init(cli.verbose, log_file);

    let result = config
        .map_err(anyhow::Error::from)
        .and_then(|config| run(cli, &config));
    match result {
        Ok(code) => code,
        Err(e) => {
            error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli, config: &SyncConfig) -> Result<ExitCode> {
    match cli.command {
        Commands::Run {
            schedule,
            profile,
            all,
            dry_run,
        } => {
            let target = match (schedule, profile) {
                (Some(schedule), _) => RunTarget::Schedule(schedule),
                (None, Some(profile)) => RunTarget::Profile(profile),
                (None, None) if all => RunTarget::All,
                (None, None) => anyhow::bail!("nothing to run"),
            };
            commands::run::run(config, &target, dry_run)
        }
        Commands::Check => commands::check::run(config, &cli.config).map(|()| ExitCode::SUCCESS),
        Commands::Status => commands::status::run(config).map(|()| ExitCode::SUCCESS),
        Commands::Reset { schedule } => {
            commands::reset::run(config, &schedule).map(|()| ExitCode::SUCCESS)
        }
        Commands::List { what } => commands::list::run(config, what).map(|()| ExitCode::SUCCESS),
        Commands::Setup => commands::setup::run(config, &cli.config).map(|()| ExitCode::SUCCESS),
    }
}
