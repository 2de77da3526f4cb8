pub mod process;
pub mod reports;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use reports::{PrefsCommand, RangeArgs};
use tracing::level_filters::LevelFilter;

use crate::{
    daemon::{
        start_daemon,
        storage::{db::Database, DATABASE_FILE},
    },
    utils::{
        dir::create_application_default_path,
        logging::{enable_logging, CLI_PREFIX},
    },
};

#[derive(Parser, Debug)]
#[command(name = "Focuslog", version, long_about = None)]
#[command(about = "Personal desktop activity logger", long_about = None)]
struct Args {
    #[command(subcommand)]
    commands: Commands,
    #[arg(long, help = "Enable logging")]
    log: bool,
}

#[derive(Subcommand, Debug)]
#[command(version, about, long_about = None)]
enum Commands {
    #[command(about = "Starts the tracking daemon")]
    Init {
        #[arg(
            long,
            help = "Application directory. By default tries to save into %APPDATA% or $XDG_STATE_HOME"
        )]
        dir: Option<PathBuf>,
    },
    #[command(
        about = "Run the daemon directly in the current console. Used for creating a daemon internally and for debugging"
    )]
    Serve {
        #[arg(
            long,
            help = "Application directory. By default tries to save into %APPDATA% or $XDG_STATE_HOME"
        )]
        dir: Option<PathBuf>,
    },
    #[command(about = "Stop the currently running daemon")]
    Stop {},
    #[command(about = "Show tracked time per hour of day")]
    Hours {
        #[command(flatten)]
        range: RangeArgs,
    },
    #[command(about = "Show tracked time per application")]
    Apps {
        #[command(flatten)]
        range: RangeArgs,
    },
    #[command(about = "Show how many times each application was opened")]
    Opens {
        #[command(flatten)]
        range: RangeArgs,
        #[arg(
            long,
            default_value_t = 10,
            help = "Sessions of the same app separated by at most this many seconds count as one open"
        )]
        gap: i64,
    },
    #[command(about = "Show the per-window breakdown for one application")]
    Detail {
        #[arg(help = "Application name as shown by the apps command")]
        app: String,
        #[command(flatten)]
        range: RangeArgs,
    },
    #[command(about = "Read or change preferences")]
    Prefs {
        #[command(subcommand)]
        command: PrefsCommand,
    },
}

pub async fn run_cli() -> Result<()> {
    let args = Args::parse();

    let app_dir = create_application_default_path()?;
    let logging_level = if args.log {
        Some(LevelFilter::TRACE)
    } else {
        None
    };
    enable_logging(CLI_PREFIX, &app_dir, logging_level, args.log)?;

    match args.commands {
        Commands::Init { dir } => process::restart_daemon(dir.as_deref()),
        Commands::Stop {} => {
            kill_running_daemons()?;
            Ok(())
        }
        Commands::Serve { dir } => start_daemon(dir.unwrap_or(app_dir)).await,
        Commands::Hours { range } => reports::print_hours(&open_db(&app_dir)?, &range).await,
        Commands::Apps { range } => reports::print_apps(&open_db(&app_dir)?, &range).await,
        Commands::Opens { range, gap } => {
            reports::print_opens(&open_db(&app_dir)?, &range, gap).await
        }
        Commands::Detail { app, range } => {
            reports::print_detail(&open_db(&app_dir)?, &app, &range).await
        }
        Commands::Prefs { command } => reports::process_prefs(&open_db(&app_dir)?, command).await,
    }
}

fn open_db(app_dir: &std::path::Path) -> Result<Database> {
    Database::open(app_dir.join(DATABASE_FILE))
}

fn kill_running_daemons() -> Result<()> {
    let daemon = process::daemon_executable()?;
    process::kill_running_daemons(&daemon);
    Ok(())
}
