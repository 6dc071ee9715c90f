pub mod output;
pub mod report;

use anyhow::Result;
use clap::{Parser, Subcommand};
use report::{process_report_command, ReportCommand};
use tokio::io::BufReader;
use tracing::level_filters::LevelFilter;

use crate::{
    tracker::{args::ServeArgs, config::TrackerConfig, start_tracker},
    utils::{
        dir::create_application_default_path,
        logging::{enable_logging, LogFile},
    },
};

#[derive(Parser, Debug)]
#[command(name = "tabtally", version, long_about = None)]
#[command(about = "Tracks how long browser tabs hold focus, per domain", long_about = None)]
struct Args {
    #[command(subcommand)]
    commands: Commands,
    #[arg(long, help = "Enable logging")]
    log: bool,
}

#[derive(Subcommand, Debug)]
#[command(version, about, long_about = None)]
enum Commands {
    #[command(
        about = "Track focus using the browser event feed on stdin. One JSON event per line, runs until the feed ends"
    )]
    Serve {
        #[command(flatten)]
        args: ServeArgs,
    },
    #[command(about = "Display time spent per domain for a day")]
    Report {
        #[command(flatten)]
        command: ReportCommand,
    },
}

pub async fn run_cli() -> Result<()> {
    let args = Args::parse();

    let logging_level = if args.log {
        Some(LevelFilter::TRACE)
    } else {
        None
    };

    match args.commands {
        Commands::Serve { args: serve } => {
            let app_dir = serve
                .dir
                .clone()
                .map_or_else(create_application_default_path, Ok)?;
            enable_logging(
                LogFile::Serve,
                &app_dir,
                serve.log.or(logging_level),
                serve.log_console,
            )?;
            let config = TrackerConfig::from(&serve);
            start_tracker(&app_dir, config, BufReader::new(tokio::io::stdin())).await
        }
        Commands::Report { command } => {
            let app_dir = command
                .dir
                .clone()
                .map_or_else(create_application_default_path, Ok)?;
            enable_logging(LogFile::Report, &app_dir, logging_level, args.log)?;
            process_report_command(command).await
        }
    }
}
