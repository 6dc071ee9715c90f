use std::{fmt::Display, path::PathBuf};

use anyhow::{anyhow, Result};
use chrono::{DateTime, Duration, Local};
use chrono_english::parse_date_string;
use clap::{CommandFactory, Parser, ValueEnum};
use now::DateTimeNow;

use crate::{
    storage::{focus_store::FocusEventStore, kv::FileKeyValueStore, STORE_KEY},
    utils::{
        dir::create_application_default_path,
        percentage::{duration_percentage, Percentage},
        time::{format_duration, next_day_start},
    },
};

use super::{
    output::{
        analysis::analyze_domains,
        blocks::{time_blocks, TimeBlock},
        extract_between, ExtractConfig,
    },
    Args,
};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum DateStyle {
    Uk,
    Us,
}

impl From<DateStyle> for chrono_english::Dialect {
    fn from(value: DateStyle) -> Self {
        match value {
            DateStyle::Uk => Self::Uk,
            DateStyle::Us => Self::Us,
        }
    }
}

impl Display for DateStyle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DateStyle::Uk => write!(f, "uk"),
            DateStyle::Us => write!(f, "us"),
        }
    }
}

#[derive(Debug, Parser)]
pub struct ReportCommand {
    #[arg(
        long,
        help = "Application directory. By default tries to read from $XDG_STATE_HOME or $HOME/.local/state"
    )]
    pub dir: Option<PathBuf>,
    #[arg(
        long = "date",
        short,
        help = "Day to report on. Examples are \"yesterday\", \"15/03/2025\", \"last friday\". Defaults to today"
    )]
    date: Option<String>,
    #[arg(long, default_value_t = DateStyle::Uk, help = "Style of dates used during parsing. For Uk it's day/month/year. For Us it's month/day/year")]
    date_style: DateStyle,
    #[arg(
        long = "blocks",
        num_args = 0..=1,
        default_missing_value = "30",
        help = "Also print the day as blocks of the given length in minutes, labeled by the domain that dominated each"
    )]
    blocks: Option<u32>,
    #[arg(short = 'p', long = "percentage", help = "Filter domains to have at least specified percentage", default_value_t = Percentage::new_opt(1.).unwrap_or_default())]
    min_percentage: Percentage,
    #[arg(long = "store-key", default_value = STORE_KEY, help = "Key the focus log is stored under")]
    store_key: String,
}

/// Prints focus time per domain for one local day, optionally followed by a block view of the
/// same day. Only reads the store.
pub async fn process_report_command(command: ReportCommand) -> Result<()> {
    let (start, end) = parse_day(command.date.as_deref(), command.date_style)?;

    let dir = command
        .dir
        .map_or_else(create_application_default_path, Ok)?;
    let store = FocusEventStore::new(FileKeyValueStore::new(dir.join("store"))?, command.store_key);
    let log = store.load().await;

    let config = ExtractConfig {
        start: start.to_utc(),
        end: end.to_utc(),
    };
    let intervals = extract_between(&log, config).collect::<Vec<_>>();

    let (usages, total) = analyze_domains(intervals.iter().cloned(), *command.min_percentage);
    println!("{}\t{}", start.format("%x"), format_duration(total));
    for entry in usages {
        println!(
            "{}%\t{}\t{}",
            *duration_percentage(entry.duration, total) as i32,
            format_duration(entry.duration),
            entry.domain
        );
    }

    if let Some(minutes) = command.blocks {
        if minutes == 0 {
            return Err(Args::command()
                .error(
                    clap::error::ErrorKind::ValueValidation,
                    "Block length has to be at least one minute",
                )
                .into());
        }
        println!();
        for block in time_blocks(
            &intervals,
            config.start,
            config.end,
            Duration::minutes(minutes as i64),
        ) {
            print_block(&block);
        }
    }
    Ok(())
}

fn print_block(block: &TimeBlock) {
    println!(
        "{}-{}\t{}\t{}",
        block.start.with_timezone(&Local).format("%H:%M"),
        block.end.with_timezone(&Local).format("%H:%M"),
        block.domain,
        block.url.as_deref().unwrap_or("")
    );
}

/// Resolves the `--date` expression into the local day containing it.
fn parse_day(
    date: Option<&str>,
    date_style: DateStyle,
) -> Result<(DateTime<Local>, DateTime<Local>)> {
    let now = Local::now();
    let day = match date.map(|s| parse_date_string(s, now, date_style.into())) {
        Some(Ok(v)) => v,
        Some(Err(e)) => {
            return Err(Args::command()
                .error(
                    clap::error::ErrorKind::ValueValidation,
                    format!("Failed to validate date {e}"),
                )
                .into());
        }
        None => now,
    };
    let start = day.beginning_of_day();
    let end = next_day_start(start).ok_or_else(|| anyhow!("No day follows {start}"))?;
    Ok((start, end))
}
