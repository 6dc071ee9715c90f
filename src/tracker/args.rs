use std::path::PathBuf;

use clap::Args;
use tracing::level_filters::LevelFilter;

use crate::storage::STORE_KEY;

use super::config::{TrackerConfig, DEFAULT_DEBOUNCE_WINDOW, DEFAULT_MIN_INTERVAL};

#[derive(Args, Debug)]
pub struct ServeArgs {
    #[arg(
        long,
        help = "Application directory. By default tries to save into $XDG_STATE_HOME or $HOME/.local/state"
    )]
    pub dir: Option<PathBuf>,
    #[arg(long = "debounce-ms", default_value_t = DEFAULT_DEBOUNCE_WINDOW.as_millis() as u64, help = "Quiet period that collapses bursts of focus events")]
    pub debounce_ms: u64,
    #[arg(long = "min-interval-ms", default_value_t = DEFAULT_MIN_INTERVAL.num_milliseconds() as u64, help = "Focus intervals shorter than this are not recorded")]
    pub min_interval_ms: u64,
    #[arg(long = "block", help = "Additional host to never track. Can be repeated")]
    pub block: Vec<String>,
    #[arg(long = "store-key", default_value = STORE_KEY, help = "Key the focus log is stored under")]
    pub store_key: String,
    #[arg(long = "log-console", help = "Also write logs to stderr")]
    pub log_console: bool,
    #[arg(long = "log-filter")]
    pub log: Option<LevelFilter>,
}

impl From<&ServeArgs> for TrackerConfig {
    fn from(args: &ServeArgs) -> Self {
        let mut config = TrackerConfig {
            debounce_window: std::time::Duration::from_millis(args.debounce_ms),
            min_interval: chrono::Duration::milliseconds(args.min_interval_ms as i64),
            store_key: args.store_key.clone(),
            ..TrackerConfig::default()
        };
        config.blocklist.extend(args.block.iter().cloned());
        config
    }
}
