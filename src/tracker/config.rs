use std::time::Duration;

use crate::storage::STORE_KEY;

use super::domain::DEFAULT_BLOCKLIST;

/// Quiet period a burst of focus events has to settle for before the last one is applied.
pub const DEFAULT_DEBOUNCE_WINDOW: Duration = Duration::from_millis(100);

/// Intervals shorter than this are dropped instead of recorded.
pub const DEFAULT_MIN_INTERVAL: chrono::Duration = chrono::Duration::seconds(1);

/// Capacity of the channel between the event source and the debounce stage.
pub const EVENT_BUFFER: usize = 64;

#[derive(Debug, Clone)]
pub struct TrackerConfig {
    pub debounce_window: Duration,
    pub min_interval: chrono::Duration,
    pub blocklist: Vec<String>,
    pub store_key: String,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            debounce_window: DEFAULT_DEBOUNCE_WINDOW,
            min_interval: DEFAULT_MIN_INTERVAL,
            blocklist: DEFAULT_BLOCKLIST.iter().map(|v| v.to_string()).collect(),
            store_key: STORE_KEY.to_string(),
        }
    }
}
