pub mod analysis;
pub mod blocks;

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::storage::entities::{FocusInterval, FocusLog};

/// Time range a report looks at. Intervals are cut to `[start, end)`.
#[derive(Debug, Clone, Copy)]
pub struct ExtractConfig {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl ExtractConfig {
    fn filter(&self, interval: &FocusInterval) -> Option<FocusInterval> {
        interval.clamp(self.start, self.end)
    }
}

/// Closed intervals of every domain that fall within the configured range, clamped to it.
pub fn extract_between(
    log: &FocusLog,
    config: ExtractConfig,
) -> impl Iterator<Item = (Arc<str>, FocusInterval)> + '_ {
    log.intervals()
        .filter_map(move |(domain, interval)| Some((domain.clone(), config.filter(interval)?)))
}
