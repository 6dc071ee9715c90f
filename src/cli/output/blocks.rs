use std::{collections::BTreeMap, sync::Arc};

use chrono::{DateTime, Duration, Utc};

use crate::storage::entities::FocusInterval;

/// One slot of a day view, labeled by whatever dominated it.
#[derive(Debug, Clone, PartialEq)]
pub struct TimeBlock {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub domain: Arc<str>,
    pub url: Option<Arc<str>>,
}

/// Cuts `[start, end)` into blocks of `block` length and labels each with the domain that has the
/// most intervals overlapping it, together with the most common URL among those intervals. Ties
/// go to the alphabetically first. Blocks nothing overlaps are left out.
pub fn time_blocks(
    intervals: &[(Arc<str>, FocusInterval)],
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    block: Duration,
) -> Vec<TimeBlock> {
    let mut blocks = Vec::new();
    if block <= Duration::zero() {
        return blocks;
    }

    let mut block_start = start;
    while block_start < end {
        let block_end = (block_start + block).min(end);
        let overlapping = intervals
            .iter()
            .filter(|(_, v)| v.clamp(block_start, block_end).is_some())
            .collect::<Vec<_>>();

        if let Some(domain) = most_common(overlapping.iter().map(|(domain, _)| domain)) {
            let url = most_common(
                overlapping
                    .iter()
                    .filter(|(d, _)| *d == domain)
                    .filter_map(|(_, v)| v.url.as_ref()),
            );
            blocks.push(TimeBlock {
                start: block_start,
                end: block_end,
                domain,
                url,
            });
        }
        block_start = block_end;
    }
    blocks
}

fn most_common<'a>(values: impl Iterator<Item = &'a Arc<str>>) -> Option<Arc<str>> {
    let mut counts = BTreeMap::<&Arc<str>, usize>::new();
    for value in values {
        *counts.entry(value).or_default() += 1;
    }
    counts
        .into_iter()
        .fold(None, |best: Option<(&Arc<str>, usize)>, (value, count)| match best {
            Some((_, best_count)) if best_count >= count => best,
            _ => Some((value, count)),
        })
        .map(|(value, _)| value.clone())
}
