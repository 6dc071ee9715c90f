use std::{collections::HashMap, sync::Arc};

use chrono::Duration;

use crate::storage::entities::FocusInterval;

#[derive(Debug, PartialEq)]
pub struct DomainUsage {
    pub domain: Arc<str>,
    pub duration: Duration,
}

impl DomainUsage {
    fn new(domain: Arc<str>) -> Self {
        Self {
            domain,
            duration: Duration::zero(),
        }
    }
}

/// Returns time per domain, longest first, plus the total tracked time. Domains below
/// `min_percentage` of the total are left out of the list but still count towards the total.
pub fn analyze_domains(
    intervals: impl IntoIterator<Item = (Arc<str>, FocusInterval)>,
    min_percentage: f64,
) -> (Vec<DomainUsage>, Duration) {
    let mut map = HashMap::<Arc<str>, DomainUsage>::new();
    let mut interval_sum = Duration::zero();

    for (domain, interval) in intervals {
        let Some(duration) = interval.duration() else {
            continue;
        };
        interval_sum += duration;
        map.entry(domain.clone())
            .or_insert_with(|| DomainUsage::new(domain))
            .duration += duration;
    }

    let threshold_ms = interval_sum.num_milliseconds() as f64 * min_percentage / 100.;

    let mut usages = map
        .into_values()
        .filter(|v| v.duration.num_milliseconds() as f64 >= threshold_ms)
        .collect::<Vec<_>>();
    usages.sort_by(|a, b| b.duration.cmp(&a.duration).then(a.domain.cmp(&b.domain)));
    (usages, interval_sum)
}
