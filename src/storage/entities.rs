use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::{bail, Result};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Tolerance used when comparing a stored aggregate with the recomputed one.
const ACCUMULATED_EPSILON: f64 = 1e-6;

/// A contiguous span of focus on a single page. `end == None` marks the interval that is
/// currently open.
#[derive(PartialEq, Debug, Serialize, Deserialize, Clone)]
pub struct FocusInterval {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<Arc<str>>,
    #[serde(rename = "focusStart")]
    pub start: DateTime<Utc>,
    #[serde(rename = "focusEnd", default)]
    pub end: Option<DateTime<Utc>>,
}

impl FocusInterval {
    pub fn open(url: Option<Arc<str>>, start: DateTime<Utc>) -> Self {
        Self {
            url,
            start,
            end: None,
        }
    }

    pub fn is_open(&self) -> bool {
        self.end.is_none()
    }

    /// Duration of a closed interval.
    pub fn duration(&self) -> Option<Duration> {
        self.end.map(|end| end - self.start)
    }

    /// Returns the part of a closed interval that lies within `[from, to)`. Open intervals have no
    /// known extent and are never part of a clamp.
    pub fn clamp(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> Option<FocusInterval> {
        let end = self.end?;
        let start = self.start.max(from);
        let end = end.min(to);
        if start >= end {
            return None;
        }
        Some(FocusInterval {
            url: self.url.clone(),
            start,
            end: Some(end),
        })
    }
}

/// Record of everything that happened on one domain.
#[derive(PartialEq, Debug, Serialize, Deserialize, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct DomainLedger {
    /// Chronological: insertion order is start order.
    #[serde(default)]
    pub events: Vec<FocusInterval>,
    #[serde(default)]
    pub accumulated_seconds: f64,
}

impl DomainLedger {
    pub fn open_interval(&self) -> Option<&FocusInterval> {
        self.events.iter().rev().find(|v| v.is_open())
    }

    fn open(&mut self, url: Option<Arc<str>>, start: DateTime<Utc>) {
        self.events.push(FocusInterval::open(url, start));
    }

    /// Closes the most recent open interval and returns its duration.
    fn close(&mut self, end: DateTime<Utc>) -> Option<Duration> {
        let interval = self.events.iter_mut().rev().find(|v| v.is_open())?;
        let end = end.max(interval.start);
        interval.end = Some(end);
        let duration = end - interval.start;
        self.accumulated_seconds += as_seconds(duration);
        Some(duration)
    }

    /// Drops the most recent open interval entirely.
    fn discard_open(&mut self) -> bool {
        match self.events.iter().rposition(|v| v.is_open()) {
            Some(index) => {
                self.events.remove(index);
                true
            }
            None => false,
        }
    }

    /// Full recomputation of [DomainLedger::accumulated_seconds] from the intervals.
    pub fn recomputed_seconds(&self) -> f64 {
        self.events
            .iter()
            .filter_map(|v| v.duration())
            .map(as_seconds)
            .sum()
    }

    pub fn is_consistent(&self) -> bool {
        (self.accumulated_seconds - self.recomputed_seconds()).abs() < ACCUMULATED_EPSILON
    }

    fn is_empty(&self) -> bool {
        self.events.is_empty() && self.accumulated_seconds == 0.
    }
}

fn as_seconds(duration: Duration) -> f64 {
    duration.num_milliseconds() as f64 / 1000.
}

/// The whole persisted document: domain -> ledger.
#[derive(PartialEq, Debug, Serialize, Deserialize, Clone, Default)]
#[serde(transparent)]
pub struct FocusLog {
    ledgers: BTreeMap<Arc<str>, DomainLedger>,
}

impl FocusLog {
    pub fn ledger(&self, domain: &str) -> Option<&DomainLedger> {
        self.ledgers.get(domain)
    }

    pub fn ledgers(&self) -> impl Iterator<Item = (&Arc<str>, &DomainLedger)> {
        self.ledgers.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.ledgers.is_empty()
    }

    /// Every interval of every domain, paired with its domain.
    pub fn intervals(&self) -> impl Iterator<Item = (&Arc<str>, &FocusInterval)> {
        self.ledgers
            .iter()
            .flat_map(|(domain, ledger)| ledger.events.iter().map(move |v| (domain, v)))
    }

    pub fn open_intervals(&self) -> impl Iterator<Item = (&Arc<str>, &FocusInterval)> {
        self.intervals().filter(|(_, v)| v.is_open())
    }

    /// Appends an open interval, creating the ledger if needed.
    pub fn open(&mut self, domain: &str, url: Option<Arc<str>>, start: DateTime<Utc>) {
        match self.ledgers.get_mut(domain) {
            Some(ledger) => ledger.open(url, start),
            None => {
                let mut ledger = DomainLedger::default();
                ledger.open(url, start);
                self.ledgers.insert(domain.into(), ledger);
            }
        }
    }

    /// Closes the latest open interval of `domain`. `None` when there was nothing to close.
    pub fn close(&mut self, domain: &str, end: DateTime<Utc>) -> Option<Duration> {
        self.ledgers.get_mut(domain)?.close(end)
    }

    /// Removes the latest open interval of `domain`. A ledger left with nothing in it is removed.
    pub fn discard_open(&mut self, domain: &str) -> bool {
        let Some(ledger) = self.ledgers.get_mut(domain) else {
            return false;
        };
        let discarded = ledger.discard_open();
        if ledger.is_empty() {
            self.ledgers.remove(domain);
        }
        discarded
    }

    /// Removes every open interval. Returns how many were dropped.
    pub fn discard_all_open(&mut self) -> usize {
        let mut discarded = 0;
        for ledger in self.ledgers.values_mut() {
            let before = ledger.events.len();
            ledger.events.retain(|v| !v.is_open());
            discarded += before - ledger.events.len();
        }
        self.ledgers.retain(|_, ledger| !ledger.is_empty());
        discarded
    }

    /// Structural checks a loaded document has to pass.
    pub fn validate(&self) -> Result<()> {
        for (domain, ledger) in &self.ledgers {
            for interval in &ledger.events {
                if let Some(end) = interval.end {
                    if end < interval.start {
                        bail!(
                            "Interval of {domain} ends at {end} before its start {}",
                            interval.start
                        );
                    }
                }
            }
            if !ledger.accumulated_seconds.is_finite() || ledger.accumulated_seconds < 0. {
                bail!(
                    "Ledger of {domain} has invalid accumulated time {}",
                    ledger.accumulated_seconds
                );
            }
        }
        Ok(())
    }

    /// Rewrites aggregates that disagree with their intervals. Returns the affected domains.
    pub fn reconcile(&mut self) -> Vec<Arc<str>> {
        let mut fixed = Vec::new();
        for (domain, ledger) in self.ledgers.iter_mut() {
            if !ledger.is_consistent() {
                ledger.accumulated_seconds = ledger.recomputed_seconds();
                fixed.push(domain.clone());
            }
        }
        fixed
    }
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};

    use super::{FocusInterval, FocusLog};

    const TEST_START_DATE: NaiveDateTime =
        NaiveDateTime::new(NaiveDate::from_ymd_opt(2018, 7, 4).unwrap(), NaiveTime::MIN);

    fn at(seconds: i64) -> DateTime<Utc> {
        Utc.from_utc_datetime(&TEST_START_DATE) + Duration::seconds(seconds)
    }

    #[test]
    fn test_open_close_accumulates() {
        let mut log = FocusLog::default();
        log.open("a.com", Some("https://a.com/".into()), at(0));
        assert_eq!(log.open_intervals().count(), 1);

        assert_eq!(log.close("a.com", at(5)), Some(Duration::seconds(5)));
        assert_eq!(log.open_intervals().count(), 0);

        log.open("a.com", None, at(10));
        log.close("a.com", at(13));

        let ledger = log.ledger("a.com").unwrap();
        assert_eq!(ledger.events.len(), 2);
        assert_eq!(ledger.accumulated_seconds, 8.);
        assert_eq!(ledger.accumulated_seconds, ledger.recomputed_seconds());
    }

    #[test]
    fn test_close_without_open_is_noop() {
        let mut log = FocusLog::default();
        log.open("a.com", None, at(0));
        log.close("a.com", at(2));
        let before = log.clone();

        assert_eq!(log.close("a.com", at(4)), None);
        assert_eq!(log.close("b.com", at(4)), None);
        assert_eq!(log, before);
    }

    #[test]
    fn test_close_clamps_end_before_start() {
        let mut log = FocusLog::default();
        log.open("a.com", None, at(10));
        assert_eq!(log.close("a.com", at(3)), Some(Duration::zero()));
        assert_eq!(log.ledger("a.com").unwrap().events[0].end, Some(at(10)));
    }

    #[test]
    fn test_discard_open_removes_fresh_ledger() {
        let mut log = FocusLog::default();
        log.open("a.com", None, at(0));
        assert!(log.discard_open("a.com"));
        assert!(log.ledger("a.com").is_none());
        assert!(!log.discard_open("a.com"));
    }

    #[test]
    fn test_discard_open_keeps_closed_history() {
        let mut log = FocusLog::default();
        log.open("a.com", None, at(0));
        log.close("a.com", at(4));
        log.open("a.com", None, at(5));
        assert!(log.discard_open("a.com"));

        let ledger = log.ledger("a.com").unwrap();
        assert_eq!(ledger.events.len(), 1);
        assert_eq!(ledger.accumulated_seconds, 4.);
    }

    #[test]
    fn test_discard_all_open() {
        let mut log = FocusLog::default();
        log.open("a.com", None, at(0));
        log.close("a.com", at(4));
        log.open("a.com", None, at(5));
        log.open("b.com", None, at(6));

        assert_eq!(log.discard_all_open(), 2);
        assert_eq!(log.open_intervals().count(), 0);
        assert!(log.ledger("b.com").is_none());
        assert_eq!(log.ledger("a.com").unwrap().events.len(), 1);
    }

    #[test]
    fn test_reconcile_and_validate() {
        let mut log: FocusLog = serde_json::from_str(
            r#"{"a.com":{"events":[{"focusStart":"2018-07-04T00:00:00Z","focusEnd":"2018-07-04T00:00:05Z"}],"accumulatedSeconds":99}}"#,
        )
        .unwrap();
        assert!(log.validate().is_ok());
        assert_eq!(log.reconcile(), vec!["a.com".into()]);
        assert_eq!(log.ledger("a.com").unwrap().accumulated_seconds, 5.);

        let broken: FocusLog = serde_json::from_str(
            r#"{"a.com":{"events":[{"focusStart":"2018-07-04T00:00:05Z","focusEnd":"2018-07-04T00:00:00Z"}],"accumulatedSeconds":0}}"#,
        )
        .unwrap();
        assert!(broken.validate().is_err());
    }

    #[test]
    fn test_document_shape() {
        let mut log = FocusLog::default();
        log.open("a.com", Some("https://a.com/x".into()), at(0));
        log.close("a.com", at(5));
        log.open("b.com", None, at(5));

        let value = serde_json::to_value(&log).unwrap();
        assert_eq!(value["a.com"]["accumulatedSeconds"], 5.0);
        assert_eq!(value["a.com"]["events"][0]["url"], "https://a.com/x");
        assert_eq!(
            value["a.com"]["events"][0]["focusEnd"],
            "2018-07-04T00:00:05Z"
        );
        assert!(value["b.com"]["events"][0]["focusEnd"].is_null());
    }

    #[test]
    fn test_clamp() {
        let interval = FocusInterval {
            url: None,
            start: at(0),
            end: Some(at(10)),
        };
        let clamped = interval.clamp(at(4), at(20)).unwrap();
        assert_eq!(clamped.start, at(4));
        assert_eq!(clamped.end, Some(at(10)));
        assert!(interval.clamp(at(10), at(20)).is_none());
        assert!(FocusInterval::open(None, at(0)).clamp(at(0), at(5)).is_none());
    }
}
