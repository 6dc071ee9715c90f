use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use super::{entities::FocusLog, kv::KeyValueStore};

/// Read-modify-write access to the focus log document. Each mutation loads the whole document,
/// changes it and writes it back, so calls must never overlap: the methods take `&mut self` and
/// the tracker keeps the store behind its lock.
pub struct FocusEventStore<K> {
    kv: K,
    key: Arc<str>,
}

impl<K: KeyValueStore> FocusEventStore<K> {
    pub fn new(kv: K, key: impl Into<Arc<str>>) -> Self {
        Self {
            kv,
            key: key.into(),
        }
    }

    /// Reads the current document. Absent, unreadable and corrupt documents all load as empty.
    pub async fn load(&self) -> FocusLog {
        match self.read().await {
            Ok(log) => log,
            Err(e) => {
                warn!("Failed to read focus log {:?}, starting empty: {e:?}", self.key);
                FocusLog::default()
            }
        }
    }

    /// Overwrites the document.
    pub async fn save(&mut self, log: &FocusLog) -> Result<()> {
        let document = serde_json::to_string(log)?;
        self.kv.set(&self.key, document).await
    }

    /// Appends an open interval to `domain`'s ledger. Open intervals whose close never reached the
    /// document (a rejected write) are dropped first, so at most one stays open.
    pub async fn append_open(
        &mut self,
        domain: &str,
        url: Option<Arc<str>>,
        start: DateTime<Utc>,
    ) -> Result<()> {
        let mut log = self.read().await?;
        let dangling = log.discard_all_open();
        if dangling > 0 {
            warn!("Dropped {dangling} open intervals that were never closed");
        }
        log.open(domain, url, start);
        self.save(&log).await?;
        debug!("Opened interval for {domain} at {start}");
        Ok(())
    }

    /// Closes the latest open interval of `domain`. Missing open intervals are logged and left
    /// alone.
    pub async fn close_open(&mut self, domain: &str, end: DateTime<Utc>) -> Result<()> {
        let mut log = self.read().await?;
        match log.close(domain, end) {
            Some(duration) => {
                self.save(&log).await?;
                debug!("Closed interval for {domain} after {}ms", duration.num_milliseconds());
            }
            None => warn!("No open interval for {domain} to close at {end}"),
        }
        Ok(())
    }

    /// Drops the latest open interval of `domain` without recording it.
    pub async fn discard_open(&mut self, domain: &str) -> Result<()> {
        let mut log = self.read().await?;
        if log.discard_open(domain) {
            self.save(&log).await?;
            debug!("Discarded open interval for {domain}");
        } else {
            warn!("No open interval for {domain} to discard");
        }
        Ok(())
    }

    /// Drops open intervals a previous process left behind. Their end is unknown.
    pub async fn discard_stale(&mut self) -> Result<usize> {
        let mut log = self.read().await?;
        let discarded = log.discard_all_open();
        if discarded > 0 {
            self.save(&log).await?;
            info!("Discarded {discarded} stale open intervals");
        }
        Ok(discarded)
    }

    /// Like [FocusEventStore::load] except that I/O failures are reported. Used before writes so a
    /// transient read error never causes the document to be replaced by an empty one.
    async fn read(&self) -> Result<FocusLog> {
        let Some(document) = self.kv.get(&self.key).await? else {
            return Ok(FocusLog::default());
        };
        Ok(parse_document(&document))
    }
}

fn parse_document(document: &str) -> FocusLog {
    let mut log = match serde_json::from_str::<FocusLog>(document) {
        Ok(log) => log,
        Err(e) => {
            warn!("Focus log is not valid json, ignoring it: {e}");
            return FocusLog::default();
        }
    };
    if let Err(e) = log.validate() {
        warn!("Focus log failed validation, ignoring it: {e}");
        return FocusLog::default();
    }
    for domain in log.reconcile() {
        warn!("Accumulated time of {domain} disagreed with its intervals, recomputed");
    }
    log
}
