use std::{path::Path, sync::Arc};

use anyhow::Result;
use config::{TrackerConfig, EVENT_BUFFER};
use debounce::DebounceModule;
use domain::DomainResolver;
use source::EventSource;
use state::FocusTracker;
use tokio::{io::AsyncBufRead, sync::mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::{
    host::{tab_table::TabTable, HostApi, HostEvent},
    storage::{focus_store::FocusEventStore, kv::FileKeyValueStore},
    utils::clock::{Clock, DefaultClock},
};

pub mod args;
pub mod config;
pub mod debounce;
pub mod domain;
pub mod module;
pub mod shutdown;
pub mod source;
pub mod state;

/// Runs the tracker against the feed on `input` until the feed ends or the process is
/// interrupted. The focus log lives in `<dir>/store`.
pub async fn start_tracker(
    dir: &Path,
    config: TrackerConfig,
    input: impl AsyncBufRead + Unpin,
) -> Result<()> {
    run_pipeline(dir, config, input, DefaultClock, shutdown::detect_shutdown).await
}

async fn run_pipeline<C, S, F>(
    dir: &Path,
    config: TrackerConfig,
    input: impl AsyncBufRead + Unpin,
    clock: C,
    shutdown: S,
) -> Result<()>
where
    C: Clock + Clone,
    S: FnOnce(CancellationToken) -> F,
    F: std::future::Future<Output = ()>,
{
    let (sender, receiver) = mpsc::channel::<HostEvent>(EVENT_BUFFER);
    let tabs = TabTable::default();
    let shutdown_token = CancellationToken::new();

    let source = EventSource::new(input, sender, tabs.clone(), shutdown_token.clone());

    let tracker = Arc::new(create_tracker(dir, tabs, &config, clock.clone())?);
    tracker.recover().await;
    info!("Tracking with {config:?}");

    let processor = DebounceModule::new(
        receiver,
        tracker,
        config.debounce_window,
        Box::new(clock),
    );

    let (_, source_result, processing_result) = tokio::join!(
        shutdown(shutdown_token),
        source.run(),
        processor.run(),
    );

    if let Err(source_result) = source_result {
        error!("Event source got an error {:?}", source_result);
    }

    if let Err(processing_result) = processing_result {
        error!("Processing module got an error {:?}", processing_result);
    }

    Ok(())
}

fn create_tracker<H: HostApi>(
    dir: &Path,
    host: H,
    config: &TrackerConfig,
    clock: impl Clock,
) -> Result<FocusTracker<FileKeyValueStore, H>> {
    let kv = FileKeyValueStore::new(dir.join("store"))?;
    Ok(FocusTracker::new(
        FocusEventStore::new(kv, config.store_key.as_str()),
        host,
        DomainResolver::new(config.blocklist.iter().cloned()),
        Box::new(clock),
        config.min_interval,
    ))
}

#[cfg(test)]
mod tracker_tests {
    use std::time::Duration;

    use anyhow::Result;
    use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
    use tempfile::tempdir;
    use tokio::io::{AsyncWriteExt, BufReader};
    use tokio_util::sync::CancellationToken;

    use crate::{
        storage::{focus_store::FocusEventStore, kv::FileKeyValueStore, STORE_KEY},
        tracker::config::TrackerConfig,
        utils::{clock::TestClock, logging::TEST_LOGGING},
    };

    use super::run_pipeline;

    const TEST_START_DATE: NaiveDateTime =
        NaiveDateTime::new(NaiveDate::from_ymd_opt(2018, 7, 4).unwrap(), NaiveTime::MIN);

    fn start() -> DateTime<Utc> {
        Utc.from_utc_datetime(&TEST_START_DATE)
    }

    async fn wait_for_cancel(token: CancellationToken) {
        token.cancelled().await
    }

    /// Drives the whole pipeline over a real directory: feed -> tab table -> debounce -> tracker
    /// -> file store.
    #[tokio::test(start_paused = true)]
    async fn smoke_test_tracker() -> Result<()> {
        *TEST_LOGGING;
        let dir = tempdir()?;
        let (mut writer, reader) = tokio::io::duplex(4096);
        let clock = TestClock::starting_at(start());

        let lines = [
            r#"{"event":"tab_updated","tab_id":1,"window_id":1,"url":"https://a.com/","status":"complete"}"#,
            r#"{"event":"tab_updated","tab_id":2,"window_id":1,"url":"https://b.com/","status":"complete"}"#,
            r#"{"event":"tab_activated","tab_id":1,"window_id":1}"#,
        ];

        let feed = async move {
            for line in lines {
                writer.write_all(line.as_bytes()).await?;
                writer.write_all(b"\n").await?;
            }
            tokio::time::sleep(Duration::from_millis(2000)).await;
            // Burst: b then a then b again. Only the last one counts.
            for tab in [2, 1, 2] {
                writer
                    .write_all(
                        format!(r#"{{"event":"tab_activated","tab_id":{tab},"window_id":1}}"#)
                            .as_bytes(),
                    )
                    .await?;
                writer.write_all(b"\n").await?;
            }
            tokio::time::sleep(Duration::from_millis(2000)).await;
            drop(writer);
            anyhow::Ok(())
        };

        let config = TrackerConfig {
            debounce_window: Duration::from_millis(100),
            ..TrackerConfig::default()
        };
        let (pipeline, fed) = tokio::join!(
            run_pipeline(
                dir.path(),
                config,
                BufReader::new(reader),
                clock,
                wait_for_cancel
            ),
            feed
        );
        pipeline?;
        fed?;

        let store =
            FocusEventStore::new(FileKeyValueStore::new(dir.path().join("store"))?, STORE_KEY);
        let log = store.load().await;

        assert_eq!(log.open_intervals().count(), 0);
        // a.com from the first debounce deadline to the end of the burst, b.com until the feed ends.
        let a = log.ledger("a.com").unwrap();
        assert_eq!(a.events.len(), 1);
        assert!((1.9..=2.1).contains(&a.accumulated_seconds));
        let b = log.ledger("b.com").unwrap();
        assert_eq!(b.events.len(), 1);
        assert!((1.8..=2.0).contains(&b.accumulated_seconds));
        assert!(a.events[0].end.unwrap() <= b.events[0].start);
        Ok(())
    }
}
