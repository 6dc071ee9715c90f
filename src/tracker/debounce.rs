use std::time::Duration;

use anyhow::Result;
use tokio::sync::mpsc::Receiver;
use tracing::{debug, error, trace};

use crate::{host::HostEvent, utils::clock::Clock};

use super::module::EventProcessor;

/// Sits between the event source and the tracker. Burst-prone events are held back until the feed
/// has been quiet for `window`; only the last one of a burst is processed. Any other event first
/// flushes the held one, so ordering across kinds is preserved.
pub struct DebounceModule<Processor> {
    receiver: Receiver<HostEvent>,
    processor: Processor,
    window: Duration,
    clock: Box<dyn Clock>,
}

impl<P: EventProcessor> DebounceModule<P> {
    pub fn new(
        receiver: Receiver<HostEvent>,
        processor: P,
        window: Duration,
        clock: Box<dyn Clock>,
    ) -> Self {
        Self {
            receiver,
            processor,
            window,
            clock,
        }
    }

    pub async fn run(mut self) -> Result<()> {
        let mut pending: Option<HostEvent> = None;
        let mut deadline = self.clock.instant();

        loop {
            // `None` means the quiet period ran out before anything else arrived.
            let received = match pending {
                Some(_) => tokio::select! {
                    next = self.receiver.recv() => Some(next),
                    _ = self.clock.sleep_until(deadline) => None,
                },
                None => Some(self.receiver.recv().await),
            };

            let Some(next) = received else {
                self.flush(&mut pending).await;
                continue;
            };
            let Some(event) = next else {
                break;
            };

            if event.is_burst_prone() {
                if let Some(superseded) = pending.replace(event) {
                    trace!("Collapsed {superseded:?}");
                }
                deadline = self.clock.instant() + self.window;
            } else {
                self.flush(&mut pending).await;
                self.dispatch(event).await;
            }
        }

        self.flush(&mut pending).await;
        let result = self.processor.finalize().await;
        self.receiver.close();
        result
    }

    async fn flush(&mut self, pending: &mut Option<HostEvent>) {
        if let Some(event) = pending.take() {
            self.dispatch(event).await;
        }
    }

    async fn dispatch(&mut self, event: HostEvent) {
        debug!("Processing event {:?}", event);
        if let Err(e) = self.processor.process_next(event.clone()).await {
            error!("Error processing event {:?}: {e:?}", event);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{
        future::Future,
        sync::{Arc, Mutex},
        time::Duration,
    };

    use anyhow::Result;
    use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
    use tokio::{sync::mpsc, time::Instant};

    use crate::{
        host::{tab_table::TabTable, HostEvent, LoadStatus, TabId, WindowId},
        storage::{
            entities::FocusLog, focus_store::FocusEventStore, kv::MemoryKeyValueStore, STORE_KEY,
        },
        tracker::{
            config::DEFAULT_MIN_INTERVAL, domain::DomainResolver, module::EventProcessor,
            state::FocusTracker,
        },
        utils::clock::{DefaultClock, TestClock},
    };

    use super::DebounceModule;

    /// Records what reached it and when, in milliseconds since the test started.
    #[derive(Clone)]
    struct Recorder {
        origin: Instant,
        seen: Arc<Mutex<Vec<(u128, HostEvent)>>>,
        finalized: Arc<Mutex<bool>>,
    }

    impl Recorder {
        fn new() -> Self {
            Self {
                origin: Instant::now(),
                seen: Default::default(),
                finalized: Default::default(),
            }
        }

        fn seen(&self) -> Vec<(u128, HostEvent)> {
            self.seen.lock().unwrap().clone()
        }

        fn finalized(&self) -> bool {
            *self.finalized.lock().unwrap()
        }
    }

    impl EventProcessor for Recorder {
        async fn process_next(&mut self, event: HostEvent) -> Result<()> {
            let elapsed = self.origin.elapsed().as_millis();
            self.seen.lock().unwrap().push((elapsed, event));
            Ok(())
        }

        async fn finalize(&mut self) -> Result<()> {
            *self.finalized.lock().unwrap() = true;
            Ok(())
        }
    }

    fn activated(tab: i64) -> HostEvent {
        HostEvent::TabActivated {
            tab_id: TabId(tab),
            window_id: WindowId(1),
        }
    }

    /// Runs the module against `feed`, which owns the sending side and closes it by returning.
    async fn run_with<F, Fut>(recorder: &Recorder, feed: F) -> Result<()>
    where
        F: FnOnce(mpsc::Sender<HostEvent>) -> Fut,
        Fut: Future<Output = Result<()>>,
    {
        debounce_into(recorder.clone(), feed).await
    }

    async fn debounce_into<P, F, Fut>(processor: P, feed: F) -> Result<()>
    where
        P: EventProcessor,
        F: FnOnce(mpsc::Sender<HostEvent>) -> Fut,
        Fut: Future<Output = Result<()>>,
    {
        let (sender, receiver) = mpsc::channel(16);
        let module = DebounceModule::new(
            receiver,
            processor,
            Duration::from_millis(100),
            Box::new(DefaultClock),
        );
        let (processed, fed) = tokio::join!(module.run(), feed(sender));
        processed?;
        fed
    }

    async fn sleep_ms(millis: u64) {
        tokio::time::sleep(Duration::from_millis(millis)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_collapses_to_last() -> Result<()> {
        let recorder = Recorder::new();
        run_with(&recorder, |sender| async move {
            sleep_ms(100).await;
            sender.send(activated(1)).await?;
            sleep_ms(40).await;
            sender.send(activated(2)).await?;
            sleep_ms(500).await;
            Ok(())
        })
        .await?;

        let seen = recorder.seen();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].1, activated(2));
        // Applied once the window after the last event (t=140ms) ran out.
        assert!((240..250).contains(&seen[0].0), "applied at {}ms", seen[0].0);
        assert!(recorder.finalized());
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn test_many_events_in_window_apply_once() -> Result<()> {
        let recorder = Recorder::new();
        run_with(&recorder, |sender| async move {
            for tab in 1..=8 {
                sender.send(activated(tab)).await?;
                sleep_ms(10).await;
            }
            sender
                .send(HostEvent::WindowFocusChanged {
                    window_id: Some(WindowId(1)),
                })
                .await?;
            sender.send(activated(9)).await?;
            sleep_ms(300).await;
            Ok(())
        })
        .await?;

        let seen = recorder.seen();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].1, activated(9));
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn test_separated_events_all_apply() -> Result<()> {
        let recorder = Recorder::new();
        run_with(&recorder, |sender| async move {
            sender.send(activated(1)).await?;
            sleep_ms(250).await;
            sender.send(activated(2)).await?;
            sleep_ms(250).await;
            Ok(())
        })
        .await?;

        let seen = recorder.seen();
        assert_eq!(
            seen.into_iter().map(|v| v.1).collect::<Vec<_>>(),
            vec![activated(1), activated(2)]
        );
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_burst_event_flushes_pending_first() -> Result<()> {
        let recorder = Recorder::new();
        run_with(&recorder, |sender| async move {
            sender.send(activated(1)).await?;
            sender
                .send(HostEvent::TabRemoved {
                    tab_id: TabId(1),
                    window_id: WindowId(1),
                })
                .await?;
            Ok(())
        })
        .await?;

        let seen = recorder.seen();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0], (0, activated(1)));
        assert!(matches!(seen[1].1, HostEvent::TabRemoved { .. }));
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn test_pending_is_flushed_on_close() -> Result<()> {
        let recorder = Recorder::new();
        run_with(&recorder, |sender| async move {
            sender.send(activated(3)).await?;
            Ok(())
        })
        .await?;

        assert_eq!(recorder.seen(), vec![(0, activated(3))]);
        assert!(recorder.finalized());
        Ok(())
    }

    const TEST_START_DATE: NaiveDateTime =
        NaiveDateTime::new(NaiveDate::from_ymd_opt(2018, 7, 4).unwrap(), NaiveTime::MIN);

    fn at(millis: i64) -> DateTime<Utc> {
        Utc.from_utc_datetime(&TEST_START_DATE) + chrono::Duration::milliseconds(millis)
    }

    fn updated(tab: i64, url: &str, status: LoadStatus) -> HostEvent {
        HostEvent::TabUpdated {
            tab_id: TabId(tab),
            window_id: WindowId(1),
            url: url.into(),
            status,
        }
    }

    /// Three loaded tabs in window 1. a.com gets focus and holds it for 5s, then `burst` goes
    /// through the debounce stage 20ms apart, recorded in the host mirror as it is sent. Returns
    /// the log after the feed ends 2s later.
    async fn focus_after_burst(burst: Vec<HostEvent>) -> Result<FocusLog> {
        let table = TabTable::default();
        table.record(&updated(1, "https://a.com/", LoadStatus::Complete))?;
        table.record(&updated(2, "https://b.com/", LoadStatus::Complete))?;
        table.record(&updated(3, "https://c.com/", LoadStatus::Complete))?;
        let tracker = Arc::new(FocusTracker::new(
            FocusEventStore::new(MemoryKeyValueStore::default(), STORE_KEY),
            table.clone(),
            DomainResolver::default(),
            Box::new(TestClock::starting_at(at(0))),
            DEFAULT_MIN_INTERVAL,
        ));

        table.record(&activated(1))?;
        tracker.handle(activated(1)).await;
        sleep_ms(5_000).await;

        let mirror = table.clone();
        debounce_into(tracker.clone(), |sender| async move {
            for event in burst {
                mirror.record(&event)?;
                sender.send(event).await?;
                sleep_ms(20).await;
            }
            sleep_ms(2_000).await;
            Ok(())
        })
        .await?;

        Ok(tracker.snapshot().await)
    }

    fn focused_domains(log: &FocusLog) -> Vec<&str> {
        log.ledgers().map(|(domain, _)| domain.as_ref()).collect()
    }

    #[tokio::test(start_paused = true)]
    async fn test_activation_survives_background_load() -> Result<()> {
        let log = focus_after_burst(vec![
            activated(2),
            updated(3, "https://c.com/next", LoadStatus::Loading),
        ])
        .await?;

        assert_eq!(focused_domains(&log), vec!["a.com", "b.com"]);
        let b = log.ledger("b.com").unwrap();
        assert_eq!(b.events.len(), 1);
        assert_eq!(b.events[0].url.as_deref(), Some("https://b.com/"));
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn test_activation_survives_background_navigation() -> Result<()> {
        let log = focus_after_burst(vec![
            activated(2),
            updated(3, "https://d.com/", LoadStatus::Complete),
        ])
        .await?;

        assert_eq!(focused_domains(&log), vec!["a.com", "b.com"]);
        assert_eq!(log.ledger("b.com").unwrap().events.len(), 1);
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn test_focus_loss_survives_background_navigation() -> Result<()> {
        let log = focus_after_burst(vec![
            HostEvent::WindowFocusChanged { window_id: None },
            updated(3, "https://d.com/", LoadStatus::Complete),
        ])
        .await?;

        assert_eq!(focused_domains(&log), vec!["a.com"]);
        let a = log.ledger("a.com").unwrap();
        // Closed when the burst was applied, not when the feed ended.
        assert_eq!(a.events[0].end, Some(at(5_120)));
        assert_eq!(log.open_intervals().count(), 0);
        Ok(())
    }
}
