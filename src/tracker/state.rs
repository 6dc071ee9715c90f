use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use tokio::sync::Mutex;
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::{
    host::{HostApi, HostEvent, LoadStatus, TabId, WindowId},
    storage::{entities::FocusLog, focus_store::FocusEventStore, kv::KeyValueStore},
    utils::clock::Clock,
};

use super::{domain::DomainResolver, module::EventProcessor};

/// The interval the tracker currently keeps open.
#[derive(Debug, Clone, PartialEq)]
pub struct OpenFocus {
    pub domain: Arc<str>,
    pub url: Option<Arc<str>>,
    pub start: DateTime<Utc>,
}

/// Volatile view of what holds focus. `current.is_some()` exactly when the store holds an open
/// interval for `current.domain`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrackerState {
    pub current: Option<OpenFocus>,
    pub active_tab: Option<TabId>,
    pub active_window: Option<WindowId>,
}

impl TrackerState {
    pub fn is_idle(&self) -> bool {
        self.current.is_none()
    }
}

/// Everything a transition reads or writes. Only reachable through the tracker's lock.
struct Critical<K> {
    state: TrackerState,
    store: FocusEventStore<K>,
}

/// State machine that turns host focus events into focus intervals.
///
/// Every event is handled as one transition under a single async mutex: close the previous
/// interval, then maybe open the next one. The store does a read-modify-write per step, and the
/// mutex guarantees no two transitions read the same snapshot. Waiters are served in FIFO order and
/// the guard is dropped on every exit path.
pub struct FocusTracker<K, H> {
    critical: Mutex<Critical<K>>,
    host: H,
    resolver: DomainResolver,
    clock: Box<dyn Clock>,
    min_interval: Duration,
}

impl<K: KeyValueStore, H: HostApi> FocusTracker<K, H> {
    pub fn new(
        store: FocusEventStore<K>,
        host: H,
        resolver: DomainResolver,
        clock: Box<dyn Clock>,
        min_interval: Duration,
    ) -> Self {
        Self {
            critical: Mutex::new(Critical {
                state: TrackerState::default(),
                store,
            }),
            host,
            resolver,
            clock,
            min_interval,
        }
    }

    /// Drops open intervals left by an earlier process, since nothing in memory refers to them.
    pub async fn recover(&self) {
        let mut critical = self.critical.lock().await;
        critical.state = TrackerState::default();
        if let Err(e) = critical.store.discard_stale().await {
            error!("Failed to clean up stale intervals {e:?}");
        }
    }

    /// Applies one host event. Never fails: problems are logged and degrade to a missing interval.
    pub async fn handle(&self, event: HostEvent) {
        let span = info_span!("Focus transition", ?event);
        async {
            let mut critical = self.critical.lock().await;
            self.transition(&mut critical, event).await;
        }
        .instrument(span)
        .await
    }

    /// Closes whatever is open. Used on shutdown; losing this final write is acceptable.
    pub async fn close_current(&self) {
        let mut critical = self.critical.lock().await;
        self.go_idle(&mut critical).await;
    }

    pub async fn state(&self) -> TrackerState {
        self.critical.lock().await.state.clone()
    }

    /// Current persisted log, read under the lock.
    pub async fn snapshot(&self) -> FocusLog {
        self.critical.lock().await.store.load().await
    }

    async fn transition(&self, critical: &mut Critical<K>, event: HostEvent) {
        match event {
            HostEvent::TabActivated { tab_id, window_id } => {
                self.on_tab_activated(critical, tab_id, window_id).await
            }
            HostEvent::TabUpdated {
                tab_id,
                window_id,
                url,
                status,
            } => {
                if status != LoadStatus::Complete {
                    debug!("{tab_id} is still loading");
                    return self.resync(critical).await;
                }
                self.on_tab_updated(critical, tab_id, window_id, url).await
            }
            HostEvent::WindowFocusChanged { window_id: None } => {
                debug!("Browser lost focus");
                self.go_idle(critical).await
            }
            HostEvent::WindowFocusChanged {
                window_id: Some(window_id),
            } => self.on_window_focused(critical, window_id).await,
            HostEvent::TabRemoved { tab_id, .. } => {
                if critical.state.active_tab == Some(tab_id) {
                    debug!("Tracked {tab_id} was removed");
                    self.go_idle(critical).await
                }
            }
            HostEvent::WindowRemoved { window_id } => {
                if critical.state.active_window == Some(window_id) {
                    debug!("Tracked {window_id} was removed");
                    self.go_idle(critical).await
                }
            }
            HostEvent::Suspend => {
                info!("Host is suspending");
                self.go_idle(critical).await
            }
        }
    }

    async fn on_tab_activated(
        &self,
        critical: &mut Critical<K>,
        tab_id: TabId,
        window_id: WindowId,
    ) {
        match self.host.window_has_focus(window_id).await {
            Ok(true) => {}
            Ok(false) => {
                debug!("Activation of {tab_id} happened in unfocused {window_id}");
                return self.resync(critical).await;
            }
            Err(e) => {
                warn!("Failed to query focus of {window_id}, aborting transition: {e:?}");
                self.go_idle(critical).await;
                return;
            }
        }

        match self.host.tab(tab_id).await {
            Ok(tab) => {
                critical.state.active_tab = Some(tab.id);
                critical.state.active_window = Some(tab.window_id);
                self.retarget(critical, tab.url).await
            }
            Err(e) => {
                warn!("Failed to look up {tab_id}, aborting transition: {e:?}");
                self.go_idle(critical).await
            }
        }
    }

    async fn on_tab_updated(
        &self,
        critical: &mut Critical<K>,
        tab_id: TabId,
        window_id: WindowId,
        url: Arc<str>,
    ) {
        if critical.state.active_tab != Some(tab_id) {
            // An activation of this tab may have been collapsed into this update.
            let focused = matches!(self.host.window_has_focus(window_id).await, Ok(true));
            let active = matches!(self.host.tab(tab_id).await, Ok(tab) if tab.active);
            if !(focused && active) {
                debug!("Navigation of {tab_id} happened in the background");
                return self.resync(critical).await;
            }
            critical.state.active_tab = Some(tab_id);
            critical.state.active_window = Some(window_id);
        }
        self.retarget(critical, Some(url)).await
    }

    async fn on_window_focused(&self, critical: &mut Critical<K>, window_id: WindowId) {
        match self.host.active_tab(window_id).await {
            Ok(Some(tab)) => {
                critical.state.active_tab = Some(tab.id);
                critical.state.active_window = Some(window_id);
                self.retarget(critical, tab.url).await
            }
            Ok(None) => {
                debug!("Focused {window_id} has no known active tab");
                self.go_idle(critical).await
            }
            Err(e) => {
                warn!("Failed to look up active tab of {window_id}, aborting transition: {e:?}");
                self.go_idle(critical).await
            }
        }
    }

    /// Re-derives the target from the host after an event that moved nothing by itself. Such an
    /// event may be the survivor of a collapsed burst whose earlier events did move focus.
    async fn resync(&self, critical: &mut Critical<K>) {
        match self.host.focused_window().await {
            Ok(Some(window_id)) => self.on_window_focused(critical, window_id).await,
            Ok(None) => {
                debug!("No window holds focus");
                self.go_idle(critical).await
            }
            Err(e) => {
                warn!("Failed to look up the focused window, aborting transition: {e:?}");
                self.go_idle(critical).await
            }
        }
    }

    /// Moves focus to `url`. Refocusing the page that is already open keeps its interval running.
    async fn retarget(&self, critical: &mut Critical<K>, url: Option<Arc<str>>) {
        let domain = url.as_deref().and_then(|v| self.resolver.resolve(v));

        if let (Some(current), Some(domain)) = (&critical.state.current, &domain) {
            if current.domain == *domain && current.url == url {
                debug!("{domain} is already focused");
                return;
            }
        }

        self.close(critical).await;

        match domain {
            Some(domain) => self.open(critical, domain, url).await,
            None => debug!("{url:?} is not trackable, staying idle"),
        }
    }

    async fn go_idle(&self, critical: &mut Critical<K>) {
        self.close(critical).await;
        critical.state.active_tab = None;
        critical.state.active_window = None;
    }

    async fn open(&self, critical: &mut Critical<K>, domain: Arc<str>, url: Option<Arc<str>>) {
        let start = self.clock.time();
        if let Err(e) = critical
            .store
            .append_open(&domain, url.clone(), start)
            .await
        {
            error!("Failed to persist start of {domain}: {e:?}");
        }
        info!("Focused {domain}");
        critical.state.current = Some(OpenFocus { domain, url, start });
    }

    /// Ends the open interval, if any. Intervals shorter than the configured minimum are dropped.
    async fn close(&self, critical: &mut Critical<K>) {
        let Some(open) = critical.state.current.take() else {
            return;
        };
        let end = self.clock.time().max(open.start);
        let duration = end - open.start;

        let result = if duration < self.min_interval {
            debug!(
                "Dropping {}ms on {}, below the minimum",
                duration.num_milliseconds(),
                open.domain
            );
            critical.store.discard_open(&open.domain).await
        } else {
            info!(
                "Closed {} after {}ms",
                open.domain,
                duration.num_milliseconds()
            );
            critical.store.close_open(&open.domain, end).await
        };

        if let Err(e) = result {
            error!("Failed to persist end of {}: {e:?}", open.domain);
        }
    }
}

impl<K: KeyValueStore, H: HostApi> EventProcessor for Arc<FocusTracker<K, H>> {
    async fn process_next(&mut self, event: HostEvent) -> Result<()> {
        self.handle(event).await;
        Ok(())
    }

    async fn finalize(&mut self) -> Result<()> {
        self.close_current().await;
        Ok(())
    }
}
