use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard},
};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use tracing::trace;

use super::{HostApi, HostEvent, LoadStatus, TabId, TabInfo, WindowId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WindowFocus {
    /// No focus event seen yet. Every window is assumed to be focused until told otherwise.
    Unknown,
    Nothing,
    Window(WindowId),
}

#[derive(Debug)]
struct Tables {
    tabs: HashMap<TabId, TabInfo>,
    active_tabs: HashMap<WindowId, TabId>,
    focus: WindowFocus,
    /// Stands in for the focused window while focus is [WindowFocus::Unknown].
    last_activated: Option<WindowId>,
}

impl Default for Tables {
    fn default() -> Self {
        Self {
            tabs: HashMap::new(),
            active_tabs: HashMap::new(),
            focus: WindowFocus::Unknown,
            last_activated: None,
        }
    }
}

/// Mirror of the browser's tab and window state, built from the event feed itself. Events are
/// recorded here as they arrive (before debouncing), so lookups always reflect the latest known
/// state even when the event that changed it got collapsed away.
#[derive(Clone, Default)]
pub struct TabTable {
    inner: Arc<Mutex<Tables>>,
}

impl TabTable {
    fn tables(&self) -> Result<MutexGuard<'_, Tables>> {
        self.inner
            .lock()
            .map_err(|_| anyhow!("Tab table lock was poisoned"))
    }

    /// Applies one event to the mirrored state.
    pub fn record(&self, event: &HostEvent) -> Result<()> {
        let mut tables = self.tables()?;
        trace!("Recording {event:?}");
        match event {
            HostEvent::TabActivated { tab_id, window_id } => {
                if let Some(previous) = tables.active_tabs.insert(*window_id, *tab_id) {
                    if let Some(tab) = tables.tabs.get_mut(&previous) {
                        tab.active = false;
                    }
                }
                let tab = tables.tabs.entry(*tab_id).or_insert_with(|| TabInfo {
                    id: *tab_id,
                    window_id: *window_id,
                    url: None,
                    active: true,
                });
                tab.window_id = *window_id;
                tab.active = true;
                tables.last_activated = Some(*window_id);
            }
            HostEvent::TabUpdated {
                tab_id,
                window_id,
                url,
                status,
            } => {
                let active = tables.active_tabs.get(window_id) == Some(tab_id);
                let tab = tables.tabs.entry(*tab_id).or_insert_with(|| TabInfo {
                    id: *tab_id,
                    window_id: *window_id,
                    url: None,
                    active,
                });
                tab.window_id = *window_id;
                // A page that is still loading has not replaced the one being looked at yet.
                if *status == LoadStatus::Complete {
                    tab.url = Some(url.clone());
                }
            }
            HostEvent::WindowFocusChanged { window_id } => {
                tables.focus = match window_id {
                    Some(window_id) => WindowFocus::Window(*window_id),
                    None => WindowFocus::Nothing,
                };
            }
            HostEvent::TabRemoved { tab_id, window_id } => {
                tables.tabs.remove(tab_id);
                if tables.active_tabs.get(window_id) == Some(tab_id) {
                    tables.active_tabs.remove(window_id);
                }
            }
            HostEvent::WindowRemoved { window_id } => {
                tables.tabs.retain(|_, tab| tab.window_id != *window_id);
                tables.active_tabs.remove(window_id);
                if tables.focus == WindowFocus::Window(*window_id) {
                    tables.focus = WindowFocus::Nothing;
                }
                if tables.last_activated == Some(*window_id) {
                    tables.last_activated = None;
                }
            }
            HostEvent::Suspend => {}
        }
        Ok(())
    }
}

#[async_trait]
impl HostApi for TabTable {
    async fn tab(&self, tab_id: TabId) -> Result<TabInfo> {
        self.tables()?
            .tabs
            .get(&tab_id)
            .cloned()
            .ok_or_else(|| anyhow!("No {tab_id} is known"))
    }

    async fn active_tab(&self, window_id: WindowId) -> Result<Option<TabInfo>> {
        let tables = self.tables()?;
        Ok(tables
            .active_tabs
            .get(&window_id)
            .and_then(|tab_id| tables.tabs.get(tab_id))
            .cloned())
    }

    async fn window_has_focus(&self, window_id: WindowId) -> Result<bool> {
        Ok(match self.tables()?.focus {
            WindowFocus::Unknown => true,
            WindowFocus::Nothing => false,
            WindowFocus::Window(focused) => focused == window_id,
        })
    }

    async fn focused_window(&self) -> Result<Option<WindowId>> {
        let tables = self.tables()?;
        Ok(match tables.focus {
            WindowFocus::Unknown => tables.last_activated,
            WindowFocus::Nothing => None,
            WindowFocus::Window(focused) => Some(focused),
        })
    }
}
