//! Everything the tracker knows about the browser. Events arrive through the feed described by
//! [HostEvent]; lookups go through [HostApi], which [tab_table::TabTable] implements from that same
//! feed.

pub mod tab_table;

use std::{fmt::Display, sync::Arc};

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TabId(pub i64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WindowId(pub i64);

impl Display for TabId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "tab {}", self.0)
    }
}

impl Display for WindowId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "window {}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadStatus {
    Loading,
    Complete,
}

/// A notification from the browser's tab/window subsystem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum HostEvent {
    TabActivated {
        tab_id: TabId,
        window_id: WindowId,
    },
    TabUpdated {
        tab_id: TabId,
        window_id: WindowId,
        url: Arc<str>,
        status: LoadStatus,
    },
    /// `window_id == None` means no browser window has focus anymore.
    WindowFocusChanged {
        window_id: Option<WindowId>,
    },
    TabRemoved {
        tab_id: TabId,
        window_id: WindowId,
    },
    WindowRemoved {
        window_id: WindowId,
    },
    Suspend,
}

impl HostEvent {
    /// Events that tend to fire in storms for a single user action. Only these are debounced.
    pub fn is_burst_prone(&self) -> bool {
        matches!(
            self,
            HostEvent::TabActivated { .. }
                | HostEvent::TabUpdated { .. }
                | HostEvent::WindowFocusChanged { .. }
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TabInfo {
    pub id: TabId,
    pub window_id: WindowId,
    /// Unknown until the host reports the first navigation of the tab.
    pub url: Option<Arc<str>>,
    pub active: bool,
}

/// Queries against the host's current tab/window state. Any of these may fail, e.g. when the id
/// no longer exists.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait HostApi: Send + Sync {
    async fn tab(&self, tab_id: TabId) -> Result<TabInfo>;

    async fn active_tab(&self, window_id: WindowId) -> Result<Option<TabInfo>>;

    async fn window_has_focus(&self, window_id: WindowId) -> Result<bool>;

    /// The window that currently holds focus, `None` when no browser window does.
    async fn focused_window(&self) -> Result<Option<WindowId>>;
}

#[async_trait]
impl<T: HostApi + ?Sized> HostApi for Arc<T> {
    async fn tab(&self, tab_id: TabId) -> Result<TabInfo> {
        (**self).tab(tab_id).await
    }

    async fn active_tab(&self, window_id: WindowId) -> Result<Option<TabInfo>> {
        (**self).active_tab(window_id).await
    }

    async fn window_has_focus(&self, window_id: WindowId) -> Result<bool> {
        (**self).window_has_focus(window_id).await
    }

    async fn focused_window(&self) -> Result<Option<WindowId>> {
        (**self).focused_window().await
    }
}
