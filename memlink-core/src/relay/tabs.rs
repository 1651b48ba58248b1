//! Tab enumeration for the relay
//!
//! [`TabHost`] is what the privileged context can see: which tabs exist and
//! how to reach the content service inside each one. [`TabRegistry`] is the
//! in-process implementation used by the CLI and tests.

use std::sync::Mutex;

use super::channel::Channel;
use super::message::{TabId, TabRequest, TabResponse};

/// Channel to a tab's content service
pub type TabChannel = Channel<TabRequest, TabResponse>;

/// What the host knows about a tab
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TabInfo {
    /// Some hosts report tabs without an id (e.g. devtools windows)
    pub id: Option<TabId>,
    pub url: Option<String>,
    pub active: bool,
}

/// Tab enumeration and addressing.
///
/// Implementations answer from live state on every call; callers must not
/// cache results across requests.
pub trait TabHost: Send + Sync {
    /// Active tabs of the current window, most relevant first.
    fn active_tabs(&self) -> Vec<TabInfo>;

    /// Channel to the content service of `tab`, if one is listening.
    fn content_channel(&self, tab: TabId) -> Option<TabChannel>;
}

struct TabEntry {
    info: TabInfo,
    content: Option<TabChannel>,
}

/// In-process tab host
#[derive(Default)]
pub struct TabRegistry {
    tabs: Mutex<Vec<TabEntry>>,
    next_id: Mutex<u32>,
}

impl TabRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a tab and make it the only active one.
    ///
    /// `content` is `None` for pages without a content service.
    pub fn open_tab(&self, url: impl Into<String>, content: Option<TabChannel>) -> TabId {
        let id = {
            let mut next = self.next_id.lock().unwrap_or_else(|p| p.into_inner());
            *next += 1;
            TabId(*next)
        };
        self.insert(
            TabInfo {
                id: Some(id),
                url: Some(url.into()),
                active: true,
            },
            content,
        );
        id
    }

    /// Insert a tab as reported by a host, without assigning an id.
    pub fn insert(&self, info: TabInfo, content: Option<TabChannel>) {
        let mut tabs = self.tabs.lock().unwrap_or_else(|p| p.into_inner());
        if info.active {
            for entry in tabs.iter_mut() {
                entry.info.active = false;
            }
        }
        tabs.push(TabEntry { info, content });
    }

    /// Make `tab` the only active tab. Returns false if it does not exist.
    pub fn activate(&self, tab: TabId) -> bool {
        let mut tabs = self.tabs.lock().unwrap_or_else(|p| p.into_inner());
        if !tabs.iter().any(|e| e.info.id == Some(tab)) {
            return false;
        }
        for entry in tabs.iter_mut() {
            entry.info.active = entry.info.id == Some(tab);
        }
        true
    }

    /// Close `tab`. Returns false if it does not exist.
    pub fn close(&self, tab: TabId) -> bool {
        let mut tabs = self.tabs.lock().unwrap_or_else(|p| p.into_inner());
        let before = tabs.len();
        tabs.retain(|e| e.info.id != Some(tab));
        tabs.len() != before
    }
}

impl TabHost for TabRegistry {
    fn active_tabs(&self) -> Vec<TabInfo> {
        self.tabs
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .iter()
            .filter(|e| e.info.active)
            .map(|e| e.info.clone())
            .collect()
    }

    fn content_channel(&self, tab: TabId) -> Option<TabChannel> {
        self.tabs
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .iter()
            .find(|e| e.info.id == Some(tab))
            .and_then(|e| e.content.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_tab_becomes_only_active_tab() {
        let registry = TabRegistry::new();
        let first = registry.open_tab("https://chat.example/a", None);
        let second = registry.open_tab("https://chat.example/b", None);
        assert_ne!(first, second);

        let active = registry.active_tabs();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, Some(second));

        assert!(registry.activate(first));
        assert_eq!(registry.active_tabs()[0].id, Some(first));
        assert!(!registry.activate(TabId(99)));
    }

    #[test]
    fn test_close_tab() {
        let registry = TabRegistry::new();
        let tab = registry.open_tab("https://chat.example", None);
        assert!(registry.close(tab));
        assert!(!registry.close(tab));
        assert!(registry.active_tabs().is_empty());
    }

    #[test]
    fn test_tab_without_content_service_has_no_channel() {
        let registry = TabRegistry::new();
        let tab = registry.open_tab("https://news.example", None);
        assert!(registry.content_channel(tab).is_none());
        assert!(registry.content_channel(TabId(42)).is_none());
    }
}
