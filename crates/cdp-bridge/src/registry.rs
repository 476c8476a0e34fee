//! Registry of pages the bridge is attached to.

use dashmap::DashMap;

use crate::ids::PageId;

#[derive(Clone, Debug)]
pub struct PageContext {
    pub target_id: String,
    pub cdp_session: String,
    pub recent_url: Option<String>,
}

/// Concurrent map from bridge page ids to CDP target/session identity.
#[derive(Default)]
pub struct Registry {
    pages: DashMap<PageId, PageContext>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_page(&self, page: PageId, target_id: String, cdp_session: String) {
        self.pages.insert(
            page,
            PageContext {
                target_id,
                cdp_session,
                recent_url: None,
            },
        );
    }

    pub fn remove_page(&self, page: &PageId) {
        self.pages.remove(page);
    }

    pub fn remove_by_target(&self, target_id: &str) -> Option<PageId> {
        let page = self.page_for_target(target_id)?;
        self.pages.remove(&page);
        Some(page)
    }

    pub fn get(&self, page: &PageId) -> Option<PageContext> {
        self.pages.get(page).map(|entry| entry.value().clone())
    }

    pub fn session_for(&self, page: &PageId) -> Option<String> {
        self.pages.get(page).map(|entry| entry.cdp_session.clone())
    }

    pub fn page_for_target(&self, target_id: &str) -> Option<PageId> {
        self.pages
            .iter()
            .find(|kv| kv.value().target_id == target_id)
            .map(|kv| *kv.key())
    }

    pub fn page_for_session(&self, session_id: &str) -> Option<PageId> {
        self.pages
            .iter()
            .find(|kv| kv.value().cdp_session == session_id)
            .map(|kv| *kv.key())
    }

    pub fn set_recent_url(&self, page: &PageId, url: String) {
        if let Some(mut entry) = self.pages.get_mut(page) {
            entry.recent_url = Some(url);
        }
    }

    pub fn iter(&self) -> Vec<(PageId, PageContext)> {
        self.pages
            .iter()
            .map(|kv| (*kv.key(), kv.value().clone()))
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }
}
