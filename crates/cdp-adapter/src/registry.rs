//! Adapter registry keeping track of attached pages and their frames.

use dashmap::DashMap;

use crate::ids::{FrameId, PageId};

#[derive(Clone, Debug)]
pub struct TargetContext {
    pub target_id: String,
    pub cdp_session: String,
    pub recent_url: Option<String>,
    pub main_frame: Option<FrameId>,
    pub frames: Vec<FrameId>,
}

/// Concurrent registry for pages, sessions and frame trees.
#[derive(Default)]
pub struct Registry {
    pages: DashMap<PageId, TargetContext>,
    sessions: DashMap<String, PageId>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_page(&self, page: PageId, target_id: String, cdp_session: String) {
        self.sessions.insert(cdp_session.clone(), page.clone());
        self.pages.insert(
            page,
            TargetContext {
                target_id,
                cdp_session,
                recent_url: None,
                main_frame: None,
                frames: Vec::new(),
            },
        );
    }

    pub fn remove_page(&self, page: &PageId) -> Option<TargetContext> {
        let (_, ctx) = self.pages.remove(page)?;
        self.sessions.remove(&ctx.cdp_session);
        Some(ctx)
    }

    pub fn get(&self, page: &PageId) -> Option<TargetContext> {
        self.pages.get(page).map(|entry| entry.value().clone())
    }

    pub fn pages(&self) -> Vec<PageId> {
        self.pages.iter().map(|kv| kv.key().clone()).collect()
    }

    pub fn page_for_session(&self, session: &str) -> Option<PageId> {
        self.sessions.get(session).map(|entry| entry.value().clone())
    }

    pub fn cdp_session(&self, page: &PageId) -> Option<String> {
        self.pages.get(page).map(|entry| entry.cdp_session.clone())
    }

    pub fn set_recent_url(&self, page: &PageId, url: String) {
        if let Some(mut entry) = self.pages.get_mut(page) {
            entry.recent_url = Some(url);
        }
    }

    /// Records the main frame; returns the previous id when it changed.
    pub fn set_main_frame(&self, page: &PageId, frame: FrameId) -> Option<FrameId> {
        let mut entry = self.pages.get_mut(page)?;
        if !entry.frames.contains(&frame) {
            entry.frames.push(frame.clone());
        }
        let previous = entry.main_frame.replace(frame.clone());
        match previous {
            Some(old) if old != frame => {
                entry.frames.retain(|f| f != &old);
                Some(old)
            }
            _ => None,
        }
    }

    pub fn main_frame(&self, page: &PageId) -> Option<FrameId> {
        self.pages
            .get(page)
            .and_then(|entry| entry.main_frame.clone())
    }

    /// Returns `true` when the frame was not known before.
    pub fn add_frame(&self, page: &PageId, frame: FrameId) -> bool {
        match self.pages.get_mut(page) {
            Some(mut entry) if !entry.frames.contains(&frame) => {
                entry.frames.push(frame);
                true
            }
            _ => false,
        }
    }

    pub fn remove_frame(&self, page: &PageId, frame: &FrameId) -> bool {
        match self.pages.get_mut(page) {
            Some(mut entry) => {
                let before = entry.frames.len();
                entry.frames.retain(|f| f != frame);
                entry.frames.len() != before
            }
            None => false,
        }
    }

    pub fn has_frame(&self, page: &PageId, frame: &FrameId) -> bool {
        self.pages
            .get(page)
            .map(|entry| entry.frames.contains(frame))
            .unwrap_or(false)
    }

    pub fn frames(&self, page: &PageId) -> Vec<FrameId> {
        self.pages
            .get(page)
            .map(|entry| entry.frames.clone())
            .unwrap_or_default()
    }
}
