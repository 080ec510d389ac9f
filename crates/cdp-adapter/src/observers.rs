//! Frame-scoped request observers and frame-attach observers.
//!
//! Callbacks run synchronously on the adapter's event loop. Dispatch clones
//! the observer handles out of the map before invoking them, so a callback
//! may register or remove observers (a frame observer typically installs a
//! request observer on the frame it was told about).

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use beaconcheck_core_types::{FrameId, PageId, RawRequest};
use dashmap::DashMap;

pub trait RequestObserver: Send + Sync {
    fn on_request(&self, request: &RawRequest);
}

pub trait FrameObserver: Send + Sync {
    fn on_frame_attached(&self, page: &PageId, frame: &FrameId);
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct ObserverId(u64);

impl ObserverId {
    fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

#[derive(Default)]
pub struct ObserverRegistry {
    requests: DashMap<(PageId, FrameId), Vec<(ObserverId, Arc<dyn RequestObserver>)>>,
    frames: DashMap<PageId, Vec<(ObserverId, Arc<dyn FrameObserver>)>>,
}

impl ObserverRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_request(
        &self,
        page: &PageId,
        frame: &FrameId,
        observer: Arc<dyn RequestObserver>,
    ) -> ObserverId {
        let id = ObserverId::next();
        self.requests
            .entry((page.clone(), frame.clone()))
            .or_default()
            .push((id, observer));
        id
    }

    pub fn remove_request(&self, page: &PageId, id: ObserverId) -> bool {
        let mut removed = false;
        for mut entry in self.requests.iter_mut() {
            if &entry.key().0 != page {
                continue;
            }
            let before = entry.value().len();
            entry.value_mut().retain(|(existing, _)| *existing != id);
            removed |= entry.value().len() != before;
        }
        removed
    }

    pub fn add_frame(&self, page: &PageId, observer: Arc<dyn FrameObserver>) -> ObserverId {
        let id = ObserverId::next();
        self.frames
            .entry(page.clone())
            .or_default()
            .push((id, observer));
        id
    }

    pub fn remove_frame(&self, page: &PageId, id: ObserverId) -> bool {
        match self.frames.get_mut(page) {
            Some(mut entry) => {
                let before = entry.len();
                entry.retain(|(existing, _)| *existing != id);
                entry.len() != before
            }
            None => false,
        }
    }

    pub fn request_observer_count(&self, page: &PageId, frame: &FrameId) -> usize {
        self.requests
            .get(&(page.clone(), frame.clone()))
            .map(|entry| entry.len())
            .unwrap_or(0)
    }

    /// Returns the number of observers that saw the request.
    pub fn dispatch_request(&self, page: &PageId, frame: &FrameId, request: &RawRequest) -> usize {
        let observers: Vec<Arc<dyn RequestObserver>> = self
            .requests
            .get(&(page.clone(), frame.clone()))
            .map(|entry| entry.iter().map(|(_, obs)| Arc::clone(obs)).collect())
            .unwrap_or_default();
        for observer in &observers {
            observer.on_request(request);
        }
        observers.len()
    }

    pub fn dispatch_frame_attached(&self, page: &PageId, frame: &FrameId) {
        let observers: Vec<Arc<dyn FrameObserver>> = self
            .frames
            .get(page)
            .map(|entry| entry.iter().map(|(_, obs)| Arc::clone(obs)).collect())
            .unwrap_or_default();
        for observer in observers {
            observer.on_frame_attached(page, frame);
        }
    }

    pub fn drop_frame(&self, page: &PageId, frame: &FrameId) {
        self.requests.remove(&(page.clone(), frame.clone()));
    }

    /// Moves request observers when the browser swaps the main frame id.
    pub fn rekey_frame(&self, page: &PageId, from: &FrameId, to: &FrameId) {
        if let Some((_, observers)) = self.requests.remove(&(page.clone(), from.clone())) {
            self.requests
                .entry((page.clone(), to.clone()))
                .or_default()
                .extend(observers);
        }
    }

    pub fn drop_page(&self, page: &PageId) {
        self.requests.retain(|(owner, _), _| owner != page);
        self.frames.remove(page);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct Collect(Mutex<Vec<String>>);

    impl RequestObserver for Collect {
        fn on_request(&self, request: &RawRequest) {
            self.0.lock().push(request.url.clone());
        }
    }

    struct Chain {
        registry: Arc<ObserverRegistry>,
        sink: Arc<Collect>,
    }

    impl FrameObserver for Chain {
        fn on_frame_attached(&self, page: &PageId, frame: &FrameId) {
            self.registry
                .add_request(page, frame, self.sink.clone() as Arc<dyn RequestObserver>);
        }
    }

    #[test]
    fn frame_callback_can_register_request_observers() {
        let registry = Arc::new(ObserverRegistry::new());
        let sink = Arc::new(Collect::default());
        let page = PageId::new();
        let child = FrameId::from("child");
        registry.add_frame(
            &page,
            Arc::new(Chain {
                registry: registry.clone(),
                sink: sink.clone(),
            }),
        );

        registry.dispatch_frame_attached(&page, &child);
        let seen = registry.dispatch_request(&page, &child, &RawRequest::get("https://x.test/a"));

        assert_eq!(seen, 1);
        assert_eq!(sink.0.lock().as_slice(), ["https://x.test/a"]);
    }

    #[test]
    fn removal_is_scoped_to_the_page() {
        let registry = ObserverRegistry::new();
        let sink = Arc::new(Collect::default());
        let page_a = PageId::new();
        let page_b = PageId::new();
        let frame = FrameId::from("main");
        let id = registry.add_request(&page_a, &frame, sink.clone());
        registry.add_request(&page_b, &frame, sink.clone());

        assert!(!registry.remove_request(&page_b, id));
        assert!(registry.remove_request(&page_a, id));
        assert_eq!(registry.request_observer_count(&page_a, &frame), 0);
        assert_eq!(registry.request_observer_count(&page_b, &frame), 1);
    }
}
