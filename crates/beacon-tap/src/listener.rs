//! Listener lifecycle: one beacon observer per frame, re-installed per step.

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use beaconcheck_core_types::{FrameId, PageId, RawRequest};
use cdp_adapter::{Cdp, FrameObserver, ObserverId, RequestObserver};
use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::buffer::HitSink;
use crate::classify::Classifier;
use crate::metrics;
use crate::normalize::normalize;

type InstalledFrames = Arc<Mutex<HashMap<FrameId, ObserverId>>>;

struct Attachment {
    frame_hook: ObserverId,
    installed: InstalledFrames,
}

/// Classifies, normalizes and forwards every request from one frame.
struct BeaconObserver {
    classifier: Arc<Classifier>,
    sink: Arc<dyn HitSink>,
}

impl RequestObserver for BeaconObserver {
    fn on_request(&self, request: &RawRequest) {
        let Some(platform) = self.classifier.classify(request) else {
            return;
        };
        let hits = normalize(request, platform);
        trace!(
            target: "beacon-tap",
            request_id = %request.request_id,
            platform = %platform,
            hits = hits.len(),
            "beacon captured"
        );
        if hits.is_empty() {
            return;
        }
        metrics::record_hits(platform, hits.len());
        for hit in hits {
            self.sink.accept(hit);
        }
    }
}

/// Installs the beacon observer on frames attached after `attach` returned.
struct FrameHook {
    cdp: Weak<dyn Cdp>,
    observer: Arc<BeaconObserver>,
    installed: InstalledFrames,
}

impl FrameObserver for FrameHook {
    fn on_frame_attached(&self, page: &PageId, frame: &FrameId) {
        let Some(cdp) = self.cdp.upgrade() else {
            return;
        };
        install(cdp.as_ref(), page, frame, &self.observer, &self.installed);
    }
}

fn install(
    cdp: &dyn Cdp,
    page: &PageId,
    frame: &FrameId,
    observer: &Arc<BeaconObserver>,
    installed: &InstalledFrames,
) {
    let mut guard = installed.lock();
    if guard.contains_key(frame) {
        return;
    }
    let id = cdp.add_request_observer(page, frame, observer.clone() as Arc<dyn RequestObserver>);
    guard.insert(frame.clone(), id);
    debug!(target: "beacon-tap", page = %page, frame = %frame, "beacon observer installed");
}

/// Owns the beacon observers of every page it has been asked to watch.
pub struct ListenerManager {
    cdp: Arc<dyn Cdp>,
    classifier: Arc<Classifier>,
    attachments: Mutex<HashMap<PageId, Attachment>>,
}

impl ListenerManager {
    pub fn new(cdp: Arc<dyn Cdp>, classifier: Arc<Classifier>) -> Self {
        Self {
            cdp,
            classifier,
            attachments: Mutex::new(HashMap::new()),
        }
    }

    pub fn classifier(&self) -> &Arc<Classifier> {
        &self.classifier
    }

    /// Routes every request on `page` and its frames, present and future,
    /// into `sink`. Observers from a previous call are removed first.
    pub fn attach(&self, page: &PageId, sink: Arc<dyn HitSink>) {
        let mut attachments = self.attachments.lock();
        if let Some(previous) = attachments.remove(page) {
            self.release(page, previous);
        }

        let observer = Arc::new(BeaconObserver {
            classifier: self.classifier.clone(),
            sink,
        });
        let installed: InstalledFrames = Arc::new(Mutex::new(HashMap::new()));

        // Hook first so a frame attached while we walk the current list is not missed.
        let hook = Arc::new(FrameHook {
            cdp: Arc::downgrade(&self.cdp),
            observer: observer.clone(),
            installed: installed.clone(),
        });
        let frame_hook = self.cdp.add_frame_observer(page, hook);

        let frames = self.cdp.frames(page);
        for frame in &frames {
            install(self.cdp.as_ref(), page, frame, &observer, &installed);
        }
        debug!(target: "beacon-tap", page = %page, frames = frames.len(), "listeners attached");

        attachments.insert(
            page.clone(),
            Attachment {
                frame_hook,
                installed,
            },
        );
    }

    /// Drops the page's observers. Used at page teardown.
    pub fn release_page(&self, page: &PageId) {
        if let Some(previous) = self.attachments.lock().remove(page) {
            self.release(page, previous);
        }
    }

    /// Frames currently carrying a beacon observer for `page`.
    pub fn active_frames(&self, page: &PageId) -> Vec<FrameId> {
        let attachments = self.attachments.lock();
        let Some(attachment) = attachments.get(page) else {
            return Vec::new();
        };
        let mut frames: Vec<FrameId> = attachment.installed.lock().keys().cloned().collect();
        frames.sort();
        frames
    }

    fn release(&self, page: &PageId, attachment: Attachment) {
        self.cdp.remove_frame_observer(page, attachment.frame_hook);
        let mut installed = attachment.installed.lock();
        for (_, id) in installed.drain() {
            self.cdp.remove_request_observer(page, id);
        }
    }
}
