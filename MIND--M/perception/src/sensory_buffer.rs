//! Per-cycle Vision and Frustum buffers of one creature.
//!
//! Each buffer is an insertion-ordered map from thing name to the shared
//! thing, so the ordered sequence and the name index can never disagree.
//! Vision holds the unoccluded things, Frustum everything inside the cone.

use std::sync::Arc;

use anyhow::Result;
use indexmap::IndexMap;
use parking_lot::RwLock;
use serde_json::json;
use shared_logging::LogLevel;

use crate::retention::{retention_period, Evictable, RetentionHandle};
use crate::telemetry::PerceptionTelemetry;
use crate::thing::{SharedThing, Thing};

type ThingIndex = IndexMap<String, SharedThing>;

#[derive(Debug)]
struct BufferState {
    vision: ThingIndex,
    frustum: ThingIndex,
    still_valid: bool,
}

/// Vision and Frustum buffers guarded by a single lock.
#[derive(Debug)]
pub struct SensoryBuffer {
    state: RwLock<BufferState>,
    telemetry: Option<PerceptionTelemetry>,
}

impl Default for SensoryBuffer {
    fn default() -> Self {
        Self::new()
    }
}

fn index_of(things: &[SharedThing]) -> ThingIndex {
    let mut index = ThingIndex::with_capacity(things.len());
    for thing in things {
        let name = thing.read().name().to_string();
        index.insert(name, Arc::clone(thing));
    }
    index
}

fn copies(index: &ThingIndex) -> Vec<Thing> {
    index.values().map(|thing| thing.read().clone()).collect()
}

impl SensoryBuffer {
    /// Creates empty, valid buffers.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: RwLock::new(BufferState {
                vision: IndexMap::new(),
                frustum: IndexMap::new(),
                still_valid: true,
            }),
            telemetry: None,
        }
    }

    /// Attaches telemetry used when the retention timer evicts.
    #[must_use]
    pub fn with_telemetry(mut self, telemetry: PerceptionTelemetry) -> Self {
        self.telemetry = Some(telemetry);
        self
    }

    /// Arms a retention timer; `-1` (or any non-positive value) arms nothing.
    pub fn start_retention(self: &Arc<Self>, seconds: i64) -> Result<Option<RetentionHandle>> {
        retention_period(seconds)
            .map(|period| RetentionHandle::spawn(self, period))
            .transpose()
    }

    /// Empties the Vision buffer.
    pub fn reset_vision(&self) {
        self.state.write().vision.clear();
    }

    /// Empties the Frustum buffer.
    pub fn reset_frustum(&self) {
        self.state.write().frustum.clear();
    }

    /// Adds a thing to Vision; a thing with the same name is replaced in place.
    pub fn capture_in_vision(&self, thing: SharedThing) {
        let name = thing.read().name().to_string();
        self.state.write().vision.insert(name, thing);
    }

    /// Adds a thing to Frustum; a thing with the same name is replaced in place.
    pub fn capture_in_frustum(&self, thing: SharedThing) {
        let name = thing.read().name().to_string();
        self.state.write().frustum.insert(name, thing);
    }

    /// Replaces Vision with `things`. The buffer keeps its own handles.
    pub fn set_things_in_vision(&self, things: &[SharedThing]) {
        let index = index_of(things);
        self.state.write().vision = index;
    }

    /// Replaces Frustum with `things`.
    pub fn set_things_in_frustum(&self, things: &[SharedThing]) {
        let index = index_of(things);
        self.state.write().frustum = index;
    }

    /// Replaces both buffers under one lock acquisition.
    pub fn replace(&self, vision: &[SharedThing], frustum: &[SharedThing]) {
        let vision = index_of(vision);
        let frustum = index_of(frustum);
        let mut state = self.state.write();
        state.vision = vision;
        state.frustum = frustum;
    }

    /// Handles currently in Vision, in capture order.
    #[must_use]
    pub fn things_in_vision(&self) -> Vec<SharedThing> {
        self.state.read().vision.values().cloned().collect()
    }

    /// Handles currently in Frustum, in capture order.
    #[must_use]
    pub fn things_in_frustum(&self) -> Vec<SharedThing> {
        self.state.read().frustum.values().cloned().collect()
    }

    /// Name-keyed snapshot of Vision.
    #[must_use]
    pub fn vision_map(&self) -> IndexMap<String, SharedThing> {
        self.state.read().vision.clone()
    }

    /// Name-keyed snapshot of Frustum.
    #[must_use]
    pub fn frustum_map(&self) -> IndexMap<String, SharedThing> {
        self.state.read().frustum.clone()
    }

    /// Value copies of the things in Vision.
    #[must_use]
    pub fn vision_copies(&self) -> Vec<Thing> {
        copies(&self.state.read().vision)
    }

    /// Value copies of the things in Frustum.
    #[must_use]
    pub fn frustum_copies(&self) -> Vec<Thing> {
        copies(&self.state.read().frustum)
    }

    /// Looks a name up in Vision.
    #[must_use]
    pub fn vision_thing(&self, name: &str) -> Option<SharedThing> {
        self.state.read().vision.get(name).cloned()
    }

    /// Looks a name up in Frustum.
    #[must_use]
    pub fn frustum_thing(&self, name: &str) -> Option<SharedThing> {
        self.state.read().frustum.get(name).cloned()
    }

    /// Sizes of Vision and Frustum.
    #[must_use]
    pub fn len(&self) -> (usize, usize) {
        let state = self.state.read();
        (state.vision.len(), state.frustum.len())
    }

    /// True when both buffers are empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        let state = self.state.read();
        state.vision.is_empty() && state.frustum.is_empty()
    }

    /// False once a retention timer has evicted the contents. Advisory only.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.state.read().still_valid
    }
}

impl Evictable for SensoryBuffer {
    fn evict(&self) {
        let (vision, frustum) = {
            let mut state = self.state.write();
            let sizes = (state.vision.len(), state.frustum.len());
            state.vision.clear();
            state.frustum.clear();
            state.still_valid = false;
            sizes
        };
        if let Some(tel) = &self.telemetry {
            let _ = tel.log(
                LogLevel::Info,
                "perception.retention.evicted",
                json!({ "buffer": "sensory", "vision": vision, "frustum": frustum }),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Margins;
    use crate::geometry::Rect;
    use crate::thing::{ThingCategory, ThingReading};
    use shared_logging::MemorySink;
    use std::time::Duration;

    fn shared(name: &str) -> SharedThing {
        let reading = ThingReading::new(
            name,
            ThingCategory::Jewel,
            Rect::from_bounds(0.0, 0.0, 5.0, 5.0),
        );
        Thing::perceived(&reading, Margins::default()).into_shared()
    }

    #[test]
    fn reset_empties_sequence_and_map() {
        let buffer = SensoryBuffer::new();
        for name in ["a", "b", "c"] {
            buffer.capture_in_vision(shared(name));
        }
        buffer.capture_in_frustum(shared("a"));
        buffer.reset_vision();
        assert!(buffer.things_in_vision().is_empty());
        assert!(buffer.vision_map().is_empty());
        assert_eq!(buffer.len(), (0, 1));
        buffer.reset_frustum();
        assert!(buffer.is_empty());
    }

    #[test]
    fn capture_overwrites_same_name_in_place() {
        let buffer = SensoryBuffer::new();
        buffer.capture_in_frustum(shared("a"));
        buffer.capture_in_frustum(shared("b"));
        let replacement = shared("a");
        buffer.capture_in_frustum(Arc::clone(&replacement));
        let things = buffer.things_in_frustum();
        assert_eq!(things.len(), 2);
        assert!(Arc::ptr_eq(&things[0], &replacement));
        assert!(Arc::ptr_eq(&buffer.frustum_thing("a").unwrap(), &replacement));
    }

    #[test]
    fn set_things_is_a_full_replace() {
        let buffer = SensoryBuffer::new();
        buffer.capture_in_vision(shared("old"));
        let mut list = vec![shared("x"), shared("y")];
        buffer.set_things_in_vision(&list);
        list.clear();
        let names: Vec<_> = buffer.vision_map().keys().cloned().collect();
        assert_eq!(names, vec!["x", "y"]);
        assert_eq!(buffer.vision_copies()[1].name(), "y");
    }

    #[test]
    fn eviction_clears_and_invalidates() {
        let sink = Arc::new(MemorySink::new(4));
        let telemetry = PerceptionTelemetry::builder("perception")
            .sink(sink.clone())
            .build()
            .unwrap();
        let buffer = SensoryBuffer::new().with_telemetry(telemetry);
        buffer.replace(&[shared("a")], &[shared("a"), shared("b")]);
        assert!(buffer.is_valid());
        buffer.evict();
        assert!(buffer.is_empty());
        assert!(!buffer.is_valid());
        let logged = sink.find("perception.retention.evicted");
        assert_eq!(logged.len(), 1);
        assert_eq!(logged[0].metadata["frustum"], 2);
    }

    #[tokio::test(start_paused = true)]
    async fn retention_timer_evicts_after_period() {
        let buffer = Arc::new(SensoryBuffer::new());
        assert!(buffer.start_retention(-1).unwrap().is_none());
        let handle = buffer.start_retention(1).unwrap().unwrap();
        buffer.capture_in_vision(shared("a"));
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(buffer.len(), (1, 0));
        tokio::time::sleep(Duration::from_millis(600)).await;
        assert!(buffer.is_empty());
        assert!(!buffer.is_valid());
        handle.cancel();
    }
}
