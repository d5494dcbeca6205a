//! Visual working memory: what is in sight now plus what is remembered.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use anyhow::Result;
use parking_lot::RwLock;
use serde_json::json;
use shared_logging::LogLevel;

use crate::retention::{retention_period, Evictable, RetentionHandle};
use crate::telemetry::PerceptionTelemetry;
use crate::thing::SharedThing;

#[derive(Debug, Default)]
struct MemoryState {
    in_vision: Vec<SharedThing>,
    remembered: Vec<SharedThing>,
    validity: HashMap<String, bool>,
    new_things: Vec<SharedThing>,
    modified_things: Vec<SharedThing>,
    gone_things: Vec<SharedThing>,
    still_valid: bool,
}

fn name_of(thing: &SharedThing) -> String {
    thing.read().name().to_string()
}

impl MemoryState {
    fn merged(&self, only_valid: bool) -> Vec<SharedThing> {
        let visible: HashSet<String> = self.in_vision.iter().map(name_of).collect();
        let mut list = self.in_vision.clone();
        for thing in &self.remembered {
            let name = name_of(thing);
            if visible.contains(&name) {
                continue;
            }
            if only_valid && !self.validity.get(&name).copied().unwrap_or(false) {
                continue;
            }
            list.push(Arc::clone(thing));
        }
        list
    }
}

/// Working-memory buffer consulted by planners.
#[derive(Debug)]
pub struct WorkingMemory {
    state: RwLock<MemoryState>,
    telemetry: Option<PerceptionTelemetry>,
}

impl Default for WorkingMemory {
    fn default() -> Self {
        Self::new()
    }
}

impl WorkingMemory {
    /// Creates an empty memory.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: RwLock::new(MemoryState {
                still_valid: true,
                ..MemoryState::default()
            }),
            telemetry: None,
        }
    }

    /// Attaches telemetry used on eviction.
    #[must_use]
    pub fn with_telemetry(mut self, telemetry: PerceptionTelemetry) -> Self {
        self.telemetry = Some(telemetry);
        self
    }

    /// Arms a retention timer calling [`WorkingMemory::reset`]; `-1` arms nothing.
    pub fn start_retention(self: &Arc<Self>, seconds: i64) -> Result<Option<RetentionHandle>> {
        retention_period(seconds)
            .map(|period| RetentionHandle::spawn(self, period))
            .transpose()
    }

    /// Replaces the currently visible set.
    pub fn set_things_in_vision(&self, things: &[SharedThing]) {
        self.state.write().in_vision = things.to_vec();
    }

    /// Marks each thing valid and appends it to the remembered sequence.
    /// An entry of the same name already remembered is kept as well.
    pub fn set_remembered_things_now(&self, things: &[SharedThing]) {
        let mut state = self.state.write();
        for thing in things {
            state.validity.insert(name_of(thing), true);
            state.remembered.push(Arc::clone(thing));
        }
    }

    /// Drops every remembered entry whose name appears in `forgotten`.
    pub fn update_missing_things(&self, forgotten: &[SharedThing]) {
        let names: HashSet<String> = forgotten.iter().map(name_of).collect();
        self.state
            .write()
            .remembered
            .retain(|thing| !names.contains(thing.read().name()));
    }

    /// Flags a remembered name invalid without removing it.
    pub fn expired_in_remembered_things(&self, name: &str) {
        self.state.write().validity.insert(name.to_string(), false);
    }

    /// Removes the first remembered entry named `name`.
    pub fn remove_from_remembered(&self, name: &str) -> Option<SharedThing> {
        let mut state = self.state.write();
        let position = state
            .remembered
            .iter()
            .position(|thing| thing.read().name() == name)?;
        Some(state.remembered.remove(position))
    }

    /// Clears the visible and remembered sets.
    pub fn reset(&self) {
        let mut state = self.state.write();
        state.in_vision.clear();
        state.remembered.clear();
    }

    /// Visible things followed by remembered things whose name is not visible.
    #[must_use]
    pub fn thing_list(&self) -> Vec<SharedThing> {
        self.state.read().merged(false)
    }

    /// Like [`WorkingMemory::thing_list`], skipping remembered entries not flagged valid.
    #[must_use]
    pub fn valid_thing_list(&self) -> Vec<SharedThing> {
        self.state.read().merged(true)
    }

    /// Currently visible things.
    #[must_use]
    pub fn things_in_vision(&self) -> Vec<SharedThing> {
        self.state.read().in_vision.clone()
    }

    /// Remembered sequence, duplicates included.
    #[must_use]
    pub fn remembered_things(&self) -> Vec<SharedThing> {
        self.state.read().remembered.clone()
    }

    /// Validity flag of a remembered name.
    #[must_use]
    pub fn is_remembered_valid(&self, name: &str) -> Option<bool> {
        self.state.read().validity.get(name).copied()
    }

    /// Things first seen this cycle.
    #[must_use]
    pub fn new_things(&self) -> Vec<SharedThing> {
        self.state.read().new_things.clone()
    }

    /// Records a newly seen thing.
    pub fn add_new_thing(&self, thing: SharedThing) {
        self.state.write().new_things.push(thing);
    }

    /// Forgets the newly seen list.
    pub fn reset_new_things(&self) {
        self.state.write().new_things.clear();
    }

    /// Things changed this cycle.
    #[must_use]
    pub fn modified_things(&self) -> Vec<SharedThing> {
        self.state.read().modified_things.clone()
    }

    /// Records a changed thing.
    pub fn add_modified_thing(&self, thing: SharedThing) {
        self.state.write().modified_things.push(thing);
    }

    /// Forgets the changed list.
    pub fn clear_modified_things(&self) {
        self.state.write().modified_things.clear();
    }

    /// Replaces the list of things considered gone.
    pub fn set_gone_things(&self, things: &[SharedThing]) {
        self.state.write().gone_things = things.to_vec();
    }

    /// Things considered gone.
    #[must_use]
    pub fn gone_things(&self) -> Vec<SharedThing> {
        self.state.read().gone_things.clone()
    }

    /// False once a retention timer has evicted the contents.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.state.read().still_valid
    }
}

impl Evictable for WorkingMemory {
    fn evict(&self) {
        let remembered = {
            let mut state = self.state.write();
            let remembered = state.remembered.len();
            state.in_vision.clear();
            state.remembered.clear();
            state.still_valid = false;
            remembered
        };
        if let Some(tel) = &self.telemetry {
            let _ = tel.log(
                LogLevel::Info,
                "perception.retention.evicted",
                json!({ "buffer": "working_memory", "remembered": remembered }),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Margins;
    use crate::geometry::Rect;
    use crate::thing::{Thing, ThingCategory, ThingReading};

    fn shared(name: &str) -> SharedThing {
        let reading = ThingReading::new(
            name,
            ThingCategory::Brick,
            Rect::from_bounds(0.0, 0.0, 1.0, 1.0),
        );
        Thing::remembered(&reading, Margins::default()).into_shared()
    }

    fn names(things: &[SharedThing]) -> Vec<String> {
        things.iter().map(name_of).collect()
    }

    #[test]
    fn remembering_twice_appends_duplicates() {
        let memory = WorkingMemory::new();
        memory.set_remembered_things_now(&[shared("Wall_1")]);
        memory.set_remembered_things_now(&[shared("Wall_1")]);
        let remembered = memory.remembered_things();
        assert_eq!(remembered.len(), 2);
        assert!(!Arc::ptr_eq(&remembered[0], &remembered[1]));
        assert_eq!(memory.is_remembered_valid("Wall_1"), Some(true));
    }

    #[test]
    fn visible_names_win_in_merged_view() {
        let memory = WorkingMemory::new();
        let seen = shared("A");
        memory.set_things_in_vision(&[Arc::clone(&seen)]);
        memory.set_remembered_things_now(&[shared("A"), shared("B")]);
        let merged = memory.thing_list();
        assert_eq!(names(&merged), vec!["A", "B"]);
        assert!(Arc::ptr_eq(&merged[0], &seen));
    }

    #[test]
    fn valid_list_skips_expired_and_unknown_validity() {
        let memory = WorkingMemory::new();
        memory.set_remembered_things_now(&[shared("A"), shared("B")]);
        memory.expired_in_remembered_things("A");
        assert_eq!(names(&memory.valid_thing_list()), vec!["B"]);
        assert_eq!(names(&memory.thing_list()), vec!["A", "B"]);
        assert_eq!(memory.remembered_things().len(), 2);
    }

    #[test]
    fn forgetting_and_removal() {
        let memory = WorkingMemory::new();
        memory.set_remembered_things_now(&[shared("A"), shared("B"), shared("A"), shared("C")]);
        assert!(memory.remove_from_remembered("A").is_some());
        assert_eq!(names(&memory.remembered_things()), vec!["B", "A", "C"]);
        memory.update_missing_things(&[shared("A"), shared("C")]);
        assert_eq!(names(&memory.remembered_things()), vec!["B"]);
        assert!(memory.remove_from_remembered("Z").is_none());
    }

    #[test]
    fn side_lists_and_reset() {
        let memory = WorkingMemory::new();
        memory.add_new_thing(shared("N"));
        memory.add_modified_thing(shared("M"));
        memory.set_gone_things(&[shared("G")]);
        assert_eq!(memory.new_things().len(), 1);
        memory.reset_new_things();
        memory.clear_modified_things();
        assert!(memory.new_things().is_empty());
        assert!(memory.modified_things().is_empty());
        assert_eq!(names(&memory.gone_things()), vec!["G"]);

        memory.set_things_in_vision(&[shared("V")]);
        memory.set_remembered_things_now(&[shared("R")]);
        memory.reset();
        assert!(memory.thing_list().is_empty());
        assert!(memory.is_valid());
        memory.evict();
        assert!(!memory.is_valid());
    }
}
