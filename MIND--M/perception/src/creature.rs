//! Creature state cache: one [`Creature`] per name, merged from snapshots.

use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use shared_logging::LogLevel;
use tokio::sync::broadcast;
use tracing::warn;

use crate::config::{Environment, FovConfig, Margins, MindConfig};
use crate::geometry::{
    field_of_view_triangle, gaze_ray, half_angle_fov_x, hit_points, xy_to_polar, Point, Polar,
    Pose, Rect, Segment,
};
use crate::leaflet::Leaflet;
use crate::retention::RetentionHandle;
use crate::sensory_buffer::SensoryBuffer;
use crate::snapshot::{
    parse_creature_state, ActedUpon, CreatureSnapshot, SnapshotError, SnapshotReport,
};
use crate::telemetry::PerceptionTelemetry;
use crate::thing::{SharedThing, Thing};

/// Authoritative self state of one creature.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreatureState {
    name: String,
    index: String,
    color: String,
    position: Point,
    size: f64,
    pitch: f64,
    motor_system: i64,
    wheel: f64,
    speed: f64,
    fuel: f64,
    serotonin: f64,
    endorphine: f64,
    score: f64,
    x1: f64,
    y1: f64,
    x2: f64,
    y2: f64,
    has_collided: bool,
    has_leaflet: bool,
    leaflets: IndexMap<i64, Leaflet>,
    acted_upon: Option<Value>,
}

impl CreatureState {
    /// Blank state for a creature seen for the first time.
    #[must_use]
    pub fn new(name: impl Into<String>, default_speed: f64) -> Self {
        Self {
            name: name.into(),
            index: String::new(),
            color: String::new(),
            position: Point::default(),
            size: 0.0,
            pitch: 0.0,
            motor_system: 0,
            wheel: 0.0,
            speed: default_speed,
            fuel: 0.0,
            serotonin: 0.0,
            endorphine: 0.0,
            score: 0.0,
            x1: 0.0,
            y1: 0.0,
            x2: 0.0,
            y2: 0.0,
            has_collided: false,
            has_leaflet: false,
            leaflets: IndexMap::new(),
            acted_upon: None,
        }
    }

    /// Overwrites every field the snapshot carries; absent fields keep their
    /// value. A reported speed of exactly zero becomes `default_speed`.
    /// Leaflets are rebuilt from the snapshot when the presence flag is set
    /// and cleared when it is unset.
    pub fn apply(&mut self, snapshot: &CreatureSnapshot, default_speed: f64) {
        fn set<T: Clone>(slot: &mut T, value: Option<&T>) {
            if let Some(value) = value {
                slot.clone_from(value);
            }
        }

        set(&mut self.index, snapshot.index.as_ref());
        set(&mut self.color, snapshot.color.as_ref());
        set(&mut self.position.x, snapshot.com_x.as_ref());
        set(&mut self.position.y, snapshot.com_y.as_ref());
        set(&mut self.size, snapshot.size.as_ref());
        set(&mut self.pitch, snapshot.pitch.as_ref());
        set(&mut self.motor_system, snapshot.motor_system.as_ref());
        set(&mut self.wheel, snapshot.wheel.as_ref());
        if let Some(speed) = snapshot.speed {
            self.speed = if speed == 0.0 { default_speed } else { speed };
        }
        set(&mut self.fuel, snapshot.fuel.as_ref());
        set(&mut self.serotonin, snapshot.serotonin.as_ref());
        set(&mut self.endorphine, snapshot.endorphine.as_ref());
        set(&mut self.score, snapshot.score.as_ref());
        set(&mut self.x1, snapshot.x1.as_ref());
        set(&mut self.y1, snapshot.y1.as_ref());
        set(&mut self.x2, snapshot.x2.as_ref());
        set(&mut self.y2, snapshot.y2.as_ref());
        set(&mut self.has_collided, snapshot.has_collided.as_ref());
        match &snapshot.acted_upon {
            Some(ActedUpon::Nothing) => self.acted_upon = None,
            Some(ActedUpon::Thing(value)) => self.acted_upon = Some(value.clone()),
            None => {}
        }
        if let Some(has_leaflet) = snapshot.has_leaflet {
            self.has_leaflet = has_leaflet;
            self.leaflets.clear();
            if has_leaflet {
                for leaflet in &snapshot.leaflets {
                    self.leaflets.insert(leaflet.id, leaflet.clone());
                }
            }
        }
    }

    /// Creature name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Server-side index.
    #[must_use]
    pub fn index(&self) -> &str {
        &self.index
    }

    /// Body color.
    #[must_use]
    pub fn color(&self) -> &str {
        &self.color
    }

    /// Center of mass.
    #[must_use]
    pub const fn position(&self) -> Point {
        self.position
    }

    /// Body size.
    #[must_use]
    pub const fn size(&self) -> f64 {
        self.size
    }

    /// Heading in radians.
    #[must_use]
    pub const fn pitch(&self) -> f64 {
        self.pitch
    }

    /// Position and heading.
    #[must_use]
    pub const fn pose(&self) -> Pose {
        Pose::new(self.position, self.pitch)
    }

    /// Motor system kind.
    #[must_use]
    pub const fn motor_system(&self) -> i64 {
        self.motor_system
    }

    /// Wheel steering.
    #[must_use]
    pub const fn wheel(&self) -> f64 {
        self.wheel
    }

    /// Speed.
    #[must_use]
    pub const fn speed(&self) -> f64 {
        self.speed
    }

    /// Fuel.
    #[must_use]
    pub const fn fuel(&self) -> f64 {
        self.fuel
    }

    /// First mood scalar.
    #[must_use]
    pub const fn serotonin(&self) -> f64 {
        self.serotonin
    }

    /// Second mood scalar.
    #[must_use]
    pub const fn endorphine(&self) -> f64 {
        self.endorphine
    }

    /// Score.
    #[must_use]
    pub const fn score(&self) -> f64 {
        self.score
    }

    /// Body bounds.
    #[must_use]
    pub fn bounds(&self) -> Rect {
        Rect::from_bounds(self.x1, self.y1, self.x2, self.y2)
    }

    /// Collision flag.
    #[must_use]
    pub const fn has_collided(&self) -> bool {
        self.has_collided
    }

    /// Leaflet-presence flag.
    #[must_use]
    pub const fn has_leaflet(&self) -> bool {
        self.has_leaflet
    }

    /// Leaflets keyed by id.
    #[must_use]
    pub const fn leaflets(&self) -> &IndexMap<i64, Leaflet> {
        &self.leaflets
    }

    /// Last contact-action payload, `None` when no action happened.
    #[must_use]
    pub const fn thing_acted_upon(&self) -> Option<&Value> {
        self.acted_upon.as_ref()
    }

    /// Gaze ray of length `range` along the pitch.
    #[must_use]
    pub fn direct_ray(&self, range: f64) -> Segment {
        gaze_ray(&self.pose(), range)
    }

    /// Perceptual cone: apex at the center of mass, far corners at
    /// `pitch ± half_angle`.
    #[must_use]
    pub fn field_of_view(&self, fov: &FovConfig, environment: &Environment) -> [Point; 3] {
        let half_angle =
            half_angle_fov_x(environment.aspect_ratio(), fov.vertical, fov.far_distance);
        field_of_view_triangle(self.position, self.pitch, fov.far_distance, half_angle)
    }

    /// Intersections of `ray` with the thing's edges.
    #[must_use]
    pub fn hit_points(&self, thing: &Thing, ray: &Segment) -> Vec<Point> {
        hit_points(&thing.area_sides(), ray)
    }

    /// Distance to the closest gaze-ray hit on the thing, or to its closest
    /// vertex when the ray misses.
    #[must_use]
    pub fn distance_to(&self, thing: &Thing, ray_range: f64) -> f64 {
        let ray = self.direct_ray(ray_range);
        let hits = self.hit_points(thing, &ray);
        let candidates = if hits.is_empty() {
            thing.vertices().to_vec()
        } else {
            hits
        };
        candidates
            .into_iter()
            .map(|point| self.position.distance_to(point))
            .fold(f64::INFINITY, f64::min)
    }

    /// Absolute angle from this creature's center to the thing's center.
    #[must_use]
    pub fn angle_towards(&self, thing: &Thing) -> f64 {
        let target = thing.center();
        (target.y - self.position.y).atan2(target.x - self.position.x)
    }

    /// Distance and bearing of `point`.
    #[must_use]
    pub fn polar_of(&self, point: Point) -> Polar {
        xy_to_polar(&self.pose(), point)
    }

    /// True when `point` is exactly the center of mass.
    #[must_use]
    pub fn is_at(&self, point: Point) -> bool {
        self.polar_of(point).distance == 0.0
    }
}

/// Fired once per completed merge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateNotification {
    /// Creature name.
    pub creature: String,
    /// Merge counter of that creature, starting at 1.
    pub sequence: u64,
    /// Names in Vision after the merge.
    pub vision: Vec<String>,
    /// Names in Frustum after the merge.
    pub frustum: Vec<String>,
}

/// One creature: self state plus perceptual buffers.
#[derive(Debug)]
pub struct Creature {
    name: String,
    margins: Margins,
    state: RwLock<CreatureState>,
    buffer: Arc<SensoryBuffer>,
    merges: Mutex<u64>,
    retention: Mutex<Option<RetentionHandle>>,
}

impl Creature {
    fn new(name: &str, config: &MindConfig, telemetry: Option<&PerceptionTelemetry>) -> Self {
        let buffer = match telemetry {
            Some(tel) => SensoryBuffer::new().with_telemetry(tel.clone()),
            None => SensoryBuffer::new(),
        };
        let buffer = Arc::new(buffer);
        let retention = match buffer.start_retention(config.retention_seconds) {
            Ok(handle) => handle,
            Err(err) => {
                warn!(creature = name, error = %err, "retention timer not armed");
                None
            }
        };
        Self {
            name: name.to_string(),
            margins: config.margins,
            state: RwLock::new(CreatureState::new(name, config.default_creature_speed)),
            buffer,
            merges: Mutex::new(0),
            retention: Mutex::new(retention),
        }
    }

    /// Creature name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Copy of the current self state.
    #[must_use]
    pub fn state(&self) -> CreatureState {
        self.state.read().clone()
    }

    /// Runs `f` against the current self state without copying it.
    pub fn with_state<R>(&self, f: impl FnOnce(&CreatureState) -> R) -> R {
        f(&self.state.read())
    }

    /// Vision and Frustum buffers.
    #[must_use]
    pub const fn buffer(&self) -> &Arc<SensoryBuffer> {
        &self.buffer
    }

    /// Things currently in Vision.
    #[must_use]
    pub fn things_in_vision(&self) -> Vec<SharedThing> {
        self.buffer.things_in_vision()
    }

    /// Things currently in Frustum.
    #[must_use]
    pub fn things_in_frustum(&self) -> Vec<SharedThing> {
        self.buffer.things_in_frustum()
    }

    /// Number of merges applied so far.
    #[must_use]
    pub fn merge_count(&self) -> u64 {
        *self.merges.lock()
    }

    /// True while a retention timer is armed for the buffers.
    #[must_use]
    pub fn retention_active(&self) -> bool {
        self.retention
            .lock()
            .as_ref()
            .is_some_and(RetentionHandle::is_active)
    }

    /// Stops the retention timer, if any.
    pub fn stop_retention(&self) {
        if let Some(handle) = self.retention.lock().take() {
            handle.cancel();
        }
    }

    /// Applies a snapshot and notifies exactly once, after every mutation.
    ///
    /// Things are looked up by name in Frustum, then Vision. Existing things
    /// are updated in place so both buffers keep sharing one handle; unknown
    /// names get a new thing. Unoccluded things land in Vision and Frustum,
    /// occluded ones in Frustum only.
    fn merge(
        &self,
        snapshot: &CreatureSnapshot,
        default_speed: f64,
        notifier: &broadcast::Sender<StateNotification>,
    ) -> StateNotification {
        let mut merges = self.merges.lock();
        self.state.write().apply(snapshot, default_speed);

        let mut vision: IndexMap<String, SharedThing> = IndexMap::new();
        let mut frustum: IndexMap<String, SharedThing> = IndexMap::new();
        for reading in &snapshot.things {
            let known = frustum
                .get(&reading.name)
                .cloned()
                .or_else(|| self.buffer.frustum_thing(&reading.name))
                .or_else(|| self.buffer.vision_thing(&reading.name));
            let thing = match known {
                Some(thing) => {
                    thing.write().update(reading);
                    thing
                }
                None => Thing::perceived(reading, self.margins).into_shared(),
            };
            if reading.occluded {
                vision.shift_remove(&reading.name);
            } else {
                vision.insert(reading.name.clone(), Arc::clone(&thing));
            }
            frustum.insert(reading.name.clone(), thing);
        }
        let vision: Vec<SharedThing> = vision.into_values().collect();
        let frustum: Vec<SharedThing> = frustum.into_values().collect();
        self.buffer.replace(&vision, &frustum);

        *merges += 1;
        let notification = StateNotification {
            creature: self.name.clone(),
            sequence: *merges,
            vision: vision.iter().map(|t| t.read().name().to_string()).collect(),
            frustum: frustum.iter().map(|t| t.read().name().to_string()).collect(),
        };
        // No subscriber is fine.
        let _ = notifier.send(notification.clone());
        notification
    }
}

impl Drop for Creature {
    fn drop(&mut self) {
        self.stop_retention();
    }
}

/// Registry owning every creature of a session.
#[derive(Debug)]
pub struct CreatureRegistry {
    config: MindConfig,
    creatures: Mutex<IndexMap<String, Arc<Creature>>>,
    notifier: broadcast::Sender<StateNotification>,
    telemetry: Option<PerceptionTelemetry>,
}

impl CreatureRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new(config: MindConfig) -> Self {
        let (notifier, _) = broadcast::channel(config.notification_capacity.max(1));
        Self {
            config,
            creatures: Mutex::new(IndexMap::new()),
            notifier,
            telemetry: None,
        }
    }

    /// Attaches telemetry.
    #[must_use]
    pub fn with_telemetry(mut self, telemetry: PerceptionTelemetry) -> Self {
        self.telemetry = Some(telemetry);
        self
    }

    /// Active configuration.
    #[must_use]
    pub const fn config(&self) -> &MindConfig {
        &self.config
    }

    /// Receiver for merge notifications sent after this call.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<StateNotification> {
        self.notifier.subscribe()
    }

    /// Returns the creature named in `snapshot`, creating it on first
    /// sighting, and merges the snapshot into it. Concurrent first sightings
    /// of one name yield the same creature.
    pub fn get_or_create(&self, snapshot: &CreatureSnapshot) -> Arc<Creature> {
        let creature = {
            let mut creatures = self.creatures.lock();
            Arc::clone(creatures.entry(snapshot.name.clone()).or_insert_with(|| {
                Arc::new(Creature::new(
                    &snapshot.name,
                    &self.config,
                    self.telemetry.as_ref(),
                ))
            }))
        };
        let notification =
            creature.merge(snapshot, self.config.default_creature_speed, &self.notifier);
        if let Some(tel) = &self.telemetry {
            let payload = json!({
                "creature": notification.creature,
                "sequence": notification.sequence,
                "vision": notification.vision.len(),
                "frustum": notification.frustum.len(),
            });
            let _ = tel.log(LogLevel::Info, "perception.merge.completed", payload.clone());
            let _ = tel.event("perception.merge.completed", payload);
        }
        creature
    }

    /// Merges a parsed report, logging its field issues first.
    pub fn ingest(&self, report: &SnapshotReport) -> Arc<Creature> {
        if !report.is_complete() {
            if let Some(tel) = &self.telemetry {
                let issues: Vec<String> = report.issues.iter().map(ToString::to_string).collect();
                let _ = tel.log(
                    LogLevel::Warn,
                    "perception.snapshot.issues",
                    json!({ "creature": report.snapshot.name, "issues": issues }),
                );
            }
        }
        self.get_or_create(&report.snapshot)
    }

    /// Parses a creature-state reply and merges it.
    pub fn ingest_reply(&self, input: &str) -> Result<Arc<Creature>, SnapshotError> {
        let report = parse_creature_state(input)?;
        Ok(self.ingest(&report))
    }

    /// Looks a creature up.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<Creature>> {
        self.creatures.lock().get(name).cloned()
    }

    /// Names in first-sighting order.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.creatures.lock().keys().cloned().collect()
    }

    /// Forgets a creature and stops its retention timer.
    pub fn remove(&self, name: &str) -> Option<Arc<Creature>> {
        let removed = self.creatures.lock().shift_remove(name);
        if let Some(creature) = &removed {
            creature.stop_retention();
        }
        removed
    }

    /// Forgets every creature.
    pub fn clear(&self) {
        let drained: Vec<_> = self.creatures.lock().drain(..).collect();
        for (_, creature) in drained {
            creature.stop_retention();
        }
    }

    /// Number of cached creatures.
    #[must_use]
    pub fn len(&self) -> usize {
        self.creatures.lock().len()
    }

    /// True when no creature is cached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.creatures.lock().is_empty()
    }
}
