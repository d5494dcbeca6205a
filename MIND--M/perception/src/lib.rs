#![deny(
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    missing_docs,
    rust_2018_idioms
)]

//! Creature mind perception layer – turns positional snapshots from the
//! simulation into an identity-preserving belief state.

/// Telemetry builder for perception components.
#[path = "../telemetry.rs"]
pub mod telemetry;

/// Configuration surface (margins, frustum, retention, environment).
pub mod config;
/// Creature state cache and registry.
pub mod creature;
/// Rectangles, segments, rays and field-of-view construction.
pub mod geometry;
/// Collection tasks.
pub mod leaflet;
/// Cancellable retention timers.
pub mod retention;
/// Vision and Frustum buffers.
pub mod sensory_buffer;
/// Wire decoding of state replies.
pub mod snapshot;
/// Perceivable entities.
pub mod thing;
/// Visual working memory.
pub mod working_memory;

pub use config::{ConfigError, Environment, FovConfig, GridConfig, Margins, MindConfig};
pub use creature::{Creature, CreatureRegistry, CreatureState, StateNotification};
pub use geometry::{Point, Polar, Pose, Rect, Segment};
pub use leaflet::{Leaflet, LeafletItem};
pub use retention::{Evictable, RetentionHandle};
pub use sensory_buffer::SensoryBuffer;
pub use snapshot::{
    parse_creature_state, parse_simulation_parameters, parse_world_entities, ActedUpon,
    CreatureSnapshot, EntitiesReport, FieldIssue, IssueKind, SimulationParameters, SnapshotError,
    SnapshotReport,
};
pub use telemetry::{PerceptionTelemetry, PerceptionTelemetryBuilder};
pub use thing::{Material, SharedThing, Thing, ThingCategory, ThingReading};
pub use working_memory::WorkingMemory;
