//! Decoding of the simulation's whitespace-separated state replies.
//!
//! Parsing never aborts on a bad field. Every missing or unparsable token
//! becomes a [`FieldIssue`] and the matching field of the result stays
//! `None`, so the caller decides between merging what arrived and skipping
//! the cycle.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::warn;

use crate::config::Environment;
use crate::geometry::{Point, Rect};
use crate::leaflet::Leaflet;
use crate::thing::{Material, ThingCategory, ThingReading};

/// Token that may precede a thing name in the entity list.
const THING_SEPARATOR: &str = "||";
/// Acted-upon token meaning no contact action happened.
const NO_ACTION: &str = "NONE";

/// What went wrong with a field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum IssueKind {
    /// The reply ended before the field.
    Missing,
    /// The token could not be decoded.
    Invalid(String),
}

/// One field that could not be read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldIssue {
    /// Field path, e.g. `fuel` or `things[1].x2`.
    pub field: String,
    /// Failure kind.
    pub kind: IssueKind,
}

impl fmt::Display for FieldIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            IssueKind::Missing => write!(f, "{}: missing", self.field),
            IssueKind::Invalid(token) => write!(f, "{}: invalid token {token:?}", self.field),
        }
    }
}

/// Snapshot decoding failures.
#[derive(Debug, Error)]
pub enum SnapshotError {
    /// Nothing to decode, or no creature name.
    #[error("empty snapshot")]
    Empty,
    /// Some fields could not be read.
    #[error("malformed snapshot: {} field issue(s)", issues.len())]
    Malformed {
        /// Every recorded issue.
        issues: Vec<FieldIssue>,
    },
}

/// Payload about the thing the last contact action was performed on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ActedUpon {
    /// No contact action happened.
    Nothing,
    /// JSON description sent by the server.
    Thing(Value),
}

/// Self block plus perceived things of one creature-state reply.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CreatureSnapshot {
    /// Creature name.
    pub name: String,
    /// Server-side index.
    pub index: Option<String>,
    /// Center of mass x.
    pub com_x: Option<f64>,
    /// Center of mass y.
    pub com_y: Option<f64>,
    /// Body size.
    pub size: Option<f64>,
    /// Heading in radians.
    pub pitch: Option<f64>,
    /// Motor system kind.
    pub motor_system: Option<i64>,
    /// Wheel steering.
    pub wheel: Option<f64>,
    /// Speed.
    pub speed: Option<f64>,
    /// Fuel.
    pub fuel: Option<f64>,
    /// First mood scalar.
    pub serotonin: Option<f64>,
    /// Second mood scalar.
    pub endorphine: Option<f64>,
    /// Score.
    pub score: Option<f64>,
    /// Bounds x1.
    pub x1: Option<f64>,
    /// Bounds y1.
    pub y1: Option<f64>,
    /// Bounds x2.
    pub x2: Option<f64>,
    /// Bounds y2.
    pub y2: Option<f64>,
    /// Body color.
    pub color: Option<String>,
    /// Result of the last contact action.
    pub acted_upon: Option<ActedUpon>,
    /// Collision flag.
    pub has_collided: Option<bool>,
    /// Leaflet-presence flag.
    pub has_leaflet: Option<bool>,
    /// Leaflets, meaningful only when `has_leaflet` is `Some(true)`.
    pub leaflets: Vec<Leaflet>,
    /// Perceived things in wire order.
    pub things: Vec<ThingReading>,
}

/// Partial result of decoding a creature-state reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotReport {
    /// Whatever could be decoded.
    pub snapshot: CreatureSnapshot,
    /// Fields that could not.
    pub issues: Vec<FieldIssue>,
}

impl SnapshotReport {
    /// True when every field decoded.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.issues.is_empty()
    }

    /// Returns the snapshot only if nothing went wrong.
    pub fn require_complete(self) -> Result<CreatureSnapshot, SnapshotError> {
        if self.issues.is_empty() {
            Ok(self.snapshot)
        } else {
            Err(SnapshotError::Malformed {
                issues: self.issues,
            })
        }
    }
}

/// Decoded world-entities listing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EntitiesReport {
    /// Well-formed entries in wire order.
    pub things: Vec<ThingReading>,
    /// Fields that could not be decoded.
    pub issues: Vec<FieldIssue>,
}

/// Environment parameters reported by the simulation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SimulationParameters {
    /// Environment width.
    pub width: f64,
    /// Environment height.
    pub height: f64,
    /// Delivery spot, when reported.
    pub delivery_spot: Option<Point>,
}

impl From<SimulationParameters> for Environment {
    fn from(params: SimulationParameters) -> Self {
        Self {
            width: params.width,
            height: params.height,
            delivery_spot: params.delivery_spot.map(|spot| [spot.x, spot.y]),
        }
    }
}

struct Cursor<'a> {
    tokens: std::str::SplitWhitespace<'a>,
    issues: Vec<FieldIssue>,
}

impl<'a> Cursor<'a> {
    fn new(input: &'a str) -> Self {
        Self {
            tokens: input.split_whitespace(),
            issues: Vec::new(),
        }
    }

    fn record(&mut self, field: String, kind: IssueKind) {
        warn!(field = %field, kind = ?kind, "snapshot field issue");
        self.issues.push(FieldIssue { field, kind });
    }

    fn text(&mut self, field: impl Into<String>) -> Option<&'a str> {
        let token = self.tokens.next();
        if token.is_none() {
            self.record(field.into(), IssueKind::Missing);
        }
        token
    }

    fn value<T: FromStr>(&mut self, field: impl Into<String>) -> Option<T> {
        let field = field.into();
        let token = self.text(field.clone())?;
        let parsed = token.parse().ok();
        if parsed.is_none() {
            self.record(field, IssueKind::Invalid(token.to_string()));
        }
        parsed
    }

    fn degrees(&mut self, field: impl Into<String>) -> Option<f64> {
        self.value::<f64>(field).map(f64::to_radians)
    }

    fn flag(&mut self, field: impl Into<String>) -> Option<bool> {
        let field = field.into();
        match self.value::<i64>(field.clone())? {
            0 => Some(false),
            1 => Some(true),
            other => {
                self.record(field, IssueKind::Invalid(other.to_string()));
                None
            }
        }
    }

    fn acted_upon(&mut self) -> Option<ActedUpon> {
        let token = self.text("acted_upon")?;
        if token == NO_ACTION {
            return Some(ActedUpon::Nothing);
        }
        match serde_json::from_str(token) {
            Ok(value) => Some(ActedUpon::Thing(value)),
            Err(_) => {
                self.record("acted_upon".into(), IssueKind::Invalid(token.to_string()));
                Some(ActedUpon::Nothing)
            }
        }
    }

    fn exhausted(&self) -> bool {
        self.tokens.clone().next().is_none()
    }

    fn leaflet(&mut self, at: usize) -> Option<Leaflet> {
        let id = self.value::<i64>(format!("leaflets[{at}].id"));
        let item_count = self.value::<usize>(format!("leaflets[{at}].item_count"))?;
        let mut items = Vec::new();
        for item in 0..item_count {
            if self.exhausted() {
                self.record(format!("leaflets[{at}].items[{item}]"), IssueKind::Missing);
                return None;
            }
            let color = self.text(format!("leaflets[{at}].items[{item}].color"));
            let total = self.value::<i64>(format!("leaflets[{at}].items[{item}].total"));
            let collected = self.value::<i64>(format!("leaflets[{at}].items[{item}].collected"));
            items.push((color, total, collected));
        }
        let payment = self.value::<i64>(format!("leaflets[{at}].payment"));
        let situation = self
            .text(format!("leaflets[{at}].situation"))
            .map(|token| token == "true");

        let (Some(id), Some(payment), Some(situation)) = (id, payment, situation) else {
            return None;
        };
        let mut leaflet = Leaflet::new(id, payment);
        leaflet.situation = situation;
        for entry in items {
            let (Some(color), Some(total), Some(collected)) = entry else {
                return None;
            };
            leaflet = leaflet.with_item(color, total, collected);
        }
        Some(leaflet)
    }

    fn thing(&mut self, at: usize) -> Option<ThingReading> {
        let field = |name: &str| format!("things[{at}].{name}");
        let mut name = self.text(field("name"));
        if name == Some(THING_SEPARATOR) {
            name = self.text(field("name"));
        }
        let category = self.value::<i64>(field("category"));
        let occluded = self.value::<i64>(field("occluded"));
        let x1 = self.value::<f64>(field("x1"));
        let x2 = self.value::<f64>(field("x2"));
        let y1 = self.value::<f64>(field("y1"));
        let y2 = self.value::<f64>(field("y2"));
        let pitch = self.degrees(field("pitch"));
        let hardness = self.value::<f64>(field("hardness"));
        let energy = self.value::<f64>(field("energy"));
        let shininess = self.value::<f64>(field("shininess"));
        let color = self.text(field("color"));
        let com_x = self.value::<f64>(field("com_x"));
        let com_y = self.value::<f64>(field("com_y"));

        let category = match category.map(|code| (code, ThingCategory::from_code(code))) {
            Some((_, Some(category))) => category,
            Some((code, None)) => {
                self.record(field("category"), IssueKind::Invalid(code.to_string()));
                return None;
            }
            None => return None,
        };
        let (
            Some(name),
            Some(occluded),
            Some(x1),
            Some(x2),
            Some(y1),
            Some(y2),
            Some(pitch),
            Some(hardness),
            Some(energy),
            Some(shininess),
            Some(color),
            Some(com_x),
            Some(com_y),
        ) = (
            name, occluded, x1, x2, y1, y2, pitch, hardness, energy, shininess, color, com_x,
            com_y,
        )
        else {
            return None;
        };
        Some(ThingReading {
            name: name.to_string(),
            category,
            occluded: occluded != 0,
            bounds: Rect::from_bounds(x1, y1, x2, y2),
            center: Point::new(com_x, com_y),
            pitch,
            material: Material {
                color: color.to_string(),
                hardness,
                energy,
                shininess,
            },
        })
    }

    fn things(&mut self, field: &str) -> Vec<ThingReading> {
        let Some(count) = self.value::<usize>(field) else {
            return Vec::new();
        };
        let mut things = Vec::new();
        for at in 0..count {
            if self.exhausted() {
                self.record(format!("things[{at}]"), IssueKind::Missing);
                break;
            }
            if let Some(thing) = self.thing(at) {
                things.push(thing);
            }
        }
        things
    }
}

/// Decodes a creature-state reply:
/// `name index comX comY size pitch motorSys wheel speed fuel serotonin
/// endorphine score x1 y1 x2 y2 color actedUpon hasCollided hasLeaflet
/// leafletCount {leaflet}* thingCount {thing}*`.
///
/// Angles arrive in degrees and are stored in radians. The leaflet count is
/// always present and only read when `hasLeaflet` is 1.
pub fn parse_creature_state(input: &str) -> Result<SnapshotReport, SnapshotError> {
    let mut cursor = Cursor::new(input);
    let name = cursor.tokens.next().ok_or(SnapshotError::Empty)?;
    let mut snapshot = CreatureSnapshot {
        name: name.to_string(),
        index: cursor.text("index").map(str::to_string),
        com_x: cursor.value("com_x"),
        com_y: cursor.value("com_y"),
        size: cursor.value("size"),
        pitch: cursor.degrees("pitch"),
        motor_system: cursor.value("motor_system"),
        wheel: cursor.value("wheel"),
        speed: cursor.value("speed"),
        fuel: cursor.value("fuel"),
        serotonin: cursor.value("serotonin"),
        endorphine: cursor.value("endorphine"),
        score: cursor.value("score"),
        x1: cursor.value("x1"),
        y1: cursor.value("y1"),
        x2: cursor.value("x2"),
        y2: cursor.value("y2"),
        color: cursor.text("color").map(str::to_string),
        acted_upon: cursor.acted_upon(),
        has_collided: cursor.flag("has_collided"),
        has_leaflet: cursor.flag("has_leaflet"),
        ..CreatureSnapshot::default()
    };

    let leaflet_count = cursor.value::<usize>("leaflet_count");
    if snapshot.has_leaflet == Some(true) {
        for at in 0..leaflet_count.unwrap_or(0) {
            if cursor.exhausted() {
                cursor.record(format!("leaflets[{at}]"), IssueKind::Missing);
                break;
            }
            if let Some(leaflet) = cursor.leaflet(at) {
                snapshot.leaflets.push(leaflet);
            }
        }
    }
    snapshot.things = cursor.things("thing_count");

    Ok(SnapshotReport {
        snapshot,
        issues: cursor.issues,
    })
}

/// Decodes a world-entities listing: `count {thing}*`, same thing layout as
/// in creature-state replies.
#[must_use]
pub fn parse_world_entities(input: &str) -> EntitiesReport {
    let mut cursor = Cursor::new(input);
    let things = cursor.things("count");
    EntitiesReport {
        things,
        issues: cursor.issues,
    }
}

/// Decodes simulation parameters: `width height [xDS yDS]`.
pub fn parse_simulation_parameters(input: &str) -> Result<SimulationParameters, SnapshotError> {
    let mut cursor = Cursor::new(input);
    if cursor.exhausted() {
        return Err(SnapshotError::Empty);
    }
    let width = cursor.value::<f64>("width");
    let height = cursor.value::<f64>("height");
    let delivery_spot = if cursor.exhausted() {
        None
    } else {
        let x = cursor.value::<f64>("delivery_x");
        let y = cursor.value::<f64>("delivery_y");
        x.zip(y).map(|(x, y)| Point::new(x, y))
    };
    match (width, height) {
        (Some(width), Some(height)) if cursor.issues.is_empty() => Ok(SimulationParameters {
            width,
            height,
            delivery_spot,
        }),
        _ => Err(SnapshotError::Malformed {
            issues: cursor.issues,
        }),
    }
}
