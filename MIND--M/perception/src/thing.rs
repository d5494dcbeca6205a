//! Entity model: one perceivable object of the environment.

use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::config::Margins;
use crate::geometry::{inset_rect, outset_rect, polygon_edges, Point, Rect, Segment};

/// Kind of thing, with the simulation's wire codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ThingCategory {
    /// Another creature (code 0).
    Creature,
    /// Wall segment (code 1).
    Brick,
    /// Generic food (code 2).
    Food,
    /// Food that rots (code 21).
    PerishableFood,
    /// Food that keeps (code 22).
    NonPerishableFood,
    /// Collectable jewel (code 3).
    Jewel,
    /// Leaflet delivery spot (code 4).
    DeliverySpot,
}

impl ThingCategory {
    /// Decodes a wire code.
    #[must_use]
    pub const fn from_code(code: i64) -> Option<Self> {
        match code {
            0 => Some(Self::Creature),
            1 => Some(Self::Brick),
            2 => Some(Self::Food),
            21 => Some(Self::PerishableFood),
            22 => Some(Self::NonPerishableFood),
            3 => Some(Self::Jewel),
            4 => Some(Self::DeliverySpot),
            _ => None,
        }
    }

    /// Wire code.
    #[must_use]
    pub const fn code(self) -> i64 {
        match self {
            Self::Creature => 0,
            Self::Brick => 1,
            Self::Food => 2,
            Self::PerishableFood => 21,
            Self::NonPerishableFood => 22,
            Self::Jewel => 3,
            Self::DeliverySpot => 4,
        }
    }

    /// True for every food variant.
    #[must_use]
    pub const fn is_food(self) -> bool {
        matches!(
            self,
            Self::Food | Self::PerishableFood | Self::NonPerishableFood
        )
    }
}

/// Surface properties reported for a thing.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Material {
    /// Color name (`Red`, `Green`, ...).
    pub color: String,
    /// Hardness.
    pub hardness: f64,
    /// Energy content (food).
    pub energy: f64,
    /// Shininess.
    pub shininess: f64,
}

/// Raw values of one perceived thing as decoded from a snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThingReading {
    /// Unique name.
    pub name: String,
    /// Category.
    pub category: ThingCategory,
    /// Blocked from direct line of sight.
    pub occluded: bool,
    /// Bounding rectangle.
    pub bounds: Rect,
    /// Center of mass.
    pub center: Point,
    /// Orientation in radians.
    pub pitch: f64,
    /// Surface properties.
    pub material: Material,
}

impl ThingReading {
    /// Reading with a default material and no occlusion.
    #[must_use]
    pub fn new(name: impl Into<String>, category: ThingCategory, bounds: Rect) -> Self {
        Self {
            name: name.into(),
            category,
            occluded: false,
            center: bounds.center(),
            bounds,
            pitch: 0.0,
            material: Material::default(),
        }
    }

    /// Marks the reading occluded or visible.
    #[must_use]
    pub const fn with_occluded(mut self, occluded: bool) -> Self {
        self.occluded = occluded;
        self
    }

    /// Sets the color name.
    #[must_use]
    pub fn with_color(mut self, color: impl Into<String>) -> Self {
        self.material.color = color.into();
        self
    }
}

/// Thing shared between buffers; identity is the allocation (`Arc::ptr_eq`).
pub type SharedThing = Arc<RwLock<Thing>>;

/// A perceived or remembered entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Thing {
    name: String,
    category: ThingCategory,
    bounds: Rect,
    center: Point,
    pitch: f64,
    occluded: bool,
    material: Material,
    from_memory: bool,
    margins: Margins,
}

impl Thing {
    /// Builds a freshly perceived thing.
    #[must_use]
    pub fn perceived(reading: &ThingReading, margins: Margins) -> Self {
        Self {
            name: reading.name.clone(),
            category: reading.category,
            bounds: reading.bounds,
            center: reading.center,
            pitch: reading.pitch,
            occluded: reading.occluded,
            material: reading.material.clone(),
            from_memory: false,
            margins,
        }
    }

    /// Builds a thing reconstructed from recollection rather than perception.
    #[must_use]
    pub fn remembered(reading: &ThingReading, margins: Margins) -> Self {
        Self {
            from_memory: true,
            ..Self::perceived(reading, margins)
        }
    }

    /// Wraps the thing for sharing between buffers.
    #[must_use]
    pub fn into_shared(self) -> SharedThing {
        Arc::new(RwLock::new(self))
    }

    /// Refreshes geometry, color, occlusion, energy, pitch and shininess in
    /// place. Name, category and hardness are kept. Clears `from_memory`.
    pub fn update(&mut self, reading: &ThingReading) {
        self.bounds = reading.bounds;
        self.center = reading.center;
        self.material.color.clone_from(&reading.material.color);
        self.occluded = reading.occluded;
        self.material.energy = reading.material.energy;
        self.pitch = reading.pitch;
        self.material.shininess = reading.material.shininess;
        self.from_memory = false;
    }

    /// Unique name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Category.
    #[must_use]
    pub const fn category(&self) -> ThingCategory {
        self.category
    }

    /// Bounding rectangle.
    #[must_use]
    pub const fn bounds(&self) -> Rect {
        self.bounds
    }

    /// Center of mass.
    #[must_use]
    pub const fn center(&self) -> Point {
        self.center
    }

    /// Orientation in radians.
    #[must_use]
    pub const fn pitch(&self) -> f64 {
        self.pitch
    }

    /// Whether the last perception reported the thing occluded.
    #[must_use]
    pub const fn is_occluded(&self) -> bool {
        self.occluded
    }

    /// Surface properties.
    #[must_use]
    pub const fn material(&self) -> &Material {
        &self.material
    }

    /// True when reconstructed from memory and not refreshed since.
    #[must_use]
    pub const fn is_from_memory(&self) -> bool {
        self.from_memory
    }

    /// Margins used for derived areas.
    #[must_use]
    pub const fn margins(&self) -> Margins {
        self.margins
    }

    /// Bounds grown by the gap margin.
    #[must_use]
    pub fn gap_area(&self) -> Rect {
        outset_rect(&self.bounds, self.margins.gap)
    }

    /// Bounds grown by the security margin.
    #[must_use]
    pub fn security_area(&self) -> Rect {
        outset_rect(&self.bounds, self.margins.security)
    }

    /// Bounds shrunk by the minimum visual-system margin.
    #[must_use]
    pub fn min_visual_area(&self) -> Rect {
        inset_rect(&self.bounds, self.margins.min_visual)
    }

    /// Corners of the gap area, used as path-planning waypoints.
    #[must_use]
    pub fn waypoints(&self) -> [Point; 4] {
        self.gap_area().corners()
    }

    /// Corners of the bounds without any margin.
    #[must_use]
    pub fn vertices(&self) -> [Point; 4] {
        self.bounds.corners()
    }

    /// Boundary edges of the bounds in traversal order.
    #[must_use]
    pub fn area_sides(&self) -> Vec<Segment> {
        polygon_edges(&self.bounds.outline())
    }

    /// Inclusive test against the bounds.
    #[must_use]
    pub fn contains_point(&self, point: Point) -> bool {
        self.bounds.contains(point)
    }

    /// Security-area test that excludes the four waypoints themselves.
    #[must_use]
    pub fn inner_waypoint_area_contains(&self, point: Point) -> bool {
        if self.waypoints().contains(&point) {
            return false;
        }
        self.security_area().contains(point)
    }

    /// Gap-area test; the waypoints are always inside.
    #[must_use]
    pub fn is_inside_gap_area(&self, point: Point) -> bool {
        self.waypoints().contains(&point) || self.gap_area().contains(point)
    }

    /// Plain inclusive test against the bounds grown by the gap margin.
    #[must_use]
    pub fn within_bounding_area(&self, point: Point) -> bool {
        let area = self.gap_area();
        area.min.x <= point.x
            && area.max.x >= point.x
            && area.min.y <= point.y
            && area.max.y >= point.y
    }

    /// Inclusive test against the security area.
    #[must_use]
    pub fn security_area_contains(&self, point: Point) -> bool {
        self.security_area().contains(point)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn brick() -> Thing {
        let reading = ThingReading::new(
            "Wall_1",
            ThingCategory::Brick,
            Rect::from_bounds(100.0, 100.0, 200.0, 150.0),
        )
        .with_color("Red");
        Thing::perceived(&reading, Margins::default())
    }

    #[test]
    fn category_codes_round_trip() {
        for code in [0, 1, 2, 21, 22, 3, 4] {
            let category = ThingCategory::from_code(code).unwrap();
            assert_eq!(category.code(), code);
        }
        assert_eq!(ThingCategory::from_code(5), None);
        assert!(ThingCategory::PerishableFood.is_food());
        assert!(!ThingCategory::Jewel.is_food());
    }

    #[test]
    fn waypoints_are_bounds_outset_by_gap() {
        let thing = brick();
        let expected = [
            Point::new(60.0, 60.0),
            Point::new(60.0, 190.0),
            Point::new(240.0, 60.0),
            Point::new(240.0, 190.0),
        ];
        assert_eq!(thing.waypoints(), expected);
        assert_eq!(thing.waypoints(), thing.waypoints());
    }

    #[test]
    fn derived_areas_follow_updates() {
        let mut thing = brick();
        let moved = ThingReading::new(
            "Wall_1",
            ThingCategory::Brick,
            Rect::from_bounds(0.0, 0.0, 10.0, 20.0),
        );
        thing.update(&moved);
        assert_eq!(thing.waypoints()[0], Point::new(-40.0, -40.0));
        assert_eq!(thing.security_area(), Rect::from_bounds(-30.0, -30.0, 40.0, 50.0));
        assert_eq!(thing.min_visual_area(), Rect::from_bounds(5.0, 5.0, 5.0, 15.0));
    }

    #[test]
    fn update_keeps_identity_fields_and_clears_memory_flag() {
        let reading = ThingReading::new(
            "Jewel_1",
            ThingCategory::Jewel,
            Rect::from_bounds(0.0, 0.0, 4.0, 4.0),
        );
        let mut thing = Thing::remembered(&reading, Margins::default());
        assert!(thing.is_from_memory());
        let mut refreshed = reading.clone().with_occluded(true).with_color("Blue");
        refreshed.category = ThingCategory::Food;
        refreshed.material.hardness = 9.0;
        thing.update(&refreshed);
        assert!(!thing.is_from_memory());
        assert!(thing.is_occluded());
        assert_eq!(thing.material().color, "Blue");
        assert_eq!(thing.category(), ThingCategory::Jewel);
        assert_eq!(thing.material().hardness, 0.0);
    }

    #[test]
    fn waypoint_membership_diverges_between_predicates() {
        let thing = brick();
        let corner = thing.waypoints()[3];
        assert!(!thing.inner_waypoint_area_contains(corner));
        assert!(thing.is_inside_gap_area(corner));

        let near = Point::new(75.0, 75.0);
        assert!(thing.security_area_contains(near));
        assert!(thing.inner_waypoint_area_contains(near));
        let gap_only = Point::new(65.0, 65.0);
        assert!(!thing.inner_waypoint_area_contains(gap_only));
        assert!(thing.is_inside_gap_area(gap_only));
        assert!(thing.within_bounding_area(gap_only));
    }

    #[test]
    fn bounds_tests_are_inclusive() {
        let thing = brick();
        assert!(thing.contains_point(Point::new(100.0, 150.0)));
        assert!(!thing.contains_point(Point::new(99.0, 120.0)));
        assert_eq!(thing.vertices()[1], Point::new(100.0, 150.0));
        assert_eq!(thing.area_sides().len(), 4);
    }
}
