//! Exploration grid and known-things registry of one creature.

use std::sync::Arc;

use indexmap::IndexMap;
use mind_perception::{
    geometry::xy_to_polar, Environment, Margins, MindConfig, PerceptionTelemetry, Point, Polar,
    Pose, SharedThing, Thing, ThingReading,
};
use parking_lot::{Mutex, RwLock};
use rand::{rngs::SmallRng, seq::SliceRandom, SeedableRng};
use serde_json::json;
use shared_logging::LogLevel;
use tracing::debug;

/// Boolean occupancy grid over the environment; `true` marks an observed cell.
///
/// Cells are addressed by `(column, row)`; column `i` spans
/// `[i * width / columns, (i + 1) * width / columns)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExplorationGrid {
    columns: usize,
    rows: usize,
    known: Vec<bool>,
}

impl ExplorationGrid {
    /// Creates a fully unknown grid; zero dimensions are raised to one.
    #[must_use]
    pub fn new(columns: usize, rows: usize) -> Self {
        let columns = columns.max(1);
        let rows = rows.max(1);
        Self {
            columns,
            rows,
            known: vec![false; columns * rows],
        }
    }

    /// Number of columns.
    #[must_use]
    pub const fn columns(&self) -> usize {
        self.columns
    }

    /// Number of rows.
    #[must_use]
    pub const fn rows(&self) -> usize {
        self.rows
    }

    fn slot(&self, column: usize, row: usize) -> Option<usize> {
        (column < self.columns && row < self.rows).then_some(column * self.rows + row)
    }

    /// Observation flag of a cell, `None` outside the grid.
    #[must_use]
    pub fn is_known(&self, column: usize, row: usize) -> Option<bool> {
        self.slot(column, row).map(|slot| self.known[slot])
    }

    /// Flags a cell observed; returns `false` outside the grid.
    pub fn mark_known(&mut self, column: usize, row: usize) -> bool {
        match self.slot(column, row) {
            Some(slot) => {
                self.known[slot] = true;
                true
            }
            None => false,
        }
    }

    /// Resets every cell to unknown.
    pub fn clear(&mut self) {
        self.known.fill(false);
    }

    /// Number of unknown cells.
    #[must_use]
    pub fn unknown_count(&self) -> usize {
        self.known.iter().filter(|known| !**known).count()
    }

    fn unknown_cells(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        (0..self.columns)
            .flat_map(move |column| (0..self.rows).map(move |row| (column, row)))
            .filter(|&(column, row)| !self.known[column * self.rows + row])
    }
}

/// Environment dimensions and the grid tessellating them, swapped together.
#[derive(Debug)]
struct Layout {
    environment: Environment,
    grid: Option<ExplorationGrid>,
}

impl Layout {
    #[allow(clippy::cast_precision_loss)]
    fn cell_center(&self, grid: &ExplorationGrid, column: usize, row: usize) -> Point {
        Point::new(
            (column as f64 + 0.5) * self.environment.width / grid.columns as f64,
            (row as f64 + 0.5) * self.environment.height / grid.rows as f64,
        )
    }
}

/// Moves `center` by whole periods to the copy closest to `origin`.
fn wrap_towards(origin: f64, center: f64, period: f64) -> f64 {
    if !period.is_finite() || period <= 0.0 {
        return center;
    }
    let mut center = center + ((origin - center) / period).round() * period;
    while (origin - center).abs() > (origin - (center - period)).abs() {
        center -= period;
    }
    while (origin - center).abs() > (origin - (center + period)).abs() {
        center += period;
    }
    center
}

/// Spatial belief of one creature: which areas were explored and which
/// things are known to exist.
#[derive(Debug)]
pub struct WorldMap {
    margins: Margins,
    layout: RwLock<Layout>,
    things: RwLock<IndexMap<String, SharedThing>>,
    rng: Mutex<SmallRng>,
    telemetry: Option<PerceptionTelemetry>,
}

impl WorldMap {
    /// Map with a fully unknown grid sized from the configuration.
    #[must_use]
    pub fn new(config: &MindConfig) -> Self {
        Self {
            margins: config.margins,
            layout: RwLock::new(Layout {
                environment: config.environment,
                grid: Some(ExplorationGrid::new(config.grid.columns, config.grid.rows)),
            }),
            things: RwLock::new(IndexMap::new()),
            rng: Mutex::new(SmallRng::from_entropy()),
            telemetry: None,
        }
    }

    /// Map without an exploration grid; unknown-area queries answer `None`.
    #[must_use]
    pub fn without_grid(config: &MindConfig) -> Self {
        let map = Self::new(config);
        map.layout.write().grid = None;
        map
    }

    /// Makes random sampling reproducible.
    #[must_use]
    pub fn with_seed(self, seed: u64) -> Self {
        *self.rng.lock() = SmallRng::seed_from_u64(seed);
        self
    }

    /// Attaches telemetry.
    #[must_use]
    pub fn with_telemetry(mut self, telemetry: PerceptionTelemetry) -> Self {
        self.telemetry = Some(telemetry);
        self
    }

    /// Environment the grid tessellates.
    #[must_use]
    pub fn environment(&self) -> Environment {
        self.layout.read().environment
    }

    /// Adopts new environment dimensions, keeping the grid's cells.
    pub fn set_environment(&self, environment: Environment) {
        self.layout.write().environment = environment;
    }

    /// Replaces the grid over the current environment.
    pub fn set_grid(&self, grid: Option<ExplorationGrid>) {
        self.layout.write().grid = grid;
    }

    /// Replaces environment and grid in one step, e.g. after the simulation
    /// reports new dimensions.
    pub fn resize(&self, environment: Environment, grid: Option<ExplorationGrid>) {
        *self.layout.write() = Layout { environment, grid };
    }

    /// Copy of the current grid.
    #[must_use]
    pub fn grid(&self) -> Option<ExplorationGrid> {
        self.layout.read().grid.clone()
    }

    /// Center of a cell, `None` without a grid or outside it.
    #[must_use]
    pub fn cell_center(&self, column: usize, row: usize) -> Option<Point> {
        let layout = self.layout.read();
        let grid = layout.grid.as_ref()?;
        grid.slot(column, row)?;
        Some(layout.cell_center(grid, column, row))
    }

    /// Flags a cell observed; `false` without a grid or outside it.
    pub fn mark_known(&self, column: usize, row: usize) -> bool {
        self.layout
            .write()
            .grid
            .as_mut()
            .is_some_and(|grid| grid.mark_known(column, row))
    }

    /// Flags the cell containing `point` observed, wrapping coordinates
    /// around the environment edges.
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    pub fn mark_observed(&self, point: Point) -> bool {
        let mut layout = self.layout.write();
        let Environment { width, height, .. } = layout.environment;
        let Some(grid) = layout.grid.as_mut() else {
            return false;
        };
        if !point.x.is_finite() || !point.y.is_finite() {
            return false;
        }
        let x = point.x.rem_euclid(width);
        let y = point.y.rem_euclid(height);
        let column = ((x / width * grid.columns as f64) as usize).min(grid.columns - 1);
        let row = ((y / height * grid.rows as f64) as usize).min(grid.rows - 1);
        grid.mark_known(column, row)
    }

    /// Observation flag of a cell.
    #[must_use]
    pub fn is_known(&self, column: usize, row: usize) -> Option<bool> {
        self.layout.read().grid.as_ref()?.is_known(column, row)
    }

    /// Resets every cell to unknown.
    pub fn clear_known(&self) {
        if let Some(grid) = self.layout.write().grid.as_mut() {
            grid.clear();
        }
    }

    /// Number of unknown cells, zero without a grid.
    #[must_use]
    pub fn unknown_count(&self) -> usize {
        self.layout
            .read()
            .grid
            .as_ref()
            .map_or(0, ExplorationGrid::unknown_count)
    }

    /// Nearest unknown cell farther than `min_distance` from the pose.
    ///
    /// Each cell center is shifted by whole environment widths and heights
    /// (independently per axis) while that brings it closer to the agent, so
    /// the search honours the toroidal world. `None` without a grid or
    /// without a qualifying cell.
    #[must_use]
    pub fn nearest_unknown_polar(&self, pose: &Pose, min_distance: f64) -> Option<Polar> {
        let layout = self.layout.read();
        let Some(grid) = layout.grid.as_ref() else {
            debug!("nearest unknown area requested without a grid");
            return None;
        };
        let Environment { width, height, .. } = layout.environment;
        let mut nearest: Option<Polar> = None;
        for (column, row) in grid.unknown_cells() {
            let center = layout.cell_center(grid, column, row);
            let wrapped = Point::new(
                wrap_towards(pose.position.x, center.x, width),
                wrap_towards(pose.position.y, center.y, height),
            );
            let polar = xy_to_polar(pose, wrapped);
            if polar.distance > min_distance
                && nearest.map_or(true, |best| polar.distance < best.distance)
            {
                nearest = Some(polar);
            }
        }
        drop(layout);
        if let Some(tel) = &self.telemetry {
            let _ = tel.log(
                LogLevel::Debug,
                "spatial.unknown.nearest",
                json!({
                    "found": nearest.is_some(),
                    "distance": nearest.map(|p| p.distance),
                    "bearing": nearest.map(|p| p.bearing),
                    "min_distance": min_distance,
                }),
            );
        }
        nearest
    }

    /// Center of an unknown cell drawn uniformly, without wraparound.
    #[must_use]
    pub fn random_unknown_area(&self) -> Option<Point> {
        let layout = self.layout.read();
        let grid = layout.grid.as_ref()?;
        let centers: Vec<Point> = grid
            .unknown_cells()
            .map(|(column, row)| layout.cell_center(grid, column, row))
            .collect();
        let mut rng = self.rng.lock();
        centers.choose(&mut *rng).copied()
    }

    /// Registers things: unseen names are appended, known names point to
    /// the new handle from now on.
    pub fn update_things(&self, things: &[SharedThing]) {
        let mut known = self.things.write();
        for thing in things {
            let name = thing.read().name().to_string();
            known.insert(name, Arc::clone(thing));
        }
    }

    /// Registers readings, refreshing known things in place.
    pub fn record_readings(&self, readings: &[ThingReading]) {
        let mut known = self.things.write();
        for reading in readings {
            match known.get(&reading.name) {
                Some(thing) => thing.write().update(reading),
                None => {
                    let thing = Thing::perceived(reading, self.margins).into_shared();
                    known.insert(reading.name.clone(), thing);
                }
            }
        }
    }

    /// Known things in first-seen order.
    #[must_use]
    pub fn things(&self) -> Vec<SharedThing> {
        self.things.read().values().cloned().collect()
    }

    /// Looks a known thing up.
    #[must_use]
    pub fn thing(&self, name: &str) -> Option<SharedThing> {
        self.things.read().get(name).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mind_perception::{
        parse_simulation_parameters, parse_world_entities, GridConfig, Rect, ThingCategory,
    };
    use shared_logging::MemorySink;

    fn config(width: f64, height: f64, columns: usize, rows: usize) -> MindConfig {
        MindConfig {
            environment: Environment {
                width,
                height,
                delivery_spot: None,
            },
            grid: GridConfig { columns, rows },
            ..MindConfig::default()
        }
    }

    fn all_known_but(map: &WorldMap, column: usize, row: usize) {
        let grid = map.grid().unwrap();
        for c in 0..grid.columns() {
            for r in 0..grid.rows() {
                if (c, r) != (column, row) {
                    assert!(map.mark_known(c, r));
                }
            }
        }
    }

    #[test]
    fn single_unknown_cell_is_found_directly() {
        let map = WorldMap::new(&config(100.0, 100.0, 10, 10));
        all_known_but(&map, 4, 4);
        assert_eq!(map.unknown_count(), 1);
        let pose = Pose::new(Point::new(45.0, 25.0), 0.0);
        let polar = map.nearest_unknown_polar(&pose, 5.0).unwrap();
        assert!((polar.distance - 20.0).abs() < 1e-9);
        assert_eq!(polar, xy_to_polar(&pose, Point::new(45.0, 45.0)));
        assert!(map.nearest_unknown_polar(&pose, 20.0).is_none());
    }

    #[test]
    fn single_unknown_cell_across_the_edges() {
        let map = WorldMap::new(&config(100.0, 100.0, 10, 10));
        all_known_but(&map, 0, 0);
        let pose = Pose::new(Point::new(95.0, 95.0), 0.0);
        let polar = map.nearest_unknown_polar(&pose, 10.0).unwrap();
        assert!((polar.distance - 200f64.sqrt()).abs() < 1e-9);
        assert_eq!(polar, xy_to_polar(&pose, Point::new(105.0, 105.0)));
        assert!(map.nearest_unknown_polar(&pose, 15.0).is_none());
    }

    #[test]
    fn nearest_prefers_closest_qualifying_cell() {
        let map = WorldMap::new(&config(100.0, 100.0, 10, 10));
        let pose = Pose::new(Point::new(5.0, 5.0), 0.0);
        let polar = map.nearest_unknown_polar(&pose, 0.0).unwrap();
        assert!((polar.distance - 10.0).abs() < 1e-9);
        assert!(map.mark_observed(Point::new(5.0, 5.0)));
        assert_eq!(map.is_known(0, 0), Some(true));
    }

    #[test]
    fn absent_grid_answers_none() {
        let map = WorldMap::without_grid(&MindConfig::default());
        let pose = Pose::default();
        assert!(map.nearest_unknown_polar(&pose, 0.0).is_none());
        assert!(map.random_unknown_area().is_none());
        assert!(!map.mark_known(0, 0));
        assert_eq!(map.unknown_count(), 0);
    }

    #[test]
    fn random_unknown_area_samples_unknown_centers() {
        let map = WorldMap::new(&config(100.0, 100.0, 2, 2)).with_seed(11);
        map.mark_known(0, 0);
        map.mark_known(1, 1);
        for _ in 0..20 {
            let point = map.random_unknown_area().unwrap();
            assert!(point == Point::new(25.0, 75.0) || point == Point::new(75.0, 25.0));
        }
        map.mark_known(0, 1);
        map.mark_known(1, 0);
        assert!(map.random_unknown_area().is_none());
        map.clear_known();
        assert_eq!(map.unknown_count(), 4);
    }

    #[test]
    fn observed_points_wrap_around() {
        let map = WorldMap::new(&config(100.0, 100.0, 10, 10));
        assert!(map.mark_observed(Point::new(-5.0, 105.0)));
        assert_eq!(map.is_known(9, 0), Some(true));
        assert!(map.mark_observed(Point::new(100.0, 99.999)));
        assert_eq!(map.is_known(0, 9), Some(true));
        assert!(!map.mark_observed(Point::new(f64::NAN, 1.0)));
        assert_eq!(map.cell_center(9, 9), Some(Point::new(95.0, 95.0)));
        assert_eq!(map.cell_center(10, 0), None);
    }

    #[test]
    fn new_dimensions_move_centers_and_wrap_period() {
        let map = WorldMap::new(&config(800.0, 600.0, 10, 10));
        let params = parse_simulation_parameters("1000 1000").unwrap();
        map.resize(Environment::from(params), Some(ExplorationGrid::new(10, 10)));
        assert_eq!(map.environment().width, 1000.0);
        assert_eq!(map.cell_center(9, 0), Some(Point::new(950.0, 50.0)));

        all_known_but(&map, 0, 0);
        let pose = Pose::new(Point::new(990.0, 990.0), 0.0);
        let polar = map.nearest_unknown_polar(&pose, 0.0).unwrap();
        assert!((polar.distance - 60.0 * 2f64.sqrt()).abs() < 1e-9);
        assert_eq!(polar, xy_to_polar(&pose, Point::new(1050.0, 1050.0)));

        map.set_environment(Environment {
            width: 100.0,
            height: 100.0,
            delivery_spot: None,
        });
        assert_eq!(map.cell_center(0, 0), Some(Point::new(5.0, 5.0)));
    }

    #[test]
    fn far_away_poses_wrap_in_one_step() {
        assert!((wrap_towards(1e15, 5.0, 100.0) - 1e15).abs() <= 50.0);
        assert_eq!(wrap_towards(95.0, 5.0, 100.0), 105.0);
        assert_eq!(wrap_towards(-1e12, 30.0, 100.0), -1e12 + 30.0);
        assert_eq!(wrap_towards(40.0, 5.0, 0.0), 5.0);
    }

    #[test]
    fn things_registry_keeps_first_seen_order() {
        let map = WorldMap::new(&MindConfig::default());
        let listing = parse_world_entities(
            "2 Food_1 21 0 1 3 1 3 0 0 10 0 Red 2 2 Brick_2 1 0 0 100 0 10 0 5 0 0 Black 50 5",
        );
        map.record_readings(&listing.things);
        let food = map.thing("Food_1").unwrap();

        let mut moved = listing.things[0].clone();
        moved.bounds = Rect::from_bounds(10.0, 10.0, 12.0, 12.0);
        map.record_readings(&[moved]);
        assert!(Arc::ptr_eq(&food, &map.thing("Food_1").unwrap()));
        assert_eq!(food.read().bounds().min, Point::new(10.0, 10.0));

        let replacement = Thing::perceived(
            &ThingReading::new("Brick_2", ThingCategory::Brick, Rect::default()),
            Margins::default(),
        )
        .into_shared();
        map.update_things(&[Arc::clone(&replacement)]);
        let names: Vec<String> = map
            .things()
            .iter()
            .map(|t| t.read().name().to_string())
            .collect();
        assert_eq!(names, vec!["Food_1", "Brick_2"]);
        assert!(Arc::ptr_eq(&map.thing("Brick_2").unwrap(), &replacement));
    }

    #[test]
    fn nearest_query_is_logged() {
        let sink = Arc::new(MemorySink::new(4));
        let telemetry = PerceptionTelemetry::builder("spatial")
            .sink(sink.clone())
            .build()
            .unwrap();
        let map = WorldMap::new(&config(100.0, 100.0, 2, 2)).with_telemetry(telemetry);
        map.nearest_unknown_polar(&Pose::default(), 0.0);
        let records = sink.find("spatial.unknown.nearest");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].metadata["found"], true);
    }
}
