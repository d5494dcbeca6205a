//! Geometry kernel: points, axis-aligned rectangles, segments and the small
//! computational-geometry routines used for occlusion culling, gaze-ray hits
//! and field-of-view construction.
//!
//! Coordinates follow the simulation's screen convention: `y` grows
//! downwards, pitch is measured in radians from the positive `x` axis.

use std::f64::consts::{PI, TAU};

use serde::{Deserialize, Serialize};

/// A position, vertex, or grid-cell center.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    /// Abscissa.
    pub x: f64,
    /// Ordinate.
    pub y: f64,
}

impl Point {
    /// Creates a point.
    #[must_use]
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Euclidean distance to `other`.
    #[must_use]
    pub fn distance_to(&self, other: Self) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }
}

/// Axis-aligned rectangle stored as normalised min/max corners.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Rect {
    /// Corner with the smallest coordinates (`x1`, `y1`).
    pub min: Point,
    /// Corner with the largest coordinates (`x2`, `y2`).
    pub max: Point,
}

impl Rect {
    /// Builds a rectangle from two opposite corners in any order.
    #[must_use]
    pub fn from_corners(a: Point, b: Point) -> Self {
        Self {
            min: Point::new(a.x.min(b.x), a.y.min(b.y)),
            max: Point::new(a.x.max(b.x), a.y.max(b.y)),
        }
    }

    /// Builds a rectangle from the wire's `x1 y1 x2 y2` values.
    #[must_use]
    pub fn from_bounds(x1: f64, y1: f64, x2: f64, y2: f64) -> Self {
        Self::from_corners(Point::new(x1, y1), Point::new(x2, y2))
    }

    /// Horizontal extent.
    #[must_use]
    pub fn width(&self) -> f64 {
        self.max.x - self.min.x
    }

    /// Vertical extent.
    #[must_use]
    pub fn height(&self) -> f64 {
        self.max.y - self.min.y
    }

    /// Geometric center.
    #[must_use]
    pub fn center(&self) -> Point {
        Point::new(
            (self.min.x + self.max.x) / 2.0,
            (self.min.y + self.max.y) / 2.0,
        )
    }

    /// Inclusive containment: points on the boundary are inside.
    #[must_use]
    pub fn contains(&self, point: Point) -> bool {
        point.x >= self.min.x
            && point.x <= self.max.x
            && point.y >= self.min.y
            && point.y <= self.max.y
    }

    /// Inclusive overlap test; touching edges count as intersecting.
    #[must_use]
    pub fn intersects(&self, other: &Self) -> bool {
        self.min.x <= other.max.x
            && self.max.x >= other.min.x
            && self.min.y <= other.max.y
            && self.max.y >= other.min.y
    }

    /// The four corners in waypoint order:
    /// `(x1, y1)`, `(x1, y2)`, `(x2, y1)`, `(x2, y2)`.
    #[must_use]
    pub fn corners(&self) -> [Point; 4] {
        [
            Point::new(self.min.x, self.min.y),
            Point::new(self.min.x, self.max.y),
            Point::new(self.max.x, self.min.y),
            Point::new(self.max.x, self.max.y),
        ]
    }

    /// Boundary path in traversal order, starting at `(x1, y1)` and going
    /// through `(x2, y1)`, `(x2, y2)`, `(x1, y2)`. The path is implicitly closed.
    #[must_use]
    pub fn outline(&self) -> [Point; 4] {
        [
            Point::new(self.min.x, self.min.y),
            Point::new(self.max.x, self.min.y),
            Point::new(self.max.x, self.max.y),
            Point::new(self.min.x, self.max.y),
        ]
    }
}

/// Directed line segment.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    /// First endpoint.
    pub start: Point,
    /// Second endpoint.
    pub end: Point,
}

impl Segment {
    /// Creates a segment.
    #[must_use]
    pub const fn new(start: Point, end: Point) -> Self {
        Self { start, end }
    }

    /// Euclidean length.
    #[must_use]
    pub fn length(&self) -> f64 {
        self.start.distance_to(self.end)
    }

    /// True when both endpoints coincide.
    #[must_use]
    pub fn is_degenerate(&self) -> bool {
        self.start == self.end
    }

    /// Intersection point with `other`, see [`segment_intersection`].
    #[must_use]
    pub fn intersection(&self, other: &Self) -> Option<Point> {
        segment_intersection(self.start, self.end, other.start, other.end)
    }
}

/// Distance and bearing of a target relative to an agent pose.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Polar {
    /// Euclidean distance.
    pub distance: f64,
    /// Bearing in `[-π, π]`, relative to the agent's pitch.
    pub bearing: f64,
}

/// Position plus heading of an agent.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Pose {
    /// Center of mass.
    pub position: Point,
    /// Heading in radians.
    pub pitch: f64,
}

impl Pose {
    /// Creates a pose.
    #[must_use]
    pub const fn new(position: Point, pitch: f64) -> Self {
        Self { position, pitch }
    }
}

/// Grows `rect` by `margin` on every side (gap and security areas).
#[must_use]
pub fn outset_rect(rect: &Rect, margin: f64) -> Rect {
    Rect {
        min: Point::new(rect.min.x - margin, rect.min.y - margin),
        max: Point::new(rect.max.x + margin, rect.max.y + margin),
    }
}

/// Shrinks `rect` by `margin` on every side (minimum visual-system area).
///
/// When the margin exceeds half of an extent, that axis collapses onto the
/// rectangle's center line instead of inverting.
#[must_use]
pub fn inset_rect(rect: &Rect, margin: f64) -> Rect {
    let center = rect.center();
    let (min_x, max_x) = if rect.width() >= 2.0 * margin {
        (rect.min.x + margin, rect.max.x - margin)
    } else {
        (center.x, center.x)
    };
    let (min_y, max_y) = if rect.height() >= 2.0 * margin {
        (rect.min.y + margin, rect.max.y - margin)
    } else {
        (center.y, center.y)
    };
    Rect {
        min: Point::new(min_x, min_y),
        max: Point::new(max_x, max_y),
    }
}

/// Decomposes a closed path into its boundary segments in traversal order.
///
/// The closing segment from the last vertex back to the first is added
/// unless the path already ends where it started. Zero-length segments
/// (repeated vertices) are skipped.
#[must_use]
pub fn polygon_edges(vertices: &[Point]) -> Vec<Segment> {
    let Some((&first, rest)) = vertices.split_first() else {
        return Vec::new();
    };
    let mut edges = Vec::with_capacity(vertices.len());
    let mut last = first;
    for &vertex in rest {
        let edge = Segment::new(last, vertex);
        if !edge.is_degenerate() {
            edges.push(edge);
        }
        last = vertex;
    }
    let closing = Segment::new(last, first);
    if !closing.is_degenerate() {
        edges.push(closing);
    }
    edges
}

fn cross(o: Point, a: Point, b: Point) -> f64 {
    (a.x - o.x) * (b.y - o.y) - (a.y - o.y) * (b.x - o.x)
}

fn within_extent(a: Point, b: Point, p: Point) -> bool {
    p.x >= a.x.min(b.x) && p.x <= a.x.max(b.x) && p.y >= a.y.min(b.y) && p.y <= a.y.max(b.y)
}

/// Inclusive segment-segment test: touching endpoints and collinear overlap
/// both count as intersecting.
#[must_use]
pub fn segments_intersect(a1: Point, a2: Point, b1: Point, b2: Point) -> bool {
    let d1 = cross(b1, b2, a1);
    let d2 = cross(b1, b2, a2);
    let d3 = cross(a1, a2, b1);
    let d4 = cross(a1, a2, b2);
    if ((d1 > 0.0 && d2 < 0.0) || (d1 < 0.0 && d2 > 0.0))
        && ((d3 > 0.0 && d4 < 0.0) || (d3 < 0.0 && d4 > 0.0))
    {
        return true;
    }
    (d1 == 0.0 && within_extent(b1, b2, a1))
        || (d2 == 0.0 && within_extent(b1, b2, a2))
        || (d3 == 0.0 && within_extent(a1, a2, b1))
        || (d4 == 0.0 && within_extent(a1, a2, b2))
}

/// Intersection point of segments `a1-a2` and `b1-b2`.
///
/// Returns `None` when the segments do not meet, and also when they are
/// parallel or collinear (zero determinant), even if they overlap.
#[must_use]
pub fn segment_intersection(a1: Point, a2: Point, b1: Point, b2: Point) -> Option<Point> {
    if !segments_intersect(a1, a2, b1, b2) {
        return None;
    }
    let det = (a1.x - a2.x) * (b1.y - b2.y) - (a1.y - a2.y) * (b1.x - b2.x);
    if det == 0.0 {
        return None;
    }
    let a_cross = a1.x * a2.y - a1.y * a2.x;
    let b_cross = b1.x * b2.y - b1.y * b2.x;
    let x = ((b1.x - b2.x) * a_cross - (a1.x - a2.x) * b_cross) / det;
    let y = ((b1.y - b2.y) * a_cross - (a1.y - a2.y) * b_cross) / det;
    Some(Point::new(x, y))
}

/// Hits closer than this to an earlier hit count as the same point.
const HIT_TOLERANCE: f64 = 1e-9;

/// Every distinct intersection of `ray` with the given boundary edges, in
/// edge order. A ray through a vertex shared by two edges yields it once.
#[must_use]
pub fn hit_points(edges: &[Segment], ray: &Segment) -> Vec<Point> {
    let mut hits: Vec<Point> = Vec::new();
    for hit in edges.iter().filter_map(|edge| edge.intersection(ray)) {
        if hits.iter().all(|seen| seen.distance_to(hit) > HIT_TOLERANCE) {
            hits.push(hit);
        }
    }
    hits
}

/// Horizontal half-angle of the camera frustum.
///
/// `aspect_ratio` is environment width over height, `fov_y` the vertical
/// field of view in radians.
#[must_use]
pub fn half_angle_fov_x(aspect_ratio: f64, fov_y: f64, far_distance: f64) -> f64 {
    let far_width = 2.0 * far_distance * aspect_ratio * (fov_y / 2.0).tan();
    let half_width = far_width / 2.0;
    (half_width / far_distance.hypot(half_width)).asin()
}

/// One far-plane corner of the perceptual cone, `angle` radians off the pitch.
///
/// The cone is treated as an isosceles triangle of height `far_distance`,
/// whose sides measure `2 * far * sqrt(3) / 3`.
#[must_use]
pub fn far_plane_corner(origin: Point, pitch: f64, far_distance: f64, angle: f64) -> Point {
    let side = 2.0 * far_distance * 3f64.sqrt() / 3.0;
    let alpha = pitch + angle;
    Point::new(
        origin.x + side * alpha.cos(),
        origin.y + side * alpha.sin(),
    )
}

/// Field-of-view triangle: apex at `origin`, then the far corners at
/// `pitch + half_angle` and `pitch - half_angle`.
#[must_use]
pub fn field_of_view_triangle(
    origin: Point,
    pitch: f64,
    far_distance: f64,
    half_angle: f64,
) -> [Point; 3] {
    [
        origin,
        far_plane_corner(origin, pitch, far_distance, half_angle),
        far_plane_corner(origin, pitch, far_distance, -half_angle),
    ]
}

/// Inclusive point-in-rectangle test.
#[must_use]
pub fn point_in_rect(rect: &Rect, point: Point) -> bool {
    rect.contains(point)
}

/// Axis-aligned bounding box of a vertex list.
#[must_use]
pub fn polygon_bounds(vertices: &[Point]) -> Option<Rect> {
    let (&first, rest) = vertices.split_first()?;
    let mut bounds = Rect {
        min: first,
        max: first,
    };
    for vertex in rest {
        bounds.min.x = bounds.min.x.min(vertex.x);
        bounds.min.y = bounds.min.y.min(vertex.y);
        bounds.max.x = bounds.max.x.max(vertex.x);
        bounds.max.y = bounds.max.y.max(vertex.y);
    }
    Some(bounds)
}

/// True when `rect` overlaps the bounding box of `polygon` (inclusive).
/// An empty polygon intersects nothing.
#[must_use]
pub fn rect_intersects_polygon_bounds(rect: &Rect, polygon: &[Point]) -> bool {
    polygon_bounds(polygon).is_some_and(|bounds| rect.intersects(&bounds))
}

/// Wraps an angle into `[-π, π]`.
#[must_use]
pub fn normalize_angle(mut angle: f64) -> f64 {
    if !angle.is_finite() {
        return 0.0;
    }
    while angle > PI {
        angle -= TAU;
    }
    while angle < -PI {
        angle += TAU;
    }
    angle
}

/// Polar coordinates of `target` as seen from `pose`.
///
/// The bearing is `-pitch - atan2(-dy, dx)`, normalised to `[-π, π]`.
#[must_use]
pub fn xy_to_polar(pose: &Pose, target: Point) -> Polar {
    let dx = target.x - pose.position.x;
    let dy = target.y - pose.position.y;
    Polar {
        distance: dx.hypot(dy),
        bearing: normalize_angle(-pose.pitch - (-dy).atan2(dx)),
    }
}

/// Direct gaze ray of length `range` from the pose along its pitch.
#[must_use]
pub fn gaze_ray(pose: &Pose, range: f64) -> Segment {
    Segment::new(
        pose.position,
        Point::new(
            pose.position.x + range * pose.pitch.cos(),
            pose.position.y + range * pose.pitch.sin(),
        ),
    )
}
