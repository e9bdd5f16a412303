//! Canvas space and the placeable region
//!
//! A region is an ordered set of closed polygonal paths combined by union.
//! Point-in-polygon uses the even-odd rule, with an explicit boundary test in
//! front of it so points on an edge are always inside.

use glam::Vec2;
use serde::{Deserialize, Serialize};

use super::path::{PathError, parse_path_data};

/// Distance from an edge under which a point counts as on the boundary
const EDGE_EPSILON: f32 = 1e-3;

/// Fixed coordinate space the region and all absolute positions live in
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CanvasSize {
    pub width: f32,
    pub height: f32,
}

impl CanvasSize {
    pub fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }

    /// Center of the canvas (reference point for nearest-spot correction)
    pub fn center(&self) -> Vec2 {
        Vec2::new(self.width / 2.0, self.height / 2.0)
    }

    /// Absolute position -> [0, 1] coordinates independent of canvas pixels
    pub fn normalize(&self, pos: Vec2) -> Vec2 {
        Vec2::new(pos.x / self.width, pos.y / self.height)
    }

    /// [0, 1] coordinates -> absolute position
    pub fn denormalize(&self, norm: Vec2) -> Vec2 {
        Vec2::new(norm.x * self.width, norm.y * self.height)
    }
}

/// Axis-aligned bounds
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub min: Vec2,
    pub max: Vec2,
}

impl Bounds {
    fn from_points(points: &[Vec2]) -> Option<Self> {
        let first = *points.first()?;
        let mut bounds = Self {
            min: first,
            max: first,
        };
        for p in &points[1..] {
            bounds.min = bounds.min.min(*p);
            bounds.max = bounds.max.max(*p);
        }
        Some(bounds)
    }

    fn union(self, other: Self) -> Self {
        Self {
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }

    pub fn size(&self) -> Vec2 {
        self.max - self.min
    }

    /// Map a point in the unit square onto these bounds
    pub fn lerp(&self, unit: Vec2) -> Vec2 {
        self.min + self.size() * unit
    }
}

/// A closed polygon; the last point connects back to the first
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Polygon {
    points: Vec<Vec2>,
}

impl Polygon {
    pub fn new(mut points: Vec<Vec2>) -> Self {
        // An explicit closing vertex would only add a zero-length edge
        if points.len() > 1 && points.first() == points.last() {
            points.pop();
        }
        Self { points }
    }

    /// Axis-aligned rectangle from two corners
    pub fn rect(min: Vec2, max: Vec2) -> Self {
        Self::new(vec![
            min,
            Vec2::new(max.x, min.y),
            max,
            Vec2::new(min.x, max.y),
        ])
    }

    pub fn points(&self) -> &[Vec2] {
        &self.points
    }

    pub fn bounds(&self) -> Option<Bounds> {
        Bounds::from_points(&self.points)
    }

    fn edges(&self) -> impl Iterator<Item = (Vec2, Vec2)> + '_ {
        let n = self.points.len();
        (0..n).map(move |i| (self.points[i], self.points[(i + 1) % n]))
    }

    /// True if `p` lies on one of the polygon's edges
    pub fn on_boundary(&self, p: Vec2) -> bool {
        self.edges()
            .any(|(a, b)| distance_to_segment(p, a, b) <= EDGE_EPSILON)
    }

    /// Closed point-in-polygon test (even-odd rule, boundary inclusive)
    pub fn contains(&self, p: Vec2) -> bool {
        if self.points.len() < 3 {
            return false;
        }
        if self.on_boundary(p) {
            return true;
        }

        let mut inside = false;
        for (a, b) in self.edges() {
            if (a.y > p.y) != (b.y > p.y) {
                let cross_x = (b.x - a.x) * (p.y - a.y) / (b.y - a.y) + a.x;
                if p.x < cross_x {
                    inside = !inside;
                }
            }
        }
        inside
    }
}

/// Distance from `p` to the segment `a`-`b`
fn distance_to_segment(p: Vec2, a: Vec2, b: Vec2) -> f32 {
    let seg = b - a;
    let len_sq = seg.length_squared();
    if len_sq < f32::EPSILON {
        return p.distance(a);
    }
    let t = ((p - a).dot(seg) / len_sq).clamp(0.0, 1.0);
    p.distance(a + seg * t)
}

/// The placeable area: a union of closed paths inside a fixed canvas
///
/// Immutable once built; an engine holds one for its whole session.
#[derive(Debug, Clone)]
pub struct Region {
    canvas: CanvasSize,
    paths: Vec<Polygon>,
    bounds: Option<Bounds>,
}

impl Region {
    pub fn new(canvas: CanvasSize, paths: Vec<Polygon>) -> Self {
        let bounds = paths
            .iter()
            .filter_map(Polygon::bounds)
            .reduce(Bounds::union);
        Self {
            canvas,
            paths,
            bounds,
        }
    }

    /// Build a region from SVG path data strings (one or more subpaths each)
    pub fn from_svg_paths(canvas: CanvasSize, data: &[&str]) -> Result<Self, PathError> {
        let mut paths = Vec::new();
        for d in data {
            paths.extend(parse_path_data(d)?);
        }
        log::debug!("Region built from {} path(s), {} polygon(s)", data.len(), paths.len());
        Ok(Self::new(canvas, paths))
    }

    /// Single rectangular region
    pub fn rect(canvas: CanvasSize, min: Vec2, max: Vec2) -> Self {
        Self::new(canvas, vec![Polygon::rect(min, max)])
    }

    pub fn canvas(&self) -> CanvasSize {
        self.canvas
    }

    pub fn paths(&self) -> &[Polygon] {
        &self.paths
    }

    /// Bounding box of all paths (None for an empty region)
    pub fn bounds(&self) -> Option<Bounds> {
        self.bounds
    }

    /// Union test: inside if any path contains the point
    pub fn contains(&self, p: Vec2) -> bool {
        if let Some(b) = self.bounds {
            let pad = Vec2::splat(EDGE_EPSILON);
            if p.cmplt(b.min - pad).any() || p.cmpgt(b.max + pad).any() {
                return false;
            }
        }
        self.paths.iter().any(|poly| poly.contains(p))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn canvas() -> CanvasSize {
        CanvasSize::new(400.0, 400.0)
    }

    /// U shape: 300x300 square with a 100-wide notch cut down from the top
    fn u_shape() -> Polygon {
        Polygon::new(vec![
            Vec2::new(0.0, 0.0),
            Vec2::new(300.0, 0.0),
            Vec2::new(300.0, 300.0),
            Vec2::new(200.0, 300.0),
            Vec2::new(200.0, 100.0),
            Vec2::new(100.0, 100.0),
            Vec2::new(100.0, 300.0),
            Vec2::new(0.0, 300.0),
        ])
    }

    #[test]
    fn test_square_contains() {
        let square = Polygon::rect(Vec2::ZERO, Vec2::splat(100.0));
        assert!(square.contains(Vec2::new(50.0, 50.0)));
        assert!(!square.contains(Vec2::new(150.0, 50.0)));
        assert!(!square.contains(Vec2::new(-0.5, 50.0)));
    }

    #[test]
    fn test_boundary_is_inside() {
        let square = Polygon::rect(Vec2::ZERO, Vec2::splat(100.0));
        assert!(square.contains(Vec2::new(0.0, 50.0)));
        assert!(square.contains(Vec2::new(100.0, 100.0)));
        assert!(square.contains(Vec2::new(50.0, 0.0)));
    }

    #[test]
    fn test_concave_notch_excluded() {
        let u = u_shape();
        assert!(u.contains(Vec2::new(50.0, 250.0)));
        assert!(u.contains(Vec2::new(250.0, 250.0)));
        assert!(u.contains(Vec2::new(150.0, 50.0)));
        assert!(!u.contains(Vec2::new(150.0, 200.0)));
        // Notch walls are boundary
        assert!(u.contains(Vec2::new(100.0, 200.0)));
    }

    #[test]
    fn test_closing_vertex_dropped() {
        let poly = Polygon::new(vec![
            Vec2::ZERO,
            Vec2::new(10.0, 0.0),
            Vec2::new(10.0, 10.0),
            Vec2::ZERO,
        ]);
        assert_eq!(poly.points().len(), 3);
    }

    #[test]
    fn test_region_union_of_disjoint_paths() {
        let region = Region::new(
            canvas(),
            vec![
                Polygon::rect(Vec2::ZERO, Vec2::splat(50.0)),
                Polygon::rect(Vec2::splat(200.0), Vec2::splat(250.0)),
            ],
        );
        assert!(region.contains(Vec2::new(25.0, 25.0)));
        assert!(region.contains(Vec2::new(225.0, 225.0)));
        assert!(!region.contains(Vec2::new(100.0, 100.0)));

        let bounds = region.bounds().unwrap();
        assert_eq!(bounds.min, Vec2::ZERO);
        assert_eq!(bounds.max, Vec2::splat(250.0));
    }

    #[test]
    fn test_empty_region_contains_nothing() {
        let region = Region::new(canvas(), Vec::new());
        assert!(region.bounds().is_none());
        assert!(!region.contains(Vec2::new(1.0, 1.0)));
    }

    #[test]
    fn test_normalize_roundtrip() {
        let canvas = CanvasSize::new(800.0, 400.0);
        let norm = canvas.normalize(Vec2::new(200.0, 100.0));
        assert_eq!(norm, Vec2::new(0.25, 0.25));
        assert_eq!(canvas.denormalize(norm), Vec2::new(200.0, 100.0));
    }
}
