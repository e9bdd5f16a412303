//! SVG path data -> polygons
//!
//! Parsing and curve flattening are kurbo's. Every subpath becomes one closed
//! polygon; open subpaths are closed implicitly, matching how a fill treats
//! them.

use glam::Vec2;
use kurbo::{BezPath, PathEl, Point};
use thiserror::Error;

use super::region::Polygon;

/// Max distance between a curve and its flattened segments, in canvas units
const FLATTEN_TOLERANCE: f64 = 0.25;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum PathError {
    #[error("invalid path data {data:?}: {reason}")]
    Syntax { data: String, reason: String },
}

fn to_vec2(p: Point) -> Vec2 {
    Vec2::new(p.x as f32, p.y as f32)
}

/// Collects flattened path elements into polygons
#[derive(Default)]
struct PolygonBuilder {
    polygons: Vec<Polygon>,
    current: Vec<Vec2>,
    start: Vec2,
}

impl PolygonBuilder {
    fn push(&mut self, el: PathEl) {
        match el {
            PathEl::MoveTo(p) => {
                self.flush();
                self.start = to_vec2(p);
                self.current.push(self.start);
            }
            PathEl::LineTo(p) => {
                // Drawing on after a close continues from the subpath start
                if self.current.is_empty() {
                    self.current.push(self.start);
                }
                self.current.push(to_vec2(p));
            }
            PathEl::ClosePath => self.flush(),
            // `flatten` only hands out lines
            PathEl::QuadTo(_, p) | PathEl::CurveTo(_, _, p) => self.current.push(to_vec2(p)),
        }
    }

    /// Fewer than three points encloses nothing
    fn flush(&mut self) {
        if self.current.len() >= 3 {
            self.polygons.push(Polygon::new(std::mem::take(&mut self.current)));
        } else {
            self.current.clear();
        }
    }

    fn finish(mut self) -> Vec<Polygon> {
        self.flush();
        self.polygons
    }
}

/// Parse SVG path data into closed polygons, one per subpath
pub fn parse_path_data(d: &str) -> Result<Vec<Polygon>, PathError> {
    let path = BezPath::from_svg(d).map_err(|err| PathError::Syntax {
        data: d.to_string(),
        reason: err.to_string(),
    })?;

    let mut builder = PolygonBuilder::default();
    kurbo::flatten(&path, FLATTEN_TOLERANCE, |el| builder.push(el));
    Ok(builder.finish())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn near(a: Vec2, b: Vec2) -> bool {
        a.distance(b) < 1e-3
    }

    #[test]
    fn test_absolute_square() {
        let polys = parse_path_data("M0,0 L100,0 L100,100 L0,100 Z").unwrap();
        assert_eq!(polys.len(), 1);
        assert_eq!(polys[0].points().len(), 4);
        assert!(polys[0].contains(Vec2::new(50.0, 50.0)));
    }

    #[test]
    fn test_relative_and_axis_commands() {
        let polys = parse_path_data("m10 10 h80 v80 h-80 z").unwrap();
        let pts = polys[0].points();
        assert_eq!(pts.len(), 4);
        assert!(near(pts[0], Vec2::new(10.0, 10.0)));
        assert!(near(pts[1], Vec2::new(90.0, 10.0)));
        assert!(near(pts[2], Vec2::new(90.0, 90.0)));
        assert!(near(pts[3], Vec2::new(10.0, 90.0)));
    }

    #[test]
    fn test_multiple_subpaths() {
        let polys = parse_path_data("M0 0h10v10h-10z M20 20h10v10h-10z").unwrap();
        assert_eq!(polys.len(), 2);
        assert!(polys[1].contains(Vec2::new(25.0, 25.0)));
        assert!(!polys[0].contains(Vec2::new(25.0, 25.0)));
    }

    #[test]
    fn test_open_subpath_is_closed() {
        let polys = parse_path_data("M0 0 L50 0 L50 50").unwrap();
        assert_eq!(polys.len(), 1);
        assert!(polys[0].contains(Vec2::new(40.0, 10.0)));
    }

    #[test]
    fn test_curves_flatten_through_endpoint() {
        let polys = parse_path_data("M0 0 C0 50 100 50 100 0 Q50 -50 0 0 Z").unwrap();
        let pts = polys[0].points();
        assert!(pts.iter().any(|p| near(*p, Vec2::new(100.0, 0.0))));
        // Bulge below the chord comes from the cubic, above it from the quad
        assert!(polys[0].contains(Vec2::new(50.0, 20.0)));
        assert!(polys[0].contains(Vec2::new(50.0, -20.0)));
    }

    #[test]
    fn test_smooth_curves_and_arcs() {
        let smooth = parse_path_data("M0 0 C0 50 100 50 100 0 S200 -50 200 0 L200 100 L0 100 Z");
        assert_eq!(smooth.unwrap().len(), 1);
        let quad = parse_path_data("M0 0 Q50 50 100 0 T200 0 L200 100 L0 100 Z");
        assert_eq!(quad.unwrap().len(), 1);

        // Half-disc of radius 50 on the right edge of a square
        let arc = parse_path_data("M0 0 L100 0 A50 50 0 0 1 100 100 L0 100 Z").unwrap();
        let bounds = arc[0].bounds().unwrap();
        assert!((bounds.max.x - 150.0).abs() < 1.0);
        assert!(arc[0].contains(Vec2::new(140.0, 50.0)));
        assert!(!arc[0].contains(Vec2::new(140.0, 10.0)));
    }

    #[test]
    fn test_invalid_data() {
        assert!(matches!(
            parse_path_data("M0 0 X10 10"),
            Err(PathError::Syntax { .. })
        ));
        assert!(parse_path_data("M0 0 L10").is_err());
    }

    #[test]
    fn test_empty_data() {
        assert!(parse_path_data("").unwrap().is_empty());
    }
}
