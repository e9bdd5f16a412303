//! Spot validation: does a sticker disc fit inside the region?
//!
//! Exact circle-in-polygon needs clipping. Instead nine samples are tested:
//! the center plus eight points on the rim (four cardinal, four diagonal).
//! Each sample must be inside at least one path; paths combine by union.

use glam::Vec2;
use std::f32::consts::FRAC_1_SQRT_2;

use super::region::Region;

/// Sample constellation around a candidate center
pub fn sample_offsets(radius: f32) -> [Vec2; 9] {
    let d = radius * FRAC_1_SQRT_2;
    [
        Vec2::ZERO,
        Vec2::new(radius, 0.0),
        Vec2::new(-radius, 0.0),
        Vec2::new(0.0, radius),
        Vec2::new(0.0, -radius),
        Vec2::new(d, d),
        Vec2::new(d, -d),
        Vec2::new(-d, d),
        Vec2::new(-d, -d),
    ]
}

/// True iff every sample around `point` is inside the region
pub fn is_valid_spot(region: &Region, point: Vec2, radius: f32) -> bool {
    sample_offsets(radius)
        .iter()
        .all(|offset| region.contains(point + *offset))
}

/// A region bound to the sticker radius it validates for
#[derive(Debug, Clone)]
pub struct SpotValidator {
    region: Region,
    radius: f32,
}

impl SpotValidator {
    pub fn new(region: Region, radius: f32) -> Self {
        Self { region, radius }
    }

    pub fn region(&self) -> &Region {
        &self.region
    }

    #[inline]
    pub fn is_valid_spot(&self, point: Vec2) -> bool {
        is_valid_spot(&self.region, point, self.radius)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{CanvasSize, Polygon};
    use proptest::prelude::*;

    fn square_region() -> Region {
        Region::rect(CanvasSize::new(400.0, 400.0), Vec2::ZERO, Vec2::splat(100.0))
    }

    fn u_region() -> Region {
        Region::new(
            CanvasSize::new(400.0, 400.0),
            vec![Polygon::new(vec![
                Vec2::new(0.0, 0.0),
                Vec2::new(300.0, 0.0),
                Vec2::new(300.0, 300.0),
                Vec2::new(200.0, 300.0),
                Vec2::new(200.0, 100.0),
                Vec2::new(100.0, 100.0),
                Vec2::new(100.0, 300.0),
                Vec2::new(0.0, 300.0),
            ])],
        )
    }

    /// Square frame (outer 300, hole 100..200) assembled from four pieces
    fn frame_region() -> Region {
        Region::new(
            CanvasSize::new(400.0, 400.0),
            vec![
                Polygon::rect(Vec2::new(0.0, 0.0), Vec2::new(300.0, 100.0)),
                Polygon::rect(Vec2::new(0.0, 200.0), Vec2::new(300.0, 300.0)),
                Polygon::rect(Vec2::new(0.0, 100.0), Vec2::new(100.0, 200.0)),
                Polygon::rect(Vec2::new(200.0, 100.0), Vec2::new(300.0, 200.0)),
            ],
        )
    }

    fn in_u(p: Vec2) -> bool {
        let in_square = (0.0..=300.0).contains(&p.x) && (0.0..=300.0).contains(&p.y);
        let in_notch = p.x > 100.0 && p.x < 200.0 && p.y > 100.0;
        in_square && !in_notch
    }

    fn in_frame(p: Vec2) -> bool {
        let in_square = (0.0..=300.0).contains(&p.x) && (0.0..=300.0).contains(&p.y);
        let in_hole = p.x > 100.0 && p.x < 200.0 && p.y > 100.0 && p.y < 200.0;
        in_square && !in_hole
    }

    /// Keep samples away from the edges so the boundary tolerance can't disagree
    fn clear_of(lines: &[f32], p: Vec2, radius: f32) -> bool {
        sample_offsets(radius).iter().all(|o| {
            let s = p + *o;
            lines
                .iter()
                .all(|l| (s.x - l).abs() > 0.01 && (s.y - l).abs() > 0.01)
        })
    }

    #[test]
    fn test_center_of_square_is_valid() {
        let region = square_region();
        assert!(is_valid_spot(&region, Vec2::splat(50.0), 18.0));
        assert!(!is_valid_spot(&region, Vec2::new(10.0, 50.0), 18.0));
    }

    #[test]
    fn test_disc_touching_edge_is_valid() {
        // Rim sample lands exactly on x = 0
        let region = square_region();
        assert!(is_valid_spot(&region, Vec2::new(18.0, 50.0), 18.0));
    }

    #[test]
    fn test_disc_straddling_notch_is_invalid() {
        let region = u_region();
        // Center inside the left arm but the rim reaches into the notch
        assert!(!is_valid_spot(&region, Vec2::new(90.0, 200.0), 18.0));
        assert!(is_valid_spot(&region, Vec2::new(50.0, 200.0), 18.0));
    }

    #[test]
    fn test_validator_wrapper() {
        let validator = SpotValidator::new(square_region(), 18.0);
        assert!(validator.is_valid_spot(Vec2::splat(50.0)));
        assert!(!validator.is_valid_spot(Vec2::splat(90.0)));
    }

    proptest! {
        #[test]
        fn prop_square_matches_analytic(x in -50.0f32..150.0, y in -50.0f32..150.0, r in 1.0f32..40.0) {
            let p = Vec2::new(x, y);
            prop_assume!(clear_of(&[0.0, 100.0], p, r));
            // Diagonal samples sit inside the axis extremes, so the axes decide
            let expected = x - r >= 0.0 && x + r <= 100.0 && y - r >= 0.0 && y + r <= 100.0;
            prop_assert_eq!(is_valid_spot(&square_region(), p, r), expected);
        }

        #[test]
        fn prop_concave_matches_samples(x in -20.0f32..320.0, y in -20.0f32..320.0, r in 1.0f32..40.0) {
            let p = Vec2::new(x, y);
            prop_assume!(clear_of(&[0.0, 100.0, 200.0, 300.0], p, r));
            let expected = sample_offsets(r).iter().all(|o| in_u(p + *o));
            prop_assert_eq!(is_valid_spot(&u_region(), p, r), expected);
        }

        #[test]
        fn prop_frame_union_matches_samples(x in -20.0f32..320.0, y in -20.0f32..320.0, r in 1.0f32..40.0) {
            let p = Vec2::new(x, y);
            prop_assume!(clear_of(&[0.0, 100.0, 200.0, 300.0], p, r));
            let expected = sample_offsets(r).iter().all(|o| in_frame(p + *o));
            prop_assert_eq!(is_valid_spot(&frame_region(), p, r), expected);
        }
    }
}
