//! Spot search
//!
//! Finds somewhere a sticker can go, within a fixed attempt budget:
//! - First `jitter_fraction` of attempts: Gaussian scatter around the
//!   preferred point, with a spread that widens each attempt (capped)
//! - Remaining attempts: uniform over the region's bounding box
//!
//! A candidate is accepted only if the validator and the collision index both
//! pass. Exhausting the budget yields None; callers must surface that.

use std::f32::consts::TAU;

use glam::Vec2;
use rand::Rng;

use super::collision::CollisionIndex;
use crate::geometry::SpotValidator;
use crate::settings::EngineSettings;

/// Standard normal 2D sample (Box-Muller)
fn gaussian<R: Rng + ?Sized>(rng: &mut R) -> Vec2 {
    let u1 = rng.random::<f32>().max(f32::MIN_POSITIVE);
    let u2 = rng.random::<f32>();
    let magnitude = (-2.0 * u1.ln()).sqrt();
    let (sin, cos) = (TAU * u2).sin_cos();
    Vec2::new(magnitude * cos, magnitude * sin)
}

pub struct SpotSearch<'a> {
    validator: &'a SpotValidator,
    index: &'a CollisionIndex,
    settings: &'a EngineSettings,
}

impl<'a> SpotSearch<'a> {
    pub fn new(
        validator: &'a SpotValidator,
        index: &'a CollisionIndex,
        settings: &'a EngineSettings,
    ) -> Self {
        Self {
            validator,
            index,
            settings,
        }
    }

    /// Inside the region and clear of every other sticker
    #[inline]
    pub fn is_available(&self, point: Vec2) -> bool {
        self.validator.is_valid_spot(point) && !self.index.is_overlapping(point)
    }

    /// Jitter spread for a given attempt
    fn jitter_radius(&self, attempt: u32) -> f32 {
        let s = self.settings;
        (s.jitter_base_radius + s.jitter_growth * attempt as f32).min(s.jitter_max_radius)
    }

    pub fn find_available_spot<R: Rng + ?Sized>(
        &self,
        preferred: Option<Vec2>,
        rng: &mut R,
    ) -> Option<Vec2> {
        let bounds = self.validator.region().bounds()?;
        let attempts = self.settings.search_attempts;
        let jitter_attempts = match preferred {
            Some(_) => self.settings.jitter_attempts(),
            None => 0,
        };

        for attempt in 0..attempts {
            let candidate = match preferred {
                Some(anchor) if attempt < jitter_attempts => {
                    anchor + gaussian(rng) * self.jitter_radius(attempt)
                }
                _ => bounds.lerp(Vec2::new(rng.random(), rng.random())),
            };
            if self.is_available(candidate) {
                log::debug!("Found spot {candidate} after {} attempt(s)", attempt + 1);
                return Some(candidate);
            }
        }

        log::warn!("No free spot after {attempts} attempts");
        None
    }

    /// Walk from a rejected point toward `reference` in fixed steps and take
    /// the first available point
    pub fn nearest_valid_spot(&self, rejected: Vec2, reference: Vec2) -> Option<Vec2> {
        let steps = self.settings.nearest_steps.max(1);
        (1..=steps)
            .map(|step| rejected.lerp(reference, step as f32 / steps as f32))
            .find(|p| self.is_available(*p))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{CanvasSize, Region};
    use proptest::prelude::*;
    use rand::SeedableRng;
    use rand_pcg::Pcg32;

    fn validator(size: f32) -> SpotValidator {
        SpotValidator::new(
            Region::rect(CanvasSize::new(400.0, 400.0), Vec2::ZERO, Vec2::splat(size)),
            18.0,
        )
    }

    #[test]
    fn test_prefers_nearby_spot() {
        let validator = validator(400.0);
        let settings = EngineSettings::default();
        let anchor = Vec2::new(200.0, 200.0);
        let index = CollisionIndex::new(36.0, [anchor]);
        let search = SpotSearch::new(&validator, &index, &settings);

        let mut rng = Pcg32::seed_from_u64(1);
        let spot = search.find_available_spot(Some(anchor), &mut rng).unwrap();
        assert!(spot.distance(anchor) >= 36.0);
        // Found during the jitter phase, not by a box-wide uniform draw
        assert!(spot.distance(anchor) < 240.0);
    }

    #[test]
    fn test_no_space_returns_none() {
        // 20x20 region can't fit a radius-18 disc anywhere
        let validator = validator(20.0);
        let settings = EngineSettings::default();
        let index = CollisionIndex::new(36.0, []);
        let search = SpotSearch::new(&validator, &index, &settings);

        let mut rng = Pcg32::seed_from_u64(2);
        assert_eq!(search.find_available_spot(Some(Vec2::splat(10.0)), &mut rng), None);
        assert_eq!(search.find_available_spot(None, &mut rng), None);
    }

    #[test]
    fn test_full_region_returns_none() {
        // Only spot that fits a radius-18 disc in a 36 square is its center
        let validator = validator(36.0);
        let settings = EngineSettings::default();
        let index = CollisionIndex::new(36.0, [Vec2::splat(18.0)]);
        let search = SpotSearch::new(&validator, &index, &settings);
        let mut rng = Pcg32::seed_from_u64(3);
        assert_eq!(search.find_available_spot(None, &mut rng), None);
    }

    #[test]
    fn test_nearest_valid_spot_pulls_inside() {
        let validator = validator(400.0);
        let settings = EngineSettings::default();
        let index = CollisionIndex::new(36.0, []);
        let search = SpotSearch::new(&validator, &index, &settings);

        let outside = Vec2::new(-50.0, 200.0);
        let center = Vec2::new(200.0, 200.0);
        let spot = search.nearest_valid_spot(outside, center).unwrap();
        assert!(validator.is_valid_spot(spot));
        // First step that fits: x = -50 + 250 * k/20 >= 18
        assert_eq!(spot, outside.lerp(center, 6.0 / 20.0));
    }

    #[test]
    fn test_nearest_valid_spot_none_for_empty_region() {
        let settings = EngineSettings::default();
        let region = Region::new(CanvasSize::new(400.0, 400.0), Vec::new());
        let empty = SpotValidator::new(region, 18.0);
        let index = CollisionIndex::new(36.0, []);
        let search = SpotSearch::new(&empty, &index, &settings);
        assert_eq!(search.nearest_valid_spot(Vec2::ZERO, Vec2::splat(200.0)), None);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn prop_found_spots_are_valid_and_clear(
            seed in any::<u64>(),
            occupied in prop::collection::vec((0.0f32..300.0, 0.0f32..300.0), 0..40),
            preferred in prop::option::of((0.0f32..300.0, 0.0f32..300.0)),
        ) {
            let validator = validator(300.0);
            let settings = EngineSettings::default();
            let index = CollisionIndex::new(36.0, occupied.into_iter().map(|(x, y)| Vec2::new(x, y)));
            let search = SpotSearch::new(&validator, &index, &settings);
            let mut rng = Pcg32::seed_from_u64(seed);

            if let Some(spot) = search.find_available_spot(preferred.map(|(x, y)| Vec2::new(x, y)), &mut rng) {
                prop_assert!(validator.is_valid_spot(spot));
                prop_assert!(!index.is_overlapping(spot));
            }
        }
    }
}
