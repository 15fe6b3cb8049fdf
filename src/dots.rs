use glam::Vec2;

use crate::field::deform;
use crate::noise::smoothstep;
use crate::snapshot::{DotParams, FrameParams};

const NEIGHBORHOOD: f32 = 9.0;

/// Dot coverage at one pixel plus the neighbourhood averages the grain layer
/// reuses.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DotSample {
    pub alpha: f32,
    pub mean_influence: f32,
    pub mean_dirness: f32,
}

pub fn opacity_cap(dots: &DotParams) -> f32 {
    dots.base_opacity.max(dots.final_opacity).clamp(0.05, 1.0)
}

pub fn edge_softness(dots: &DotParams) -> f32 {
    (1.05 / dots.sharpness.max(0.1)).clamp(0.35, 1.6)
}

/// Rasterise the grid at pixel centre `p`. The nine nearest cells are checked
/// so dots displaced across a cell border are still drawn; overlapping dots
/// resolve to the brightest one.
pub fn sample_dots(frame: &FrameParams, p: Vec2) -> DotSample {
    let spacing = frame.spacing.max(2.0);
    let cell = (p / spacing).floor();
    let dots = &frame.dots;
    let cap = opacity_cap(dots);
    let edge_soft = edge_softness(dots);

    let mut best_alpha = 0.0_f32;
    let mut sum_influence = 0.0;
    let mut sum_dirness = 0.0;

    for oy in -1..=1 {
        for ox in -1..=1 {
            let center = (cell + Vec2::new(ox as f32, oy as f32) + 0.5) * spacing;
            let cell_field = deform(frame, center);
            sum_influence += cell_field.influence;
            sum_dirness += cell_field.dirness;

            let rim_lift = dots.roundness * cell_field.shell_profile * cell_field.influence;
            let shaped = cell_field.influence * (0.18 + cell_field.frontness * 0.22) + rim_lift * 0.2;
            let alpha = (dots.base_opacity + shaped * cap).clamp(0.0, cap);
            let size = dots.size
                + cell_field.influence * (0.34 + cell_field.frontness * 0.24)
                + rim_lift * 0.16;

            let dist = p.distance(cell_field.position);
            let mask = 1.0 - smoothstep(size - edge_soft, size + edge_soft, dist);
            best_alpha = best_alpha.max(alpha * mask);
        }
    }

    DotSample {
        alpha: best_alpha.clamp(0.0, 1.0),
        mean_influence: sum_influence / NEIGHBORHOOD,
        mean_dirness: sum_dirness / NEIGHBORHOOD,
    }
}

#[cfg(test)]
mod tests {
    use glam::DVec2;

    use super::*;
    use crate::schema::EffectConfig;
    use crate::snapshot::ConfigSnapshot;

    fn frame(config: &EffectConfig, contact: DVec2) -> FrameParams {
        FrameParams::new(
            &ConfigSnapshot::from_config(config),
            contact,
            DVec2::X,
            1.0,
            480,
            480,
        )
    }

    #[test]
    fn far_field_dot_center_shows_base_opacity() {
        let config = EffectConfig::default();
        let params = frame(&config, DVec2::new(-5_000.0, -5_000.0));
        let center = Vec2::new(24.0 * 3.5, 24.0 * 4.5);
        let sample = sample_dots(&params, center);
        assert!((sample.alpha - config.dot_opacity).abs() < 1e-6);
        assert!(sample.mean_influence < 1e-9);
    }

    #[test]
    fn gaps_between_dots_are_empty_far_from_contact() {
        let params = frame(&EffectConfig::default(), DVec2::new(-5_000.0, -5_000.0));
        let sample = sample_dots(&params, Vec2::new(24.0 * 3.0 + 0.5, 24.0 * 4.0 + 0.5));
        assert_eq!(sample.alpha, 0.0);
    }

    #[test]
    fn dots_near_contact_are_brighter_than_far_dots() {
        let config = EffectConfig::default();
        let near = frame(&config, DVec2::new(24.0 * 5.5, 24.0 * 5.5));
        let far = frame(&config, DVec2::new(-5_000.0, -5_000.0));
        let p = Vec2::new(24.0 * 5.5, 24.0 * 5.5);
        let near_sample = sample_dots(&near, p);
        let far_sample = sample_dots(&far, p);
        assert!(near_sample.alpha > far_sample.alpha);
        assert!(near_sample.alpha <= opacity_cap(&near.dots) + 1e-6);
        assert!(near_sample.mean_influence > 0.9);
    }

    #[test]
    fn edge_softness_is_clamped() {
        let mut dots = frame(&EffectConfig::default(), DVec2::ZERO).dots;
        dots.sharpness = 0.0;
        assert_eq!(edge_softness(&dots), 1.6);
        dots.sharpness = 100.0;
        assert_eq!(edge_softness(&dots), 0.35);
    }

    #[test]
    fn alpha_never_exceeds_unit_interval() {
        let config = EffectConfig {
            dot_final_opacity: 1.0,
            ball_roundness: 1.2,
            dot_size: 2.4,
            ..EffectConfig::default()
        };
        let params = frame(&config, DVec2::new(240.0, 240.0));
        for y in (0..480).step_by(7) {
            for x in (0..480).step_by(7) {
                let sample = sample_dots(&params, Vec2::new(x as f32 + 0.5, y as f32 + 0.5));
                assert!((0.0..=1.0).contains(&sample.alpha));
                assert!((-1.0..=1.0).contains(&sample.mean_dirness));
            }
        }
    }
}
