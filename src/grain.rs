//! Directional grain: a noise-thresholded speckle field anchored slightly
//! ahead of (or behind) the contact point.
//!
//! Evaluation order per pixel:
//! 1. radial base density around the grain centre, under the active shape;
//! 2. a domain mask that zeroes everything outside the grain region before
//!    any noise is sampled;
//! 3. radial and directional density terms, refined by coverage, lift,
//!    contrast, breakup, centre suppression, gamma, density scale and the
//!    falloff-onset fade;
//! 4. a per-pixel hash compared against a density-derived threshold;
//! 5. a two-colour split along the motion direction, mixed in linear light.

use glam::Vec2;

use crate::color::Rgb;
use crate::dots::DotSample;
use crate::noise::{hash12, mix, smoothstep};
use crate::schema::GrainBackground;
use crate::shape::shape_norm;
use crate::snapshot::{FrameParams, GrainParams};

const CENTER_OFFSET: f32 = 0.7;
const COORD_OFFSET: f32 = 0.55;
const GRAIN_OCTAVES: [(f32, Vec2, f32); 3] = [
    (0.73, Vec2::new(23.4, 17.9), 0.52),
    (1.91, Vec2::new(-11.1, 43.7), 0.33),
    (3.27, Vec2::new(57.2, -8.6), 0.15),
];
const BLOB_EDGE_ENERGY: f32 = 4.6;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GrainSample {
    /// Final grain alpha after side opacity and luminance boosts.
    pub alpha: f32,
    /// Grain colour in display (gamma) space.
    pub color: Rgb,
    /// Smooth 0..1 membership in the grain region.
    pub domain_mask: f32,
    /// Extra near-white glow strength (light backgrounds only).
    pub glow: f32,
}

/// Density stage output, before colour.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GrainDensity {
    pub shifted_influence: f32,
    pub domain_mask: f32,
    pub density: f32,
    /// Visibility mask from the threshold test.
    pub mask: f32,
}

impl GrainDensity {
    fn empty(shifted_influence: f32, domain_mask: f32) -> Self {
        Self {
            shifted_influence,
            domain_mask,
            density: 0.0,
            mask: 0.0,
        }
    }
}

pub fn grain_center(frame: &FrameParams) -> Vec2 {
    frame.contact + frame.direction * (frame.grain.offset * frame.radius.max(1.0) * CENTER_OFFSET)
}

/// `mix(1, smoothstep(-0.2, 0.8, dirness * bias), |bias|)`: 1 everywhere for
/// zero bias, otherwise favouring one side of the motion.
pub fn directional_multiplier(mean_dirness: f32, bias: f32) -> f32 {
    let side_signal = mean_dirness * bias;
    mix(1.0, smoothstep(-0.2, 0.8, side_signal), bias.abs())
}

/// Alpha boost for dark grain, which reads weaker than light grain.
pub fn dark_boost(luma: f32) -> f32 {
    mix(1.75, 1.0, smoothstep(0.0, 0.82, luma))
}

pub fn grain_density(frame: &FrameParams, p: Vec2, mean_dirness: f32) -> GrainDensity {
    let grain = &frame.grain;
    let tuning = &grain.tuning;
    let radius = frame.radius.max(1.0);
    let center = grain_center(frame);

    let norm_dist = shape_norm(&frame.shape, p - center, radius);
    let shifted = (-norm_dist * norm_dist * grain.radial_falloff).exp();
    let softness = tuning.edge_softness;

    let domain_start = mix(0.06, 0.015, softness);
    let domain_end = mix(0.42, 0.22, softness);
    let domain_mask = smoothstep(domain_start, domain_end, shifted);
    if domain_mask <= 0.0 {
        return GrainDensity::empty(shifted, domain_mask);
    }

    let dither = tuning.dither;
    let breakup = tuning.breakup;
    let coverage_n = (tuning.coverage - 0.5) / 2.0;
    let edge_start = mix(0.22, 0.04, softness);
    let edge_end = mix(0.52, 0.86, softness);

    let radial = shifted.powf(mix(1.55, 0.55, coverage_n) * grain.edge_steepness);
    let directional = directional_multiplier(mean_dirness, grain.bias);

    let grain_coord = p + frame.direction * (grain.offset * frame.spacing.max(2.0) * COORD_OFFSET);
    let rnd = grain_seed(p, grain_coord, dither);

    let mut density = (radial * directional).clamp(0.0, 1.0);
    density = (density * mix(0.78, 1.28, coverage_n)).clamp(0.0, 1.0);

    let lift_mask = smoothstep(edge_start * 0.35, edge_end * 1.05, shifted);
    density = mix(
        density,
        density.max(lift_mask),
        (grain.lift * 0.78).clamp(0.0, 1.0),
    );
    density = ((density - 0.5) * grain.contrast + 0.5).clamp(0.0, 1.0);

    let breakup_noise = (hash12(grain_coord * 2.43 + Vec2::new(1.7, 8.9)) - 0.5)
        + (hash12(grain_coord * 4.31 + Vec2::new(-6.4, 2.3)) - 0.5) * 0.65;
    density = (density + breakup_noise * dither * 0.18 * breakup).clamp(0.0, 1.0);

    let center_solid = smoothstep(0.68, 0.98, density);
    density *= 1.0 - center_solid * (dither * 0.16 * breakup).clamp(0.0, 0.85);
    density = density.powf(grain.gamma.max(0.12));
    density *= grain.density_scale;

    let blob_edge = (BLOB_EDGE_ENERGY / grain.radial_falloff.max(0.5)).sqrt();
    let normalized_pos = (norm_dist / blob_edge).clamp(0.0, 1.0);
    density *= 1.0 - smoothstep(grain.falloff_onset, 1.0, normalized_pos);

    let threshold =
        1.0 - (density * (0.9 + dither * 0.045) * tuning.threshold_gain).clamp(0.0, 0.99);
    let width = mix(0.16, 0.03, (grain.contrast - 0.7).clamp(0.0, 1.0)) + dither * 0.028;
    let mask = smoothstep(threshold - width, threshold + width, rnd);

    GrainDensity {
        shifted_influence: shifted,
        domain_mask,
        density,
        mask,
    }
}

/// Per-pixel grain seed: three hash octaves on the shifted grain coordinate,
/// perturbed by two dither octaves on the raw pixel coordinate.
fn grain_seed(p: Vec2, grain_coord: Vec2, dither: f32) -> f32 {
    let octaves = GRAIN_OCTAVES
        .iter()
        .map(|&(scale, offset, weight)| hash12(grain_coord * scale + offset) * weight)
        .sum::<f32>();
    let dither_noise = (hash12(p * 0.67 + Vec2::new(0.7, 2.1)) - 0.5)
        + (hash12(p * 1.41 + Vec2::new(4.3, -1.7)) - 0.5) * 0.5;
    (octaves + dither_noise * dither * 0.52).clamp(0.0, 1.0)
}

/// Back/front colour mix at `p` and the summed side weight.
pub fn grain_color(frame: &FrameParams, p: Vec2) -> (Rgb, f32) {
    let grain = &frame.grain;
    let radius = frame.radius.max(1.0);
    let split_radius = radius / (grain.radial_falloff * 0.5).sqrt().max(0.7);
    let side = ((p - grain_center(frame)).dot(frame.direction) / split_radius.max(1.0))
        .clamp(-1.0, 1.0);
    let split_soft = mix(0.42, 1.05, grain.tuning.edge_softness);
    let split_t = smoothstep(-split_soft, split_soft, side);

    let back = grain.back_color.to_linear();
    let front = grain.front_color.to_linear();
    let back_weight = (1.0 - split_t) * grain.back_opacity.max(0.0);
    let front_weight = split_t * grain.front_opacity.max(0.0);
    let total = back_weight + front_weight;

    let linear = if total > 0.001 {
        back.scale(back_weight)
            .add(front.scale(front_weight))
            .scale(1.0 / total)
    } else {
        back
    };
    (linear.to_gamma(), total)
}

pub fn sample_grain(frame: &FrameParams, p: Vec2, dots: &DotSample) -> GrainSample {
    let grain: &GrainParams = &frame.grain;
    let density = grain_density(frame, p, dots.mean_dirness);
    let (color, side_opacity) = grain_color(frame, p);

    let raw_alpha = density.mask
        * density.density
        * grain.intensity
        * grain.amount
        * grain.tuning.presence.clamp(0.0, 2.0)
        * density.domain_mask;
    let raw_alpha = raw_alpha.clamp(0.0, 1.0);

    let luma = color.luma();
    let mut alpha = (raw_alpha * side_opacity * dark_boost(luma)).clamp(0.0, 1.0);
    let mut glow = 0.0;
    if grain.background == GrainBackground::Light {
        alpha = (alpha * mix(1.0, 2.1, smoothstep(0.72, 1.0, luma))).clamp(0.0, 1.0);
        glow = smoothstep(0.80, 1.0, luma) * alpha;
    }

    GrainSample {
        alpha,
        color,
        domain_mask: density.domain_mask,
        glow,
    }
}
