//! Clamped configuration and the per-frame evaluation state derived from it.
//!
//! [`ConfigSnapshot`] is the only way raw [`EffectConfig`] values reach the
//! evaluator, so every field is inside its documented range by construction.
//! [`FrameParams`] is the read-only record every pixel sees for one frame:
//! the snapshot scaled into device pixels, the contact state, and the grain
//! parameters after the spread macro has been applied.

use std::ops::Deref;

use glam::{DVec2, Vec2};

use crate::color::Rgb;
use crate::schema::{BlendMode, EffectConfig, GrainBackground, ShapeKind};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FieldRange {
    pub min: f32,
    pub max: f32,
}

impl FieldRange {
    pub const fn new(min: f32, max: f32) -> Self {
        Self { min, max }
    }

    /// Clamp into range; non-finite input falls back to `fallback`.
    pub fn apply(self, value: f32, fallback: f32) -> f32 {
        let value = if value.is_finite() { value } else { fallback };
        value.clamp(self.min, self.max)
    }
}

pub mod ranges {
    use super::FieldRange;

    pub const DOT_OPACITY: FieldRange = FieldRange::new(0.01, 0.25);
    pub const DOT_FINAL_OPACITY: FieldRange = FieldRange::new(0.05, 1.0);
    pub const GRID_SPACING: FieldRange = FieldRange::new(10.0, 60.0);
    pub const DOT_SIZE: FieldRange = FieldRange::new(0.6, 2.4);
    pub const INFLUENCE_RADIUS: FieldRange = FieldRange::new(40.0, 420.0);
    pub const SHAPE_STRETCH: FieldRange = FieldRange::new(0.6, 1.6);
    pub const BLOB_LOBES: FieldRange = FieldRange::new(2.0, 12.0);
    pub const BLOB_JAGGEDNESS: FieldRange = FieldRange::new(0.0, 0.8);
    pub const BLOB_SCALE: FieldRange = FieldRange::new(0.6, 1.4);
    pub const BALL_ROUNDNESS: FieldRange = FieldRange::new(0.0, 1.2);
    pub const COMPRESSION_STRENGTH: FieldRange = FieldRange::new(0.0, 1.2);
    pub const DOT_SEPARATION: FieldRange = FieldRange::new(0.75, 1.8);
    pub const DOT_SHARPNESS: FieldRange = FieldRange::new(0.6, 2.2);
    pub const GRAIN_AMOUNT: FieldRange = FieldRange::new(0.0, 1.0);
    pub const GRAIN_SIDE_OPACITY: FieldRange = FieldRange::new(0.0, 1.5);
    pub const GRAIN_SPREAD: FieldRange = FieldRange::new(0.0, 1.5);
    pub const GRAIN_CONTRAST: FieldRange = FieldRange::new(0.5, 2.5);
    pub const GRAIN_PRESENCE: FieldRange = FieldRange::new(0.0, 2.0);
    pub const GRAIN_COVERAGE: FieldRange = FieldRange::new(0.5, 2.5);
    pub const GRAIN_BREAKUP: FieldRange = FieldRange::new(0.0, 1.5);
    pub const GRAIN_THRESHOLD: FieldRange = FieldRange::new(0.6, 1.2);
    pub const GRAIN_LIFT: FieldRange = FieldRange::new(0.0, 1.0);
    pub const GRAIN_GAMMA: FieldRange = FieldRange::new(0.12, 3.0);
    pub const GRAIN_DITHER: FieldRange = FieldRange::new(0.0, 5.0);
    pub const GRAIN_BIAS: FieldRange = FieldRange::new(-1.0, 1.0);
    pub const GRAIN_OFFSET: FieldRange = FieldRange::new(-2.0, 2.0);
    pub const GRAIN_EDGE_SOFTNESS: FieldRange = FieldRange::new(0.0, 1.0);
    pub const GRAIN_INTENSITY: FieldRange = FieldRange::new(0.01, 0.5);
    pub const GRAIN_RADIAL_FALLOFF: FieldRange = FieldRange::new(0.5, 12.0);
    pub const GRAIN_EDGE_STEEPNESS: FieldRange = FieldRange::new(0.3, 5.0);
    pub const GRAIN_DENSITY_SCALE: FieldRange = FieldRange::new(0.02, 1.0);
    pub const GRAIN_FALLOFF_ONSET: FieldRange = FieldRange::new(0.0, 1.0);
    pub const MOTION_SPEED: FieldRange = FieldRange::new(0.01, 1.4);
    pub const WAVE_AMOUNT: FieldRange = FieldRange::new(0.04, 0.34);
}

/// An [`EffectConfig`] whose fields are all inside their valid ranges.
///
/// Immutable once built; a new frame gets a whole new snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigSnapshot(EffectConfig);

impl ConfigSnapshot {
    pub fn from_config(raw: &EffectConfig) -> Self {
        let d = EffectConfig::default();
        let side = ranges::GRAIN_SIDE_OPACITY;
        let stretch = ranges::SHAPE_STRETCH;

        Self(EffectConfig {
            dot_color: sanitize_color(raw.dot_color),
            dot_opacity: ranges::DOT_OPACITY.apply(raw.dot_opacity, d.dot_opacity),
            dot_final_opacity: ranges::DOT_FINAL_OPACITY
                .apply(raw.dot_final_opacity, d.dot_final_opacity),
            grid_spacing: ranges::GRID_SPACING
                .apply(raw.grid_spacing, d.grid_spacing)
                .round(),
            dot_size: ranges::DOT_SIZE.apply(raw.dot_size, d.dot_size),
            influence_radius: ranges::INFLUENCE_RADIUS
                .apply(raw.influence_radius, d.influence_radius),
            shape: raw.shape,
            shape_stretch_x: stretch.apply(raw.shape_stretch_x, d.shape_stretch_x),
            shape_stretch_y: stretch.apply(raw.shape_stretch_y, d.shape_stretch_y),
            blob_seed: raw.blob_seed,
            blob_lobes: ranges::BLOB_LOBES.apply(raw.blob_lobes, d.blob_lobes),
            blob_jaggedness: ranges::BLOB_JAGGEDNESS
                .apply(raw.blob_jaggedness, d.blob_jaggedness),
            blob_scale: ranges::BLOB_SCALE.apply(raw.blob_scale, d.blob_scale),
            ball_roundness: ranges::BALL_ROUNDNESS.apply(raw.ball_roundness, d.ball_roundness),
            compression_strength: ranges::COMPRESSION_STRENGTH
                .apply(raw.compression_strength, d.compression_strength),
            dot_separation: ranges::DOT_SEPARATION.apply(raw.dot_separation, d.dot_separation),
            dot_sharpness: ranges::DOT_SHARPNESS.apply(raw.dot_sharpness, d.dot_sharpness),
            grain_enabled: raw.grain_enabled,
            grain_amount: ranges::GRAIN_AMOUNT.apply(raw.grain_amount, d.grain_amount),
            grain_back_color: sanitize_color(raw.grain_back_color),
            grain_front_color: sanitize_color(raw.grain_front_color),
            grain_back_opacity: side.apply(raw.grain_back_opacity, d.grain_back_opacity),
            grain_front_opacity: side.apply(raw.grain_front_opacity, d.grain_front_opacity),
            grain_background: raw.grain_background,
            grain_blend_mode: raw.grain_blend_mode,
            grain_spread: ranges::GRAIN_SPREAD.apply(raw.grain_spread, d.grain_spread),
            grain_contrast: ranges::GRAIN_CONTRAST.apply(raw.grain_contrast, d.grain_contrast),
            grain_presence: ranges::GRAIN_PRESENCE.apply(raw.grain_presence, d.grain_presence),
            grain_coverage: ranges::GRAIN_COVERAGE.apply(raw.grain_coverage, d.grain_coverage),
            grain_breakup: ranges::GRAIN_BREAKUP.apply(raw.grain_breakup, d.grain_breakup),
            grain_threshold: ranges::GRAIN_THRESHOLD
                .apply(raw.grain_threshold, d.grain_threshold),
            grain_lift: ranges::GRAIN_LIFT.apply(raw.grain_lift, d.grain_lift),
            grain_gamma: ranges::GRAIN_GAMMA.apply(raw.grain_gamma, d.grain_gamma),
            grain_dither: ranges::GRAIN_DITHER.apply(raw.grain_dither, d.grain_dither),
            grain_bias: ranges::GRAIN_BIAS.apply(raw.grain_bias, d.grain_bias),
            grain_offset: ranges::GRAIN_OFFSET.apply(raw.grain_offset, d.grain_offset),
            grain_edge_softness: ranges::GRAIN_EDGE_SOFTNESS
                .apply(raw.grain_edge_softness, d.grain_edge_softness),
            grain_intensity: ranges::GRAIN_INTENSITY
                .apply(raw.grain_intensity, d.grain_intensity),
            grain_radial_falloff: ranges::GRAIN_RADIAL_FALLOFF
                .apply(raw.grain_radial_falloff, d.grain_radial_falloff),
            grain_edge_steepness: ranges::GRAIN_EDGE_STEEPNESS
                .apply(raw.grain_edge_steepness, d.grain_edge_steepness),
            grain_density_scale: ranges::GRAIN_DENSITY_SCALE
                .apply(raw.grain_density_scale, d.grain_density_scale),
            grain_falloff_onset: ranges::GRAIN_FALLOFF_ONSET
                .apply(raw.grain_falloff_onset, d.grain_falloff_onset),
            motion_speed: ranges::MOTION_SPEED.apply(raw.motion_speed, d.motion_speed),
            wave_amount: ranges::WAVE_AMOUNT.apply(raw.wave_amount, d.wave_amount),
        })
    }

    pub fn config(&self) -> &EffectConfig {
        &self.0
    }
}

impl Default for ConfigSnapshot {
    fn default() -> Self {
        Self::from_config(&EffectConfig::default())
    }
}

impl Deref for ConfigSnapshot {
    type Target = EffectConfig;

    fn deref(&self) -> &EffectConfig {
        &self.0
    }
}

fn sanitize_color(color: Rgb) -> Rgb {
    color.map(|c| if c.is_finite() { c.clamp(0.0, 1.0) } else { 0.0 })
}

/// The six grain controls after the spread macro has been folded in.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GrainTuning {
    pub coverage: f32,
    pub threshold_gain: f32,
    pub edge_softness: f32,
    pub presence: f32,
    pub breakup: f32,
    pub dither: f32,
}

impl GrainTuning {
    pub fn derive(snapshot: &ConfigSnapshot) -> Self {
        let spread = snapshot.grain_spread.clamp(0.0, 1.5) / 1.5;
        Self {
            coverage: (snapshot.grain_coverage * (1.0 + spread * 1.25)).clamp(0.5, 2.5),
            threshold_gain: (snapshot.grain_threshold * (1.0 - spread * 0.16)).clamp(0.6, 1.2),
            edge_softness: (snapshot.grain_edge_softness + spread * 0.22).clamp(0.0, 1.0),
            presence: (snapshot.grain_presence * (1.0 + spread * 0.32)).clamp(0.0, 2.0),
            breakup: (snapshot.grain_breakup * (1.0 + spread * 0.22)).clamp(0.0, 1.5),
            dither: (snapshot.grain_dither * (1.0 + spread * 0.35)).clamp(0.0, 5.0),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ShapeParams {
    pub kind: ShapeKind,
    pub stretch: Vec2,
    pub blob_seed: f32,
    pub blob_lobes: f32,
    pub blob_jaggedness: f32,
    pub blob_scale: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DotParams {
    pub color: Rgb,
    pub base_opacity: f32,
    pub final_opacity: f32,
    pub size: f32,
    pub roundness: f32,
    pub compression: f32,
    pub separation: f32,
    pub sharpness: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GrainParams {
    /// Zero when grain is disabled.
    pub amount: f32,
    pub back_color: Rgb,
    pub front_color: Rgb,
    pub back_opacity: f32,
    pub front_opacity: f32,
    pub background: GrainBackground,
    pub blend_mode: BlendMode,
    pub tuning: GrainTuning,
    pub contrast: f32,
    pub lift: f32,
    pub gamma: f32,
    pub bias: f32,
    pub offset: f32,
    pub intensity: f32,
    pub radial_falloff: f32,
    pub edge_steepness: f32,
    pub density_scale: f32,
    pub falloff_onset: f32,
}

/// Everything a pixel evaluation reads, in device-pixel units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameParams {
    pub width: u32,
    pub height: u32,
    pub contact: Vec2,
    /// Unit motion direction.
    pub direction: Vec2,
    pub spacing: f32,
    pub radius: f32,
    pub shape: ShapeParams,
    pub dots: DotParams,
    pub grain: GrainParams,
}

impl FrameParams {
    /// `contact` is in CSS pixels; lengths are scaled by `pixel_ratio`.
    pub fn new(
        snapshot: &ConfigSnapshot,
        contact: DVec2,
        direction: DVec2,
        pixel_ratio: f32,
        width: u32,
        height: u32,
    ) -> Self {
        let ratio = if pixel_ratio.is_finite() && pixel_ratio > 0.0 {
            pixel_ratio
        } else {
            1.0
        };
        let direction = direction.as_vec2();
        let direction = if direction.is_finite() && direction.length_squared() > 0.0 {
            direction.normalize()
        } else {
            Vec2::X
        };
        let grain_amount = if snapshot.grain_enabled {
            snapshot.grain_amount
        } else {
            0.0
        };

        Self {
            width,
            height,
            contact: contact.as_vec2() * ratio,
            direction,
            spacing: (snapshot.grid_spacing * ratio).max(2.0),
            radius: (snapshot.influence_radius * ratio).max(1.0),
            shape: ShapeParams {
                kind: snapshot.shape,
                stretch: Vec2::new(snapshot.shape_stretch_x, snapshot.shape_stretch_y),
                blob_seed: snapshot.blob_seed as f32,
                blob_lobes: snapshot.blob_lobes,
                blob_jaggedness: snapshot.blob_jaggedness,
                blob_scale: snapshot.blob_scale,
            },
            dots: DotParams {
                color: snapshot.dot_color,
                base_opacity: snapshot.dot_opacity,
                final_opacity: snapshot.dot_final_opacity,
                size: snapshot.dot_size * ratio,
                roundness: snapshot.ball_roundness,
                compression: snapshot.compression_strength,
                separation: snapshot.dot_separation,
                sharpness: snapshot.dot_sharpness,
            },
            grain: GrainParams {
                amount: grain_amount,
                back_color: snapshot.grain_back_color,
                front_color: snapshot.grain_front_color,
                back_opacity: snapshot.grain_back_opacity,
                front_opacity: snapshot.grain_front_opacity,
                background: snapshot.grain_background,
                blend_mode: snapshot.grain_blend_mode,
                tuning: GrainTuning::derive(snapshot),
                contrast: snapshot.grain_contrast,
                lift: snapshot.grain_lift,
                gamma: snapshot.grain_gamma,
                bias: snapshot.grain_bias,
                offset: snapshot.grain_offset,
                intensity: snapshot.grain_intensity,
                radial_falloff: snapshot.grain_radial_falloff,
                edge_steepness: snapshot.grain_edge_steepness,
                density_scale: snapshot.grain_density_scale,
                falloff_onset: snapshot.grain_falloff_onset,
            },
        }
    }
}
