use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

use crate::color::Rgb;

pub const MANIFEST_VERSION: u32 = 1;
pub const MAX_DEVICE_PIXEL_RATIO: f32 = 1.5;

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Manifest {
    #[serde(default = "default_version")]
    pub version: u32,
    pub environment: Environment,
    #[serde(default)]
    pub effect: EffectConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Environment {
    /// Surface size in CSS pixels; the backing framebuffer is scaled by the
    /// (capped) device pixel ratio.
    pub surface: Surface,
    #[serde(default = "default_device_pixel_ratio")]
    pub device_pixel_ratio: f32,
    pub fps: u32,
    pub duration: Duration,
    /// Fixes the motion phase offsets. Absent means a fresh random trajectory
    /// per run.
    #[serde(default)]
    pub seed: Option<u64>,
    #[serde(default)]
    pub reduced_motion: bool,
    #[serde(default)]
    pub background: Option<Background>,
}

impl Environment {
    pub fn validate(&self) -> Result<()> {
        if self.surface.width == 0 || self.surface.height == 0 {
            bail!(
                "surface must be positive, got {}x{}",
                self.surface.width,
                self.surface.height
            );
        }

        if !self.device_pixel_ratio.is_finite() || self.device_pixel_ratio <= 0.0 {
            bail!(
                "device_pixel_ratio must be a positive number, got {}",
                self.device_pixel_ratio
            );
        }

        if self.fps == 0 {
            bail!("fps must be > 0");
        }

        match self.duration {
            Duration::Seconds(seconds) => {
                if !seconds.is_finite() || seconds <= 0.0 {
                    bail!("duration in seconds must be > 0");
                }
            }
            Duration::Frames { frames } => {
                if frames == 0 {
                    bail!("duration frames must be > 0");
                }
            }
        }

        Ok(())
    }

    pub fn total_frames(&self) -> u32 {
        match self.duration {
            Duration::Seconds(seconds) => {
                let frames = (seconds * self.fps as f32).ceil();
                frames.max(1.0) as u32
            }
            Duration::Frames { frames } => frames.max(1),
        }
    }

    pub fn effective_pixel_ratio(&self) -> f32 {
        effective_pixel_ratio(self.device_pixel_ratio)
    }

    /// Backing framebuffer size in device pixels.
    pub fn backing_size(&self) -> (u32, u32) {
        backing_size(
            self.surface.width,
            self.surface.height,
            self.device_pixel_ratio,
        )
    }

    /// Host timestamp of `frame_index` in milliseconds.
    pub fn frame_time_ms(&self, frame_index: u32) -> f64 {
        f64::from(frame_index) * 1000.0 / f64::from(self.fps)
    }
}

pub fn effective_pixel_ratio(device_pixel_ratio: f32) -> f32 {
    if device_pixel_ratio.is_finite() && device_pixel_ratio > 0.0 {
        device_pixel_ratio.min(MAX_DEVICE_PIXEL_RATIO)
    } else {
        1.0
    }
}

pub fn backing_size(css_width: u32, css_height: u32, device_pixel_ratio: f32) -> (u32, u32) {
    let ratio = effective_pixel_ratio(device_pixel_ratio);
    let scale = |css: u32| ((css as f32 * ratio).floor() as u32).max(1);
    (scale(css_width), scale(css_height))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Surface {
    pub width: u32,
    pub height: u32,
}

impl Surface {
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
#[serde(untagged)]
pub enum Duration {
    Seconds(f32),
    Frames { frames: u32 },
}

/// Three-stop backdrop drawn behind the transparent effect for opaque exports.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Background {
    pub start: Rgb,
    pub mid: Rgb,
    pub end: Rgb,
}

impl Default for Background {
    fn default() -> Self {
        Self {
            start: Rgb::from_u8(0x1a, 0x1a, 0x2e),
            mid: Rgb::from_u8(0x16, 0x21, 0x3e),
            end: Rgb::from_u8(0x0f, 0x34, 0x60),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ShapeKind {
    #[default]
    Circle,
    Ellipse,
    #[serde(alias = "roundedSquare")]
    RoundedSquare,
    #[serde(alias = "random_blob", alias = "randomBlob")]
    Blob,
}

impl ShapeKind {
    pub fn gpu_index(self) -> f32 {
        match self {
            Self::Circle => 0.0,
            Self::Ellipse => 1.0,
            Self::RoundedSquare => 2.0,
            Self::Blob => 3.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum BlendMode {
    #[default]
    Normal,
    Screen,
    Add,
    Multiply,
}

impl BlendMode {
    pub fn gpu_index(self) -> f32 {
        match self {
            Self::Normal => 0.0,
            Self::Screen => 1.0,
            Self::Add => 2.0,
            Self::Multiply => 3.0,
        }
    }
}

/// Which backdrop the grain is tuned for. Light mode boosts near-white grain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum GrainBackground {
    #[default]
    Dark,
    Light,
}

impl GrainBackground {
    pub fn gpu_index(self) -> f32 {
        match self {
            Self::Dark => 0.0,
            Self::Light => 1.0,
        }
    }
}

/// Raw effect parameters as supplied by the host. Values may be out of range;
/// [`crate::snapshot::ConfigSnapshot`] clamps them before any use.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct EffectConfig {
    pub dot_color: Rgb,
    pub dot_opacity: f32,
    pub dot_final_opacity: f32,
    pub grid_spacing: f32,
    pub dot_size: f32,
    pub influence_radius: f32,
    pub shape: ShapeKind,
    pub shape_stretch_x: f32,
    pub shape_stretch_y: f32,
    pub blob_seed: u32,
    pub blob_lobes: f32,
    pub blob_jaggedness: f32,
    pub blob_scale: f32,
    pub ball_roundness: f32,
    pub compression_strength: f32,
    pub dot_separation: f32,
    pub dot_sharpness: f32,
    pub grain_enabled: bool,
    pub grain_amount: f32,
    pub grain_back_color: Rgb,
    pub grain_front_color: Rgb,
    pub grain_back_opacity: f32,
    pub grain_front_opacity: f32,
    pub grain_background: GrainBackground,
    pub grain_blend_mode: BlendMode,
    pub grain_spread: f32,
    pub grain_contrast: f32,
    pub grain_presence: f32,
    pub grain_coverage: f32,
    pub grain_breakup: f32,
    pub grain_threshold: f32,
    pub grain_lift: f32,
    pub grain_gamma: f32,
    pub grain_dither: f32,
    pub grain_bias: f32,
    pub grain_offset: f32,
    pub grain_edge_softness: f32,
    pub grain_intensity: f32,
    pub grain_radial_falloff: f32,
    pub grain_edge_steepness: f32,
    pub grain_density_scale: f32,
    pub grain_falloff_onset: f32,
    pub motion_speed: f32,
    pub wave_amount: f32,
}

impl Default for EffectConfig {
    fn default() -> Self {
        Self {
            dot_color: Rgb::WHITE,
            dot_opacity: 0.06,
            dot_final_opacity: 0.55,
            grid_spacing: 24.0,
            dot_size: 1.0,
            influence_radius: 180.0,
            shape: ShapeKind::Circle,
            shape_stretch_x: 1.0,
            shape_stretch_y: 1.0,
            blob_seed: 127,
            blob_lobes: 6.0,
            blob_jaggedness: 0.25,
            blob_scale: 1.0,
            ball_roundness: 0.7,
            compression_strength: 0.62,
            dot_separation: 1.05,
            dot_sharpness: 1.3,
            grain_enabled: true,
            grain_amount: 0.35,
            grain_back_color: Rgb::from_u8(0x6f, 0x7f, 0xa8),
            grain_front_color: Rgb::WHITE,
            grain_back_opacity: 1.0,
            grain_front_opacity: 1.0,
            grain_background: GrainBackground::Dark,
            grain_blend_mode: BlendMode::Normal,
            grain_spread: 0.35,
            grain_contrast: 1.1,
            grain_presence: 1.0,
            grain_coverage: 1.0,
            grain_breakup: 0.65,
            grain_threshold: 1.0,
            grain_lift: 0.45,
            grain_gamma: 1.15,
            grain_dither: 0.9,
            grain_bias: 0.35,
            grain_offset: 0.35,
            grain_edge_softness: 0.65,
            grain_intensity: 0.15,
            grain_radial_falloff: 2.0,
            grain_edge_steepness: 1.0,
            grain_density_scale: 1.0,
            grain_falloff_onset: 1.0,
            motion_speed: 0.55,
            wave_amount: 0.14,
        }
    }
}

impl EffectConfig {
    /// Every numeric field by name. Used for validation and for `check` output.
    pub fn numeric_fields(&self) -> [(&'static str, f32); 36] {
        [
            ("dot_opacity", self.dot_opacity),
            ("dot_final_opacity", self.dot_final_opacity),
            ("grid_spacing", self.grid_spacing),
            ("dot_size", self.dot_size),
            ("influence_radius", self.influence_radius),
            ("shape_stretch_x", self.shape_stretch_x),
            ("shape_stretch_y", self.shape_stretch_y),
            ("blob_lobes", self.blob_lobes),
            ("blob_jaggedness", self.blob_jaggedness),
            ("blob_scale", self.blob_scale),
            ("ball_roundness", self.ball_roundness),
            ("compression_strength", self.compression_strength),
            ("dot_separation", self.dot_separation),
            ("dot_sharpness", self.dot_sharpness),
            ("grain_amount", self.grain_amount),
            ("grain_back_opacity", self.grain_back_opacity),
            ("grain_front_opacity", self.grain_front_opacity),
            ("grain_spread", self.grain_spread),
            ("grain_contrast", self.grain_contrast),
            ("grain_presence", self.grain_presence),
            ("grain_coverage", self.grain_coverage),
            ("grain_breakup", self.grain_breakup),
            ("grain_threshold", self.grain_threshold),
            ("grain_lift", self.grain_lift),
            ("grain_gamma", self.grain_gamma),
            ("grain_dither", self.grain_dither),
            ("grain_bias", self.grain_bias),
            ("grain_offset", self.grain_offset),
            ("grain_edge_softness", self.grain_edge_softness),
            ("grain_intensity", self.grain_intensity),
            ("grain_radial_falloff", self.grain_radial_falloff),
            ("grain_edge_steepness", self.grain_edge_steepness),
            ("grain_density_scale", self.grain_density_scale),
            ("grain_falloff_onset", self.grain_falloff_onset),
            ("motion_speed", self.motion_speed),
            ("wave_amount", self.wave_amount),
        ]
    }

    /// Structural check for file-sourced configs. Out-of-range values are fine
    /// (they get clamped); non-finite ones are not.
    pub fn validate(&self) -> Result<()> {
        for (label, value) in self.numeric_fields() {
            validate_number(label, value)?;
        }
        Ok(())
    }

    /// Picks a fresh blob outline.
    pub fn reroll_blob_seed(&mut self, rng: &mut fastrand::Rng) {
        self.blob_seed = rng.u32(0..1_000_000);
    }

    /// Exchanges the back and front grain colours together with their opacities.
    pub fn swap_grain_sides(&mut self) {
        std::mem::swap(&mut self.grain_back_color, &mut self.grain_front_color);
        std::mem::swap(
            &mut self.grain_back_opacity,
            &mut self.grain_front_opacity,
        );
    }
}

fn default_version() -> u32 {
    MANIFEST_VERSION
}

fn default_device_pixel_ratio() -> f32 {
    1.0
}

pub fn validate_number(label: &str, value: f32) -> Result<()> {
    if !value.is_finite() {
        bail!("{label} must be finite");
    }
    Ok(())
}
