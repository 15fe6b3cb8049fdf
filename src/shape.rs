use glam::Vec2;

use crate::noise::{fract, hash1, mix, modulo, TAU};
use crate::schema::ShapeKind;
use crate::snapshot::ShapeParams;

const ROUNDED_SQUARE_WEIGHT: f32 = 0.72;
const MIN_CONTOUR: f32 = 0.25;

/// Normalised distance of `d` under the active shape; 1.0 is the influence
/// boundary.
pub fn shape_norm(shape: &ShapeParams, d: Vec2, radius: f32) -> f32 {
    let radius = radius.max(1.0);
    let stretch = shape.stretch.max(Vec2::splat(0.001));
    let sd = d / stretch;
    let base = sd.length() / radius;

    match shape.kind {
        ShapeKind::Circle | ShapeKind::Ellipse => base,
        ShapeKind::RoundedSquare => {
            let square = sd.abs().max_element() / radius;
            mix(base, square, ROUNDED_SQUARE_WEIGHT)
        }
        // Blob ignores stretch so the outline stays organic.
        ShapeKind::Blob => d.length() / radius / blob_contour(shape, d).max(MIN_CONTOUR),
    }
}

/// Radial scale of the blob outline in the direction of `d`, centred on 1.0.
pub fn blob_contour(shape: &ShapeParams, d: Vec2) -> f32 {
    let angle = d.y.atan2(d.x) + std::f32::consts::PI;
    let rough = shape.blob_jaggedness.clamp(0.0, 1.0);
    let lobes = (shape.blob_lobes.max(2.0) + 0.5).floor();
    let seed = fract(shape.blob_seed * 0.0073) * 100.0;

    let n1 = polar_noise(angle, lobes, seed);
    let n2 = polar_noise(angle, lobes * 2.0, seed + 31.7);
    let n3 = polar_noise(angle, lobes * 3.0, seed + 67.3);
    let wave = (n1 - 0.5) + (n2 - 0.5) * 0.35 * rough + (n3 - 0.5) * 0.15 * rough * rough;

    let strength = mix(0.3, 0.9, rough);
    let contour = 1.0 + wave * strength;
    contour * mix(1.0, shape.blob_scale.max(0.2), 0.9)
}

/// Smooth periodic value noise around the circle with `freq` cells per turn.
pub fn polar_noise(angle: f32, freq: f32, seed: f32) -> f32 {
    let t = angle / TAU * freq;
    let cell = t.floor();
    let f = fract(t);
    let f = f * f * (3.0 - 2.0 * f);
    mix(
        hash1(modulo(cell, freq) + seed),
        hash1(modulo(cell + 1.0, freq) + seed),
        f,
    )
}
