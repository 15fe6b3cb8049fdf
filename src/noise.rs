//! Scalar helpers shared by the CPU evaluator. Each function mirrors the WGSL
//! builtin or helper of the same name in `shaders/grid.wgsl`.

use glam::Vec2;

pub const TAU: f32 = std::f32::consts::TAU;

const HASH_SCALE: f32 = 43_758.547;
const HASH_AXIS: Vec2 = Vec2::new(127.1, 311.7);

#[inline]
pub fn fract(x: f32) -> f32 {
    x - x.floor()
}

#[inline]
pub fn mix(a: f32, b: f32, t: f32) -> f32 {
    a + (b - a) * t
}

/// Hermite step, 0 below `edge0` and 1 above `edge1`.
#[inline]
pub fn smoothstep(edge0: f32, edge1: f32, x: f32) -> f32 {
    let span = edge1 - edge0;
    if span.abs() <= f32::EPSILON {
        return if x < edge0 { 0.0 } else { 1.0 };
    }
    let t = ((x - edge0) / span).clamp(0.0, 1.0);
    t * t * (3.0 - 2.0 * t)
}

#[inline]
pub fn hash1(n: f32) -> f32 {
    fract(n.sin() * HASH_SCALE)
}

#[inline]
pub fn hash12(p: Vec2) -> f32 {
    fract(p.dot(HASH_AXIS).sin() * HASH_SCALE)
}

/// GLSL-style modulo: result carries the sign of `y`.
#[inline]
pub fn modulo(x: f32, y: f32) -> f32 {
    x - y * (x / y).floor()
}
