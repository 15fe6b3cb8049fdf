use glam::Vec2;

use crate::shape::shape_norm;
use crate::snapshot::FrameParams;

const ROUND_NUDGE: f32 = 0.12;
const SEPARATION_NUDGE: f32 = 0.75;
const GATHER_NUDGE: f32 = 0.58;

/// How one grid cell responds to the contact point.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Deformation {
    /// 1 at the contact point, falling smoothly toward 0 past the boundary.
    pub influence: f32,
    /// Positive part of `dirness`.
    pub frontness: f32,
    /// Signed alignment with the motion direction in radius units, in [-1, 1].
    pub dirness: f32,
    /// Parabolic bump, 0 at the centre and at the boundary, 1 halfway.
    pub shell_profile: f32,
    pub position: Vec2,
}

impl Deformation {
    pub fn nudge(&self, cell_center: Vec2) -> Vec2 {
        self.position - cell_center
    }
}

pub fn influence_from_norm(norm: f32) -> f32 {
    (-2.0 * norm * norm).exp()
}

pub fn shell_profile(norm: f32) -> f32 {
    let u = norm.clamp(0.0, 1.0);
    4.0 * u * (1.0 - u)
}

/// Evaluate the deformation field at `cell_center` (device pixels).
pub fn deform(frame: &FrameParams, cell_center: Vec2) -> Deformation {
    let d = cell_center - frame.contact;
    let dist = d.length();
    let radius = frame.radius.max(1.0);
    let norm = shape_norm(&frame.shape, d, radius);

    let influence = influence_from_norm(norm);
    let parallel = d.dot(frame.direction);
    let dirness = (parallel / radius).clamp(-1.0, 1.0);
    let frontness = dirness.max(0.0);
    let shell = shell_profile(norm);

    let outward = if dist > 0.0001 { d / dist } else { Vec2::ZERO };
    let dots = &frame.dots;
    let round_nudge = dots.roundness * influence * shell * radius * ROUND_NUDGE;
    let separation_nudge = (dots.separation - 1.0) * influence * frame.spacing * SEPARATION_NUDGE;
    let gather_nudge = dots.compression * influence * frontness * frame.spacing * GATHER_NUDGE;

    Deformation {
        influence,
        frontness,
        dirness,
        shell_profile: shell,
        position: cell_center
            + outward * (round_nudge + separation_nudge)
            + frame.direction * gather_nudge,
    }
}
