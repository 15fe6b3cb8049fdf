//! Contact-point motion: a procedural target path, exponential following, and
//! smoothed velocity. All coordinates are CSS pixels; time is in seconds.

use glam::DVec2;

use crate::snapshot::ConfigSnapshot;

pub const FOLLOW_RATE: f64 = 8.8;
pub const VELOCITY_RETAIN: f64 = 0.78;
pub const MIN_DT: f64 = 0.001;
pub const MAX_DT: f64 = 0.05;
pub const FIRST_FRAME_DT: f64 = 1.0 / 60.0;
const DIRECTION_EPSILON: f64 = 0.0001;
const SEED_SPAN: f64 = 10.0;

/// Phase offsets for the target path. Fixed for the lifetime of a session.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MotionSeeds {
    pub orbit: f64,
    pub drift: f64,
}

impl MotionSeeds {
    pub fn random() -> Self {
        Self::from_rng(&mut fastrand::Rng::new())
    }

    pub fn from_seed(seed: u64) -> Self {
        Self::from_rng(&mut fastrand::Rng::with_seed(seed))
    }

    fn from_rng(rng: &mut fastrand::Rng) -> Self {
        Self {
            orbit: rng.f64() * SEED_SPAN,
            drift: rng.f64() * SEED_SPAN,
        }
    }
}

/// Angular speed multiplier for a `motion_speed` setting.
pub fn angular_speed(motion_speed: f64) -> f64 {
    0.05 + motion_speed.powf(1.45) * 0.95
}

/// Where the contact point is heading at `time_s`: an orbit around the
/// surface centre plus a slower wave whose size follows `wave_amount`.
pub fn target_point(
    seeds: MotionSeeds,
    time_s: f64,
    width: f64,
    height: f64,
    motion_speed: f64,
    wave_amount: f64,
) -> DVec2 {
    let t = time_s * angular_speed(motion_speed);
    let wave_x = width * wave_amount;
    let wave_y = height * wave_amount;
    let orbit = t * 0.9 + seeds.orbit;
    let drift = t * 0.43 + seeds.drift;

    let x = width * 0.5
        + orbit.cos() * width * 0.2
        + (orbit * 0.52 + drift).cos() * wave_x * 0.55;
    let y = height * 0.5
        + (orbit * 0.92 + 0.35).sin() * height * 0.18
        + (orbit * 0.47 + drift + 1.1).sin() * wave_y * 0.55;
    DVec2::new(x, y)
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MotionState {
    pub position: DVec2,
    pub previous: DVec2,
    pub velocity: DVec2,
}

impl MotionState {
    pub fn at_rest(position: DVec2) -> Self {
        Self {
            position,
            previous: position,
            velocity: DVec2::ZERO,
        }
    }

    /// One frame of exponential approach toward `target`.
    pub fn step(&mut self, target: DVec2, dt: f64) {
        self.previous = self.position;
        let blend = 1.0 - (-FOLLOW_RATE * dt).exp();
        self.position += (target - self.position) * blend;

        let instant = (self.position - self.previous) / dt.max(MIN_DT);
        self.velocity = self.velocity * VELOCITY_RETAIN + instant * (1.0 - VELOCITY_RETAIN);
    }

    /// Unit motion direction, or +x while (nearly) at rest.
    pub fn direction(&self) -> DVec2 {
        let speed = self.velocity.length();
        if speed > DIRECTION_EPSILON && speed.is_finite() {
            self.velocity / speed
        } else {
            DVec2::X
        }
    }
}

/// Converts host timestamps into clamped frame deltas.
#[derive(Debug, Clone, Copy, Default)]
pub struct FrameClock {
    last_ms: Option<f64>,
}

impl FrameClock {
    pub fn tick(&mut self, time_ms: f64) -> f64 {
        let dt = match self.last_ms {
            Some(last) => ((time_ms - last) / 1000.0).clamp(MIN_DT, MAX_DT),
            None => FIRST_FRAME_DT,
        };
        self.last_ms = Some(time_ms);
        if dt.is_finite() {
            dt
        } else {
            FIRST_FRAME_DT
        }
    }
}

/// Contact state handed to the evaluator for one frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Contact {
    pub position: DVec2,
    pub velocity: DVec2,
    pub direction: DVec2,
    pub dt: f64,
}

/// Owns the contact point across frames. Mutated once per frame by
/// [`MotionSimulator::advance`]; re-anchored by [`MotionSimulator::resize`].
#[derive(Debug, Clone)]
pub struct MotionSimulator {
    seeds: MotionSeeds,
    state: MotionState,
    clock: FrameClock,
    width: f64,
    height: f64,
    reduced_motion: bool,
}

impl MotionSimulator {
    pub fn new(seeds: MotionSeeds, css_width: u32, css_height: u32) -> Self {
        let width = f64::from(css_width);
        let height = f64::from(css_height);
        Self {
            seeds,
            state: MotionState::at_rest(DVec2::new(width * 0.5, height * 0.5)),
            clock: FrameClock::default(),
            width,
            height,
            reduced_motion: false,
        }
    }

    pub fn seeds(&self) -> MotionSeeds {
        self.seeds
    }

    pub fn state(&self) -> &MotionState {
        &self.state
    }

    pub fn reduced_motion(&self) -> bool {
        self.reduced_motion
    }

    pub fn set_reduced_motion(&mut self, reduced: bool) {
        self.reduced_motion = reduced;
    }

    /// Re-anchor at the new surface centre. Velocity is kept so direction
    /// does not flip on resize.
    pub fn resize(&mut self, css_width: u32, css_height: u32) {
        self.width = f64::from(css_width);
        self.height = f64::from(css_height);
        let center = DVec2::new(self.width * 0.5, self.height * 0.5);
        self.state.position = center;
        self.state.previous = center;
    }

    pub fn target(&self, time_ms: f64, snapshot: &ConfigSnapshot) -> DVec2 {
        if self.reduced_motion {
            return DVec2::new(self.width * 0.5, self.height * 0.5);
        }
        target_point(
            self.seeds,
            time_ms / 1000.0,
            self.width,
            self.height,
            f64::from(snapshot.motion_speed),
            f64::from(snapshot.wave_amount),
        )
    }

    pub fn advance(&mut self, time_ms: f64, snapshot: &ConfigSnapshot) -> Contact {
        let dt = self.clock.tick(time_ms);
        let target = self.target(time_ms, snapshot);
        self.state.step(target, dt);
        Contact {
            position: self.state.position,
            velocity: self.state.velocity,
            direction: self.state.direction(),
            dt,
        }
    }
}
