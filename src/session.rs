//! The frame loop a host drives: one [`Session::tick`] per displayed frame.
//!
//! A session owns the motion state and the renderer. Each tick takes a fresh
//! [`ConfigSnapshot`] of whatever the host's configuration looks like right
//! now, advances motion exactly once, and renders. Zero-area surfaces skip
//! the frame without touching motion; after [`Session::shutdown`] every tick
//! fails.

use anyhow::{Context, Result};
use tracing::{debug, info};

use crate::error_codes::{CodedError, E_SESSION_CLOSED};
use crate::motion::{Contact, MotionSeeds, MotionSimulator};
use crate::renderer::Renderer;
use crate::schema::{backing_size, effective_pixel_ratio, EffectConfig, Environment, Surface};
use crate::snapshot::{ConfigSnapshot, FrameParams};

/// A rendered frame: straight-alpha RGBA8, row-major from the top-left.
#[derive(Debug, Clone)]
pub struct Frame {
    pub index: u64,
    pub width: u32,
    pub height: u32,
    pub rgba: Vec<u8>,
    pub contact: Contact,
}

#[derive(Debug, Clone)]
pub enum FrameOutcome {
    Rendered(Frame),
    /// The surface had zero area; nothing was drawn and motion did not move.
    Skipped,
}

impl FrameOutcome {
    pub fn into_frame(self) -> Option<Frame> {
        match self {
            Self::Rendered(frame) => Some(frame),
            Self::Skipped => None,
        }
    }
}

pub struct Session {
    renderer: Option<Renderer>,
    motion: MotionSimulator,
    surface: Surface,
    device_pixel_ratio: f32,
    frames_rendered: u64,
}

impl Session {
    /// `renderer` is resized to the backing size of `surface` when the
    /// surface is non-empty.
    pub fn new(
        mut renderer: Renderer,
        surface: Surface,
        device_pixel_ratio: f32,
        seeds: MotionSeeds,
    ) -> Result<Self> {
        if !surface.is_empty() {
            let (width, height) = backing_size(surface.width, surface.height, device_pixel_ratio);
            renderer.resize(width, height)?;
        }
        info!(
            css_width = surface.width,
            css_height = surface.height,
            pixel_ratio = effective_pixel_ratio(device_pixel_ratio),
            backend = renderer.backend_name(),
            "session started"
        );
        Ok(Self {
            renderer: Some(renderer),
            motion: MotionSimulator::new(seeds, surface.width, surface.height),
            surface,
            device_pixel_ratio,
            frames_rendered: 0,
        })
    }

    /// Build from a manifest environment. A missing seed draws random motion
    /// phases.
    pub fn from_environment(environment: &Environment, renderer: Renderer) -> Result<Self> {
        let seeds = environment
            .seed
            .map_or_else(MotionSeeds::random, MotionSeeds::from_seed);
        let mut session = Self::new(
            renderer,
            environment.surface,
            environment.device_pixel_ratio,
            seeds,
        )?;
        session.set_reduced_motion(environment.reduced_motion);
        Ok(session)
    }

    pub fn surface(&self) -> Surface {
        self.surface
    }

    pub fn pixel_ratio(&self) -> f32 {
        effective_pixel_ratio(self.device_pixel_ratio)
    }

    /// Backing framebuffer size in device pixels.
    pub fn backing_size(&self) -> (u32, u32) {
        backing_size(self.surface.width, self.surface.height, self.device_pixel_ratio)
    }

    pub fn frames_rendered(&self) -> u64 {
        self.frames_rendered
    }

    pub fn motion(&self) -> &MotionSimulator {
        &self.motion
    }

    pub fn reduced_motion(&self) -> bool {
        self.motion.reduced_motion()
    }

    pub fn set_reduced_motion(&mut self, reduced: bool) {
        if reduced != self.motion.reduced_motion() {
            debug!(reduced, "reduced motion changed");
        }
        self.motion.set_reduced_motion(reduced);
    }

    pub fn is_closed(&self) -> bool {
        self.renderer.is_none()
    }

    pub fn is_gpu_backend(&self) -> bool {
        self.renderer.as_ref().is_some_and(Renderer::is_gpu_backend)
    }

    /// Recentre motion on the new surface and reallocate the framebuffer.
    pub fn resize(&mut self, css_width: u32, css_height: u32, device_pixel_ratio: f32) -> Result<()> {
        let renderer = self.renderer.as_mut().ok_or_else(closed_error)?;
        self.surface = Surface {
            width: css_width,
            height: css_height,
        };
        self.device_pixel_ratio = device_pixel_ratio;
        if self.surface.is_empty() {
            debug!(css_width, css_height, "surface collapsed to zero area");
            return Ok(());
        }

        self.motion.resize(css_width, css_height);
        let (width, height) = backing_size(css_width, css_height, device_pixel_ratio);
        renderer
            .resize(width, height)
            .context("failed to resize renderer")?;
        debug!(css_width, css_height, width, height, "session resized");
        Ok(())
    }

    /// Step motion without rasterising, e.g. to reach frame N of an offline
    /// render.
    pub fn advance(&mut self, time_ms: f64, config: &EffectConfig) -> Result<Option<Contact>> {
        if self.renderer.is_none() {
            return Err(closed_error());
        }
        if self.surface.is_empty() {
            return Ok(None);
        }
        let snapshot = ConfigSnapshot::from_config(config);
        Ok(Some(self.motion.advance(time_ms, &snapshot)))
    }

    pub fn tick(&mut self, time_ms: f64, config: &EffectConfig) -> Result<FrameOutcome> {
        let renderer = self.renderer.as_mut().ok_or_else(closed_error)?;
        if self.surface.is_empty() {
            return Ok(FrameOutcome::Skipped);
        }

        let snapshot = ConfigSnapshot::from_config(config);
        let contact = self.motion.advance(time_ms, &snapshot);
        let (width, height) = (renderer.width(), renderer.height());
        let params = FrameParams::new(
            &snapshot,
            contact.position,
            contact.direction,
            effective_pixel_ratio(self.device_pixel_ratio),
            width,
            height,
        );
        let rgba = renderer
            .render_frame_rgba(&params)
            .with_context(|| format!("failed to render frame {}", self.frames_rendered))?;

        let index = self.frames_rendered;
        self.frames_rendered += 1;
        debug!(frame = index, dt = contact.dt, x = contact.position.x, y = contact.position.y, "frame rendered");
        Ok(FrameOutcome::Rendered(Frame {
            index,
            width,
            height,
            rgba,
            contact,
        }))
    }

    /// Release the renderer. Every later call fails with `E_SESSION_CLOSED`.
    pub fn shutdown(&mut self) {
        if let Some(renderer) = self.renderer.take() {
            info!(
                frames = self.frames_rendered,
                backend = renderer.backend_name(),
                "session shut down"
            );
        }
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn closed_error() -> anyhow::Error {
    anyhow::Error::new(CodedError::runtime(
        E_SESSION_CLOSED,
        "session has been shut down",
    ))
}

#[cfg(test)]
mod tests {
    use glam::DVec2;

    use super::*;
    use crate::error_codes::find_coded_error;

    fn session(width: u32, height: u32, ratio: f32) -> Session {
        let renderer = Renderer::new_software(1, 1).expect("renderer should build");
        Session::new(
            renderer,
            Surface { width, height },
            ratio,
            MotionSeeds::from_seed(5),
        )
        .expect("session should start")
    }

    #[test]
    fn tick_renders_at_backing_size() {
        let mut session = session(40, 30, 2.0);
        let frame = session
            .tick(0.0, &EffectConfig::default())
            .expect("tick should succeed")
            .into_frame()
            .expect("frame should render");
        assert_eq!((frame.width, frame.height), (60, 45));
        assert_eq!(frame.rgba.len(), 60 * 45 * 4);
        assert_eq!(frame.index, 0);
        assert_eq!(session.frames_rendered(), 1);
    }

    #[test]
    fn zero_area_skips_without_moving() {
        let mut session = session(40, 30, 1.0);
        session.resize(0, 30, 1.0).expect("resize should succeed");
        let before = *session.motion().state();
        let outcome = session.tick(16.0, &EffectConfig::default()).expect("tick");
        assert!(matches!(outcome, FrameOutcome::Skipped));
        assert_eq!(*session.motion().state(), before);
        assert_eq!(session.frames_rendered(), 0);

        session.resize(20, 10, 1.0).expect("resize should succeed");
        let frame = session
            .tick(32.0, &EffectConfig::default())
            .expect("tick")
            .into_frame()
            .expect("frame");
        assert_eq!((frame.width, frame.height), (20, 10));
    }

    #[test]
    fn resize_recenters_motion() {
        let mut session = session(100, 100, 1.0);
        for step in 0..10 {
            session
                .tick(f64::from(step) * 16.0, &EffectConfig::default())
                .expect("tick");
        }
        session.resize(64, 32, 1.0).expect("resize");
        assert_eq!(session.motion().state().position, DVec2::new(32.0, 16.0));
    }

    #[test]
    fn closed_session_rejects_ticks() {
        let mut session = session(10, 10, 1.0);
        session.shutdown();
        assert!(session.is_closed());
        let error = session
            .tick(0.0, &EffectConfig::default())
            .expect_err("closed session should fail");
        assert_eq!(
            find_coded_error(&error).map(|coded| coded.code),
            Some(E_SESSION_CLOSED)
        );
        assert!(session.resize(5, 5, 1.0).is_err());
        assert!(session.advance(0.0, &EffectConfig::default()).is_err());
    }

    #[test]
    fn advance_matches_tick_motion() {
        let config = EffectConfig::default();
        let mut warmed = session(50, 50, 1.0);
        let mut ticked = session(50, 50, 1.0);
        for step in 0..5 {
            let time = f64::from(step) * 33.0;
            warmed.advance(time, &config).expect("advance");
            ticked.tick(time, &config).expect("tick");
        }
        assert_eq!(warmed.motion().state(), ticked.motion().state());
    }
}
