use anyhow::{bail, Result};
use glam::Vec2;
use rayon::prelude::*;
use tracing::{debug, warn};

use crate::composite::{shade_pixel, to_rgba8};
use crate::gpu::GpuBackend;
use crate::snapshot::FrameParams;

/// Which evaluator a [`Renderer`] should use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum BackendChoice {
    /// GPU when an adapter exists, software otherwise.
    #[default]
    Auto,
    Software,
    Gpu,
}

enum Backend {
    Software,
    Gpu(Box<GpuBackend>),
}

/// Produces one straight-alpha RGBA8 frame (row-major, top-left origin) per
/// [`FrameParams`].
pub struct Renderer {
    width: u32,
    height: u32,
    backend: Backend,
}

impl Renderer {
    /// Row-parallel CPU evaluator. This is the reference for deterministic
    /// output.
    pub fn new_software(width: u32, height: u32) -> Result<Self> {
        validate_size(width, height)?;
        Ok(Self {
            width,
            height,
            backend: Backend::Software,
        })
    }

    pub async fn new_gpu(width: u32, height: u32) -> Result<Self> {
        validate_size(width, height)?;
        let gpu = GpuBackend::new(width, height).await?;
        Ok(Self {
            width,
            height,
            backend: Backend::Gpu(Box::new(gpu)),
        })
    }

    pub async fn with_backend(choice: BackendChoice, width: u32, height: u32) -> Result<Self> {
        match choice {
            BackendChoice::Software => Self::new_software(width, height),
            BackendChoice::Gpu => Self::new_gpu(width, height).await,
            BackendChoice::Auto => match Self::new_gpu(width, height).await {
                Ok(renderer) => Ok(renderer),
                Err(error) => {
                    warn!(%error, "GPU backend unavailable, falling back to software");
                    Self::new_software(width, height)
                }
            },
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn is_gpu_backend(&self) -> bool {
        matches!(self.backend, Backend::Gpu(_))
    }

    pub fn backend_name(&self) -> &'static str {
        match self.backend {
            Backend::Software => "software",
            Backend::Gpu(_) => "gpu",
        }
    }

    /// Reallocate the framebuffer. A no-op when the size is unchanged.
    pub fn resize(&mut self, width: u32, height: u32) -> Result<()> {
        validate_size(width, height)?;
        if let Backend::Gpu(gpu) = &mut self.backend {
            gpu.resize(width, height)?;
        }
        if (width, height) != (self.width, self.height) {
            debug!(width, height, backend = self.backend_name(), "renderer resized");
        }
        self.width = width;
        self.height = height;
        Ok(())
    }

    pub fn render_frame_rgba(&mut self, frame: &FrameParams) -> Result<Vec<u8>> {
        if (frame.width, frame.height) != (self.width, self.height) {
            bail!(
                "frame is {}x{} but renderer is {}x{}",
                frame.width,
                frame.height,
                self.width,
                self.height
            );
        }
        match &mut self.backend {
            Backend::Software => Ok(render_software(frame)),
            Backend::Gpu(gpu) => gpu.render(frame),
        }
    }
}

fn validate_size(width: u32, height: u32) -> Result<()> {
    if width == 0 || height == 0 {
        bail!("renderer size must be positive, got {width}x{height}");
    }
    Ok(())
}

/// Evaluate every pixel centre on the CPU, one rayon task per row.
pub fn render_software(frame: &FrameParams) -> Vec<u8> {
    let row_bytes = frame.width as usize * 4;
    let mut rgba = vec![0_u8; row_bytes * frame.height as usize];
    rgba.par_chunks_mut(row_bytes)
        .enumerate()
        .for_each(|(y, row)| {
            let py = y as f32 + 0.5;
            for (x, pixel) in row.chunks_exact_mut(4).enumerate() {
                let shaded = shade_pixel(frame, Vec2::new(x as f32 + 0.5, py));
                pixel.copy_from_slice(&to_rgba8(shaded));
            }
        });
    rgba
}

#[cfg(test)]
mod tests {
    use glam::DVec2;

    use super::*;
    use crate::schema::EffectConfig;
    use crate::snapshot::ConfigSnapshot;

    fn frame(width: u32, height: u32) -> FrameParams {
        FrameParams::new(
            &ConfigSnapshot::from_config(&EffectConfig::default()),
            DVec2::new(f64::from(width) / 2.0, f64::from(height) / 2.0),
            DVec2::X,
            1.0,
            width,
            height,
        )
    }

    #[test]
    fn software_frame_has_expected_size_and_content() {
        let mut renderer = Renderer::new_software(96, 64).expect("renderer should build");
        assert!(!renderer.is_gpu_backend());
        let rgba = renderer
            .render_frame_rgba(&frame(96, 64))
            .expect("frame should render");
        assert_eq!(rgba.len(), 96 * 64 * 4);
        assert!(rgba.chunks_exact(4).any(|px| px[3] > 0));
        assert!(rgba.chunks_exact(4).any(|px| px[3] == 0));
    }

    #[test]
    fn mismatched_frame_size_is_rejected() {
        let mut renderer = Renderer::new_software(32, 32).expect("renderer should build");
        assert!(renderer.render_frame_rgba(&frame(16, 16)).is_err());
        renderer.resize(16, 16).expect("resize should succeed");
        assert!(renderer.render_frame_rgba(&frame(16, 16)).is_ok());
    }

    #[test]
    fn zero_size_is_rejected() {
        assert!(Renderer::new_software(0, 10).is_err());
        let mut renderer = Renderer::new_software(4, 4).expect("renderer should build");
        assert!(renderer.resize(4, 0).is_err());
    }

    #[test]
    fn software_render_is_repeatable() {
        let params = frame(48, 48);
        assert_eq!(render_software(&params), render_software(&params));
    }
}
