use glam::DVec2;

use gridgrain::renderer::{render_software, Renderer};
use gridgrain::schema::{EffectConfig, ShapeKind};
use gridgrain::snapshot::{ConfigSnapshot, FrameParams};

#[test]
fn wgpu_grid_renders_close_to_software() {
    let mut config = EffectConfig::default();
    config.shape = ShapeKind::Blob;
    config.dot_final_opacity = 0.9;
    let frame = FrameParams::new(
        &ConfigSnapshot::from_config(&config),
        DVec2::new(40.0, 32.0),
        DVec2::new(0.6, 0.8),
        1.0,
        96,
        64,
    );

    let mut renderer = match pollster::block_on(Renderer::new_gpu(96, 64)) {
        Ok(r) => r,
        Err(e) => {
            let err_str = format!("{e:#}");
            if err_str.contains("no suitable GPU adapter found") {
                eprintln!("Skipping test: no GPU adapter found");
                return;
            }
            panic!("renderer failed to initialize: {e:?}");
        }
    };
    assert!(renderer.is_gpu_backend());

    let gpu = renderer
        .render_frame_rgba(&frame)
        .expect("render_frame_rgba should succeed");
    let cpu = render_software(&frame);
    assert_eq!(gpu.len(), cpu.len());
    assert!(gpu.chunks_exact(4).any(|px| px[3] > 0), "GPU output should not be empty");

    // Hash noise differs in the last bits between f32 pipelines; compare
    // coverage rather than exact bytes.
    let coverage = |rgba: &[u8]| rgba.chunks_exact(4).map(|px| u64::from(px[3])).sum::<u64>();
    let (gpu_cov, cpu_cov) = (coverage(&gpu) as f64, coverage(&cpu) as f64);
    assert!(
        (gpu_cov - cpu_cov).abs() <= cpu_cov * 0.1 + 64.0,
        "alpha coverage diverged: gpu={gpu_cov} cpu={cpu_cov}"
    );
}
