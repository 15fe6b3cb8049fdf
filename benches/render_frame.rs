//! Frame render benchmarks on the software backend.
//! Run: cargo bench

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use glam::DVec2;
use gridgrain::renderer::Renderer;
use gridgrain::schema::{EffectConfig, ShapeKind};
use gridgrain::snapshot::{ConfigSnapshot, FrameParams};

fn frame_params(shape: ShapeKind) -> FrameParams {
    let mut config = EffectConfig::default();
    config.shape = shape;
    FrameParams::new(
        &ConfigSnapshot::from_config(&config),
        DVec2::new(640.0, 360.0),
        DVec2::new(0.8, -0.6),
        1.0,
        1280,
        720,
    )
}

fn bench_software_render(c: &mut Criterion) {
    let mut group = c.benchmark_group("render_frame");
    group.sample_size(20);

    for (label, shape) in [("circle", ShapeKind::Circle), ("blob", ShapeKind::Blob)] {
        let params = frame_params(shape);
        let mut renderer = Renderer::new_software(1280, 720).expect("create renderer");
        group.bench_function(format!("software_720p_{label}"), |b| {
            b.iter(|| black_box(renderer.render_frame_rgba(&params).expect("render")));
        });
    }

    group.finish();
}

criterion_group!(benches, bench_software_render);
criterion_main!(benches);
