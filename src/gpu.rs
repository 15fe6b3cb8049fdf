use std::num::NonZeroU32;
use std::sync::mpsc;

use anyhow::{anyhow, bail, Context, Result};
use bytemuck::{Pod, Zeroable};
use tracing::debug;
use wgpu::util::DeviceExt;

use crate::color::Rgb;
use crate::snapshot::FrameParams;

const GRID_SHADER: &str = include_str!("../shaders/grid.wgsl");
const TARGET_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;

/// Uniform block mirrored by `struct Grid` in `shaders/grid.wgsl`. Every
/// member is a vec4 so the std140 layout needs no manual padding.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct GridUniform {
    pub dot_color: [f32; 4],
    pub back_color: [f32; 4],
    pub front_color: [f32; 4],
    pub motion: [f32; 4],
    pub surface: [f32; 4],
    pub shape: [f32; 4],
    pub blob: [f32; 4],
    pub dots: [f32; 4],
    pub dots_extra: [f32; 4],
    pub grain_mode: [f32; 4],
    pub grain_tone: [f32; 4],
    pub grain_falloff: [f32; 4],
    pub grain_tuning: [f32; 4],
    pub grain_noise: [f32; 4],
}

impl GridUniform {
    pub fn from_frame(frame: &FrameParams) -> Self {
        let dots = &frame.dots;
        let grain = &frame.grain;
        let shape = &frame.shape;
        let tuning = &grain.tuning;
        let rgb = |c: Rgb, w: f32| [c.r, c.g, c.b, w];

        Self {
            dot_color: rgb(dots.color, 1.0),
            back_color: rgb(grain.back_color, grain.back_opacity),
            front_color: rgb(grain.front_color, grain.front_opacity),
            motion: [
                frame.contact.x,
                frame.contact.y,
                frame.direction.x,
                frame.direction.y,
            ],
            surface: [
                frame.width as f32,
                frame.height as f32,
                frame.spacing,
                frame.radius,
            ],
            shape: [
                shape.kind.gpu_index(),
                shape.stretch.x,
                shape.stretch.y,
                shape.blob_seed,
            ],
            blob: [shape.blob_lobes, shape.blob_jaggedness, shape.blob_scale, 0.0],
            dots: [
                dots.base_opacity,
                dots.final_opacity,
                dots.size,
                dots.roundness,
            ],
            dots_extra: [dots.compression, dots.separation, dots.sharpness, 0.0],
            grain_mode: [
                grain.amount,
                grain.background.gpu_index(),
                grain.blend_mode.gpu_index(),
                grain.contrast,
            ],
            grain_tone: [grain.lift, grain.gamma, grain.bias, grain.offset],
            grain_falloff: [
                grain.intensity,
                grain.radial_falloff,
                grain.edge_steepness,
                grain.density_scale,
            ],
            grain_tuning: [
                tuning.coverage,
                tuning.threshold_gain,
                tuning.edge_softness,
                tuning.presence,
            ],
            grain_noise: [tuning.breakup, tuning.dither, grain.falloff_onset, 0.0],
        }
    }
}

struct RenderTarget {
    width: u32,
    height: u32,
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    readback_buffer: wgpu::Buffer,
    unpadded_bytes_per_row: u32,
    padded_bytes_per_row: u32,
}

impl RenderTarget {
    fn new(device: &wgpu::Device, width: u32, height: u32) -> Result<Self> {
        if width == 0 || height == 0 {
            bail!("render target must be non-empty, got {width}x{height}");
        }

        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("gridgrain-render-target"),
            size: wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: TARGET_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());

        let unpadded_bytes_per_row = width
            .checked_mul(4)
            .ok_or_else(|| anyhow!("frame width overflow when computing row bytes"))?;
        let padded_bytes_per_row =
            align_to(unpadded_bytes_per_row, wgpu::COPY_BYTES_PER_ROW_ALIGNMENT);
        let readback_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("gridgrain-readback-buffer"),
            size: u64::from(padded_bytes_per_row) * u64::from(height),
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });

        Ok(Self {
            width,
            height,
            texture,
            view,
            readback_buffer,
            unpadded_bytes_per_row,
            padded_bytes_per_row,
        })
    }
}

/// Fragment-shader evaluation of the effect with RGBA8 readback.
pub struct GpuBackend {
    device: wgpu::Device,
    queue: wgpu::Queue,
    pipeline: wgpu::RenderPipeline,
    uniform_buffer: wgpu::Buffer,
    bind_group: wgpu::BindGroup,
    target: RenderTarget,
}

impl GpuBackend {
    pub async fn new(width: u32, height: u32) -> Result<Self> {
        let instance = wgpu::Instance::default();
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                force_fallback_adapter: false,
                compatible_surface: None,
            })
            .await
            .ok_or_else(|| anyhow!("no suitable GPU adapter found"))?;
        let info = adapter.get_info();
        debug!(adapter = %info.name, backend = ?info.backend, "selected GPU adapter");

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("gridgrain-device"),
                    required_features: wgpu::Features::empty(),
                    required_limits: wgpu::Limits::default(),
                },
                None,
            )
            .await
            .context("failed to request wgpu device")?;

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("gridgrain-bind-group-layout"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: wgpu::BufferSize::new(
                        std::mem::size_of::<GridUniform>() as u64,
                    ),
                },
                count: None,
            }],
        });

        let uniform_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("gridgrain-uniforms"),
            contents: bytemuck::bytes_of(&GridUniform::zeroed()),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });

        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("gridgrain-bind-group"),
            layout: &bind_group_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: uniform_buffer.as_entire_binding(),
            }],
        });

        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("gridgrain-shader"),
            source: wgpu::ShaderSource::Wgsl(GRID_SHADER.into()),
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("gridgrain-pipeline-layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("gridgrain-pipeline"),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: "vs_main",
                buffers: &[],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            },
            primitive: wgpu::PrimitiveState::default(),
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            fragment: Some(wgpu::FragmentState {
                module: &shader,
                entry_point: "fs_main",
                targets: &[Some(wgpu::ColorTargetState {
                    format: TARGET_FORMAT,
                    blend: None,
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            }),
            multiview: None,
        });

        let target = RenderTarget::new(&device, width, height)?;

        Ok(Self {
            device,
            queue,
            pipeline,
            uniform_buffer,
            bind_group,
            target,
        })
    }

    pub fn resize(&mut self, width: u32, height: u32) -> Result<()> {
        if (width, height) == (self.target.width, self.target.height) {
            return Ok(());
        }
        self.target = RenderTarget::new(&self.device, width, height)?;
        Ok(())
    }

    pub fn render(&mut self, frame: &FrameParams) -> Result<Vec<u8>> {
        self.queue.write_buffer(
            &self.uniform_buffer,
            0,
            bytemuck::bytes_of(&GridUniform::from_frame(frame)),
        );

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("gridgrain-render-encoder"),
            });

        {
            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("gridgrain-render-pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &self.target.view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::TRANSPARENT),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                occlusion_query_set: None,
                timestamp_writes: None,
            });
            render_pass.set_pipeline(&self.pipeline);
            render_pass.set_bind_group(0, &self.bind_group, &[]);
            render_pass.draw(0..3, 0..1);
        }

        let target = &self.target;
        let padded_bytes_per_row = NonZeroU32::new(target.padded_bytes_per_row)
            .ok_or_else(|| anyhow!("invalid padded row size {}", target.padded_bytes_per_row))?;
        let rows_per_image = NonZeroU32::new(target.height)
            .ok_or_else(|| anyhow!("invalid render height {}", target.height))?;

        encoder.copy_texture_to_buffer(
            wgpu::ImageCopyTexture {
                texture: &target.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::ImageCopyBuffer {
                buffer: &target.readback_buffer,
                layout: wgpu::ImageDataLayout {
                    offset: 0,
                    bytes_per_row: Some(padded_bytes_per_row.get()),
                    rows_per_image: Some(rows_per_image.get()),
                },
            },
            wgpu::Extent3d {
                width: target.width,
                height: target.height,
                depth_or_array_layers: 1,
            },
        );

        self.queue.submit(Some(encoder.finish()));
        self.read_buffer()
    }

    fn read_buffer(&mut self) -> Result<Vec<u8>> {
        let target = &self.target;
        let buffer_slice = target.readback_buffer.slice(..);
        let (sender, receiver) = mpsc::channel();

        buffer_slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = sender.send(result);
        });
        self.device.poll(wgpu::Maintain::Wait);

        receiver
            .recv()
            .map_err(|_| anyhow!("failed receiving GPU map callback"))?
            .context("GPU buffer mapping failed")?;

        let row_bytes = target.unpadded_bytes_per_row as usize;
        let mapped = buffer_slice.get_mapped_range();
        let mut frame = vec![0_u8; row_bytes * target.height as usize];
        for (row_index, chunk) in mapped
            .chunks(target.padded_bytes_per_row as usize)
            .take(target.height as usize)
            .enumerate()
        {
            let dst_start = row_index * row_bytes;
            frame[dst_start..dst_start + row_bytes].copy_from_slice(&chunk[..row_bytes]);
        }

        drop(mapped);
        target.readback_buffer.unmap();
        Ok(frame)
    }
}

fn align_to(value: u32, alignment: u32) -> u32 {
    let mask = alignment - 1;
    (value + mask) & !mask
}

#[cfg(test)]
mod tests {
    use glam::DVec2;

    use super::*;
    use crate::schema::{EffectConfig, GrainBackground, ShapeKind};
    use crate::snapshot::ConfigSnapshot;

    #[test]
    fn uniform_size_is_vec4_aligned() {
        assert_eq!(std::mem::size_of::<GridUniform>() % 16, 0);
        assert_eq!(std::mem::size_of::<GridUniform>(), 14 * 16);
    }

    #[test]
    fn uniform_packs_frame_fields() {
        let config = EffectConfig {
            shape: ShapeKind::Blob,
            grain_background: GrainBackground::Light,
            ..EffectConfig::default()
        };
        let frame = FrameParams::new(
            &ConfigSnapshot::from_config(&config),
            DVec2::new(10.0, 20.0),
            DVec2::new(0.0, 1.0),
            1.5,
            90,
            60,
        );
        let uniform = GridUniform::from_frame(&frame);
        assert_eq!(uniform.motion, [15.0, 30.0, 0.0, 1.0]);
        assert_eq!(uniform.surface, [90.0, 60.0, 36.0, 270.0]);
        assert_eq!(uniform.shape[0], 3.0);
        assert_eq!(uniform.shape[3], 127.0);
        assert_eq!(uniform.grain_mode[1], 1.0);
        assert_eq!(uniform.grain_noise[0], frame.grain.tuning.breakup);
    }

    #[test]
    fn rows_align_to_copy_alignment() {
        assert_eq!(align_to(4, 256), 256);
        assert_eq!(align_to(256, 256), 256);
        assert_eq!(align_to(1_284, 256), 1_536);
    }
}
