//! Bloom: bright-pass at half resolution, then a blurred mip pyramid.
//!
//! Level `i` blurs horizontally out of level `i - 1` (or the bright-pass)
//! into a target half its size, then vertically in place. The composite pass
//! samples the vertical outputs of every level.

use std::num::NonZeroU64;

use bytemuck::{Pod, Zeroable};
use corelib::BloomConfig;
use wgpu::util::DeviceExt;
use wgpu::{
    BindGroup, BindGroupLayout, Buffer, BufferUsages, CommandEncoder, Device, RenderPipeline,
    Sampler, TextureView,
};

use crate::{HDR_FORMAT, Target};

/// Blur levels in the pyramid.
pub const BLOOM_LEVELS: usize = 5;

/// Feather width above the threshold.
const SMOOTH_WIDTH: f32 = 0.01;

#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
struct BloomUniform {
    step: [f32; 2],
    threshold: f32,
    smooth_width: f32,
}

/// Sizes of the bright-pass and each blur level for a viewport.
pub fn level_sizes(width: u32, height: u32) -> [(u32, u32); BLOOM_LEVELS + 1] {
    let mut out = [(1, 1); BLOOM_LEVELS + 1];
    let (mut w, mut h) = ((width / 2).max(1), (height / 2).max(1));
    out[0] = (w, h);
    for slot in out.iter_mut().skip(1) {
        *slot = (w, h);
        w = (w / 2).max(1);
        h = (h / 2).max(1);
    }
    out
}

struct Step {
    target: Target,
    bind_group: BindGroup,
    // Kept alive for the bind group.
    _uniform: Buffer,
}

struct Level {
    horizontal: Step,
    vertical: Step,
}

pub struct BloomPass {
    config: BloomConfig,
    layout: BindGroupLayout,
    sampler: Sampler,
    bright_pipeline: RenderPipeline,
    blur_pipeline: RenderPipeline,
    bright: Step,
    levels: Vec<Level>,
}

impl BloomPass {
    pub fn new(device: &Device, config: BloomConfig, input: &TextureView, width: u32, height: u32) -> Self {
        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Bloom WGSL"),
            source: wgpu::ShaderSource::Wgsl(include_str!("shaders/bloom.wgsl").into()),
        });

        let layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Bloom BGL"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 2,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: NonZeroU64::new(
                            std::mem::size_of::<BloomUniform>() as u64
                        ),
                    },
                    count: None,
                },
            ],
        });

        let sampler = crate::linear_clamp_sampler(device, "Bloom sampler");

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Bloom PipelineLayout"),
            bind_group_layouts: &[&layout],
            push_constant_ranges: &[],
        });
        let bright_pipeline =
            crate::fullscreen_pipeline(device, &pipeline_layout, &shader, "fs_bright", HDR_FORMAT, "Bloom bright");
        let blur_pipeline =
            crate::fullscreen_pipeline(device, &pipeline_layout, &shader, "fs_blur", HDR_FORMAT, "Bloom blur");

        let (bright, levels) = build_chain(device, &layout, &sampler, &config, input, width, height);

        Self {
            config,
            layout,
            sampler,
            bright_pipeline,
            blur_pipeline,
            bright,
            levels,
        }
    }

    pub fn config(&self) -> &BloomConfig {
        &self.config
    }

    /// Rebuild targets for a new viewport size / input view.
    pub fn resize(&mut self, device: &Device, input: &TextureView, width: u32, height: u32) {
        let (bright, levels) =
            build_chain(device, &self.layout, &self.sampler, &self.config, input, width, height);
        self.bright = bright;
        self.levels = levels;
    }

    /// Final (vertically blurred) view of every level, largest first.
    pub fn outputs(&self) -> [&TextureView; BLOOM_LEVELS] {
        std::array::from_fn(|i| &self.levels[i].vertical.target.view)
    }

    pub fn encode(&self, encoder: &mut CommandEncoder) {
        run_step(encoder, &self.bright_pipeline, &self.bright, "Bloom bright");
        for level in &self.levels {
            run_step(encoder, &self.blur_pipeline, &level.horizontal, "Bloom blur H");
            run_step(encoder, &self.blur_pipeline, &level.vertical, "Bloom blur V");
        }
    }
}

fn run_step(encoder: &mut CommandEncoder, pipeline: &RenderPipeline, step: &Step, label: &str) {
    let mut rpass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
        label: Some(label),
        color_attachments: &[Some(wgpu::RenderPassColorAttachment {
            view: &step.target.view,
            depth_slice: None,
            resolve_target: None,
            ops: wgpu::Operations {
                load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                store: wgpu::StoreOp::Store,
            },
        })],
        depth_stencil_attachment: None,
        occlusion_query_set: None,
        timestamp_writes: None,
    });
    rpass.set_pipeline(pipeline);
    rpass.set_bind_group(0, &step.bind_group, &[]);
    rpass.draw(0..3, 0..1);
}

fn build_chain(
    device: &Device,
    layout: &BindGroupLayout,
    sampler: &Sampler,
    config: &BloomConfig,
    input: &TextureView,
    width: u32,
    height: u32,
) -> (Step, Vec<Level>) {
    let sizes = level_sizes(width, height);

    let make_step = |label: &str, src: &TextureView, size: (u32, u32), step: [f32; 2]| {
        let target = Target::new(device, label, size.0, size.1, HDR_FORMAT);
        let uniform = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(label),
            contents: bytemuck::bytes_of(&BloomUniform {
                step,
                threshold: config.threshold,
                smooth_width: SMOOTH_WIDTH,
            }),
            usage: BufferUsages::UNIFORM,
        });
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(label),
            layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(src),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(sampler),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: uniform.as_entire_binding(),
                },
            ],
        });
        Step {
            target,
            bind_group,
            _uniform: uniform,
        }
    };

    let bright = make_step("Bloom bright", input, sizes[0], [0.0, 0.0]);

    let mut levels: Vec<Level> = Vec::with_capacity(BLOOM_LEVELS);
    for i in 0..BLOOM_LEVELS {
        let (w, h) = sizes[i + 1];
        let horizontal = {
            let src = match levels.last() {
                Some(prev) => &prev.vertical.target.view,
                None => &bright.target.view,
            };
            make_step("Bloom blur H", src, (w, h), [1.0 / w as f32, 0.0])
        };
        let vertical = make_step(
            "Bloom blur V",
            &horizontal.target.view,
            (w, h),
            [0.0, 1.0 / h as f32],
        );
        levels.push(Level {
            horizontal,
            vertical,
        });
    }
    (bright, levels)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn levels_halve_from_half_resolution() {
        assert_eq!(
            level_sizes(1280, 720),
            [
                (640, 360),
                (640, 360),
                (320, 180),
                (160, 90),
                (80, 45),
                (40, 22)
            ]
        );
    }

    #[test]
    fn tiny_viewports_never_hit_zero() {
        for (w, h) in [(1, 1), (3, 1), (0, 0)] {
            assert!(level_sizes(w, h).iter().all(|&(a, b)| a >= 1 && b >= 1));
        }
    }
}
