//! Final pass: HDR scene + weighted bloom levels, exposure, ACES tone map.

use std::num::NonZeroU64;

use bytemuck::{Pod, Zeroable};
use corelib::BloomConfig;
use wgpu::util::DeviceExt;
use wgpu::{BindGroup, BindGroupLayout, Buffer, CommandEncoder, Device, RenderPipeline, Sampler, TextureFormat, TextureView};

use crate::bloom::{BLOOM_LEVELS, BloomPass};

#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
struct CompositeUniform {
    /// Weights of bloom levels 0 to 3.
    weights: [f32; 4],
    /// x = weight of level 4, y = strength, z = exposure.
    params: [f32; 4],
}

impl CompositeUniform {
    fn new(bloom: &BloomConfig, exposure: f32) -> Self {
        let [w0, w1, w2, w3, w4] = bloom.level_weights::<BLOOM_LEVELS>();
        Self {
            weights: [w0, w1, w2, w3],
            params: [w4, bloom.strength, exposure, 0.0],
        }
    }
}

const SAMPLER_BINDING: u32 = BLOOM_LEVELS as u32 + 1;
const UNIFORM_BINDING: u32 = BLOOM_LEVELS as u32 + 2;

pub struct CompositePass {
    pipeline: RenderPipeline,
    layout: BindGroupLayout,
    sampler: Sampler,
    uniform: Buffer,
    bind_group: BindGroup,
}

impl CompositePass {
    pub fn new(
        device: &Device,
        output_format: TextureFormat,
        hdr: &TextureView,
        bloom: &BloomPass,
        exposure: f32,
    ) -> Self {
        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Composite WGSL"),
            source: wgpu::ShaderSource::Wgsl(include_str!("shaders/composite.wgsl").into()),
        });

        let texture_entry = |binding: u32| wgpu::BindGroupLayoutEntry {
            binding,
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Texture {
                sample_type: wgpu::TextureSampleType::Float { filterable: true },
                view_dimension: wgpu::TextureViewDimension::D2,
                multisampled: false,
            },
            count: None,
        };
        // HDR scene at binding 0, bloom levels at 1..=BLOOM_LEVELS.
        let mut entries: Vec<_> = (0..=BLOOM_LEVELS as u32).map(texture_entry).collect();
        entries.push(wgpu::BindGroupLayoutEntry {
            binding: SAMPLER_BINDING,
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
            count: None,
        });
        entries.push(wgpu::BindGroupLayoutEntry {
            binding: UNIFORM_BINDING,
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Buffer {
                ty: wgpu::BufferBindingType::Uniform,
                has_dynamic_offset: false,
                min_binding_size: NonZeroU64::new(std::mem::size_of::<CompositeUniform>() as u64),
            },
            count: None,
        });
        let layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Composite BGL"),
            entries: &entries,
        });

        let uniform = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Composite UBO"),
            contents: bytemuck::bytes_of(&CompositeUniform::new(bloom.config(), exposure)),
            usage: wgpu::BufferUsages::UNIFORM,
        });
        let sampler = crate::linear_clamp_sampler(device, "Composite sampler");

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Composite PipelineLayout"),
            bind_group_layouts: &[&layout],
            push_constant_ranges: &[],
        });
        let pipeline = crate::fullscreen_pipeline(
            device,
            &pipeline_layout,
            &shader,
            "fs_composite",
            output_format,
            "Composite",
        );

        let bind_group = create_bind_group(device, &layout, &sampler, &uniform, hdr, bloom);
        Self {
            pipeline,
            layout,
            sampler,
            uniform,
            bind_group,
        }
    }

    /// Re-point at resized inputs.
    pub fn rebind(&mut self, device: &Device, hdr: &TextureView, bloom: &BloomPass) {
        self.bind_group =
            create_bind_group(device, &self.layout, &self.sampler, &self.uniform, hdr, bloom);
    }

    pub fn encode(&self, encoder: &mut CommandEncoder, output: &TextureView) {
        let mut rpass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("CompositePass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: output,
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
        rpass.set_pipeline(&self.pipeline);
        rpass.set_bind_group(0, &self.bind_group, &[]);
        rpass.draw(0..3, 0..1);
    }
}

fn create_bind_group(
    device: &Device,
    layout: &BindGroupLayout,
    sampler: &Sampler,
    uniform: &Buffer,
    hdr: &TextureView,
    bloom: &BloomPass,
) -> BindGroup {
    let mut entries = vec![wgpu::BindGroupEntry {
        binding: 0,
        resource: wgpu::BindingResource::TextureView(hdr),
    }];
    for (i, view) in bloom.outputs().into_iter().enumerate() {
        entries.push(wgpu::BindGroupEntry {
            binding: i as u32 + 1,
            resource: wgpu::BindingResource::TextureView(view),
        });
    }
    entries.push(wgpu::BindGroupEntry {
        binding: SAMPLER_BINDING,
        resource: wgpu::BindingResource::Sampler(sampler),
    });
    entries.push(wgpu::BindGroupEntry {
        binding: UNIFORM_BINDING,
        resource: uniform.as_entire_binding(),
    });
    device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some("Composite BG"),
        layout,
        entries: &entries,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uniform_packs_weights_strength_and_exposure() {
        let u = CompositeUniform::new(&BloomConfig::default(), 1.0);
        let expect = [0.68, 0.64, 0.6, 0.56];
        for (a, b) in u.weights.iter().zip(expect) {
            assert!((a - b).abs() < 1e-5, "{a} vs {b}");
        }
        assert!((u.params[0] - 0.52).abs() < 1e-5);
        assert_eq!(u.params[1], 1.5);
        assert_eq!(u.params[2], 1.0);
        assert_eq!(std::mem::size_of::<CompositeUniform>() % 16, 0);
    }

    #[test]
    fn bindings_follow_the_bloom_levels() {
        assert_eq!(SAMPLER_BINDING, 6);
        assert_eq!(UNIFORM_BINDING, 7);
    }
}
