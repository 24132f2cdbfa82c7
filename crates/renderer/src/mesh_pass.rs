//! Lit mesh pass: uploads model primitives and draws them into the HDR target.

use std::num::NonZeroU64;

use asset::{EnvironmentMap, Material, MeshData, Primitive};
use bytemuck::{Pod, Zeroable};
use corelib::camera::Camera;
use corelib::light::Lighting;
use glam::Mat4;
use wgpu::util::DeviceExt;
use wgpu::{
    BindGroup, BindGroupLayout, BindGroupLayoutDescriptor, BindGroupLayoutEntry, BindingType,
    Buffer, BufferBindingType, BufferUsages, ColorTargetState, ColorWrites, DepthBiasState,
    DepthStencilState, Device, FragmentState, PipelineLayoutDescriptor, Queue, RenderPass,
    RenderPipeline, RenderPipelineDescriptor, Sampler, ShaderModuleDescriptor, ShaderSource,
    ShaderStages, TextureFormat, TextureView, VertexBufferLayout, VertexState, VertexStepMode,
};

use crate::{DEPTH_FORMAT, HDR_FORMAT};

/// Vertex: position + normal + uv.
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct Vertex {
    pub pos: [f32; 3],
    pub normal: [f32; 3],
    pub uv: [f32; 2],
}

impl Vertex {
    pub const LAYOUT: VertexBufferLayout<'static> = VertexBufferLayout {
        array_stride: std::mem::size_of::<Vertex>() as u64,
        step_mode: VertexStepMode::Vertex,
        attributes: &wgpu::vertex_attr_array![0 => Float32x3, 1 => Float32x3, 2 => Float32x2],
    };
}

/// Per-frame constants (16-byte aligned).
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct GlobalsUniform {
    pub view_proj: [[f32; 4]; 4],
    pub camera_pos: [f32; 4],
    pub ambient: [f32; 4],
    pub light_pos: [f32; 4],
    pub light_color: [f32; 4],
}

impl GlobalsUniform {
    pub fn new(camera: &Camera, lighting: &Lighting, env_mips: u32, env_enabled: bool) -> Self {
        let a = lighting.ambient.radiance();
        let p = &lighting.point;
        let c = p.color * p.intensity;
        Self {
            view_proj: camera.proj_view().to_cols_array_2d(),
            camera_pos: camera.position.extend(1.0).to_array(),
            ambient: [a.x, a.y, a.z, env_mips as f32],
            light_pos: p.position.extend(p.distance).to_array(),
            light_color: [c.x, c.y, c.z, if env_enabled { 1.0 } else { 0.0 }],
        }
    }
}

/// Per-draw constants, addressed with a dynamic offset.
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub struct DrawUniform {
    pub model: [[f32; 4]; 4],
    pub normal_mat: [[f32; 4]; 4],
    pub base_color: [f32; 4],
    pub emissive: [f32; 4],
    pub params: [f32; 4],
}

impl DrawUniform {
    pub fn new(world: Mat4, material: &Material) -> Self {
        let [er, eg, eb] = material.emissive;
        Self {
            model: world.to_cols_array_2d(),
            normal_mat: world.inverse().transpose().to_cols_array_2d(),
            base_color: material.base_color,
            emissive: [er, eg, eb, 0.0],
            params: [material.metallic, material.roughness, 0.0, 0.0],
        }
    }
}

/// One mesh to draw this frame: primitive index plus world matrix.
#[derive(Clone, Copy, Debug)]
pub struct DrawItem {
    pub primitive: usize,
    pub world: Mat4,
}

pub(crate) struct GpuMesh {
    vertex_buf: Buffer,
    index_buf: Buffer,
    index_count: u32,
    material: Material,
}

impl GpuMesh {
    fn upload(device: &Device, label: &str, mesh: &MeshData, material: Material) -> Self {
        let vertices: Vec<Vertex> = mesh
            .vertices
            .iter()
            .map(|v| Vertex {
                pos: v.position,
                normal: v.normal,
                uv: v.uv,
            })
            .collect();
        let vertex_buf = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(&format!("{label} VB")),
            contents: bytemuck::cast_slice(&vertices),
            usage: BufferUsages::VERTEX,
        });
        let index_buf = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(&format!("{label} IB")),
            contents: bytemuck::cast_slice(&mesh.indices),
            usage: BufferUsages::INDEX,
        });
        Self {
            vertex_buf,
            index_buf,
            index_count: mesh.indices.len() as u32,
            material,
        }
    }
}

#[inline]
pub(crate) fn align_up(value: u64, align: u64) -> u64 {
    value.div_ceil(align) * align
}

pub struct MeshPass {
    pipeline: RenderPipeline,
    globals_bgl: BindGroupLayout,
    globals_buf: Buffer,
    globals_bg: BindGroup,
    env_sampler: Sampler,
    env_view: TextureView,
    env_mips: u32,
    env_enabled: bool,

    draw_bgl: BindGroupLayout,
    draw_buf: Buffer,
    draw_bg: BindGroup,
    draw_stride: u64,
    draw_capacity: usize,

    /// Indexed like the loaded primitives; `None` for empty ones.
    meshes: Vec<Option<GpuMesh>>,
    helper: Option<GpuMesh>,
    /// Draws recorded by the last `prepare`.
    pending: Vec<(usize, Option<usize>)>,
}

const INITIAL_DRAW_CAPACITY: usize = 64;

impl MeshPass {
    pub fn new(device: &Device, queue: &Queue) -> Self {
        let shader = device.create_shader_module(ShaderModuleDescriptor {
            label: Some("Scene WGSL"),
            source: ShaderSource::Wgsl(include_str!("shaders/scene.wgsl").into()),
        });

        let globals_bgl = device.create_bind_group_layout(&BindGroupLayoutDescriptor {
            label: Some("Globals BGL"),
            entries: &[
                BindGroupLayoutEntry {
                    binding: 0,
                    visibility: ShaderStages::VERTEX_FRAGMENT,
                    ty: BindingType::Buffer {
                        ty: BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: NonZeroU64::new(
                            std::mem::size_of::<GlobalsUniform>() as u64
                        ),
                    },
                    count: None,
                },
                BindGroupLayoutEntry {
                    binding: 1,
                    visibility: ShaderStages::FRAGMENT,
                    ty: BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                BindGroupLayoutEntry {
                    binding: 2,
                    visibility: ShaderStages::FRAGMENT,
                    ty: BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });

        let draw_bgl = device.create_bind_group_layout(&BindGroupLayoutDescriptor {
            label: Some("Draw BGL"),
            entries: &[BindGroupLayoutEntry {
                binding: 0,
                visibility: ShaderStages::VERTEX_FRAGMENT,
                ty: BindingType::Buffer {
                    ty: BufferBindingType::Uniform,
                    has_dynamic_offset: true,
                    min_binding_size: NonZeroU64::new(std::mem::size_of::<DrawUniform>() as u64),
                },
                count: None,
            }],
        });

        let globals_buf = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Globals UBO"),
            size: std::mem::size_of::<GlobalsUniform>() as u64,
            usage: BufferUsages::UNIFORM | BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let env_sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Env sampler"),
            address_mode_u: wgpu::AddressMode::Repeat,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });
        let (env_view, env_mips) = upload_environment(device, queue, &EnvironmentMap::black());
        let globals_bg =
            create_globals_bg(device, &globals_bgl, &globals_buf, &env_view, &env_sampler);

        let draw_stride = align_up(
            std::mem::size_of::<DrawUniform>() as u64,
            device.limits().min_uniform_buffer_offset_alignment as u64,
        );
        let (draw_buf, draw_bg) =
            create_draw_buffer(device, &draw_bgl, draw_stride, INITIAL_DRAW_CAPACITY);

        let pipeline_layout = device.create_pipeline_layout(&PipelineLayoutDescriptor {
            label: Some("Scene PipelineLayout"),
            bind_group_layouts: &[&globals_bgl, &draw_bgl],
            push_constant_ranges: &[],
        });
        let pipeline = device.create_render_pipeline(&RenderPipelineDescriptor {
            label: Some("Scene Pipeline"),
            layout: Some(&pipeline_layout),
            vertex: VertexState {
                module: &shader,
                entry_point: Some("vs_main"),
                buffers: &[Vertex::LAYOUT],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            },
            fragment: Some(FragmentState {
                module: &shader,
                entry_point: Some("fs_main"),
                targets: &[Some(ColorTargetState {
                    format: HDR_FORMAT,
                    blend: None,
                    write_mask: ColorWrites::ALL,
                })],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            }),
            // Double-sided: no culling.
            primitive: wgpu::PrimitiveState::default(),
            depth_stencil: Some(DepthStencilState {
                format: DEPTH_FORMAT,
                depth_write_enabled: true,
                depth_compare: wgpu::CompareFunction::LessEqual,
                stencil: wgpu::StencilState::default(),
                bias: DepthBiasState::default(),
            }),
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
            cache: None,
        });

        Self {
            pipeline,
            globals_bgl,
            globals_buf,
            globals_bg,
            env_sampler,
            env_view,
            env_mips,
            env_enabled: false,
            draw_bgl,
            draw_buf,
            draw_bg,
            draw_stride,
            draw_capacity: INITIAL_DRAW_CAPACITY,
            meshes: Vec::new(),
            helper: None,
            pending: Vec::new(),
        }
    }

    /// Replace the environment texture; `None` disables environment lighting.
    pub fn set_environment(&mut self, device: &Device, queue: &Queue, env: Option<&EnvironmentMap>) {
        let black = EnvironmentMap::black();
        let (view, mips) = upload_environment(device, queue, env.unwrap_or(&black));
        self.env_view = view;
        self.env_mips = mips;
        self.env_enabled = env.is_some();
        self.globals_bg = create_globals_bg(
            device,
            &self.globals_bgl,
            &self.globals_buf,
            &self.env_view,
            &self.env_sampler,
        );
    }

    pub fn set_primitives(&mut self, device: &Device, primitives: &[Primitive]) {
        self.meshes = primitives
            .iter()
            .enumerate()
            .map(|(i, p)| {
                p.mesh.is_valid().then(|| {
                    GpuMesh::upload(device, &format!("Primitive {i}"), &p.mesh, p.material)
                })
            })
            .collect();
        let uploaded = self.meshes.iter().flatten().count();
        if uploaded != primitives.len() {
            log::warn!("{} empty primitives skipped", primitives.len() - uploaded);
        }
        log::info!("Uploaded {} primitives", uploaded);
    }

    pub fn set_helper(&mut self, device: &Device, helper: Option<&Primitive>) {
        self.helper =
            helper.map(|p| GpuMesh::upload(device, "Light helper", &p.mesh, p.material));
    }

    /// Write per-frame uniforms and record which meshes to draw.
    pub fn prepare(
        &mut self,
        device: &Device,
        queue: &Queue,
        camera: &Camera,
        lighting: &Lighting,
        draws: &[DrawItem],
        helper_world: Option<Mat4>,
    ) {
        let globals = GlobalsUniform::new(camera, lighting, self.env_mips, self.env_enabled);
        queue.write_buffer(&self.globals_buf, 0, bytemuck::bytes_of(&globals));

        self.pending.clear();
        let mut uniforms: Vec<DrawUniform> = Vec::with_capacity(draws.len() + 1);
        for item in draws {
            let Some(Some(mesh)) = self.meshes.get(item.primitive) else {
                continue;
            };
            self.pending.push((uniforms.len(), Some(item.primitive)));
            uniforms.push(DrawUniform::new(item.world, &mesh.material));
        }
        if let (Some(helper), Some(world)) = (&self.helper, helper_world) {
            self.pending.push((uniforms.len(), None));
            uniforms.push(DrawUniform::new(world, &helper.material));
        }

        if uniforms.len() > self.draw_capacity {
            self.draw_capacity = uniforms.len().next_power_of_two();
            let (buf, bg) =
                create_draw_buffer(device, &self.draw_bgl, self.draw_stride, self.draw_capacity);
            self.draw_buf = buf;
            self.draw_bg = bg;
            log::debug!("Draw uniform buffer grown to {} slots", self.draw_capacity);
        }

        let stride = self.draw_stride as usize;
        let mut bytes = vec![0u8; uniforms.len() * stride];
        for (i, u) in uniforms.iter().enumerate() {
            let src = bytemuck::bytes_of(u);
            bytes[i * stride..i * stride + src.len()].copy_from_slice(src);
        }
        if !bytes.is_empty() {
            queue.write_buffer(&self.draw_buf, 0, &bytes);
        }
    }

    pub fn draw(&self, rpass: &mut RenderPass<'_>) {
        rpass.set_pipeline(&self.pipeline);
        rpass.set_bind_group(0, &self.globals_bg, &[]);
        for &(slot, prim) in &self.pending {
            let mesh = match prim {
                Some(i) => self.meshes[i].as_ref(),
                None => self.helper.as_ref(),
            };
            let Some(mesh) = mesh else {
                continue;
            };
            let offset = (slot as u64 * self.draw_stride) as u32;
            rpass.set_bind_group(1, &self.draw_bg, &[offset]);
            rpass.set_vertex_buffer(0, mesh.vertex_buf.slice(..));
            rpass.set_index_buffer(mesh.index_buf.slice(..), wgpu::IndexFormat::Uint32);
            rpass.draw_indexed(0..mesh.index_count, 0, 0..1);
        }
    }
}

fn create_globals_bg(
    device: &Device,
    layout: &BindGroupLayout,
    buf: &Buffer,
    env_view: &TextureView,
    sampler: &Sampler,
) -> BindGroup {
    device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some("Globals BG"),
        layout,
        entries: &[
            wgpu::BindGroupEntry {
                binding: 0,
                resource: buf.as_entire_binding(),
            },
            wgpu::BindGroupEntry {
                binding: 1,
                resource: wgpu::BindingResource::TextureView(env_view),
            },
            wgpu::BindGroupEntry {
                binding: 2,
                resource: wgpu::BindingResource::Sampler(sampler),
            },
        ],
    })
}

fn create_draw_buffer(
    device: &Device,
    layout: &BindGroupLayout,
    stride: u64,
    capacity: usize,
) -> (Buffer, BindGroup) {
    let buf = device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("Draw UBO"),
        size: stride * capacity as u64,
        usage: BufferUsages::UNIFORM | BufferUsages::COPY_DST,
        mapped_at_creation: false,
    });
    let bg = device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some("Draw BG"),
        layout,
        entries: &[wgpu::BindGroupEntry {
            binding: 0,
            resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                buffer: &buf,
                offset: 0,
                size: NonZeroU64::new(std::mem::size_of::<DrawUniform>() as u64),
            }),
        }],
    });
    (buf, bg)
}

/// Upload an equirectangular map with a full CPU-built mip chain.
fn upload_environment(device: &Device, queue: &Queue, env: &EnvironmentMap) -> (TextureView, u32) {
    let chain = env.mip_chain();
    let mips = chain.len() as u32;
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some("Environment"),
        size: wgpu::Extent3d {
            width: env.width,
            height: env.height,
            depth_or_array_layers: 1,
        },
        mip_level_count: mips,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: TextureFormat::Rgba16Float,
        usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
        view_formats: &[],
    });
    for (level, map) in chain.iter().enumerate() {
        queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &texture,
                mip_level: level as u32,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            &map.to_rgba16f_bytes(),
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(map.width * 8),
                rows_per_image: Some(map.height),
            },
            wgpu::Extent3d {
                width: map.width,
                height: map.height,
                depth_or_array_layers: 1,
            },
        );
    }
    (texture.create_view(&wgpu::TextureViewDescriptor::default()), mips)
}

#[cfg(test)]
mod tests {
    use super::*;
    use corelib::light::{AmbientLight, PointLight};
    use corelib::{Vec3, vec3};

    #[test]
    fn uniform_sizes_are_16_byte_multiples() {
        assert_eq!(std::mem::size_of::<GlobalsUniform>() % 16, 0);
        assert_eq!(std::mem::size_of::<DrawUniform>() % 16, 0);
        assert!(std::mem::size_of::<DrawUniform>() as u64 <= align_up(176, 256));
    }

    #[test]
    fn align_up_rounds_to_multiple() {
        assert_eq!(align_up(176, 256), 256);
        assert_eq!(align_up(256, 256), 256);
        assert_eq!(align_up(257, 256), 512);
    }

    #[test]
    fn draw_uniform_carries_material_and_normal_matrix() {
        let world = Mat4::from_scale(vec3(2.0, 1.0, 1.0));
        let material = Material {
            base_color: [0.5, 0.4, 0.3, 1.0],
            emissive: [1.0, 0.0, 0.0],
            metallic: 0.2,
            roughness: 0.7,
        };
        let u = DrawUniform::new(world, &material);
        assert_eq!(u.base_color, material.base_color);
        assert_eq!(u.emissive, [1.0, 0.0, 0.0, 0.0]);
        assert_eq!(u.params[..2], [0.2, 0.7]);
        // Inverse-transpose of a non-uniform scale shrinks the stretched axis.
        assert!((u.normal_mat[0][0] - 0.5).abs() < 1e-6);
    }

    #[test]
    fn globals_pack_lights_and_env_flags() {
        let camera = Camera::new_perspective(1.0, 1.0, 0.1, 100.0).looking_at(
            vec3(0.0, 0.0, 5.0),
            Vec3::ZERO,
            Vec3::Y,
        );
        let lighting = Lighting {
            ambient: AmbientLight::new(Vec3::ONE, 0.5),
            point: PointLight::new(vec3(5.0, 5.0, 5.0), Vec3::ONE, 2.0, 10.0),
        };
        let g = GlobalsUniform::new(&camera, &lighting, 7, true);
        assert_eq!(g.ambient, [0.5, 0.5, 0.5, 7.0]);
        assert_eq!(g.light_pos, [5.0, 5.0, 5.0, 10.0]);
        assert_eq!(g.light_color, [2.0, 2.0, 2.0, 1.0]);
        assert_eq!(g.camera_pos, [0.0, 0.0, 5.0, 1.0]);

        let off = GlobalsUniform::new(&camera, &lighting, 1, false);
        assert_eq!(off.light_color[3], 0.0);
    }
}
