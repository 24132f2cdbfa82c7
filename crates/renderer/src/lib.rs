//! Renderer: wgpu init, lit mesh pass into HDR, bloom, tone-mapped composite.
//! wgpu = 26.x, winit = 0.30.x

use std::sync::Arc;

use anyhow::{Context, Result};
use asset::{EnvironmentMap, Primitive};
use corelib::BloomConfig;
use corelib::camera::Camera;
use corelib::light::Lighting;
use glam::Mat4;
use wgpu::{
    Backends, CommandEncoderDescriptor, Device, DeviceDescriptor, Features, Instance,
    InstanceDescriptor, Limits, LoadOp, Operations, PowerPreference, PresentMode, Queue,
    RenderPassColorAttachment, RenderPassDescriptor, StoreOp, Surface, SurfaceConfiguration,
    SurfaceError, TextureFormat, TextureUsages, TextureView,
};
use winit::{dpi::PhysicalSize, window::Window};

pub mod bloom;
pub mod composite;
pub mod mesh_pass;

use bloom::BloomPass;
use composite::CompositePass;
pub use mesh_pass::DrawItem;
use mesh_pass::MeshPass;

pub(crate) const DEPTH_FORMAT: TextureFormat = TextureFormat::Depth32Float;
pub(crate) const HDR_FORMAT: TextureFormat = TextureFormat::Rgba16Float;

/// Fixed post-processing knobs.
#[derive(Clone, Copy, Debug)]
pub struct RenderSettings {
    pub bloom: BloomConfig,
    pub exposure: f32,
}

/// Everything the renderer needs for one frame.
pub struct FrameView<'a> {
    pub camera: &'a Camera,
    pub lighting: &'a Lighting,
    pub draws: &'a [DrawItem],
    /// World matrix of the light helper, when it is shown.
    pub helper: Option<Mat4>,
}

/// Offscreen color target.
pub(crate) struct Target {
    #[allow(dead_code)]
    texture: wgpu::Texture,
    pub(crate) view: TextureView,
}

impl Target {
    pub(crate) fn new(device: &Device, label: &str, width: u32, height: u32, format: TextureFormat) -> Self {
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size: wgpu::Extent3d {
                width: width.max(1),
                height: height.max(1),
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format,
            usage: TextureUsages::RENDER_ATTACHMENT | TextureUsages::TEXTURE_BINDING,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Self { texture, view }
    }
}

pub(crate) fn linear_clamp_sampler(device: &Device, label: &str) -> wgpu::Sampler {
    device.create_sampler(&wgpu::SamplerDescriptor {
        label: Some(label),
        address_mode_u: wgpu::AddressMode::ClampToEdge,
        address_mode_v: wgpu::AddressMode::ClampToEdge,
        mag_filter: wgpu::FilterMode::Linear,
        min_filter: wgpu::FilterMode::Linear,
        ..Default::default()
    })
}

/// Pipeline drawing a single fullscreen triangle (no vertex buffers).
pub(crate) fn fullscreen_pipeline(
    device: &Device,
    layout: &wgpu::PipelineLayout,
    shader: &wgpu::ShaderModule,
    fs_entry: &str,
    format: TextureFormat,
    label: &str,
) -> wgpu::RenderPipeline {
    device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some(label),
        layout: Some(layout),
        vertex: wgpu::VertexState {
            module: shader,
            entry_point: Some("vs_fullscreen"),
            buffers: &[],
            compilation_options: wgpu::PipelineCompilationOptions::default(),
        },
        fragment: Some(wgpu::FragmentState {
            module: shader,
            entry_point: Some(fs_entry),
            targets: &[Some(wgpu::ColorTargetState {
                format,
                blend: None,
                write_mask: wgpu::ColorWrites::ALL,
            })],
            compilation_options: wgpu::PipelineCompilationOptions::default(),
        }),
        primitive: wgpu::PrimitiveState::default(),
        depth_stencil: None,
        multisample: wgpu::MultisampleState::default(),
        multiview: None,
        cache: None,
    })
}

pub struct GpuState {
    // Surface
    surface: Surface<'static>,
    surface_config: SurfaceConfiguration,

    // Device/queue
    device: Device,
    queue: Queue,

    // Passes
    mesh_pass: MeshPass,
    bloom: BloomPass,
    composite: CompositePass,

    // Size-dependent targets
    hdr: Target,
    depth_view: TextureView,

    // Size cache
    width: u32,
    height: u32,
}

impl GpuState {
    /// Create GPU state bound to an Arc<Window>.
    pub async fn new(window: Arc<Window>, backends: Backends, settings: RenderSettings) -> Result<Self> {
        let PhysicalSize { width, height } = window.inner_size();
        let width = width.max(1);
        let height = height.max(1);

        // Instance & surface
        let instance = Instance::new(&InstanceDescriptor {
            backends,
            ..Default::default()
        });
        let surface: Surface<'static> = instance
            .create_surface(window.clone())
            .context("create_surface failed")?;

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: PowerPreference::HighPerformance,
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .context("No suitable GPU adapter")?;
        log::info!("Using adapter: {:?}", adapter.get_info());

        let (device, queue) = adapter
            .request_device(&DeviceDescriptor {
                label: Some("glance3d Device"),
                required_features: Features::empty(),
                required_limits: Limits::downlevel_webgl2_defaults()
                    .using_resolution(adapter.limits()),
                memory_hints: Default::default(),
                trace: Default::default(),
            })
            .await
            .context("request_device failed")?;

        // Surface format (prefer sRGB: the composite writes linear values)
        let caps = surface.get_capabilities(&adapter);
        let surface_format = caps
            .formats
            .iter()
            .copied()
            .find(|f| f.is_srgb())
            .or_else(|| caps.formats.first().copied())
            .context("Surface reports no formats")?;

        let surface_config = SurfaceConfiguration {
            usage: TextureUsages::RENDER_ATTACHMENT,
            format: surface_format,
            width,
            height,
            present_mode: PresentMode::AutoVsync,
            alpha_mode: caps.alpha_modes[0],
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&device, &surface_config);

        let hdr = Target::new(&device, "HDR color", width, height, HDR_FORMAT);
        let depth_view = create_depth_view(&device, &surface_config);

        let mesh_pass = MeshPass::new(&device, &queue);
        let bloom = BloomPass::new(&device, settings.bloom, &hdr.view, width, height);
        let composite = CompositePass::new(&device, surface_format, &hdr.view, &bloom, settings.exposure);

        log::info!(
            "Renderer ready: {}x{}, surface {:?}, bloom {:?}",
            width,
            height,
            surface_format,
            settings.bloom
        );

        Ok(Self {
            surface,
            surface_config,
            device,
            queue,
            mesh_pass,
            bloom,
            composite,
            hdr,
            depth_view,
            width,
            height,
        })
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Resize: reconfigure surface & recreate every size-dependent target.
    pub fn resize(&mut self, width: u32, height: u32) {
        self.width = width.max(1);
        self.height = height.max(1);
        self.surface_config.width = self.width;
        self.surface_config.height = self.height;
        self.surface.configure(&self.device, &self.surface_config);
        self.depth_view = create_depth_view(&self.device, &self.surface_config);
        self.hdr = Target::new(&self.device, "HDR color", self.width, self.height, HDR_FORMAT);
        self.bloom.resize(&self.device, &self.hdr.view, self.width, self.height);
        self.composite.rebind(&self.device, &self.hdr.view, &self.bloom);
    }

    /// Install (or clear) the environment map.
    pub fn set_environment(&mut self, env: Option<&EnvironmentMap>) {
        self.mesh_pass.set_environment(&self.device, &self.queue, env);
    }

    /// Upload model primitives; indices match `DrawItem::primitive`.
    pub fn set_primitives(&mut self, primitives: &[Primitive]) {
        self.mesh_pass.set_primitives(&self.device, primitives);
    }

    pub fn set_light_helper(&mut self, helper: Option<&Primitive>) {
        self.mesh_pass.set_helper(&self.device, helper);
    }

    /// Render one frame: mesh pass -> bloom -> composite to the surface.
    pub fn render(&mut self, frame: &FrameView<'_>) -> Result<(), SurfaceError> {
        self.mesh_pass.prepare(
            &self.device,
            &self.queue,
            frame.camera,
            frame.lighting,
            frame.draws,
            frame.helper,
        );

        let output = self.surface.get_current_texture()?;
        let view = output.texture.create_view(&Default::default());

        let mut encoder = self
            .device
            .create_command_encoder(&CommandEncoderDescriptor {
                label: Some("MainEncoder"),
            });

        {
            let mut rpass = encoder.begin_render_pass(&RenderPassDescriptor {
                label: Some("ScenePass"),
                color_attachments: &[Some(RenderPassColorAttachment {
                    view: &self.hdr.view,
                    depth_slice: None,
                    resolve_target: None,
                    ops: Operations {
                        load: LoadOp::Clear(wgpu::Color::BLACK),
                        store: StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &self.depth_view,
                    depth_ops: Some(Operations {
                        load: LoadOp::Clear(1.0),
                        store: StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                occlusion_query_set: None,
                timestamp_writes: None,
            });
            self.mesh_pass.draw(&mut rpass);
        }

        self.bloom.encode(&mut encoder);
        self.composite.encode(&mut encoder, &view);

        self.queue.submit(Some(encoder.finish()));
        output.present();
        Ok(())
    }

    pub fn is_surface_lost(err: &SurfaceError) -> bool {
        matches!(err, SurfaceError::Lost | SurfaceError::Outdated)
    }

    pub fn recreate_surface(&mut self) {
        self.resize(self.width, self.height);
    }
}

/// Create a depth texture view matching the surface config.
fn create_depth_view(device: &Device, sc: &SurfaceConfiguration) -> TextureView {
    let tex = device.create_texture(&wgpu::TextureDescriptor {
        label: Some("DepthTex"),
        size: wgpu::Extent3d {
            width: sc.width.max(1),
            height: sc.height.max(1),
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: DEPTH_FORMAT,
        usage: TextureUsages::RENDER_ATTACHMENT,
        view_formats: &[],
    });
    tex.create_view(&wgpu::TextureViewDescriptor::default())
}
