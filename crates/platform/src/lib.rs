//! Platform layer: window, pointer input and the present loop (winit 0.30).
//!
//! `run()` opens a window, builds a [`SceneContext`] and drives
//! `renderer::GpuState` through winit's `ApplicationHandler` API. The loop
//! redraws continuously; vsync paces it.

use std::sync::Arc;
use std::time::Instant;

use anyhow::{Result, anyhow};
use corelib::SceneConfig;
use renderer::{FrameView, GpuState, RenderSettings};
use wgpu::{Backends, SurfaceError};
use winit::{
    application::ApplicationHandler,
    dpi::PhysicalSize,
    event::WindowEvent,
    event_loop::{ActiveEventLoop, ControlFlow, EventLoop},
    window::{Window, WindowAttributes, WindowId},
};

pub mod context;

pub use context::{AssetEvent, SceneContext};

/// Upper bound on a single frame step; long stalls don't skip the animation.
const MAX_FRAME_DT: f32 = 0.1;

/// Window and GPU options for [`run`].
#[derive(Clone, Debug)]
pub struct RunOptions {
    pub title: String,
    pub width: u32,
    pub height: u32,
    pub backends: Backends,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            title: "glance3d".to_owned(),
            width: 1280,
            height: 720,
            backends: Backends::PRIMARY,
        }
    }
}

struct App {
    options: RunOptions,
    config: SceneConfig,
    window: Option<Arc<Window>>,
    gpu: Option<GpuState>,
    scene: Option<SceneContext>,
    last_frame: Option<Instant>,
    /// First fatal error; returned from `run` after the loop exits.
    error: Option<anyhow::Error>,
}

impl App {
    fn new(config: SceneConfig, options: RunOptions) -> Self {
        Self {
            options,
            config,
            window: None,
            gpu: None,
            scene: None,
            last_frame: None,
            error: None,
        }
    }

    fn fail(&mut self, event_loop: &ActiveEventLoop, err: anyhow::Error) {
        log::error!("{err:#}");
        if self.error.is_none() {
            self.error = Some(err);
        }
        self.dispose();
        event_loop.exit();
    }

    fn init(&mut self, event_loop: &ActiveEventLoop) -> Result<()> {
        let attrs = WindowAttributes::default()
            .with_title(self.options.title.clone())
            .with_inner_size(PhysicalSize::new(self.options.width, self.options.height));
        let window = Arc::new(event_loop.create_window(attrs)?);
        let PhysicalSize { width, height } = window.inner_size();
        log::info!("Window created: {width}x{height}");

        let settings = RenderSettings {
            bloom: self.config.bloom,
            exposure: self.config.exposure,
        };
        let mut gpu = pollster::block_on(GpuState::new(
            window.clone(),
            self.options.backends,
            settings,
        ))?;
        let scene = SceneContext::init(self.config.clone(), (width, height))?;
        gpu.set_light_helper(scene.helper_primitive());

        self.window = Some(window);
        self.gpu = Some(gpu);
        self.scene = Some(scene);
        self.last_frame = Some(Instant::now());
        Ok(())
    }

    /// Tear down the scene and release GPU resources.
    fn dispose(&mut self) {
        if let Some(mut scene) = self.scene.take() {
            scene.dispose();
        }
        self.gpu = None;
        self.window = None;
    }

    fn apply_asset_events(&mut self, event_loop: &ActiveEventLoop) {
        let (Some(scene), Some(gpu)) = (self.scene.as_mut(), self.gpu.as_mut()) else {
            return;
        };
        if !scene.is_loading() {
            return;
        }
        match scene.poll_assets() {
            Ok(events) => {
                for event in events {
                    match event {
                        AssetEvent::ModelReady => gpu.set_primitives(scene.primitives()),
                        AssetEvent::EnvironmentReady(env) => gpu.set_environment(Some(&env)),
                    }
                }
            }
            Err(e) => self.fail(event_loop, anyhow!(e).context("Scene assembly failed")),
        }
    }

    fn redraw(&mut self, event_loop: &ActiveEventLoop) {
        let (Some(scene), Some(gpu)) = (self.scene.as_mut(), self.gpu.as_mut()) else {
            return;
        };
        let now = Instant::now();
        let dt = self
            .last_frame
            .replace(now)
            .map_or(0.0, |prev| (now - prev).as_secs_f32().min(MAX_FRAME_DT));
        scene.update(dt);

        let draws = scene.draw_list();
        let frame = FrameView {
            camera: scene.camera(),
            lighting: scene.lighting(),
            draws: &draws,
            helper: scene.helper_world(),
        };
        match gpu.render(&frame) {
            Ok(()) => {}
            Err(e) if GpuState::is_surface_lost(&e) => {
                log::debug!("Surface {e:?}; reconfiguring");
                gpu.recreate_surface();
            }
            Err(SurfaceError::OutOfMemory) => {
                self.fail(event_loop, anyhow!("GPU out of memory"));
            }
            Err(e) => log::warn!("Render error: {e:?}"),
        }
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() || self.error.is_some() {
            return;
        }
        if let Err(e) = self.init(event_loop) {
            self.fail(event_loop, e.context("Initialisation failed"));
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, window_id: WindowId, event: WindowEvent) {
        match self.window.as_ref() {
            Some(window) if window.id() == window_id => {}
            _ => return,
        }
        match event {
            WindowEvent::CloseRequested => {
                log::info!("Close requested. Exiting event loop.");
                self.dispose();
                event_loop.exit();
            }
            WindowEvent::Resized(size) => {
                log::debug!("Resized: {}x{}", size.width, size.height);
                if let Some(scene) = self.scene.as_mut() {
                    scene.resize(size.width, size.height);
                }
                // A minimised window reports 0x0; keep the last surface.
                if size.width > 0 && size.height > 0 {
                    if let Some(gpu) = self.gpu.as_mut() {
                        gpu.resize(size.width, size.height);
                    }
                }
            }
            WindowEvent::ScaleFactorChanged { scale_factor, .. } => {
                log::info!("Scale factor changed: {scale_factor:.3}");
            }
            WindowEvent::CursorMoved { position, .. } => {
                if let Some(scene) = self.scene.as_mut() {
                    if let Some(target) = scene.on_pointer_move(position.x as f32, position.y as f32) {
                        log::trace!("Pose target {target:?}");
                    }
                }
            }
            WindowEvent::RedrawRequested => self.redraw(event_loop),
            _ => {}
        }
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        self.apply_asset_events(event_loop);
        if let Some(window) = self.window.as_ref() {
            window.request_redraw();
        }
    }

    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        self.dispose();
    }
}

/// Open the window and run the scene until it is closed or fails.
pub fn run(config: SceneConfig, options: RunOptions) -> Result<()> {
    let event_loop = EventLoop::new()?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut app = App::new(config, options);
    event_loop
        .run_app(&mut app)
        .map_err(|e| anyhow!("Event loop error: {e:?}"))?;

    match app.error.take() {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_options_use_primary_backends() {
        let o = RunOptions::default();
        assert_eq!(o.backends, Backends::PRIMARY);
        assert_eq!((o.width, o.height), (1280, 720));
        assert_eq!(o.title, "glance3d");
    }
}
