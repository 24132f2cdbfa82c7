//! Scene controller: owns the scene graph, camera, lights, pose animator and
//! the pending asset loads. Windowing and GPU code stay in `lib.rs`.

use anyhow::Result;
use asset::{
    AssetSource, AssetTask, CameraDef, CameraProjection, EnvironmentMap, LoadedScene, Material, MeshData,
    Primitive, load_gltf_from_path,
};
use corelib::camera::Camera;
use corelib::light::Lighting;
use corelib::{
    Mat4, PoseAnimator, RotationTarget, SceneConfig, SceneError, SceneGraph, SceneResult, Vec3,
};
use renderer::DrawItem;

/// Something the GPU side has to react to after a poll.
#[derive(Debug)]
pub enum AssetEvent {
    /// Model installed; re-upload `SceneContext::primitives()`.
    ModelReady,
    EnvironmentReady(EnvironmentMap),
}

pub struct SceneContext {
    config: SceneConfig,
    graph: SceneGraph,
    primitives: Vec<Primitive>,
    camera: Camera,
    lighting: Lighting,
    animator: PoseAnimator,
    viewport: (u32, u32),
    helper: Option<Primitive>,
    model_task: Option<AssetTask<LoadedScene>>,
    env_task: Option<AssetTask<EnvironmentMap>>,
}

impl SceneContext {
    /// Build the scene and start both asset loads in the background.
    pub fn init(config: SceneConfig, viewport: (u32, u32)) -> Result<Self> {
        let model_path = config.model_path.clone();
        let model_task = AssetTask::spawn("model", move || load_gltf_from_path(&model_path))?;
        let env_source = AssetSource::parse(&config.env_map);
        let env_task =
            AssetTask::spawn("environment", move || EnvironmentMap::from_source(&env_source))?;
        Ok(Self::with_tasks(config, viewport, model_task, env_task))
    }

    pub fn with_tasks(
        config: SceneConfig,
        viewport: (u32, u32),
        model_task: AssetTask<LoadedScene>,
        env_task: AssetTask<EnvironmentMap>,
    ) -> Self {
        let cam_cfg = config.camera;
        let mut camera = Camera::new_perspective(
            cam_cfg.fov_y_deg.to_radians(),
            1.0,
            cam_cfg.z_near,
            cam_cfg.z_far,
        )
        .looking_at(cam_cfg.fallback_eye, cam_cfg.fallback_target, Vec3::Y);
        camera.set_viewport(viewport.0, viewport.1);

        let lighting = config.lighting;
        let helper = config.light_helper.then(|| Primitive {
            mesh: MeshData::cube(config.light_helper_size),
            material: Material::emissive((lighting.point.color * lighting.point.intensity).to_array()),
        });

        log::info!(
            "Scene initialised: ambient {:?}, point light at {:?}, animating node '{}' (policy: {})",
            lighting.ambient.radiance(),
            lighting.point.position,
            config.node_name,
            config.asset_policy
        );

        Self {
            animator: PoseAnimator::new(config.pose),
            config,
            graph: SceneGraph::new(),
            primitives: Vec::new(),
            camera,
            lighting,
            viewport,
            helper,
            model_task: Some(model_task),
            env_task: Some(env_task),
        }
    }

    pub fn config(&self) -> &SceneConfig {
        &self.config
    }

    pub fn graph(&self) -> &SceneGraph {
        &self.graph
    }

    pub fn camera(&self) -> &Camera {
        &self.camera
    }

    pub fn lighting(&self) -> &Lighting {
        &self.lighting
    }

    pub fn animator(&self) -> &PoseAnimator {
        &self.animator
    }

    pub fn primitives(&self) -> &[Primitive] {
        &self.primitives
    }

    pub fn helper_primitive(&self) -> Option<&Primitive> {
        self.helper.as_ref()
    }

    pub fn is_loading(&self) -> bool {
        self.model_task.is_some() || self.env_task.is_some()
    }

    /// Check both loads without blocking. Under the strict policy a missing
    /// asset comes back as an error.
    pub fn poll_assets(&mut self) -> SceneResult<Vec<AssetEvent>> {
        let mut events = Vec::new();

        if let Some(result) = self.env_task.as_mut().and_then(AssetTask::poll) {
            self.env_task = None;
            let env = result.map_err(|e| SceneError::AssetUnavailable {
                path: self.config.env_map.clone(),
                reason: format!("{e:#}"),
            });
            if let Some(env) = self.config.asset_policy.resolve(env)? {
                log::info!("Environment map ready, mean radiance {:?}", env.average());
                events.push(AssetEvent::EnvironmentReady(env));
            }
        }

        if let Some(result) = self.model_task.as_mut().and_then(AssetTask::poll) {
            self.model_task = None;
            let loaded = result.map_err(|e| SceneError::AssetUnavailable {
                path: self.config.model_path.display().to_string(),
                reason: format!("{e:#}"),
            });
            if let Some(loaded) = self.config.asset_policy.resolve(loaded)? {
                self.install_model(loaded)?;
                events.push(AssetEvent::ModelReady);
            }
        }

        Ok(events)
    }

    fn install_model(&mut self, loaded: LoadedScene) -> SceneResult<()> {
        let policy = self.config.asset_policy;
        let camera = loaded.first_camera().cloned().ok_or(SceneError::CameraNotFound);
        let LoadedScene {
            root,
            mut graph,
            primitives,
            ..
        } = loaded;

        let node = graph
            .find_by_name(&self.config.node_name)
            .ok_or_else(|| self.config.missing_node());
        let node = policy.resolve(node)?;
        let camera = policy.resolve(camera)?;

        if let Some(t) = graph.transform_mut(root) {
            *t = self.config.placed(*t);
        }
        self.graph = graph;
        self.primitives = primitives;
        self.animator.set_target(node);
        if let Some(def) = camera {
            self.adopt_camera(&def);
        }
        log::info!(
            "Model installed: {} nodes, {} primitives, animated node {:?}",
            self.graph.len(),
            self.primitives.len(),
            node
        );
        Ok(())
    }

    /// Take over an embedded camera's pose (and lens, when perspective).
    fn adopt_camera(&mut self, def: &CameraDef) {
        self.camera.position = def.position();
        self.camera.rotation = def.rotation();
        match def.projection {
            CameraProjection::Perspective {
                yfov, znear, zfar, ..
            } => {
                self.camera.fov_y_rad = yfov;
                self.camera.z_near = znear;
                self.camera.z_far = zfar.unwrap_or(self.config.camera.z_far);
            }
            CameraProjection::Orthographic { .. } => {
                log::warn!("Orthographic model camera: keeping perspective lens, adopting pose only");
            }
        }
        log::info!(
            "Using model camera {:?} at {:?}",
            def.name.as_deref().unwrap_or("<unnamed>"),
            self.camera.position
        );
    }

    pub fn on_pointer_move(&mut self, x_px: f32, y_px: f32) -> Option<RotationTarget> {
        let (w, h) = self.viewport;
        self.animator
            .on_pointer_move(x_px, y_px, w as f32, h as f32, &self.graph)
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        self.viewport = (width, height);
        self.camera.set_viewport(width, height);
    }

    /// Per-frame update.
    pub fn update(&mut self, dt: f32) {
        self.animator.tick(dt, &mut self.graph);
    }

    pub fn draw_list(&self) -> Vec<DrawItem> {
        self.graph
            .drawables()
            .flat_map(|(world, prims)| {
                prims.iter().map(move |&primitive| DrawItem { primitive, world })
            })
            .collect()
    }

    pub fn helper_world(&self) -> Option<Mat4> {
        self.helper
            .as_ref()
            .map(|_| Mat4::from_translation(self.lighting.point.position))
    }

    /// Drop pending loads and unbind the animator. GPU resources are owned
    /// by the caller.
    pub fn dispose(&mut self) {
        self.animator.set_target(None);
        let pending = self.model_task.take().is_some() | self.env_task.take().is_some();
        if pending {
            log::debug!("Disposed scene with loads still in flight");
        }
        log::info!("Scene disposed");
    }
}
