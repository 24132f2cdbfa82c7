//! Scene configuration. Every tunable constant lives here; the CLI overrides
//! a subset.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::error::{SceneError, SceneResult};
use crate::light::{AmbientLight, Lighting, PointLight};
use crate::transform::Transform;
use crate::{Vec3, vec3};

/// What to do when an expected asset (model, named node, embedded camera)
/// is missing.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum AssetPolicy {
    /// Log a warning and keep running with defaults.
    #[default]
    Degrade,
    /// Treat the miss as a startup failure.
    Strict,
}

impl AssetPolicy {
    /// Apply the policy to a lookup result.
    ///
    /// `Degrade` turns an error into `Ok(None)` after logging it.
    pub fn resolve<T>(self, result: SceneResult<T>) -> SceneResult<Option<T>> {
        match (self, result) {
            (_, Ok(v)) => Ok(Some(v)),
            (AssetPolicy::Degrade, Err(e)) => {
                log::warn!("{e}; continuing without it");
                Ok(None)
            }
            (AssetPolicy::Strict, Err(e)) => Err(e),
        }
    }
}

impl FromStr for AssetPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "degrade" | "soft" | "warn" => Ok(AssetPolicy::Degrade),
            "strict" | "hard" | "fail" => Ok(AssetPolicy::Strict),
            other => Err(format!("unknown asset policy '{other}' (expected degrade|strict)")),
        }
    }
}

impl fmt::Display for AssetPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            AssetPolicy::Degrade => "degrade",
            AssetPolicy::Strict => "strict",
        })
    }
}

/// Pose animator tuning.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PoseConfig {
    /// Maximum |pitch| and |yaw| in radians.
    pub scale: f32,
    /// Transition length in seconds.
    pub duration: f32,
}

impl Default for PoseConfig {
    fn default() -> Self {
        Self {
            scale: 0.5,
            duration: 1.5,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BloomConfig {
    pub threshold: f32,
    pub strength: f32,
    pub radius: f32,
}

impl BloomConfig {
    /// Per-level weights: base factors blended toward `1.2 - f` by `radius`,
    /// so larger radii favour the blurrier levels.
    pub fn level_weights<const N: usize>(&self) -> [f32; N] {
        const BASE: [f32; 5] = [1.0, 0.8, 0.6, 0.4, 0.2];
        let mut out = [0.0; N];
        for (i, w) in out.iter_mut().enumerate() {
            let f = BASE[i.min(BASE.len() - 1)];
            *w = f + (1.2 - f - f) * self.radius;
        }
        out
    }
}

impl Default for BloomConfig {
    fn default() -> Self {
        Self {
            threshold: 0.3,
            strength: 1.5,
            radius: 0.4,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CameraConfig {
    pub fov_y_deg: f32,
    pub z_near: f32,
    pub z_far: f32,
    /// Used when the model carries no camera.
    pub fallback_eye: Vec3,
    pub fallback_target: Vec3,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            fov_y_deg: 75.0,
            z_near: 0.1,
            z_far: 1000.0,
            fallback_eye: vec3(0.0, 0.0, 5.0),
            fallback_target: Vec3::ZERO,
        }
    }
}

pub const DEFAULT_ENV_MAP: &str =
    "https://dl.polyhaven.org/file/ph-assets/HDRIs/hdr/1k/studio_small_09_1k.hdr";

#[derive(Clone, Debug)]
pub struct SceneConfig {
    pub model_path: PathBuf,
    /// Environment map location: a local path or an `http(s)://` URL.
    pub env_map: String,
    /// Node driven by the pointer.
    pub node_name: String,
    pub asset_policy: AssetPolicy,
    pub pose: PoseConfig,
    pub bloom: BloomConfig,
    pub exposure: f32,
    pub camera: CameraConfig,
    /// Placement applied to the model root once loaded.
    pub model_placement: Transform,
    pub lighting: Lighting,
    pub light_helper: bool,
    pub light_helper_size: f32,
}

impl SceneConfig {
    /// Placement for a loaded model root, keeping the model's own scale.
    pub fn placed(&self, loaded: Transform) -> Transform {
        Transform {
            translation: self.model_placement.translation,
            rotation_euler: self.model_placement.rotation_euler,
            scale: loaded.scale,
        }
    }

    pub fn missing_node(&self) -> SceneError {
        SceneError::NodeNotFound(self.node_name.clone())
    }
}

impl Default for SceneConfig {
    fn default() -> Self {
        Self {
            model_path: PathBuf::from("assets/model.glb"),
            env_map: DEFAULT_ENV_MAP.to_owned(),
            node_name: "face".to_owned(),
            asset_policy: AssetPolicy::Degrade,
            pose: PoseConfig::default(),
            bloom: BloomConfig::default(),
            exposure: 1.0,
            camera: CameraConfig::default(),
            model_placement: Transform::from_trs(
                vec3(0.0, 0.4, 2.5),
                vec3(-0.1, 0.0, 0.0),
                Vec3::ONE,
            ),
            lighting: Lighting {
                ambient: AmbientLight::new(Vec3::ONE, 0.5),
                point: PointLight::new(vec3(5.0, 5.0, 5.0), Vec3::ONE, 1.0, 10.0),
            },
            light_helper: true,
            light_helper_size: 0.5,
        }
    }
}
