//! Asset loading (models, environment maps) and the background load task.

pub mod environment;
pub mod mesh;
pub mod model;
pub mod source;
pub mod task;

pub use environment::EnvironmentMap;
pub use mesh::{Material, MeshData, MeshVertex, Primitive};
pub use model::{CameraDef, CameraProjection, LoadedScene, load_gltf_from_path, load_gltf_from_slice};
pub use source::AssetSource;
pub use task::AssetTask;
