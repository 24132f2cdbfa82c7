//! Shared scene errors (renderer-agnostic).

use thiserror::Error;

#[derive(Debug, Error)]
pub enum SceneError {
    #[error("node '{0}' not found in the loaded model")]
    NodeNotFound(String),
    #[error("no camera found in the loaded model")]
    CameraNotFound,
    #[error("asset '{path}' failed to load: {reason}")]
    AssetUnavailable { path: String, reason: String },
}

pub type SceneResult<T> = Result<T, SceneError>;
