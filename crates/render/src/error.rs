use ember_assets::AssetError;
use ember_ecs::EcsError;

use crate::device::DeviceError;

/// Errors from the scene store and the render pass.
#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("asset load failed: {0}")]
    AssetLoad(#[from] AssetError),
    #[error("shader `{name}` failed to compile:\n{log}")]
    ShaderCompile { name: String, log: String },
    #[error("invalid geometry: {0}")]
    InvalidGeometry(String),
    #[error("geometry index {0} out of range")]
    InvalidGeometryIndex(usize),
    #[error("material index {0} out of range")]
    InvalidMaterialIndex(usize),
    #[error("shader not found: {0}")]
    ShaderNotFound(String),
    #[error(transparent)]
    Component(#[from] EcsError),
    #[error("graphics device error: {0}")]
    GraphicsDevice(String),
}

impl From<DeviceError> for RenderError {
    fn from(err: DeviceError) -> Self {
        match err {
            DeviceError::Compile(log) | DeviceError::Device(log) => {
                Self::GraphicsDevice(log)
            }
        }
    }
}
