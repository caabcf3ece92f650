use std::path::{Path, PathBuf};

use crate::error::AssetError;
use crate::obj::{self, MeshData};
use crate::texture::TextureImage;

/// Reads asset files relative to a root directory.
///
/// Absolute paths bypass the root.
#[derive(Debug, Clone)]
pub struct AssetLoader {
    root: PathBuf,
}

impl AssetLoader {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Full path of an asset.
    pub fn resolve(&self, path: impl AsRef<Path>) -> PathBuf {
        self.root.join(path)
    }

    pub fn read_bytes(&self, path: impl AsRef<Path>) -> Result<Vec<u8>, AssetError> {
        let full = self.resolve(path);
        tracing::debug!(path = %full.display(), "reading asset");
        std::fs::read(&full).map_err(|source| AssetError::Io { path: full, source })
    }

    /// Read a text asset such as a shader source.
    pub fn read_to_string(&self, path: impl AsRef<Path>) -> Result<String, AssetError> {
        let full = self.resolve(path);
        tracing::debug!(path = %full.display(), "reading asset");
        std::fs::read_to_string(&full).map_err(|source| AssetError::Io { path: full, source })
    }

    pub fn load_obj(&self, path: impl AsRef<Path>) -> Result<MeshData, AssetError> {
        let text = self.read_to_string(path.as_ref())?;
        obj::parse_obj(&text).map_err(|e| AssetError::Obj {
            path: self.resolve(path),
            line: e.line,
            message: e.message,
        })
    }

    pub fn load_texture(&self, path: impl AsRef<Path>) -> Result<TextureImage, AssetError> {
        let bytes = self.read_bytes(path.as_ref())?;
        let full = self.resolve(path);
        let image = TextureImage::decode(&bytes, &full)
            .map_err(|source| AssetError::Image { path: full.clone(), source })?;
        tracing::info!(
            path = %full.display(),
            width = image.width,
            height = image.height,
            "loaded texture"
        );
        Ok(image)
    }
}
