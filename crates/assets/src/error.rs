use std::path::PathBuf;

/// Errors from asset operations.
#[derive(Debug, thiserror::Error)]
pub enum AssetError {
    #[error("IO error reading {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("cannot decode image {}: {source}", .path.display())]
    Image {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error("OBJ parse error at {}:{line}: {message}", .path.display())]
    Obj {
        path: PathBuf,
        line: usize,
        message: String,
    },
}

impl AssetError {
    /// Path of the asset that failed.
    pub fn path(&self) -> &std::path::Path {
        match self {
            Self::Io { path, .. } | Self::Image { path, .. } | Self::Obj { path, .. } => path,
        }
    }
}
