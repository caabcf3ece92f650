//! Asset loading for meshes, textures and shader sources.
//!
//! Every file is read through an [`AssetLoader`] rooted at a configurable
//! directory. Loaders return plain CPU-side data ([`MeshData`],
//! [`TextureImage`], `String`); uploading it is the renderer's job.

mod error;
mod loader;
pub mod obj;
pub mod primitives;
mod texture;

pub use error::AssetError;
pub use loader::AssetLoader;
pub use obj::{MeshData, ObjParseError, parse_obj};
pub use texture::TextureImage;

pub fn crate_info() -> &'static str {
    "ember-assets v0.1.0"
}
