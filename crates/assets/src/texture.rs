use std::path::Path;

use image::ImageFormat;

/// Decoded RGBA8 image, rows top to bottom.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextureImage {
    pub width: u32,
    pub height: u32,
    pub rgba: Vec<u8>,
}

impl TextureImage {
    /// A 1×1 image of a single color.
    pub fn solid(rgba: [u8; 4]) -> Self {
        Self {
            width: 1,
            height: 1,
            rgba: rgba.to_vec(),
        }
    }

    /// Decode encoded image bytes. The format comes from `path`'s extension
    /// when it names one, otherwise from the file's magic bytes.
    pub fn decode(bytes: &[u8], path: &Path) -> Result<Self, image::ImageError> {
        let image = match ImageFormat::from_path(path) {
            Ok(format) => image::load_from_memory_with_format(bytes, format)?,
            Err(_) => image::load_from_memory(bytes)?,
        };
        let rgba = image.to_rgba8();
        Ok(Self {
            width: rgba.width(),
            height: rgba.height(),
            rgba: rgba.into_raw(),
        })
    }
}
