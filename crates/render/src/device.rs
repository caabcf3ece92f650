use std::collections::BTreeSet;

use ember_assets::{MeshData, TextureImage};
use glam::{Mat4, Vec3};
use serde::Serialize;

/// Linked shader program owned by a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct ProgramId(pub u32);

/// Vertex array (vertex buffers + index buffer) owned by a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct VertexArrayId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct TextureId(pub u32);

/// Location of a named uniform inside one program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct UniformLocation(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub enum UniformValue {
    Mat4(Mat4),
    Vec3(Vec3),
    Int(i32),
    Float(f32),
}

/// Errors reported by a graphics device.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DeviceError {
    #[error("shader compilation failed: {0}")]
    Compile(String),
    #[error("device error: {0}")]
    Device(String),
}

/// Immediate-mode graphics device.
///
/// Bind calls change device state that later draws read, like a GL
/// context. Errors from bind and draw calls are not returned directly; they
/// accumulate and are read back with [`GraphicsDevice::take_error`].
pub trait GraphicsDevice {
    /// Compile and link a program from vertex and fragment source.
    fn create_program(
        &mut self,
        name: &str,
        vertex_source: &str,
        fragment_source: &str,
    ) -> Result<ProgramId, DeviceError>;

    fn delete_program(&mut self, program: ProgramId);

    /// Upload a mesh. All streams must hold one entry per vertex.
    fn create_vertex_array(&mut self, mesh: &MeshData) -> Result<VertexArrayId, DeviceError>;

    fn delete_vertex_array(&mut self, vertex_array: VertexArrayId);

    fn create_texture(&mut self, image: &TextureImage) -> Result<TextureId, DeviceError>;

    fn delete_texture(&mut self, texture: TextureId);

    /// Clear color and depth.
    fn clear(&mut self, color: [f32; 4]);

    fn use_program(&mut self, program: Option<ProgramId>);

    /// Location of `name` in `program`, or `None` if the program does not
    /// declare it.
    fn uniform_location(&self, program: ProgramId, name: &str) -> Option<UniformLocation>;

    /// Set a uniform of the program currently in use.
    fn set_uniform(&mut self, location: UniformLocation, value: UniformValue);

    fn active_texture(&mut self, unit: u32);

    /// Bind `texture` to the active unit, or unbind with `None`.
    fn bind_texture(&mut self, texture: Option<TextureId>);

    fn bind_vertex_array(&mut self, vertex_array: Option<VertexArrayId>);

    /// Draw `index_count` indices from the bound vertex array as triangles.
    fn draw_indexed_triangles(&mut self, index_count: u32);

    /// Take the first error raised since the last call, clearing it.
    fn take_error(&mut self) -> Option<DeviceError>;

    /// Show the finished frame.
    fn present(&mut self) -> Result<(), DeviceError>;
}

/// Uniform names (`u_*` identifiers) referenced by shader source.
pub fn declared_uniforms(source: &str) -> BTreeSet<String> {
    source
        .split(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
        .filter(|token| token.len() > 2 && token.starts_with("u_"))
        .map(str::to_owned)
        .collect()
}
