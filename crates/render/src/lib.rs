//! Rendering core: scene store, device interface and the render pass.
//!
//! # Invariants
//! - The render pass reads the scene store and component store; it never
//!   mutates either.
//! - Every device command goes through [`GraphicsDevice`]. The core never
//!   touches a GPU API directly.
//! - Per mesh, state is bound in a fixed order: program, uniforms, texture
//!   unit 0, vertex array, draw, unbind.
//!
//! [`RecordingDevice`] implements the device interface without a GPU and
//! records every command, so the pass can be run and inspected headless.

mod device;
mod error;
pub mod pass;
mod recording;
mod scene;

pub use device::{
    DeviceError, GraphicsDevice, ProgramId, TextureId, UniformLocation, UniformValue,
    VertexArrayId, declared_uniforms,
};
pub use error::RenderError;
pub use pass::{Camera, FrameReport, SceneParameters, SkippedMesh, render_frame};
pub use recording::{Command, RecordingDevice};
pub use scene::{Geometry, Material, SceneStore, Shader};

pub fn crate_info() -> &'static str {
    "ember-render v0.1.0"
}
