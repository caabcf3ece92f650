//! wgpu backend for the ember graphics device.
//!
//! The render pass issues immediate-mode commands; [`WgpuDevice`] captures
//! the bound state at each draw and replays the whole frame as one wgpu
//! render pass on `present`.
//!
//! # Shader interface
//! Shader files are WGSL. The device prepends a prelude declaring the
//! `uniforms` block (group 0) and the diffuse texture `t_diffuse` /
//! `s_diffuse` (group 1). Entry points are `vs_main` and `fs_main`; vertex
//! inputs are position (location 0), uv (1) and normal (2).

mod frame;
mod gpu;
mod shaders;

pub use gpu::WgpuDevice;
pub use shaders::SHADER_PRELUDE;
