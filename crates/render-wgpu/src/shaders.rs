use bytemuck::{Pod, Zeroable};
use ember_render::UniformValue;
use glam::Mat4;

/// WGSL declarations prepended to every vertex and fragment source.
pub const SHADER_PRELUDE: &str = r#"
struct Uniforms {
    u_mvp: mat4x4<f32>,
    u_model: mat4x4<f32>,
    u_normal_matrix: mat4x4<f32>,
    u_light_pos: vec3<f32>,
    u_glossiness: f32,
    u_cam_pos: vec3<f32>,
    u_texture_diffuse: i32,
    u_diffuse: vec3<f32>,
    _pad0: f32,
};

@group(0) @binding(0)
var<uniform> uniforms: Uniforms;

@group(1) @binding(0)
var t_diffuse: texture_2d<f32>;
@group(1) @binding(1)
var s_diffuse: sampler;
"#;

/// Field order of [`UniformBlock`]; a uniform's location is its index here.
pub(crate) const UNIFORM_FIELDS: [&str; 8] = [
    "u_mvp",
    "u_model",
    "u_normal_matrix",
    "u_light_pos",
    "u_glossiness",
    "u_cam_pos",
    "u_texture_diffuse",
    "u_diffuse",
];

/// Byte stride between per-draw blocks in the uniform buffer.
pub(crate) const UNIFORM_SLOT: u64 = 256;

/// CPU mirror of the prelude's `Uniforms` struct.
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Pod, Zeroable)]
pub(crate) struct UniformBlock {
    u_mvp: [[f32; 4]; 4],
    u_model: [[f32; 4]; 4],
    u_normal_matrix: [[f32; 4]; 4],
    u_light_pos: [f32; 3],
    u_glossiness: f32,
    u_cam_pos: [f32; 3],
    u_texture_diffuse: i32,
    u_diffuse: [f32; 3],
    _pad0: f32,
}

impl Default for UniformBlock {
    fn default() -> Self {
        let identity = Mat4::IDENTITY.to_cols_array_2d();
        Self {
            u_mvp: identity,
            u_model: identity,
            u_normal_matrix: identity,
            ..Zeroable::zeroed()
        }
    }
}

impl UniformBlock {
    pub(crate) fn field_index(name: &str) -> Option<u32> {
        UNIFORM_FIELDS
            .iter()
            .position(|field| *field == name)
            .map(|i| i as u32)
    }

    /// Store `value` in the field at `index`, checking its type.
    pub(crate) fn set(&mut self, index: u32, value: UniformValue) -> Result<(), String> {
        match (index, value) {
            (0, UniformValue::Mat4(m)) => self.u_mvp = m.to_cols_array_2d(),
            (1, UniformValue::Mat4(m)) => self.u_model = m.to_cols_array_2d(),
            (2, UniformValue::Mat4(m)) => self.u_normal_matrix = m.to_cols_array_2d(),
            (3, UniformValue::Vec3(v)) => self.u_light_pos = v.to_array(),
            (4, UniformValue::Float(f)) => self.u_glossiness = f,
            (5, UniformValue::Vec3(v)) => self.u_cam_pos = v.to_array(),
            (6, UniformValue::Int(i)) => self.u_texture_diffuse = i,
            (7, UniformValue::Vec3(v)) => self.u_diffuse = v.to_array(),
            (index, value) => {
                let field = UNIFORM_FIELDS.get(index as usize).copied().unwrap_or("?");
                return Err(format!("uniform {field} (location {index}) cannot hold {value:?}"));
            }
        }
        Ok(())
    }
}

/// Full WGSL module for one stage.
pub(crate) fn compose(source: &str) -> String {
    let mut module = String::with_capacity(SHADER_PRELUDE.len() + source.len());
    module.push_str(SHADER_PRELUDE);
    module.push_str(source);
    module
}
