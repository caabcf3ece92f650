//! View, projection and normal-matrix helpers over `glam`.
//!
//! Projections use the right-handed, zero-to-one depth convention that wgpu
//! expects.

pub use glam::{Mat3, Mat4, Quat, Vec2, Vec3, Vec4};

/// Determinants smaller than this are treated as singular.
const SINGULAR_EPSILON: f32 = 1.0e-12;

/// View matrix for a camera at `eye` looking at `target`.
pub fn look_at(eye: Vec3, target: Vec3, up: Vec3) -> Mat4 {
    Mat4::look_at_rh(eye, target, up)
}

/// Perspective projection. `fov_y` is the vertical field of view in radians.
pub fn perspective(fov_y: f32, aspect: f32, near: f32, far: f32) -> Mat4 {
    Mat4::perspective_rh(fov_y, aspect, near, far)
}

/// Inverse of `m`, or `None` if `m` is singular.
pub fn try_inverse(m: Mat4) -> Option<Mat4> {
    let det = m.determinant();
    if !det.is_finite() || det.abs() < SINGULAR_EPSILON {
        return None;
    }
    Some(m.inverse())
}

/// Transform for surface normals: `transpose(inverse(model))`.
///
/// A singular model matrix (for example a zero scale axis) collapses the
/// geometry anyway; identity is returned so lighting stays finite.
pub fn normal_matrix(model: Mat4) -> Mat4 {
    try_inverse(model)
        .map(|inv| inv.transpose())
        .unwrap_or(Mat4::IDENTITY)
}

/// `projection * view * model`.
pub fn model_view_projection(projection: Mat4, view: Mat4, model: Mat4) -> Mat4 {
    projection * view * model
}
