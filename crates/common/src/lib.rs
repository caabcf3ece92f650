//! Shared types and math for the ember renderer.
//!
//! # Invariants
//! - Math helpers are pure: no state, no allocation.
//! - Matrices are column-major `glam::Mat4`; vectors are column vectors.

pub mod math;
mod types;

pub use types::EntityId;
