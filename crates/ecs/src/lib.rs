//! Entity-component store.
//!
//! Components are stored per type, keyed by [`EntityId`]. Each storage keeps
//! insertion order, so bulk iteration is stable across a frame.
//!
//! # Invariants
//! - Iteration order is insertion order; replacing a component keeps its slot.
//! - Transform parent chains are acyclic. `set_parent` refuses to close a
//!   cycle and resolution reports one instead of looping.
//! - A `Mesh` always names the entity that owns it.

mod error;
mod mesh;
mod store;
mod transform;

pub use ember_common::EntityId;
pub use error::EcsError;
pub use mesh::{GeometryHandle, MaterialHandle, Mesh, Name};
pub use store::{Component, ComponentStorage, ComponentStore};
pub use transform::Transform;

pub fn crate_info() -> &'static str {
    "ember-ecs v0.1.0"
}
