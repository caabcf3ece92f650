use ember_common::EntityId;
use serde::{Deserialize, Serialize};

/// Index of a geometry in the scene store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GeometryHandle(pub usize);

/// Index of a material in the scene store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MaterialHandle(pub usize);

/// Human-readable name component.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Name(pub String);

/// Renderable mesh: which geometry to draw, with which material, for which entity.
///
/// The handles are plain indices and are only checked when the render pass
/// resolves them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Mesh {
    pub geometry: GeometryHandle,
    pub material: MaterialHandle,
    pub owner: EntityId,
}

impl Mesh {
    pub fn new(owner: EntityId, geometry: GeometryHandle, material: MaterialHandle) -> Self {
        Self {
            geometry,
            material,
            owner,
        }
    }
}
