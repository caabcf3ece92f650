use std::collections::HashSet;

use ember_common::EntityId;
use glam::{Mat4, Quat, Vec3};
use serde::{Deserialize, Serialize};

use crate::error::EcsError;
use crate::store::{Component, ComponentStorage};

/// Local transform with an optional parent.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Transform {
    pub local: Mat4,
    pub parent: Option<EntityId>,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            local: Mat4::IDENTITY,
            parent: None,
        }
    }
}

impl Transform {
    pub fn new(local: Mat4) -> Self {
        Self {
            local,
            parent: None,
        }
    }

    pub fn from_translation(translation: Vec3) -> Self {
        Self::new(Mat4::from_translation(translation))
    }

    pub fn from_trs(translation: Vec3, rotation: Quat, scale: Vec3) -> Self {
        Self::new(Mat4::from_scale_rotation_translation(
            scale,
            rotation,
            translation,
        ))
    }

    pub fn with_parent(mut self, parent: EntityId) -> Self {
        self.parent = Some(parent);
        self
    }

    /// Compose the local matrices from the root down to this transform.
    ///
    /// Returns `root * ... * parent * local`. A parent that was already
    /// visited is reported as [`EcsError::CyclicTransform`].
    pub fn global_matrix(
        &self,
        transforms: &ComponentStorage<Transform>,
    ) -> Result<Mat4, EcsError> {
        let mut ancestors = Vec::new();
        let mut visited = HashSet::new();
        let mut next = self.parent;

        while let Some(id) = next {
            if !visited.insert(id) {
                return Err(EcsError::CyclicTransform(id));
            }
            let parent = transforms.get(id).ok_or(EcsError::ComponentNotFound {
                entity: id,
                component: Transform::NAME,
            })?;
            ancestors.push(parent.local);
            next = parent.parent;
        }

        Ok(ancestors
            .into_iter()
            .fold(self.local, |acc, ancestor| ancestor * acc))
    }
}
