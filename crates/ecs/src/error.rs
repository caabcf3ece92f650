use ember_common::EntityId;

/// Errors from component lookups and transform resolution.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EcsError {
    #[error("entity {entity} has no {component} component")]
    ComponentNotFound {
        entity: EntityId,
        component: &'static str,
    },
    #[error("transform hierarchy contains a cycle through entity {0}")]
    CyclicTransform(EntityId),
}
