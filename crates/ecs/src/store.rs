use std::collections::HashMap;

use ember_common::EntityId;
use glam::Mat4;

use crate::error::EcsError;
use crate::mesh::{GeometryHandle, MaterialHandle, Mesh, Name};
use crate::transform::Transform;

/// Insertion-ordered storage for one component type.
#[derive(Debug, Clone)]
pub struct ComponentStorage<T> {
    entries: Vec<(EntityId, T)>,
    index: HashMap<EntityId, usize>,
}

impl<T> Default for ComponentStorage<T> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
            index: HashMap::new(),
        }
    }
}

impl<T> ComponentStorage<T> {
    /// Insert or replace. A replaced component keeps its position.
    pub fn insert(&mut self, entity: EntityId, component: T) -> Option<T> {
        if let Some(&slot) = self.index.get(&entity) {
            return Some(std::mem::replace(&mut self.entries[slot].1, component));
        }
        self.index.insert(entity, self.entries.len());
        self.entries.push((entity, component));
        None
    }

    pub fn get(&self, entity: EntityId) -> Option<&T> {
        self.index.get(&entity).map(|&slot| &self.entries[slot].1)
    }

    pub fn get_mut(&mut self, entity: EntityId) -> Option<&mut T> {
        self.index
            .get(&entity)
            .map(|&slot| &mut self.entries[slot].1)
    }

    pub fn contains(&self, entity: EntityId) -> bool {
        self.index.contains_key(&entity)
    }

    /// Components in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (EntityId, &T)> {
        self.entries.iter().map(|(id, c)| (*id, c))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// A type that lives in one of the [`ComponentStore`] storages.
pub trait Component: Sized + 'static {
    /// Display name used in lookup errors.
    const NAME: &'static str;

    fn storage(store: &ComponentStore) -> &ComponentStorage<Self>;

    fn storage_mut(store: &mut ComponentStore) -> &mut ComponentStorage<Self>;

    /// Called when the component is attached to `owner`.
    fn attach(&mut self, _owner: EntityId) {}
}

impl Component for Name {
    const NAME: &'static str = "Name";

    fn storage(store: &ComponentStore) -> &ComponentStorage<Self> {
        &store.names
    }

    fn storage_mut(store: &mut ComponentStore) -> &mut ComponentStorage<Self> {
        &mut store.names
    }
}

impl Component for Transform {
    const NAME: &'static str = "Transform";

    fn storage(store: &ComponentStore) -> &ComponentStorage<Self> {
        &store.transforms
    }

    fn storage_mut(store: &mut ComponentStore) -> &mut ComponentStorage<Self> {
        &mut store.transforms
    }
}

impl Component for Mesh {
    const NAME: &'static str = "Mesh";

    fn storage(store: &ComponentStore) -> &ComponentStorage<Self> {
        &store.meshes
    }

    fn storage_mut(store: &mut ComponentStore) -> &mut ComponentStorage<Self> {
        &mut store.meshes
    }

    fn attach(&mut self, owner: EntityId) {
        self.owner = owner;
    }
}

/// Component storage for every component type, plus the entity list.
#[derive(Debug, Clone, Default)]
pub struct ComponentStore {
    entities: Vec<EntityId>,
    names: ComponentStorage<Name>,
    transforms: ComponentStorage<Transform>,
    meshes: ComponentStorage<Mesh>,
}

impl ComponentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an entity carrying a [`Name`].
    pub fn spawn(&mut self, name: impl Into<String>) -> EntityId {
        let id = EntityId::new();
        let name = name.into();
        tracing::debug!(entity = %id, %name, "spawned entity");
        self.entities.push(id);
        self.names.insert(id, Name(name));
        id
    }

    /// Entities in creation order.
    pub fn entities(&self) -> &[EntityId] {
        &self.entities
    }

    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    /// Attach `component` to `entity`, replacing any previous one of the same type.
    pub fn insert<T: Component>(&mut self, entity: EntityId, mut component: T) -> Option<T> {
        if !self.entities.contains(&entity) {
            self.entities.push(entity);
        }
        component.attach(entity);
        T::storage_mut(self).insert(entity, component)
    }

    /// Convenience for attaching a [`Mesh`] owned by `entity`.
    pub fn attach_mesh(
        &mut self,
        entity: EntityId,
        geometry: GeometryHandle,
        material: MaterialHandle,
    ) {
        self.insert(entity, Mesh::new(entity, geometry, material));
    }

    /// The component of type `T` on `entity`.
    pub fn get<T: Component>(&self, entity: EntityId) -> Result<&T, EcsError> {
        T::storage(self)
            .get(entity)
            .ok_or(EcsError::ComponentNotFound {
                entity,
                component: T::NAME,
            })
    }

    pub fn get_mut<T: Component>(&mut self, entity: EntityId) -> Result<&mut T, EcsError> {
        T::storage_mut(self)
            .get_mut(entity)
            .ok_or(EcsError::ComponentNotFound {
                entity,
                component: T::NAME,
            })
    }

    /// All components of type `T`, in insertion order.
    pub fn all<T: Component>(&self) -> impl Iterator<Item = (EntityId, &T)> {
        T::storage(self).iter()
    }

    pub fn storage<T: Component>(&self) -> &ComponentStorage<T> {
        T::storage(self)
    }

    /// Display name of an entity, or its short id when it has none.
    pub fn label(&self, entity: EntityId) -> String {
        self.names
            .get(entity)
            .map(|n| n.0.clone())
            .unwrap_or_else(|| entity.short())
    }

    /// Link `child`'s transform under `parent` (or detach it with `None`).
    ///
    /// Refuses links that would make `child` its own ancestor.
    pub fn set_parent(
        &mut self,
        child: EntityId,
        parent: Option<EntityId>,
    ) -> Result<(), EcsError> {
        if !self.transforms.contains(child) {
            return Err(EcsError::ComponentNotFound {
                entity: child,
                component: Transform::NAME,
            });
        }
        if let Some(parent) = parent {
            self.check_ancestry(child, parent)?;
        }
        self.get_mut::<Transform>(child)?.parent = parent;
        Ok(())
    }

    /// Global matrix of `entity`'s transform.
    pub fn global_matrix(&self, entity: EntityId) -> Result<Mat4, EcsError> {
        self.get::<Transform>(entity)?
            .global_matrix(&self.transforms)
    }

    /// Walk up from `parent`; reaching `child` means the link would close a cycle.
    fn check_ancestry(&self, child: EntityId, parent: EntityId) -> Result<(), EcsError> {
        let mut current = Some(parent);
        let mut steps = 0usize;
        while let Some(id) = current {
            if id == child || steps > self.transforms.len() {
                return Err(EcsError::CyclicTransform(child));
            }
            current = self.get::<Transform>(id)?.parent;
            steps += 1;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    #[test]
    fn spawn_adds_name() {
        let mut store = ComponentStore::new();
        let id = store.spawn("plane");
        assert_eq!(store.get::<Name>(id).unwrap().0, "plane");
        assert_eq!(store.entity_count(), 1);
        assert_eq!(store.label(id), "plane");
    }

    #[test]
    fn missing_component_is_an_error() {
        let mut store = ComponentStore::new();
        let id = store.spawn("bare");
        let err = store.get::<Transform>(id).unwrap_err();
        assert_eq!(
            err,
            EcsError::ComponentNotFound {
                entity: id,
                component: "Transform"
            }
        );
    }

    #[test]
    fn iteration_follows_insertion_order() {
        let mut store = ComponentStore::new();
        let ids: Vec<EntityId> = (0..20).map(|i| store.spawn(format!("e{i}"))).collect();
        for (i, id) in ids.iter().enumerate().rev() {
            store.attach_mesh(*id, GeometryHandle(i), MaterialHandle(0));
        }
        let order: Vec<EntityId> = store.all::<Mesh>().map(|(id, _)| id).collect();
        let mut expected = ids.clone();
        expected.reverse();
        assert_eq!(order, expected);
    }

    #[test]
    fn replacing_keeps_slot() {
        let mut store = ComponentStore::new();
        let a = store.spawn("a");
        let b = store.spawn("b");
        store.attach_mesh(a, GeometryHandle(0), MaterialHandle(0));
        store.attach_mesh(b, GeometryHandle(1), MaterialHandle(0));
        store.attach_mesh(a, GeometryHandle(7), MaterialHandle(3));

        let meshes: Vec<(EntityId, Mesh)> = store.all::<Mesh>().map(|(id, m)| (id, *m)).collect();
        assert_eq!(meshes.len(), 2);
        assert_eq!(meshes[0].0, a);
        assert_eq!(meshes[0].1.geometry, GeometryHandle(7));
        assert_eq!(meshes[1].0, b);
    }

    #[test]
    fn insert_stamps_mesh_owner() {
        let mut store = ComponentStore::new();
        let a = store.spawn("a");
        let stranger = EntityId::new();
        store.insert(a, Mesh::new(stranger, GeometryHandle(0), MaterialHandle(0)));
        assert_eq!(store.get::<Mesh>(a).unwrap().owner, a);
    }

    #[test]
    fn insert_registers_unknown_entity() {
        let mut store = ComponentStore::new();
        let loose = EntityId::new();
        store.insert(loose, Transform::default());
        assert_eq!(store.entities(), &[loose]);
        assert_eq!(store.label(loose), loose.short());
    }

    #[test]
    fn set_parent_links_transforms() {
        let mut store = ComponentStore::new();
        let root = store.spawn("root");
        let leaf = store.spawn("leaf");
        store.insert(root, Transform::from_translation(Vec3::X));
        store.insert(leaf, Transform::from_translation(Vec3::Y));
        store.set_parent(leaf, Some(root)).unwrap();

        let global = store.global_matrix(leaf).unwrap();
        assert!(global.transform_point3(Vec3::ZERO).abs_diff_eq(Vec3::new(1.0, 1.0, 0.0), 1e-6));

        store.set_parent(leaf, None).unwrap();
        let global = store.global_matrix(leaf).unwrap();
        assert!(global.transform_point3(Vec3::ZERO).abs_diff_eq(Vec3::Y, 1e-6));
    }

    #[test]
    fn set_parent_rejects_cycles() {
        let mut store = ComponentStore::new();
        let a = store.spawn("a");
        let b = store.spawn("b");
        let c = store.spawn("c");
        for id in [a, b, c] {
            store.insert(id, Transform::default());
        }
        store.set_parent(b, Some(a)).unwrap();
        store.set_parent(c, Some(b)).unwrap();

        assert_eq!(store.set_parent(a, Some(c)), Err(EcsError::CyclicTransform(a)));
        assert_eq!(store.set_parent(a, Some(a)), Err(EcsError::CyclicTransform(a)));
        // the rejected link left the hierarchy untouched
        assert_eq!(store.get::<Transform>(a).unwrap().parent, None);
    }

    #[test]
    fn set_parent_requires_both_transforms() {
        let mut store = ComponentStore::new();
        let a = store.spawn("a");
        let b = store.spawn("b");
        store.insert(a, Transform::default());
        assert!(matches!(
            store.set_parent(a, Some(b)),
            Err(EcsError::ComponentNotFound { entity, .. }) if entity == b
        ));
        assert!(matches!(
            store.set_parent(b, Some(a)),
            Err(EcsError::ComponentNotFound { entity, .. }) if entity == b
        ));
    }
}
